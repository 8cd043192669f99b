//! Exit condition parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use crate::params::{non_negative, ConfigError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The exit policy of a motion, as found in `exit.toml`. Every field is
/// optional, absent conditions are not installed.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ExitParams {
    #[serde(default)]
    pub settle: Option<SettleParams>,

    #[serde(default)]
    pub tolerance: Option<ToleranceParams>,

    /// Units: milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Error below which THRU motions finish.
    ///
    /// Units: inches for moves, degrees for turns
    #[serde(default)]
    pub thru_smoothness: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SettleParams {
    /// Time the error has to stay within tolerance.
    ///
    /// Units: milliseconds
    pub dwell_ms: u64,

    /// Time after the start of the motion before settling may begin.
    ///
    /// Units: milliseconds
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Units: inches
    #[serde(default)]
    pub linear_tolerance: Option<f64>,

    /// Units: degrees
    #[serde(default)]
    pub angular_tolerance_deg: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ToleranceParams {
    /// Units: inches
    #[serde(default)]
    pub linear: Option<f64>,

    /// Units: degrees
    #[serde(default)]
    pub angular_deg: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ExitParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(s) = &self.settle {
            s.validate()?;
        }
        if let Some(t) = &self.tolerance {
            t.validate()?;
        }
        if let Some(s) = self.thru_smoothness {
            non_negative("thru_smoothness", s)?;
        }
        Ok(())
    }
}

impl SettleParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.linear_tolerance.is_none() && self.angular_tolerance_deg.is_none() {
            return Err(ConfigError::Invalid(
                "settle needs at least one tolerance".into(),
            ));
        }

        if let Some(t) = self.linear_tolerance {
            non_negative("linear_tolerance", t)?;
        }
        if let Some(t) = self.angular_tolerance_deg {
            non_negative("angular_tolerance_deg", t)?;
        }
        Ok(())
    }
}

impl ToleranceParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.linear.is_none() && self.angular_deg.is_none() {
            return Err(ConfigError::Invalid(
                "tolerance needs at least one threshold".into(),
            ));
        }

        if let Some(t) = self.linear {
            non_negative("linear", t)?;
        }
        if let Some(t) = self.angular_deg {
            non_negative("angular_deg", t)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_from_toml() {
        let params: ExitParams = util::params::from_str(
            r#"
            timeout_ms = 5000
            thru_smoothness = 4.0

            [settle]
            dwell_ms = 200
            linear_tolerance = 1.0
            angular_tolerance_deg = 1.0
            "#,
        )
        .unwrap();

        assert!(params.validate().is_ok());
        assert_eq!(params.timeout_ms, Some(5000));
        assert_eq!(params.tolerance, None);
        assert_eq!(params.settle.unwrap().initial_delay_ms, 0);
    }

    #[test]
    fn test_invalid_params() {
        let params = ExitParams {
            settle: Some(SettleParams {
                dwell_ms: 0,
                initial_delay_ms: 0,
                linear_tolerance: None,
                angular_tolerance_deg: None,
            }),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::Invalid(_))));

        let params = ExitParams {
            tolerance: Some(ToleranceParams {
                linear: Some(-1.0),
                angular_deg: None,
            }),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::Negative("linear", _))
        ));
    }
}
