//! Parameter validation shared by all modules.
//!
//! Every parameter structure is checked once, when the object using it is
//! constructed. Nothing in the cyclic processing re-validates parameters.

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A parameter set was rejected at construction time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Parameter `{0}` must be finite, found {1}")]
    NotFinite(&'static str, f64),

    #[error("Parameter `{0}` must be greater than zero, found {1}")]
    NotPositive(&'static str, f64),

    #[error("Parameter `{0}` must not be negative, found {1}")]
    Negative(&'static str, f64),

    #[error("Parameter `{name}` must be within [{min}, {max}], found {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Invalid parameter combination: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

pub(crate) fn finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite(name, value))
    }
}

pub(crate) fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive(name, value))
    }
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative(name, value))
    }
}

pub(crate) fn in_range(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    finite(name, value)?;
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            min,
            max,
            value,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_checks() {
        assert!(positive("track_width", 11.0).is_ok());
        assert_eq!(
            positive("track_width", 0.0),
            Err(ConfigError::NotPositive("track_width", 0.0))
        );
        assert!(matches!(
            non_negative("k_p", std::f64::NAN),
            Err(ConfigError::NotFinite("k_p", _))
        ));
        assert!(non_negative("k_i", 0.0).is_ok());
        assert!(in_range("lead_pct", 0.6, 0.0, 1.0).is_ok());
        assert!(in_range("lead_pct", 60.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_shipped_params_are_valid() {
        use crate::chassis::ChassisParams;
        use crate::ctrl::ControllerParams;
        use crate::exit::{ExitConditions, ExitParams};
        use crate::loc::LocConfig;
        use std::path::Path;
        use util::params::load_from_path;

        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../params");

        let chassis: ChassisParams = load_from_path(dir.join("chassis.toml")).unwrap();
        chassis.validate().unwrap();

        let loc: LocConfig = load_from_path(dir.join("loc.toml")).unwrap();
        loc.validate().unwrap();

        let ctrl: ControllerParams = load_from_path(dir.join("controllers.toml")).unwrap();
        ctrl.validate().unwrap();

        let exit: ExitParams = load_from_path(dir.join("exit.toml")).unwrap();
        exit.validate().unwrap();
        assert_eq!(ExitConditions::from_params(&exit).unwrap().len(), 4);
    }
}
