//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Clamp a value symmetrically into `[-cap, cap]`.
///
/// `cap` is taken by magnitude, so a negative cap behaves like its absolute
/// value.
pub fn abs_cap<T>(value: T, cap: T) -> T
where
    T: Float,
{
    let cap = cap.abs();

    if value > cap {
        cap
    } else if value < -cap {
        -cap
    } else {
        value
    }
}

/// Raise the magnitude of `value` to at least `floor`, preserving its sign.
///
/// A value of exactly zero is treated as positive.
pub fn floor_magnitude<T>(value: T, floor: T) -> T
where
    T: Float,
{
    if value.abs() >= floor {
        value
    } else if value < T::zero() {
        -floor
    } else {
        floor
    }
}

/// Move `prev` towards `target` by no more than `max_step`.
///
/// A `max_step` of zero or less disables the limit.
pub fn slew<T>(prev: T, target: T, max_step: T) -> T
where
    T: Float,
{
    if max_step <= T::zero() {
        return target;
    }

    prev + abs_cap(target - prev, max_step)
}

/// Wrap an angle into the range (-pi, pi].
pub fn wrap_angle<T>(angle: T) -> T
where
    T: Float + FloatConst,
{
    let pi_t = T::PI();
    let tau_t = T::TAU();

    // Angles already in range are returned untouched to avoid round-off
    if angle > -pi_t && angle <= pi_t {
        return angle;
    }

    let wrapped = rem_euclid(angle + pi_t, tau_t) - pi_t;

    if wrapped <= -pi_t {
        wrapped + tau_t
    } else {
        wrapped
    }
}

/// Get the signed angular distance from angle `a` to angle `b`.
///
/// This function will return the shortest signed distance, accounting for
/// wrapping, in the range (-pi, pi]. A positive result means `b` lies
/// anticlockwise of `a`.
pub fn get_ang_dist<T>(a: T, b: T) -> T
where
    T: Float + FloatConst,
{
    wrap_angle(b - a)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::zero() {
        r + rhs.abs()
    } else {
        r
    }
}
