//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
///
/// If the source range is empty the start of the target range is returned.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    let span = source_range.1 - source_range.0;

    if span == T::zero() {
        return target_range.0;
    }

    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / span)
}

/// Clamp a value into `[min, max]`.
///
/// NaN inputs are mapped to `min` so that the result always lies within the bounds.
pub fn clamp<T>(value: T, min: T, max: T) -> T 
where
    T: Float
{
    if value.is_nan() {
        return min
    }

    value.max(min).min(max)
}

/// Limit the change from `prev` to `target` to at most `max_delta` in either direction.
pub fn slew_limit<T>(prev: T, target: T, max_delta: T) -> T
where
    T: Float
{
    let max_delta = max_delta.abs();

    prev + clamp(target - prev, -max_delta, max_delta)
}

/// Exponential moving average, keeping `keep` of the previous value and blending in the rest
/// from the new sample.
pub fn ema<T>(prev: T, sample: T, keep: T) -> T
where
    T: Float
{
    keep * prev + (T::one() - keep) * sample
}

/// Arithmetic mean of a slice, or `None` if it is empty.
pub fn mean<T>(values: &[T]) -> Option<T>
where
    T: Float
{
    if values.is_empty() {
        return None
    }

    let sum = values.iter().fold(T::zero(), |acc, v| acc + *v);

    T::from(values.len()).map(|n| sum / n)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 10f64), (-1f64, 1f64), 5f64), 0f64);
        assert_eq!(lin_map((0f64, 10f64), (-1f64, 1f64), 10f64), 1f64);
        assert_eq!(lin_map((3f64, 3f64), (-1f64, 1f64), 7f64), -1f64);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(1.5f64, -1f64, 1f64), 1f64);
        assert_eq!(clamp(-1.5f64, -1f64, 1f64), -1f64);
        assert_eq!(clamp(0.25f64, -1f64, 1f64), 0.25f64);
        assert_eq!(clamp(f64::NAN, 0f64, 1f64), 0f64);
    }

    #[test]
    fn test_slew_limit() {
        assert_eq!(slew_limit(0f64, 1f64, 0.25f64), 0.25f64);
        assert_eq!(slew_limit(0f64, -1f64, 0.25f64), -0.25f64);
        assert_eq!(slew_limit(0.5f64, 0.6f64, 0.25f64), 0.6f64);
    }

    #[test]
    fn test_ema_and_mean() {
        assert!((ema(0.45f64, 0.5f64, 0.8f64) - 0.46f64).abs() < 1e-12);
        assert_eq!(mean(&[1f64, 2f64, 3f64]), Some(2f64));
        assert_eq!(mean::<f64>(&[]), None);
    }
}
