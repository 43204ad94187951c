//! Linear interpolation of irregularly sampled series.

use energy_store::{AmbientTemperatureSample, RawCounterSample};

/// A single `(timestamp, value)` observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub t: i64,
    pub v: f64,
}

impl From<RawCounterSample> for Point {
    fn from(s: RawCounterSample) -> Self {
        Point { t: s.timestamp, v: s.value }
    }
}

impl From<AmbientTemperatureSample> for Point {
    fn from(s: AmbientTemperatureSample) -> Self {
        Point { t: s.timestamp, v: s.degrees_c }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum InterpolationError {
    #[error("degenerate interval: both brackets at t={0}")]
    DegenerateInterval(i64),
    #[error("t={t} lies outside the bracket [{t1}, {t2}]")]
    OutsideBracket { t: i64, t1: i64, t2: i64 },
}

/// `v1 + (v2 - v1) / (t2 - t1) * (t - t1)` for `t1 <= t <= t2`.
pub fn interpolate(t: i64, before: Point, after: Point) -> Result<f64, InterpolationError> {
    if before.t == after.t {
        return Err(InterpolationError::DegenerateInterval(before.t));
    }
    if t < before.t || t > after.t {
        return Err(InterpolationError::OutsideBracket {
            t,
            t1: before.t,
            t2: after.t,
        });
    }

    let slope = (after.v - before.v) / (after.t - before.t) as f64;
    Ok(before.v + slope * (t - before.t) as f64)
}

/// Estimated value at `t` from the bracketing samples, if there is a usable bracket.
///
/// An exact match returns the sample as-is. A bracket more than `max_gap` seconds
/// away from `t` counts as missing.
pub fn value_at(
    t: i64,
    before: Option<Point>,
    after: Option<Point>,
    max_gap: Option<i64>,
) -> Option<f64> {
    let near = |p: &Point| max_gap.map_or(true, |gap| (t - p.t).abs() <= gap);

    let before = before.filter(near)?;
    if before.t == t {
        return Some(before.v);
    }

    let after = after.filter(near)?;
    if after.t == t {
        return Some(after.v);
    }

    interpolate(t, before, after).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Point = Point { t: 0, v: 1000.0 };
    const B: Point = Point { t: 600, v: 1200.0 };

    #[test]
    fn exact_at_endpoints() {
        assert_eq!(interpolate(0, A, B).unwrap(), 1000.0);
        assert_eq!(interpolate(600, A, B).unwrap(), 1200.0);
    }

    #[test]
    fn midpoint_and_monotonic() {
        assert_eq!(interpolate(300, A, B).unwrap(), 1100.0);

        let mut last = f64::MIN;
        for t in (0..=600).step_by(37) {
            let v = interpolate(t, A, B).unwrap();
            assert!(v >= last);
            assert!((1000.0..=1200.0).contains(&v));
            last = v;
        }

        let down = Point { t: 600, v: 900.0 };
        let mut last = f64::MAX;
        for t in (0..=600).step_by(50) {
            let v = interpolate(t, A, down).unwrap();
            assert!(v <= last);
            last = v;
        }
    }

    #[test]
    fn degenerate_interval_is_an_error() {
        let err = interpolate(0, A, Point { t: 0, v: 5.0 }).unwrap_err();
        assert_eq!(err, InterpolationError::DegenerateInterval(0));
        assert_eq!(value_at(0, Some(A), Some(Point { t: 0, v: 5.0 }), None), Some(1000.0));
        assert_eq!(value_at(10, Some(A), Some(Point { t: 0, v: 5.0 }), None), None);
    }

    #[test]
    fn outside_bracket_is_an_error() {
        assert!(matches!(
            interpolate(601, A, B),
            Err(InterpolationError::OutsideBracket { t: 601, .. })
        ));
    }

    #[test]
    fn missing_bracket_means_unavailable() {
        assert_eq!(value_at(300, None, Some(B), None), None);
        assert_eq!(value_at(300, Some(A), None, None), None);
        assert_eq!(value_at(300, Some(A), Some(B), None), Some(1100.0));
    }

    #[test]
    fn exact_match_needs_no_after_bracket() {
        assert_eq!(value_at(0, Some(A), None, None), Some(1000.0));
    }

    #[test]
    fn far_brackets_are_ignored_with_max_gap() {
        let near = Point { t: 3000, v: 10.0 };
        let after = Point { t: 4200, v: 20.0 };
        assert_eq!(value_at(3600, Some(near), Some(after), Some(3600)), Some(15.0));
        assert_eq!(value_at(3600, Some(Point { t: -1, v: 0.0 }), Some(after), Some(3600)), None);
        assert_eq!(value_at(3600, Some(near), Some(Point { t: 7201, v: 0.0 }), Some(3600)), None);
    }
}
