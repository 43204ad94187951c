//! Sunrise and sunset from the standard sunrise equation.
//!
//! Accurate to a minute or two at moderate latitudes, which is plenty for a
//! plausibility check padded by a whole reconstruction interval.

use time::Date;

const J2000: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const AXIAL_TILT_DEG: f64 = 23.4397;
/// Refraction plus the solar disc radius.
const HORIZON_DEG: f64 = -0.833;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    /// Unix seconds.
    pub sunrise: i64,
    pub sunset: i64,
}

/// Sunrise and sunset for `date` at a location (`longitude` degrees east).
///
/// `None` during polar day or polar night.
pub fn sun_times(date: Date, latitude: f64, longitude: f64) -> Option<SunTimes> {
    let n = (date.to_julian_day() as f64) - J2000 + 0.0008;
    let mean_solar_time = n - longitude / 360.0;

    let anomaly = (357.5291 + 0.985_600_28 * mean_solar_time).rem_euclid(360.0);
    let m = anomaly.to_radians();
    let center = 1.9148 * m.sin() + 0.0200 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin();
    let ecliptic_longitude = (anomaly + center + 180.0 + 102.9372).rem_euclid(360.0).to_radians();

    let transit = J2000 + mean_solar_time + 0.0053 * m.sin() - 0.0069 * (2.0 * ecliptic_longitude).sin();

    let sin_decl = ecliptic_longitude.sin() * AXIAL_TILT_DEG.to_radians().sin();
    let cos_decl = sin_decl.asin().cos();
    let phi = latitude.to_radians();

    let cos_hour_angle =
        (HORIZON_DEG.to_radians().sin() - phi.sin() * sin_decl) / (phi.cos() * cos_decl);
    if !(-1.0..=1.0).contains(&cos_hour_angle) {
        return None;
    }
    let hour_angle = cos_hour_angle.acos().to_degrees();

    let to_unix = |jd: f64| ((jd - UNIX_EPOCH_JD) * 86_400.0).round() as i64;
    Some(SunTimes {
        sunrise: to_unix(transit - hour_angle / 360.0),
        sunset: to_unix(transit + hour_angle / 360.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const BRISBANE: (f64, f64) = (-27.47, 153.03);

    fn assert_close(actual: i64, expected: i64) {
        assert!(
            (actual - expected).abs() <= 120,
            "expected {expected} +/- 120s, got {actual}"
        );
    }

    #[test]
    fn brisbane_winter_solstice() {
        // 06:38 and 17:02 AEST
        let sun = sun_times(date!(2024 - 06 - 21), BRISBANE.0, BRISBANE.1).unwrap();
        assert_close(sun.sunrise, 1_718_915_920);
        assert_close(sun.sunset, 1_718_953_370);
    }

    #[test]
    fn brisbane_summer_solstice() {
        // 04:50 and 18:43 AEST
        let sun = sun_times(date!(2024 - 12 - 21), BRISBANE.0, BRISBANE.1).unwrap();
        assert_close(sun.sunrise, 1_734_720_643);
        assert_close(sun.sunset, 1_734_770_600);
        assert!(sun.sunset - sun.sunrise > 13 * 3600);
    }

    #[test]
    fn polar_night_and_day_have_no_sunrise() {
        assert_eq!(sun_times(date!(2024 - 12 - 21), 80.0, 15.0), None);
        assert_eq!(sun_times(date!(2024 - 06 - 21), 80.0, 15.0), None);
    }
}
