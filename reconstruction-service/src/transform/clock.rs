use std::fmt;

use time::OffsetDateTime;
use time_tz::{timezones, OffsetDateTimeExt, TimeZone, Tz};

/// The IANA zone every wall-clock decision is made in: upload date and time, tariff
/// hours, and the calendar date for sunrise. Daylight saving is resolved per instant.
#[derive(Clone, Copy)]
pub struct LocalZone(&'static Tz);

impl LocalZone {
    pub fn from_name(name: &str) -> Option<Self> {
        timezones::get_by_name(name).map(Self)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Wall-clock time at unix second `ts`.
    pub fn local(&self, ts: i64) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(ts)
            .ok()
            .map(|dt| dt.to_timezone(self.0))
    }

    /// UTC offset in seconds in force at `ts`.
    pub fn offset_secs_at(&self, ts: i64) -> Option<i32> {
        self.local(ts).map(|dt| dt.offset().whole_seconds())
    }
}

impl fmt::Debug for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalZone").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-15 01:00 UTC and 2024-06-15 02:00 UTC.
    const JANUARY: i64 = 1_705_280_400;
    const JUNE: i64 = 1_718_416_800;

    #[test]
    fn follows_daylight_saving() {
        let melbourne = LocalZone::from_name("Australia/Melbourne").unwrap();

        let summer = melbourne.local(JANUARY).unwrap();
        assert_eq!((summer.hour(), summer.minute()), (12, 0));
        assert_eq!(melbourne.offset_secs_at(JANUARY), Some(11 * 3600));

        let winter = melbourne.local(JUNE).unwrap();
        assert_eq!((winter.hour(), winter.minute()), (12, 0));
        assert_eq!(melbourne.offset_secs_at(JUNE), Some(10 * 3600));
    }

    #[test]
    fn zone_without_daylight_saving_is_fixed() {
        let brisbane = LocalZone::from_name("Australia/Brisbane").unwrap();
        assert_eq!(brisbane.offset_secs_at(JANUARY), Some(10 * 3600));
        assert_eq!(brisbane.offset_secs_at(JUNE), Some(10 * 3600));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        assert!(LocalZone::from_name("Mars/Olympus_Mons").is_none());
    }
}
