use std::fmt;

use serde::{Serialize, Serializer};

/// Seconds since the start of the service day. GTFS allows hours beyond 23 for trips running past
/// midnight, so this isn't a wall-clock time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(u32);

impl Time {
    pub fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    pub fn inner_seconds(self) -> u32 {
        self.0
    }

    /// Parses `HH:MM:SS`. Minutes and seconds aren't range-checked. Anything else, including an
    /// empty string, gives `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mut parts = raw.split(':');
        let hours = parse_part(parts.next())?;
        let minutes = parse_part(parts.next())?;
        let seconds = parse_part(parts.next())?;
        if parts.next().is_some() {
            return None;
        }
        hours
            .checked_mul(3600)?
            .checked_add(minutes.checked_mul(60)?)?
            .checked_add(seconds)
            .map(Self)
    }

    /// The signed gap from `earlier` to `self`, in seconds.
    pub fn seconds_since(self, earlier: Time) -> i64 {
        i64::from(self.0) - i64::from(earlier.0)
    }
}

fn parse_part(part: Option<&str>) -> Option<u32> {
    let part = part?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

pub fn parse_time(raw: &str) -> Option<u32> {
    Time::parse(raw).map(Time::inner_seconds)
}

pub fn format_seconds(seconds: u32) -> String {
    Time::from_seconds(seconds).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        assert_eq!(parse_time("08:00:00"), Some(28800));
        assert_eq!(parse_time("00:00:00"), Some(0));
        assert_eq!(parse_time("7:50:00"), Some(7 * 3600 + 50 * 60));
        assert_eq!(parse_time(" 08:15:30 "), Some(8 * 3600 + 15 * 60 + 30));
    }

    #[test]
    fn parse_after_midnight() {
        assert_eq!(parse_time("24:10:00"), Some(24 * 3600 + 600));
        assert_eq!(parse_time("47:59:59"), Some(47 * 3600 + 59 * 60 + 59));
    }

    #[test]
    fn parse_malformed() {
        for raw in ["bad", "", "12:30", "12:30:00:00", "a:b:c", "12::00", "-1:00:00", "1:2:x"] {
            assert_eq!(parse_time(raw), None, "{raw:?} should not parse");
        }
    }

    #[test]
    fn format_pads_and_keeps_large_hours() {
        assert_eq!(format_seconds(0), "00:00:00");
        assert_eq!(format_seconds(28800 + 65), "08:01:05");
        assert_eq!(format_seconds(25 * 3600 + 1), "25:00:01");
    }

    #[test]
    fn round_trip_through_two_days() {
        for hours in 0..48 {
            for (minutes, seconds) in [(0, 0), (1, 59), (30, 7), (59, 59)] {
                let n = hours * 3600 + minutes * 60 + seconds;
                assert_eq!(parse_time(&format_seconds(n)), Some(n));
            }
        }
    }

    #[test]
    fn seconds_since_can_go_negative() {
        let a = Time::parse("08:00:00").unwrap();
        let b = Time::parse("08:15:00").unwrap();
        assert_eq!(b.seconds_since(a), 900);
        assert_eq!(a.seconds_since(b), -900);
    }
}
