//! MS-DOS date/time values.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A packed MS-DOS time and date, as stored in ZIP headers.
///
/// - Time: bits 0-4 = seconds/2, bits 5-10 = minutes, bits 11-15 = hours
/// - Date: bits 0-4 = day, bits 5-8 = month, bits 9-15 = year-1980
///
/// Conversions use UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// All-zero timestamp, written when timestamps are ignored.
    pub const ZERO: Self = Self { time: 0, date: 0 };

    /// The current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Pack a `SystemTime`. Times before 1980 clamp to 1980-01-01 00:00:00.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let days = (secs / 86400) as i64;
        let rem = secs % 86400;
        let (year, month, day) = civil_from_days(days);

        if year < 1980 {
            return Self {
                time: 0,
                date: (1 << 5) | 1,
            };
        }
        let year = year.min(1980 + 127);

        let hour = (rem / 3600) as u16;
        let minute = ((rem % 3600) / 60) as u16;
        let second = (rem % 60) as u16;

        Self {
            time: (hour << 11) | (minute << 5) | (second / 2),
            date: (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16,
        }
    }

    /// Convert back to a `SystemTime`.
    ///
    /// Returns None if the packed value is not a valid date.
    pub fn to_system_time(self) -> Option<SystemTime> {
        let year = 1980 + (self.date >> 9) as i32;
        let month = ((self.date >> 5) & 0x0F) as u32;
        let day = (self.date & 0x1F) as u32;
        let hour = (self.time >> 11) as u64;
        let minute = ((self.time >> 5) & 0x3F) as u64;
        let second = ((self.time & 0x1F) * 2) as u64;

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 {
            return None;
        }

        let mut days = 0u64;
        for y in 1970..year {
            days += if is_leap_year(y) { 366 } else { 365 };
        }

        const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        for m in 1..month {
            days += DAYS_IN_MONTH[(m - 1) as usize];
            if m == 2 && is_leap_year(year) {
                days += 1;
            }
        }
        days += (day - 1) as u64;

        let secs = days * 86400 + hour * 3600 + minute * 60 + second;
        UNIX_EPOCH.checked_add(Duration::from_secs(secs))
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Days since 1970-01-01 to (year, month, day).
fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = (yoe + era * 400 + i64::from(month <= 2)) as i32;
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_date() {
        // 2016-02-29 13:45:30 UTC
        let time = UNIX_EPOCH + Duration::from_secs(1_456_753_530);
        let dos = DosDateTime::from_system_time(time);

        assert_eq!(dos.date >> 9, 36);
        assert_eq!((dos.date >> 5) & 0x0F, 2);
        assert_eq!(dos.date & 0x1F, 29);
        assert_eq!(dos.time >> 11, 13);
        assert_eq!((dos.time >> 5) & 0x3F, 45);
        assert_eq!(dos.time & 0x1F, 15);

        assert_eq!(dos.to_system_time(), Some(time));
    }

    #[test]
    fn test_before_1980_clamps() {
        let dos = DosDateTime::from_system_time(UNIX_EPOCH);
        assert_eq!(dos.date, 0x21);
        assert_eq!(dos.time, 0);
    }

    #[test]
    fn test_zero_is_not_a_date() {
        assert_eq!(DosDateTime::ZERO.to_system_time(), None);
    }
}
