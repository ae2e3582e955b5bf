//! Signed elapsed-time strings such as `"1h30m0s"`.
//!
//! The summary collector expects parking durations in this compact form, the
//! same representation produced by Go's `time.Duration`:
//!
//! | nanoseconds            | rendered       |
//! |------------------------|----------------|
//! | `0`                    | `0s`           |
//! | `999`                  | `999ns`        |
//! | `1_500`                | `1.5µs`        |
//! | `250_000_000`          | `250ms`        |
//! | `1_500_000_000`        | `1.5s`         |
//! | `5_400_000_000_000`    | `1h30m0s`      |
//! | `-120_000_000_000`     | `-2m0s`        |
//!
//! Values are held as whole nanoseconds in an `i64`, so anything rendered by
//! [`ParkingDuration`]'s `Display` parses back to the identical value.

use chrono::TimeDelta;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use thiserror::Error;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;

/// Errors from parsing a duration string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    /// The input was empty or had no number where one was expected.
    #[error("invalid duration {0:?}")]
    Invalid(String),

    /// A number was followed by no unit.
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    /// The unit is not one of `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`.
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit {
        /// The offending unit
        unit: String,
        /// The full input
        input: String,
    },

    /// The value does not fit in 64-bit nanoseconds.
    #[error("duration {0:?} out of range")]
    Overflow(String),
}

/// Signed elapsed time with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ParkingDuration {
    nanos: i64,
}

impl ParkingDuration {
    /// The zero duration.
    pub const ZERO: Self = Self { nanos: 0 };

    /// Build from a nanosecond count.
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    /// Nanosecond count.
    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.nanos
    }

    /// Whether the duration is strictly negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.nanos < 0
    }

    /// Convert from a chrono delta.
    ///
    /// Returns `None` if the delta does not fit in 64-bit nanoseconds
    /// (roughly ±292 years).
    #[must_use]
    pub fn from_time_delta(delta: TimeDelta) -> Option<Self> {
        delta.num_nanoseconds().map(Self::from_nanos)
    }

    /// Convert to a chrono delta.
    #[must_use]
    pub const fn to_time_delta(self) -> TimeDelta {
        TimeDelta::nanoseconds(self.nanos)
    }
}

/// Append `value` as `int[.frac]` where the fractional part has `precision`
/// digits with trailing zeros dropped.
fn write_scaled(out: &mut String, value: u64, precision: u32) -> fmt::Result {
    let scale = 10u64.pow(precision);
    let whole = value / scale;
    let frac = value % scale;
    write!(out, "{whole}")?;
    if frac != 0 {
        let digits = format!("{frac:0width$}", width = precision as usize);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    Ok(())
}

impl fmt::Display for ParkingDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.nanos.unsigned_abs();
        let mut out = String::with_capacity(24);

        if self.nanos < 0 {
            out.push('-');
        }

        if magnitude == 0 {
            out.push_str("0s");
        } else if magnitude < NANOS_PER_MICRO {
            write!(out, "{magnitude}ns")?;
        } else if magnitude < NANOS_PER_MILLI {
            write_scaled(&mut out, magnitude, 3)?;
            out.push_str("µs");
        } else if magnitude < NANOS_PER_SECOND {
            write_scaled(&mut out, magnitude, 6)?;
            out.push_str("ms");
        } else {
            let hours = magnitude / NANOS_PER_HOUR;
            let minutes = magnitude / NANOS_PER_MINUTE;
            if hours > 0 {
                write!(out, "{hours}h")?;
            }
            if minutes > 0 {
                write!(out, "{}m", minutes % 60)?;
            }
            write_scaled(&mut out, magnitude % NANOS_PER_MINUTE, 9)?;
            out.push('s');
        }

        f.write_str(&out)
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => NANOS_PER_MICRO,
        "ms" => NANOS_PER_MILLI,
        "s" => NANOS_PER_SECOND,
        "m" => NANOS_PER_MINUTE,
        "h" => NANOS_PER_HOUR,
        _ => return None,
    };
    Some(u128::from(nanos))
}

impl FromStr for ParkingDuration {
    type Err = DurationParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (negative, mut rest) = match input.as_bytes().first() {
            Some(b'-') => (true, &input[1..]),
            Some(b'+') => (false, &input[1..]),
            _ => (false, input),
        };

        if rest == "0" {
            return Ok(Self::ZERO);
        }
        if rest.is_empty() {
            return Err(DurationParseError::Invalid(input.to_string()));
        }

        // Accumulate in u128 so intermediate products cannot wrap.
        let mut total: u128 = 0;
        let limit = if negative {
            u128::from(i64::MIN.unsigned_abs())
        } else {
            u128::from(i64::MAX.unsigned_abs())
        };
        let overflow = || DurationParseError::Overflow(input.to_string());

        while !rest.is_empty() {
            let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            let (int_digits, after_int) = rest.split_at(int_len);

            let (frac_digits, after_number) = match after_int.strip_prefix('.') {
                Some(after_dot) => {
                    let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                    after_dot.split_at(frac_len)
                }
                None => ("", after_int),
            };

            if int_digits.is_empty() && frac_digits.is_empty() {
                return Err(DurationParseError::Invalid(input.to_string()));
            }

            let unit_len = after_number
                .char_indices()
                .find(|(_, c)| *c == '.' || c.is_ascii_digit())
                .map_or(after_number.len(), |(idx, _)| idx);
            let (unit, remainder) = after_number.split_at(unit_len);
            if unit.is_empty() {
                return Err(DurationParseError::MissingUnit(input.to_string()));
            }
            let per_unit = unit_nanos(unit).ok_or_else(|| DurationParseError::UnknownUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

            let whole: u128 = if int_digits.is_empty() {
                0
            } else {
                int_digits.parse().map_err(|_| overflow())?
            };
            let mut value = whole.checked_mul(per_unit).ok_or_else(overflow)?;

            // Even for hours, digits past the 20th are below one nanosecond.
            let frac_digits = &frac_digits[..frac_digits.len().min(20)];
            if !frac_digits.is_empty() {
                let frac: u128 = frac_digits.parse().map_err(|_| overflow())?;
                #[allow(clippy::cast_possible_truncation)]
                let scale = 10u128.pow(frac_digits.len() as u32);
                value = value
                    .checked_add(frac.checked_mul(per_unit).ok_or_else(overflow)? / scale)
                    .ok_or_else(overflow)?;
            }

            total = total.checked_add(value).ok_or_else(overflow)?;
            if total > limit {
                return Err(overflow());
            }
            rest = remainder;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let nanos = if negative {
            // `total <= 2^63`; wrapping negation maps 2^63 onto i64::MIN.
            (total as u64).wrapping_neg() as i64
        } else {
            total as i64
        };
        Ok(Self::from_nanos(nanos))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn render(nanos: i64) -> String {
        ParkingDuration::from_nanos(nanos).to_string()
    }

    #[test]
    fn formats_like_elapsed_time() {
        assert_eq!(render(0), "0s");
        assert_eq!(render(1), "1ns");
        assert_eq!(render(999), "999ns");
        assert_eq!(render(1_500), "1.5µs");
        assert_eq!(render(1_000_000), "1ms");
        assert_eq!(render(250_000_000), "250ms");
        assert_eq!(render(1_000_000_000), "1s");
        assert_eq!(render(1_500_000_000), "1.5s");
        assert_eq!(render(90 * 1_000_000_000), "1m30s");
        assert_eq!(render(3_600 * 1_000_000_000), "1h0m0s");
        assert_eq!(render(5_400 * 1_000_000_000), "1h30m0s");
        assert_eq!(render(3_723 * 1_000_000_000), "1h2m3s");
        assert_eq!(render(30 * 24 * 3_600 * 1_000_000_000), "720h0m0s");
        assert_eq!(render(-120 * 1_000_000_000), "-2m0s");
        assert_eq!(render(-1), "-1ns");
    }

    #[test]
    fn formats_extremes() {
        assert_eq!(render(i64::MAX), "2562047h47m16.854775807s");
        assert_eq!(render(i64::MIN), "-2562047h47m16.854775808s");
    }

    #[test]
    fn parses_mixed_units() {
        let cases = [
            ("0", 0),
            ("-0", 0),
            ("1h30m", 5_400_000_000_000),
            ("1h30m0s", 5_400_000_000_000),
            ("1.5s", 1_500_000_000),
            (".5s", 500_000_000),
            ("1.5µs", 1_500),
            ("1.5us", 1_500),
            ("300ms", 300_000_000),
            ("-2m0s", -120_000_000_000),
            ("+45s", 45_000_000_000),
            ("1h1h", 7_200_000_000_000),
        ];
        for (input, nanos) in cases {
            let parsed: ParkingDuration = input.parse().unwrap();
            assert_eq!(parsed.as_nanos(), nanos, "input {input:?}");
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!("".parse::<ParkingDuration>(), Err(DurationParseError::Invalid(_))));
        assert!(matches!("-".parse::<ParkingDuration>(), Err(DurationParseError::Invalid(_))));
        assert!(matches!("12".parse::<ParkingDuration>(), Err(DurationParseError::MissingUnit(_))));
        assert!(matches!(".s".parse::<ParkingDuration>(), Err(DurationParseError::Invalid(_))));
        assert!(matches!(
            "3d".parse::<ParkingDuration>(),
            Err(DurationParseError::UnknownUnit { .. })
        ));
        assert!(matches!(
            "9999999999h".parse::<ParkingDuration>(),
            Err(DurationParseError::Overflow(_))
        ));
    }

    #[test]
    fn min_value_parses() {
        let parsed: ParkingDuration = "-2562047h47m16.854775808s".parse().unwrap();
        assert_eq!(parsed.as_nanos(), i64::MIN);
        assert!("2562047h47m16.854775808s".parse::<ParkingDuration>().is_err());
    }

    #[test]
    fn converts_through_time_delta() {
        let delta = TimeDelta::minutes(90);
        let duration = ParkingDuration::from_time_delta(delta).unwrap();
        assert_eq!(duration.to_string(), "1h30m0s");
        assert_eq!(duration.to_time_delta(), delta);
        assert!(ParkingDuration::from_time_delta(TimeDelta::MAX).is_none());
    }

    proptest! {
        #[test]
        fn rendered_durations_parse_back(nanos in any::<i64>()) {
            let duration = ParkingDuration::from_nanos(nanos);
            let parsed: ParkingDuration = duration.to_string().parse().unwrap();
            prop_assert_eq!(parsed, duration);
        }
    }
}
