//! Go-style duration notation (`1.5s`, `1m30s`, `250ms`).
//!
//! The `--interval` flag and every elapsed value printed on stdout use this
//! notation so that operator tooling written against other probe builds keeps
//! matching the status lines.

use chrono::TimeDelta;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// One `<number><unit>` group. Digits are ASCII only.
static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]*)(?:\.([0-9]*))?(ns|us|µs|μs|ms|s|m|h)").unwrap());

/// Errors from parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    Empty,
    /// Text does not follow the `<number><unit>` grammar.
    Invalid { text: String },
    /// Value does not fit in 64 bits of nanoseconds.
    Overflow { text: String },
}

impl std::fmt::Display for DurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurationError::Empty => write!(f, "empty duration"),
            DurationError::Invalid { text } => {
                write!(f, "invalid duration {text:?} (expected e.g. 5s, 1m30s, 250ms)")
            }
            DurationError::Overflow { text } => write!(f, "duration {text:?} is too large"),
        }
    }
}

impl std::error::Error for DurationError {}

fn unit_nanos(unit: &str) -> u128 {
    match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        _ => 3_600 * NANOS_PER_SEC,
    }
}

/// Parse a duration such as `5s`, `1.5m` or `1h2m3.25s`.
///
/// A bare `0` is accepted; any other number needs a unit.
pub fn parse(text: &str) -> Result<Duration, DurationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || DurationError::Invalid {
        text: text.to_string(),
    };
    let overflow = || DurationError::Overflow {
        text: text.to_string(),
    };

    let mut rest = trimmed;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let caps = COMPONENT.captures(rest).ok_or_else(invalid)?;
        let whole = caps.get(1).map_or("", |m| m.as_str());
        let frac = caps.get(2).map_or("", |m| m.as_str());
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        let unit = unit_nanos(&caps[3]);

        let whole_value: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        total = whole_value
            .checked_mul(unit)
            .and_then(|n| total.checked_add(n))
            .ok_or_else(overflow)?;

        // Digits finer than a nanosecond are dropped.
        let mut scale = unit;
        for digit in frac.bytes() {
            scale /= 10;
            if scale == 0 {
                break;
            }
            total += u128::from(digit - b'0') * scale;
        }

        rest = &rest[caps[0].len()..];
    }

    let nanos = u64::try_from(total).map_err(|_| overflow())?;
    Ok(Duration::from_nanos(nanos))
}

/// Render a signed nanosecond count the way Go's `Duration.String()` does.
pub fn format_nanos(nanos: i128) -> String {
    let u = nanos.unsigned_abs();
    let mut out = if u < NANOS_PER_SEC {
        match u {
            0 => return "0s".to_string(),
            1..=999 => format!("{u}ns"),
            1_000..=999_999 => format!("{}µs", scaled(u, 3)),
            _ => format!("{}ms", scaled(u, 6)),
        }
    } else {
        let secs = u / NANOS_PER_SEC;
        let mut s = format!("{}{}s", secs % 60, fraction(u % NANOS_PER_SEC, 9));
        let mins = secs / 60;
        if mins > 0 {
            s = format!("{}m{s}", mins % 60);
            let hours = mins / 60;
            if hours > 0 {
                s = format!("{hours}h{s}");
            }
        }
        s
    };
    if nanos < 0 {
        out.insert(0, '-');
    }
    out
}

/// Render an unsigned duration.
pub fn format(duration: Duration) -> String {
    format_nanos(i128::try_from(duration.as_nanos()).unwrap_or(i128::MAX))
}

/// Render a signed chrono delta (negative when the marker is in the future).
pub fn format_delta(delta: TimeDelta) -> String {
    let nanos = i128::from(delta.num_seconds()) * NANOS_PER_SEC as i128
        + i128::from(delta.subsec_nanos());
    format_nanos(nanos)
}

fn scaled(value: u128, precision: u32) -> String {
    let divisor = 10u128.pow(precision);
    format!(
        "{}{}",
        value / divisor,
        fraction(value % divisor, precision)
    )
}

/// `.5` for 500 at precision 3; empty when there is no remainder.
fn fraction(remainder: u128, precision: u32) -> String {
    if remainder == 0 {
        return String::new();
    }
    let digits = format!("{remainder:0width$}", width = precision as usize);
    format!(".{}", digits.trim_end_matches('0'))
}
