//! Retention budgets and the human-friendly strings they are written in.
//!
//! - durations: `7d`, `12h`, `1h30m`, `1.5h`, `2 weeks`, `500ms`; a bare number is milliseconds
//! - sizes: `500mb`, `1.5gb`, `100KiB`, `42`; units are binary multiples, a bare number is bytes
//! - file counts: a positive integer

use crate::{Error, Result};
use std::time::Duration;

/// Eviction budgets applied by the retention engine at shutdown.
///
/// Every field is optional; when all are `None` retention is a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Entries older than this are evicted
    pub max_age: Option<Duration>,
    /// At most this many entries are kept
    pub max_files: Option<usize>,
    /// Total stored bytes are brought under this budget
    pub max_size: Option<u64>,
}

impl RetentionPolicy {
    /// Parse a policy from the raw configuration strings.
    ///
    /// Blank strings count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first value that does not parse.
    pub fn parse(
        max_age: Option<&str>,
        max_files: Option<&str>,
        max_size: Option<&str>,
    ) -> Result<Self> {
        let max_age = present(max_age)
            .map(|raw| {
                parse_duration(raw).ok_or_else(|| invalid("max-age", raw, "e.g. 7d, 12h or 1h30m"))
            })
            .transpose()?;
        let max_files = present(max_files)
            .map(|raw| parse_count(raw).ok_or_else(|| invalid("max-files", raw, "e.g. 500")))
            .transpose()?;
        let max_size = present(max_size)
            .map(|raw| parse_size(raw).ok_or_else(|| invalid("max-size", raw, "e.g. 500mb or 2gb")))
            .transpose()?;

        Ok(Self {
            max_age,
            max_files,
            max_size,
        })
    }

    /// Whether no budget is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.max_age.is_none() && self.max_files.is_none() && self.max_size.is_none()
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(name: &str, raw: &str, example: &str) -> Error {
    Error::configuration_with_help(
        format!("Invalid {name} provided: '{raw}'"),
        format!("Use a positive value, {example}"),
    )
}

/// Parse a duration such as `7d`, `1h30m` or `250` (milliseconds).
///
/// Returns `None` for malformed input and for zero.
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let input = raw.trim().to_ascii_lowercase();
    if input.is_empty() {
        return None;
    }
    if let Ok(ms) = input.parse::<f64>() {
        return positive_secs(ms / 1000.0);
    }

    let mut total_secs = 0.0_f64;
    let mut rest = input.as_str();
    while !rest.is_empty() {
        rest = rest.trim_start();
        let (number, after_number) = take_number(rest)?;
        let after_number = after_number.trim_start();
        let unit_len = after_number
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_len);
        total_secs += number * duration_unit_secs(unit)?;
        rest = after_unit.trim_start_matches([' ', ',']);
    }
    positive_secs(total_secs)
}

fn duration_unit_secs(unit: &str) -> Option<f64> {
    let secs = match unit {
        "ms" | "msec" | "millisecond" | "milliseconds" => 0.001,
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "wk" | "wks" | "week" | "weeks" => 604_800.0,
        "y" | "yr" | "yrs" | "year" | "years" => 31_557_600.0,
        _ => return None,
    };
    Some(secs)
}

fn positive_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Parse a byte size such as `500mb`, `1.5 GiB` or `1048576`.
///
/// Returns `None` for malformed input and for zero.
#[must_use]
pub fn parse_size(raw: &str) -> Option<u64> {
    let input = raw.trim().to_ascii_lowercase();
    let (number, unit) = take_number(&input)?;
    let multiplier: u64 = match unit.trim() {
        "" | "b" | "byte" | "bytes" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        _ => return None,
    };
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let bytes = (number * multiplier as f64).round() as u64;
    (number.is_finite() && bytes > 0).then_some(bytes)
}

/// Parse a positive entry count.
#[must_use]
pub fn parse_count(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Split a leading non-negative decimal number off `input`.
fn take_number(input: &str) -> Option<(f64, &str)> {
    let end = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    let (number, rest) = input.split_at(end);
    number.parse::<f64>().ok().map(|n| (n, rest))
}
