//! Parsing of duration strings in the format the rest of the platform writes them, e.g. `60s`,
//! `1m30.5s` or `1.5h`.
//!
//! A duration is a sequence of decimal numbers, each with an optional fraction and a unit suffix.
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is the only number
//! allowed without a unit.

use std::time::Duration;

use snafu::{OptionExt, Snafu, ensure};

#[derive(Debug, Eq, PartialEq, Snafu)]
pub enum ParseDurationError {
    #[snafu(display("invalid duration {input:?}"))]
    InvalidDuration { input: String },

    #[snafu(display("missing unit in duration {input:?}"))]
    MissingUnit { input: String },

    #[snafu(display("unknown unit {unit:?} in duration {input:?}"))]
    UnknownUnit { unit: String, input: String },

    #[snafu(display("duration {input:?} is negative"))]
    Negative { input: String },

    #[snafu(display("duration {input:?} is out of range"))]
    OutOfRange { input: String },
}

/// Longest representable duration, in nanoseconds.
const MAX_NANOS: u128 = i64::MAX as u128;

/// Fraction digits beyond this do not change the result at nanosecond precision.
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

fn split_digits(input: &str) -> (&str, &str) {
    input.split_at(
        input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len()),
    )
}

/// Parses `input` into a [`Duration`], truncating to whole nanoseconds.
///
/// A leading `+` is accepted. A leading `-` is only accepted for a zero duration.
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let (negative, mut rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    ensure!(!rest.is_empty(), InvalidDurationSnafu { input });

    let mut nanos: u128 = 0;
    while !rest.is_empty() {
        let (whole, after_whole) = split_digits(rest);
        let (fraction, after_number) = match after_whole.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after_whole),
        };
        ensure!(
            !whole.is_empty() || !fraction.is_empty(),
            InvalidDurationSnafu { input }
        );

        let (unit, next) = after_number.split_at(
            after_number
                .find(|c: char| c == '.' || c.is_ascii_digit())
                .unwrap_or(after_number.len()),
        );
        ensure!(!unit.is_empty(), MissingUnitSnafu { input });
        let scale = unit_nanos(unit).context(UnknownUnitSnafu { unit, input })?;

        let whole = match whole {
            "" => 0,
            digits => digits
                .parse::<u128>()
                .ok()
                .context(OutOfRangeSnafu { input })?,
        };
        let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
        let fraction_nanos = match fraction {
            "" => 0,
            digits => {
                let value = digits
                    .parse::<u128>()
                    .ok()
                    .context(InvalidDurationSnafu { input })?;
                value * scale / 10u128.pow(digits.len() as u32)
            }
        };

        nanos = whole
            .checked_mul(scale)
            .and_then(|whole_nanos| whole_nanos.checked_add(fraction_nanos))
            .and_then(|fragment| nanos.checked_add(fragment))
            .filter(|total| *total <= MAX_NANOS)
            .context(OutOfRangeSnafu { input })?;
        rest = next;
    }

    ensure!(!negative || nanos == 0, NegativeSnafu { input });

    let nanos = u64::try_from(nanos).ok().context(OutOfRangeSnafu { input })?;
    Ok(Duration::from_nanos(nanos))
}
