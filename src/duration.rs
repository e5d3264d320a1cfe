//! Duration-symbol parsing and tick arithmetic.
//!
//! Converts duration notations (`1n`, `2n`, `4n.`, `8t`, plain fractional
//! beats) into integer ticks at a given PPQ (pulses per quarter note).
//! Parsing is total over every recognized token; anything else fails with
//! [`DurationError::BadDuration`] naming the offending token.

use thiserror::Error;

use crate::error::ErrorCode;

/// Error returned when a duration token cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// The token did not match any recognized duration grammar.
    #[error("bad duration token '{token}'")]
    BadDuration { token: String },
}

impl ErrorCode for DurationError {
    fn code(&self) -> &'static str {
        match self {
            DurationError::BadDuration { .. } => "DUR_001",
        }
    }

    fn category(&self) -> &'static str {
        "duration"
    }
}

/// Convert a duration token to a fractional beat count.
///
/// Recognized grammar:
/// - `Nn` - a plain note value, e.g. `1n` (whole note) through `64n`
/// - `Nn.` - a dotted note value, worth 1.5x the plain value
/// - `Nt` - a triplet note value, worth 2/3 the plain value
/// - a bare number - a beat count directly, e.g. `1.5` or `2`
///
/// `N` must be a power of two for the `n`/`t` forms (`1`, `2`, `4`, `8`, `16`,
/// `32`, `64`). Whitespace around the token is ignored.
fn beats_for_token(token: &str) -> Result<f64, DurationError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(DurationError::BadDuration {
            token: token.to_string(),
        });
    }

    if let Some(rest) = trimmed.strip_suffix('n') {
        let (denom_str, dotted) = match rest.strip_suffix('.') {
            Some(d) => (d, true),
            None => (rest, false),
        };
        let denom: u32 = denom_str.parse().map_err(|_| DurationError::BadDuration {
            token: token.to_string(),
        })?;
        if denom == 0 || !denom.is_power_of_two() {
            return Err(DurationError::BadDuration {
                token: token.to_string(),
            });
        }
        let base = 4.0 / denom as f64;
        return Ok(if dotted { base * 1.5 } else { base });
    }

    if let Some(rest) = trimmed.strip_suffix('t') {
        let denom: u32 = rest.parse().map_err(|_| DurationError::BadDuration {
            token: token.to_string(),
        })?;
        if denom == 0 || !denom.is_power_of_two() {
            return Err(DurationError::BadDuration {
                token: token.to_string(),
            });
        }
        let base = 4.0 / denom as f64;
        return Ok(base * (2.0 / 3.0));
    }

    trimmed.parse::<f64>().map_err(|_| DurationError::BadDuration {
        token: token.to_string(),
    })
}

/// Convert a duration token to integer ticks at the given PPQ.
///
/// `ticks = round(beats * ppq)`. `ppq` must be at least 1; callers are
/// expected to validate that separately (PPQ is a compiler-wide parameter,
/// not part of the token grammar).
pub fn ticks_for_duration(token: &str, ppq: u32) -> Result<u32, DurationError> {
    let beats = beats_for_token(token)?;
    let ticks = (beats * ppq as f64).round();
    if !ticks.is_finite() || ticks < 0.0 {
        return Err(DurationError::BadDuration {
            token: token.to_string(),
        });
    }
    Ok(ticks as u32)
}
