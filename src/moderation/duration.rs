use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Longest mute the bot accepts
pub const MAX_MUTE: Duration = Duration::from_secs(28 * 24 * 60 * 60);

static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhdw])$").expect("duration pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("Invalid duration `{0}`. Use a number followed by s, m, h, d or w (e.g. 10m, 2h, 1d)")]
    Malformed(String),

    #[error("Duration cannot be longer than 28 days")]
    TooLong,
}

/// Parse `<amount><unit>` where unit is one of `s m h d w`
///
/// # Errors
/// Returns [`DurationError::Malformed`] for anything else, including a zero amount,
/// and [`DurationError::TooLong`] past [`MAX_MUTE`].
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let input = input.trim().to_ascii_lowercase();
    let captures = DURATION_PATTERN
        .captures(&input)
        .ok_or_else(|| DurationError::Malformed(input.clone()))?;

    let amount: u64 = captures[1]
        .parse()
        .map_err(|_| DurationError::TooLong)?;
    if amount == 0 {
        return Err(DurationError::Malformed(input));
    }
    let unit = match &captures[2] {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return Err(DurationError::Malformed(input)),
    };

    let seconds = amount.checked_mul(unit).ok_or(DurationError::TooLong)?;
    let duration = Duration::from_secs(seconds);
    if duration > MAX_MUTE {
        return Err(DurationError::TooLong);
    }
    Ok(duration)
}

/// Short human form, e.g. `1d 2h 5m`
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let mut remaining = duration.as_secs();
    let mut parts = Vec::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        let amount = remaining / size;
        if amount > 0 {
            parts.push(format!("{amount}{unit}"));
            remaining %= size;
        }
    }
    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7_200)));
        assert_eq!(parse_duration("1D"), Ok(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("4w"), Ok(MAX_MUTE));
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(matches!(parse_duration("10"), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration("m10"), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration("10y"), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration("0m"), Err(DurationError::Malformed(_))));
        assert!(matches!(parse_duration(""), Err(DurationError::Malformed(_))));
    }

    #[test]
    fn test_rejects_more_than_28_days() {
        assert_eq!(parse_duration("29d"), Err(DurationError::TooLong));
        assert_eq!(parse_duration("5w"), Err(DurationError::TooLong));
        assert_eq!(
            parse_duration("99999999999999999999999s"),
            Err(DurationError::TooLong)
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(93_900)), "1d 2h 5m");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
