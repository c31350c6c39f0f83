use regex::Regex;
use std::sync::OnceLock;

/// Wait suggested when the error text carries no usable delay.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 20;

/// Delays at or above one day are treated as garbage, not as a wait.
const MAX_RETRY_DELAY_SECS: f64 = 86_400.0;

/// Suggested wait in whole seconds before retrying a rate-limited call.
///
/// Patterns are tried in order (`retry in N s`, `retry_delay { seconds: N }`,
/// `Retry-After: N`); the first one whose number parses wins and is rounded
/// up as `floor(N + 1)`. Unparseable captures, and delays of a day or more,
/// fall through to the next pattern and finally to [`DEFAULT_RETRY_DELAY_SECS`].
pub fn extract_retry_delay(error_text: &str) -> u64 {
    for re in delay_patterns() {
        let Some(caps) = re.captures(error_text) else {
            continue;
        };
        match caps[1].parse::<f64>() {
            Ok(secs) if (0.0..MAX_RETRY_DELAY_SECS).contains(&secs) => {
                let wait = (secs + 1.0).floor() as u64;
                tracing::debug!(wait, "retry delay found in error text");
                return wait;
            }
            _ => continue,
        }
    }
    DEFAULT_RETRY_DELAY_SECS
}

/// True when the error text looks like an upstream quota or rate-limit rejection.
pub fn is_rate_limit_error(error_text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b429\b|quota|rate[ _-]?limit|RESOURCE_EXHAUSTED|할당량")
            .expect("valid regex")
    })
    .is_match(error_text)
}

fn delay_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)retry in\s+([0-9]+(?:\.[0-9]+)?)\s*s",
            r"(?is)retry_delay.*?seconds\s*:\s*([0-9][0-9.]*)",
            r"(?i)retry-after\s*:?\s*([0-9][0-9.]*)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_seconds_round_up() {
        let text = "429 You exceeded your current quota. Please retry in 19.94s.";
        assert_eq!(extract_retry_delay(text), 20);
    }

    #[test]
    fn whole_seconds_still_get_a_margin() {
        assert_eq!(extract_retry_delay("Please retry in 5s"), 6);
    }

    #[test]
    fn structured_retry_delay_block() {
        let text = "error details: retry_delay {\n  seconds: 19\n}";
        assert_eq!(extract_retry_delay(text), 20);
    }

    #[test]
    fn retry_after_header() {
        assert_eq!(extract_retry_delay("HTTP 429, Retry-After: 7"), 8);
    }

    #[test]
    fn no_delay_gives_default() {
        assert_eq!(extract_retry_delay("internal server error"), DEFAULT_RETRY_DELAY_SECS);
        assert_eq!(extract_retry_delay(""), 20);
    }

    #[test]
    fn absurd_delay_falls_back_to_default() {
        assert_eq!(extract_retry_delay("retry in 99999999999999999999s"), DEFAULT_RETRY_DELAY_SECS);
        assert_eq!(extract_retry_delay("Retry-After: 86400"), DEFAULT_RETRY_DELAY_SECS);
        assert_eq!(extract_retry_delay("Retry-After: 86398"), 86_399);
    }

    #[test]
    fn malformed_number_falls_through() {
        let text = "retry_delay { seconds: 1.2.3 } Retry-After: 4";
        assert_eq!(extract_retry_delay(text), 5);
        assert_eq!(extract_retry_delay("retry_delay { seconds: 1..5 }"), 20);
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limit_error("429 Too Many Requests"));
        assert!(is_rate_limit_error("Quota exceeded for metric"));
        assert!(is_rate_limit_error("status: RESOURCE_EXHAUSTED"));
        assert!(is_rate_limit_error("rate limit reached"));
        assert!(is_rate_limit_error("API 할당량을 초과했습니다"));
        assert!(!is_rate_limit_error("connection refused"));
    }
}
