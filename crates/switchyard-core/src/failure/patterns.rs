//! Message patterns used to classify platform failures.
//!
//! Adapters that cannot supply a structured error category hand back a
//! message; these patterns map it onto an [`ErrorKind`](super::ErrorKind).
//! Non-retryable categories are checked first so that a message such as
//! "429: quota exceeded" is treated as terminal.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // =========================================================================
    // NON-RETRYABLE
    // =========================================================================

    /// Quota or billing exhaustion
    pub static ref QUOTA_PATTERN: Regex = Regex::new(
        r"(?i)(quota\s+(exceeded|exhausted)|insufficient\s+(credits?|quota|funds)|out\s+of\s+credits|billing|payment\s+required|\b402\b)"
    ).unwrap();

    /// Authorization failures
    pub static ref AUTH_PATTERN: Regex = Regex::new(
        r"(?i)(\b401\b|\b403\b|unauthori[sz]ed|forbidden|invalid\s+api\s+key|authentication\s+failed|permission\s+denied|not\s+logged\s+in)"
    ).unwrap();

    // =========================================================================
    // RETRYABLE
    // =========================================================================

    /// Rate limiting
    pub static ref RATE_LIMIT_PATTERN: Regex = Regex::new(
        r"(?i)(rate[\s_-]?limit(ed)?|too\s+many\s+requests|\b429\b|throttl(ed|ing))"
    ).unwrap();

    /// Timeouts
    pub static ref TIMEOUT_PATTERN: Regex = Regex::new(
        r"(?i)(timed?\s*out|timeout|deadline\s+exceeded|\b408\b)"
    ).unwrap();

    /// Server-side failures; captures the status code when present
    pub static ref SERVER_PATTERN: Regex = Regex::new(
        r"(?i)(\b(5\d\d)\b|internal\s+server\s+error|bad\s+gateway|service\s+unavailable|overloaded)"
    ).unwrap();

    /// Transport failures
    pub static ref CONNECTION_PATTERN: Regex = Regex::new(
        r"(?i)(connection\s+(refused|reset|closed|error|aborted)|network\s+(error|unreachable)|broken\s+pipe|dns\s+(error|failure)|could\s+not\s+connect)"
    ).unwrap();

    // =========================================================================
    // NON-RETRYABLE (checked last: generic wording)
    // =========================================================================

    /// Malformed requests
    pub static ref INVALID_REQUEST_PATTERN: Regex = Regex::new(
        r"(?i)(\b400\b|\b422\b|bad\s+request|malformed|invalid\s+request|validation\s+error|context\s+length\s+exceeded)"
    ).unwrap();
}

/// Extract a 5xx status code from a message.
pub fn server_status(message: &str) -> Option<u16> {
    SERVER_PATTERN
        .captures(message)
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_variants() {
        assert!(RATE_LIMIT_PATTERN.is_match("Rate limit reached"));
        assert!(RATE_LIMIT_PATTERN.is_match("HTTP 429"));
        assert!(RATE_LIMIT_PATTERN.is_match("rate_limited"));
        assert!(!RATE_LIMIT_PATTERN.is_match("generated 4290 tokens"));
    }

    #[test]
    fn test_server_status_capture() {
        assert_eq!(server_status("upstream returned 503"), Some(503));
        assert_eq!(server_status("Internal Server Error"), None);
        assert!(SERVER_PATTERN.is_match("Internal Server Error"));
    }

    #[test]
    fn test_auth_patterns() {
        assert!(AUTH_PATTERN.is_match("Invalid API key provided"));
        assert!(AUTH_PATTERN.is_match("403 Forbidden"));
        assert!(!AUTH_PATTERN.is_match("all good"));
    }

    #[test]
    fn test_timeout_does_not_match_durations() {
        assert!(TIMEOUT_PATTERN.is_match("request timed out after 30s"));
        assert!(!INVALID_REQUEST_PATTERN.is_match("took 400ms"));
    }
}
