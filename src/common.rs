use rand::Rng;
use rand::rngs::OsRng;
use std::time::Duration;

/// Browser identifiers rotated across requests
pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36 OPR/119.0.0.0 (Edition cdf)",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36 Edg/134.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0",
];

pub fn random_user_agent() -> &'static str {
    let mut rng = OsRng;
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}

/// Format a remaining window as `{h}h {m}m {s}s`.
///
/// Partial seconds round up, so a freshly opened one-hour window reads
/// `1h 0m 0s` and the display only reaches zero when the window closes.
pub fn format_countdown(remaining: Duration) -> String {
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::from_secs(3600)), "1h 0m 0s");
        assert_eq!(format_countdown(Duration::from_millis(3_599_990)), "1h 0m 0s");
        assert_eq!(format_countdown(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_countdown(Duration::from_secs(59)), "0h 0m 59s");
        assert_eq!(format_countdown(Duration::ZERO), "0h 0m 0s");
    }

    #[test]
    fn test_random_user_agent_from_pool() {
        for _ in 0..32 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }
}
