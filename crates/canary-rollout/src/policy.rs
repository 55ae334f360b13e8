//! Rollout policy parsing.
//!
//! A `CanaryDeploy` declares `duration` and `rateOfChange` as free-form
//! strings. They are validated here so malformed values surface in the
//! logs, but the actuator does not pace itself by them: every pass moves a
//! baseline straight to its target replica count.

use std::time::Duration;

use canary_core::RolloutPolicy;

use crate::error::{RolloutError, RolloutResult};

/// A validated rollout policy. Empty fields stay `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsedPolicy {
    pub duration: Option<Duration>,
    /// Percentage of capacity to shift per step (1-100).
    pub rate_percent: Option<u32>,
}

impl ParsedPolicy {
    pub fn parse(policy: &RolloutPolicy) -> RolloutResult<Self> {
        let duration = match policy.duration.trim() {
            "" => None,
            s => Some(parse_duration(s)?),
        };
        let rate_percent = match policy.rate_of_change.trim() {
            "" => None,
            s => Some(parse_rate(s)?),
        };
        Ok(Self {
            duration,
            rate_percent,
        })
    }
}

/// Parse a duration string like "30s", "5m", "1h" or plain seconds.
fn parse_duration(s: &str) -> RolloutResult<Duration> {
    let invalid = || RolloutError::InvalidPolicy(format!("unparseable duration {s:?}"));
    let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => s.split_at(i),
        None => (s, "s"),
    };
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };
    let secs = n.checked_mul(scale).ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

/// Parse a rate like "10%" or "10" into a percentage.
fn parse_rate(s: &str) -> RolloutResult<u32> {
    let digits = s.strip_suffix('%').unwrap_or(s).trim();
    match digits.parse::<u32>() {
        Ok(n) if (1..=100).contains(&n) => Ok(n),
        _ => Err(RolloutError::InvalidPolicy(format!(
            "rateOfChange {s:?} must be a percentage between 1 and 100"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(duration: &str, rate: &str) -> RolloutPolicy {
        RolloutPolicy {
            duration: duration.to_string(),
            rate_of_change: rate.to_string(),
        }
    }

    #[test]
    fn empty_policy_parses_to_none() {
        let parsed = ParsedPolicy::parse(&RolloutPolicy::default()).unwrap();
        assert_eq!(parsed, ParsedPolicy::default());
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("9999999999999999h").is_err());
        assert!(parse_duration("99999999999999999999").is_err());
        assert_eq!(
            parse_duration("5124095576030431h").unwrap(),
            Duration::from_secs(5124095576030431 * 3600)
        );
    }

    #[test]
    fn parses_rates() {
        let parsed = ParsedPolicy::parse(&policy("10m", "25%")).unwrap();
        assert_eq!(parsed.duration, Some(Duration::from_secs(600)));
        assert_eq!(parsed.rate_percent, Some(25));
        assert_eq!(parse_rate("100").unwrap(), 100);
        assert!(parse_rate("0%").is_err());
        assert!(parse_rate("150%").is_err());
        assert!(parse_rate("fast").is_err());
    }
}
