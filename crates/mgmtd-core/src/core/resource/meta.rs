use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recognised meta-parameters every resource carries regardless of kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaParams {
    pub auto_edge: bool,
    pub auto_group: bool,
    pub noop: bool,
    /// -1 means infinite retries.
    pub retry: i64,
    #[serde(with = "duration_ms")]
    pub delay: Duration,
}

impl Default for MetaParams {
    fn default() -> Self {
        Self {
            auto_edge: true,
            auto_group: true,
            noop: false,
            retry: 0,
            delay: Duration::from_millis(0),
        }
    }
}

impl MetaParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.retry < -1 {
            return Err(format!("retry must be >= -1, got {}", self.retry));
        }
        Ok(())
    }

    /// Whether `attempt` (1-indexed) is still within the retry budget.
    pub fn may_retry(&self, attempt: u64) -> bool {
        self.retry < 0 || attempt <= self.retry as u64
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_below_minus_one_is_invalid() {
        let meta = MetaParams {
            retry: -2,
            ..Default::default()
        };
        assert!(meta.validate().is_err());
    }

    #[test]
    fn infinite_retry_always_allows_another_attempt() {
        let meta = MetaParams {
            retry: -1,
            ..Default::default()
        };
        assert!(meta.may_retry(1_000_000));
    }

    #[test]
    fn bounded_retry_respects_budget() {
        let meta = MetaParams {
            retry: 3,
            ..Default::default()
        };
        assert!(meta.may_retry(3));
        assert!(!meta.may_retry(4));
    }
}
