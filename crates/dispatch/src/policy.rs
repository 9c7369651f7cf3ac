use std::time::Duration;

/// How long and how often a single outbound send may try the provider.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Hard ceiling on one provider call. A stuck call becomes a failed
    /// delivery instead of a message stuck in `sending`.
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded retry for transient transport failures within one send. Off by
/// default; never applies across sends (a failed message stays failed).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt after that.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Attempts a send is allowed, at least one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}
