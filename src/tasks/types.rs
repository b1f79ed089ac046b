use std::time::Duration;

/// How often the job monitor polls every user's feed.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Upper bounds for each external call made while processing a feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub feed: Duration,
    pub generation: Duration,
    pub send: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            feed: Duration::from_secs(30),
            generation: Duration::from_secs(60),
            send: Duration::from_secs(30),
        }
    }
}
