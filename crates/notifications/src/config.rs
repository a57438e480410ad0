use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::preferences::QuietHoursPolicy;

/// Tunables for routing and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Bound of the dispatch queue; `notify` waits when it is full.
    pub queue_capacity: usize,

    /// Upper bound for a single channel send.
    pub channel_timeout: Duration,

    pub quiet_hours: QuietHoursPolicy,

    /// Offset quiet hours are evaluated in.
    pub utc_offset: FixedOffset,

    /// How many unsent notifications one `redispatch_unsent` call picks up.
    pub redispatch_batch: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            channel_timeout: Duration::from_secs(5),
            quiet_hours: QuietHoursPolicy::default(),
            utc_offset: Utc.fix(),
            redispatch_batch: 500,
        }
    }
}
