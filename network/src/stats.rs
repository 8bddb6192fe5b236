//! Drop-reason accounting shared by the inbound and outbound paths.

use braid_messages::MessageKind;
use braid_utils::StatsCounter;
use std::collections::BTreeMap;

/// Why a message was not delivered or not processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Undecodable or untyped record.
    Invalid,
    /// Message id already seen inside the expiry window.
    Duplicate,
    /// Sliding-window rate limit exceeded (inbound or outbound).
    RateLimited,
    /// Peer is on the blacklist.
    Blacklisted,
    /// Destination queue at capacity.
    QueueFull,
    /// Queued longer than the queuing TTL.
    Expired,
    /// Global link bucket empty.
    LinkThrottled,
    /// Simulated packet loss.
    LinkLoss,
    /// No address or relay for the destination.
    NoRoute,
    /// Retry budget used up.
    RetryExhausted,
}

impl DropReason {
    pub const ALL: [DropReason; 10] = [
        Self::Invalid,
        Self::Duplicate,
        Self::RateLimited,
        Self::Blacklisted,
        Self::QueueFull,
        Self::Expired,
        Self::LinkThrottled,
        Self::LinkLoss,
        Self::NoRoute,
        Self::RetryExhausted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Duplicate => "DUPLICATE",
            Self::RateLimited => "RATE_LIMITED",
            Self::Blacklisted => "BLACKLISTED",
            Self::QueueFull => "QUEUE_FULL",
            Self::Expired => "EXPIRED",
            Self::LinkThrottled => "LINK_THROTTLED",
            Self::LinkLoss => "LINK_LOSS",
            Self::NoRoute => "NO_ROUTE",
            Self::RetryExhausted => "RETRY_EXHAUSTED",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop counters by reason, plus link-level drops by message type.
pub struct DropStats {
    by_reason: StatsCounter,
    link_by_kind: StatsCounter,
}

impl DropStats {
    pub fn new() -> Self {
        let reasons: Vec<&'static str> = DropReason::ALL.iter().map(|r| r.as_str()).collect();
        let kinds: Vec<&'static str> = MessageKind::ALL.iter().map(|k| k.as_str()).collect();
        Self {
            by_reason: StatsCounter::new(&reasons),
            link_by_kind: StatsCounter::new(&kinds),
        }
    }

    pub fn record(&self, reason: DropReason) {
        self.by_reason.increment(reason.as_str());
    }

    /// Record a drop on the simulated link; counted by reason and by type.
    pub fn record_link(&self, reason: DropReason, kind: MessageKind) {
        self.record(reason);
        self.link_by_kind.increment(kind.as_str());
    }

    pub fn count(&self, reason: DropReason) -> u64 {
        self.by_reason.get(reason.as_str())
    }

    pub fn link_count(&self, kind: MessageKind) -> u64 {
        self.link_by_kind.get(kind.as_str())
    }

    pub fn by_reason(&self) -> BTreeMap<&'static str, u64> {
        self.by_reason.snapshot()
    }

    pub fn link_by_kind(&self) -> BTreeMap<&'static str, u64> {
        self.link_by_kind.snapshot()
    }
}

impl Default for DropStats {
    fn default() -> Self {
        Self::new()
    }
}
