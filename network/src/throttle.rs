//! Token bucket for the simulated link's overall send capacity.
//!
//! Tokens represent whole sends. The bucket refills at `capacity` tokens per
//! second and never holds more than `capacity`. Capacity can be changed at
//! runtime within fixed bounds to emulate fluctuating bandwidth.

use braid_types::Timestamp;

/// Default initial capacity (sends per second).
pub const DEFAULT_LINK_CAPACITY: u32 = 5;
/// Default lower bound for capacity adjustments.
pub const DEFAULT_MIN_CAPACITY: u32 = 2;
/// Default upper bound for capacity adjustments.
pub const DEFAULT_MAX_CAPACITY: u32 = 10;

pub struct TokenBucket {
    capacity: u32,
    min_capacity: u32,
    max_capacity: u32,
    tokens: f64,
    last_refill: Timestamp,
}

impl TokenBucket {
    /// Create a full bucket. `capacity` is clamped into `[min, max]`.
    pub fn new(capacity: u32, min_capacity: u32, max_capacity: u32, now: Timestamp) -> Self {
        let max_capacity = max_capacity.max(min_capacity);
        let capacity = capacity.clamp(min_capacity, max_capacity);
        Self {
            capacity,
            min_capacity,
            max_capacity,
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    /// Take one token if available.
    pub fn try_consume(&mut self, now: Timestamp) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Timestamp) {
        let elapsed = self.last_refill.elapsed_since(now).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.capacity as f64).min(self.capacity as f64);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Change capacity (and with it the refill rate). Returns the clamped value.
    pub fn set_capacity(&mut self, capacity: u32, now: Timestamp) -> u32 {
        self.refill(now);
        self.capacity = capacity.clamp(self.min_capacity, self.max_capacity);
        self.tokens = self.tokens.min(self.capacity as f64);
        self.capacity
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min_capacity, self.max_capacity)
    }

    /// Current token level. Useful for diagnostics.
    pub fn available_tokens(&self) -> f64 {
        self.tokens
    }
}
