//! Simulated unreliable link in front of the real transport.
//!
//! Every physical send must first take a token from a global bucket, then
//! survive a fixed loss probability, then wait out a random latency.

use crate::stats::DropReason;
use crate::throttle::{TokenBucket, DEFAULT_LINK_CAPACITY, DEFAULT_MAX_CAPACITY, DEFAULT_MIN_CAPACITY};
use braid_types::Timestamp;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct LinkParams {
    pub drop_probability: f64,
    pub latency_min: Duration,
    pub latency_max: Duration,
    pub capacity: u32,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub adjust_min: Duration,
    pub adjust_max: Duration,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            drop_probability: 0.05,
            latency_min: Duration::from_millis(20),
            latency_max: Duration::from_millis(100),
            capacity: DEFAULT_LINK_CAPACITY,
            min_capacity: DEFAULT_MIN_CAPACITY,
            max_capacity: DEFAULT_MAX_CAPACITY,
            adjust_min: Duration::from_secs(30),
            adjust_max: Duration::from_secs(60),
        }
    }
}

impl LinkParams {
    /// A link that never drops and adds no latency. Capacity still applies.
    pub fn lossless() -> Self {
        Self {
            drop_probability: 0.0,
            latency_min: Duration::ZERO,
            latency_max: Duration::ZERO,
            ..Self::default()
        }
    }
}

pub struct LinkSimulator {
    params: LinkParams,
    bucket: TokenBucket,
    rng: StdRng,
}

impl LinkSimulator {
    pub fn new(params: LinkParams, now: Timestamp) -> Self {
        Self::with_rng(params, now, StdRng::from_entropy())
    }

    pub fn with_rng(params: LinkParams, now: Timestamp, rng: StdRng) -> Self {
        let bucket = TokenBucket::new(params.capacity, params.min_capacity, params.max_capacity, now);
        Self { params, bucket, rng }
    }

    /// Decide the fate of one send. On success returns the latency to apply.
    pub fn admit(&mut self, now: Timestamp) -> Result<Duration, DropReason> {
        if !self.bucket.try_consume(now) {
            return Err(DropReason::LinkThrottled);
        }
        if self.params.drop_probability > 0.0 && self.rng.gen::<f64>() < self.params.drop_probability {
            return Err(DropReason::LinkLoss);
        }
        Ok(self.latency())
    }

    fn latency(&mut self) -> Duration {
        let min = self.params.latency_min.as_millis() as u64;
        let max = self.params.latency_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    /// Pick a new random capacity within the configured bounds.
    pub fn fluctuate(&mut self, now: Timestamp) -> u32 {
        let (lo, hi) = self.bucket.bounds();
        let capacity = self.rng.gen_range(lo..=hi);
        self.bucket.set_capacity(capacity, now)
    }

    /// Delay until the next capacity change.
    pub fn next_adjustment(&mut self) -> Duration {
        let lo = self.params.adjust_min.as_secs();
        let hi = self.params.adjust_max.as_secs().max(lo);
        Duration::from_secs(self.rng.gen_range(lo..=hi))
    }

    pub fn capacity(&self) -> u32 {
        self.bucket.capacity()
    }

    pub fn tokens(&self) -> f64 {
        self.bucket.available_tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(params: LinkParams) -> LinkSimulator {
        LinkSimulator::with_rng(params, Timestamp::EPOCH, StdRng::seed_from_u64(42))
    }

    #[test]
    fn lossless_link_only_throttles() {
        let mut link = seeded(LinkParams::lossless());
        for _ in 0..5 {
            assert_eq!(link.admit(Timestamp::EPOCH), Ok(Duration::ZERO));
        }
        assert_eq!(link.admit(Timestamp::EPOCH), Err(DropReason::LinkThrottled));
    }

    #[test]
    fn certain_loss_drops_everything() {
        let mut link = seeded(LinkParams {
            drop_probability: 1.0,
            ..LinkParams::lossless()
        });
        assert_eq!(link.admit(Timestamp::EPOCH), Err(DropReason::LinkLoss));
    }

    #[test]
    fn latency_stays_in_range() {
        let mut link = seeded(LinkParams {
            drop_probability: 0.0,
            max_capacity: 10,
            capacity: 10,
            ..LinkParams::default()
        });
        for i in 0..10 {
            let latency = link.admit(Timestamp::from_secs(i)).unwrap();
            assert!(latency >= Duration::from_millis(20) && latency <= Duration::from_millis(100));
        }
    }

    #[test]
    fn fluctuation_respects_bounds() {
        let mut link = seeded(LinkParams::default());
        for _ in 0..50 {
            let c = link.fluctuate(Timestamp::EPOCH);
            assert!((2..=10).contains(&c));
            let wait = link.next_adjustment();
            assert!(wait >= Duration::from_secs(30) && wait <= Duration::from_secs(60));
        }
    }
}
