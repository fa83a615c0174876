//! Recently matched servers and the rejoin penalty

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Registry shared by every search session in the process
pub type SharedRegistry = Arc<Mutex<RecentMatchRegistry>>;

/// A server we were directed to join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentMatch {
    pub address: SocketAddr,
    pub matched_at: Instant,
}

/// Small list of recent matches; linear scans are fine at this size.
#[derive(Debug, Default)]
pub struct RecentMatchRegistry {
    entries: Vec<RecentMatch>,
}

impl RecentMatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Remember that we were matched to `address` at `now`
    pub fn record_match(&mut self, address: SocketAddr, now: Instant) {
        match self.entries.iter_mut().find(|e| e.address == address) {
            Some(entry) => entry.matched_at = now,
            None => self.entries.push(RecentMatch {
                address,
                matched_at: now,
            }),
        }
    }

    /// Drop entries at least `cooldown` old. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant, cooldown: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let keep = now.saturating_duration_since(entry.matched_at) < cooldown;
            if !keep {
                debug!(address = %entry.address, "Expiring recently matched server");
            }
            keep
        });
        before - self.entries.len()
    }

    /// Rejoin penalty for `address`: `max_penalty` right after the match,
    /// decaying linearly to zero at `cooldown`.
    pub fn penalty_for(
        &mut self,
        address: SocketAddr,
        now: Instant,
        cooldown: Duration,
        max_penalty: f32,
    ) -> f32 {
        self.purge_expired(now, cooldown);

        let Some(entry) = self.entries.iter().find(|e| e.address == address) else {
            return 0.0;
        };
        let Some(age) = now.checked_duration_since(entry.matched_at) else {
            warn!(address = %address, "Recent match is timestamped in the future");
            return 0.0;
        };

        let age_fraction = (age.as_secs_f32() / cooldown.as_secs_f32()).min(1.0);
        (1.0 - age_fraction) * max_penalty
    }

    pub fn get(&self, address: &SocketAddr) -> Option<&RecentMatch> {
        self.entries.iter().find(|e| &e.address == address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(300);

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 10], port))
    }

    #[test]
    fn unknown_address_has_no_penalty() {
        let mut registry = RecentMatchRegistry::new();
        assert_eq!(registry.penalty_for(addr(1), Instant::now(), COOLDOWN, 1.0), 0.0);
    }

    #[test]
    fn penalty_ten_seconds_after_match() {
        let mut registry = RecentMatchRegistry::new();
        let matched = Instant::now();
        registry.record_match(addr(1), matched);

        let penalty = registry.penalty_for(addr(1), matched + Duration::from_secs(10), COOLDOWN, 1.0);
        assert!((penalty - 0.96667).abs() < 1e-4, "penalty was {penalty}");
    }

    #[test]
    fn penalty_decays_monotonically_to_zero() {
        let mut registry = RecentMatchRegistry::new();
        let matched = Instant::now();
        registry.record_match(addr(1), matched);

        let mut last = f32::INFINITY;
        for secs in (0..=300).step_by(15) {
            let penalty =
                registry.penalty_for(addr(1), matched + Duration::from_secs(secs), COOLDOWN, 1.0);
            assert!(penalty <= last);
            last = penalty;
        }
        assert_eq!(last, 0.0);
        assert!(registry.is_empty());
    }

    #[test]
    fn rematch_refreshes_timestamp_without_duplicating() {
        let mut registry = RecentMatchRegistry::new();
        let first = Instant::now();
        registry.record_match(addr(1), first);
        let second = first + Duration::from_secs(200);
        registry.record_match(addr(1), second);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&addr(1)).unwrap().matched_at, second);
        let penalty = registry.penalty_for(addr(1), second, COOLDOWN, 1.0);
        assert!((penalty - 1.0).abs() < 1e-6);
    }

    #[test]
    fn lookup_purges_only_expired_entries() {
        let mut registry = RecentMatchRegistry::new();
        let start = Instant::now();
        registry.record_match(addr(1), start);
        registry.record_match(addr(2), start + Duration::from_secs(100));

        registry.penalty_for(addr(3), start + Duration::from_secs(300), COOLDOWN, 1.0);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&addr(2)).is_some());
    }

    #[test]
    fn zero_cooldown_disables_penalty() {
        let mut registry = RecentMatchRegistry::new();
        let now = Instant::now();
        registry.record_match(addr(1), now);
        assert_eq!(registry.penalty_for(addr(1), now, Duration::ZERO, 1.0), 0.0);
    }
}
