use ipnetwork::IpNetwork;
use lodestone_dns_domain::DomainName;
use rustc_hash::{FxHashMap, FxHashSet};
use std::net::IpAddr;
use tracing::{debug, info};

/// RTT ceiling in milliseconds.
pub const MAX_RTT_MS: u32 = 45_000;

/// Distance of a server matched by no topology rule.
pub const UNLISTED_DISTANCE: u8 = u8::MAX;

/// Sort key for candidate servers: RTT bucket, topology distance, raw RTT.
pub type RankKey = (u32, u8, u32);

/// Process-wide knowledge about upstream servers: smoothed RTT and the
/// servers found lame for a zone.
pub struct ServerStats {
    rtt_ms: FxHashMap<IpAddr, u32>,
    topology: Vec<(IpNetwork, u8)>,
    lame: FxHashSet<(IpAddr, DomainName)>,
}

impl ServerStats {
    pub fn new(topology: Vec<(IpNetwork, u8)>) -> Self {
        Self {
            rtt_ms: FxHashMap::default(),
            topology,
            lame: FxHashSet::default(),
        }
    }

    /// Current estimate. A server never heard from starts with a small
    /// random value so fresh servers are tried early and in varying order.
    pub fn rtt(&mut self, addr: IpAddr) -> u32 {
        *self.rtt_ms.entry(addr).or_insert_with(|| fastrand::u32(1..=32))
    }

    pub fn known_rtt(&self, addr: IpAddr) -> Option<u32> {
        self.rtt_ms.get(&addr).copied()
    }

    pub fn distance(&self, addr: IpAddr) -> u8 {
        self.topology
            .iter()
            .find(|(net, _)| net.contains(addr))
            .map(|(_, distance)| *distance)
            .unwrap_or(UNLISTED_DISTANCE)
    }

    pub fn rank_key(&mut self, addr: IpAddr) -> RankKey {
        let rtt = self.rtt(addr);
        ((rtt + 32) / 64, self.distance(addr), rtt)
    }

    /// Folds a measured round trip into the estimate.
    pub fn record_answer(&mut self, addr: IpAddr, sample_ms: u32) {
        let current = self.rtt(addr);
        let updated = (0.7 * f64::from(current) + 0.3 * f64::from(sample_ms.min(MAX_RTT_MS))) as u32;
        self.rtt_ms.insert(addr, updated.max(1));
        debug!(server = %addr, sample_ms, rtt_ms = updated, "Server RTT updated");
    }

    /// Asked in this exchange but did not answer.
    pub fn penalize(&mut self, addr: IpAddr) {
        let current = self.rtt(addr);
        let updated = ((f64::from(current) * 1.2) as u32).max(current.saturating_add(1));
        self.rtt_ms.insert(addr, updated.min(MAX_RTT_MS));
    }

    /// Not asked in this exchange; drifts back toward being tried.
    pub fn decay(&mut self, addr: IpAddr) {
        let current = self.rtt(addr);
        self.rtt_ms.insert(addr, ((f64::from(current) * 0.98) as u32).max(1));
    }

    /// Records `addr` as lame for `zone`. Returns true the first time.
    pub fn mark_lame(&mut self, addr: IpAddr, zone: &DomainName) -> bool {
        let fresh = self.lame.insert((addr, zone.clone()));
        if fresh {
            info!(server = %addr, zone = %zone, "Lame server");
        }
        fresh
    }

    pub fn is_lame(&self, addr: IpAddr, zone: &DomainName) -> bool {
        self.lame.contains(&(addr, zone.clone()))
    }
}
