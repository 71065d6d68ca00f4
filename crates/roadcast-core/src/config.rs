//! Protocol configuration
//!
//! A plain record loaded once at start. All tunables that shape the
//! forwarding behavior live here; derived values (proximity threshold, hold
//! time, beacon jitter bound) are computed on demand so the record itself
//! stays declarative.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Hello (beacon) emission interval in seconds
    pub hello_interval_secs: f64,
    /// Radio transmission range in meters; the forwarding proximity
    /// threshold is 0.9 × this
    pub transmission_range: f64,
    /// Maximum time a packet may be carried without a next hop, in seconds
    pub carry_time_threshold_secs: f64,
    /// Number of junctions in the road map; validated against the map at
    /// protocol construction
    pub junction_count: usize,
    /// Radius of the disk around a junction within which junction-area
    /// rules apply, in meters
    pub junction_area_radius: f64,
    /// Half-width padding of the road corridor test, in meters
    pub road_width: f64,
    /// Distance to the next junction at which the pending turn is latched
    pub turn_signal_range: f64,
    /// Distance to the next junction that counts as having reached it
    pub arrival_threshold: f64,
    /// The fixed rendezvous junction the planner routes toward inside
    /// junction areas
    pub rendezvous_junction: usize,
    /// Seed for beacon jitter randomization
    pub seed: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            hello_interval_secs: 1.0,
            transmission_range: 250.0,
            carry_time_threshold_secs: 10.0,
            junction_count: 36,
            junction_area_radius: 30.0,
            road_width: 15.0,
            turn_signal_range: 60.0,
            arrival_threshold: 10.0,
            rendezvous_junction: 0,
            seed: 42,
        }
    }
}

impl ProtocolConfig {
    /// Hello emission interval
    pub fn hello_interval(&self) -> Duration {
        Duration::from_secs_f64(self.hello_interval_secs)
    }

    /// How long a neighbor entry advertised in a hello stays valid; also the
    /// delay of the deferred expiry check and the speed sampling interval
    pub fn neighbor_hold_time(&self) -> Duration {
        self.hello_interval()
    }

    /// Upper bound of the random beacon flush jitter
    pub fn max_jitter(&self) -> Duration {
        Duration::from_secs_f64(self.hello_interval_secs / 10.0)
    }

    /// Distance below which a peer is considered directly reachable
    pub fn proximity_threshold(&self) -> f64 {
        self.transmission_range * 0.9
    }

    /// Carry-and-forward time bound
    pub fn carry_time_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.carry_time_threshold_secs)
    }

    /// Hold time of the ping-pong delay queue
    pub fn delay_queue_hold(&self) -> Duration {
        Duration::from_secs_f64(self.hello_interval_secs / 4.0)
    }
}

/// Fixed interval of the road-position check
pub const POSITION_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Pacing interval of the send-queue drain
pub const SEND_DRAIN_INTERVAL: Duration = Duration::from_millis(10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_values() {
        let config = ProtocolConfig::default();
        assert_eq!(config.proximity_threshold(), 225.0);
        assert_eq!(config.neighbor_hold_time(), Duration::from_secs(1));
        assert_eq!(config.max_jitter(), Duration::from_millis(100));
        assert_eq!(config.delay_queue_hold(), Duration::from_millis(250));
    }

    #[test]
    fn test_serde_defaults() {
        let config: ProtocolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.hello_interval_secs, 1.0);
        let config: ProtocolConfig =
            serde_json::from_str(r#"{"transmission_range": 100.0}"#).unwrap();
        assert_eq!(config.proximity_threshold(), 90.0);
    }
}
