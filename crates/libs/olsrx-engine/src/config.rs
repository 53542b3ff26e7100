//! Engine configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use olsrx_wire::Willingness;

/// Tunables for one engine instance.
///
/// Hold times derive from the emission intervals the way RFC 3626
/// prescribes; they are methods rather than fields so a changed interval
/// cannot leave a stale hold time behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub hello_interval: Duration,
    pub tc_interval: Duration,
    pub mid_interval: Duration,
    pub hna_interval: Duration,
    pub willingness: Willingness,
    /// Communication radius in meters; only consumed by the link-hold
    /// time predictor.
    pub communication_radius: f64,
    /// Interface indices OLSR must not run on.
    pub interface_exclusions: BTreeSet<u32>,
    /// Seed for the jitter stream, so runs are reproducible.
    pub jitter_seed: u64,
}

impl Config {
    pub fn set_hello_interval(&mut self, interval: Duration) {
        self.hello_interval = interval;
    }

    pub fn set_tc_interval(&mut self, interval: Duration) {
        self.tc_interval = interval;
    }

    pub fn set_mid_interval(&mut self, interval: Duration) {
        self.mid_interval = interval;
    }

    pub fn set_hna_interval(&mut self, interval: Duration) {
        self.hna_interval = interval;
    }

    pub fn set_willingness(&mut self, willingness: Willingness) {
        self.willingness = willingness;
    }

    pub fn set_communication_radius(&mut self, meters: f64) {
        self.communication_radius = meters;
    }

    pub fn exclude_interface(&mut self, index: u32) {
        self.interface_exclusions.insert(index);
    }

    pub fn set_jitter_seed(&mut self, seed: u64) {
        self.jitter_seed = seed;
    }

    /// How long a HELLO keeps a link alive.
    pub fn neighbor_hold(&self) -> Duration {
        2 * self.hello_interval
    }

    /// How long a TC keeps a topology tuple alive.
    pub fn topology_hold(&self) -> Duration {
        self.tc_interval
    }

    pub fn mid_hold(&self) -> Duration {
        3 * self.mid_interval
    }

    pub fn hna_hold(&self) -> Duration {
        3 * self.hna_interval
    }

    /// Duplicate-tuple retention.
    pub fn duplicate_hold(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Window over which neighbor gains/losses count toward the churn
    /// rate advertised in HELLOs.
    pub fn churn_window(&self) -> Duration {
        3 * self.hello_interval
    }

    /// Upper bound of the uniform emission jitter.
    pub fn max_jitter(&self) -> Duration {
        self.hello_interval / 4
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hello_interval: Duration::from_secs(2),
            tc_interval: Duration::from_secs(5),
            mid_interval: Duration::from_secs(5),
            hna_interval: Duration::from_secs(5),
            willingness: Willingness::DEFAULT,
            communication_radius: 300.0,
            interface_exclusions: BTreeSet::new(),
            jitter_seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_times_track_intervals() {
        let mut config = Config::default();
        assert_eq!(config.neighbor_hold(), Duration::from_secs(4));
        assert_eq!(config.topology_hold(), Duration::from_secs(5));
        assert_eq!(config.max_jitter(), Duration::from_millis(500));

        config.set_hello_interval(Duration::from_secs(1));
        assert_eq!(config.neighbor_hold(), Duration::from_secs(2));
        assert_eq!(config.churn_window(), Duration::from_secs(3));
    }
}
