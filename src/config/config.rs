//! Raft runtime configuration.

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use serde::Serialize;

use crate::config::error::ConfigError;

/// The runtime configuration for a core member.
///
/// All durations are in milliseconds. Keep `heartbeat_interval` well below `election_timeout`, so
/// that a healthy leader's heartbeats reach followers before their election timers fire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Parser)]
pub struct Config {
    /// The application specific name of this raft group, used in log spans
    #[clap(long, env = "RAFT_CLUSTER_NAME", default_value = "core")]
    pub cluster_name: String,

    /// The base election timeout
    #[clap(long, env = "RAFT_ELECTION_TIMEOUT", default_value = "500")]
    pub election_timeout: u64,

    /// The range of random jitter added to every election timeout
    ///
    /// Followers that lose their leader at the same moment thus do not start competing elections
    /// at the same moment.
    #[clap(long, env = "RAFT_ELECTION_TIMEOUT_JITTER", default_value = "500")]
    pub election_timeout_jitter: u64,

    /// The interval at which a leader sends heartbeats to followers
    #[clap(long, env = "RAFT_HEARTBEAT_INTERVAL", default_value = "150")]
    pub heartbeat_interval: u64,

    /// How long a caller waits for a leader to become known
    #[clap(long, env = "RAFT_LEADER_WAIT_TIMEOUT", default_value = "10000")]
    pub leader_wait_timeout: u64,

    /// How long a new member is given to catch up before its admission fails
    #[clap(long, env = "RAFT_CATCHUP_TIMEOUT", default_value = "30000")]
    pub catchup_timeout: u64,

    /// How many entries a new member may lag behind the leader and still be granted a vote
    #[clap(long, env = "RAFT_CATCHUP_LAG_THRESHOLD", default_value = "100")]
    pub catchup_lag_threshold: u64,

    /// The fixed backoff before a log shipper retries a follower
    ///
    /// Defaults to half of `election_timeout`.
    #[clap(long, env = "RAFT_RETRY_TIME")]
    pub retry_time: Option<u64>,

    /// The maximum number of entries per AppendEntries request
    #[clap(long, env = "RAFT_MAX_PAYLOAD_ENTRIES", default_value = "300")]
    pub max_payload_entries: u64,

    /// The polling period of the timeout service
    #[clap(long, env = "RAFT_TIMER_TICK", default_value = "1")]
    pub timer_tick: u64,
}

impl Default for Config {
    fn default() -> Self {
        <Self as Parser>::parse_from(Vec::<&'static str>::new())
    }
}

impl Config {
    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout)
    }

    pub fn election_timeout_jitter(&self) -> Duration {
        Duration::from_millis(self.election_timeout_jitter)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn leader_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.leader_wait_timeout)
    }

    pub fn catchup_timeout(&self) -> Duration {
        Duration::from_millis(self.catchup_timeout)
    }

    pub fn retry_time(&self) -> Duration {
        Duration::from_millis(self.retry_time.unwrap_or(self.election_timeout / 2))
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick)
    }

    pub fn build(args: &[&str]) -> Result<Config, ConfigError> {
        let config = <Self as Parser>::try_parse_from(args).map_err(|e| ConfigError::ParseError {
            source: anyerror::AnyError::new(&e),
            args: args.iter().map(|x| x.to_string()).collect(),
        })?;
        config.validate()
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.election_timeout <= self.heartbeat_interval {
            return Err(ConfigError::ElectionTimeoutLTHeartBeat {
                election_timeout: self.election_timeout,
                heartbeat_interval: self.heartbeat_interval,
            });
        }

        if self.max_payload_entries == 0 {
            return Err(ConfigError::MaxPayloadIs0);
        }

        if self.timer_tick == 0 {
            return Err(ConfigError::TimerTickIs0);
        }

        if self.retry_time == Some(0) {
            return Err(ConfigError::RetryTimeIs0);
        }

        Ok(self)
    }
}
