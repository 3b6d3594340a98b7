use anyerror::AnyError;

/// Error variants related to configuration.
#[derive(Debug, Clone, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    #[error("ParseError: {source} while parsing ({args:?})")]
    ParseError { source: AnyError, args: Vec<String> },

    #[error("election_timeout({election_timeout}) must be > heartbeat_interval({heartbeat_interval})")]
    ElectionTimeoutLTHeartBeat {
        election_timeout: u64,
        heartbeat_interval: u64,
    },

    #[error("max_payload_entries must be > 0")]
    MaxPayloadIs0,

    #[error("timer_tick must be > 0")]
    TimerTickIs0,

    #[error("retry_time must be > 0")]
    RetryTimeIs0,
}
