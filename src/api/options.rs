use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct CacheOptions {
    /// Capacity of each flusher generation's input channel. Enqueue blocks once it's full.
    pub buffer_capacity: Option<usize>,
    /// Number of distinct pending keys the flusher holds before flushing without waiting for the
    /// idle timer.
    pub key_limit: Option<usize>,
    pub idle_flush_interval: Option<Duration>,
}

#[derive(Clone, Debug)]
pub(crate) struct CacheOptionsValidated {
    pub buffer_capacity: usize,
    pub key_limit: usize,
    pub idle_flush_interval: Duration,
}

impl CacheOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.buffer_capacity == 0 {
            return Err("Flusher buffer capacity must be at least 1");
        }
        if self.key_limit == 0 {
            return Err("Flusher key limit must be at least 1");
        }
        if self.idle_flush_interval == Duration::from_millis(0) {
            return Err("Idle flush interval must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<CacheOptions> for CacheOptionsValidated {
    type Error = &'static str;

    fn try_from(options: CacheOptions) -> Result<Self, Self::Error> {
        let values = CacheOptionsValidated {
            buffer_capacity: options.buffer_capacity.unwrap_or(16),
            key_limit: options.key_limit.unwrap_or(5),
            idle_flush_interval: options.idle_flush_interval.unwrap_or(Duration::from_secs(1)),
        };

        values.validate()?;
        Ok(values)
    }
}

/// What the coordinator does with a participant whose connection stream has ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DisconnectPolicy {
    /// Keep the participant registered. Every later round waits for it and aborts by timeout,
    /// i.e. the cluster requires full liveness.
    Retain,
    /// Drop the participant from every round that starts after the disconnect.
    Evict,
}

impl Default for DisconnectPolicy {
    fn default() -> Self {
        DisconnectPolicy::Retain
    }
}

#[derive(Clone, Default)]
pub struct CoordinatorOptions {
    pub vote_timeout: Option<Duration>,
    pub ack_timeout: Option<Duration>,
    pub request_queue_capacity: Option<usize>,
    pub disconnect_policy: Option<DisconnectPolicy>,
}

#[derive(Clone, Debug)]
pub(crate) struct CoordinatorOptionsValidated {
    pub vote_timeout: Duration,
    pub ack_timeout: Duration,
    pub request_queue_capacity: usize,
    pub disconnect_policy: DisconnectPolicy,
}

impl CoordinatorOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.vote_timeout == Duration::from_millis(0) {
            return Err("Vote timeout must be greater than zero");
        }
        if self.ack_timeout == Duration::from_millis(0) {
            return Err("ACK timeout must be greater than zero");
        }
        if self.request_queue_capacity == 0 {
            return Err("Request queue capacity must be at least 1");
        }

        Ok(())
    }
}

impl TryFrom<CoordinatorOptions> for CoordinatorOptionsValidated {
    type Error = &'static str;

    fn try_from(options: CoordinatorOptions) -> Result<Self, Self::Error> {
        let values = CoordinatorOptionsValidated {
            vote_timeout: options.vote_timeout.unwrap_or(Duration::from_millis(1000)),
            ack_timeout: options.ack_timeout.unwrap_or(Duration::from_millis(1000)),
            request_queue_capacity: options.request_queue_capacity.unwrap_or(10),
            disconnect_policy: options.disconnect_policy.unwrap_or_default(),
        };

        values.validate()?;
        Ok(values)
    }
}

#[derive(Clone, Default)]
pub struct ParticipantOptions {
    /// How long a participant waits in an undecided state before abandoning the round.
    ///
    /// Keep this above the coordinator's vote timeout plus network delay. Otherwise a participant
    /// can abandon a round (and report it aborted) that the coordinator goes on to commit. The
    /// default equals the coordinator's default vote timeout, which leaves no margin.
    pub idle_timeout: Option<Duration>,
    /// How long to wait for the coordinator's initial ACK after opening the connection.
    pub handshake_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub(crate) struct ParticipantOptionsValidated {
    pub idle_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl ParticipantOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.idle_timeout == Duration::from_millis(0) {
            return Err("Participant idle timeout must be greater than zero");
        }
        if self.handshake_timeout == Duration::from_millis(0) {
            return Err("Participant handshake timeout must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<ParticipantOptions> for ParticipantOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ParticipantOptions) -> Result<Self, Self::Error> {
        let values = ParticipantOptionsValidated {
            idle_timeout: options.idle_timeout.unwrap_or(Duration::from_millis(1000)),
            handshake_timeout: options.handshake_timeout.unwrap_or(Duration::from_millis(1000)),
        };

        values.validate()?;
        Ok(values)
    }
}

impl From<ParticipantOptionsValidated> for ParticipantOptions {
    fn from(validated: ParticipantOptionsValidated) -> Self {
        ParticipantOptions {
            idle_timeout: Some(validated.idle_timeout),
            handshake_timeout: Some(validated.handshake_timeout),
        }
    }
}

#[derive(Clone, Default)]
pub struct ConsensusOptions {
    /// Upper bound on how long Set/Remove/Sync wait for their round to resolve.
    pub result_timeout: Option<Duration>,
    pub participant: ParticipantOptions,
}

#[derive(Clone, Debug)]
pub(crate) struct ConsensusOptionsValidated {
    pub result_timeout: Duration,
    pub participant: ParticipantOptionsValidated,
}

impl TryFrom<ConsensusOptions> for ConsensusOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ConsensusOptions) -> Result<Self, Self::Error> {
        let result_timeout = options.result_timeout.unwrap_or(Duration::from_secs(5));
        if result_timeout == Duration::from_millis(0) {
            return Err("Result timeout must be greater than zero");
        }

        Ok(ConsensusOptionsValidated {
            result_timeout,
            participant: ParticipantOptionsValidated::try_from(options.participant)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cache = CacheOptionsValidated::try_from(CacheOptions::default()).unwrap();
        assert_eq!(cache.key_limit, 5);
        assert_eq!(cache.idle_flush_interval, Duration::from_secs(1));

        let coordinator = CoordinatorOptionsValidated::try_from(CoordinatorOptions::default()).unwrap();
        assert_eq!(coordinator.vote_timeout, Duration::from_millis(1000));
        assert_eq!(coordinator.ack_timeout, Duration::from_millis(1000));
        assert_eq!(coordinator.request_queue_capacity, 10);
        assert_eq!(coordinator.disconnect_policy, DisconnectPolicy::Retain);

        let consensus = ConsensusOptionsValidated::try_from(ConsensusOptions::default()).unwrap();
        assert_eq!(consensus.result_timeout, Duration::from_secs(5));
        assert_eq!(consensus.participant.idle_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn rejects_zero_values() {
        let cache = CacheOptions {
            key_limit: Some(0),
            ..CacheOptions::default()
        };
        assert!(CacheOptionsValidated::try_from(cache).is_err());

        let coordinator = CoordinatorOptions {
            vote_timeout: Some(Duration::from_millis(0)),
            ..CoordinatorOptions::default()
        };
        assert!(CoordinatorOptionsValidated::try_from(coordinator).is_err());

        let consensus = ConsensusOptions {
            participant: ParticipantOptions {
                idle_timeout: Some(Duration::from_millis(0)),
                ..ParticipantOptions::default()
            },
            ..ConsensusOptions::default()
        };
        assert!(ConsensusOptionsValidated::try_from(consensus).is_err());
    }
}
