use thiserror::Error;

/// Which half of the connection was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Network,
    Broker,
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Network => f.write_str("network"),
            Link::Broker => f.write_str("broker"),
        }
    }
}

/// Failure taxonomy of the controller. None of these stop the control loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraderError {
    #[error("sensor not ready")]
    SensorNotReady,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("item did not settle before the deadline")]
    SettleTimeout,
    #[error("connectivity lost: {0}")]
    ConnectivityLoss(Link),
    #[error("unknown grade payload: {0:?}")]
    UnknownGrade(String),
    #[error("publish failed on {0}")]
    PublishFailure(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing scale")]
    MissingScale,
    #[error("missing diverter servo")]
    MissingDiverter,
    #[error("missing pusher servo")]
    MissingPusher,
    #[error("missing conveyor motor")]
    MissingConveyor,
    #[error("missing network")]
    MissingNetwork,
    #[error("missing broker")]
    MissingBroker,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
