//! Error types for the connector.

use thiserror::Error;
use uuid::Uuid;

/// Error type for connector operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Topic or payload does not conform to the v1 convention.
    #[error("fb-mqtt: parse error: {0}")]
    Parse(String),

    /// A value is outside of its closed enumeration or breaks a field rule.
    #[error("fb-mqtt: invalid argument: {0}")]
    Validation(String),

    /// Operation is not allowed in the current entity state.
    #[error("fb-mqtt: invalid state: {0}")]
    InvalidState(String),

    /// Ingress queue reached its capacity.
    #[error("fb-mqtt: ingress queue is full (capacity {0})")]
    QueueFull(usize),

    /// No client registered under the identifier.
    #[error("fb-mqtt: client not found: {0}")]
    ClientNotFound(Uuid),

    /// Connection error.
    #[error("fb-mqtt: connection error: {0}")]
    Connection(String),

    /// Broker refused the connection.
    #[error("fb-mqtt: connection refused: {0}")]
    ConnectionRefused(String),

    /// Publish error.
    #[error("fb-mqtt: publish error: {0}")]
    Publish(String),

    /// Subscribe error.
    #[error("fb-mqtt: subscribe error: {0}")]
    Subscribe(String),

    /// Consumer rejected an entity.
    #[error("fb-mqtt: consumer error: {0}")]
    Consumer(String),

    /// Invalid configuration.
    #[error("fb-mqtt: config error: {0}")]
    Config(String),

    /// Client error from rumqttc.
    #[error("mqtt client error: {0}")]
    ClientError(#[from] rumqttc::ClientError),

    /// Connection error from rumqttc.
    #[error("mqtt connection error: {0}")]
    ConnectionError(#[from] rumqttc::ConnectionError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether the error came from the broker connection and may be retried.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::ConnectionRefused(_)
                | Error::Publish(_)
                | Error::Subscribe(_)
                | Error::ClientError(_)
                | Error::ConnectionError(_)
                | Error::Io(_)
        )
    }

    /// Whether the error describes a malformed inbound message.
    pub fn is_message(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Validation(_))
    }

    /// Whether the broker actively refused the connection.
    pub fn is_refused(&self) -> bool {
        match self {
            Error::ConnectionRefused(_) => true,
            Error::ConnectionError(rumqttc::ConnectionError::ConnectionRefused(_)) => true,
            Error::ConnectionError(rumqttc::ConnectionError::Io(e)) | Error::Io(e) => {
                e.kind() == std::io::ErrorKind::ConnectionRefused
            }
            _ => false,
        }
    }
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;
