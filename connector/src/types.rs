//! Delivery levels and client connection states.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// MQTT quality of service, serialized as its numeric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery; used for every outbound command.
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos.level()
    }
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self, Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::Validation(format!("qos level {level} is not in allowed range"))),
        }
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QoS {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// Connection state of one logical broker client.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, with
/// `Disabled` entered administratively and left through `Connecting`
/// once the client is enabled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disabled,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connecting => "connecting",
            ClientState::Connected => "connected",
            ClientState::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_levels() {
        assert_eq!(QoS::try_from(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(QoS::ExactlyOnce.level(), 2);
        assert!(matches!(QoS::try_from(3), Err(Error::Validation(_))));
        assert_eq!(rumqttc::QoS::from(QoS::AtLeastOnce), rumqttc::QoS::AtLeastOnce);
    }

    #[test]
    fn test_qos_serde() {
        assert_eq!(serde_json::to_string(&QoS::AtLeastOnce).unwrap(), "1");
        assert_eq!(serde_json::from_str::<QoS>("0").unwrap(), QoS::AtMostOnce);
        assert!(serde_json::from_str::<QoS>("7").is_err());
    }

    #[test]
    fn test_client_state_display() {
        assert_eq!(ClientState::default(), ClientState::Disconnected);
        assert_eq!(ClientState::Disabled.to_string(), "disabled");
    }
}
