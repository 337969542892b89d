//! Entities parsed from v1 convention messages.
//!
//! Every inbound message becomes exactly one [`Entity`]. Shared fields live
//! in [`Origin`]; the kind specific payload lives in the variant. Allowed
//! tokens per kind are plain constant tables.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Declares a closed set of wire tokens.
///
/// Generates `as_str`, `ALL`, `FromStr` (failing with [`Error::Validation`]),
/// `Display` and a string `Serialize` impl.
macro_rules! tokens {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($(#[$vmeta:meta])* $variant:ident => $token:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every token of the set.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                match s {
                    $($token => Ok($name::$variant),)+
                    _ => Err(crate::error::Error::Validation(format!(
                        "provided {} '{}' is not in allowed range",
                        $what, s
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

mod control;
mod property;

pub use control::{
    Control, ControlName, ControlValue, SchemaField, SchemaFieldType, SchemaParams,
    SelectOption, CHANNEL_CONTROLS, DEVICE_CONTROLS,
};
pub use property::{
    DataType, Format, FormatToken, Property, PropertyAttribute, PropertyAttributeName,
    PropertyAttributeValue,
};

static NAME_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9.,_ -]").unwrap_or_else(|e| panic!("name filter: {e}"))
});
static PAYLOAD_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^A-Za-z0-9.:_°, %µ³/"-]"#).unwrap_or_else(|e| panic!("payload filter: {e}"))
});

/// Strips everything but letters, digits and `.,_ -` from a name.
pub(crate) fn clean_name(name: &str) -> String {
    NAME_CHARS.replace_all(name, "").into_owned()
}

/// Strips characters that can not appear in a report payload.
pub(crate) fn clean_payload(payload: &str) -> String {
    PAYLOAD_CHARS.replace_all(payload, "").into_owned()
}

/// Splits a comma separated payload into a trimmed set without blanks.
pub(crate) fn split_list(payload: &str) -> BTreeSet<String> {
    payload
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fields every entity carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Origin {
    /// Device identifier.
    pub device: String,
    /// Owning device, set iff the topic had a `$child` segment.
    pub parent: Option<String>,
    /// MQTT retain flag of the source message.
    pub retained: bool,
    /// Client the message arrived on. `None` for messages parsed outside
    /// of a broker connection.
    pub client_id: Option<Uuid>,
}

impl Origin {
    pub fn new(device: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            device: device.into(),
            parent,
            retained: false,
            client_id: None,
        }
    }

    pub fn with_client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }
}

tokens! {
    /// Device or channel attribute.
    AttributeName, "attribute" {
        Name => "name",
        Devices => "devices",
        State => "state",
        Channels => "channels",
        Extensions => "extensions",
        Controls => "controls",
    }
}

/// Attributes a device may report.
pub const DEVICE_ATTRIBUTES: &[AttributeName] = &[
    AttributeName::Name,
    AttributeName::Devices,
    AttributeName::State,
    AttributeName::Channels,
    AttributeName::Extensions,
    AttributeName::Controls,
];

/// Attributes a channel may report.
pub const CHANNEL_ATTRIBUTES: &[AttributeName] = &[
    AttributeName::Name,
    AttributeName::Devices,
    AttributeName::Controls,
];

impl AttributeName {
    /// Whether the attribute carries a comma separated list.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            AttributeName::Devices
                | AttributeName::Channels
                | AttributeName::Extensions
                | AttributeName::Controls
        )
    }
}

/// Cleaned attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    List(BTreeSet<String>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&BTreeSet<String>> {
        match self {
            AttributeValue::List(items) => Some(items),
            AttributeValue::Text(_) => None,
        }
    }
}

/// Device or channel attribute report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    #[serde(flatten)]
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub attribute: AttributeName,
    pub value: AttributeValue,
}

impl Attribute {
    /// Creates a device level attribute.
    pub fn device(origin: Origin, attribute: &str, payload: &str) -> Result<Self> {
        Self::build(origin, None, DEVICE_ATTRIBUTES, attribute, payload)
    }

    /// Creates a channel level attribute.
    pub fn channel(
        origin: Origin,
        channel: impl Into<String>,
        attribute: &str,
        payload: &str,
    ) -> Result<Self> {
        Self::build(origin, Some(channel.into()), CHANNEL_ATTRIBUTES, attribute, payload)
    }

    fn build(
        origin: Origin,
        channel: Option<String>,
        allowed: &[AttributeName],
        attribute: &str,
        payload: &str,
    ) -> Result<Self> {
        let attribute: AttributeName = attribute.parse()?;
        if !allowed.contains(&attribute) {
            return Err(Error::Validation(format!(
                "provided attribute '{attribute}' is not in allowed range"
            )));
        }

        let value = if attribute == AttributeName::Name {
            AttributeValue::Text(clean_name(payload))
        } else if attribute.is_list() {
            AttributeValue::List(split_list(&clean_payload(payload)))
        } else {
            AttributeValue::Text(clean_payload(payload))
        };

        Ok(Self {
            origin,
            channel,
            attribute,
            value,
        })
    }
}

tokens! {
    /// Hardware info parameter.
    HardwareParameter, "hardware attribute" {
        MacAddress => "mac-address",
        Manufacturer => "manufacturer",
        Model => "model",
        Version => "version",
        SerialNumber => "serial-number",
    }
}

tokens! {
    /// Firmware info parameter.
    FirmwareParameter, "firmware attribute" {
        Manufacturer => "manufacturer",
        Version => "version",
    }
}

/// Device hardware info report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hardware {
    #[serde(flatten)]
    pub origin: Origin,
    pub parameter: HardwareParameter,
    pub value: String,
}

impl Hardware {
    pub fn new(origin: Origin, parameter: &str, payload: &str) -> Result<Self> {
        Ok(Self {
            origin,
            parameter: parameter.parse()?,
            value: clean_payload(payload),
        })
    }
}

/// Device firmware info report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Firmware {
    #[serde(flatten)]
    pub origin: Origin,
    pub parameter: FirmwareParameter,
    pub value: String,
}

impl Firmware {
    pub fn new(origin: Origin, parameter: &str, payload: &str) -> Result<Self> {
        Ok(Self {
            origin,
            parameter: parameter.parse()?,
            value: clean_payload(payload),
        })
    }
}

/// A parsed v1 message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Entity {
    DeviceAttribute(Attribute),
    ChannelAttribute(Attribute),
    Hardware(Hardware),
    Firmware(Firmware),
    DeviceProperty(Property),
    ChannelProperty(Property),
    DeviceControl(Control),
    ChannelControl(Control),
}

impl Entity {
    pub fn origin(&self) -> &Origin {
        match self {
            Entity::DeviceAttribute(e) | Entity::ChannelAttribute(e) => &e.origin,
            Entity::Hardware(e) => &e.origin,
            Entity::Firmware(e) => &e.origin,
            Entity::DeviceProperty(e) | Entity::ChannelProperty(e) => e.origin(),
            Entity::DeviceControl(e) | Entity::ChannelControl(e) => e.origin(),
        }
    }

    fn origin_mut(&mut self) -> &mut Origin {
        match self {
            Entity::DeviceAttribute(e) | Entity::ChannelAttribute(e) => &mut e.origin,
            Entity::Hardware(e) => &mut e.origin,
            Entity::Firmware(e) => &mut e.origin,
            Entity::DeviceProperty(e) | Entity::ChannelProperty(e) => e.origin_mut(),
            Entity::DeviceControl(e) | Entity::ChannelControl(e) => e.origin_mut(),
        }
    }

    pub fn device(&self) -> &str {
        &self.origin().device
    }

    pub fn parent(&self) -> Option<&str> {
        self.origin().parent.as_deref()
    }

    pub fn retained(&self) -> bool {
        self.origin().retained
    }

    pub fn set_retained(&mut self, retained: bool) {
        self.origin_mut().retained = retained;
    }

    /// Client the entity arrived on; replies go out through it.
    pub fn client_id(&self) -> Option<Uuid> {
        self.origin().client_id
    }

    pub fn set_client_id(&mut self, client_id: Uuid) {
        self.origin_mut().client_id = Some(client_id);
    }

    /// Channel identifier for channel scoped entities.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Entity::ChannelAttribute(e) => e.channel.as_deref(),
            Entity::ChannelProperty(e) => e.channel(),
            Entity::ChannelControl(e) => e.channel(),
            _ => None,
        }
    }

    /// Short name of the entity kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::DeviceAttribute(_) => "device-attribute",
            Entity::ChannelAttribute(_) => "channel-attribute",
            Entity::Hardware(_) => "hardware",
            Entity::Firmware(_) => "firmware",
            Entity::DeviceProperty(_) => "device-property",
            Entity::ChannelProperty(_) => "channel-property",
            Entity::DeviceControl(_) => "device-control",
            Entity::ChannelControl(_) => "channel-control",
        }
    }
}
