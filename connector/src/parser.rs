//! Topic and payload parser.
//!
//! Turns one validated v1 message into one [`Entity`].

use crate::convention::{self, Shape};
use crate::entity::{Attribute, Control, Entity, Firmware, Hardware, Origin, Property};
use crate::error::{Error, Result};
use regex::Regex;

/// Identifiers extracted from a topic.
struct Parts<'t> {
    device: &'t str,
    parent: Option<&'t str>,
    channel: Option<&'t str>,
    tokens: Vec<Option<&'t str>>,
}

impl Parts<'_> {
    fn origin(&self) -> Origin {
        Origin::new(self.device, self.parent.map(str::to_string))
    }

    fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).copied().flatten()
    }

    fn required(&self, index: usize) -> Result<&str> {
        self.token(index)
            .ok_or_else(|| Error::Parse("topic is missing an identifier".into()))
    }

    fn channel(&self) -> Result<&str> {
        self.channel
            .ok_or_else(|| Error::Parse("topic is missing a channel identifier".into()))
    }
}

/// Splits a topic with the top level pattern, falling back to the
/// `$child` one. Child captures lead with the parent id.
fn split<'t>(top: &Regex, child: &Regex, channel: bool, topic: &'t str) -> Option<Parts<'t>> {
    let (caps, parent) = match top.captures(topic) {
        Some(caps) => (caps, false),
        None => (child.captures(topic)?, true),
    };

    let mut groups = caps.iter().skip(1).map(|m| m.map(|m| m.as_str()));
    let parent = if parent { groups.next().flatten() } else { None };
    let device = groups.next().flatten()?;
    let channel = if channel { groups.next().flatten() } else { None };

    Some(Parts {
        device,
        parent,
        channel,
        tokens: groups.collect(),
    })
}

fn parts<'t>(shape: Shape, topic: &'t str) -> Option<Parts<'t>> {
    use convention::*;

    let (top, child): (&Regex, &Regex) = match shape {
        Shape::DeviceAttribute => (&DEVICE_ATTRIBUTE, &CHILD_DEVICE_ATTRIBUTE),
        Shape::DeviceHardware => (&DEVICE_HARDWARE, &CHILD_DEVICE_HARDWARE),
        Shape::DeviceFirmware => (&DEVICE_FIRMWARE, &CHILD_DEVICE_FIRMWARE),
        Shape::DeviceProperty => (&DEVICE_PROPERTY, &CHILD_DEVICE_PROPERTY),
        Shape::DeviceControl => (&DEVICE_CONTROL, &CHILD_DEVICE_CONTROL),
        Shape::ChannelAttribute => (&CHANNEL_ATTRIBUTE, &CHILD_CHANNEL_ATTRIBUTE),
        Shape::ChannelProperty => (&CHANNEL_PROPERTY, &CHILD_CHANNEL_PROPERTY),
        Shape::ChannelControl => (&CHANNEL_CONTROL, &CHILD_CHANNEL_CONTROL),
    };
    split(top, child, shape.is_channel(), topic)
}

/// `$control` is accepted as a singular spelling of `$controls`.
fn attribute_token(token: &str) -> &str {
    if token == "control" { "controls" } else { token }
}

/// Parses a message into an entity.
///
/// Fails with [`Error::Parse`] when the topic is not a valid v1 report or
/// the payload is malformed, and with [`Error::Validation`] when a token is
/// outside of the entity's allowed range.
pub fn parse_message(topic: &str, payload: &str, retained: bool) -> Result<Entity> {
    let shape = convention::classify(topic)
        .ok_or_else(|| Error::Parse(format!("topic '{topic}' is not a valid v1 topic")))?;
    let parts = parts(shape, topic)
        .ok_or_else(|| Error::Parse(format!("topic '{topic}' could not be split")))?;

    let mut entity = match shape {
        Shape::DeviceAttribute => Entity::DeviceAttribute(Attribute::device(
            parts.origin(),
            attribute_token(parts.required(0)?),
            payload,
        )?),
        Shape::DeviceHardware => {
            Entity::Hardware(Hardware::new(parts.origin(), parts.required(0)?, payload)?)
        }
        Shape::DeviceFirmware => {
            Entity::Firmware(Firmware::new(parts.origin(), parts.required(0)?, payload)?)
        }
        Shape::DeviceProperty => {
            Entity::DeviceProperty(property(&parts, None, payload)?)
        }
        Shape::DeviceControl => {
            let control = Control::device(parts.origin(), parts.required(0)?)?;
            Entity::DeviceControl(control_payload(control, parts.token(1), payload)?)
        }
        Shape::ChannelAttribute => Entity::ChannelAttribute(Attribute::channel(
            parts.origin(),
            parts.channel()?,
            attribute_token(parts.required(0)?),
            payload,
        )?),
        Shape::ChannelProperty => {
            let channel = parts.channel()?.to_string();
            Entity::ChannelProperty(property(&parts, Some(channel), payload)?)
        }
        Shape::ChannelControl => {
            let control = Control::for_channel(parts.origin(), parts.channel()?, parts.required(0)?)?;
            Entity::ChannelControl(control_payload(control, parts.token(1), payload)?)
        }
    };

    entity.set_retained(retained);
    Ok(entity)
}

fn property(parts: &Parts<'_>, channel: Option<String>, payload: &str) -> Result<Property> {
    let mut property = Property::new(parts.origin(), channel, parts.required(0)?);
    match parts.token(1) {
        Some(attribute) => property.add_attribute(attribute, payload)?,
        None => property.set_value(payload),
    }
    Ok(property)
}

fn control_payload(mut control: Control, sub: Option<&str>, payload: &str) -> Result<Control> {
    match sub {
        Some("schema") => control.set_schema(payload)?,
        Some(other) => {
            return Err(Error::Parse(format!("control attribute '{other}' is not supported")));
        }
        None => control.set_value(payload)?,
    }
    Ok(control)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{
        AttributeName, AttributeValue, ControlName, ControlValue, DataType,
        HardwareParameter, PropertyAttributeName, PropertyAttributeValue,
    };

    #[test]
    fn test_device_attribute() {
        let entity = parse_message("/fb/v1/device-1/$name", "Living Room", false).unwrap();
        let Entity::DeviceAttribute(attr) = &entity else {
            panic!("unexpected entity {entity:?}");
        };
        assert_eq!(attr.origin.device, "device-1");
        assert_eq!(attr.origin.parent, None);
        assert_eq!(attr.attribute, AttributeName::Name);
        assert_eq!(attr.value, AttributeValue::Text("Living Room".into()));
    }

    #[test]
    fn test_singular_control_attribute() {
        let entity = parse_message("/fb/v1/device-1/$control", "reset,ota", true).unwrap();
        let Entity::DeviceAttribute(attr) = &entity else {
            panic!("unexpected entity {entity:?}");
        };
        assert_eq!(attr.attribute, AttributeName::Controls);
        assert_eq!(attr.value.as_list().unwrap().len(), 2);
        assert!(entity.retained());
    }

    #[test]
    fn test_child_hardware() {
        let entity =
            parse_message("/fb/v1/gateway/$child/sensor-2/$hw/mac-address", "00:11:22", false)
                .unwrap();
        let Entity::Hardware(hw) = &entity else {
            panic!("unexpected entity {entity:?}");
        };
        assert_eq!(hw.origin.device, "sensor-2");
        assert_eq!(hw.origin.parent.as_deref(), Some("gateway"));
        assert_eq!(hw.parameter, HardwareParameter::MacAddress);
        assert_eq!(hw.value, "00:11:22");
    }

    #[test]
    fn test_property_value_and_attribute() {
        let entity = parse_message("/fb/v1/device-1/$property/temperature", "21.5", false).unwrap();
        let Entity::DeviceProperty(property) = &entity else {
            panic!("unexpected entity {entity:?}");
        };
        assert_eq!(property.name(), "temperature");
        assert_eq!(property.value(), Some("21.5"));
        assert!(property.attributes().is_empty());

        let entity = parse_message(
            "/fb/v1/device-1/$channel/ch-1/$property/temp/$data-type",
            "float",
            false,
        )
        .unwrap();
        let Entity::ChannelProperty(property) = &entity else {
            panic!("unexpected entity {entity:?}");
        };
        assert_eq!(property.channel(), Some("ch-1"));
        assert_eq!(property.value(), None);
        assert_eq!(
            property.attribute(PropertyAttributeName::DataType).unwrap().value,
            Some(PropertyAttributeValue::DataType(DataType::Float))
        );
    }

    #[test]
    fn test_child_channel_control() {
        let entity = parse_message(
            "/fb/v1/gw/$child/node/$channel/relay/$control/configure",
            r#"{"mode": "on"}"#,
            false,
        )
        .unwrap();
        let Entity::ChannelControl(control) = &entity else {
            panic!("unexpected entity {entity:?}");
        };
        assert_eq!(entity.device(), "node");
        assert_eq!(entity.parent(), Some("gw"));
        assert_eq!(entity.channel(), Some("relay"));
        assert_eq!(control.control(), ControlName::Configure);
        assert!(matches!(control.value(), Some(ControlValue::Configuration(_))));
    }

    #[test]
    fn test_control_schema() {
        let entity = parse_message(
            "/fb/v1/device-1/$control/configure/$schema",
            r#"[{"type": "boolean", "identifier": "led", "name": "LED"}]"#,
            false,
        )
        .unwrap();
        let Entity::DeviceControl(control) = &entity else {
            panic!("unexpected entity {entity:?}");
        };
        assert_eq!(control.schema().unwrap().len(), 1);
        assert_eq!(control.value(), None);
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            parse_message("/fb/v1/device-1/$property/temp/set", "1", false),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_message("/fb/v2/device-1/$name", "x", false),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_message("/fb/v1/device-1/$property/temp/$format", "10:0", false),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_message("/fb/v1/device-1/$control/configure", "[1]", false),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            parse_message("/fb/v1/device-1/$channel/ch/$control/ota", "1", false),
            Err(Error::Parse(_))
        ));
    }
}
