//! FastyBird MQTT v1 convention topic grammar.
//!
//! Every inbound topic is rooted at `/fb/v1/` and addresses exactly one of
//! the shapes below. A `/$child/<id>` segment may follow the device id, and a
//! `/$channel/<id>` segment may follow that, never the other way round.
//!
//! | Shape            | Suffix after the device (and child) part                       |
//! |------------------|----------------------------------------------------------------|
//! | device attribute | `$state`, `$name`, `$devices`, `$control(s)`, `$channels`, `$extensions` |
//! | hardware info    | `$hw/<mac-address\|manufacturer\|model\|version\|serial-number>` |
//! | firmware info    | `$fw/<manufacturer\|version>`                                   |
//! | property         | `$property/<id>[/$<name\|settable\|queryable\|data-type\|format\|unit>]` |
//! | control          | `$control/<configure\|reset\|reconnect\|factory-reset\|ota>[/$schema]` |
//! | channel variants | `$channel/<id>/` followed by an attribute, property or control |
//!
//! Topics ending in `/set` are commands written by the connector itself and
//! are never accepted as device reports.
//!
//! All patterns are anchored; segment ids are restricted to `[a-z0-9-]+`.

use once_cell::sync::Lazy;
use regex::Regex;

fn pattern(re: &str) -> Regex {
    // Patterns below are literals covered by tests.
    Regex::new(re).unwrap_or_else(|e| panic!("invalid convention pattern {re}: {e}"))
}

// TOPIC: /fb/*
static CONVENTION_PREFIX: Lazy<Regex> = Lazy::new(|| pattern(r"^/fb/.*$"));
// TOPIC: /fb/v1/*
static API_VERSION: Lazy<Regex> = Lazy::new(|| pattern(r"^/fb/v1/.*$"));
// TOPIC: */set
static COMMAND: Lazy<Regex> = Lazy::new(|| pattern(r"^.*/set$"));

// TOPIC: /fb/v1/<device>/$child/<child>/*
pub(crate) static CHILD_PART: Lazy<Regex> =
    Lazy::new(|| pattern(r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/(.*)$"));
// TOPIC: /fb/v1/<device>/$channel/<channel>/*
pub(crate) static CHANNEL_PART: Lazy<Regex> =
    Lazy::new(|| pattern(r"^/fb/v1/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/.*$"));
// TOPIC: /fb/v1/<device>/$child/<child>/$channel/<channel>/*
pub(crate) static CHILD_CHANNEL_PART: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/.*$")
});

pub(crate) static DEVICE_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^/fb/v1/([a-z0-9-]+)/\$(state|name|devices|controls?|channels|extensions)$")
});
pub(crate) static CHILD_DEVICE_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$(state|name|devices|controls?|channels|extensions)$",
    )
});

pub(crate) static DEVICE_HARDWARE: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^/fb/v1/([a-z0-9-]+)/\$hw/(mac-address|manufacturer|model|version|serial-number)$")
});
pub(crate) static CHILD_DEVICE_HARDWARE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$hw/(mac-address|manufacturer|model|version|serial-number)$",
    )
});

pub(crate) static DEVICE_FIRMWARE: Lazy<Regex> =
    Lazy::new(|| pattern(r"^/fb/v1/([a-z0-9-]+)/\$fw/(manufacturer|version)$"));
pub(crate) static CHILD_DEVICE_FIRMWARE: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$fw/(manufacturer|version)$")
});

pub(crate) static DEVICE_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$property/([a-z0-9-]+)(?:/\$(name|settable|queryable|data-type|format|unit))?$",
    )
});
pub(crate) static CHILD_DEVICE_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$property/([a-z0-9-]+)(?:/\$(name|settable|queryable|data-type|format|unit))?$",
    )
});

static DEVICE_PROPERTY_SET: Lazy<Regex> =
    Lazy::new(|| pattern(r"^/fb/v1/([a-z0-9-]+)/\$property/([a-z0-9-]+)/set$"));
static CHILD_DEVICE_PROPERTY_SET: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$property/([a-z0-9-]+)/set$")
});

pub(crate) static DEVICE_CONTROL: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$control/(configure|reset|reconnect|factory-reset|ota)(?:/\$(schema))?$",
    )
});
pub(crate) static CHILD_DEVICE_CONTROL: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$control/(configure|reset|reconnect|factory-reset|ota)(?:/\$(schema))?$",
    )
});

pub(crate) static CHANNEL_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^/fb/v1/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$(name|devices|controls?)$")
});
pub(crate) static CHILD_CHANNEL_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$(name|devices|controls?)$",
    )
});

pub(crate) static CHANNEL_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$property/([a-z0-9-]+)(?:/\$(name|settable|queryable|data-type|format|unit))?$",
    )
});
pub(crate) static CHILD_CHANNEL_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$property/([a-z0-9-]+)(?:/\$(name|settable|queryable|data-type|format|unit))?$",
    )
});

static CHANNEL_PROPERTY_SET: Lazy<Regex> = Lazy::new(|| {
    pattern(r"^/fb/v1/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$property/([a-z0-9-]+)/set$")
});
static CHILD_CHANNEL_PROPERTY_SET: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$property/([a-z0-9-]+)/set$",
    )
});

pub(crate) static CHANNEL_CONTROL: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$control/(configure|reset)(?:/\$(schema))?$",
    )
});
pub(crate) static CHILD_CHANNEL_CONTROL: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"^/fb/v1/([a-z0-9-]+)/\$child/([a-z0-9-]+)/\$channel/([a-z0-9-]+)/\$control/(configure|reset)(?:/\$(schema))?$",
    )
});

/// Topic shape recognised by the v1 convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    DeviceAttribute,
    DeviceHardware,
    DeviceFirmware,
    DeviceProperty,
    DeviceControl,
    ChannelAttribute,
    ChannelProperty,
    ChannelControl,
}

impl Shape {
    /// All shapes in parser precedence order.
    pub const ALL: [Shape; 8] = [
        Shape::DeviceAttribute,
        Shape::DeviceHardware,
        Shape::DeviceFirmware,
        Shape::DeviceProperty,
        Shape::DeviceControl,
        Shape::ChannelAttribute,
        Shape::ChannelProperty,
        Shape::ChannelControl,
    ];

    /// Whether the topic has this shape.
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Shape::DeviceAttribute => is_device_attribute(topic),
            Shape::DeviceHardware => is_device_hardware(topic),
            Shape::DeviceFirmware => is_device_firmware(topic),
            Shape::DeviceProperty => is_device_property(topic),
            Shape::DeviceControl => is_device_control(topic),
            Shape::ChannelAttribute => is_channel_attribute(topic),
            Shape::ChannelProperty => is_channel_property(topic),
            Shape::ChannelControl => is_channel_control(topic),
        }
    }

    /// Whether the shape lives under a `$channel` segment.
    pub fn is_channel(&self) -> bool {
        matches!(
            self,
            Shape::ChannelAttribute | Shape::ChannelProperty | Shape::ChannelControl
        )
    }
}

/// Topic starts with `/fb/`.
pub fn is_convention(topic: &str) -> bool {
    CONVENTION_PREFIX.is_match(topic)
}

/// Topic starts with `/fb/v1/`.
pub fn is_version(topic: &str) -> bool {
    API_VERSION.is_match(topic)
}

/// Topic ends with `/set`.
pub fn is_command(topic: &str) -> bool {
    COMMAND.is_match(topic)
}

/// Topic carries a `/$child/<id>/` segment right after the device id.
pub fn is_child_scoped(topic: &str) -> bool {
    CHILD_PART.is_match(topic)
}

fn either(top: &Regex, child: &Regex, topic: &str) -> bool {
    top.is_match(topic) || (is_child_scoped(topic) && child.is_match(topic))
}

pub fn is_device_attribute(topic: &str) -> bool {
    either(&DEVICE_ATTRIBUTE, &CHILD_DEVICE_ATTRIBUTE, topic)
}

pub fn is_device_hardware(topic: &str) -> bool {
    either(&DEVICE_HARDWARE, &CHILD_DEVICE_HARDWARE, topic)
}

pub fn is_device_firmware(topic: &str) -> bool {
    either(&DEVICE_FIRMWARE, &CHILD_DEVICE_FIRMWARE, topic)
}

pub fn is_device_property(topic: &str) -> bool {
    either(&DEVICE_PROPERTY, &CHILD_DEVICE_PROPERTY, topic)
}

/// Outbound device property write (`.../$property/<id>/set`).
pub fn is_device_property_set(topic: &str) -> bool {
    either(&DEVICE_PROPERTY_SET, &CHILD_DEVICE_PROPERTY_SET, topic)
}

pub fn is_device_control(topic: &str) -> bool {
    either(&DEVICE_CONTROL, &CHILD_DEVICE_CONTROL, topic)
}

/// Topic carries a `/$channel/<id>/` segment, optionally below a child device.
pub fn is_channel_scoped(topic: &str) -> bool {
    either(&CHANNEL_PART, &CHILD_CHANNEL_PART, topic)
}

pub fn is_channel_attribute(topic: &str) -> bool {
    is_channel_scoped(topic) && either(&CHANNEL_ATTRIBUTE, &CHILD_CHANNEL_ATTRIBUTE, topic)
}

pub fn is_channel_property(topic: &str) -> bool {
    is_channel_scoped(topic) && either(&CHANNEL_PROPERTY, &CHILD_CHANNEL_PROPERTY, topic)
}

/// Outbound channel property write (`.../$channel/<id>/$property/<id>/set`).
pub fn is_channel_property_set(topic: &str) -> bool {
    is_channel_scoped(topic) && either(&CHANNEL_PROPERTY_SET, &CHILD_CHANNEL_PROPERTY_SET, topic)
}

pub fn is_channel_control(topic: &str) -> bool {
    is_channel_scoped(topic) && either(&CHANNEL_CONTROL, &CHILD_CHANNEL_CONTROL, topic)
}

/// Returns the single shape the topic resolves to.
///
/// `None` for command topics, topics outside of `/fb/v1/`, and topics that
/// match no shape or more than one.
pub fn classify(topic: &str) -> Option<Shape> {
    if is_command(topic) || !is_convention(topic) || !is_version(topic) {
        return None;
    }

    let mut found = None;
    for shape in Shape::ALL {
        if shape.matches(topic) {
            if found.is_some() {
                return None;
            }
            found = Some(shape);
        }
    }
    found
}

/// Whether the topic is a valid inbound v1 report.
pub fn validate(topic: &str) -> bool {
    classify(topic).is_some()
}
