//! Cross-module tests: topic grammar, parser, queue and the v1 handler
//! working together. No broker is required.

#[cfg(test)]
mod scenario_tests {
    use crate::convention::{self, Shape};
    use crate::entity::{
        AttributeValue, ControlName, ControlValue, DataType, Format, FormatToken,
        PropertyAttributeName, PropertyAttributeValue, SchemaFieldType,
    };
    use crate::handler::testing::RecordingSession;
    use crate::handler::{ApiV1Handler, Handler, Message};
    use crate::{parse_message, Entity, Error, IngressQueue};

    const VALID_TOPICS: &[&str] = &[
        "/fb/v1/device-1/$name",
        "/fb/v1/device-1/$state",
        "/fb/v1/device-1/$devices",
        "/fb/v1/device-1/$channels",
        "/fb/v1/device-1/$extensions",
        "/fb/v1/device-1/$controls",
        "/fb/v1/device-1/$hw/mac-address",
        "/fb/v1/device-1/$hw/manufacturer",
        "/fb/v1/device-1/$fw/version",
        "/fb/v1/device-1/$property/temp",
        "/fb/v1/device-1/$property/temp/$data-type",
        "/fb/v1/device-1/$property/temp/$format",
        "/fb/v1/device-1/$control/configure",
        "/fb/v1/device-1/$control/configure/$schema",
        "/fb/v1/device-1/$control/reset",
        "/fb/v1/device-1/$channel/ch0/$name",
        "/fb/v1/device-1/$channel/ch0/$controls",
        "/fb/v1/device-1/$channel/ch0/$property/switch",
        "/fb/v1/device-1/$channel/ch0/$property/switch/$settable",
        "/fb/v1/device-1/$channel/ch0/$control/configure",
        "/fb/v1/gateway/$child/sensor-2/$name",
        "/fb/v1/gateway/$child/sensor-2/$hw/model",
        "/fb/v1/gateway/$child/sensor-2/$fw/manufacturer",
        "/fb/v1/gateway/$child/sensor-2/$property/temp/$unit",
        "/fb/v1/gateway/$child/sensor-2/$control/ota",
        "/fb/v1/gateway/$child/sensor-2/$channel/ch0/$name",
        "/fb/v1/gateway/$child/sensor-2/$channel/ch0/$property/switch",
        "/fb/v1/gateway/$child/sensor-2/$channel/ch0/$control/reset",
    ];

    const INVALID_TOPICS: &[&str] = &[
        "/fb/v1/device-1",
        "/fb/v1/Device/$name",
        "/fb/v1/device-1/$unknown",
        "/fb/v1/device-1/$hw/colour",
        "/fb/v1/device-1/$property/temp/$colour",
        "/fb/v1/device-1/$channel/ch0/$state",
        "/fb/v1/device-1/$channel/ch0/$child/sensor-2/$name",
        "/fb/v1/device-1/$channel/ch0/$channel/ch1/$name",
        "/fb/v2/device-1/$name",
        "/other/v1/device-1/$name",
    ];

    #[test]
    fn test_shapes_are_mutually_exclusive() {
        for topic in VALID_TOPICS {
            assert!(convention::validate(topic), "{topic} should be valid");
            let matched: Vec<Shape> = Shape::ALL.into_iter().filter(|s| s.matches(topic)).collect();
            assert_eq!(matched.len(), 1, "{topic} matched {matched:?}");
            assert_eq!(convention::classify(topic), matched.first().copied());
        }
        for topic in INVALID_TOPICS {
            assert!(!convention::validate(topic), "{topic} should be invalid");
            assert!(parse_message(topic, "x", false).is_err());
        }
    }

    #[test]
    fn test_set_topics_never_validate() {
        for topic in VALID_TOPICS {
            let command = format!("{topic}/set");
            assert!(convention::is_command(&command));
            assert!(!convention::validate(&command), "{command} should be rejected");
            assert!(matches!(parse_message(&command, "1", false), Err(Error::Parse(_))));
        }
    }

    #[test]
    fn test_parse_is_idempotent() {
        let cases = [
            ("/fb/v1/device-1/$devices", "a, b, c"),
            ("/fb/v1/device-1/$property/temp/$format", "0:10"),
            ("/fb/v1/device-1/$control/configure", r#"{"a":1}"#),
            ("/fb/v1/gateway/$child/sensor-2/$channel/ch0/$property/switch", "on"),
        ];
        for (topic, payload) in cases {
            let first = parse_message(topic, payload, true).unwrap();
            let second = parse_message(topic, payload, true).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_scenario_data_type_attribute() {
        let entity = parse_message("/fb/v1/device-1/$property/temp/$data-type", "float", false).unwrap();
        let Entity::DeviceProperty(property) = entity else {
            panic!("expected device property");
        };
        assert_eq!(property.name(), "temp");
        assert_eq!(property.attributes().len(), 1);
        let attribute = &property.attributes()[0];
        assert_eq!(attribute.attribute, PropertyAttributeName::DataType);
        assert_eq!(attribute.value, Some(PropertyAttributeValue::DataType(DataType::Float)));
    }

    #[test]
    fn test_scenario_child_channel_command_rejected() {
        let topic = "/fb/v1/device-1/$child/sensor-2/$channel/ch0/$control/configure/set";
        for payload in ["", "true", r#"{"a":1}"#] {
            assert!(parse_message(topic, payload, false).is_err());
        }
        assert!(!convention::validate(topic));
    }

    #[test]
    fn test_scenario_configure_payload() {
        let entity = parse_message("/fb/v1/device-1/$control/configure", r#"{"a":1}"#, false).unwrap();
        let Entity::DeviceControl(control) = entity else {
            panic!("expected device control");
        };
        assert_eq!(control.control(), ControlName::Configure);
        let Some(ControlValue::Configuration(map)) = control.value() else {
            panic!("expected configuration");
        };
        assert_eq!(map.get("a"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_scenario_invalid_configure_payload() {
        let queue = IngressQueue::new(10);
        let handler = ApiV1Handler::new(queue.clone());
        let session = RecordingSession::default();

        assert!(matches!(
            parse_message("/fb/v1/device-1/$control/configure", "not-json", false),
            Err(Error::Parse(_))
        ));
        handler
            .on_message(&session, &Message::new("/fb/v1/device-1/$control/configure", "not-json"))
            .unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_scenario_queue_full() {
        let queue = IngressQueue::new(2);
        let handler = ApiV1Handler::new(queue.clone());
        let session = RecordingSession::default();

        for device in ["a", "b", "c"] {
            let message = Message::new(format!("/fb/v1/{device}/$state"), "ready");
            assert!(handler.on_message(&session, &message).is_ok());
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain_one().unwrap().device(), "a");
        assert_eq!(queue.drain_one().unwrap().device(), "b");
        assert!(queue.drain_one().is_none());
    }

    #[test]
    fn test_schema_round_trip() {
        let schema = r#"[
            {"identifier": "interval", "name": "Interval", "type": "number", "min": 1, "max": 60},
            {"identifier": "label", "name": "Label", "type": "text"},
            {"identifier": "enabled", "name": "Enabled", "type": "boolean", "default": true},
            {"identifier": "mode", "name": "Mode", "type": "select",
             "values": [{"value": "eco", "name": "Eco"}]},
            {"identifier": "broken", "type": "number"},
            {"name": "Nameless", "type": "text"},
            {"identifier": "typeless", "name": "Typeless"}
        ]"#;
        let entity =
            parse_message("/fb/v1/device-1/$control/configure/$schema", schema, false).unwrap();
        let Entity::DeviceControl(control) = entity else {
            panic!("expected device control");
        };

        let rows: Vec<(&str, SchemaFieldType, &str)> = control
            .schema()
            .unwrap()
            .iter()
            .map(|f| (f.identifier.as_str(), f.field_type, f.name.as_str()))
            .collect();
        assert_eq!(
            rows,
            [
                ("interval", SchemaFieldType::Number, "Interval"),
                ("label", SchemaFieldType::Text, "Label"),
                ("enabled", SchemaFieldType::Boolean, "Enabled"),
                ("mode", SchemaFieldType::Select, "Mode"),
            ]
        );
    }

    #[test]
    fn test_devices_list_is_deduplicated() {
        let entity = parse_message("/fb/v1/device-1/$devices", "a, b, b, c", false).unwrap();
        let Entity::DeviceAttribute(attribute) = entity else {
            panic!("expected device attribute");
        };
        let AttributeValue::List(list) = attribute.value else {
            panic!("expected list value");
        };
        assert_eq!(list.len(), 3);
        assert!(["a", "b", "c"].iter().all(|d| list.contains(*d)));
    }

    #[test]
    fn test_format_boundaries() {
        let format = |payload: &str| {
            parse_message("/fb/v1/device-1/$property/temp/$format", payload, false).map(|e| match e {
                Entity::DeviceProperty(p) => p
                    .attribute(PropertyAttributeName::Format)
                    .and_then(|a| a.value.clone()),
                other => panic!("unexpected {other:?}"),
            })
        };

        assert_eq!(
            format("0:10").unwrap(),
            Some(PropertyAttributeValue::Format(Format::Range(Some(0.0), Some(10.0))))
        );
        assert_eq!(
            format("rgb").unwrap(),
            Some(PropertyAttributeValue::Format(Format::Token(FormatToken::Rgb)))
        );
        assert!(format("10:0").is_err());
        assert!(format("a:b").is_err());
        assert!(format("xyz").is_err());
    }

    #[test]
    fn test_retained_flag_is_carried() {
        let queue = IngressQueue::new(10);
        let handler = ApiV1Handler::new(queue.clone());
        let session = RecordingSession::default();

        let message = Message::new("/fb/v1/device-1/$hw/model", "esp32").retained(true);
        handler.on_message(&session, &message).unwrap();
        let entity = queue.drain_one().unwrap();
        assert!(entity.retained());
        assert_eq!(entity.kind(), "hardware");
    }
}
