//! Device and channel controls with their configuration schema.

use super::{DataType, Origin};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

tokens! {
    /// Control a device or channel exposes.
    ControlName, "control" {
        Configure => "configure",
        Reset => "reset",
        Reconnect => "reconnect",
        FactoryReset => "factory-reset",
        Ota => "ota",
    }
}

/// Controls a device may expose.
pub const DEVICE_CONTROLS: &[ControlName] = &[
    ControlName::Configure,
    ControlName::Reset,
    ControlName::Reconnect,
    ControlName::FactoryReset,
    ControlName::Ota,
];

/// Controls a channel may expose.
pub const CHANNEL_CONTROLS: &[ControlName] = &[ControlName::Configure, ControlName::Reset];

tokens! {
    /// Row type of a configure schema.
    SchemaFieldType, "schema type" {
        Number => "number",
        Float => "float",
        Text => "text",
        Boolean => "boolean",
        Select => "select",
    }
}

/// Control value. `configure` carries a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ControlValue {
    Text(String),
    Configuration(Map<String, Value>),
}

/// Option of a `select` schema row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub name: String,
}

/// Type specific parameters of a schema row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaParams {
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
        step: Option<f64>,
        default: Option<f64>,
    },
    Text {
        default: Option<String>,
    },
    Boolean {
        default: bool,
    },
    Select {
        values: Vec<SelectOption>,
        default: Option<String>,
    },
}

/// One validated row of a configure schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaField {
    pub identifier: String,
    pub name: String,
    pub comment: Option<String>,
    #[serde(rename = "type")]
    pub field_type: SchemaFieldType,
    pub data_type: DataType,
    #[serde(flatten)]
    pub params: SchemaParams,
}

impl SchemaField {
    /// Builds a row from one JSON element. Rows missing `type`, `identifier`
    /// or `name`, or with an unknown type, yield `None`.
    fn from_json(row: &Value) -> Option<Self> {
        let row = row.as_object()?;
        let field_type = row.get("type")?.as_str()?.parse::<SchemaFieldType>().ok()?;
        let identifier = text(row.get("identifier")?)?;
        let name = text(row.get("name")?)?;
        let comment = row.get("comment").and_then(text);
        let default = row.get("default");

        let (data_type, params) = match field_type {
            SchemaFieldType::Number | SchemaFieldType::Float => (
                if field_type == SchemaFieldType::Float {
                    DataType::Float
                } else {
                    DataType::Int
                },
                SchemaParams::Numeric {
                    min: row.get("min").and_then(number),
                    max: row.get("max").and_then(number),
                    step: row.get("step").and_then(number),
                    default: default.and_then(number),
                },
            ),
            SchemaFieldType::Text => (
                DataType::String,
                SchemaParams::Text {
                    default: default.and_then(text),
                },
            ),
            SchemaFieldType::Boolean => (
                DataType::Boolean,
                SchemaParams::Boolean {
                    default: default.is_some_and(truthy),
                },
            ),
            SchemaFieldType::Select => (
                DataType::Enum,
                SchemaParams::Select {
                    values: row
                        .get("values")
                        .and_then(Value::as_array)
                        .map(|values| values.iter().filter_map(select_option).collect())
                        .unwrap_or_default(),
                    default: default.and_then(text),
                },
            ),
        };

        Some(Self {
            identifier,
            name,
            comment,
            field_type,
            data_type,
            params,
        })
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn select_option(value: &Value) -> Option<SelectOption> {
    let option = value.as_object()?;
    Some(SelectOption {
        value: text(option.get("value")?)?,
        name: text(option.get("name")?)?,
    })
}

/// Device or channel control report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    #[serde(flatten)]
    origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    control: ControlName,
    value: Option<ControlValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<Vec<SchemaField>>,
}

impl Control {
    /// Creates a device control, rejecting names outside [`DEVICE_CONTROLS`].
    pub fn device(origin: Origin, control: &str) -> Result<Self> {
        Self::build(origin, None, DEVICE_CONTROLS, control)
    }

    /// Creates a channel control, rejecting names outside [`CHANNEL_CONTROLS`].
    pub fn for_channel(origin: Origin, channel: impl Into<String>, control: &str) -> Result<Self> {
        Self::build(origin, Some(channel.into()), CHANNEL_CONTROLS, control)
    }

    fn build(
        origin: Origin,
        channel: Option<String>,
        allowed: &[ControlName],
        control: &str,
    ) -> Result<Self> {
        let control: ControlName = control.parse()?;
        if !allowed.contains(&control) {
            return Err(Error::Validation(format!(
                "provided control '{control}' is not in allowed range"
            )));
        }
        Ok(Self {
            origin,
            channel,
            control,
            value: None,
            schema: None,
        })
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub(crate) fn origin_mut(&mut self) -> &mut Origin {
        &mut self.origin
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn control(&self) -> ControlName {
        self.control
    }

    pub fn value(&self) -> Option<&ControlValue> {
        self.value.as_ref()
    }

    /// Stores the control value. A `configure` value must be a JSON object.
    pub fn set_value(&mut self, payload: &str) -> Result<()> {
        if self.control != ControlName::Configure {
            self.value = Some(ControlValue::Text(payload.to_string()));
            return Ok(());
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| Error::Parse(format!("configuration value is not valid JSON: {e}")))?;
        match value {
            Value::Object(map) => {
                self.value = Some(ControlValue::Configuration(map));
                Ok(())
            }
            _ => Err(Error::Validation(
                "configuration value must be a JSON object".into(),
            )),
        }
    }

    /// Validated schema rows. Only `configure` has a schema.
    pub fn schema(&self) -> Result<&[SchemaField]> {
        self.ensure_configure()?;
        Ok(self.schema.as_deref().unwrap_or_default())
    }

    /// Parses a schema payload (a JSON array of rows).
    ///
    /// Invalid rows are skipped. Identifiers stay unique, the first row wins.
    pub fn set_schema(&mut self, payload: &str) -> Result<()> {
        self.ensure_configure()?;

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| Error::Parse(format!("configuration schema is not valid JSON: {e}")))?;
        let Value::Array(rows) = value else {
            return Err(Error::Validation(
                "configuration schema must be a JSON array".into(),
            ));
        };

        let mut seen = HashSet::new();
        let fields = rows
            .iter()
            .filter_map(SchemaField::from_json)
            .filter(|field| seen.insert(field.identifier.clone()))
            .collect();
        self.schema = Some(fields);
        Ok(())
    }

    fn ensure_configure(&self) -> Result<()> {
        if self.control == ControlName::Configure {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "control '{}' has no configuration schema",
                self.control
            )))
        }
    }
}
