//! Device and channel properties.

use super::{clean_name, clean_payload, Origin};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

tokens! {
    /// Property sub-attribute carried as `$property/<id>/$<attribute>`.
    PropertyAttributeName, "property attribute" {
        Name => "name",
        Settable => "settable",
        Queryable => "queryable",
        DataType => "data-type",
        Format => "format",
        Unit => "unit",
    }
}

tokens! {
    /// Value data type of a property or configuration field.
    DataType, "data type" {
        Char => "char",
        Uchar => "uchar",
        Short => "short",
        Ushort => "ushort",
        Int => "int",
        Uint => "uint",
        Float => "float",
        Boolean => "boolean",
        String => "string",
        Enum => "enum",
        Date => "date",
        Time => "time",
        Datetime => "datetime",
        Color => "color",
        Button => "button",
        Switch => "switch",
        Unknown => "unknown",
    }
}

tokens! {
    /// Named formats.
    FormatToken, "format" {
        Rgb => "rgb",
        Hsv => "hsv",
    }
}

static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:]*):([^:]*)$").unwrap_or_else(|e| panic!("range format: {e}"))
});

/// Parsed `$format` value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Format {
    /// Numeric `start:end` range, either bound may be open.
    Range(Option<f64>, Option<f64>),
    /// Allowed values of an enumeration.
    List(BTreeSet<String>),
    Token(FormatToken),
}

impl Format {
    /// Parses a format payload. `none` and blank yield `Ok(None)`.
    pub fn parse(value: &str) -> Result<Option<Format>> {
        let value = value.trim();

        if value.contains(':') {
            let caps = RANGE
                .captures(value)
                .ok_or_else(|| Error::Parse(format!("format '{value}' is not a valid range")))?;
            let start = bound(caps.get(1).map_or("", |m| m.as_str()))?;
            let end = bound(caps.get(2).map_or("", |m| m.as_str()))?;
            if let (Some(start), Some(end)) = (start, end) {
                if start > end {
                    return Err(Error::Parse(format!(
                        "format range start {start} is greater than end {end}"
                    )));
                }
            }
            return Ok(Some(Format::Range(start, end)));
        }

        if value.contains(',') {
            let items = value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect();
            return Ok(Some(Format::List(items)));
        }

        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            return Ok(None);
        }

        value
            .to_lowercase()
            .parse::<FormatToken>()
            .map(|token| Some(Format::Token(token)))
            .map_err(|_| Error::Parse(format!("format '{value}' is not supported")))
    }
}

fn bound(part: &str) -> Result<Option<f64>> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(None);
    }
    match part.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(Error::Parse(format!("range bound '{part}' is not numeric"))),
    }
}

/// Parsed property sub-attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyAttributeValue {
    Bool(bool),
    Text(String),
    DataType(DataType),
    Format(Format),
}

/// One property sub-attribute with its parsed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyAttribute {
    pub attribute: PropertyAttributeName,
    pub value: Option<PropertyAttributeValue>,
}

impl PropertyAttribute {
    pub fn parse(attribute: &str, payload: &str) -> Result<Self> {
        let attribute: PropertyAttributeName = attribute.parse()?;
        let cleaned = clean_payload(payload);
        let cleaned = cleaned.trim();

        let value = match attribute {
            PropertyAttributeName::Settable | PropertyAttributeName::Queryable => {
                Some(PropertyAttributeValue::Bool(cleaned.eq_ignore_ascii_case("true")))
            }
            PropertyAttributeName::Name => Some(PropertyAttributeValue::Text(clean_name(cleaned))),
            PropertyAttributeName::DataType => {
                let data_type = cleaned
                    .parse::<DataType>()
                    .map_err(|_| Error::Parse(format!("data type '{cleaned}' is not supported")))?;
                Some(PropertyAttributeValue::DataType(data_type))
            }
            PropertyAttributeName::Format => Format::parse(cleaned)?.map(PropertyAttributeValue::Format),
            PropertyAttributeName::Unit => {
                if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(PropertyAttributeValue::Text(cleaned.to_string()))
                }
            }
        };

        Ok(Self { attribute, value })
    }
}

/// Device or channel property report.
///
/// A message either carries the property value or one sub-attribute.
/// Attributes behave as a set keyed by attribute name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    #[serde(flatten)]
    origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(rename = "property")]
    name: String,
    value: Option<String>,
    attributes: Vec<PropertyAttribute>,
}

impl Property {
    /// Creates an empty property. `channel` is `None` for device properties.
    pub fn new(origin: Origin, channel: Option<String>, name: impl Into<String>) -> Self {
        Self {
            origin,
            channel,
            name: name.into(),
            value: None,
            attributes: Vec::new(),
        }
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

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw reported value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn set_value(&mut self, payload: &str) {
        self.value = Some(payload.to_string());
    }

    pub fn attributes(&self) -> &[PropertyAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: PropertyAttributeName) -> Option<&PropertyAttribute> {
        self.attributes.iter().find(|a| a.attribute == name)
    }

    /// Parses and stores a sub-attribute, replacing an earlier one of the same name.
    pub fn add_attribute(&mut self, attribute: &str, payload: &str) -> Result<()> {
        let attribute = PropertyAttribute::parse(attribute, payload)?;
        self.attributes.retain(|a| a.attribute != attribute.attribute);
        self.attributes.push(attribute);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_range() {
        assert_eq!(
            Format::parse("0:10").unwrap(),
            Some(Format::Range(Some(0.0), Some(10.0)))
        );
        assert_eq!(
            Format::parse("-5.5:").unwrap(),
            Some(Format::Range(Some(-5.5), None))
        );
        assert!(Format::parse("10:0").is_err());
        assert!(Format::parse("a:b").is_err());
        assert!(Format::parse("1:2:3").is_err());
        assert!(Format::parse("nan:1").is_err());
    }

    #[test]
    fn test_format_list_and_tokens() {
        let Some(Format::List(items)) = Format::parse("on, off,on").unwrap() else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 2);
        assert!(items.contains("on") && items.contains("off"));

        let Some(Format::List(items)) = Format::parse("Auto,Manual").unwrap() else {
            panic!("expected list");
        };
        assert!(items.contains("Auto") && items.contains("Manual"));
        assert!(!items.contains("auto"));

        assert_eq!(Format::parse("none").unwrap(), None);
        assert_eq!(Format::parse("").unwrap(), None);
        assert_eq!(
            Format::parse("rgb").unwrap(),
            Some(Format::Token(FormatToken::Rgb))
        );
        assert!(Format::parse("cmyk").is_err());
    }

    #[test]
    fn test_attribute_values() {
        let attr = PropertyAttribute::parse("settable", "TRUE").unwrap();
        assert_eq!(attr.value, Some(PropertyAttributeValue::Bool(true)));

        let attr = PropertyAttribute::parse("queryable", "yes").unwrap();
        assert_eq!(attr.value, Some(PropertyAttributeValue::Bool(false)));

        let attr = PropertyAttribute::parse("data-type", "float").unwrap();
        assert_eq!(attr.value, Some(PropertyAttributeValue::DataType(DataType::Float)));

        let attr = PropertyAttribute::parse("unit", "none").unwrap();
        assert_eq!(attr.value, None);

        let attr = PropertyAttribute::parse("unit", "°C").unwrap();
        assert_eq!(attr.value, Some(PropertyAttributeValue::Text("°C".into())));

        assert!(matches!(
            PropertyAttribute::parse("data-type", "decimal"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            PropertyAttribute::parse("data-type", "FLOAT"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            PropertyAttribute::parse("type", "int"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_attributes_are_a_set() {
        let mut property = Property::new(Origin::new("dev", None), None, "temperature");
        property.add_attribute("unit", "°C").unwrap();
        property.add_attribute("unit", "°F").unwrap();
        property.add_attribute("settable", "false").unwrap();

        assert_eq!(property.attributes().len(), 2);
        assert_eq!(
            property.attribute(PropertyAttributeName::Unit).unwrap().value,
            Some(PropertyAttributeValue::Text("°F".into()))
        );
    }
}
