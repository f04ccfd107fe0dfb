//! Connector schema types
//!
//! The connector's attribute type system and the object classes a connector
//! reports through schema discovery.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema reported by a connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The object classes available on the external resource.
    pub object_classes: Vec<ObjectClass>,
}

impl Schema {
    /// Create a new empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema with the given object classes.
    #[must_use]
    pub fn with_object_classes(object_classes: Vec<ObjectClass>) -> Self {
        Self { object_classes }
    }

    /// Find an object class by name.
    #[must_use]
    pub fn get_object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.object_classes.iter().find(|oc| oc.name == name)
    }

    /// Names of every attribute over every object class.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.object_classes
            .iter()
            .flat_map(|oc| oc.attributes.iter())
            .map(|a| a.name.as_str())
    }
}

/// An object class on the external resource (e.g. `__ACCOUNT__`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectClass {
    /// Object class name.
    pub name: String,
    /// Attributes of this object class.
    #[serde(default)]
    pub attributes: Vec<SchemaAttribute>,
}

impl ObjectClass {
    /// Create an object class without attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute using builder pattern.
    #[must_use]
    pub fn with_attribute(mut self, attribute: SchemaAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }
}

/// An attribute declared by an object class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaAttribute {
    /// Attribute name.
    pub name: String,
    /// Data type of the attribute values.
    #[serde(default)]
    pub data_type: AttributeDataType,
    /// Whether a value is required on create.
    #[serde(default)]
    pub required: bool,
    /// Whether the attribute holds several values.
    #[serde(default)]
    pub multi_valued: bool,
}

impl SchemaAttribute {
    /// Create an optional single-valued attribute.
    pub fn new(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: false,
            multi_valued: false,
        }
    }

    /// Mark as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as multi-valued.
    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }
}

/// Data type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttributeDataType {
    /// String/text value.
    #[default]
    String,
    /// Integer value.
    Integer,
    /// Long integer value.
    Long,
    /// Boolean value.
    Boolean,
    /// Binary data (bytes).
    Binary,
    /// Decimal/float value.
    Decimal,
    /// Date/time value.
    DateTime,
    /// Date value (no time component).
    Date,
    /// UUID/GUID value.
    Uuid,
    /// JSON object.
    Json,
}

impl AttributeDataType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeDataType::String => "string",
            AttributeDataType::Integer => "integer",
            AttributeDataType::Long => "long",
            AttributeDataType::Boolean => "boolean",
            AttributeDataType::Binary => "binary",
            AttributeDataType::Decimal => "decimal",
            AttributeDataType::DateTime => "datetime",
            AttributeDataType::Date => "date",
            AttributeDataType::Uuid => "uuid",
            AttributeDataType::Json => "json",
        }
    }

    /// Whether connectors accept values of this type as-is.
    ///
    /// Values of any other type are handed over in their string form.
    #[must_use]
    pub fn is_natively_supported(&self) -> bool {
        matches!(
            self,
            AttributeDataType::String
                | AttributeDataType::Integer
                | AttributeDataType::Long
                | AttributeDataType::Boolean
                | AttributeDataType::Binary
                | AttributeDataType::Decimal
        )
    }
}

impl fmt::Display for AttributeDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttributeDataType {
    type Err = ParseAttributeDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(AttributeDataType::String),
            "integer" => Ok(AttributeDataType::Integer),
            "long" => Ok(AttributeDataType::Long),
            "boolean" => Ok(AttributeDataType::Boolean),
            "binary" => Ok(AttributeDataType::Binary),
            "decimal" | "double" => Ok(AttributeDataType::Decimal),
            "datetime" => Ok(AttributeDataType::DateTime),
            "date" => Ok(AttributeDataType::Date),
            "uuid" => Ok(AttributeDataType::Uuid),
            "json" => Ok(AttributeDataType::Json),
            _ => Err(ParseAttributeDataTypeError(s.to_string())),
        }
    }
}

/// Error parsing attribute data type from string.
#[derive(Debug, Clone)]
pub struct ParseAttributeDataTypeError(String);

impl fmt::Display for ParseAttributeDataTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid attribute data type '{}'", self.0)
    }
}

impl std::error::Error for ParseAttributeDataTypeError {}
