//! Connector operation types
//!
//! Types exchanged with connectors: UIDs, attribute sets, remote objects,
//! operation options and synchronization deltas.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Name of the attribute carrying the external unique name of an object.
pub const NAME: &str = "__NAME__";

/// Name of the attribute carrying the external unique identifier.
pub const UID: &str = "__UID__";

/// Name of the attribute carrying a credential.
pub const PASSWORD: &str = "__PASSWORD__";

/// Name of the operational attribute carrying the enabled flag.
pub const ENABLE: &str = "__ENABLE__";

/// Object class used for identities.
pub const ACCOUNT: &str = "__ACCOUNT__";

/// Unique identifier for an object on an external resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid {
    /// The attribute name used as the identifier.
    attribute_name: String,
    /// The actual value of the identifier.
    value: String,
}

impl Uid {
    /// Create a new UID with the given attribute name and value.
    pub fn new(attribute_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            value: value.into(),
        }
    }

    /// Create a UID using the framework `__UID__` attribute name.
    pub fn from_value(value: impl Into<String>) -> Self {
        Self::new(UID, value)
    }

    /// Get the attribute name.
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Get the value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute_name, self.value)
    }
}

/// A secret string that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct GuardedString(String);

impl GuardedString {
    /// Wrap a clear-text secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the clear-text secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GuardedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GuardedString(********)")
    }
}

impl Serialize for GuardedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("********")
    }
}

/// A value for an attribute, which may be single or multi-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No value (null).
    Null,
    /// A single string value.
    String(String),
    /// A single integer value.
    Integer(i64),
    /// A single boolean value.
    Boolean(bool),
    /// A single floating-point value.
    Float(f64),
    /// Binary data.
    Binary(Vec<u8>),
    /// A guarded secret, such as a password.
    #[serde(skip_deserializing)]
    Guarded(GuardedString),
    /// Multiple values.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Get as a string if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as strings (works for both single and multi-valued).
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            AttributeValue::String(s) => vec![s.as_str()],
            AttributeValue::Array(arr) => arr.iter().filter_map(|v| v.as_string()).collect(),
            _ => vec![],
        }
    }



    /// Get the guarded secret if this is one.
    pub fn as_guarded(&self) -> Option<&GuardedString> {
        match self {
            AttributeValue::Guarded(g) => Some(g),
            _ => None,
        }
    }


    /// Check if this is multi-valued.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributeValue::Array(_))
    }

    /// Union with `other` into a multi-valued value.
    ///
    /// Nulls are dropped and each value is kept once, first occurrence first.
    #[must_use]
    pub fn union(self, other: AttributeValue) -> AttributeValue {
        let mut merged: Vec<AttributeValue> = Vec::new();
        for value in self.into_values().into_iter().chain(other.into_values()) {
            if !merged.contains(&value) {
                merged.push(value);
            }
        }
        AttributeValue::Array(merged)
    }

    fn into_values(self) -> Vec<AttributeValue> {
        match self {
            AttributeValue::Null => Vec::new(),
            AttributeValue::Array(values) => values,
            value => vec![value],
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<GuardedString> for AttributeValue {
    fn from(g: GuardedString) -> Self {
        AttributeValue::Guarded(g)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(vec: Vec<T>) -> Self {
        AttributeValue::Array(vec.into_iter().map(Into::into).collect())
    }
}

/// A set of attributes sent to or read from a connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    /// Map of attribute name to attribute value(s).
    #[serde(flatten)]
    attributes: HashMap<String, AttributeValue>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
        }
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_string())
    }

    /// Get a multi-valued string attribute.
    pub fn get_strings(&self, name: &str) -> Option<Vec<&str>> {
        self.get(name).map(|v| v.as_strings())
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// The external unique name (`__NAME__`), if present.
    pub fn name(&self) -> Option<&str> {
        self.get_string(NAME)
    }

    /// The external unique identifier (`__UID__`), if present.
    pub fn uid(&self) -> Option<&str> {
        self.get_string(UID)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|s| s.as_str())
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// An object read from an external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorObject {
    /// Object class of the remote object.
    pub object_class: String,
    /// Unique identifier on the external resource.
    pub uid: Uid,
    /// Unique name on the external resource.
    pub name: String,
    /// Remaining attributes.
    #[serde(default)]
    pub attributes: AttributeSet,
}

impl ConnectorObject {
    /// Create a remote object.
    pub fn new(object_class: impl Into<String>, uid: Uid, name: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            uid,
            name: name.into(),
            attributes: AttributeSet::new(),
        }
    }

    /// Add attributes using builder pattern.
    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    /// Get an attribute by name, including the `__NAME__` and `__UID__` specials.
    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        match name {
            NAME => Some(AttributeValue::String(self.name.clone())),
            UID => Some(AttributeValue::String(self.uid.value().to_string())),
            _ => self.attributes.get(name).cloned(),
        }
    }
}

/// Options passed along with a connector operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOptions {
    /// Restrict the attributes read back from the external resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,
}

impl OperationOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict read-back attributes.
    pub fn with_attributes_to_get(mut self, names: Vec<String>) -> Self {
        self.attributes_to_get = Some(names);
        self
    }
}

/// Opaque synchronization position on an external resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(String);

impl SyncToken {
    /// Wrap a token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the token value.
    pub fn value(&self) -> &str {
        &self.0
    }
}

/// Kind of change reported by a synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDeltaType {
    /// The object was created or updated.
    CreateOrUpdate,
    /// The object was deleted.
    Delete,
}

/// A change detected on an external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDelta {
    /// Position of this change.
    pub token: SyncToken,
    /// Kind of change.
    pub delta_type: SyncDeltaType,
    /// Identifier of the changed object.
    pub uid: Uid,
    /// Current state of the object (absent for deletions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ConnectorObject>,
}

impl SyncDelta {
    /// Delta for an object that exists on the resource.
    pub fn create_or_update(token: SyncToken, object: ConnectorObject) -> Self {
        Self {
            token,
            delta_type: SyncDeltaType::CreateOrUpdate,
            uid: object.uid.clone(),
            object: Some(object),
        }
    }

    /// Delta for an object removed from the resource.
    pub fn delete(token: SyncToken, uid: Uid) -> Self {
        Self {
            token,
            delta_type: SyncDeltaType::Delete,
            uid,
            object: None,
        }
    }
}
