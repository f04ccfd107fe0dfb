//! Identity data model
//!
//! The subject being provisioned. The engine only reads identities, except
//! for applying virtual attribute changes before mapping.

use std::collections::{BTreeSet, HashMap};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idsync_connector::schema::AttributeDataType;
use idsync_connector::operation::AttributeValue;

use crate::ids::IdentityId;

/// A typed value of a plain attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrValue {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl AttrValue {
    /// String form of the value.
    ///
    /// Dates use `conversion_pattern` (a chrono format string) when it is
    /// valid, RFC 3339 otherwise.
    pub fn to_string_form(&self, conversion_pattern: Option<&str>) -> String {
        match self {
            AttrValue::String(s) => s.clone(),
            AttrValue::Long(l) => l.to_string(),
            AttrValue::Double(d) => d.to_string(),
            AttrValue::Boolean(b) => b.to_string(),
            AttrValue::Date(dt) => match conversion_pattern {
                Some(pattern) if is_valid_pattern(pattern) => dt.format(pattern).to_string(),
                _ => dt.to_rfc3339(),
            },
            AttrValue::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Native connector value, without any coercion.
    pub fn to_native(&self) -> AttributeValue {
        match self {
            AttrValue::String(s) => AttributeValue::String(s.clone()),
            AttrValue::Long(l) => AttributeValue::Integer(*l),
            AttrValue::Double(d) => AttributeValue::Float(*d),
            AttrValue::Boolean(b) => AttributeValue::Boolean(*b),
            AttrValue::Date(dt) => AttributeValue::String(dt.to_rfc3339()),
            AttrValue::Binary(bytes) => AttributeValue::Binary(bytes.clone()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(l: i64) -> Self {
        AttrValue::Long(l)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttrValue::Date(dt)
    }
}

fn is_valid_pattern(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Declaration of a plain attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainSchema {
    pub name: String,
    #[serde(default)]
    pub data_type: AttributeDataType,
    /// Values are unique across identities; only the unique value is mapped.
    #[serde(default)]
    pub unique_constraint: bool,
    #[serde(default)]
    pub multivalue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_pattern: Option<String>,
}

impl PlainSchema {
    pub fn new(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            unique_constraint: false,
            multivalue: false,
            conversion_pattern: None,
        }
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique_constraint = true;
        self
    }

    #[must_use]
    pub fn multivalue(mut self) -> Self {
        self.multivalue = true;
        self
    }

    #[must_use]
    pub fn with_conversion_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.conversion_pattern = Some(pattern.into());
        self
    }

    /// Convert a value for a connector, coercing to string when the
    /// connector type system does not carry this schema's type.
    pub fn to_connector_value(&self, value: &AttrValue) -> AttributeValue {
        if self.data_type.is_natively_supported() {
            value.to_native()
        } else {
            AttributeValue::String(value.to_string_form(self.conversion_pattern.as_deref()))
        }
    }
}

/// A plain attribute with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainAttribute {
    pub schema: PlainSchema,
    #[serde(default)]
    pub values: Vec<AttrValue>,
}

impl PlainAttribute {
    pub fn new(schema: PlainSchema, values: Vec<AttrValue>) -> Self {
        Self { schema, values }
    }

    /// Values taking part in mapping: the unique value alone for
    /// unique-constrained schemas, every value otherwise.
    pub fn mapped_values(&self) -> &[AttrValue] {
        if self.schema.unique_constraint {
            &self.values[..self.values.len().min(1)]
        } else {
            &self.values
        }
    }
}

/// A computed attribute: a `${name}` template over plain attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedSchema {
    pub name: String,
    pub expression: String,
}

impl DerivedSchema {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// An externally resolved attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAttribute {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl VirtualAttribute {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Change to one virtual attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAttributeMod {
    pub name: String,
    #[serde(default)]
    pub values_to_add: Vec<String>,
    #[serde(default)]
    pub values_to_remove: Vec<String>,
}

impl VirtualAttributeMod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn add(mut self, value: impl Into<String>) -> Self {
        self.values_to_add.push(value.into());
        self
    }

    #[must_use]
    pub fn remove(mut self, value: impl Into<String>) -> Self {
        self.values_to_remove.push(value.into());
        self
    }
}

/// The subject being provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub username: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub plain: Vec<PlainAttribute>,
    #[serde(default)]
    pub derived: Vec<DerivedSchema>,
    #[serde(default)]
    pub virtual_attrs: Vec<VirtualAttribute>,
    /// Names of the resources this identity is associated with.
    #[serde(default)]
    pub resources: BTreeSet<String>,
}

fn default_enabled() -> bool {
    true
}

impl Identity {
    /// Create an enabled identity with a fresh id.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new(),
            username: username.into(),
            enabled: true,
            plain: Vec::new(),
            derived: Vec::new(),
            virtual_attrs: Vec::new(),
            resources: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: IdentityId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_plain(mut self, schema: PlainSchema, values: Vec<AttrValue>) -> Self {
        self.plain.push(PlainAttribute::new(schema, values));
        self
    }

    #[must_use]
    pub fn with_derived(mut self, schema: DerivedSchema) -> Self {
        self.derived.push(schema);
        self
    }

    #[must_use]
    pub fn with_virtual(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.virtual_attrs.push(VirtualAttribute::new(name, values));
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.insert(resource.into());
        self
    }

    pub fn plain_attribute(&self, name: &str) -> Option<&PlainAttribute> {
        self.plain.iter().find(|a| a.schema.name == name)
    }

    pub fn derived_schema(&self, name: &str) -> Option<&DerivedSchema> {
        self.derived.iter().find(|d| d.name == name)
    }

    pub fn virtual_attribute(&self, name: &str) -> Option<&VirtualAttribute> {
        self.virtual_attrs.iter().find(|v| v.name == name)
    }

    /// Values an expression may refer to: the first value of every plain
    /// attribute in string form, plus `username` and `id`.
    pub fn expression_context(&self) -> HashMap<String, String> {
        let mut context: HashMap<String, String> = self
            .plain
            .iter()
            .filter_map(|attr| {
                attr.values.first().map(|v| {
                    (
                        attr.schema.name.clone(),
                        v.to_string_form(attr.schema.conversion_pattern.as_deref()),
                    )
                })
            })
            .collect();
        context.insert("username".to_string(), self.username.clone());
        context.insert("id".to_string(), self.id.to_string());
        context
    }

    /// Apply virtual attribute changes.
    ///
    /// Attributes named in `to_remove` are dropped; each modification removes
    /// then adds values, creating the attribute when needed. Returns the names
    /// of attributes whose values actually changed.
    pub fn apply_virtual_changes(
        &mut self,
        to_remove: &BTreeSet<String>,
        mods: &[VirtualAttributeMod],
    ) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();

        self.virtual_attrs.retain(|attr| {
            let keep = !to_remove.contains(&attr.name);
            if !keep {
                changed.insert(attr.name.clone());
            }
            keep
        });

        for modification in mods {
            let position = match self
                .virtual_attrs
                .iter()
                .position(|a| a.name == modification.name)
            {
                Some(position) => position,
                None => {
                    self.virtual_attrs
                        .push(VirtualAttribute::new(modification.name.clone(), Vec::new()));
                    self.virtual_attrs.len() - 1
                }
            };
            let attr = &mut self.virtual_attrs[position];
            let before = attr.values.clone();

            attr.values
                .retain(|v| !modification.values_to_remove.contains(v));
            for value in &modification.values_to_add {
                if !attr.values.contains(value) {
                    attr.values.push(value.clone());
                }
            }

            if attr.values != before {
                changed.insert(modification.name.clone());
            }
        }

        changed
    }
}
