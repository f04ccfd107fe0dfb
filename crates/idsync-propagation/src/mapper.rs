//! Attribute mapping
//!
//! Turns an identity into the attribute set a resource's connector expects,
//! one mapping entry at a time. A failing entry is skipped and reported; it
//! never aborts the rest of the mapping.

use tracing::debug;

use idsync_connector::operation::{AttributeSet, AttributeValue, GuardedString, ENABLE, NAME, PASSWORD};

use crate::error::{MappingError, PropagationError, PropagationResult};
use crate::expression;
use crate::identity::Identity;
use crate::resource::{AttributeMapping, ExternalResource, MappingSource};

/// Result of mapping one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedEntry {
    /// Account id candidate, set by account id entries only.
    pub account_id: Option<String>,
    /// External attribute produced by the entry.
    pub attribute: Option<(String, AttributeValue)>,
}

/// A mapping entry that produced nothing, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMapping {
    pub mapping: String,
    pub error: MappingError,
}

/// Result of mapping every entry of a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedAttributes {
    /// Last account id resolved, in mapping order.
    pub account_id: Option<String>,
    pub attributes: AttributeSet,
    pub skipped: Vec<SkippedMapping>,
}

/// Attributes ready to be sent to a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAttributes {
    pub account_id: String,
    pub attributes: AttributeSet,
    pub skipped: Vec<SkippedMapping>,
}

/// Maps identities onto resource attribute models.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMapper;

/// Raw values of a source before shaping: native values plus their string
/// forms (used for account ids and credentials).
struct SourceValues {
    native: Vec<AttributeValue>,
    strings: Vec<String>,
    multivalue_schema: bool,
}

impl SourceValues {
    fn strings(strings: Vec<String>) -> Self {
        Self {
            native: strings.iter().cloned().map(AttributeValue::String).collect(),
            strings,
            multivalue_schema: false,
        }
    }
}

impl AttributeMapper {
    /// Create a new mapper.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn resolve(
        &self,
        mapping: &AttributeMapping,
        identity: &Identity,
        credential: Option<&str>,
    ) -> Result<SourceValues, MappingError> {
        match mapping.source {
            MappingSource::Plain => Ok(match identity.plain_attribute(&mapping.int_attr_name) {
                Some(attr) => {
                    let values = attr.mapped_values();
                    let pattern = attr.schema.conversion_pattern.as_deref();
                    SourceValues {
                        native: values
                            .iter()
                            .map(|v| attr.schema.to_connector_value(v))
                            .collect(),
                        strings: values.iter().map(|v| v.to_string_form(pattern)).collect(),
                        multivalue_schema: attr.schema.multivalue,
                    }
                }
                None => SourceValues::strings(Vec::new()),
            }),
            MappingSource::Derived => {
                let schema = identity.derived_schema(&mapping.int_attr_name).ok_or_else(|| {
                    MappingError::UnknownAttribute {
                        name: mapping.int_attr_name.clone(),
                    }
                })?;
                let value = expression::evaluate(&schema.expression, &identity.expression_context())?;
                Ok(SourceValues::strings(value.into_iter().collect()))
            }
            MappingSource::Virtual => Ok(SourceValues::strings(
                identity
                    .virtual_attribute(&mapping.int_attr_name)
                    .map(|v| v.values.clone())
                    .unwrap_or_default(),
            )),
            MappingSource::Username => Ok(SourceValues::strings(vec![identity.username.clone()])),
            MappingSource::IdentityId => Ok(SourceValues::strings(vec![identity.id.to_string()])),
            MappingSource::Credential => Ok(SourceValues::strings(
                credential.map(str::to_string).into_iter().collect(),
            )),
        }
    }

    /// Map one entry.
    pub fn prepare(
        &self,
        mapping: &AttributeMapping,
        identity: &Identity,
        credential: Option<&str>,
    ) -> Result<PreparedEntry, MappingError> {
        let values = self.resolve(mapping, identity, credential)?;

        if mapping.account_id {
            let account_id = values
                .strings
                .into_iter()
                .find(|v| !v.trim().is_empty())
                .ok_or_else(|| MappingError::NoValue {
                    attribute: mapping.describe(),
                })?;
            return Ok(PreparedEntry {
                account_id: Some(account_id),
                attribute: None,
            });
        }

        if mapping.credential || mapping.source == MappingSource::Credential {
            let attribute = values.strings.into_iter().next().map(|secret| {
                (
                    PASSWORD.to_string(),
                    AttributeValue::Guarded(GuardedString::new(secret)),
                )
            });
            return Ok(PreparedEntry {
                account_id: None,
                attribute,
            });
        }

        let ext_attr_name = mapping
            .ext_attr_name
            .clone()
            .ok_or_else(|| MappingError::UnknownAttribute {
                name: mapping.describe(),
            })?;

        let value = if mapping.multivalue || values.multivalue_schema {
            AttributeValue::Array(values.native)
        } else {
            values
                .native
                .into_iter()
                .next()
                .unwrap_or(AttributeValue::Null)
        };

        Ok(PreparedEntry {
            account_id: None,
            attribute: Some((ext_attr_name, value)),
        })
    }

    /// Map every entry of a resource, collecting failures instead of
    /// stopping at them.
    pub fn prepare_all(
        &self,
        resource: &ExternalResource,
        identity: &Identity,
        credential: Option<&str>,
    ) -> MappedAttributes {
        resource
            .mappings
            .iter()
            .fold(MappedAttributes::default(), |mut acc, mapping| {
                match self.prepare(mapping, identity, credential) {
                    Ok(entry) => {
                        if let Some(account_id) = entry.account_id {
                            acc.account_id = Some(account_id);
                        }
                        if let Some((name, value)) = entry.attribute {
                            // Entries sharing an external name contribute to one value.
                            let value = match acc.attributes.remove(&name) {
                                Some(existing) => existing.union(value),
                                None => value,
                            };
                            acc.attributes.set(name, value);
                        }
                    }
                    Err(error) => {
                        debug!(
                            resource = %resource.name,
                            mapping = %mapping.describe(),
                            reason = %error,
                            "Attribute not mapped"
                        );
                        acc.skipped.push(SkippedMapping {
                            mapping: mapping.describe(),
                            error,
                        });
                    }
                }
                acc
            })
    }

    /// Map a resource and add the external name and the enabled flag.
    ///
    /// The external name is the account link when it evaluates to something,
    /// the account id otherwise.
    pub fn prepare_resource(
        &self,
        resource: &ExternalResource,
        identity: &Identity,
        credential: Option<&str>,
        enable: Option<bool>,
    ) -> PropagationResult<PreparedAttributes> {
        let MappedAttributes {
            account_id,
            mut attributes,
            mut skipped,
        } = self.prepare_all(resource, identity, credential);

        let account_id = account_id.ok_or_else(|| PropagationError::MissingAccountId {
            resource: resource.name.clone(),
        })?;

        let linked_name = match resource.account_link.as_deref() {
            Some(link) if !link.trim().is_empty() => {
                match expression::evaluate(link, &identity.expression_context()) {
                    Ok(name) => name,
                    Err(error) => {
                        debug!(resource = %resource.name, reason = %error, "Account link not evaluated");
                        skipped.push(SkippedMapping {
                            mapping: format!("{link} -> {NAME}"),
                            error,
                        });
                        None
                    }
                }
            }
            _ => None,
        };
        attributes.set(NAME, linked_name.unwrap_or_else(|| account_id.clone()));

        if let Some(enabled) = enable {
            attributes.set(ENABLE, enabled);
        }

        Ok(PreparedAttributes {
            account_id,
            attributes,
            skipped,
        })
    }
}
