//! Document schema.
//!
//! The schema is fixed when an index is created and persisted next to the
//! documents. Reopening an index compares the stored schema against the
//! expected one; any difference refuses the open.
//!
//! Message schema:
//! - ts: TIMESTAMP | STORED
//! - from_node, from_domain, from_resource: IDENTIFIER | STORED
//! - to_node, to_domain, to_resource: IDENTIFIER | STORED
//! - body: TEXT | STORED (default query field)

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Version of the persisted schema descriptor layout.
pub const SCHEMA_VERSION: u32 = 1;

pub const FIELD_TS: &str = "ts";
pub const FIELD_FROM_NODE: &str = "from_node";
pub const FIELD_FROM_DOMAIN: &str = "from_domain";
pub const FIELD_FROM_RESOURCE: &str = "from_resource";
pub const FIELD_TO_NODE: &str = "to_node";
pub const FIELD_TO_DOMAIN: &str = "to_domain";
pub const FIELD_TO_RESOURCE: &str = "to_resource";
pub const FIELD_BODY: &str = "body";

/// How a field is indexed and matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Point in time, range-searchable
    Timestamp,
    /// Opaque string, exact match only
    Identifier,
    /// Tokenized free text
    Text,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Timestamp => "timestamp",
            FieldKind::Identifier => "identifier",
            FieldKind::Text => "text",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub stored: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            stored: true,
        }
    }
}

/// The fixed set of typed fields describing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    version: u32,
    fields: Vec<FieldDef>,
    default_field: String,
}

impl Schema {
    /// Build a schema from field definitions.
    ///
    /// Field names must be unique, exactly one field must be a timestamp and
    /// the default field must be a text field of this schema.
    pub fn new(
        fields: Vec<FieldDef>,
        default_field: impl Into<String>,
    ) -> Result<Self, TypesError> {
        let default_field = default_field.into();

        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(TypesError::InvalidInput("empty field name".into()));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(TypesError::InvalidInput(format!(
                    "duplicate field: {}",
                    field.name
                )));
            }
        }

        let timestamps = fields
            .iter()
            .filter(|f| f.kind == FieldKind::Timestamp)
            .count();
        if timestamps != 1 {
            return Err(TypesError::InvalidInput(format!(
                "schema needs exactly one timestamp field, found {}",
                timestamps
            )));
        }

        match fields.iter().find(|f| f.name == default_field) {
            Some(f) if f.kind == FieldKind::Text => {}
            Some(f) => {
                return Err(TypesError::InvalidInput(format!(
                    "default field {} is {}, expected text",
                    f.name, f.kind
                )))
            }
            None => {
                return Err(TypesError::InvalidInput(format!(
                    "default field {} is not in the schema",
                    default_field
                )))
            }
        }

        Ok(Self {
            version: SCHEMA_VERSION,
            fields,
            default_field,
        })
    }

    /// The canonical chat message schema.
    pub fn message() -> Self {
        Self {
            version: SCHEMA_VERSION,
            fields: vec![
                FieldDef::new(FIELD_TS, FieldKind::Timestamp),
                FieldDef::new(FIELD_FROM_NODE, FieldKind::Identifier),
                FieldDef::new(FIELD_FROM_DOMAIN, FieldKind::Identifier),
                FieldDef::new(FIELD_FROM_RESOURCE, FieldKind::Identifier),
                FieldDef::new(FIELD_TO_NODE, FieldKind::Identifier),
                FieldDef::new(FIELD_TO_DOMAIN, FieldKind::Identifier),
                FieldDef::new(FIELD_TO_RESOURCE, FieldKind::Identifier),
                FieldDef::new(FIELD_BODY, FieldKind::Text),
            ],
            default_field: FIELD_BODY.to_string(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Field targeted by bare query terms.
    pub fn default_field(&self) -> &str {
        &self.default_field
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.field(name).map(|f| f.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Name of the single timestamp field.
    pub fn timestamp_field(&self) -> &str {
        self.fields
            .iter()
            .find(|f| f.kind == FieldKind::Timestamp)
            .map(|f| f.name.as_str())
            .unwrap_or(FIELD_TS)
    }

    /// Fields of the given kind, in schema order.
    pub fn fields_of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }

    /// Serialize the descriptor for persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a persisted descriptor.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::message()
    }
}
