//! Document and message record types.
//!
//! A `MessageRecord` is what the chat layer hands over for every incoming
//! message. It is flattened into a `Document` whose fields line up with the
//! message schema one to one.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::schema::{
    FIELD_BODY, FIELD_FROM_DOMAIN, FIELD_FROM_NODE, FIELD_FROM_RESOURCE, FIELD_TO_DOMAIN,
    FIELD_TO_NODE, FIELD_TO_RESOURCE, FIELD_TS,
};

/// A chat identity split into its address components.
///
/// Any component may be empty (a room has no resource, a server has no node).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub node: String,
    pub domain: String,
    pub resource: String,
}

impl Address {
    pub fn new(
        node: impl Into<String>,
        domain: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            domain: domain.into(),
            resource: resource.into(),
        }
    }

    /// Parse `node@domain/resource`. Node and resource are optional.
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let (bare, resource) = match s.split_once('/') {
            Some((bare, resource)) => (bare, resource),
            None => (s, ""),
        };
        let (node, domain) = match bare.split_once('@') {
            Some((node, domain)) => (node, domain),
            None => ("", bare),
        };
        if domain.is_empty() {
            return Err(TypesError::InvalidInput(format!(
                "address without domain: {:?}",
                s
            )));
        }
        Ok(Self::new(node, domain, resource))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.node.is_empty() {
            write!(f, "{}@", self.node)?;
        }
        f.write_str(&self.domain)?;
        if !self.resource.is_empty() {
            write!(f, "/{}", self.resource)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An incoming chat message as supplied by the chat layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub timestamp: DateTime<Utc>,
    pub from: Address,
    pub to: Address,
    pub body: String,
}

impl MessageRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        from: Address,
        to: Address,
        body: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            from,
            to,
            body: body.into(),
        }
    }
}

/// A field value borrowed from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Timestamp(DateTime<Utc>),
    Str(&'a str),
}

impl<'a> FieldValue<'a> {
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            FieldValue::Str(_) => None,
        }
    }
}

/// One indexed chat message.
///
/// Documents are immutable once appended. The timestamp is kept at
/// microsecond resolution so a stored document reads back identical; a
/// document built with a finer `ts` is truncated on append (see
/// `normalized`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub from_node: String,
    #[serde(default)]
    pub from_domain: String,
    #[serde(default)]
    pub from_resource: String,
    #[serde(default)]
    pub to_node: String,
    #[serde(default)]
    pub to_domain: String,
    #[serde(default)]
    pub to_resource: String,
    pub body: String,
}

impl Document {
    /// Create a document with empty addresses.
    pub fn new(ts: DateTime<Utc>, body: impl Into<String>) -> Self {
        Self {
            ts: ts.trunc_subsecs(6),
            from_node: String::new(),
            from_domain: String::new(),
            from_resource: String::new(),
            to_node: String::new(),
            to_domain: String::new(),
            to_resource: String::new(),
            body: body.into(),
        }
    }

    /// Set the sender address.
    pub fn with_from(mut self, from: &Address) -> Self {
        self.from_node = from.node.clone();
        self.from_domain = from.domain.clone();
        self.from_resource = from.resource.clone();
        self
    }

    /// Set the recipient address.
    pub fn with_to(mut self, to: &Address) -> Self {
        self.to_node = to.node.clone();
        self.to_domain = to.domain.clone();
        self.to_resource = to.resource.clone();
        self
    }

    /// Flatten a chat message into a document.
    pub fn from_record(record: &MessageRecord) -> Self {
        Self::new(record.timestamp, record.body.clone())
            .with_from(&record.from)
            .with_to(&record.to)
    }

    pub fn from_address(&self) -> Address {
        Address::new(&self.from_node, &self.from_domain, &self.from_resource)
    }

    pub fn to_address(&self) -> Address {
        Address::new(&self.to_node, &self.to_domain, &self.to_resource)
    }

    /// The document as it is stored: `ts` truncated to microseconds.
    pub fn normalized(&self) -> Cow<'_, Document> {
        if self.ts.timestamp_subsec_nanos() % 1_000 == 0 {
            return Cow::Borrowed(self);
        }
        let mut doc = self.clone();
        doc.ts = doc.ts.trunc_subsecs(6);
        Cow::Owned(doc)
    }

    /// Timestamp as microseconds since the Unix epoch.
    pub fn timestamp_micros(&self) -> i64 {
        self.ts.timestamp_micros()
    }

    /// Whether the body carries any searchable content.
    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// Look up a value by schema field name.
    pub fn field_value(&self, name: &str) -> Option<FieldValue<'_>> {
        let value = match name {
            FIELD_TS => return Some(FieldValue::Timestamp(self.ts)),
            FIELD_FROM_NODE => &self.from_node,
            FIELD_FROM_DOMAIN => &self.from_domain,
            FIELD_FROM_RESOURCE => &self.from_resource,
            FIELD_TO_NODE => &self.to_node,
            FIELD_TO_DOMAIN => &self.to_domain,
            FIELD_TO_RESOURCE => &self.to_resource,
            FIELD_BODY => &self.body,
            _ => return None,
        };
        Some(FieldValue::Str(value))
    }

    /// Field-keyed view for templated rendering.
    ///
    /// The timestamp is rendered as RFC 3339 with microseconds.
    pub fn to_record(&self) -> BTreeMap<String, String> {
        let mut record = BTreeMap::new();
        record.insert(
            FIELD_TS.to_string(),
            self.ts.to_rfc3339_opts(SecondsFormat::Micros, true),
        );
        record.insert(FIELD_FROM_NODE.to_string(), self.from_node.clone());
        record.insert(FIELD_FROM_DOMAIN.to_string(), self.from_domain.clone());
        record.insert(FIELD_FROM_RESOURCE.to_string(), self.from_resource.clone());
        record.insert(FIELD_TO_NODE.to_string(), self.to_node.clone());
        record.insert(FIELD_TO_DOMAIN.to_string(), self.to_domain.clone());
        record.insert(FIELD_TO_RESOURCE.to_string(), self.to_resource.clone());
        record.insert(FIELD_BODY.to_string(), self.body.clone());
        record
    }

    /// Serialize document to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize document from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
