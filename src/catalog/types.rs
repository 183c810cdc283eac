//! Catalog data types
//!
//! Defines the syncable record shape shared by products and categories:
//! - Revision and provenance bookkeeping
//! - Tombstones for deletions
//! - Domain payloads for each entity kind

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sync::checksum;

/// Kinds of catalog entities that take part in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Product,
    Category,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Category => "category",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side performed the last accepted mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    /// Records arriving without provenance come from the cloud.
    #[default]
    Cloud,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Origin::Local),
            "cloud" => Ok(Origin::Cloud),
            other => Err(format!("unknown origin '{}'", other)),
        }
    }
}

/// Highest revision a store can hold (SQLite integers are signed)
pub const MAX_REV: u64 = i64::MAX as u64;

/// The revision following `base`, or `None` once the revision space is exhausted
pub fn next_rev(base: u64) -> Option<u64> {
    base.checked_add(1).filter(|rev| *rev <= MAX_REV)
}

/// A catalog entity together with its sync bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord<T> {
    /// Stable identifier
    pub id: String,
    /// Revision, bumped on every accepted mutation
    pub rev: u64,
    /// Side that performed the last mutation
    #[serde(rename = "updatedBy", default)]
    pub updated_by: Origin,
    /// Content hash of the stable fields
    #[serde(default)]
    pub checksum: String,
    /// Timestamp of the last mutation
    #[serde(rename = "updatedAt", default)]
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker
    #[serde(rename = "deletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Domain payload
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SyncRecord<T> {
    /// Stamp a local edit on top of the previous stored version, if any.
    ///
    /// The new revision lands above both the previous revision and the
    /// store-wide high-water mark, so a pull from any watermark already handed
    /// out still sees it. Callers check `next_rev` first; at the top of the
    /// revision space the revision saturates.
    pub fn local_edit(
        id: &str,
        data: T,
        previous: Option<&SyncRecord<T>>,
        high_water: u64,
    ) -> Result<Self, serde_json::Error> {
        let base = previous.map(|p| p.rev).unwrap_or(0).max(high_water);
        let mut record = Self {
            id: id.to_string(),
            rev: next_rev(base).unwrap_or(MAX_REV),
            updated_by: Origin::Local,
            checksum: String::new(),
            updated_at: Utc::now(),
            deleted_at: None,
            data,
        };
        record.refresh_checksum()?;
        Ok(record)
    }

    /// Turn this record into a tombstone at the given revision
    pub fn tombstone(
        mut self,
        origin: Origin,
        rev: u64,
        deleted_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        self.rev = rev;
        self.updated_by = origin;
        self.updated_at = Utc::now();
        self.deleted_at = Some(deleted_at);
        self.refresh_checksum()?;
        Ok(self)
    }

    /// Recompute the checksum from the current payload
    pub fn refresh_checksum(&mut self) -> Result<(), serde_json::Error> {
        self.checksum = checksum(self)?;
        Ok(())
    }
}

impl<T> SyncRecord<T> {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A product as sold by the storefront
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Product {
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Price in minor currency units
    pub price_cents: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub stock: i64,
    pub images: Vec<String>,
    pub attributes: Map<String, Value>,
    /// Fields this agent does not model, kept as received
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A product category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sort position among siblings
    pub position: i32,
    pub attributes: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub type ProductRecord = SyncRecord<Product>;
pub type CategoryRecord = SyncRecord<Category>;

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str) -> Product {
        Product {
            name: name.to_string(),
            slug: name.to_lowercase(),
            price_cents: 1299,
            currency: "EUR".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_local_edit_versioning() {
        let created = SyncRecord::local_edit("p-1", product("Mug"), None, 0).unwrap();
        assert_eq!(created.rev, 1);
        assert_eq!(created.updated_by, Origin::Local);
        assert!(!created.checksum.is_empty());

        let edited = SyncRecord::local_edit("p-1", product("Big Mug"), Some(&created), 1).unwrap();
        assert_eq!(edited.rev, 2);
        assert_ne!(edited.checksum, created.checksum);
    }

    #[test]
    fn test_local_edit_lands_above_high_water() {
        let created = SyncRecord::local_edit("p-1", product("Mug"), None, 0).unwrap();
        let edited = SyncRecord::local_edit("p-1", product("Mug"), Some(&created), 41).unwrap();
        assert_eq!(edited.rev, 42);
    }

    #[test]
    fn test_next_rev_stops_at_store_limit() {
        assert_eq!(next_rev(0), Some(1));
        assert_eq!(next_rev(MAX_REV - 1), Some(MAX_REV));
        assert_eq!(next_rev(MAX_REV), None);
        assert_eq!(next_rev(u64::MAX), None);
    }

    #[test]
    fn test_tombstone() {
        let record = SyncRecord::local_edit("p-1", product("Mug"), None, 0).unwrap();
        let before = record.checksum.clone();

        let tomb = record.tombstone(Origin::Cloud, 7, Utc::now()).unwrap();
        assert!(tomb.is_deleted());
        assert_eq!(tomb.rev, 7);
        assert_eq!(tomb.updated_by, Origin::Cloud);
        assert_ne!(tomb.checksum, before);
    }

    #[test]
    fn test_wire_format() {
        let record = SyncRecord::local_edit("p-1", product("Mug"), None, 0).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], "p-1");
        assert_eq!(json["updatedBy"], "local");
        assert_eq!(json["priceCents"], 1299);
        assert!(json.get("deletedAt").is_none());
    }

    #[test]
    fn test_unmodeled_fields_are_kept() {
        let record: ProductRecord = serde_json::from_value(serde_json::json!({
            "id": "p-1", "rev": 1, "name": "Lamp", "price": 19.99, "brand": "Acme"
        }))
        .unwrap();
        assert_eq!(record.data.name, "Lamp");
        assert_eq!(record.data.extra["brand"], "Acme");
        assert!(!record.data.extra.contains_key("rev"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["price"], 19.99);
        assert_eq!(json["brand"], "Acme");
    }

    #[test]
    fn test_minimal_payload_deserializes() {
        let record: CategoryRecord =
            serde_json::from_str(r#"{"id":"c-1","rev":3}"#).unwrap();
        assert_eq!(record.rev, 3);
        assert_eq!(record.updated_by, Origin::Cloud);
        assert_eq!(record.data, Category::default());
    }
}
