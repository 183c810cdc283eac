//! Content checksums
//!
//! Hashes only the domain content of a record. Bookkeeping that changes on
//! every write (`rev`, `updatedBy`, `checksum`, `updatedAt`) is excluded, and
//! object keys are sorted recursively so the digest does not depend on field
//! order in transit.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::catalog::SyncRecord;

const VOLATILE_FIELDS: [&str; 4] = ["rev", "updatedBy", "checksum", "updatedAt"];

/// Compute the hex SHA-256 checksum of a record's stable fields
pub fn checksum<T: Serialize>(record: &SyncRecord<T>) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        for field in VOLATILE_FIELDS {
            map.remove(field);
        }
    }
    checksum_value(&value)
}

/// Compute the checksum of an arbitrary JSON value after canonicalization
pub fn checksum_value(value: &Value) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(&canonicalize(value))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Rebuild a value with object keys in sorted order.
///
/// `serde_json::Map` keeps insertion order when the `preserve_order` feature is
/// enabled anywhere in the build, so sorting is done here explicitly.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Origin, Product, ProductRecord};
    use chrono::Utc;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: ProductRecord = serde_json::from_str(
            r#"{"id":"p-1","rev":1,"name":"Mug","priceCents":900,
                "attributes":{"color":"blue","size":"L"}}"#,
        )
        .unwrap();
        let b: ProductRecord = serde_json::from_str(
            r#"{"attributes":{"size":"L","color":"blue"},"priceCents":900,
                "name":"Mug","rev":1,"id":"p-1"}"#,
        )
        .unwrap();

        assert_eq!(checksum(&a).unwrap(), checksum(&b).unwrap());
    }

    #[test]
    fn test_raw_values_with_reordered_keys() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":{"b":2,"a":[{"k":1,"j":2}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":{"a":[{"j":2,"k":1}],"b":2},"x":1}"#).unwrap();

        assert_eq!(checksum_value(&a).unwrap(), checksum_value(&b).unwrap());
    }

    #[test]
    fn test_bookkeeping_is_ignored() {
        let record = ProductRecord {
            id: "p-1".to_string(),
            rev: 1,
            updated_by: Origin::Local,
            checksum: String::new(),
            updated_at: Utc::now(),
            deleted_at: None,
            data: Product::default(),
        };
        let mut bumped = record.clone();
        bumped.rev = 99;
        bumped.updated_by = Origin::Cloud;
        bumped.checksum = "stale".to_string();
        bumped.updated_at = Utc::now() + chrono::Duration::hours(1);

        assert_eq!(checksum(&record).unwrap(), checksum(&bumped).unwrap());
    }

    #[test]
    fn test_content_and_tombstone_change_the_hash() {
        let record: ProductRecord = serde_json::from_str(r#"{"id":"p-1","rev":1}"#).unwrap();

        let mut renamed = record.clone();
        renamed.data.name = "Renamed".to_string();
        assert_ne!(checksum(&record).unwrap(), checksum(&renamed).unwrap());

        let mut deleted = record.clone();
        deleted.deleted_at = Some(Utc::now());
        assert_ne!(checksum(&record).unwrap(), checksum(&deleted).unwrap());
    }

    #[test]
    fn test_hex_sha256_format() {
        let sum = checksum_value(&Value::Null).unwrap();
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
