//! Stable hashing helpers for values, pipeline descriptions, and manifests.
//!
//! `Value::fingerprint` is the key used by hash-based stages (`$group` tables,
//! `$lookup` indexes, `$addToSet`). Two values that compare equal under
//! structural equality always share a fingerprint.

use blake3::Hasher;
use serde::Serialize;

use crate::value::{Document, Value};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        // blake3 hex(32b) is 64 hex chars
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    let out = h.finalize();
    Hash256(out.into())
}

pub fn hash_str(s: &str) -> Hash256 {
    hash_bytes(s.as_bytes())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, crate::error::Error> {
    let bytes = serde_json::to_vec(v).map_err(|e| crate::error::Error::Hash(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}

/// Structural fingerprint of a value.
pub fn hash_value(value: &Value) -> Hash256 {
    let mut hasher = Hasher::new();
    feed_value(value, &mut hasher);
    Hash256(hasher.finalize().into())
}

impl Value {
    pub fn fingerprint(&self) -> Hash256 {
        hash_value(self)
    }
}

fn feed_value(value: &Value, hasher: &mut Hasher) {
    // Write type discriminant first
    hasher.update(&[value.kind() as u8]);

    match value {
        Value::Null => {}
        Value::Bool(b) => {
            hasher.update(&[*b as u8]);
        }
        Value::Number(n) => {
            hasher.update(&canonical_bits(*n).to_le_bytes());
        }
        Value::String(s) => {
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                feed_value(item, hasher);
            }
        }
        Value::Document(d) => feed_document(d, hasher),
    }
}

fn feed_document(doc: &Document, hasher: &mut Hasher) {
    hasher.update(&(doc.len() as u64).to_le_bytes());
    for (k, v) in doc.iter() {
        hasher.update(&(k.len() as u64).to_le_bytes());
        hasher.update(k.as_bytes());
        feed_value(v, hasher);
    }
}

/// `-0.0` hashes like `0.0` and every NaN payload hashes alike.
fn canonical_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}
