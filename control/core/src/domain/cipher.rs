// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Field-level sealing of credential-bearing documents.
//!
//! Sensitive fields are declared as an explicit list of JSON pointers per
//! document type — the set of sealed fields is known at compile time, no
//! runtime type inspection. The cipher itself is an injected capability;
//! the registry that needs it receives it at construction.

use base64::Engine;
use serde_json::Value;
use thiserror::Error;

/// Sealed fields of a cluster sync object (`ClusterSyncConfig`).
pub const SYNC_CONFIG_SEALED_FIELDS: &[&str] = &["/git/token", "/azure/client_secret"];

/// Symmetric sealing capability. Implementations own key management.
pub trait ValueCipher: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Seal each listed string field in place. Absent fields and null values
/// are skipped; a listed field holding a non-string is refused.
pub fn seal_fields(
    value: &mut Value,
    fields: &[&str],
    cipher: &dyn ValueCipher,
) -> Result<(), CipherError> {
    transform_fields(value, fields, &|plain| {
        let sealed = cipher.seal(plain.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    })
}

/// Inverse of [`seal_fields`].
pub fn open_fields(
    value: &mut Value,
    fields: &[&str],
    cipher: &dyn ValueCipher,
) -> Result<(), CipherError> {
    transform_fields(value, fields, &|sealed| {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(sealed)
            .map_err(|e| CipherError::Malformed(e.to_string()))?;
        let opened = cipher.open(&raw)?;
        String::from_utf8(opened).map_err(|e| CipherError::Malformed(e.to_string()))
    })
}

fn transform_fields(
    value: &mut Value,
    fields: &[&str],
    f: &dyn Fn(&str) -> Result<String, CipherError>,
) -> Result<(), CipherError> {
    for pointer in fields {
        let Some(field) = value.pointer_mut(pointer) else {
            continue;
        };
        match field {
            Value::Null => {}
            Value::String(s) => *s = f(s)?,
            other => {
                return Err(CipherError::Malformed(format!(
                    "sealed field {} must be a string, found {}",
                    pointer,
                    match other {
                        Value::Object(_) => "object",
                        Value::Array(_) => "array",
                        _ => "non-string scalar",
                    }
                )))
            }
        }
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("cipher failure: {0}")]
    Cipher(String),

    #[error("malformed sealed value: {0}")]
    Malformed(String),
}
