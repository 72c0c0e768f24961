// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cipher adapters for sealed document fields.

use crate::domain::cipher::{CipherError, ValueCipher};

/// Identity cipher for development and tests. Production deployments
/// inject a KMS-backed implementation at wiring time.
pub struct PassthroughCipher;

impl ValueCipher for PassthroughCipher {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(plaintext.to_vec())
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(sealed.to_vec())
    }
}
