//! Derivation key computation
//!
//! A derivation key uniquely identifies the cache-relevant inputs of one
//! dependency compilation: target platform, toolchain identifier, source
//! snapshot hash, lockfile content hash, and the offline policy flag.
//! Variant feature flags only affect the top-level build and are therefore
//! not inputs; two variants with the same dependency-affecting inputs share
//! one key, and one cache entry.

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Domain separator; bump when the key layout changes
const KEY_DOMAIN: &[u8] = b"kiln-derivation-v1";

/// The dependency-affecting input subset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepInputs {
    /// SHA-256 of the lockfile pinning the dependency graph
    pub lockfile_hash: String,

    /// Whether the driver may auto-download unpinned inputs. Always false
    /// for builds that get this far; hashed so a future policy change
    /// cannot silently reuse old entries.
    pub auto_fetch: bool,
}

impl DepInputs {
    /// Read the dependency-affecting inputs for a source tree.
    ///
    /// An enabled auto-fetch policy or an unpinned dependency graph is
    /// rejected here, before any key is derived: identical keys must always
    /// map to identical artifacts.
    pub fn read(source_root: &Path, lockfile: &str, auto_fetch: bool) -> KilnResult<Self> {
        if auto_fetch {
            return Err(KilnError::NonDeterministicInputRejected {
                input: "auto_fetch is enabled".to_string(),
            });
        }

        let lockfile_path = source_root.join(lockfile);
        let contents = std::fs::read(&lockfile_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KilnError::NonDeterministicInputRejected {
                    input: format!("{lockfile} is missing, dependency graph is not pinned"),
                }
            } else {
                KilnError::io(format!("reading lockfile {}", lockfile_path.display()), e)
            }
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);

        Ok(Self {
            lockfile_hash: hex::encode(hasher.finalize()),
            auto_fetch,
        })
    }
}

/// Content-derived identifier of one dependency cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationKey(String);

impl DerivationKey {
    /// Compute the key from the dependency-affecting inputs.
    ///
    /// Fields are length-prefixed so adjacent inputs can never collide by
    /// concatenation, and the computation is bit-stable across machines.
    pub fn compute(
        target: &str,
        toolchain_identifier: &str,
        snapshot_hash: &str,
        inputs: &DepInputs,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_DOMAIN);

        for field in [target, toolchain_identifier, snapshot_hash, &inputs.lockfile_hash] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update([u8::from(inputs.auto_fetch)]);

        Self(hex::encode(hasher.finalize()))
    }

    /// Full hex digest, used as the store directory name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs and reports
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for DerivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}
