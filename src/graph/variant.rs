//! Build variants
//!
//! A variant is a named build configuration distinguished only by its
//! optional-feature selection. Variants are validated against the fixed set
//! declared in configuration; sibling variants share the dependency cache
//! entry for their platform.

use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An immutable variant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant name
    pub name: String,

    /// Feature flags for the top-level build. Ordered set so rendered
    /// feature lists are stable.
    pub features: BTreeSet<String>,
}

impl Variant {
    /// Resolve a configured variant by name
    pub fn resolve(name: &str, config: &Config) -> KilnResult<Self> {
        let declared = config
            .variant(name)
            .ok_or_else(|| KilnError::UnknownVariant {
                name: name.to_string(),
                known: config.variant_names(),
            })?;

        Ok(Self {
            name: declared.name.clone(),
            features: declared.features.clone(),
        })
    }

    /// Resolve the configured variant with exactly this feature set.
    /// Feature selection is never ad-hoc; an unrecognized combination is an
    /// error rather than a new build mode.
    pub fn resolve_by_features(features: &[String], config: &Config) -> KilnResult<Self> {
        let requested: BTreeSet<String> = features.iter().cloned().collect();

        config
            .variants
            .iter()
            .find(|v| v.features == requested)
            .map(|v| Self {
                name: v.name.clone(),
                features: v.features.clone(),
            })
            .ok_or_else(|| KilnError::UnknownVariant {
                name: format!("[{}]", features.join(", ")),
                known: config.variant_names(),
            })
    }

    /// Comma-joined feature list for driver invocation
    pub fn feature_args(&self) -> String {
        self.features.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
