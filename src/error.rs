//! Error types for Kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in Kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Toolchain errors
    #[error("Toolchain {version} for {target} unavailable: {reason}")]
    ToolchainUnavailable {
        version: String,
        target: String,
        reason: String,
    },

    #[error("Invalid toolchain descriptor at {path}: {reason}")]
    ToolchainDescriptorInvalid { path: PathBuf, reason: String },

    // Snapshot errors
    #[error("Source snapshot inconsistent at {path}: {reason}")]
    SnapshotInconsistent { path: PathBuf, reason: String },

    // Build policy errors
    #[error("Non-deterministic input rejected: {input}")]
    NonDeterministicInputRejected { input: String },

    // Build errors
    #[error("Dependency build failed for key {key}: {reason}")]
    DependencyBuildFailed { key: String, reason: String },

    #[error("Variant '{variant}' build failed: {reason}")]
    VariantBuildFailed { variant: String, reason: String },

    #[error("Unknown variant: {name}. Configured variants: {known}")]
    UnknownVariant { name: String, known: String },

    // Registry errors
    #[error("Unknown output: {0}")]
    UnknownOutput(String),

    // Store errors
    #[error("Cache entry at {path} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Short machine-readable kind, used in per-target failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolchainUnavailable { .. } => "toolchain-unavailable",
            Self::ToolchainDescriptorInvalid { .. } => "toolchain-descriptor-invalid",
            Self::SnapshotInconsistent { .. } => "snapshot-inconsistent",
            Self::NonDeterministicInputRejected { .. } => "non-deterministic-input-rejected",
            Self::DependencyBuildFailed { .. } => "dependency-build-failed",
            Self::VariantBuildFailed { .. } => "variant-build-failed",
            Self::UnknownVariant { .. } => "unknown-variant",
            Self::UnknownOutput(_) => "unknown-output",
            Self::StoreCorrupt { .. } => "store-corrupt",
            Self::ConfigInvalid { .. } | Self::ConfigNotFound(_) | Self::ConfigDirCreate { .. } => {
                "config"
            }
            Self::Io { .. } | Self::PathNotFound(_) => "io",
            Self::CommandFailed { .. } | Self::CommandExecution { .. } => "process",
            Self::Json(_) | Self::TomlParse(_) | Self::TomlSerialize(_) => "serialization",
            Self::Internal(_) => "internal",
            Self::User(_) => "user",
        }
    }

    /// Whether the failure is scoped to a single variant rather than the
    /// whole platform graph
    pub fn is_variant_scoped(&self) -> bool {
        matches!(self, Self::VariantBuildFailed { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ToolchainUnavailable { .. } => {
                Some("Check [toolchain] root and mirror in kiln.toml, or install the pinned version")
            }
            Self::NonDeterministicInputRejected { .. } => {
                Some("Pin the input in the lockfile and leave auto_fetch disabled")
            }
            Self::UnknownOutput(_) => Some("Run: kiln config show to list declared packages and apps"),
            Self::ConfigNotFound(_) => Some("Run: kiln init"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = KilnError::UnknownOutput("frob".to_string());
        assert!(err.to_string().contains("Unknown output: frob"));
    }

    #[test]
    fn error_hint() {
        let err = KilnError::UnknownOutput("frob".to_string());
        assert!(err.hint().unwrap().contains("kiln config show"));
    }

    #[test]
    fn error_kind() {
        let err = KilnError::NonDeterministicInputRejected {
            input: "auto_fetch".to_string(),
        };
        assert_eq!(err.kind(), "non-deterministic-input-rejected");
    }

    #[test]
    fn variant_failures_are_variant_scoped() {
        let variant = KilnError::VariantBuildFailed {
            variant: "full".to_string(),
            reason: "boom".to_string(),
        };
        let dep = KilnError::DependencyBuildFailed {
            key: "abc123".to_string(),
            reason: "boom".to_string(),
        };
        assert!(variant.is_variant_scoped());
        assert!(!dep.is_variant_scoped());
    }
}
