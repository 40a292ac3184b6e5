//! Error types for graph construction and update execution.

use thiserror::Error;

/// Errors reported by the fact store boundary.
///
/// A store may or may not attach a numeric error code to a failure. When no
/// code is available the condition is treated as an invalid-argument class
/// error by convention; `code()` reflects that default.
#[derive(Debug, Clone, Error)]
pub struct StoreError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Store-specific error code, if the store provided one.
    pub code: Option<i32>,
}

impl StoreError {
    /// Create a store error with an explicit store-side error code.
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    /// Create a store error without a code (invalid-argument class).
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// The store's error code, defaulting to the invalid-argument class
    /// when the store did not provide one.
    pub fn code(&self) -> i32 {
        self.code.unwrap_or(StoreError::INVALID)
    }

    /// Code reported for failures the store gave no code for.
    pub const INVALID: i32 = -1;
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "store error {}: {}", code, self.message),
            None => write!(f, "store error (invalid argument): {}", self.message),
        }
    }
}

/// Errors reported by a scripting backend when binding source text.
///
/// Unsupported script kinds are deliberately distinct from other binding
/// failures so the caller can diagnose a misconfigured ruleset (wrong kind
/// name) separately from a broken script.
#[derive(Debug, Error)]
pub enum ScriptCreateError {
    /// The backend does not implement the requested script kind.
    #[error("unsupported script kind")]
    UnsupportedKind,
    /// The kind is known but the source could not be bound.
    #[error("failed to bind script: {0}")]
    Bind(anyhow::Error),
}

/// Errors produced by the resolver.
///
/// Construction-time kinds (cycles, unknown references, script binding and
/// compilation) are fatal: the registry fails to come up. Request-time kinds
/// (`NotFound`, `OutOfRange`, `Store`, `ScriptFailed`) are recoverable; the
/// registry stays structurally intact and usable for subsequent requests.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The declared dependency graph contains a cycle.
    #[error("cyclic dependency: {}", path.join(" -> "))]
    CyclicDependency {
        /// Target names along the cycle, first repeated last.
        path: Vec<String>,
    },

    /// Two target declarations share a name.
    #[error("duplicate target '{name}'")]
    DuplicateTarget {
        /// The repeated target name.
        name: String,
    },

    /// A bare dependency reference does not name any declared target.
    #[error("target '{target}' depends on unknown target '{dependency}'")]
    UnknownDependency {
        /// The target whose dependency list is broken.
        target: String,
        /// The unresolvable reference.
        dependency: String,
    },

    /// The designated auto-update target does not exist.
    #[error("auto-update target '{name}' does not exist")]
    UnknownAutoUpdateTarget {
        /// The designated name.
        name: String,
    },

    /// The registry is too large for the stamp checkpoint buffer.
    #[error("stamp checkpoint capacity exceeded ({ntarget} targets x {nfact} facts)")]
    CapacityExceeded {
        /// Number of targets in the registry.
        ntarget: usize,
        /// Number of registered facts.
        nfact: usize,
    },

    /// A target declaration uses a script kind the backend does not support.
    #[error("unsupported script kind '{kind}' used in target '{target}'")]
    UnsupportedScriptKind {
        /// The offending target.
        target: String,
        /// The unsupported kind name.
        kind: String,
    },

    /// The backend failed to bind a target's script source.
    #[error("failed to set up script for target '{target}': {reason}")]
    ScriptBind {
        /// The offending target.
        target: String,
        /// Backend failure detail.
        reason: anyhow::Error,
    },

    /// The compile pass failed for a target's script.
    #[error("failed to compile script for target '{target}': {reason}")]
    ScriptCompile {
        /// The offending target.
        target: String,
        /// Backend failure detail.
        reason: anyhow::Error,
    },

    /// The prepare pass failed for a target's script.
    #[error("failed to prepare script for target '{target}': {reason}")]
    ScriptPrepare {
        /// The offending target.
        target: String,
        /// Backend failure detail.
        reason: anyhow::Error,
    },

    /// `update_by_name` was called with an unknown target name.
    #[error("no target named '{name}'")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// `update_by_id` was called with an out-of-range index.
    #[error("target id {id} out of range ({ntarget} targets)")]
    OutOfRange {
        /// The requested index.
        id: usize,
        /// Number of targets in the registry.
        ntarget: usize,
    },

    /// An update script reported failure; the pass was rolled back.
    #[error("update script for target '{target}' failed with status {code}")]
    ScriptFailed {
        /// The target whose script failed.
        target: String,
        /// The script's failure status.
        code: i32,
    },

    /// A fact store operation failed (transaction open or commit).
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_code_defaults_to_invalid() {
        let coded = StoreError::with_code("disk full", 28);
        assert_eq!(coded.code(), 28);
        assert_eq!(coded.to_string(), "store error 28: disk full");

        let uncoded = StoreError::invalid("bad handle");
        assert_eq!(uncoded.code(), StoreError::INVALID);
        assert_eq!(uncoded.to_string(), "store error (invalid argument): bad handle");
    }

    #[test]
    fn cycle_error_renders_path() {
        let err = ResolverError::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }
}
