//! Tool sandboxing policy — path validation and application allowlists.
//!
//! Ensures file tools can only access paths within allowed roots, blocks
//! access to forbidden paths (e.g., ~/.ssh), and restricts which
//! applications the launcher may start.

use std::path::{Path, PathBuf};

/// The sandboxing policy shared by the built-in tools.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// Applications the launcher may start. Empty = deny all.
    pub allowed_commands: Vec<String>,
    /// Roots the file tools may touch. Empty = allow all.
    pub allowed_roots: Vec<String>,
    /// Path prefixes the file tools must never touch.
    pub forbidden_paths: Vec<String>,
}

impl Policy {
    /// Whether `command` names an allowlisted application.
    pub fn command_allowed(&self, command: &str) -> bool {
        let base = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base)
    }
}

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Validate that a path is safe to access.
///
/// Checks:
/// 1. No path traversal (`..` sequences) in the raw string
/// 2. Path is canonicalized to resolve symlinks and relative components
/// 3. Path is within allowed roots (if any are configured)
/// 4. Path is not under a forbidden prefix
///
/// Returns the canonicalized (resolved) path on success.
pub fn validate_path(path: &str, policy: &Policy) -> Result<PathBuf, PathValidationError> {
    let input_path = Path::new(path);

    let path_str = path.replace('\\', "/");
    if path_str.contains("../") || path_str.contains("/..") || path_str == ".." {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    // Canonicalize to resolve symlinks, `.`, `..`, etc. If the file doesn't
    // exist yet (e.g., for writes), canonicalize the parent instead.
    let canonical = if input_path.exists() {
        input_path
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: path.into(),
                reason: e.to_string(),
            })?
    } else if let Some(parent) = input_path.parent()
        && parent.exists()
    {
        let canonical_parent =
            parent
                .canonicalize()
                .map_err(|e| PathValidationError::CanonicalizeFailed {
                    path: path.into(),
                    reason: format!("Parent dir: {e}"),
                })?;
        canonical_parent.join(input_path.file_name().unwrap_or_default())
    } else {
        input_path.to_path_buf()
    };

    let canonical_str = canonical.to_string_lossy().replace('\\', "/").to_lowercase();

    for forbidden in &policy.forbidden_paths {
        let expanded = expand_tilde(forbidden);
        let forbidden_normalized = expanded.replace('\\', "/").to_lowercase();

        if canonical_str.starts_with(&forbidden_normalized) {
            return Err(PathValidationError::ForbiddenPath {
                path: path.into(),
                pattern: forbidden.clone(),
            });
        }
    }

    if !policy.allowed_roots.is_empty() {
        let is_allowed = policy.allowed_roots.iter().any(|root| {
            let expanded = expand_tilde(root);
            let root_normalized = expanded.replace('\\', "/").to_lowercase();
            canonical_str.starts_with(&root_normalized)
        });

        if !is_allowed {
            return Err(PathValidationError::OutsideAllowedRoots { path: path.into() });
        }
    }

    Ok(canonical)
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}
