//! Reference name validation following git-style conventions.
//!
//! A valid reference name is either:
//! - a top-level pseudo-ref made of uppercase letters and `_` (`HEAD`,
//!   `FETCH_HEAD`, `ORIG_HEAD`), or
//! - a hierarchical name under `refs/` whose components obey these rules:
//!   - no whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//!   - no `..` and no `@{`
//!   - no empty components, no component starting with `.`
//!   - must not end with `.`, `/`, or `.lock`

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a reference name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a full reference name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use rdb_refs::names::validate_reference_name;
///
/// assert!(validate_reference_name("HEAD").is_ok());
/// assert!(validate_reference_name("refs/heads/feature/auth").is_ok());
/// assert!(validate_reference_name("heads/main").is_err());
/// assert!(validate_reference_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_reference_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "reference name must not be empty"));
    }

    if !name.contains('/') {
        if name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
            return Ok(());
        }
        return Err(invalid(
            name,
            "top-level names must be uppercase pseudo-refs such as HEAD",
        ));
    }

    if !name.starts_with("refs/") {
        return Err(invalid(name, "hierarchical names must start with 'refs/'"));
    }

    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }

    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }

    // Reflog selector syntax.
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }

    if name.ends_with('.') || name.ends_with('/') {
        return Err(invalid(name, "must not end with '.' or '/'"));
    }

    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }

    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }

    Ok(())
}
