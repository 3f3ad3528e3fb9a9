//! Contract source units and contract-name sanitisation.
//!
//! Contract names arrive from user or model-generated input and end up in
//! filesystem paths and the project manifest. [`SourceUnit::new`] reduces
//! every name to `[a-z0-9-]` before anything else sees it.

use crate::error::InputError;

/// Longest sanitised name retained.
const MAX_NAME_LEN: usize = 64;

/// Name used when sanitisation leaves nothing behind.
const FALLBACK_NAME: &str = "contract";

/// A contract under validation: a sanitised name plus its source text.
///
/// # Example
///
/// ```
/// use clarigate_validator::SourceUnit;
///
/// let unit = SourceUnit::new("My Token!", "(define-data-var n uint u0)")?;
/// assert_eq!(unit.name(), "my-token");
/// assert_eq!(unit.requested_name(), "My Token!");
/// # Ok::<(), clarigate_validator::InputError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    name: String,
    requested_name: String,
    body: String,
}

impl SourceUnit {
    /// Validates and sanitises a contract for staging.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::MissingName`] when the name is blank and
    /// [`InputError::MissingSource`] when the body is blank.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Result<Self, InputError> {
        let requested_name = name.into();
        let body = body.into();
        if requested_name.trim().is_empty() {
            return Err(InputError::MissingName);
        }
        if body.trim().is_empty() {
            return Err(InputError::MissingSource);
        }
        Ok(Self {
            name: sanitize_contract_name(&requested_name),
            requested_name,
            body,
        })
    }

    /// Returns the sanitised contract name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the name exactly as supplied by the caller.
    #[must_use]
    pub const fn requested_name(&self) -> &str {
        self.requested_name.as_str()
    }

    /// Returns the contract source text.
    #[must_use]
    pub const fn body(&self) -> &str {
        self.body.as_str()
    }
}

/// Reduces `raw` to lowercase letters, digits, and single hyphens.
///
/// Disallowed characters become hyphens, hyphen runs collapse, and leading or
/// trailing hyphens are dropped. The result is capped at 64 characters and
/// is never empty.
///
/// ```
/// use clarigate_validator::sanitize_contract_name;
///
/// assert_eq!(sanitize_contract_name("../../x; rm -rf"), "x-rm-rf");
/// assert_eq!(sanitize_contract_name("???"), "contract");
/// ```
#[must_use]
pub fn sanitize_contract_name(raw: &str) -> String {
    let mut sanitized = String::with_capacity(raw.len());
    for ch in raw.chars().flat_map(char::to_lowercase) {
        let mapped = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '-'
        };
        if mapped == '-' && (sanitized.is_empty() || sanitized.ends_with('-')) {
            continue;
        }
        sanitized.push(mapped);
    }

    let capped: String = sanitized.chars().take(MAX_NAME_LEN).collect();
    let trimmed = capped.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_owned()
    } else {
        trimmed.to_owned()
    }
}
