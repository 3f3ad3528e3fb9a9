//! Token-level helpers for recognising Clarity forms in raw text.

/// Declarations that may appear at the top level of a contract.
pub(crate) const DECLARATION_KEYWORDS: &[&str] = &[
    "define-public",
    "define-private",
    "define-read-only",
    "define-data-var",
    "define-map",
    "define-constant",
    "define-fungible-token",
    "define-non-fungible-token",
    "define-trait",
    "impl-trait",
    "use-trait",
];

/// Declarations introducing a named function.
pub(crate) const FUNCTION_KEYWORDS: &[&str] =
    &["define-public", "define-private", "define-read-only"];

pub(crate) const PUBLIC_FUNCTION: &str = "define-public";
pub(crate) const DATA_VAR: &str = "define-data-var";
pub(crate) const MAP: &str = "define-map";

pub(crate) const OK_MARKER: &str = "ok";
pub(crate) const ERR_MARKER: &str = "err";
pub(crate) const BEGIN_MARKER: &str = "begin";

pub(crate) const CALLER_IDENTITY: &str = "tx-sender";
pub(crate) const AUTHORISATION_CHECKS: &[&str] = &["is-eq", "asserts!"];

/// Characters that terminate a form head such as `define-public`.
const fn is_form_boundary(ch: char) -> bool {
    ch.is_whitespace() || ch == '(' || ch == ')'
}

/// Characters that may appear inside a Clarity symbol.
const fn is_symbol_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '?' | '!' | '.' | '*' | '+' | '/')
}

/// Returns `true` if `ch` is permitted in a declared function name.
pub(crate) const fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '-' | '?' | '!')
}

/// Returns `true` when `text` contains a form whose head is exactly `head`.
///
/// `(ok u1)` contains the `ok` form; `(okay)` does not.
pub(crate) fn contains_form(text: &str, head: &str) -> bool {
    text.match_indices('(').any(|(index, _)| {
        text.get(index + 1..)
            .and_then(|after| after.strip_prefix(head))
            .is_some_and(|rest| rest.chars().next().is_none_or(is_form_boundary))
    })
}

/// Returns `true` when `text` contains `word` delimited by non-symbol characters.
pub(crate) fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(index, _)| {
        let before_ok = text
            .get(..index)
            .and_then(|before| before.chars().next_back())
            .is_none_or(|ch| !is_symbol_char(ch));
        let after_ok = text
            .get(index + word.len()..)
            .and_then(|after| after.chars().next())
            .is_none_or(|ch| !is_symbol_char(ch));
        before_ok && after_ok
    })
}

/// Splits a trimmed line of the form `(keyword rest...)` into its head and
/// remainder.
///
/// Returns `None` for lines that do not open with a form.
pub(crate) fn leading_form(trimmed: &str) -> Option<(&str, &str)> {
    let inner = trimmed.strip_prefix('(')?;
    let end = inner.find(is_form_boundary).unwrap_or(inner.len());
    let head = inner.get(..end)?;
    let rest = inner.get(end..)?;
    Some((head, rest))
}

/// Extracts the identifier declared after a function keyword.
///
/// Accepts both `(define-public (name args...) ...)` and the bare
/// `(define-public name ...)` shape.
pub(crate) fn declared_name(rest: &str) -> &str {
    let trimmed = rest.trim_start();
    let unwrapped = trimmed.strip_prefix('(').unwrap_or(trimmed).trim_start();
    unwrapped.split(is_form_boundary).next().unwrap_or_default()
}

/// Returns `true` for lines that contain nothing but a comment.
pub(crate) fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with(';')
}
