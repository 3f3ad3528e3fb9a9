//! Structural linting for Clarity contract source.
//!
//! The linter inspects contract text for surface-level well-formedness before
//! the source is handed to the external compiler. It balances parentheses,
//! requires at least one top-level declaration, and applies a handful of
//! per-line checks to the common declaration forms. It is a token scanner,
//! not a parser: it never evaluates types or semantics and never fails.
//!
//! ```
//! use clarigate_lint::lint;
//!
//! let verdict = lint("(define-data-var counter uint u0)\n");
//! assert!(verdict.is_valid());
//! assert!(verdict.errors().is_empty());
//!
//! let broken = lint("(define-public (My_Func) (ok true))");
//! assert!(!broken.is_valid());
//! assert!(broken.errors()[0].message().contains("My_Func"));
//! ```
//!
//! Diagnostics keep scan order (parenthesis balance first, then the
//! declaration check, then per-line checks in line order) and are never
//! deduplicated.

mod diagnostic;
mod linter;
mod syntax;

#[cfg(test)]
mod tests;

pub use self::diagnostic::{Diagnostic, LintVerdict, Severity};
pub use self::linter::lint;
