//! The structural lint pass.

use crate::diagnostic::{Diagnostic, LintVerdict};
use crate::syntax::{
    AUTHORISATION_CHECKS, BEGIN_MARKER, CALLER_IDENTITY, DATA_VAR, DECLARATION_KEYWORDS,
    ERR_MARKER, FUNCTION_KEYWORDS, MAP, OK_MARKER, PUBLIC_FUNCTION, contains_form, contains_word,
    declared_name, is_comment, is_identifier_char, leading_form,
};

/// Minimum whitespace-delimited tokens in a `define-data-var` line.
const DATA_VAR_MIN_TOKENS: usize = 4;

/// Minimum whitespace-delimited tokens in a `define-map` line.
const MAP_MIN_TOKENS: usize = 4;

/// Lints `source` and returns every structural finding.
///
/// Lines are 1-based and counted by splitting on `\n`, so a trailing newline
/// contributes a final empty line. Empty input is valid.
///
/// # Example
///
/// ```
/// use clarigate_lint::lint;
///
/// let verdict = lint("(define-map balances principal uint)\n((");
/// assert!(!verdict.is_valid());
/// assert_eq!(verdict.errors()[0].message(), "2 unclosed parentheses");
/// ```
#[must_use]
pub fn lint(source: &str) -> LintVerdict {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut diagnostics = Vec::new();

    check_parentheses(&lines, &mut diagnostics);
    check_declaration_presence(source, &lines, &mut diagnostics);
    for (index, line) in lines.iter().enumerate() {
        check_line(index + 1, line, &mut diagnostics);
    }
    check_response_markers(source, &mut diagnostics);

    LintVerdict::from_diagnostics(diagnostics)
}

/// Balances `(` against `)` across the whole document.
///
/// A closer with no matching opener is reported once at its line and the
/// depth resets to zero so a single stray closer does not cascade.
fn check_parentheses(lines: &[&str], diagnostics: &mut Vec<Diagnostic>) {
    let mut depth: usize = 0;
    for (index, line) in lines.iter().enumerate() {
        for ch in line.chars() {
            match ch {
                '(' => depth += 1,
                ')' => match depth.checked_sub(1) {
                    Some(next) => depth = next,
                    None => diagnostics
                        .push(Diagnostic::error(index + 1, "unmatched closing parenthesis")),
                },
                _ => {}
            }
        }
    }

    if depth > 0 {
        let noun = if depth == 1 {
            "parenthesis"
        } else {
            "parentheses"
        };
        diagnostics.push(Diagnostic::error(
            lines.len().max(1),
            format!("{depth} unclosed {noun}"),
        ));
    }
}

/// Requires a declaration somewhere in any document that holds code.
///
/// Documents made only of blank and comment lines count as empty.
fn check_declaration_presence(source: &str, lines: &[&str], diagnostics: &mut Vec<Diagnostic>) {
    let has_code = lines.iter().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !is_comment(trimmed)
    });
    if !has_code {
        return;
    }
    let declared = DECLARATION_KEYWORDS
        .iter()
        .any(|keyword| contains_form(source, keyword));
    if !declared {
        diagnostics.push(Diagnostic::error(
            1,
            "contract must contain at least one declaration.",
        ));
    }
}

fn check_line(line_number: usize, line: &str, diagnostics: &mut Vec<Diagnostic>) {
    let trimmed = line.trim();
    if trimmed.is_empty() || is_comment(trimmed) {
        return;
    }

    if let Some((head, rest)) = leading_form(trimmed) {
        if FUNCTION_KEYWORDS.contains(&head) {
            check_function(line_number, trimmed, head, rest, diagnostics);
        } else if head == DATA_VAR {
            check_token_count(
                line_number,
                trimmed,
                DATA_VAR_MIN_TOKENS,
                "define-data-var requires a name, a type and an initial value",
                diagnostics,
            );
        } else if head == MAP {
            check_token_count(
                line_number,
                trimmed,
                MAP_MIN_TOKENS,
                "define-map requires a name, a key type and a value type",
                diagnostics,
            );
        }
    }

    let authorised = AUTHORISATION_CHECKS
        .iter()
        .any(|check| contains_form(trimmed, check));
    if contains_word(trimmed, CALLER_IDENTITY) && !authorised {
        diagnostics.push(Diagnostic::warning(
            line_number,
            "tx-sender used without is-eq or asserts! on the same line; possible missing authorization check",
        ));
    }
}

fn check_function(
    line_number: usize,
    trimmed: &str,
    keyword: &str,
    rest: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let name = declared_name(rest);
    if name.is_empty() {
        diagnostics.push(Diagnostic::error(
            line_number,
            format!("missing function name after {keyword}"),
        ));
    } else if !name.chars().all(is_identifier_char) {
        diagnostics.push(Diagnostic::error(
            line_number,
            format!(
                "invalid identifier '{name}': function names may only use lowercase letters, digits, '-', '?' and '!'"
            ),
        ));
    }

    let responds = contains_form(trimmed, OK_MARKER) || contains_form(trimmed, ERR_MARKER);
    if !responds && !contains_form(trimmed, BEGIN_MARKER) {
        diagnostics.push(Diagnostic::warning(
            line_number,
            format!("function '{name}' should return a success/failure response (ok or err)"),
        ));
    }
}

fn check_token_count(
    line_number: usize,
    trimmed: &str,
    minimum: usize,
    message: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if trimmed.split_whitespace().count() < minimum {
        diagnostics.push(Diagnostic::error(line_number, message));
    }
}

/// Warns once when public functions exist but nothing in the document
/// produces a response.
fn check_response_markers(source: &str, diagnostics: &mut Vec<Diagnostic>) {
    if !contains_form(source, PUBLIC_FUNCTION) {
        return;
    }
    if contains_form(source, OK_MARKER) || contains_form(source, ERR_MARKER) {
        return;
    }
    diagnostics.push(Diagnostic::warning(
        1,
        "public functions must return (ok ...) or (err ...) but no response was found",
    ));
}
