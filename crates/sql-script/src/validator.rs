//! Script validation rules.
//!
//! Validation never short-circuits: every rule runs over every statement and
//! the resulting messages are returned in statement order, so a caller can
//! show all problems at once.

use std::collections::HashSet;

use crate::classifier::{ClassifiedStatement, StatementKind};
use crate::lexer::{read_identifier, read_word, skip_trivia};

/// Maximum characters of an unrecognized statement quoted in its error.
const SNIPPET_CHARS: usize = 40;

/// Words that may precede the object type in a `DROP`.
const DROP_MODIFIERS: &[&str] = &["TEMPORARY", "TEMP", "PERSISTENT"];

/// Object types a `DROP` may name before the object itself.
const DROP_OBJECT_TYPES: &[&str] = &[
    "TABLE", "VIEW", "SCHEMA", "SEQUENCE", "MACRO", "FUNCTION", "INDEX", "TYPE", "SECRET",
    "DATABASE",
];

/// Error reported for a script with no statements.
pub const NO_STATEMENTS: &str = "No statements found";

/// Validate classified statements against the script rules.
///
/// `protected` holds object names that may not be dropped; matching is
/// case-insensitive.
#[must_use]
pub fn validate(statements: &[ClassifiedStatement], protected: &HashSet<String>) -> Vec<String> {
    if statements.is_empty() {
        return vec![NO_STATEMENTS.to_string()];
    }

    let protected: HashSet<String> = protected.iter().map(|name| name.to_lowercase()).collect();
    let wraps_transaction = statements.iter().any(|s| s.needs_transaction);
    let mut errors = Vec::new();

    for (index, statement) in statements.iter().enumerate() {
        let prefix = format!("Statement {} (line {})", index + 1, statement.line_number());

        if !statement.allowed_in_script {
            if statement.kind == StatementKind::Unknown {
                errors.push(format!(
                    "{prefix}: unrecognized statement \"{}\"",
                    snippet(statement.code())
                ));
            } else {
                errors.push(format!(
                    "{prefix}: {} is not allowed in scripts",
                    statement.kind
                ));
            }
        }

        if statement.kind == StatementKind::Drop
            && let Some(target) = drop_target(statement.code())
            && is_protected(&target, &protected)
        {
            errors.push(format!(
                "{prefix}: cannot drop protected object \"{}\"",
                target.join(".")
            ));
        }

        if statement.kind == StatementKind::Checkpoint && wraps_transaction {
            errors.push(format!(
                "{prefix}: CHECKPOINT cannot run inside a transaction; \
                 run it in a separate script"
            ));
        }
    }

    tracing::debug!(
        statements = statements.len(),
        errors = errors.len(),
        "validated script"
    );
    errors
}

/// Name parts of the object a `DROP` statement targets, quotes removed.
///
/// Returns `None` when no identifier follows the object-type words.
#[must_use]
pub fn drop_target(code: &str) -> Option<Vec<String>> {
    let bytes = code.as_bytes();
    let (_, pos) = read_word(code, skip_trivia(bytes, 0))?;
    let mut pos = skip_trivia(bytes, pos);

    // At most one modifier, then at most one object type; whatever follows
    // is the name, even when it spells a keyword.
    for words in [DROP_MODIFIERS, DROP_OBJECT_TYPES] {
        if let Some((word, end)) = read_word(code, pos)
            && words.iter().any(|kw| kw.eq_ignore_ascii_case(word))
        {
            pos = skip_trivia(bytes, end);
        }
    }

    if let Some((word, end)) = read_word(code, pos)
        && word.eq_ignore_ascii_case("IF")
    {
        let after = skip_trivia(bytes, end);
        if let Some((next, next_end)) = read_word(code, after)
            && next.eq_ignore_ascii_case("EXISTS")
        {
            pos = skip_trivia(bytes, next_end);
        }
    }

    let mut parts = Vec::new();
    let (first, mut end) = read_identifier(code, pos)?;
    parts.push(first);
    while bytes.get(end) == Some(&b'.') {
        let Some((part, next)) = read_identifier(code, end + 1) else {
            break;
        };
        parts.push(part);
        end = next;
    }
    Some(parts)
}

fn is_protected(target: &[String], protected: &HashSet<String>) -> bool {
    let full = target.join(".").to_lowercase();
    protected.contains(&full)
        || target
            .last()
            .is_some_and(|last| protected.contains(&last.to_lowercase()))
}

fn snippet(code: &str) -> String {
    let flat: String = code.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > SNIPPET_CHARS {
        let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
