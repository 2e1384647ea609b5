//! Statement classification.
//!
//! Classification is a pure function of a statement's leading keyword(s). The
//! keyword table maps text to a [`StatementKind`]; everything else about a kind
//! (category, transaction requirement, script and subquery eligibility) comes
//! from one exhaustive `match` in [`StatementKind::attributes`], so adding a
//! kind without deciding its attributes does not compile.

use std::fmt;

use serde::Serialize;

use crate::lexer::{read_word, skip_trivia};
use crate::splitter::ParsedStatement;

/// Statement kind, derived from the leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementKind {
    Alter,
    Analyze,
    Attach,
    Begin,
    Call,
    Checkpoint,
    Comment,
    Commit,
    Copy,
    Create,
    Deallocate,
    Delete,
    Describe,
    Detach,
    Drop,
    Execute,
    Explain,
    ExportDatabase,
    ForceCheckpoint,
    From,
    ImportDatabase,
    Insert,
    Install,
    Load,
    Pivot,
    Pragma,
    Prepare,
    Reset,
    Rollback,
    Select,
    Set,
    Show,
    Summarize,
    Table,
    Truncate,
    Unpivot,
    Update,
    Use,
    Vacuum,
    Values,
    With,
    Unknown,
}

/// Coarse statement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatementCategory {
    #[serde(rename = "DDL")]
    Ddl,
    #[serde(rename = "DML")]
    Dml,
    #[serde(rename = "TCL")]
    Tcl,
    #[serde(rename = "UTL")]
    Utility,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl StatementCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ddl => "DDL",
            Self::Dml => "DML",
            Self::Tcl => "TCL",
            Self::Utility => "UTL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed attributes of a [`StatementKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindAttributes {
    pub category: StatementCategory,
    /// Statement modifies data or catalog state and must run inside the
    /// script's enclosing transaction.
    pub needs_transaction: bool,
    /// Statement may appear in an auto-wrapped script.
    pub allowed_in_script: bool,
    /// Statement may be embedded as a subquery.
    pub allowed_in_subquery: bool,
}

impl KindAttributes {
    const fn new(
        category: StatementCategory,
        needs_transaction: bool,
        allowed_in_script: bool,
        allowed_in_subquery: bool,
    ) -> Self {
        Self {
            category,
            needs_transaction,
            allowed_in_script,
            allowed_in_subquery,
        }
    }
}

impl StatementKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 42] = [
        Self::Alter,
        Self::Analyze,
        Self::Attach,
        Self::Begin,
        Self::Call,
        Self::Checkpoint,
        Self::Comment,
        Self::Commit,
        Self::Copy,
        Self::Create,
        Self::Deallocate,
        Self::Delete,
        Self::Describe,
        Self::Detach,
        Self::Drop,
        Self::Execute,
        Self::Explain,
        Self::ExportDatabase,
        Self::ForceCheckpoint,
        Self::From,
        Self::ImportDatabase,
        Self::Insert,
        Self::Install,
        Self::Load,
        Self::Pivot,
        Self::Pragma,
        Self::Prepare,
        Self::Reset,
        Self::Rollback,
        Self::Select,
        Self::Set,
        Self::Show,
        Self::Summarize,
        Self::Table,
        Self::Truncate,
        Self::Unpivot,
        Self::Update,
        Self::Use,
        Self::Vacuum,
        Self::Values,
        Self::With,
        Self::Unknown,
    ];

    /// Category and flags for this kind.
    #[must_use]
    pub const fn attributes(self) -> KindAttributes {
        use StatementCategory::{Ddl, Dml, Tcl, Unknown, Utility};

        //                                      category  needs_tx script subquery
        match self {
            Self::Create | Self::Drop | Self::Alter => KindAttributes::new(Ddl, true, true, false),
            Self::Comment => KindAttributes::new(Ddl, false, true, false),
            Self::Insert | Self::Update | Self::Delete | Self::Truncate => {
                KindAttributes::new(Dml, true, true, false)
            }
            Self::Copy => KindAttributes::new(Dml, false, false, false),
            Self::Select
            | Self::With
            | Self::Values
            | Self::From
            | Self::Table
            | Self::Pivot
            | Self::Unpivot => KindAttributes::new(Dml, false, true, true),
            Self::Begin | Self::Commit | Self::Rollback => {
                KindAttributes::new(Tcl, false, false, false)
            }
            Self::Attach | Self::Detach => KindAttributes::new(Utility, true, true, false),
            Self::Describe | Self::Show | Self::Summarize => {
                KindAttributes::new(Utility, false, true, true)
            }
            Self::ExportDatabase | Self::ImportDatabase | Self::ForceCheckpoint => {
                KindAttributes::new(Utility, false, false, false)
            }
            Self::Analyze
            | Self::Call
            | Self::Checkpoint
            | Self::Deallocate
            | Self::Execute
            | Self::Explain
            | Self::Install
            | Self::Load
            | Self::Pragma
            | Self::Prepare
            | Self::Reset
            | Self::Set
            | Self::Use
            | Self::Vacuum => KindAttributes::new(Utility, false, true, false),
            Self::Unknown => KindAttributes::new(Unknown, false, false, false),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alter => "ALTER",
            Self::Analyze => "ANALYZE",
            Self::Attach => "ATTACH",
            Self::Begin => "BEGIN",
            Self::Call => "CALL",
            Self::Checkpoint => "CHECKPOINT",
            Self::Comment => "COMMENT",
            Self::Commit => "COMMIT",
            Self::Copy => "COPY",
            Self::Create => "CREATE",
            Self::Deallocate => "DEALLOCATE",
            Self::Delete => "DELETE",
            Self::Describe => "DESCRIBE",
            Self::Detach => "DETACH",
            Self::Drop => "DROP",
            Self::Execute => "EXECUTE",
            Self::Explain => "EXPLAIN",
            Self::ExportDatabase => "EXPORT DATABASE",
            Self::ForceCheckpoint => "FORCE CHECKPOINT",
            Self::From => "FROM",
            Self::ImportDatabase => "IMPORT DATABASE",
            Self::Insert => "INSERT",
            Self::Install => "INSTALL",
            Self::Load => "LOAD",
            Self::Pivot => "PIVOT",
            Self::Pragma => "PRAGMA",
            Self::Prepare => "PREPARE",
            Self::Reset => "RESET",
            Self::Rollback => "ROLLBACK",
            Self::Select => "SELECT",
            Self::Set => "SET",
            Self::Show => "SHOW",
            Self::Summarize => "SUMMARIZE",
            Self::Table => "TABLE",
            Self::Truncate => "TRUNCATE",
            Self::Unpivot => "UNPIVOT",
            Self::Update => "UPDATE",
            Self::Use => "USE",
            Self::Vacuum => "VACUUM",
            Self::Values => "VALUES",
            Self::With => "WITH",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leading keyword table. Multi-word entries come before any single-word
/// entry that is a prefix of them.
const KEYWORDS: &[(&[&str], StatementKind)] = &[
    (&["FORCE", "CHECKPOINT"], StatementKind::ForceCheckpoint),
    (&["FORCE", "INSTALL"], StatementKind::Install),
    (&["START", "TRANSACTION"], StatementKind::Begin),
    (&["EXPORT", "DATABASE"], StatementKind::ExportDatabase),
    (&["IMPORT", "DATABASE"], StatementKind::ImportDatabase),
    (&["ABORT"], StatementKind::Rollback),
    (&["ALTER"], StatementKind::Alter),
    (&["ANALYZE"], StatementKind::Analyze),
    (&["ATTACH"], StatementKind::Attach),
    (&["BEGIN"], StatementKind::Begin),
    (&["CALL"], StatementKind::Call),
    (&["CHECKPOINT"], StatementKind::Checkpoint),
    (&["COMMENT"], StatementKind::Comment),
    (&["COMMIT"], StatementKind::Commit),
    (&["COPY"], StatementKind::Copy),
    (&["CREATE"], StatementKind::Create),
    (&["DEALLOCATE"], StatementKind::Deallocate),
    (&["DELETE"], StatementKind::Delete),
    (&["DESC"], StatementKind::Describe),
    (&["DESCRIBE"], StatementKind::Describe),
    (&["DETACH"], StatementKind::Detach),
    (&["DROP"], StatementKind::Drop),
    (&["END"], StatementKind::Commit),
    (&["EXECUTE"], StatementKind::Execute),
    (&["EXPLAIN"], StatementKind::Explain),
    (&["FROM"], StatementKind::From),
    (&["INSERT"], StatementKind::Insert),
    (&["INSTALL"], StatementKind::Install),
    (&["LOAD"], StatementKind::Load),
    (&["PIVOT"], StatementKind::Pivot),
    (&["PRAGMA"], StatementKind::Pragma),
    (&["PREPARE"], StatementKind::Prepare),
    (&["RESET"], StatementKind::Reset),
    (&["ROLLBACK"], StatementKind::Rollback),
    (&["SELECT"], StatementKind::Select),
    (&["SET"], StatementKind::Set),
    (&["SHOW"], StatementKind::Show),
    (&["SUMMARIZE"], StatementKind::Summarize),
    (&["TABLE"], StatementKind::Table),
    (&["TRUNCATE"], StatementKind::Truncate),
    (&["UNPIVOT"], StatementKind::Unpivot),
    (&["UPDATE"], StatementKind::Update),
    (&["USE"], StatementKind::Use),
    (&["VACUUM"], StatementKind::Vacuum),
    (&["VALUES"], StatementKind::Values),
    (&["WITH"], StatementKind::With),
];

/// Longest keyword sequence in [`KEYWORDS`].
const MAX_KEYWORD_WORDS: usize = 2;

/// A parsed statement annotated with its semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedStatement {
    #[serde(flatten)]
    pub statement: ParsedStatement,
    pub kind: StatementKind,
    pub category: StatementCategory,
    pub needs_transaction: bool,
    pub allowed_in_script: bool,
    pub allowed_in_subquery: bool,
}

impl ClassifiedStatement {
    /// Classify a statement produced by the splitter, keeping its position.
    #[must_use]
    pub fn from_parsed(statement: ParsedStatement) -> Self {
        let kind = statement_kind(&statement.code);
        let attributes = kind.attributes();
        Self {
            statement,
            kind,
            category: attributes.category,
            needs_transaction: attributes.needs_transaction,
            allowed_in_script: attributes.allowed_in_script,
            allowed_in_subquery: attributes.allowed_in_subquery,
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.statement.code
    }

    #[must_use]
    pub const fn line_number(&self) -> usize {
        self.statement.line_number
    }
}

/// Classify a single piece of statement text.
#[must_use]
pub fn classify(code: &str) -> ClassifiedStatement {
    ClassifiedStatement::from_parsed(ParsedStatement::standalone(code.trim()))
}

/// Classify every statement, preserving order and positions.
#[must_use]
pub fn classify_all(statements: Vec<ParsedStatement>) -> Vec<ClassifiedStatement> {
    statements
        .into_iter()
        .map(ClassifiedStatement::from_parsed)
        .collect()
}

/// Determine the kind of `code` from its leading keyword(s).
#[must_use]
pub fn statement_kind(code: &str) -> StatementKind {
    let words = leading_words(code);
    KEYWORDS
        .iter()
        .find(|(keyword, _)| {
            keyword.len() <= words.len()
                && keyword
                    .iter()
                    .zip(&words)
                    .all(|(expected, actual)| expected.eq_ignore_ascii_case(actual))
        })
        .map_or(StatementKind::Unknown, |(_, kind)| *kind)
}

/// First few words of `code`, skipping whitespace, comments and opening
/// parentheses (so `(SELECT 1)` classifies as `SELECT`).
fn leading_words(code: &str) -> Vec<&str> {
    let bytes = code.as_bytes();
    let mut words = Vec::with_capacity(MAX_KEYWORD_WORDS);
    let mut pos = skip_trivia(bytes, 0);
    while bytes.get(pos) == Some(&b'(') {
        pos = skip_trivia(bytes, pos + 1);
    }
    while words.len() < MAX_KEYWORD_WORDS {
        let Some((word, end)) = read_word(code, skip_trivia(bytes, pos)) else {
            break;
        };
        words.push(word);
        pos = end;
    }
    words
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_classify_drop_if_exists() {
        let classified = classify("DROP TABLE IF EXISTS foo");
        assert_eq!(classified.kind, StatementKind::Drop);
        assert_eq!(classified.category, StatementCategory::Ddl);
        assert!(classified.needs_transaction);
        assert!(classified.allowed_in_script);
        assert!(!classified.allowed_in_subquery);
    }

    #[test]
    fn test_classify_checkpoint_variants() {
        let checkpoint = classify("CHECKPOINT");
        assert_eq!(checkpoint.kind, StatementKind::Checkpoint);
        assert!(!checkpoint.needs_transaction);
        assert!(checkpoint.allowed_in_script);

        let forced = classify("force   checkpoint my_db");
        assert_eq!(forced.kind, StatementKind::ForceCheckpoint);
        assert!(!forced.allowed_in_script);
    }

    #[test]
    fn test_transaction_control_is_not_scriptable() {
        for sql in [
            "BEGIN",
            "BEGIN TRANSACTION",
            "START TRANSACTION",
            "COMMIT",
            "END",
            "ROLLBACK",
            "ABORT",
        ] {
            let classified = classify(sql);
            assert_eq!(classified.category, StatementCategory::Tcl, "{sql}");
            assert!(!classified.needs_transaction, "{sql}");
            assert!(!classified.allowed_in_script, "{sql}");
        }
    }

    #[test]
    fn test_needs_transaction_set() {
        let expected: HashSet<StatementKind> = [
            StatementKind::Create,
            StatementKind::Drop,
            StatementKind::Alter,
            StatementKind::Insert,
            StatementKind::Update,
            StatementKind::Delete,
            StatementKind::Truncate,
            StatementKind::Attach,
            StatementKind::Detach,
        ]
        .into_iter()
        .collect();

        let actual: HashSet<StatementKind> = StatementKind::ALL
            .into_iter()
            .filter(|kind| kind.attributes().needs_transaction)
            .collect();

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_disallowed_in_script_set() {
        let disallowed: HashSet<StatementKind> = StatementKind::ALL
            .into_iter()
            .filter(|kind| !kind.attributes().allowed_in_script)
            .collect();

        for kind in [
            StatementKind::Copy,
            StatementKind::ExportDatabase,
            StatementKind::ImportDatabase,
            StatementKind::ForceCheckpoint,
            StatementKind::Begin,
            StatementKind::Commit,
            StatementKind::Rollback,
            StatementKind::Unknown,
        ] {
            assert!(disallowed.contains(&kind), "{kind}");
        }
        assert_eq!(disallowed.len(), 8);
    }

    #[test]
    fn test_every_keyword_entry_is_reachable() {
        for (words, kind) in KEYWORDS {
            let sql = format!("{} x", words.join(" "));
            assert_eq!(statement_kind(&sql), *kind, "{sql}");
        }
    }

    #[test]
    fn test_all_covers_every_kind_once() {
        let unique: HashSet<StatementKind> = StatementKind::ALL.into_iter().collect();
        assert_eq!(unique.len(), StatementKind::ALL.len());
    }

    #[test]
    fn test_leading_comments_and_parentheses() {
        assert_eq!(
            statement_kind("-- load data\n/* bulk */ insert into t values (1)"),
            StatementKind::Insert
        );
        assert_eq!(statement_kind("((SELECT 1))"), StatementKind::Select);
        assert_eq!(statement_kind("# note\nwith x as (select 1) from x"), StatementKind::With);
    }

    #[test]
    fn test_keyword_must_be_whole_word() {
        assert_eq!(statement_kind("SELECTED"), StatementKind::Unknown);
        assert_eq!(statement_kind("DROPPED TABLE x"), StatementKind::Unknown);
        assert_eq!(statement_kind("EXPORT t"), StatementKind::Unknown);
        assert_eq!(statement_kind(""), StatementKind::Unknown);
        assert_eq!(statement_kind("42"), StatementKind::Unknown);
    }

    #[test]
    fn test_unknown_classification() {
        let classified = classify("GRANT SELECT ON t TO bob");
        assert_eq!(classified.kind, StatementKind::Unknown);
        assert_eq!(classified.category, StatementCategory::Unknown);
        assert!(!classified.allowed_in_script);
    }

    #[test]
    fn test_subquery_eligibility() {
        assert!(classify("SELECT 1").allowed_in_subquery);
        assert!(classify("DESCRIBE t").allowed_in_subquery);
        assert!(classify("FROM t").allowed_in_subquery);
        assert!(!classify("INSERT INTO t VALUES (1)").allowed_in_subquery);
        assert!(!classify("PRAGMA version").allowed_in_subquery);
    }

    #[test]
    fn test_serialize_shape() {
        let json = serde_json::to_value(classify("ATTACH 'x.db'")).unwrap();
        assert_eq!(json["kind"], "ATTACH");
        assert_eq!(json["category"], "UTL");
        assert_eq!(json["needs_transaction"], true);
        assert_eq!(json["code"], "ATTACH 'x.db'");
        assert_eq!(json["line_number"], 1);
    }
}
