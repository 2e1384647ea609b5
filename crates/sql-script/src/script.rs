//! Whole-script analysis: split, classify, validate.

use std::collections::HashSet;

use serde::Serialize;

use crate::classifier::{ClassifiedStatement, classify_all};
use crate::splitter::split_statements;
use crate::validator::validate;

/// Result of analyzing a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptAnalysis {
    pub statements: Vec<ClassifiedStatement>,
    pub errors: Vec<String>,
    /// Whether the script must be wrapped in a transaction.
    pub needs_transaction: bool,
}

impl ScriptAnalysis {
    /// Whether validation produced no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Split, classify and validate `script`.
#[must_use]
pub fn analyze(script: &str, protected: &HashSet<String>) -> ScriptAnalysis {
    let statements = classify_all(split_statements(script));
    let errors = validate(&statements, protected);
    let needs_transaction = needs_transaction(&statements);
    ScriptAnalysis {
        statements,
        errors,
        needs_transaction,
    }
}

/// True when any statement modifies data or catalog state.
#[must_use]
pub fn needs_transaction(statements: &[ClassifiedStatement]) -> bool {
    statements.iter().any(|s| s.needs_transaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::StatementKind;

    #[test]
    fn test_analyze_read_only_script() {
        let analysis = analyze("SELECT 1; FROM t; DESCRIBE t", &HashSet::new());
        assert!(analysis.is_valid());
        assert!(!analysis.needs_transaction);
        assert_eq!(analysis.statements.len(), 3);
        assert_eq!(analysis.statements[2].kind, StatementKind::Describe);
    }

    #[test]
    fn test_analyze_write_script() {
        let analysis = analyze(
            "CREATE TABLE t AS SELECT 1 AS a;\nUPDATE t SET a = 2;",
            &HashSet::new(),
        );
        assert!(analysis.is_valid());
        assert!(analysis.needs_transaction);
        assert_eq!(analysis.statements[1].line_number(), 2);
    }

    #[test]
    fn test_analyze_reports_errors() {
        let protected: HashSet<String> = ["audit_log".to_string()].into_iter().collect();
        let analysis = analyze("DROP TABLE audit_log; CHECKPOINT", &protected);
        assert!(!analysis.is_valid());
        assert_eq!(analysis.errors.len(), 2);
    }

    #[test]
    fn test_analysis_serializes() {
        let analysis = analyze("SELECT 1", &HashSet::new());
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["statements"][0]["kind"], "SELECT");
        assert_eq!(json["errors"].as_array().map(Vec::len), Some(0));
        assert_eq!(json["needs_transaction"], false);
    }
}
