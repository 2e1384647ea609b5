//! Statement splitting, classification and validation for analytical SQL
//! scripts.
//!
//! A script flows through three pure stages:
//!
//! 1. [`split_statements`] cuts the text at top-level `;` into
//!    [`ParsedStatement`] spans.
//! 2. [`classify`] / [`classify_all`] attach a [`StatementKind`] and its fixed
//!    attributes.
//! 3. [`validate`] checks the classified list against the script rules and
//!    returns human-readable errors as data.
//!
//! [`analyze`] runs all three.
//!
//! ```
//! use std::collections::HashSet;
//!
//! let protected: HashSet<String> = ["reserved_view".to_string()].into();
//! let analysis = sql_script::analyze("DROP TABLE reserved_view", &protected);
//! assert_eq!(analysis.errors.len(), 1);
//! ```

pub mod classifier;
mod lexer;
pub mod script;
pub mod splitter;
pub mod validator;

pub use classifier::{
    ClassifiedStatement, KindAttributes, StatementCategory, StatementKind, classify, classify_all,
    statement_kind,
};
pub use script::{ScriptAnalysis, analyze, needs_transaction};
pub use splitter::{ParsedStatement, split_statements};
pub use validator::{NO_STATEMENTS, drop_target, validate};
