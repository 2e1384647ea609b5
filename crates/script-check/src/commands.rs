//! `split`, `classify` and `validate` commands.
//!
//! Each command turns script text into a [`CommandOutput`]; printing and the
//! process exit code are left to the binary.

use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sql_script::{ClassifiedStatement, ParsedStatement, analyze, classify_all, split_statements};

use crate::config::{Config, OutputFormat};
use crate::{Error, Result};

const CODE_PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Split,
    Classify,
    Validate,
}

/// Rendered result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub rendered: String,
    /// False when validation reported errors.
    pub success: bool,
}

/// Read a script from `path`, or from stdin when `path` is `-`.
pub fn read_script(path: &Path) -> Result<String> {
    let read_error = |source: std::io::Error| Error::ReadScript {
        path: path.to_path_buf(),
        source,
    };

    if path.as_os_str() == "-" {
        let mut script = String::new();
        std::io::stdin()
            .read_to_string(&mut script)
            .map_err(read_error)?;
        Ok(script)
    } else {
        std::fs::read_to_string(path).map_err(read_error)
    }
}

pub fn run(command: Command, script: &str, config: &Config) -> Result<CommandOutput> {
    let output = match command {
        Command::Split => {
            let statements = split_statements(script);
            tracing::debug!(statements = statements.len(), "script split");
            CommandOutput {
                rendered: render(config.format, statements.as_slice(), render_split)?,
                success: true,
            }
        }
        Command::Classify => {
            let statements = classify_all(split_statements(script));
            tracing::debug!(statements = statements.len(), "script classified");
            CommandOutput {
                rendered: render(config.format, statements.as_slice(), render_classified)?,
                success: true,
            }
        }
        Command::Validate => {
            let analysis = analyze(script, &config.protected_objects);
            let report = ValidationReport {
                valid: analysis.is_valid(),
                needs_transaction: analysis.needs_transaction,
                statements: analysis.statements.len(),
                errors: analysis.errors,
            };
            if !report.valid {
                tracing::info!(errors = report.errors.len(), "script failed validation");
            }
            CommandOutput {
                rendered: render(config.format, &report, render_report)?,
                success: report.valid,
            }
        }
    };
    Ok(output)
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    valid: bool,
    needs_transaction: bool,
    statements: usize,
    errors: Vec<String>,
}

fn render<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    text: fn(&T) -> String,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Text => Ok(text(value)),
    }
}

fn render_split(statements: &[ParsedStatement]) -> String {
    let mut out = String::new();
    for (index, statement) in statements.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {}:{}  {}",
            index + 1,
            statement.line_number,
            statement.column,
            preview(&statement.code)
        );
    }
    out
}

fn render_classified(statements: &[ClassifiedStatement]) -> String {
    let mut out = String::new();
    for (index, statement) in statements.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {:<16} {:<7} {:<5} {}",
            index + 1,
            statement.kind.as_str(),
            statement.category.as_str(),
            if statement.needs_transaction { "tx" } else { "-" },
            preview(statement.code())
        );
    }
    out
}

fn render_report(report: &ValidationReport) -> String {
    if report.valid {
        let mode = if report.needs_transaction {
            "transactional"
        } else {
            "read-only"
        };
        return format!("OK: {} statement(s), {mode}\n", report.statements);
    }

    let mut out = String::new();
    for error in &report.errors {
        let _ = writeln!(out, "error: {error}");
    }
    out
}

/// Single-line, length-capped rendering of statement text.
fn preview(code: &str) -> String {
    let flat = code.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > CODE_PREVIEW_CHARS {
        let cut: String = flat.chars().take(CODE_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
