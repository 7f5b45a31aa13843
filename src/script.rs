// ABOUTME: SQL script loading for SQL Server records
// ABOUTME: Splits script sources into statements and runs them in order through a tracker

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ConnectionConfig;
use crate::db::{Executor, SqlServerError};
use crate::models::{ScriptOutcome, ScriptStatus};
use crate::tracker::QueryTracker;

/// Batch separator understood by sqlcmd and SSMS
pub const DEFAULT_MARKER: &str = "GO";

static PRINT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^print\b[^\n]*\n?").expect("valid print pattern"));
static USE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^use\b").expect("valid use pattern"));

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to read script: {0}")]
    Read(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] SqlServerError),
    #[error("Batch marker must not be empty")]
    EmptyMarker,
}

impl ScriptError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptError::Read(_) => "Io",
            ScriptError::Database(e) => e.kind(),
            ScriptError::EmptyMarker => "EmptyMarker",
        }
    }
}

/// A non-empty batch separator token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerToken(String);

impl MarkerToken {
    pub fn new(token: &str) -> Result<Self, ScriptError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ScriptError::EmptyMarker);
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a script is cut into statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delimiter {
    /// Every line is a statement
    LineBreak,
    /// A statement ends at a line holding only this token
    Marker(MarkerToken),
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::Marker(MarkerToken(DEFAULT_MARKER.to_string()))
    }
}

impl Delimiter {
    pub fn marker(token: &str) -> Result<Self, ScriptError> {
        Ok(Delimiter::Marker(MarkerToken::new(token)?))
    }

    fn token(&self) -> &str {
        match self {
            Delimiter::Marker(token) => token.as_str(),
            Delimiter::LineBreak => DEFAULT_MARKER,
        }
    }
}

/// Where a script comes from
pub enum ScriptSource {
    /// Resolved against the configured root; a missing file is skipped
    Path(PathBuf),
    Reader {
        name: String,
        reader: Box<dyn Read + Send>,
    },
}

impl ScriptSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        ScriptSource::Path(path.into())
    }

    pub fn reader(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        ScriptSource::Reader {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ScriptSource::Path(path) => path.display().to_string(),
            ScriptSource::Reader { name, .. } => name.clone(),
        }
    }

    /// Read the whole source; `None` when the path does not exist
    fn read(self, config: &ConnectionConfig) -> io::Result<Option<String>> {
        match self {
            ScriptSource::Path(path) => match std::fs::read_to_string(config.resolve(&path)) {
                Ok(text) => Ok(Some(text)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            },
            ScriptSource::Reader { mut reader, .. } => {
                let mut text = String::new();
                reader.read_to_string(&mut text)?;
                Ok(Some(text))
            }
        }
    }
}

impl fmt::Debug for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ScriptSource::Reader { name, .. } => {
                f.debug_struct("Reader").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

impl From<&str> for ScriptSource {
    fn from(path: &str) -> Self {
        ScriptSource::path(path)
    }
}

impl From<PathBuf> for ScriptSource {
    fn from(path: PathBuf) -> Self {
        ScriptSource::Path(path)
    }
}

impl From<&Path> for ScriptSource {
    fn from(path: &Path) -> Self {
        ScriptSource::path(path)
    }
}

fn is_marker_line(line: &str, marker: &str) -> bool {
    line.trim().eq_ignore_ascii_case(marker)
}

/// Case-insensitive prefix match that stops at a word boundary
fn starts_with_word(text: &str, word: &str) -> bool {
    match text.get(..word.len()) {
        Some(head) if head.eq_ignore_ascii_case(word) => text[word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_')),
        _ => false,
    }
}

fn raw_statements(text: &str, delimiter: &Delimiter) -> Vec<String> {
    match delimiter {
        Delimiter::LineBreak => text.lines().map(str::to_string).collect(),
        Delimiter::Marker(marker) => {
            let mut blocks = Vec::new();
            let mut current = String::new();
            for line in text.split_inclusive('\n') {
                current.push_str(line);
                if is_marker_line(line, marker.as_str()) {
                    blocks.push(std::mem::take(&mut current));
                }
            }
            if !current.trim().is_empty() {
                blocks.push(current);
            }
            blocks
        }
    }
}

fn strip_trailing_marker<'t>(raw: &'t str, marker: &str) -> &'t str {
    let trimmed = raw.trim_end();
    let (head, last) = match trimmed.rfind('\n') {
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    if is_marker_line(last, marker) {
        head
    } else {
        raw
    }
}

fn clean_statement(raw: &str, marker: &str) -> Option<String> {
    let body = PRINT_LINE.replace_all(strip_trailing_marker(raw, marker), "");
    let statement = body.trim();

    if statement.is_empty()
        || statement.starts_with("--")
        || USE_DIRECTIVE.is_match(statement)
        || starts_with_word(statement, marker)
    {
        return None;
    }
    Some(statement.to_string())
}

/// Split script text into the statements that would be executed
pub fn split_statements(text: &str, delimiter: &Delimiter) -> Vec<String> {
    let marker = delimiter.token();
    raw_statements(text, delimiter)
        .iter()
        .filter_map(|raw| clean_statement(raw, marker))
        .collect()
}

async fn execute_source(
    tracker: &mut QueryTracker<'_>,
    config: &ConnectionConfig,
    source: ScriptSource,
    delimiter: &Delimiter,
    executed: &mut usize,
) -> Result<ScriptStatus, ScriptError> {
    let Some(text) = source.read(config)? else {
        return Ok(ScriptStatus::Missing);
    };

    for statement in split_statements(&text, delimiter) {
        tracker.execute(&statement).await?;
        *executed += 1;
    }
    Ok(ScriptStatus::Completed)
}

/// Load one script source through `executor`.
///
/// Errors are caught for the whole source, logged with the last statement
/// dispatched, and reported in the outcome. Statements that already ran stay
/// applied.
pub async fn run_script(
    executor: &mut dyn Executor,
    config: &ConnectionConfig,
    source: ScriptSource,
    delimiter: &Delimiter,
) -> ScriptOutcome {
    let label = source.label();
    let started_at = Utc::now();
    let mut executed = 0;
    let mut tracker = QueryTracker::new(executor);

    let result = execute_source(&mut tracker, config, source, delimiter, &mut executed).await;
    let last_statement = tracker.last_query().map(str::to_string);

    let mut outcome = ScriptOutcome {
        source: label,
        status: ScriptStatus::Completed,
        statements_executed: executed,
        last_statement,
        error_kind: None,
        error: None,
        started_at,
        finished_at: Utc::now(),
    };

    match result {
        Ok(ScriptStatus::Missing) => {
            log::debug!("Skipping missing script: {}", outcome.source);
            outcome.status = ScriptStatus::Missing;
        }
        Ok(status) => {
            log::info!(
                "Loaded {} ({} statements)",
                outcome.source,
                outcome.statements_executed
            );
            outcome.status = status;
        }
        Err(e) => {
            log::error!(
                "{}: {}\nLast query: {}",
                e.kind(),
                e,
                outcome.last_statement.as_deref().unwrap_or("<none>")
            );
            outcome.status = ScriptStatus::Failed;
            outcome.error_kind = Some(e.kind().to_string());
            outcome.error = Some(e.to_string());
        }
    }

    outcome
}
