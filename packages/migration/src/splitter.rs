//! Statement-boundary scanner for migration scripts.
//!
//! A `;` only ends a statement when it appears outside string literals,
//! quoted identifiers, comments and Postgres dollar-quoted bodies.

use sea_orm::DatabaseBackend;
use thiserror::Error;

/// Number of characters kept when a statement is shown in logs or errors.
pub const PREVIEW_CHARS: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unterminated string literal starting at line {line}")]
    UnterminatedString { line: usize },
    #[error("unterminated quoted identifier starting at line {line}")]
    UnterminatedIdentifier { line: usize },
    #[error("unterminated block comment starting at line {line}")]
    UnterminatedComment { line: usize },
    #[error("unterminated dollar-quoted body starting at line {line}")]
    UnterminatedDollarQuote { line: usize },
}

/// One executable statement, trimmed and without its terminating semicolon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    /// 1-based line of the first character of the statement.
    pub line: usize,
}

impl Statement {
    /// First [`PREVIEW_CHARS`] characters on a single line.
    pub fn preview(&self) -> String {
        let flat: String = self
            .sql
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        let mut preview: String = flat.chars().take(PREVIEW_CHARS).collect();
        if flat.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        preview
    }
}

/// SQL flavour a script is scanned for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
    MySql,
}

impl Dialect {
    /// Postgres nests `/* */` comments; SQLite and MySQL end them at the
    /// first `*/`.
    fn nests_block_comments(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

impl From<DatabaseBackend> for Dialect {
    fn from(backend: DatabaseBackend) -> Self {
        match backend {
            DatabaseBackend::Postgres => Dialect::Postgres,
            DatabaseBackend::Sqlite => Dialect::Sqlite,
            DatabaseBackend::MySql => Dialect::MySql,
        }
    }
}

/// Split a script into its statements.
///
/// Fragments holding nothing but whitespace and comments are dropped, so a
/// script made only of those yields an empty list. A statement starts at its
/// first byte of code, so comments before it are not part of its text. A last
/// statement without a trailing `;` is still returned.
pub fn split_statements(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, ScanError> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut code_start: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        let at = i;
        match bytes[i] {
            b'\'' => {
                let backslash_escapes = is_escape_string_prefix(bytes, i);
                i = skip_quoted(bytes, i, b'\'', backslash_escapes).ok_or(
                    ScanError::UnterminatedString {
                        line: line_at(bytes, i),
                    },
                )?;
            }
            b'"' => {
                i = skip_quoted(bytes, i, b'"', false).ok_or(
                    ScanError::UnterminatedIdentifier {
                        line: line_at(bytes, i),
                    },
                )?;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line_comment(bytes, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i, dialect.nests_block_comments()).ok_or(
                    ScanError::UnterminatedComment {
                        line: line_at(bytes, i),
                    },
                )?;
                continue;
            }
            b'$' => match dollar_tag_end(bytes, i) {
                Some(tag_end) => {
                    let tag = &bytes[i..=tag_end];
                    i = find_from(bytes, tag_end + 1, tag)
                        .map(|pos| pos + tag.len())
                        .ok_or(ScanError::UnterminatedDollarQuote {
                            line: line_at(bytes, i),
                        })?;
                }
                None => i += 1,
            },
            b';' => {
                if let Some(start) = code_start.take() {
                    push_statement(sql, start, i, &mut statements);
                }
                i += 1;
                continue;
            }
            b if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            _ => i += 1,
        }
        code_start.get_or_insert(at);
    }

    if let Some(start) = code_start {
        push_statement(sql, start, bytes.len(), &mut statements);
    }
    Ok(statements)
}

fn push_statement(sql: &str, start: usize, end: usize, out: &mut Vec<Statement>) {
    out.push(Statement {
        sql: sql[start..end].trim_end().to_string(),
        line: line_at(sql.as_bytes(), start),
    });
}

fn line_at(bytes: &[u8], offset: usize) -> usize {
    bytes[..offset].iter().filter(|b| **b == b'\n').count() + 1
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Postgres `E'...'` strings treat backslash as an escape character.
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    quote > 0
        && matches!(bytes[quote - 1], b'E' | b'e')
        && (quote < 2 || !is_ident_byte(bytes[quote - 2]))
}

/// Returns the index just past the closing quote. A doubled quote is an
/// escaped quote, not a terminator.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8, backslash_escapes: bool) -> Option<usize> {
    let mut j = open + 1;
    while j < bytes.len() {
        let b = bytes[j];
        if backslash_escapes && b == b'\\' {
            j += 2;
            continue;
        }
        if b == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return Some(j + 1);
        }
        j += 1;
    }
    None
}

fn skip_line_comment(bytes: &[u8], open: usize) -> usize {
    bytes[open..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|pos| open + pos + 1)
        .unwrap_or(bytes.len())
}

/// Returns the index just past the `*/` closing the comment opened at `open`.
fn skip_block_comment(bytes: &[u8], open: usize, nested: bool) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = open;
    while j + 1 < bytes.len() {
        match (bytes[j], bytes[j + 1]) {
            (b'/', b'*') if nested || depth == 0 => {
                depth += 1;
                j += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                j += 2;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => j += 1,
        }
    }
    None
}

/// If a dollar-quote tag (`$$` or `$name$`) opens at `open`, returns the
/// index of its closing `$`. Positional parameters like `$1` are not tags.
fn dollar_tag_end(bytes: &[u8], open: usize) -> Option<usize> {
    if open > 0 && is_ident_byte(bytes[open - 1]) {
        return None;
    }
    let mut j = open + 1;
    if let Some(first) = bytes.get(j) {
        if first.is_ascii_digit() {
            return None;
        }
    }
    while let Some(&b) = bytes.get(j) {
        if b == b'$' {
            return Some(j);
        }
        if !is_ident_byte(b) {
            return None;
        }
        j += 1;
    }
    None
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos)
}
