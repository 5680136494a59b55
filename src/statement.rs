//! Statement splitting for multi-statement query text.
//!
//! Only statement boundaries are detected here. A semicolon ends a statement
//! unless it sits inside a quoted literal, a quoted identifier, a comment, or
//! the `BEGIN ... END` body of a `CREATE TRIGGER`. Nothing is validated
//! beyond that: the engine is the judge of whether a statement makes sense.

use std::fmt;

use crate::error::{QueryError, Result};

/// One complete SQL command, as it appeared in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn into_sql(self) -> String {
        self.sql
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Split raw query text into statements, in source order.
///
/// Each statement keeps its terminating semicolon. Leading whitespace and
/// comments are not part of a statement, and fragments holding nothing but
/// whitespace or comments are dropped.
///
/// # Examples
///
/// ```
/// use sqlite_query::split_statements;
///
/// let statements = split_statements("INSERT INTO t VALUES(1,2); SELECT a,b FROM t;").unwrap();
/// assert_eq!(statements.len(), 2);
/// assert_eq!(statements[0].sql(), "INSERT INTO t VALUES(1,2);");
/// assert_eq!(statements[1].sql(), "SELECT a,b FROM t;");
/// ```
pub fn split_statements(sql: &str) -> Result<Vec<Statement>> {
    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut start: Option<usize> = None;
    let mut block = TriggerBlock::default();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            i = skip_line_comment(bytes, i);
            continue;
        }
        if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = skip_block_comment(bytes, i)?;
            continue;
        }
        if b.is_ascii_whitespace() || (b == b';' && start.is_none()) {
            i += 1;
            continue;
        }

        let begin = *start.get_or_insert(i);
        match b {
            b'\'' | b'"' | b'`' => i = skip_quoted(bytes, i, b)?,
            b'[' => i = skip_bracketed(bytes, i)?,
            b';' if !block.is_open() => {
                statements.push(Statement::new(&sql[begin..=i]));
                start = None;
                block = TriggerBlock::default();
                i += 1;
            }
            _ if is_word_byte(b) => {
                let end = word_end(bytes, i);
                block.observe(&sql[i..end]);
                i = end;
            }
            _ => i += 1,
        }
    }

    if block.is_open() {
        return Err(QueryError::Parse(
            "unterminated BEGIN ... END block in trigger".to_string(),
        ));
    }

    if let Some(begin) = start {
        statements.push(Statement::new(sql[begin..].trim_end()));
    }

    Ok(statements)
}

/// Tracks whether the statement being scanned is a trigger whose body is
/// still open, in which case semicolons do not end it.
#[derive(Debug, Default)]
struct TriggerBlock {
    leading: Vec<String>,
    is_trigger: bool,
    depth: usize,
}

impl TriggerBlock {
    fn observe(&mut self, word: &str) {
        if self.leading.len() < 3 {
            self.leading.push(word.to_ascii_uppercase());
            self.is_trigger = match self.leading.as_slice() {
                [create, trigger] => create == "CREATE" && trigger == "TRIGGER",
                [create, temp, trigger] => {
                    create == "CREATE"
                        && (temp == "TEMP" || temp == "TEMPORARY")
                        && trigger == "TRIGGER"
                }
                _ => false,
            } || self.is_trigger;
            return;
        }
        if !self.is_trigger {
            return;
        }

        if word.eq_ignore_ascii_case("BEGIN")
            || (self.depth > 0 && word.eq_ignore_ascii_case("CASE"))
        {
            self.depth += 1;
        } else if self.depth > 0 && word.eq_ignore_ascii_case("END") {
            self.depth -= 1;
        }
    }

    fn is_open(&self) -> bool {
        self.depth > 0
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn word_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| !is_word_byte(b))
        .map_or(bytes.len(), |offset| from + offset)
}

fn skip_line_comment(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| from + offset + 1)
}

fn skip_block_comment(bytes: &[u8], from: usize) -> Result<usize> {
    bytes[from + 2..]
        .windows(2)
        .position(|pair| pair == b"*/")
        .map(|offset| from + 2 + offset + 2)
        .ok_or_else(|| QueryError::Parse("unterminated block comment".to_string()))
}

/// Skips a literal or identifier opened by `quote`; a doubled quote is an
/// escaped quote.
fn skip_quoted(bytes: &[u8], from: usize, quote: u8) -> Result<usize> {
    let mut i = from + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(QueryError::Parse(format!(
        "unterminated quoted literal starting at byte {from}"
    )))
}

fn skip_bracketed(bytes: &[u8], from: usize) -> Result<usize> {
    bytes[from..]
        .iter()
        .position(|&b| b == b']')
        .map(|offset| from + offset + 1)
        .ok_or_else(|| {
            QueryError::Parse(format!(
                "unterminated bracketed identifier starting at byte {from}"
            ))
        })
}
