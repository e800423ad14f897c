//! Parameterised SQL statements and their JSON row results.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::database::manager::DatabaseError;

pub type Row = Map<String, Value>;
pub type Rows = Vec<Row>;

/// A SQL statement with its bound parameters.
///
/// The public constructor only takes `&'static str`, so statement text is
/// always a literal in the calling service and values can only arrive through
/// [`Statement::bind`]. Identifier-bearing SQL generated inside the crate
/// goes through [`Statement::trusted`] after the identifiers were validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: Cow<'static, str>,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: &'static str) -> Self {
        Self {
            sql: Cow::Borrowed(sql),
            params: Vec::new(),
        }
    }

    pub(crate) fn trusted(sql: String) -> Self {
        Self {
            sql: Cow::Owned(sql),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Reject statements whose placeholders don't line up with the bound
    /// parameters, before anything is sent to the database.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        let highest = highest_placeholder(&self.sql);
        if highest != self.params.len() {
            return Err(DatabaseError::InvalidStatement(format!(
                "statement uses {} placeholder(s) but {} parameter(s) were bound",
                highest,
                self.params.len()
            )));
        }
        Ok(())
    }
}

/// Highest `$n` placeholder index, ignoring quoted literals, quoted
/// identifiers, dollar-quoted bodies and comments.
fn highest_placeholder(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut highest = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        // doubled quote is an escape
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'$' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    if let Ok(n) = sql[start..end].parse::<usize>() {
                        highest = highest.max(n);
                    }
                    i = end;
                } else if let Some(close) = dollar_tag_end(bytes, i) {
                    // $tag$ ... $tag$
                    let tag = &sql[i..close];
                    i = match sql[close..].find(tag) {
                        Some(pos) => close + pos + tag.len(),
                        None => bytes.len(),
                    };
                } else {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i += 2;
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                // block comments nest in PostgreSQL
                let mut depth = 1;
                i += 2;
                while i < bytes.len() && depth > 0 {
                    if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                        depth += 1;
                        i += 2;
                    } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        depth -= 1;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
            }
            _ => i += 1,
        }
    }

    highest
}

/// If `bytes[at]` opens a dollar quote tag (`$$` or `$name$`), return the
/// index just past it.
fn dollar_tag_end(bytes: &[u8], at: usize) -> Option<usize> {
    let mut j = at + 1;
    while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    (j < bytes.len() && bytes[j] == b'$').then_some(j + 1)
}

/// Identifier check shared by the repository and the pool cache: ASCII
/// letters, digits and underscores, not starting with a digit, within the
/// PostgreSQL 63 byte limit.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote SQL identifier to prevent injection
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
