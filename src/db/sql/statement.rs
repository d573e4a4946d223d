//! Prepared-statement bookkeeping: placeholder scanning, rewriting to the
//! engine's native style, and the bind slots of the current statement.

use crate::db::sql::dialect::{Dialect, PlaceholderStyle};
use crate::error::{DbError, DbResult};
use crate::models::{Placeholder, Value, ValueKind};
use std::collections::HashMap;

/// Highest bind parameter number PostgreSQL accepts.
pub const MAX_DOLLAR_PLACEHOLDER: usize = 65535;

/// How the caller wrote the statement's placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    None,
    Positional,
    Named,
}

/// Result of scanning caller SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    /// SQL with placeholders rewritten to the native style.
    pub sql: String,
    pub binding: Binding,
    /// Caller placeholder for each native argument, in argument order.
    pub slots: Vec<Placeholder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Question,
    Named,
    Dollar,
}

/// Scan SQL text, skipping literals, quoted identifiers and comments, and
/// rewrite `?`, `:name` (and `$n` on PostgreSQL) into native placeholders.
pub fn parse(sql: &str, dialect: Dialect) -> DbResult<ParsedSql> {
    let bytes = sql.as_bytes();
    let style = dialect.placeholder_style();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut slots: Vec<Placeholder> = Vec::new();
    let mut seen: Option<Marker> = None;
    let mut named_args: HashMap<String, usize> = HashMap::new();
    let mut positional = 0usize;
    let mut copied = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => i = skip_quoted(bytes, i, b'\'', dialect.backslash_escapes()),
            b'"' => i = skip_quoted(bytes, i, b'"', dialect.backslash_escapes()),
            b'`' => i = skip_quoted(bytes, i, b'`', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'#' if dialect.hash_comments() => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b)) => {
                let start = i + 1;
                let end = ident_end(bytes, start);
                let name = &sql[start..end];
                mark(&mut seen, Marker::Named)?;

                out.push_str(&sql[copied..i]);
                match style {
                    PlaceholderStyle::Question => {
                        slots.push(Placeholder::Named(name.to_string()));
                        out.push('?');
                    }
                    PlaceholderStyle::Dollar => {
                        let arg = match named_args.get(name) {
                            Some(arg) => *arg,
                            None => {
                                slots.push(Placeholder::Named(name.to_string()));
                                named_args.insert(name.to_string(), slots.len());
                                slots.len()
                            }
                        };
                        out.push('$');
                        out.push_str(&arg.to_string());
                    }
                }
                copied = end;
                i = end;
            }
            b'?' => {
                mark(&mut seen, Marker::Question)?;
                positional += 1;
                slots.push(Placeholder::Position(positional));
                out.push_str(&sql[copied..i]);
                match style {
                    PlaceholderStyle::Question => out.push('?'),
                    PlaceholderStyle::Dollar => {
                        out.push('$');
                        out.push_str(&positional.to_string());
                    }
                }
                i += 1;
                copied = i;
            }
            b'$' if dialect.dollar_quotes() => {
                if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                    let n: usize = sql[start..end].parse().map_err(|_| {
                        DbError::statement(
                            format!("Query preparation failed: invalid placeholder '{}'", &sql[i..end]),
                            None,
                        )
                    })?;
                    if n == 0 {
                        return Err(DbError::statement(
                            "Query preparation failed: placeholder $0 is not valid",
                            None,
                        ));
                    }
                    if n > MAX_DOLLAR_PLACEHOLDER {
                        return Err(DbError::statement(
                            format!(
                                "Query preparation failed: placeholder ${n} exceeds {MAX_DOLLAR_PLACEHOLDER}"
                            ),
                            None,
                        ));
                    }
                    mark(&mut seen, Marker::Dollar)?;
                    while slots.len() < n {
                        slots.push(Placeholder::Position(slots.len() + 1));
                    }
                    i = end;
                } else {
                    i = skip_dollar_quoted(bytes, i);
                }
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);

    let binding = match seen {
        None => Binding::None,
        Some(Marker::Named) => Binding::Named,
        Some(Marker::Question | Marker::Dollar) => Binding::Positional,
    };

    Ok(ParsedSql {
        sql: out,
        binding,
        slots,
    })
}

fn mark(seen: &mut Option<Marker>, marker: Marker) -> DbResult<()> {
    match *seen {
        None => {
            *seen = Some(marker);
            Ok(())
        }
        Some(prev) if prev == marker => Ok(()),
        Some(_) => Err(DbError::statement(
            "Query preparation failed: positional and named placeholders cannot be mixed",
            None,
        )),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn ident_end(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    i
}

/// Returns the index just past the closing quote (or the end of input).
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            // a doubled quote is an escaped quote
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|p| start + p + 1)
        .unwrap_or(bytes.len())
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

/// Skip `$tag$ ... $tag$`. A lone `$` that does not open a tag is stepped over.
fn skip_dollar_quoted(bytes: &[u8], start: usize) -> usize {
    let mut tag_end = start + 1;
    while tag_end < bytes.len() && (bytes[tag_end].is_ascii_alphanumeric() || bytes[tag_end] == b'_')
    {
        tag_end += 1;
    }
    if bytes.get(tag_end) != Some(&b'$') {
        return start + 1;
    }
    let tag = &bytes[start..=tag_end];
    let mut i = tag_end + 1;
    while i + tag.len() <= bytes.len() {
        if &bytes[i..i + tag.len()] == tag {
            return i + tag.len();
        }
        i += 1;
    }
    bytes.len()
}

/// One native argument: the bound value and the kind it binds as.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub value: Value,
    pub kind: ValueKind,
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        let kind = value.kind();
        Self { value, kind }
    }
}

/// The current prepared statement of a handler and its bound values.
#[derive(Debug, Clone)]
pub struct Statement {
    /// SQL as the caller wrote it.
    pub sql: String,
    parsed: ParsedSql,
    bindings: HashMap<Placeholder, Argument>,
}

impl Statement {
    pub fn new(sql: &str, parsed: ParsedSql) -> Self {
        Self {
            sql: sql.to_string(),
            parsed,
            bindings: HashMap::new(),
        }
    }

    /// SQL sent to the engine.
    pub fn native_sql(&self) -> &str {
        &self.parsed.sql
    }

    pub fn placeholder_count(&self) -> usize {
        self.parsed.slots.len()
    }

    pub fn has_placeholders(&self) -> bool {
        self.parsed.binding != Binding::None
    }

    /// Record a value, already coerced to `kind`, for one placeholder.
    pub fn bind(&mut self, placeholder: Placeholder, value: Value, kind: ValueKind) -> DbResult<()> {
        let known = match (&placeholder, self.parsed.binding) {
            (Placeholder::Position(0), _) => {
                return Err(DbError::statement(
                    "Binding parameter failed: positions are 1-based",
                    None,
                ));
            }
            (Placeholder::Position(n), Binding::Positional) => *n <= self.parsed.slots.len(),
            (Placeholder::Named(_), Binding::Named) => self.parsed.slots.contains(&placeholder),
            _ => false,
        };
        if !known {
            return Err(DbError::statement(
                format!(
                    "Binding parameter failed: statement has no placeholder {placeholder}"
                ),
                None,
            ));
        }
        self.bindings.insert(placeholder, Argument { value, kind });
        Ok(())
    }

    /// Bound values in native argument order.
    pub fn arguments(&self) -> DbResult<Vec<Argument>> {
        self.parsed
            .slots
            .iter()
            .map(|slot| {
                self.bindings.get(slot).cloned().ok_or_else(|| {
                    DbError::statement(
                        format!("Execution failed: no value bound for placeholder {slot}"),
                        None,
                    )
                })
            })
            .collect()
    }
}
