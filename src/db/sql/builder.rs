//! Table-level statements built from column maps.
//!
//! Table and column names are validated, never quoted, and every value
//! travels as a `?` argument; the statement scanner rewrites the
//! placeholders for engines that number them.

use crate::db::sql::dialect::validate_identifier;
use crate::error::{DbError, DbResult};
use crate::models::{Row, Value};

/// SQL text with `?` placeholders and its arguments in order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// `a = ? AND b IS NULL`, pushing the non-null values onto `params`.
fn conditions_clause(conditions: Row, params: &mut Vec<Value>) -> DbResult<String> {
    let mut terms = Vec::with_capacity(conditions.len());
    for (column, value) in conditions {
        validate_identifier(&column)?;
        if value.is_null() {
            terms.push(format!("{column} IS NULL"));
        } else {
            terms.push(format!("{column} = ?"));
            params.push(value);
        }
    }
    Ok(terms.join(" AND "))
}

fn require_conditions(conditions: &Row, action: &str, table: &str) -> DbResult<()> {
    if conditions.is_empty() {
        return Err(DbError::invalid_input(format!(
            "{action} on {table} needs at least one condition"
        )));
    }
    Ok(())
}

pub fn insert(table: &str, data: Row) -> DbResult<TableStatement> {
    validate_identifier(table)?;
    if data.is_empty() {
        return Err(DbError::invalid_input(format!(
            "Insert into {table} needs at least one column"
        )));
    }
    let mut columns = Vec::with_capacity(data.len());
    let mut params = Vec::with_capacity(data.len());
    for (column, value) in data {
        validate_identifier(&column)?;
        columns.push(column);
        params.push(value);
    }
    let placeholders = vec!["?"; params.len()].join(", ");
    Ok(TableStatement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ),
        params,
    })
}

pub fn update(table: &str, data: Row, conditions: Row) -> DbResult<TableStatement> {
    validate_identifier(table)?;
    if data.is_empty() {
        return Err(DbError::invalid_input(format!(
            "Update of {table} needs at least one column"
        )));
    }
    require_conditions(&conditions, "Update", table)?;

    let mut params = Vec::with_capacity(data.len() + conditions.len());
    let mut assignments = Vec::with_capacity(data.len());
    for (column, value) in data {
        validate_identifier(&column)?;
        assignments.push(format!("{column} = ?"));
        params.push(value);
    }
    let filter = conditions_clause(conditions, &mut params)?;
    Ok(TableStatement {
        sql: format!(
            "UPDATE {table} SET {} WHERE {filter}",
            assignments.join(", ")
        ),
        params,
    })
}

pub fn delete(table: &str, conditions: Row) -> DbResult<TableStatement> {
    validate_identifier(table)?;
    require_conditions(&conditions, "Delete", table)?;
    let mut params = Vec::with_capacity(conditions.len());
    let filter = conditions_clause(conditions, &mut params)?;
    Ok(TableStatement {
        sql: format!("DELETE FROM {table} WHERE {filter}"),
        params,
    })
}

/// No columns selects `*`; no conditions selects every row.
pub fn select(table: &str, columns: &[&str], conditions: Row) -> DbResult<TableStatement> {
    validate_identifier(table)?;
    for column in columns.iter().filter(|c| **c != "*") {
        validate_identifier(column)?;
    }
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };

    let mut params = Vec::with_capacity(conditions.len());
    let mut sql = format!("SELECT {projection} FROM {table}");
    if !conditions.is_empty() {
        let filter = conditions_clause(conditions, &mut params)?;
        sql.push_str(" WHERE ");
        sql.push_str(&filter);
    }
    Ok(TableStatement { sql, params })
}
