//! Translation of filters, ordering and paging into SQLite statements.
//!
//! Entity documents live in a `body` column and are addressed with
//! `json_extract`. Table names come from validated set declarations; field
//! paths and values are always bound as parameters.

use repokit_domain::query::validate_field_path;
use repokit_domain::{CompareOp, DomainError, Filter, QuerySpec, SortDirection};
use serde_json::Value;
use sqlx::sqlite::SqliteArguments;
use sqlx::Arguments;

/// One bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlArg {
    Int(i64),
    Real(f64),
    Text(String),
    Null,
}

impl SqlArg {
    /// Scalar form of a JSON value, comparable with `json_extract` output
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlArg::Null,
            Value::Bool(b) => SqlArg::Int(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlArg::Int(i),
                None => SqlArg::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlArg::Text(s.clone()),
            other => SqlArg::Text(other.to_string()),
        }
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl Statement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn bind(mut self, arg: SqlArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn arguments<'q>(&self) -> Result<SqliteArguments<'q>, DomainError> {
        let mut arguments = SqliteArguments::default();
        for arg in &self.args {
            let added = match arg {
                SqlArg::Int(v) => arguments.add(*v),
                SqlArg::Real(v) => arguments.add(*v),
                SqlArg::Text(v) => arguments.add(v.clone()),
                SqlArg::Null => arguments.add(Option::<String>::None),
            };
            added.map_err(|e| {
                DomainError::InvalidQuery(format!("Failed to bind query argument: {}", e))
            })?;
        }
        Ok(arguments)
    }
}

pub(crate) fn create_table(set: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (\
         seq INTEGER PRIMARY KEY AUTOINCREMENT, \
         entity_key TEXT NOT NULL UNIQUE, \
         body TEXT NOT NULL)",
        set
    )
}

/// Documents matching a query. With an in-memory key ordering the whole
/// filtered set is returned in insertion order and paging is left to the caller.
pub(crate) fn select<T>(set: &str, spec: &QuerySpec<T>) -> Result<Statement, DomainError> {
    let mut builder = WhereBuilder::default();
    builder.push(spec.filter_ref())?;

    let mut sql = format!("SELECT body FROM \"{}\" WHERE {}", set, builder.sql);
    let mut args = builder.args;

    if spec.needs_in_memory_pass() {
        sql.push_str(" ORDER BY seq");
        return Ok(Statement { sql, args });
    }

    match spec.order().and_then(|order| order.field_path().map(|p| (p, order.direction()))) {
        Some((path, direction)) => {
            let dir = match direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY json_extract(body, ?) {}, seq", dir));
            args.push(SqlArg::Text(json_path(path)?));
        }
        None => sql.push_str(" ORDER BY seq"),
    }

    match (spec.skip_count(), spec.take_count()) {
        (None, None) => {}
        (skip, take) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(SqlArg::Int(take.map(to_i64).unwrap_or(-1)));
            args.push(SqlArg::Int(skip.map(to_i64).unwrap_or(0)));
        }
    }

    Ok(Statement { sql, args })
}

pub(crate) fn count(set: &str, filter: &Filter) -> Result<Statement, DomainError> {
    let mut builder = WhereBuilder::default();
    builder.push(filter)?;
    Ok(Statement {
        sql: format!("SELECT COUNT(*) FROM \"{}\" WHERE {}", set, builder.sql),
        args: builder.args,
    })
}

pub(crate) fn exists(set: &str, filter: &Filter) -> Result<Statement, DomainError> {
    let mut builder = WhereBuilder::default();
    builder.push(filter)?;
    Ok(Statement {
        sql: format!(
            "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE {})",
            set, builder.sql
        ),
        args: builder.args,
    })
}

pub(crate) fn insert(set: &str, key: &str, body: &str) -> Statement {
    Statement::new(format!(
        "INSERT INTO \"{}\" (entity_key, body) VALUES (?, ?)",
        set
    ))
    .bind(SqlArg::Text(key.to_string()))
    .bind(SqlArg::Text(body.to_string()))
}

pub(crate) fn insert_with_seq(set: &str, seq: i64, key: &str, body: &str) -> Statement {
    Statement::new(format!(
        "INSERT INTO \"{}\" (seq, entity_key, body) VALUES (?, ?, ?)",
        set
    ))
    .bind(SqlArg::Int(seq))
    .bind(SqlArg::Text(key.to_string()))
    .bind(SqlArg::Text(body.to_string()))
}

/// Rewrites key and body of a freshly inserted row with a generated key
pub(crate) fn finalize_insert(set: &str, seq: i64, key: &str, body: &str) -> Statement {
    Statement::new(format!(
        "UPDATE \"{}\" SET entity_key = ?, body = ? WHERE seq = ?",
        set
    ))
    .bind(SqlArg::Text(key.to_string()))
    .bind(SqlArg::Text(body.to_string()))
    .bind(SqlArg::Int(seq))
}

pub(crate) fn update(set: &str, key: &str, body: &str) -> Statement {
    Statement::new(format!("UPDATE \"{}\" SET body = ? WHERE entity_key = ?", set))
        .bind(SqlArg::Text(body.to_string()))
        .bind(SqlArg::Text(key.to_string()))
}

pub(crate) fn delete(set: &str, key: &str) -> Statement {
    Statement::new(format!("DELETE FROM \"{}\" WHERE entity_key = ?", set))
        .bind(SqlArg::Text(key.to_string()))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn json_path(field: &str) -> Result<String, DomainError> {
    validate_field_path(field).map_err(DomainError::InvalidQuery)?;
    Ok(format!("$.{}", field))
}

#[derive(Default)]
struct WhereBuilder {
    sql: String,
    args: Vec<SqlArg>,
}

impl WhereBuilder {
    fn push(&mut self, filter: &Filter) -> Result<(), DomainError> {
        match filter {
            Filter::All => self.sql.push_str("1 = 1"),
            Filter::Compare { field, op, value } => self.push_compare(field, *op, value)?,
            Filter::In { field, values } => {
                if values.is_empty() {
                    self.sql.push_str("0 = 1");
                    return Ok(());
                }
                self.push_extract(field)?;
                let placeholders = vec!["?"; values.len()].join(", ");
                self.sql.push_str(&format!(" IN ({})", placeholders));
                self.args.extend(values.iter().map(SqlArg::from_json));
            }
            Filter::Contains { field, needle } => {
                self.sql.push_str("instr(");
                self.push_extract(field)?;
                self.sql.push_str(", ?) > 0");
                self.args.push(SqlArg::Text(needle.clone()));
            }
            Filter::StartsWith { field, prefix } => {
                // substr keeps the match case-sensitive, unlike LIKE
                self.sql.push_str("substr(");
                self.push_extract(field)?;
                self.sql.push_str(", 1, ?) = ?");
                self.args.push(SqlArg::Int(to_i64(prefix.chars().count())));
                self.args.push(SqlArg::Text(prefix.clone()));
            }
            Filter::IsNull { field } => {
                self.push_extract(field)?;
                self.sql.push_str(" IS NULL");
            }
            Filter::And(items) => self.push_joined(items, " AND ", "1 = 1")?,
            Filter::Or(items) => self.push_joined(items, " OR ", "0 = 1")?,
            Filter::Not(inner) => {
                // a comparison against a missing field is NULL; treat it as no match
                self.sql.push_str("NOT COALESCE((");
                self.push(inner)?;
                self.sql.push_str("), 0)");
            }
        }
        Ok(())
    }

    fn push_extract(&mut self, field: &str) -> Result<(), DomainError> {
        self.sql.push_str("json_extract(body, ?)");
        self.args.push(SqlArg::Text(json_path(field)?));
        Ok(())
    }

    fn push_compare(&mut self, field: &str, op: CompareOp, value: &Value) -> Result<(), DomainError> {
        if value.is_null() {
            let test = match op {
                CompareOp::Eq => " IS NULL",
                CompareOp::Ne => " IS NOT NULL",
                other => {
                    return Err(DomainError::InvalidQuery(format!(
                        "Operator {:?} cannot compare '{}' with null",
                        other, field
                    )))
                }
            };
            self.push_extract(field)?;
            self.sql.push_str(test);
            return Ok(());
        }

        self.push_extract(field)?;
        self.sql.push_str(&format!(" {} ?", op.as_sql()));
        self.args.push(SqlArg::from_json(value));
        Ok(())
    }

    fn push_joined(&mut self, items: &[Filter], separator: &str, empty: &str) -> Result<(), DomainError> {
        if items.is_empty() {
            self.sql.push_str(empty);
            return Ok(());
        }
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.sql.push_str(separator);
            }
            self.sql.push('(');
            self.push(item)?;
            self.sql.push(')');
        }
        Ok(())
    }
}
