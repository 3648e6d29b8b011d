//! Schema introspection utilities for SQLite tables.
//!
//! Determines whether a table's primary key is the rowid and whether the
//! table was created `WITHOUT ROWID`, which SQLite's update hook ignores.

use regex::Regex;
use sqlx::{Row, SqliteConnection};
use std::sync::OnceLock;

use crate::change::TableInfo;

/// Queries the schema information for a table.
///
/// Returns `None` if the table doesn't exist.
pub async fn query_table_info(
   conn: &mut SqliteConnection,
   table_name: &str,
) -> crate::Result<Option<TableInfo>> {
   let Some(create_sql) = query_create_sql(conn, table_name).await? else {
      return Ok(None);
   };
   let without_rowid = has_without_rowid_clause(&create_sql);

   // PRAGMA table_info returns: cid, name, type, notnull, dflt_value, pk
   // pk is 0 for non-PK columns, or 1-indexed position for PK columns
   let pragma = format!("PRAGMA table_info({})", quote_identifier(table_name));
   let rows = sqlx::query(&pragma).fetch_all(&mut *conn).await?;

   let pk_types: Vec<String> = rows
      .iter()
      .filter_map(|row| {
         let pk: i32 = row.get("pk");
         (pk > 0).then(|| row.get("type"))
      })
      .collect();

   Ok(Some(TableInfo::new(
      !without_rowid && is_rowid_alias(&pk_types),
      without_rowid,
   )))
}

async fn query_create_sql(
   conn: &mut SqliteConnection,
   table_name: &str,
) -> crate::Result<Option<String>> {
   let sql = r#"
        SELECT sql FROM sqlite_master
        WHERE type = 'table' AND name = ?1
    "#;

   let row: Option<(Option<String>,)> = sqlx::query_as(sql)
      .bind(table_name)
      .fetch_optional(&mut *conn)
      .await?;

   Ok(row.and_then(|(create_sql,)| create_sql))
}

/// A lone `INTEGER PRIMARY KEY` column is stored as the rowid itself.
///
/// The declared type must be exactly `INTEGER` (any case); `INT` or
/// `BIGINT` keys are ordinary columns with a separate rowid.
fn is_rowid_alias(pk_types: &[String]) -> bool {
   matches!(pk_types, [only] if only.eq_ignore_ascii_case("INTEGER"))
}

/// Checks if a CREATE TABLE statement ends with WITHOUT ROWID.
///
/// The regex matches "WITHOUT ROWID" only when it appears at the end of the
/// statement (after the closing parenthesis), avoiding false matches in
/// string literals or comments.
fn has_without_rowid_clause(create_sql: &str) -> bool {
   static RE: OnceLock<Regex> = OnceLock::new();
   let re = RE.get_or_init(|| {
      Regex::new(r"(?i)\)\s*WITHOUT\s+ROWID\s*$").expect("invalid regex")
   });
   re.is_match(create_sql)
}

/// Quotes a SQLite identifier to prevent SQL injection.
fn quote_identifier(name: &str) -> String {
   format!("\"{}\"", name.replace('"', "\"\""))
}
