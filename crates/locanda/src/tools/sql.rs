// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Arbitrary SQL execution under the caller's principal.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;

use locanda_core::{LocandaError, Tool, ToolContext, ToolDef};

use super::pool_from;

pub struct ExecuteSqlTool;

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
}

#[async_trait]
impl Tool for ExecuteSqlTool {
    fn def(&self) -> ToolDef {
        ToolDef {
            name: "execute_sql".into(),
            description: "Execute an arbitrary SQL query against the database. \
                Returns rows as text for SELECT, or the affected row count for \
                INSERT/UPDATE/DELETE."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The SQL query to execute"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<String, LocandaError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| LocandaError::Tool(format!("invalid arguments: {e}")))?;
        let pool = pool_from(ctx)?;

        let query = args.query.trim().trim_end_matches(';').trim();
        if query.is_empty() {
            return Err(LocandaError::Tool("empty query".into()));
        }

        if is_row_returning(query) {
            run_select(&pool, query).await
        } else {
            let result = sqlx::query(query)
                .execute(&pool)
                .await
                .map_err(|e| LocandaError::Tool(format!("exec failed: {e}")))?;
            Ok(format!("OK, {} rows affected", result.rows_affected()))
        }
    }
}

/// SELECT and WITH statements return rows; everything else goes through
/// the exec path.
fn is_row_returning(query: &str) -> bool {
    let upper = query.to_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH")
}

/// Runs a row-returning statement by wrapping it in a `json_agg` subquery,
/// so arbitrary result shapes render without per-type decoding.
async fn run_select(pool: &PgPool, query: &str) -> Result<String, LocandaError> {
    let wrapped = format!(
        "SELECT COALESCE(json_agg(row_to_json(locanda_q)), '[]'::json) FROM ({query}) AS locanda_q"
    );
    let rows: serde_json::Value = sqlx::query_scalar(&wrapped)
        .fetch_one(pool)
        .await
        .map_err(|e| LocandaError::Tool(format!("query failed: {e}")))?;
    Ok(render_rows(&rows))
}

/// Renders a JSON row array as a compact text table.
fn render_rows(rows: &serde_json::Value) -> String {
    let Some(rows) = rows.as_array() else {
        return "(no rows)".to_string();
    };
    let Some(first) = rows.first().and_then(|r| r.as_object()) else {
        return "(no rows)".to_string();
    };

    let headers: Vec<&String> = first.keys().collect();
    let mut out = headers
        .iter()
        .map(|h| h.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    out.push('\n');
    out.push_str(&"-".repeat(40));
    out.push('\n');

    for row in rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| cell(row.get(h.as_str()).unwrap_or(&serde_json::Value::Null)))
            .collect();
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    out
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_row_returning_statements() {
        assert!(is_row_returning("SELECT 1"));
        assert!(is_row_returning("select name from rooms"));
        assert!(is_row_returning("WITH due AS (SELECT 1) SELECT * FROM due"));
        assert!(!is_row_returning("INSERT INTO rooms (name) VALUES ('101')"));
        assert!(!is_row_returning("UPDATE rooms SET status = 'ready'"));
        assert!(!is_row_returning("DELETE FROM assignments"));
    }

    #[test]
    fn renders_empty_result() {
        assert_eq!(render_rows(&serde_json::json!([])), "(no rows)");
    }

    #[test]
    fn renders_rows_with_mixed_types() {
        let rows = serde_json::json!([
            {"id": 1, "name": "101", "occupied": false, "notes": null},
            {"id": 2, "name": "102", "occupied": true, "notes": "balcony"},
        ]);
        let out = render_rows(&rows);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "id | name | occupied | notes");
        assert!(lines[1].starts_with("----"));
        assert_eq!(lines[2], "1 | 101 | false | NULL");
        assert_eq!(lines[3], "2 | 102 | true | balcony");
    }

    #[test]
    fn args_require_query_field() {
        let parsed: Result<Args, _> = serde_json::from_value(serde_json::json!({}));
        assert!(parsed.is_err());
        let parsed: Args =
            serde_json::from_value(serde_json::json!({"query": "SELECT 1"})).unwrap();
        assert_eq!(parsed.query, "SELECT 1");
    }
}
