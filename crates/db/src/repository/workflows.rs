//! `workflows` table queries.

use crate::models::WorkflowRow;
use crate::{DbError, DbPool};

/// Fetch a workflow definition row, if present.
pub async fn find_workflow(pool: &DbPool, id: &str) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        "SELECT id, label, definition, created_at FROM workflows WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert or replace a workflow definition.
pub async fn upsert_workflow(
    pool: &DbPool,
    id: &str,
    label: &str,
    definition: &serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflows (id, label, definition, created_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (id) DO UPDATE SET label = EXCLUDED.label, definition = EXCLUDED.definition
        "#,
    )
    .bind(id)
    .bind(label)
    .bind(definition)
    .execute(pool)
    .await?;

    Ok(())
}
