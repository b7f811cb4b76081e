use crate::error::StoreError;

/// Trims `raw` and checks it looks like a spreadsheet id (`[A-Za-z0-9_-]+`).
pub fn validate_spreadsheet_id(raw: &str) -> Result<&str, StoreError> {
    let id = raw.trim();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(StoreError::InvalidTarget(raw.to_string()));
    }
    Ok(id)
}

pub async fn list_publish_targets(pool: &sqlx::PgPool) -> Result<Vec<String>, StoreError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT spreadsheet_id FROM spreadsheets ORDER BY spreadsheet_id ASC",
    )
    .persistent(false)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn add_publish_target(pool: &sqlx::PgPool, spreadsheet_id: &str) -> Result<bool, StoreError> {
    let id = validate_spreadsheet_id(spreadsheet_id)?;
    let res = sqlx::query(
        "INSERT INTO spreadsheets (spreadsheet_id) VALUES ($1) \
         ON CONFLICT (spreadsheet_id) DO NOTHING",
    )
    .persistent(false)
    .bind(id)
    .execute(pool)
    .await?;

    let added = res.rows_affected() > 0;
    tracing::info!(spreadsheet_id = %id, added, "add publish target");
    Ok(added)
}

/// Deletes by the trimmed id without validating it, so rows that predate
/// validation can still be removed. An unknown id is reported as `false`.
pub async fn remove_publish_target(
    pool: &sqlx::PgPool,
    spreadsheet_id: &str,
) -> Result<bool, StoreError> {
    let id = spreadsheet_id.trim();
    let res = sqlx::query("DELETE FROM spreadsheets WHERE spreadsheet_id = $1")
        .persistent(false)
        .bind(id)
        .execute(pool)
        .await?;

    let removed = res.rows_affected() > 0;
    if !removed {
        tracing::info!(spreadsheet_id = %id, "publish target was not registered; nothing removed");
    }
    Ok(removed)
}

/// Registers each id idempotently; invalid ids are logged and skipped.
pub async fn seed_publish_targets(pool: &sqlx::PgPool, ids: &[String]) -> Result<usize, StoreError> {
    let mut added = 0;
    for id in ids {
        match add_publish_target(pool, id).await {
            Ok(true) => added += 1,
            Ok(false) => {}
            Err(StoreError::InvalidTarget(bad)) => {
                tracing::warn!(spreadsheet_id = %bad, "skipping invalid seed spreadsheet id");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(added)
}
