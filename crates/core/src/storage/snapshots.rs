use crate::domain::normalize::normalize_warehouse;
use crate::domain::tariff::{TariffPayload, UpsertOutcome, WarehouseTariff};
use crate::error::StoreError;
use chrono::NaiveDate;
use rust_decimal::Decimal;

// 14 binds per row; stays well below the 65535 bind parameter limit.
const INSERT_CHUNK_SIZE: usize = 500;

/// Replaces the snapshot for `date` with `payload`, atomically.
///
/// The snapshot row is created or updated in place (its id is stable across
/// re-ingests), every child row is deleted, and the normalized children are
/// bulk-inserted. Any failure rolls the whole transaction back.
pub async fn upsert_daily_snapshot(
    pool: &sqlx::PgPool,
    date: NaiveDate,
    payload: &TariffPayload,
) -> Result<UpsertOutcome, StoreError> {
    let rows = payload
        .warehouse_list
        .iter()
        .map(normalize_warehouse)
        .collect::<Result<Vec<_>, _>>()?;

    let mut tx = pool.begin().await?;

    let (snapshot_id, inserted): (i32, bool) = sqlx::query_as(
        "INSERT INTO daily_tariffs (date, dt_next_box, dt_till_max) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (date) DO UPDATE \
           SET dt_next_box = EXCLUDED.dt_next_box, \
               dt_till_max = EXCLUDED.dt_till_max, \
               updated_at = now() \
         RETURNING id, (xmax = 0) AS inserted",
    )
    .persistent(false)
    .bind(date)
    .bind(payload.next_box_date.as_deref())
    .bind(payload.till_max_date.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    if !inserted {
        let removed = sqlx::query("DELETE FROM warehouse_tariffs WHERE daily_tariff_id = $1")
            .persistent(false)
            .bind(snapshot_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tracing::debug!(%date, snapshot_id, removed, "cleared previous warehouse tariffs");
    }

    for (batch_idx, chunk) in rows.chunks(INSERT_CHUNK_SIZE).enumerate() {
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO warehouse_tariffs (daily_tariff_id, warehouse_name, geo_name, \
             box_delivery_base, box_delivery_coef_expr, box_delivery_liter, \
             box_delivery_marketplace_base, box_delivery_marketplace_coef_expr, box_delivery_marketplace_liter, \
             box_storage_base, box_storage_coef_expr, box_storage_liter) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(snapshot_id)
                .push_bind(row.warehouse_name.clone())
                .push_bind(row.geo_name.clone())
                .push_bind(row.box_delivery_base)
                .push_bind(row.box_delivery_coef_expr.clone())
                .push_bind(row.box_delivery_liter)
                .push_bind(row.box_delivery_marketplace_base)
                .push_bind(row.box_delivery_marketplace_coef_expr.clone())
                .push_bind(row.box_delivery_marketplace_liter)
                .push_bind(row.box_storage_base)
                .push_bind(row.box_storage_coef_expr.clone())
                .push_bind(row.box_storage_liter);
        });

        qb.build().persistent(false).execute(&mut *tx).await?;

        tracing::debug!(
            %date,
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "warehouse_tariffs batch insert"
        );
    }

    tx.commit().await?;

    Ok(UpsertOutcome {
        snapshot_id,
        replaced: !inserted,
        warehouses: rows.len(),
    })
}

#[derive(Debug, sqlx::FromRow)]
struct WarehouseTariffRow {
    warehouse_name: String,
    geo_name: String,
    box_delivery_base: Option<Decimal>,
    box_delivery_coef_expr: Option<String>,
    box_delivery_liter: Option<Decimal>,
    box_delivery_marketplace_base: Option<Decimal>,
    box_delivery_marketplace_coef_expr: Option<String>,
    box_delivery_marketplace_liter: Option<Decimal>,
    box_storage_base: Option<Decimal>,
    box_storage_coef_expr: Option<String>,
    box_storage_liter: Option<Decimal>,
}

impl From<WarehouseTariffRow> for WarehouseTariff {
    fn from(row: WarehouseTariffRow) -> Self {
        WarehouseTariff {
            warehouse_name: row.warehouse_name,
            geo_name: row.geo_name,
            box_delivery_base: row.box_delivery_base,
            box_delivery_coef_expr: row.box_delivery_coef_expr,
            box_delivery_liter: row.box_delivery_liter,
            box_delivery_marketplace_base: row.box_delivery_marketplace_base,
            box_delivery_marketplace_coef_expr: row.box_delivery_marketplace_coef_expr,
            box_delivery_marketplace_liter: row.box_delivery_marketplace_liter,
            box_storage_base: row.box_storage_base,
            box_storage_coef_expr: row.box_storage_coef_expr,
            box_storage_liter: row.box_storage_liter,
        }
    }
}

/// Children of the most recent snapshot, cheapest delivery first.
///
/// Rows without a delivery base sort last; ties keep insertion order. A single
/// statement, so an in-flight upsert is never observed half-applied.
pub async fn latest_snapshot(pool: &sqlx::PgPool) -> Result<Vec<WarehouseTariff>, StoreError> {
    let rows = sqlx::query_as::<_, WarehouseTariffRow>(
        "SELECT w.warehouse_name, w.geo_name, \
                w.box_delivery_base, w.box_delivery_coef_expr, w.box_delivery_liter, \
                w.box_delivery_marketplace_base, w.box_delivery_marketplace_coef_expr, \
                w.box_delivery_marketplace_liter, \
                w.box_storage_base, w.box_storage_coef_expr, w.box_storage_liter \
         FROM warehouse_tariffs w \
         WHERE w.daily_tariff_id = ( \
             SELECT d.id FROM daily_tariffs d ORDER BY d.date DESC LIMIT 1 \
         ) \
         ORDER BY w.box_delivery_base ASC NULLS LAST, w.id ASC",
    )
    .persistent(false)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(WarehouseTariff::from).collect())
}

/// Date of the most recent snapshot, if any.
pub async fn latest_snapshot_date(pool: &sqlx::PgPool) -> Result<Option<NaiveDate>, StoreError> {
    let date = sqlx::query_scalar::<_, Option<NaiveDate>>("SELECT max(date) FROM daily_tariffs")
        .persistent(false)
        .fetch_one(pool)
        .await?;
    Ok(date)
}
