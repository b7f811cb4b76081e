use crate::domain::normalize::render;
use crate::domain::tariff::WarehouseTariff;
use crate::error::PublishError;
use crate::storage::targets::validate_spreadsheet_id;

pub mod google;

pub const HEADERS: [&str; 11] = [
    "warehouseName",
    "geoName",
    "boxDeliveryBase",
    "boxDeliveryCoefExpr",
    "boxDeliveryLiter",
    "boxDeliveryMarketplaceBase",
    "boxDeliveryMarketplaceCoefExpr",
    "boxDeliveryMarketplaceLiter",
    "boxStorageBase",
    "boxStorageCoefExpr",
    "boxStorageLiter",
];

/// The narrow slice of a spreadsheet API the fan-out needs.
#[async_trait::async_trait]
pub trait SheetsApi: Send + Sync {
    async fn clear_range(&self, spreadsheet_id: &str, range: &str) -> anyhow::Result<()>;

    async fn update_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<PublishError>,
}

/// Header row followed by one row per tariff. Null numerics render as `"-"`.
pub fn render_rows(data: &[WarehouseTariff]) -> Vec<Vec<String>> {
    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(HEADERS.iter().map(|h| h.to_string()).collect());
    for t in data {
        out.push(vec![
            t.warehouse_name.clone(),
            t.geo_name.clone(),
            render(t.box_delivery_base),
            text(&t.box_delivery_coef_expr),
            render(t.box_delivery_liter),
            render(t.box_delivery_marketplace_base),
            text(&t.box_delivery_marketplace_coef_expr),
            render(t.box_delivery_marketplace_liter),
            render(t.box_storage_base),
            text(&t.box_storage_coef_expr),
            render(t.box_storage_liter),
        ]);
    }
    out
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| crate::domain::normalize::SENTINEL.to_string())
}

/// Writes `data` into the `sheet_name` tab of every target.
///
/// Each target is attempted exactly once, in order. A failing target is
/// recorded in the report and does not stop the others.
pub async fn publish_all(
    sheets: &dyn SheetsApi,
    sheet_name: &str,
    targets: &[String],
    data: &[WarehouseTariff],
) -> PublishReport {
    let rows = (!data.is_empty()).then(|| render_rows(data));
    let mut report = PublishReport::default();

    for target in targets {
        match publish_one(sheets, sheet_name, target, rows.as_ref()).await {
            Ok(()) => {
                tracing::info!(spreadsheet_id = %target, rows = data.len(), "spreadsheet updated");
                report.succeeded.push(target.clone());
            }
            Err(err) => {
                tracing::error!(spreadsheet_id = %target, error = %format!("{err:#}"), "spreadsheet update failed");
                report.failed.push(PublishError {
                    target: target.clone(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    report
}

async fn publish_one(
    sheets: &dyn SheetsApi,
    sheet_name: &str,
    target: &str,
    rows: Option<&Vec<Vec<String>>>,
) -> anyhow::Result<()> {
    let id = validate_spreadsheet_id(target)?;

    sheets.clear_range(id, &format!("{sheet_name}!A1:Z")).await?;

    let Some(rows) = rows else {
        tracing::info!(spreadsheet_id = %id, "no tariffs to write; sheet cleared");
        return Ok(());
    };

    sheets
        .update_range(id, &format!("{sheet_name}!A1"), rows.clone())
        .await
}
