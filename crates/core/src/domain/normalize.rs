use crate::domain::tariff::{RawWarehouseTariff, TariffValue, WarehouseTariff};
use crate::error::StoreError;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Provider marker for "no value".
pub const SENTINEL: &str = "-";

/// Maps a raw provider value to its storable decimal text, or `None` for the sentinel.
///
/// Comma decimal separators become periods; numbers pass through unchanged.
pub fn normalize(raw: &TariffValue) -> Option<String> {
    match raw {
        TariffValue::Text(s) if s == SENTINEL => None,
        TariffValue::Text(s) => Some(s.replace(',', ".")),
        TariffValue::Number(n) => Some(n.to_string()),
    }
}

/// Inverse of [`normalize`] for publishing: null renders as the sentinel.
pub fn render(value: Option<Decimal>) -> String {
    match value {
        Some(d) => d.to_string(),
        None => SENTINEL.to_string(),
    }
}

fn to_decimal(field: &'static str, raw: Option<&TariffValue>) -> Result<Option<Decimal>, StoreError> {
    let Some(text) = raw.and_then(normalize) else {
        return Ok(None);
    };
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map(Some)
        .map_err(|_| StoreError::InvalidNumeric { field, value: text })
}

/// Normalizes the six numeric fields of one warehouse entry. Identity fields and
/// coefficient expressions are copied verbatim.
pub fn normalize_warehouse(raw: &RawWarehouseTariff) -> Result<WarehouseTariff, StoreError> {
    Ok(WarehouseTariff {
        warehouse_name: raw.warehouse_name.clone(),
        geo_name: raw.geo_name.clone(),
        box_delivery_base: to_decimal("boxDeliveryBase", raw.box_delivery_base.as_ref())?,
        box_delivery_coef_expr: raw.box_delivery_coef_expr.clone(),
        box_delivery_liter: to_decimal("boxDeliveryLiter", raw.box_delivery_liter.as_ref())?,
        box_delivery_marketplace_base: to_decimal(
            "boxDeliveryMarketplaceBase",
            raw.box_delivery_marketplace_base.as_ref(),
        )?,
        box_delivery_marketplace_coef_expr: raw.box_delivery_marketplace_coef_expr.clone(),
        box_delivery_marketplace_liter: to_decimal(
            "boxDeliveryMarketplaceLiter",
            raw.box_delivery_marketplace_liter.as_ref(),
        )?,
        box_storage_base: to_decimal("boxStorageBase", raw.box_storage_base.as_ref())?,
        box_storage_coef_expr: raw.box_storage_coef_expr.clone(),
        box_storage_liter: to_decimal("boxStorageLiter", raw.box_storage_liter.as_ref())?,
    })
}
