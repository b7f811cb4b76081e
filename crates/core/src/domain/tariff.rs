use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A numeric tariff field as the provider sends it: usually a locale-formatted
/// string such as `"1,5"` or the `"-"` sentinel, occasionally a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TariffValue {
    Number(serde_json::Number),
    Text(String),
}

impl From<&str> for TariffValue {
    fn from(s: &str) -> Self {
        TariffValue::Text(s.to_string())
    }
}

/// One warehouse entry of the provider payload, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWarehouseTariff {
    pub warehouse_name: String,
    pub geo_name: String,
    #[serde(default)]
    pub box_delivery_base: Option<TariffValue>,
    #[serde(default)]
    pub box_delivery_coef_expr: Option<String>,
    #[serde(default)]
    pub box_delivery_liter: Option<TariffValue>,
    #[serde(default)]
    pub box_delivery_marketplace_base: Option<TariffValue>,
    #[serde(default)]
    pub box_delivery_marketplace_coef_expr: Option<String>,
    #[serde(default)]
    pub box_delivery_marketplace_liter: Option<TariffValue>,
    #[serde(default)]
    pub box_storage_base: Option<TariffValue>,
    #[serde(default)]
    pub box_storage_coef_expr: Option<String>,
    #[serde(default)]
    pub box_storage_liter: Option<TariffValue>,
}

/// The day's tariff data, unwrapped from the provider envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TariffPayload {
    pub next_box_date: Option<String>,
    pub till_max_date: Option<String>,
    pub warehouse_list: Vec<RawWarehouseTariff>,
}

/// A stored warehouse tariff row, as read back from the latest snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseTariff {
    pub warehouse_name: String,
    pub geo_name: String,
    pub box_delivery_base: Option<Decimal>,
    pub box_delivery_coef_expr: Option<String>,
    pub box_delivery_liter: Option<Decimal>,
    pub box_delivery_marketplace_base: Option<Decimal>,
    pub box_delivery_marketplace_coef_expr: Option<String>,
    pub box_delivery_marketplace_liter: Option<Decimal>,
    pub box_storage_base: Option<Decimal>,
    pub box_storage_coef_expr: Option<String>,
    pub box_storage_liter: Option<Decimal>,
}

/// Result of a daily upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub snapshot_id: i32,
    pub replaced: bool,
    pub warehouses: usize,
}
