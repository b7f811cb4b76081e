use crate::domain::tariff::{RawWarehouseTariff, TariffPayload};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffsApiResponse {
    pub response: TariffsResponseData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffsResponseData {
    pub data: TariffsData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffsData {
    #[serde(default)]
    pub dt_next_box: Option<String>,
    #[serde(default)]
    pub dt_till_max: Option<String>,
    #[serde(default)]
    pub warehouse_list: Vec<RawWarehouseTariff>,
}

impl From<TariffsApiResponse> for TariffPayload {
    fn from(resp: TariffsApiResponse) -> Self {
        let data = resp.response.data;
        TariffPayload {
            next_box_date: data.dt_next_box,
            till_max_date: data.dt_till_max,
            warehouse_list: data.warehouse_list,
        }
    }
}
