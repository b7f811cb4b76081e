use crate::config::Settings;
use crate::domain::tariff::TariffPayload;
use crate::error::ProviderError;
use crate::ingest::types::TariffsApiResponse;
use anyhow::Context;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[async_trait::async_trait]
pub trait TariffProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_tariffs(&self, date: NaiveDate) -> Result<TariffPayload, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpTariffProvider {
    http: reqwest::Client,
    url: String,
}

impl HttpTariffProvider {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings.require_tariff_api_url()?.to_string();
        let token = settings.require_tariff_api_token()?;
        let timeout_secs = settings
            .tariff_api_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(url, token, Duration::from_secs(timeout_secs))
    }

    pub fn new(url: String, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("TARIFF_API_TOKEN is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("failed to build tariff provider http client")?;

        Ok(Self { http, url })
    }
}

#[async_trait::async_trait]
impl TariffProvider for HttpTariffProvider {
    fn provider_name(&self) -> &'static str {
        "tariff_http_json"
    }

    async fn fetch_tariffs(&self, date: NaiveDate) -> Result<TariffPayload, ProviderError> {
        let date_param = date.format("%Y-%m-%d").to_string();
        tracing::info!(%date, url = %self.url, "fetching tariffs");

        let res = self
            .http
            .get(&self.url)
            .query(&[("date", date_param.as_str())])
            .send()
            .await
            .map_err(|err| {
                tracing::error!(%date, error = %err, timeout = err.is_timeout(), "tariff request failed");
                ProviderError::transport(err)
            })?;

        let status = res.status();
        let text = res.text().await.map_err(ProviderError::transport)?;

        if !status.is_success() {
            let err = ProviderError::http(status.as_u16(), &text);
            tracing::error!(%date, http_status = %status, body = %text, "tariff provider returned an error");
            return Err(err);
        }

        parse_tariffs_response(&text)
    }
}

pub fn parse_tariffs_response(text: &str) -> Result<TariffPayload, ProviderError> {
    let parsed = serde_json::from_str::<TariffsApiResponse>(text).map_err(ProviderError::decode)?;
    Ok(parsed.into())
}
