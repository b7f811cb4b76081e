pub mod domain;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod publish;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    const DEFAULT_SHEET_NAME: &str = "stocks_coefs";
    const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub tariff_api_url: Option<String>,
        pub tariff_api_token: Option<String>,
        pub tariff_api_timeout_secs: Option<u64>,
        pub google_application_credentials: Option<String>,
        pub google_sheets_base_url: String,
        pub sheet_name: String,
        pub seed_spreadsheet_ids: Vec<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                tariff_api_url: std::env::var("TARIFF_API_URL").ok(),
                tariff_api_token: std::env::var("TARIFF_API_TOKEN").ok(),
                tariff_api_timeout_secs: std::env::var("TARIFF_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok()),
                google_application_credentials: std::env::var("GOOGLE_APPLICATION_CREDENTIALS")
                    .ok(),
                google_sheets_base_url: std::env::var("GOOGLE_SHEETS_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SHEETS_BASE_URL.to_string()),
                sheet_name: std::env::var("SHEET_NAME")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
                seed_spreadsheet_ids: parse_id_list(
                    std::env::var("SEED_SPREADSHEET_IDS").ok().as_deref(),
                ),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_tariff_api_url(&self) -> anyhow::Result<&str> {
            self.tariff_api_url
                .as_deref()
                .context("TARIFF_API_URL is required")
        }

        pub fn require_tariff_api_token(&self) -> anyhow::Result<&str> {
            self.tariff_api_token
                .as_deref()
                .context("TARIFF_API_TOKEN is required")
        }

        pub fn require_google_application_credentials(&self) -> anyhow::Result<&str> {
            self.google_application_credentials
                .as_deref()
                .context("GOOGLE_APPLICATION_CREDENTIALS is required")
        }
    }

    fn parse_id_list(raw: Option<&str>) -> Vec<String> {
        raw.unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn id_list_skips_blanks_and_trims() {
            let ids = parse_id_list(Some(" abc , ,def_1,"));
            assert_eq!(ids, vec!["abc".to_string(), "def_1".to_string()]);
            assert!(parse_id_list(None).is_empty());
        }
    }
}
