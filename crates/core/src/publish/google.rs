use crate::config::Settings;
use crate::publish::SheetsApi;
use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base_url: String,
    key: ServiceAccountKey,

    // One token per process; refreshed shortly before it expires.
    token_cache: tokio::sync::Mutex<Option<CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired_or_stale(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::minutes(2) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

impl GoogleSheetsClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let path = settings.require_google_application_credentials()?;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read service account key {path}"))?;
        let key = serde_json::from_str::<ServiceAccountKey>(&raw)
            .context("service account key is not valid JSON")?;
        Self::new(key, settings.google_sheets_base_url.clone())
    }

    pub fn new(key: ServiceAccountKey, base_url: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build google sheets http client")?;

        Ok(Self {
            http,
            base_url,
            key,
            token_cache: tokio::sync::Mutex::new(None),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut guard = self.token_cache.lock().await;
        if let Some(cached) = guard.as_ref() {
            if !cached.is_expired_or_stale(Utc::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let now = Utc::now();
        let assertion = sign_assertion(&self.key, now.timestamp())?;
        let res = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("google token request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read google token response")?;
        if !status.is_success() {
            anyhow::bail!("google token HTTP {status}: {text}");
        }

        let token = serde_json::from_str::<TokenResponse>(&text)
            .context("failed to parse google token response")?;
        let ttl = if token.expires_in > 0 {
            token.expires_in
        } else {
            ASSERTION_TTL_SECS
        };

        *guard = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: now + chrono::Duration::seconds(ttl),
        });
        tracing::debug!(client_email = %self.key.client_email, ttl, "issued google access token");

        Ok(token.access_token)
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str, suffix: &str) -> anyhow::Result<reqwest::Url> {
        values_url(&self.base_url, spreadsheet_id, range, suffix)
    }

    async fn send(&self, op: &str, req: reqwest::RequestBuilder) -> anyhow::Result<()> {
        let token = self.access_token().await?;
        let res = req
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("sheets {op} request failed"))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("sheets {op} HTTP {status}: {text}");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn clear_range(&self, spreadsheet_id: &str, range: &str) -> anyhow::Result<()> {
        let url = self.values_url(spreadsheet_id, range, ":clear")?;
        let req = self.http.post(url).json(&serde_json::json!({}));
        self.send("clear", req).await
    }

    async fn update_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> anyhow::Result<()> {
        let url = self.values_url(spreadsheet_id, range, "")?;
        let body = ValueRange {
            range,
            major_dimension: "ROWS",
            values,
        };
        let req = self
            .http
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&body);
        self.send("update", req).await
    }
}

fn values_url(
    base_url: &str,
    spreadsheet_id: &str,
    range: &str,
    suffix: &str,
) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .with_context(|| format!("invalid sheets base url {base_url}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("sheets base url cannot be a base: {base_url}"))?
        .pop_if_empty()
        .extend(["v4", "spreadsheets", spreadsheet_id, "values"])
        .push(&format!("{range}{suffix}"));
    Ok(url)
}

/// RS256-signed JWT assertion for the OAuth2 JWT bearer grant.
fn sign_assertion(key: &ServiceAccountKey, now: i64) -> anyhow::Result<String> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let claims = Claims {
        iss: &key.client_email,
        scope: SHEETS_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_TTL_SECS,
    };
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{header}.{claims}");

    let pkey = PKey::private_key_from_pem(key.private_key.as_bytes())
        .context("service account private_key is not a PEM key")?;
    let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
    signer.update(signing_input.as_bytes())?;
    let signature = signer.sign_to_vec()?;

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::rsa::Rsa;
    use openssl::sign::Verifier;

    fn test_key() -> (ServiceAccountKey, PKey<openssl::pkey::Private>) {
        let rsa = Rsa::generate(2048).unwrap();
        let pkey = PKey::from_rsa(rsa).unwrap();
        let pem = String::from_utf8(pkey.private_key_to_pem_pkcs8().unwrap()).unwrap();
        let key = ServiceAccountKey {
            client_email: "sync@project.iam.gserviceaccount.com".to_string(),
            private_key: pem,
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };
        (key, pkey)
    }

    #[test]
    fn assertion_is_verifiable_rs256_jwt() {
        let (key, pkey) = test_key();
        let jwt = sign_assertion(&key, 1_700_000_000).unwrap();

        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["iss"], key.client_email.as_str());
        assert_eq!(claims["scope"], SHEETS_SCOPE);
        assert_eq!(claims["aud"], DEFAULT_TOKEN_URI);
        assert_eq!(claims["exp"], 1_700_000_000 + ASSERTION_TTL_SECS);

        let signature = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey).unwrap();
        verifier
            .update(format!("{}.{}", parts[0], parts[1]).as_bytes())
            .unwrap();
        assert!(verifier.verify(&signature).unwrap());
    }

    #[test]
    fn key_file_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email":"a@b.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn values_url_addresses_sheet_range() {
        let url = values_url("https://sheets.googleapis.com", "abc_1-X", "stocks_coefs!A1:Z", ":clear")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc_1-X/values/stocks_coefs!A1:Z:clear"
        );

        let url = values_url("http://127.0.0.1:8080/", "abc", "stocks_coefs!A1", "").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/v4/spreadsheets/abc/values/stocks_coefs!A1"
        );
    }

    #[test]
    fn cached_token_refreshes_early() {
        let now = Utc::now();
        let fresh = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + chrono::Duration::minutes(30),
        };
        let stale = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + chrono::Duration::minutes(1),
        };
        assert!(!fresh.is_expired_or_stale(now));
        assert!(stale.is_expired_or_stale(now));
    }
}
