use crate::config::PanelConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

const START_ROUTE: &str = "start-collection";
const STOP_ROUTE: &str = "stop-collection";
const DATA_ROUTE: &str = "get-data";
const ANALYZE_ROUTE: &str = "analyze-encryption";

/// Body of a start request. A `None` interval is sent as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub target_url: String,
    pub interval: Option<i64>,
}

impl CollectionRequest {
    pub fn new(target_url: impl Into<String>, interval: Option<i64>) -> Self {
        Self {
            target_url: target_url.into(),
            interval,
        }
    }
}

/// Reply to a start request. Both fields are whatever the server sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl StartResponse {
    pub fn new(status: impl Into<Value>, message: impl Into<Value>) -> Self {
        Self {
            status: Some(status.into()),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.as_ref().and_then(Value::as_str) == Some("success")
    }

    /// The server message as text; a missing or null one reads `undefined`.
    pub fn message_text(&self) -> String {
        match &self.message {
            None | Some(Value::Null) => "undefined".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepAnalysis {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub recommended_steps: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The remote job-control surface the controller drives.
#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn start(&self, request: &CollectionRequest) -> Result<StartResponse>;

    /// Completes once the server answered; the body is not read.
    async fn stop(&self) -> Result<()>;

    /// Raw poll body, possibly an empty object.
    async fn fetch_data(&self) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct HttpControlClient {
    base_url: Url,
    client: Client,
}

impl HttpControlClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &PanelConfig) -> Result<Self> {
        Self::new(
            &config.server_url,
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn route(&self, route: &str) -> Result<Url> {
        Ok(self.base_url.join(route)?)
    }

    /// Asks the service for a deep encryption analysis of `target_url`.
    pub async fn analyze_encryption(&self, target_url: &str) -> Result<DeepAnalysis> {
        let url = self.route(ANALYZE_ROUTE)?;
        log::info!("Requesting encryption analysis for {}", target_url);

        let res = self
            .client
            .post(url)
            .json(&serde_json::json!({ "target_url": target_url }))
            .send()
            .await?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl ControlApi for HttpControlClient {
    async fn start(&self, request: &CollectionRequest) -> Result<StartResponse> {
        let url = self.route(START_ROUTE)?;
        log::debug!("POST {} {:?}", url, request);

        // The status field decides success, not the HTTP status code.
        let res = self.client.post(url).json(request).send().await?;
        let body: Value = serde_json::from_str(&res.text().await?)?;
        if !body.is_object() {
            return Err(Error::Response(format!(
                "start-collection answered with {}",
                body
            )));
        }
        Ok(serde_json::from_value(body)?)
    }

    async fn stop(&self) -> Result<()> {
        let url = self.route(STOP_ROUTE)?;
        log::debug!("POST {}", url);

        let res = self.client.post(url).send().await?;
        log::debug!("Stop answered with {}", res.status());
        Ok(())
    }

    async fn fetch_data(&self) -> Result<Value> {
        let url = self.route(DATA_ROUTE)?;

        let res = self.client.get(url).send().await?;
        let body = res.text().await?;
        log::trace!("Poll body: {} bytes", body.len());
        serde_json::from_str(&body).map_err(Error::from)
    }
}

/// Reads a leading integer the way an HTML form field is coerced: optional
/// leading whitespace and sign, then digits up to the first non-digit.
/// Returns `None` when no digits lead the text.
pub fn parse_interval(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits: &str = match rest.find(|c: char| !c.is_ascii_digit()) {
        Some(end) => &rest[..end],
        None => rest,
    };
    if digits.is_empty() {
        return None;
    }

    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}
