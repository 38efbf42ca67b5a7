use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{OracleApiError, OracleClient};
use crate::config::OracleConfig;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Chat-completions provider client. Construction fails only on missing
/// credentials; everything else is a per-call error.
pub struct HttpOracleClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpOracleClient {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleApiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(OracleApiError::MissingCredentials)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OracleApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
        })
    }

    fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl OracleClient for HttpOracleClient {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, OracleApiError> {
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleApiError::Transport(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = Self::parse_retry_after(&response);
            return Err(OracleApiError::RateLimited { retry_after });
        }

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(OracleApiError::Transport(format!(
                "status {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleApiError::Malformed(e.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| OracleApiError::Malformed("response contained no choices".to_string()))
    }
}
