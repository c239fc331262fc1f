//! Gemini-backed plan model

use crate::config::LlmConfig;
use crate::drafter::prompt::{DraftRequest, SYSTEM_INSTRUCTIONS};
use crate::drafter::{DraftError, PlanModel};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct GeminiModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DraftError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DraftError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Build from settings; `None` when no API key is configured
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, DraftError> {
        match &config.api_key {
            Some(key) => Self::new(&config.base_url, &config.model, key, config.timeout).map(Some),
            None => Ok(None),
        }
    }

    fn payload(request: &DraftRequest) -> Result<Value, DraftError> {
        let prompt = serde_json::to_string(request).map_err(|e| DraftError::Parse(e.to_string()))?;

        Ok(json!({
            "systemInstruction": {"parts": [{"text": SYSTEM_INSTRUCTIONS}]},
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0,
                "responseMimeType": "application/json"
            }
        }))
    }
}

#[async_trait]
impl PlanModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &DraftRequest) -> Result<String, DraftError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!("Requesting plan draft from {}", self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::payload(request)?)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DraftError::Timeout
                } else {
                    DraftError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DraftError::Model(format!("Gemini API error ({}): {}", status, body)));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| DraftError::Parse(e.to_string()))?;

        extract_text(&data)
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(data: &Value) -> Result<String, DraftError> {
    let parts = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| DraftError::Parse("No candidate content in response".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(DraftError::Parse("Empty candidate text".to_string()));
    }
    Ok(text)
}
