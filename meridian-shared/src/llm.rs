//! Minimal client over the LLM endpoint. The orchestrator drives the
//! planner and aggregator roles directly; department workers drive the tool
//! and creative roles. All four share this one HTTP surface, differing only
//! in which model name they pass to [`LlmClient::complete`].

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::{CoreError, Result};

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    text: String,
}

impl LlmClient {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self { http: reqwest::Client::new(), endpoint: endpoint.into(), api_key }
    }

    pub async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&CompletionRequest { model, prompt })
            .send()
            .await
            .map_err(|e| CoreError::ExternalApi { status: 0, detail: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::ExternalApi { status: status.as_u16(), detail });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Parse(e.to_string()))?;
        Ok(body.text)
    }
}
