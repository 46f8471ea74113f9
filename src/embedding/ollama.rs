//! Ollama 프로바이더
//!
//! 로컬 Ollama HTTP API를 사용합니다.
//! - `/api/embed`: 배치 입력을 한 번의 요청으로 임베딩
//! - `/api/generate`: 스트리밍 없이 전체 응답 생성

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ModelProvider;
use crate::config::RagConfig;
use crate::error::ProviderError;

/// Ollama HTTP API 구현체
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    embedding_model: String,
    llm_model: String,
}

impl OllamaProvider {
    pub fn new(config: &RagConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            client,
            embedding_model: config.embedding_model_id.clone(),
            llm_model: config.llm_model_id.clone(),
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        request: &T,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await?;
            return Err(ProviderError::Api { status, message });
        }

        Ok(response)
    }

    async fn embed_inputs(&self, input: EmbedInput) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbedRequest {
            model: self.embedding_model.clone(),
            input,
        };

        let response = self.post("/api/embed", &request).await?;
        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(body.embeddings)
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_inputs(EmbedInput::Single(text.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No embeddings returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let embeddings = self.embed_inputs(EmbedInput::Batch(texts.to_vec())).await?;
        if embeddings.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            model: self.llm_model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self.post("/api/generate", &request).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(body.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// Ollama API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbedInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: EmbedInput,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

// ============================================================================
// Tests
// ============================================================================
