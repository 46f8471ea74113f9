//! Google Gemini 프로바이더
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! `embedContent`로 임베딩, `generateContent`로 답변을 생성합니다.
//! 무료 티어 제한(60 RPM)에 맞춰 클라이언트 측 rate limiter와 429 백오프를 적용합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::ModelProvider;
use crate::config::RagConfig;
use crate::error::ProviderError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 임베딩 용도 (질문과 문서는 서로 다른 taskType으로 요청)
const TASK_RETRIEVAL_QUERY: &str = "RETRIEVAL_QUERY";
const TASK_RETRIEVAL_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// GeminiProvider
// ============================================================================

/// Google Gemini 구현체
#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    client: reqwest::Client,
    embedding_model: String,
    llm_model: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        // 2. 윈도우 밖의 오래된 요청 제거
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiProvider {
    /// API 키와 설정으로 생성
    pub fn new(api_key: String, config: &RagConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            client,
            embedding_model: config.embedding_model_id.clone(),
            llm_model: config.llm_model_id.clone(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
            ))),
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env(config: &RagConfig) -> Result<Self, ProviderError> {
        let api_key = get_api_key()?;
        Self::new(api_key, config)
    }

    fn endpoint(model: &str, method: &str) -> String {
        format!("{}/{}:{}", GEMINI_API_BASE, model, method)
    }

    fn embed_request(&self, text: &str, task_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.to_string(),
        }
    }

    async fn embed_with_task(&self, text: &str, task_type: &str) -> Result<Vec<f32>, ProviderError> {
        let request = self.embed_request(text, task_type);

        let url = Self::endpoint(&self.embedding_model, "embedContent");
        let body = self.post_with_retry(&url, &request).await?;

        let response: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(response.embedding.values)
    }

    /// 재시도 루프 (429 및 전송 실패 시 지수 백오프)
    async fn post_with_retry<T: Serialize + Sync>(
        &self,
        url: &str,
        request: &T,
    ) -> Result<String, ProviderError> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(ProviderError::Http(e));
                    if attempt < MAX_RETRIES {
                        let backoff = backoff_for(attempt);
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response.text().await?;

            if status.is_success() {
                return Ok(body);
            }

            if status.as_u16() == 429 {
                last_error = Some(ProviderError::RateLimited(attempt));
                if attempt < MAX_RETRIES {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                        backoff,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                return Err(ProviderError::RateLimited(MAX_RETRIES));
            }

            // 다른 에러 - 즉시 실패
            let message = match serde_json::from_str::<GeminiError>(&body) {
                Ok(error) => format!("{} {}", error.error.status, error.error.message),
                Err(_) => body,
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Err(last_error.unwrap_or(ProviderError::RateLimited(MAX_RETRIES)))
    }
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    /// 질문 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_with_task(text, TASK_RETRIEVAL_QUERY).await
    }

    /// 문서 청크 임베딩
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_with_task(text, TASK_RETRIEVAL_DOCUMENT).await?);
        }
        Ok(results)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 2048,
            },
        };

        let url = Self::endpoint(&self.llm_model, "generateContent");
        let body = self.post_with_retry(&url, &request).await?;

        let response: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ProviderError::InvalidResponse("no candidates returned".into()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
    #[serde(rename = "taskType")]
    task_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String, ProviderError> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(ProviderError::Config(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
            .to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Tests
// ============================================================================
