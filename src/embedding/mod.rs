//! 모델 프로바이더 모듈 - 임베딩 + LLM 완성
//!
//! 코어 로직이 외부 모델 런타임과 만나는 유일한 경계입니다.
//! 프로바이더를 교체해도 파이프라인 코드는 바뀌지 않습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let provider = create_provider(&config)?;
//! let vector = provider.embed("Hello, world!").await?;
//! let answer = provider.complete("Say hi").await?;
//! ```

mod gemini;
mod ollama;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RagConfig;
use crate::error::{ProviderError, RagError};

pub use gemini::{get_api_key, has_api_key, GeminiProvider};
pub use ollama::OllamaProvider;

// ============================================================================
// ModelProvider Trait
// ============================================================================

/// 모델 프로바이더 트레이트
///
/// 텍스트 → 벡터 변환과 프롬프트 → 텍스트 생성 두 가지 능력만 요구합니다.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// 프롬프트 완성
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 프로바이더 이름
    fn name(&self) -> &str {
        "custom"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 프로바이더 생성
pub fn create_provider(config: &RagConfig) -> Result<Arc<dyn ModelProvider>, RagError> {
    match config.provider.as_str() {
        "ollama" => {
            let provider = OllamaProvider::new(config).map_err(provider_setup_error)?;
            tracing::info!(
                "Using Ollama at {} (embed: {}, llm: {})",
                config.ollama_base_url,
                config.embedding_model_id,
                config.llm_model_id
            );
            Ok(Arc::new(provider))
        }
        "gemini" => {
            let provider = GeminiProvider::from_env(config).map_err(provider_setup_error)?;
            tracing::info!(
                "Using Gemini API (embed: {}, llm: {})",
                config.embedding_model_id,
                config.llm_model_id
            );
            Ok(Arc::new(provider))
        }
        other => Err(RagError::Config(format!(
            "unknown provider '{}' (expected 'ollama' or 'gemini')",
            other
        ))),
    }
}

fn provider_setup_error(e: ProviderError) -> RagError {
    RagError::Config(e.to_string())
}

// ============================================================================
// Tests
// ============================================================================
