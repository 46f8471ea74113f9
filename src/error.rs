//! 에러 타입 모듈
//!
//! 라이브러리 전역에서 사용하는 에러 분류입니다.
//! 문서/배치 단위 에러는 호출자가 격리하고, 설정/코퍼스 단위 에러는 치명적으로 전파합니다.

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Provider Errors
// ============================================================================

/// 모델 프로바이더 (임베딩/LLM) 호출 에러
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 전송 실패 (연결 거부, 타임아웃 등)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API가 실패 상태 코드를 반환
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// 재시도 후에도 429 응답
    #[error("Rate limit exceeded after {0} retries")]
    RateLimited(u32),

    /// 응답 본문 파싱 실패 또는 필드 누락
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// API 키 누락 등 프로바이더 설정 문제
    #[error("Provider configuration error: {0}")]
    Config(String),
}

// ============================================================================
// Extraction Errors
// ============================================================================

/// 문서 텍스트 추출 에러
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed for {path:?}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("Unsupported document type: {0:?}")]
    Unsupported(PathBuf),
}

// ============================================================================
// Index Errors
// ============================================================================

/// 벡터 인덱스 구성 에러
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// 인덱스는 최소 1개의 레코드로 생성해야 함
    #[error("Cannot create an index without records")]
    Empty,

    #[error("Vector dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

// ============================================================================
// RAG Errors
// ============================================================================

/// 파이프라인 작업 단위 에러
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// 필수 디렉토리 생성 실패 (시작 시점)
    #[error("Failed to prepare directory {path:?}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Knowledge base directory not found: {0:?}")]
    KnowledgeBaseMissing(PathBuf),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// 추출된 텍스트에서 청크가 하나도 나오지 않음
    #[error("No text chunks produced for {0:?}")]
    EmptyDocument(PathBuf),

    /// 첫 배치가 실패하면 인덱스를 만들 수 없음
    #[error("First embedding batch failed for {path:?}: {source}")]
    FirstBatchFailed {
        path: PathBuf,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    /// 캐시 엔트리 역직렬화 실패 (자동 재빌드하지 않음)
    #[error("Corrupt cache entry {key}: {message}")]
    CacheCorrupt { key: String, message: String },

    #[error("Incompatible cache entry {key}: format version {found}, expected {expected}")]
    CacheIncompatible {
        key: String,
        found: u32,
        expected: u32,
    },

    #[error("Failed to embed query: {0}")]
    QueryEmbedding(#[source] ProviderError),

    #[error("Language model completion failed: {0}")]
    Completion(#[source] ProviderError),
}

impl RagError {
    /// 전체 작업을 중단해야 하는 에러인지 여부
    ///
    /// 문서 단위 에러(추출, 첫 배치, 캐시 손상 등)는 오케스트레이터가 해당 문서만 건너뜁니다.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::Config(_)
                | RagError::Setup { .. }
                | RagError::KnowledgeBaseMissing(_)
                | RagError::QueryEmbedding(_)
                | RagError::Completion(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RagError::Config("bad".into()).is_fatal());
        assert!(RagError::KnowledgeBaseMissing(PathBuf::from("kb")).is_fatal());
        assert!(!RagError::EmptyDocument(PathBuf::from("a.pdf")).is_fatal());
        assert!(!RagError::CacheCorrupt {
            key: "k".into(),
            message: "eof".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = RagError::from(IndexError::DimensionMismatch {
            expected: 3,
            found: 2,
        });
        assert_eq!(
            err.to_string(),
            "Vector dimension mismatch: expected 3, found 2"
        );
    }
}
