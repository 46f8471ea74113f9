//! 콘텐츠 추출 모듈
//!
//! 문서 바이트에서 페이지별 텍스트를 추출합니다.
//! - PDF 파일: pdf-extract로 텍스트 추출 (blocking 스레드)
//! - 텍스트 파일: UTF-8로 직접 디코딩

pub mod pdf;

use std::path::Path;

use async_trait::async_trait;

use crate::collector::FileType;
use crate::error::ExtractError;

// ============================================================================
// TextExtractor Trait
// ============================================================================

/// 텍스트 추출 트레이트
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// 페이지 순서대로 텍스트 반환 (페이지 구분이 없는 형식은 1페이지)
    async fn extract_pages(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// 페이지를 하나의 텍스트로 연결
pub fn join_pages(pages: &[String]) -> String {
    pages.join("\n")
}

// ============================================================================
// FileExtractor
// ============================================================================

/// 확장자 기반 기본 추출기
#[derive(Debug, Default, Clone)]
pub struct FileExtractor;

impl FileExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract_pages(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        match FileType::from_path(path) {
            Some(FileType::Text) => Ok(vec![String::from_utf8_lossy(bytes).into_owned()]),
            Some(FileType::Pdf) => {
                // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
                // 파서 내부 panic도 JoinError로 잡혀 추출 에러가 됩니다
                let owned_path = path.to_path_buf();
                let owned_bytes = bytes.to_vec();
                tokio::task::spawn_blocking(move || {
                    pdf::extract_text_from_pdf(&owned_path, &owned_bytes)
                })
                .await
                .map_err(|e| ExtractError::Pdf {
                    path: path.to_path_buf(),
                    message: format!("extraction task failed: {}", e),
                })?
            }
            None => Err(ExtractError::Unsupported(path.to_path_buf())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
