//! 문서 수집 모듈
//!
//! 지식베이스 디렉토리의 최상위 문서를 확장자로 찾습니다.
//! 열거 순서는 경로 기준으로 정렬되어 항상 동일합니다.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{RagError, Result};

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 문서 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// PDF 파일
    Pdf,
    /// 텍스트 파일 (txt, md)
    Text,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "txt" | "md" | "markdown" => Some(FileType::Text),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 문서 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

// ============================================================================
// Document Collector
// ============================================================================

/// 지식베이스 문서 수집기
pub struct DocumentCollector {
    /// 수집 대상 확장자 (소문자)
    extensions: Vec<String>,
}

impl DocumentCollector {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// 디렉토리 최상위의 문서 수집
    ///
    /// 디렉토리가 없으면 `KnowledgeBaseMissing` (치명적) 에러입니다.
    /// 비어있는 경우는 빈 목록을 반환합니다.
    pub fn collect(&self, dir: &Path) -> Result<Vec<CollectedFile>> {
        if !dir.is_dir() {
            return Err(RagError::KnowledgeBaseMissing(dir.to_path_buf()));
        }

        let walker = WalkBuilder::new(dir)
            .max_depth(Some(1))
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .build();

        let mut files = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            if !self.matches_extension(path) {
                continue;
            }

            let Some(file_type) = FileType::from_path(path) else {
                tracing::debug!("Skipping unsupported document type: {:?}", path);
                continue;
            };

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    tracing::warn!("Failed to read metadata for {:?}: {}", path, e);
                    continue;
                }
            };

            files.push(CollectedFile {
                path: path.to_path_buf(),
                file_type,
                size,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("Collected {} documents from {:?}", files.len(), dir);
        Ok(files)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub pdf_files: usize,
    pub text_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            match file.file_type {
                FileType::Pdf => stats.pdf_files += 1,
                FileType::Text => stats.text_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================
