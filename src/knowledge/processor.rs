//! Document Processor - 문서 → 벡터 인덱스
//!
//! 추출 → 청킹 → 배치 임베딩 → 인덱스 구성 순서로 처리합니다.
//!
//! 실패 정책:
//! - 추출 실패, 청크 없음, 첫 배치 실패 → 문서 전체 실패
//! - 이후 배치 실패 → 해당 배치만 건너뛰고 경고로 보고 (부분 성공)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::embedding::ModelProvider;
use crate::error::{ProviderError, RagError, Result};
use crate::extractor::{join_pages, TextExtractor};

use super::chunker::{ChunkConfig, Chunker, RecursiveChunker};
use super::vector::{EmbeddingRecord, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 건너뛴 배치 정보
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// 배치 번호 (0-based)
    pub batch: usize,
    /// 이 배치에서 유실된 청크 수
    pub chunk_count: usize,
    pub message: String,
}

/// 처리 결과
#[derive(Debug, Clone)]
pub struct ProcessedIndex {
    pub index: VectorIndex,
    pub total_chunks: usize,
    pub failed_batches: Vec<BatchFailure>,
}

impl ProcessedIndex {
    /// 일부 배치가 실패했는지 여부
    pub fn is_partial(&self) -> bool {
        !self.failed_batches.is_empty()
    }
}

// ============================================================================
// DocumentProcessor
// ============================================================================

pub struct DocumentProcessor {
    chunker: Box<dyn Chunker>,
    provider: Arc<dyn ModelProvider>,
    extractor: Arc<dyn TextExtractor>,
    batch_size: usize,
    batch_delay: Duration,
}

impl DocumentProcessor {
    pub fn new(
        config: &RagConfig,
        provider: Arc<dyn ModelProvider>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            chunker: Box::new(RecursiveChunker::new(ChunkConfig::from_rag(config))),
            provider,
            extractor,
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        }
    }

    /// 문서 바이트로 벡터 인덱스 생성
    pub async fn process(&self, path: &Path, bytes: &[u8]) -> Result<ProcessedIndex> {
        // 1. 텍스트 추출
        let pages = self.extractor.extract_pages(path, bytes).await?;
        let text = join_pages(&pages);

        // 2. 청킹
        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument(path.to_path_buf()));
        }

        // 3. 배치 분할
        let batches: Vec<&[String]> = chunks.chunks(self.batch_size).collect();
        let batch_count = batches.len();
        tracing::info!(
            "Processing {:?}: {} pages, {} chunks, {} batches",
            path,
            pages.len(),
            chunks.len(),
            batch_count
        );

        // 4. 첫 배치로 인덱스 생성 (실패하면 문서 전체 실패)
        let first = self
            .embed_batch(batches[0])
            .await
            .map_err(|source| RagError::FirstBatchFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let mut index = VectorIndex::new(first)?;

        // 5. 나머지 배치 (실패는 건너뛰고 계속)
        let mut failed_batches = Vec::new();

        for (i, batch) in batches.iter().enumerate().skip(1) {
            if !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let outcome = match self.embed_batch(batch).await {
                Ok(records) => index.add(records).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(added) => {
                    tracing::debug!(
                        "Processed batch {}/{} for {:?} ({} chunks)",
                        i,
                        batch_count - 1,
                        path,
                        added
                    );
                }
                Err(message) => {
                    tracing::warn!(
                        "Error processing batch {} for {:?}, skipping {} chunks: {}",
                        i,
                        path,
                        batch.len(),
                        message
                    );
                    failed_batches.push(BatchFailure {
                        batch: i,
                        chunk_count: batch.len(),
                        message,
                    });
                }
            }
        }

        // 6. 성공한 청크만 담긴 인덱스 반환
        if !failed_batches.is_empty() {
            tracing::warn!(
                "Partially indexed {:?}: {}/{} chunks embedded",
                path,
                index.len(),
                chunks.len()
            );
        }

        Ok(ProcessedIndex {
            index,
            total_chunks: chunks.len(),
            failed_batches,
        })
    }

    async fn embed_batch(
        &self,
        batch: &[String],
    ) -> std::result::Result<Vec<EmbeddingRecord>, ProviderError> {
        let vectors = self.provider.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            )));
        }

        Ok(batch
            .iter()
            .zip(vectors)
            .map(|(text, vector)| EmbeddingRecord {
                text: text.clone(),
                vector,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
