//! Retrieval Orchestrator - 질문 → 답변
//!
//! 1. 지식베이스 디렉토리 열거
//! 2. 문서별 인덱스 확보 (캐시 로드 또는 빌드, 실패한 문서는 건너뜀)
//! 3. 쿼리 임베딩 1회 → 문서별 top-k 검색
//! 4. 문맥 + 질문으로 프롬프트 구성 → 생성 모델 호출
//!
//! 문서가 없거나 쓸 만한 문맥이 없으면 모델을 호출하지 않고 고정 안내 문구를 돌려줍니다.

mod prompt;
mod session;

pub use prompt::{build_answer_prompt, build_condense_prompt};
pub use session::{ChatSession, ChatTurn};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::collector::{CollectedFile, DocumentCollector};
use crate::config::RagConfig;
use crate::embedding::ModelProvider;
use crate::error::{RagError, Result};
use crate::extractor::{FileExtractor, TextExtractor};
use crate::knowledge::{
    BlobStore, DocumentProcessor, EmbeddingCache, FsBlobStore, IndexSource, ResolvedIndex,
    VectorIndex,
};

/// 지식베이스에 문서가 하나도 없을 때
pub const NO_DOCUMENTS_MESSAGE: &str = "No documents found in knowledge base directory!";

/// 모든 문서 처리가 실패했거나 검색된 문맥이 없을 때
pub const NO_RELEVANT_DOCUMENTS_MESSAGE: &str =
    "No relevant documents found or all processing failed!";

// ============================================================================
// Types
// ============================================================================

/// 프롬프트에 들어간 검색 문맥
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub source: PathBuf,
    pub text: String,
    pub similarity: f32,
}

/// 건너뛴 문서
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFailure {
    pub path: PathBuf,
    pub message: String,
}

/// 생성된 답변
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// 문서 열거 순서, 문서 내에서는 유사도 순서
    pub passages: Vec<RetrievedPassage>,
    /// 모델에 보낸 프롬프트 그대로
    pub prompt: String,
    pub failures: Vec<DocumentFailure>,
}

/// 질의 결과
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answer(Answer),
    NoDocuments,
    NoRelevantDocuments { failures: Vec<DocumentFailure> },
}

impl QueryOutcome {
    /// 사용자에게 보여줄 문자열
    pub fn text(&self) -> &str {
        match self {
            QueryOutcome::Answer(answer) => &answer.text,
            QueryOutcome::NoDocuments => NO_DOCUMENTS_MESSAGE,
            QueryOutcome::NoRelevantDocuments { .. } => NO_RELEVANT_DOCUMENTS_MESSAGE,
        }
    }

    pub fn answer(&self) -> Option<&Answer> {
        match self {
            QueryOutcome::Answer(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn failures(&self) -> &[DocumentFailure] {
        match self {
            QueryOutcome::Answer(answer) => &answer.failures,
            QueryOutcome::NoDocuments => &[],
            QueryOutcome::NoRelevantDocuments { failures } => failures,
        }
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// 인덱싱 결과 요약
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSummary {
    pub key: String,
    pub source: IndexSource,
    pub records: usize,
    pub skipped_batches: usize,
}

/// 문서별 인덱싱 결과
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub path: PathBuf,
    pub result: std::result::Result<IndexSummary, String>,
}

// ============================================================================
// RagSystem
// ============================================================================

pub struct RagSystem {
    config: RagConfig,
    provider: Arc<dyn ModelProvider>,
    collector: DocumentCollector,
    cache: EmbeddingCache,
}

impl RagSystem {
    /// 시스템 초기화
    ///
    /// 지식베이스/임베딩 디렉토리를 만들고, 실패하면 치명적 에러입니다.
    pub fn new(config: RagConfig, provider: Arc<dyn ModelProvider>) -> Result<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.knowledge_base_path).map_err(|source| {
            RagError::Setup {
                path: config.knowledge_base_path.clone(),
                source,
            }
        })?;

        let store =
            FsBlobStore::open(&config.embeddings_path).map_err(|source| RagError::Setup {
                path: config.embeddings_path.clone(),
                source,
            })?;

        tracing::info!(
            "RAG system ready (provider: {}, knowledge base: {:?}, cache: {:?})",
            provider.name(),
            config.knowledge_base_path,
            config.embeddings_path
        );

        Ok(Self::with_components(
            config,
            provider,
            Arc::new(FileExtractor::new()),
            Arc::new(store),
        ))
    }

    /// 추출기/저장소를 직접 지정해 구성
    pub fn with_components(
        config: RagConfig,
        provider: Arc<dyn ModelProvider>,
        extractor: Arc<dyn TextExtractor>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        let processor = DocumentProcessor::new(&config, provider.clone(), extractor);
        let cache = EmbeddingCache::new(&config, store, processor);

        Self {
            collector: DocumentCollector::new(&config.extensions),
            config,
            provider,
            cache,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 지식베이스 문서 목록
    pub fn documents(&self) -> Result<Vec<CollectedFile>> {
        self.collector.collect(&self.config.knowledge_base_path)
    }

    /// 단일 질의
    pub async fn query(&self, question: &str) -> Result<QueryOutcome> {
        self.answer(question, &[]).await
    }

    /// 단일 질의 (항상 문자열)
    ///
    /// 치명적 에러도 사용자에게 보여줄 메시지로 바꿉니다.
    pub async fn query_text(&self, question: &str) -> String {
        match self.query(question).await {
            Ok(outcome) => outcome.to_string(),
            Err(e) => {
                tracing::error!("Query failed: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    /// 대화형 질의
    ///
    /// 기록이 있으면 후속 질문을 독립 질문으로 바꾼 뒤 검색하고,
    /// 답변이 생성된 경우에만 세션에 턴을 추가합니다.
    pub async fn ask(&self, session: &mut ChatSession, question: &str) -> Result<QueryOutcome> {
        let standalone = if session.is_empty() {
            question.to_string()
        } else {
            self.condense(session.history(), question).await
        };

        let outcome = self.answer(&standalone, session.history()).await?;

        if let QueryOutcome::Answer(answer) = &outcome {
            session.push(question, answer.text.clone());
        }

        Ok(outcome)
    }

    /// 모든 문서의 인덱스를 미리 확보
    ///
    /// `force`면 캐시를 무시하고 다시 빌드합니다 (손상된 엔트리 복구).
    pub async fn index_all(&self, force: bool) -> Result<Vec<DocumentReport>> {
        let documents = self.documents()?;
        let limit = self.config.max_concurrent_documents.max(1);

        let reports = stream::iter(documents.iter())
            .map(|doc| async move {
                let resolved = if force {
                    self.cache.rebuild(&doc.path).await
                } else {
                    self.cache.get_or_build(&doc.path).await
                };

                DocumentReport {
                    path: doc.path.clone(),
                    result: resolved.map(summarize).map_err(|e| e.to_string()),
                }
            })
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

        Ok(reports)
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<QueryOutcome> {
        // 1. 문서 열거 (디렉토리 없음은 치명적)
        let documents = self.documents()?;
        if documents.is_empty() {
            tracing::warn!(
                "No documents in {:?}",
                self.config.knowledge_base_path
            );
            return Ok(QueryOutcome::NoDocuments);
        }

        // 2. 문서별 인덱스
        let (indices, failures) = self.resolve_indices(&documents).await;
        if indices.is_empty() {
            return Ok(QueryOutcome::NoRelevantDocuments { failures });
        }

        // 3. 검색 (쿼리 임베딩은 한 번만)
        let query_vector = self
            .provider
            .embed(question)
            .await
            .map_err(RagError::QueryEmbedding)?;

        let mut passages = Vec::new();
        for (path, index) in &indices {
            let results = index.search_with_floor(
                &query_vector,
                self.config.top_k,
                self.config.min_similarity,
            );
            tracing::debug!("{} passages from {:?}", results.len(), path);

            passages.extend(results.into_iter().map(|r| RetrievedPassage {
                source: path.clone(),
                text: r.text,
                similarity: r.similarity,
            }));
        }

        if passages.is_empty() {
            return Ok(QueryOutcome::NoRelevantDocuments { failures });
        }

        // 4. 생성
        let prompt = build_answer_prompt(question, &passages, history);
        let text = self
            .provider
            .complete(&prompt)
            .await
            .map_err(RagError::Completion)?;

        Ok(QueryOutcome::Answer(Answer {
            text,
            passages,
            prompt,
            failures,
        }))
    }

    /// 열거 순서를 유지하며 인덱스 확보 (최대 `max_concurrent_documents`개 동시)
    async fn resolve_indices(
        &self,
        documents: &[CollectedFile],
    ) -> (Vec<(PathBuf, VectorIndex)>, Vec<DocumentFailure>) {
        let limit = self.config.max_concurrent_documents.max(1);

        let resolved = stream::iter(documents.iter())
            .map(|doc| async move { (doc, self.cache.get_or_build(&doc.path).await) })
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

        let mut indices = Vec::new();
        let mut failures = Vec::new();

        for (doc, result) in resolved {
            match result {
                Ok(resolved) => {
                    log_resolution(&doc.path, &resolved);
                    indices.push((doc.path.clone(), resolved.index));
                }
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", doc.path, e);
                    failures.push(DocumentFailure {
                        path: doc.path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        (indices, failures)
    }

    /// 후속 질문 → 독립 질문 (실패하면 원래 질문 사용)
    async fn condense(&self, history: &[ChatTurn], question: &str) -> String {
        let prompt = build_condense_prompt(history, question);

        match self.provider.complete(&prompt).await {
            Ok(rephrased) if !rephrased.trim().is_empty() => {
                tracing::debug!("Rephrased {:?} as {:?}", question, rephrased.trim());
                rephrased.trim().to_string()
            }
            Ok(_) => question.to_string(),
            Err(e) => {
                tracing::warn!("Failed to rephrase follow-up question: {}", e);
                question.to_string()
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn summarize(resolved: ResolvedIndex) -> IndexSummary {
    IndexSummary {
        key: resolved.key.storage_key(),
        source: resolved.source,
        records: resolved.index.len(),
        skipped_batches: resolved.failed_batches.len(),
    }
}

fn log_resolution(path: &Path, resolved: &ResolvedIndex) {
    // 저장 실패는 캐시에서 이미 경고합니다
    if !resolved.failed_batches.is_empty() {
        tracing::warn!(
            "Using partial index for {:?} ({} batches skipped)",
            path,
            resolved.failed_batches.len()
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display_uses_fixed_messages() {
        assert_eq!(QueryOutcome::NoDocuments.to_string(), NO_DOCUMENTS_MESSAGE);
        assert_eq!(
            QueryOutcome::NoRelevantDocuments { failures: vec![] }.to_string(),
            NO_RELEVANT_DOCUMENTS_MESSAGE
        );

        let outcome = QueryOutcome::Answer(Answer {
            text: "Paris.".into(),
            passages: vec![],
            prompt: String::new(),
            failures: vec![],
        });
        assert_eq!(outcome.to_string(), "Paris.");
        assert!(outcome.answer().is_some());
    }
}
