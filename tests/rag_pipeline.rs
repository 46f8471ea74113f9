//! RagSystem 통합 테스트
//!
//! 키워드 기반 스텁 프로바이더로 네트워크 없이 전체 파이프라인을 검증합니다.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use palank_pdfqa::{
    ChatSession, IndexSource, ModelProvider, ProviderError, QueryOutcome, RagConfig, RagError,
    RagSystem, NO_DOCUMENTS_MESSAGE, NO_RELEVANT_DOCUMENTS_MESSAGE,
};
use tempfile::TempDir;

const FRANCE: &str = "The capital of France is Paris.";
const QUESTION: &str = "What is the capital of France?";

// ============================================================================
// Stub Provider
// ============================================================================

/// 키워드 존재 여부로 3차원 벡터를 만드는 스텁
#[derive(Default)]
struct StubProvider {
    embed_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    fail_queries: bool,
}

impl StubProvider {
    fn failing_queries() -> Self {
        Self {
            fail_queries: true,
            ..Default::default()
        }
    }

    fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for StubProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_queries && text.trim_end().ends_with('?') {
            return Err(ProviderError::Api {
                status: 500,
                message: "embedding model unavailable".into(),
            });
        }

        let lower = text.to_lowercase();
        Ok(["france", "zebra", "moon"]
            .iter()
            .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
            .collect())
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if prompt.ends_with("Standalone question:") {
            return Ok(QUESTION.to_string());
        }
        Ok("Paris.".to_string())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn test_config(root: &Path) -> RagConfig {
    RagConfig {
        knowledge_base_path: root.join("knowledge_base"),
        embeddings_path: root.join("embeddings"),
        chunk_size: 200,
        chunk_overlap: 0,
        top_k: 2,
        batch_delay_ms: 0,
        extensions: vec!["txt".to_string(), "pdf".to_string()],
        ..Default::default()
    }
}

fn setup(provider: Arc<StubProvider>) -> (TempDir, RagSystem) {
    setup_with(provider, |_| {})
}

fn setup_with(
    provider: Arc<StubProvider>,
    customize: impl FnOnce(&mut RagConfig),
) -> (TempDir, RagSystem) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    customize(&mut config);
    let system = RagSystem::new(config, provider).unwrap();
    (dir, system)
}

fn write_doc(dir: &TempDir, name: &str, content: &[u8]) {
    std::fs::write(dir.path().join("knowledge_base").join(name), content).unwrap();
}

fn cache_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path().join("embeddings"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
        .count()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_new_creates_directories() {
    let provider = Arc::new(StubProvider::default());
    let (dir, _system) = setup(provider);

    assert!(dir.path().join("knowledge_base").is_dir());
    assert!(dir.path().join("embeddings").is_dir());
}

#[tokio::test]
async fn test_empty_knowledge_base() {
    let provider = Arc::new(StubProvider::default());
    let (_dir, system) = setup(provider.clone());

    let outcome = system.query(QUESTION).await.unwrap();
    assert!(matches!(outcome, QueryOutcome::NoDocuments));
    assert_eq!(outcome.to_string(), NO_DOCUMENTS_MESSAGE);
    assert_eq!(provider.embed_calls(), 0);
    assert!(provider.prompts().is_empty());
}

#[tokio::test]
async fn test_answer_uses_retrieved_context() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider.clone());
    write_doc(&dir, "france.txt", FRANCE.as_bytes());

    let outcome = system.query(QUESTION).await.unwrap();
    let answer = outcome.answer().expect("answer expected");

    assert_eq!(answer.text, "Paris.");
    assert!(answer.prompt.contains("Paris"));
    assert!(answer.prompt.contains(QUESTION));
    assert_eq!(answer.passages.len(), 1);
    assert!(answer.passages[0].source.ends_with("france.txt"));
    assert!(answer.failures.is_empty());

    // 청크 1개 + 쿼리 1개
    assert_eq!(provider.embed_calls(), 2);
    assert_eq!(provider.prompts(), vec![answer.prompt.clone()]);
    assert_eq!(cache_files(&dir), 1);
}

#[tokio::test]
async fn test_repeat_query_reuses_cached_index() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider.clone());
    write_doc(&dir, "france.txt", FRANCE.as_bytes());

    system.query(QUESTION).await.unwrap();
    let after_first = provider.embed_calls();

    system.query(QUESTION).await.unwrap();
    assert_eq!(provider.embed_calls(), after_first + 1);
    assert_eq!(cache_files(&dir), 1);
}

#[tokio::test]
async fn test_renamed_document_is_not_reembedded() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider.clone());
    write_doc(&dir, "france.txt", FRANCE.as_bytes());
    system.query(QUESTION).await.unwrap();
    let after_first = provider.embed_calls();

    let kb = dir.path().join("knowledge_base");
    std::fs::rename(kb.join("france.txt"), kb.join("renamed.txt")).unwrap();

    let outcome = system.query(QUESTION).await.unwrap();
    assert!(outcome.answer().unwrap().passages[0]
        .source
        .ends_with("renamed.txt"));
    assert_eq!(provider.embed_calls(), after_first + 1);
    assert_eq!(cache_files(&dir), 1);
}

#[tokio::test]
async fn test_broken_document_is_skipped() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider);
    write_doc(&dir, "broken.pdf", b"this is not a pdf");
    write_doc(&dir, "france.txt", FRANCE.as_bytes());

    let outcome = system.query(QUESTION).await.unwrap();
    let answer = outcome.answer().expect("answer expected");

    assert_eq!(answer.failures.len(), 1);
    assert!(answer.failures[0].path.ends_with("broken.pdf"));
    assert!(answer.prompt.contains("Paris"));
}

#[tokio::test]
async fn test_all_documents_failing() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider.clone());
    write_doc(&dir, "broken.pdf", b"this is not a pdf");

    let outcome = system.query(QUESTION).await.unwrap();
    assert!(matches!(outcome, QueryOutcome::NoRelevantDocuments { .. }));
    assert_eq!(outcome.to_string(), NO_RELEVANT_DOCUMENTS_MESSAGE);
    assert_eq!(outcome.failures().len(), 1);
    assert!(provider.prompts().is_empty());
    assert_eq!(cache_files(&dir), 0);
}

#[tokio::test]
async fn test_similarity_floor_filters_unrelated_context() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup_with(provider.clone(), |c| c.min_similarity = Some(0.5));
    write_doc(&dir, "zebra.txt", b"Zebras live in Africa.");

    let outcome = system.query(QUESTION).await.unwrap();
    assert!(matches!(outcome, QueryOutcome::NoRelevantDocuments { .. }));
    assert!(outcome.failures().is_empty());
    assert!(provider.prompts().is_empty());
}

#[tokio::test]
async fn test_context_follows_document_order() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup_with(provider, |c| c.max_concurrent_documents = 4);
    write_doc(&dir, "a.txt", b"France has many regions.");
    write_doc(&dir, "b.txt", FRANCE.as_bytes());
    write_doc(&dir, "c.txt", b"Zebras live in Africa.");

    let outcome = system.query(QUESTION).await.unwrap();
    let sources: Vec<_> = outcome
        .answer()
        .unwrap()
        .passages
        .iter()
        .map(|p| p.source.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(sources, vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test]
async fn test_missing_knowledge_base_is_fatal() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider);
    std::fs::remove_dir_all(dir.path().join("knowledge_base")).unwrap();

    let err = system.query(QUESTION).await.unwrap_err();
    assert!(matches!(err, RagError::KnowledgeBaseMissing(_)));
    assert!(err.is_fatal());

    let text = system.query_text(QUESTION).await;
    assert!(text.starts_with("Error:"));
}

#[tokio::test]
async fn test_query_embedding_failure_is_fatal() {
    let provider = Arc::new(StubProvider::failing_queries());
    let (dir, system) = setup(provider.clone());
    write_doc(&dir, "france.txt", FRANCE.as_bytes());

    let err = system.query(QUESTION).await.unwrap_err();
    assert!(matches!(err, RagError::QueryEmbedding(_)));
    assert!(provider.prompts().is_empty());

    // 문서 인덱스는 이미 저장됨
    assert_eq!(cache_files(&dir), 1);
}

#[tokio::test]
async fn test_chat_session_carries_history() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider.clone());
    write_doc(&dir, "france.txt", FRANCE.as_bytes());

    let mut session = ChatSession::new();
    let first = system.ask(&mut session, QUESTION).await.unwrap();
    assert_eq!(first.to_string(), "Paris.");
    assert_eq!(session.history().len(), 1);

    let second = system.ask(&mut session, "How large is it?").await.unwrap();
    let answer = second.answer().expect("answer expected");

    // 후속 질문은 독립 질문으로 바뀐 뒤 검색됨
    assert!(answer.prompt.contains(&format!("Query: {}", QUESTION)));
    assert!(answer.prompt.contains("User: What is the capital of France?"));
    assert_eq!(session.history().len(), 2);
    assert_eq!(session.history()[1].question, "How large is it?");

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("Follow Up Input: How large is it?"));
}

#[tokio::test]
async fn test_index_all_reports_cache_state() {
    let provider = Arc::new(StubProvider::default());
    let (dir, system) = setup(provider.clone());
    write_doc(&dir, "france.txt", FRANCE.as_bytes());
    write_doc(&dir, "broken.pdf", b"not a pdf");

    let reports = system.index_all(false).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports[0].path.ends_with("broken.pdf"));
    assert!(reports[0].result.is_err());
    assert_eq!(reports[1].result.as_ref().unwrap().source, IndexSource::Built);

    let reports = system.index_all(false).await.unwrap();
    assert_eq!(reports[1].result.as_ref().unwrap().source, IndexSource::Cache);

    let embeds = provider.embed_calls();
    let reports = system.index_all(true).await.unwrap();
    assert_eq!(reports[1].result.as_ref().unwrap().source, IndexSource::Built);
    assert_eq!(provider.embed_calls(), embeds + 1);
    assert_eq!(cache_files(&dir), 1);
}
