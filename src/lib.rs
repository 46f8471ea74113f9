//! palank-pdfqa - 로컬 PDF 지식베이스 질의응답
//!
//! 지식베이스 디렉토리의 문서를 청킹/임베딩해 문서별 벡터 인덱스를 만들고,
//! 질문과 가장 가까운 문맥으로 생성 모델의 답변을 얻습니다.
//!
//! 인덱스는 문서 바이트의 SHA-256 해시 기준으로 캐시되므로
//! 이름이 바뀐 문서는 재임베딩하지 않고, 내용이 바뀐 문서만 새로 처리합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod rag;

// Re-exports
pub use collector::{CollectedFile, CollectionStats, DocumentCollector, FileType};
pub use config::{get_data_dir, RagConfig};
pub use embedding::{create_provider, GeminiProvider, ModelProvider, OllamaProvider};
pub use error::{ExtractError, IndexError, ProviderError, RagError, Result};
pub use extractor::{FileExtractor, TextExtractor};
pub use knowledge::{
    content_hash, BlobStore, CacheKey, ChunkConfig, Chunker, DocumentProcessor, EmbeddingCache,
    FsBlobStore, IndexSource, RecursiveChunker, VectorIndex,
};
pub use rag::{
    Answer, ChatSession, ChatTurn, DocumentFailure, QueryOutcome, RagSystem, RetrievedPassage,
    NO_DOCUMENTS_MESSAGE, NO_RELEVANT_DOCUMENTS_MESSAGE,
};
