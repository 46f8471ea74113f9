//! Knowledge 모듈 - 문서별 벡터 인덱스와 캐시
//!
//! - Chunker: 구분자 우선순위 기반 텍스트 분할
//! - Vector: 문서 하나의 인메모리 k-NN 인덱스
//! - Storage: 캐시 엔트리 영속 저장소
//! - Processor: 추출 → 청킹 → 배치 임베딩
//! - Cache: 콘텐츠 해시 키로 인덱스 재사용

mod cache;
mod chunker;
mod processor;
mod storage;
mod vector;

// Re-exports
pub use cache::{
    content_hash, CacheEntry, CacheKey, EmbeddingCache, IndexSource, ResolvedIndex,
    CACHE_FORMAT_VERSION,
};
pub use chunker::{ChunkConfig, Chunker, RecursiveChunker, DEFAULT_SEPARATORS};
pub use processor::{BatchFailure, DocumentProcessor, ProcessedIndex};
pub use storage::{BlobStore, FsBlobStore};
pub use vector::{cosine_similarity, EmbeddingRecord, SearchResult, VectorIndex};
