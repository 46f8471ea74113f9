//! Embedding Cache Store - 콘텐츠 해시 기반 인덱스 캐시
//!
//! 문서의 정체성은 경로나 이름이 아니라 전체 바이트의 SHA-256 해시입니다.
//! 캐시 키 = `<content hash>-<처리 설정 지문>`
//!
//! - 엔트리는 한 번 쓰이면 제자리 수정되지 않습니다 (내용이 바뀌면 새 키)
//! - 손상된 엔트리는 에러로 보고하고 자동 재빌드하지 않습니다 (`rebuild`로 명시적 복구)
//! - 같은 키에 대한 빌드/쓰기는 키별 잠금으로 직렬화됩니다

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::RagConfig;
use crate::error::{RagError, Result};

use super::processor::{BatchFailure, DocumentProcessor};
use super::storage::BlobStore;
use super::vector::VectorIndex;

/// 직렬화 형식 버전 (형식이 바뀌면 증가)
pub const CACHE_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Cache Key
// ============================================================================

/// 문서 바이트의 SHA-256 (hex)
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// 캐시 키
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    content_hash: String,
    fingerprint: String,
}

impl CacheKey {
    pub fn derive(bytes: &[u8], fingerprint: &str) -> Self {
        Self {
            content_hash: content_hash(bytes),
            fingerprint: fingerprint.to_string(),
        }
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// 저장소 키 (파일 이름)
    pub fn storage_key(&self) -> String {
        format!("{}-{}", self.content_hash, self.fingerprint)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

/// 영속화되는 캐시 엔트리
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub format_version: u32,
    pub content_hash: String,
    pub fingerprint: String,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub index: VectorIndex,
}

/// 인덱스를 어디서 얻었는지
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSource {
    /// 기존 캐시 엔트리 로드
    Cache,
    /// 새로 빌드 후 저장
    Built,
    /// 새로 빌드했지만 저장 실패 (이번 요청에서만 사용 가능)
    BuiltUnpersisted(String),
}

/// `get_or_build` 결과
#[derive(Debug, Clone)]
pub struct ResolvedIndex {
    pub key: CacheKey,
    pub index: VectorIndex,
    pub source: IndexSource,
    /// 빌드 중 건너뛴 배치 (캐시 로드 시 비어있음)
    pub failed_batches: Vec<BatchFailure>,
}

// ============================================================================
// EmbeddingCache
// ============================================================================

pub struct EmbeddingCache {
    store: Arc<dyn BlobStore>,
    processor: DocumentProcessor,
    fingerprint: String,
    embedding_model: String,
    /// 키별 단일 작성자 잠금
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EmbeddingCache {
    pub fn new(config: &RagConfig, store: Arc<dyn BlobStore>, processor: DocumentProcessor) -> Self {
        Self {
            store,
            processor,
            fingerprint: config.fingerprint(),
            embedding_model: config.embedding_model_id.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 캐시된 인덱스를 로드하거나 새로 빌드
    pub async fn get_or_build(&self, path: &Path) -> Result<ResolvedIndex> {
        let bytes = read_document(path).await?;
        let key = CacheKey::derive(&bytes, &self.fingerprint);
        let storage_key = key.storage_key();

        let lock = self.lock_for(&storage_key).await;
        let result = {
            let _guard = lock.lock().await;
            self.load_or_build(path, &bytes, key).await
        };
        self.release_lock(&storage_key, lock).await;

        result
    }

    /// 기존 엔트리를 무시하고 다시 빌드해 덮어쓰기
    ///
    /// 손상된 엔트리 복구는 호출자가 이 메서드로 명시적으로 결정합니다.
    pub async fn rebuild(&self, path: &Path) -> Result<ResolvedIndex> {
        let bytes = read_document(path).await?;
        let key = CacheKey::derive(&bytes, &self.fingerprint);
        let storage_key = key.storage_key();

        let lock = self.lock_for(&storage_key).await;
        let result = {
            let _guard = lock.lock().await;
            tracing::info!("Rebuilding index for {:?} ({})", path, key);
            self.build_and_store(path, &bytes, key).await
        };
        self.release_lock(&storage_key, lock).await;

        result
    }

    /// 키 잠금을 잡은 상태에서 호출
    async fn load_or_build(&self, path: &Path, bytes: &[u8], key: CacheKey) -> Result<ResolvedIndex> {
        let storage_key = key.storage_key();
        let exists = self
            .store
            .exists(&storage_key)
            .await
            .map_err(|source| self.io_error(&storage_key, source))?;

        if exists {
            let index = self.load(&key).await?;
            tracing::debug!("Cache hit for {:?} ({})", path, key);
            return Ok(ResolvedIndex {
                key,
                index,
                source: IndexSource::Cache,
                failed_batches: vec![],
            });
        }

        tracing::info!("Cache miss for {:?}, building index", path);
        self.build_and_store(path, bytes, key).await
    }

    /// 캐시 엔트리 로드
    pub async fn load(&self, key: &CacheKey) -> Result<VectorIndex> {
        let storage_key = key.storage_key();
        let bytes = self
            .store
            .read(&storage_key)
            .await
            .map_err(|source| self.io_error(&storage_key, source))?;

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| RagError::CacheCorrupt {
                key: storage_key.clone(),
                message: e.to_string(),
            })?;

        if entry.format_version != CACHE_FORMAT_VERSION {
            return Err(RagError::CacheIncompatible {
                key: storage_key,
                found: entry.format_version,
                expected: CACHE_FORMAT_VERSION,
            });
        }

        if entry.content_hash != key.content_hash || entry.index.is_empty() {
            return Err(RagError::CacheCorrupt {
                key: storage_key,
                message: "entry does not match its key".to_string(),
            });
        }

        Ok(entry.index)
    }

    /// 저장된 엔트리 수
    pub async fn entry_count(&self) -> Result<usize> {
        self.store
            .keys()
            .await
            .map(|keys| keys.len())
            .map_err(|source| self.io_error("*", source))
    }

    /// 빌드 성공 시에만 저장 (실패하면 아무것도 쓰지 않음)
    async fn build_and_store(
        &self,
        path: &Path,
        bytes: &[u8],
        key: CacheKey,
    ) -> Result<ResolvedIndex> {
        let processed = self.processor.process(path, bytes).await?;

        let entry = CacheEntry {
            format_version: CACHE_FORMAT_VERSION,
            content_hash: key.content_hash.clone(),
            fingerprint: key.fingerprint.clone(),
            embedding_model: self.embedding_model.clone(),
            created_at: Utc::now(),
            index: processed.index,
        };

        let storage_key = key.storage_key();
        let source = match self.persist(&storage_key, &entry).await {
            Ok(()) => {
                tracing::info!(
                    "Cached index for {:?} at {}",
                    path,
                    self.store.location(&storage_key)
                );
                IndexSource::Built
            }
            Err(message) => {
                tracing::warn!(
                    "Failed to persist index for {:?} ({}), it will be rebuilt next time: {}",
                    path,
                    storage_key,
                    message
                );
                IndexSource::BuiltUnpersisted(message)
            }
        };

        Ok(ResolvedIndex {
            key,
            index: entry.index,
            source,
            failed_batches: processed.failed_batches,
        })
    }

    async fn persist(&self, storage_key: &str, entry: &CacheEntry) -> std::result::Result<(), String> {
        let bytes = serde_json::to_vec(entry).map_err(|e| e.to_string())?;
        self.store
            .write(storage_key, &bytes)
            .await
            .map_err(|e| e.to_string())
    }

    async fn lock_for(&self, storage_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(storage_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 대기자가 없으면 잠금 엔트리 제거
    async fn release_lock(&self, storage_key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // 맵과 이 호출만 참조 중이면 다른 작성자가 없음
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(storage_key);
        }
    }

    fn io_error(&self, storage_key: &str, source: std::io::Error) -> RagError {
        RagError::Io {
            path: self.store.location(storage_key).into(),
            source,
        }
    }
}

async fn read_document(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| RagError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Tests
// ============================================================================
