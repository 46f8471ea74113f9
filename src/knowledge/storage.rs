//! Blob Storage - 키-값 영속 저장소
//!
//! 캐시 엔트리는 `<root>/<key>.json` 파일 하나로 저장됩니다.
//! 쓰기는 임시 파일에 기록 후 rename하므로 반쯤 쓰인 엔트리가 남지 않습니다.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// 캐시 파일 확장자
const BLOB_EXTENSION: &str = "json";

// ============================================================================
// BlobStore Trait
// ============================================================================

/// 키 단위 blob 저장소 트레이트
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> io::Result<bool>;

    async fn read(&self, key: &str) -> io::Result<Vec<u8>>;

    async fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()>;

    /// 저장된 키 목록
    async fn keys(&self) -> io::Result<Vec<String>>;

    /// 사람이 읽을 수 있는 위치 (로그용)
    fn location(&self, key: &str) -> String;
}

// ============================================================================
// FsBlobStore
// ============================================================================

/// 디렉토리 기반 blob 저장소
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// 저장소 열기 (디렉토리가 없으면 생성)
    pub fn open(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key, BLOB_EXTENSION))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, key: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.path_for(key)).await
    }

    async fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path_for(key)).await
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.path_for(key);
        let temp = self
            .root
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        Ok(())
    }

    async fn keys(&self) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    keys.push(stem.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn location(&self, key: &str) -> String {
        self.path_for(key).display().to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
