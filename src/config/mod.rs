//! 설정 모듈
//!
//! 시작 시 한 번 생성되는 불변 설정입니다.
//! 우선순위: 기본값 < TOML 파일 < `PDFQA_*` 환경변수
//!
//! ```toml
//! knowledge_base_path = "knowledge_base"
//! embeddings_path = "embeddings"
//! provider = "ollama"
//! embedding_model_id = "nomic-embed-text"
//! llm_model_id = "gemma3:1b"
//! chunk_size = 1000
//! chunk_overlap = 50
//! top_k = 2
//! batch_size = 10
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::knowledge::DEFAULT_SEPARATORS;

/// 프로젝트 로컬 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "palank-pdfqa.toml";

/// 환경변수 접두사
const ENV_PREFIX: &str = "PDFQA_";

// ============================================================================
// Data Directory
// ============================================================================

/// 사용자 데이터 디렉토리 경로 (`<data_local_dir>/.palank-pdfqa/`, 예: ~/.local/share/.palank-pdfqa/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".palank-pdfqa")
}

// ============================================================================
// RagConfig
// ============================================================================

/// RAG 시스템 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// 원본 문서 디렉토리
    pub knowledge_base_path: PathBuf,
    /// 캐시 엔트리 저장 디렉토리
    pub embeddings_path: PathBuf,
    /// 모델 프로바이더 ("ollama" | "gemini")
    pub provider: String,
    pub embedding_model_id: String,
    pub llm_model_id: String,
    /// 청크 최대 길이 (문자 수)
    pub chunk_size: usize,
    /// 인접 청크 간 최대 중첩 (문자 수)
    pub chunk_overlap: usize,
    /// 문서당 검색할 청크 수
    pub top_k: usize,
    /// 임베딩 배치 크기 (청크 수)
    pub batch_size: usize,
    /// 배치 사이 대기 시간 (임베딩 서비스 rate limit 대응)
    pub batch_delay_ms: u64,
    pub ollama_base_url: String,
    pub request_timeout_secs: u64,
    /// 검색 결과 최소 유사도 (None이면 필터링 없음)
    pub min_similarity: Option<f32>,
    /// 수집 대상 확장자 (대소문자 무시)
    pub extensions: Vec<String>,
    /// 동시에 인덱스를 준비할 문서 수
    pub max_concurrent_documents: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: PathBuf::from("knowledge_base"),
            embeddings_path: PathBuf::from("embeddings"),
            provider: "ollama".to_string(),
            embedding_model_id: "nomic-embed-text".to_string(),
            llm_model_id: "gemma3:1b".to_string(),
            chunk_size: 1000,
            chunk_overlap: 50,
            top_k: 2,
            batch_size: 10,
            batch_delay_ms: 500,
            ollama_base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
            min_similarity: None,
            extensions: vec!["pdf".to_string()],
            max_concurrent_documents: 1,
        }
    }
}

impl RagConfig {
    /// 설정 로드
    ///
    /// `path`가 주어지면 해당 파일이 반드시 존재해야 합니다.
    /// 없으면 `./palank-pdfqa.toml`, `<data dir>/config.toml` (`get_data_dir`) 순서로 찾고,
    /// 둘 다 없으면 기본값을 사용합니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_path(path)? {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(RagError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let candidates = [
            PathBuf::from(CONFIG_FILE_NAME),
            get_data_dir().join("config.toml"),
        ];

        Ok(candidates.into_iter().find(|p| p.is_file()))
    }

    /// TOML 파일에서 읽기 (누락된 필드는 기본값)
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| RagError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&raw)
            .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// `PDFQA_<FIELD>` 형식의 값으로 덮어쓰기
    ///
    /// 파싱할 수 없는 값은 `Config` 에러입니다.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("KNOWLEDGE_BASE_PATH") {
            self.knowledge_base_path = PathBuf::from(v);
        }
        if let Some(v) = get("EMBEDDINGS_PATH") {
            self.embeddings_path = PathBuf::from(v);
        }
        if let Some(v) = get("PROVIDER") {
            self.provider = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL_ID") {
            self.embedding_model_id = v;
        }
        if let Some(v) = get("LLM_MODEL_ID") {
            self.llm_model_id = v;
        }
        if let Some(v) = get("OLLAMA_BASE_URL") {
            self.ollama_base_url = v;
        }
        if let Some(v) = get("EXTENSIONS") {
            self.extensions = v
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }

        parse_into(&get, "CHUNK_SIZE", &mut self.chunk_size)?;
        parse_into(&get, "CHUNK_OVERLAP", &mut self.chunk_overlap)?;
        parse_into(&get, "TOP_K", &mut self.top_k)?;
        parse_into(&get, "BATCH_SIZE", &mut self.batch_size)?;
        parse_into(&get, "BATCH_DELAY_MS", &mut self.batch_delay_ms)?;
        parse_into(&get, "REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs)?;
        parse_into(
            &get,
            "MAX_CONCURRENT_DOCUMENTS",
            &mut self.max_concurrent_documents,
        )?;

        if get("MIN_SIMILARITY").is_some() {
            let mut floor = self.min_similarity.unwrap_or_default();
            parse_into(&get, "MIN_SIMILARITY", &mut floor)?;
            self.min_similarity = Some(floor);
        }

        Ok(())
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(RagError::Config("batch_size must be positive".into()));
        }
        if self.max_concurrent_documents == 0 {
            return Err(RagError::Config(
                "max_concurrent_documents must be positive".into(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(RagError::Config("extensions must not be empty".into()));
        }
        if self.provider == "ollama" {
            url::Url::parse(&self.ollama_base_url).map_err(|e| {
                RagError::Config(format!("invalid ollama_base_url {}: {}", self.ollama_base_url, e))
            })?;
        }
        Ok(())
    }

    /// 캐시 내용에 영향을 주는 파라미터의 지문
    ///
    /// 캐시 키에 포함되므로 청킹/모델 설정이 바뀌면 기존 엔트리를 재사용하지 않습니다.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.embedding_model_id.as_bytes());
        hasher.update([0u8]);
        // 플랫폼과 무관하게 같은 지문이 나오도록 u64로 고정
        hasher.update((self.chunk_size as u64).to_le_bytes());
        hasher.update((self.chunk_overlap as u64).to_le_bytes());
        for sep in DEFAULT_SEPARATORS {
            hasher.update(sep.as_bytes());
            hasher.update([0u8]);
        }

        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }
}

fn parse_into<T, G>(get: &G, name: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(name) {
        *slot = raw.trim().parse::<T>().map_err(|_| {
            RagError::Config(format!("invalid {}{}: {:?}", ENV_PREFIX, name, raw))
        })?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 2);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.embedding_model_id, "nomic-embed-text");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "chunk_size = 400\ntop_k = 5\n").unwrap();

        let config = RagConfig::from_file(&path).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = RagConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PDFQA_CHUNK_SIZE", "256"),
            ("PDFQA_EXTENSIONS", "pdf, txt"),
            ("PDFQA_MIN_SIMILARITY", "0.25"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.chunk_size, 256);
        assert_eq!(config.extensions, vec!["pdf", "txt"]);
        assert_eq!(config.min_similarity, Some(0.25));
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        for (key, value) in [
            ("PDFQA_TOP_K", "not-a-number"),
            ("PDFQA_CHUNK_SIZE", "1k"),
            ("PDFQA_MIN_SIMILARITY", "high"),
        ] {
            let mut config = RagConfig::default();
            let result =
                config.apply_overrides(|k| (k == key).then(|| value.to_string()));
            assert!(
                matches!(result, Err(RagError::Config(ref m)) if m.contains(key)),
                "{} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_fingerprint_stable_across_targets() {
        let config = RagConfig::default();
        let mut hasher = Sha256::new();
        hasher.update(config.provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(config.embedding_model_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(1000u64.to_le_bytes());
        hasher.update(50u64.to_le_bytes());
        for sep in DEFAULT_SEPARATORS {
            hasher.update(sep.as_bytes());
            hasher.update([0u8]);
        }
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(config.fingerprint(), &expected[..16]);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_processing_params() {
        let base = RagConfig::default();
        let same = RagConfig {
            top_k: 9,
            llm_model_id: "other".into(),
            ..Default::default()
        };
        let resized = RagConfig {
            chunk_size: 500,
            ..Default::default()
        };
        let remodeled = RagConfig {
            embedding_model_id: "mxbai-embed-large".into(),
            ..Default::default()
        };

        assert_eq!(base.fingerprint(), same.fingerprint());
        assert_ne!(base.fingerprint(), resized.fingerprint());
        assert_ne!(base.fingerprint(), remodeled.fingerprint());
        assert_eq!(base.fingerprint().len(), 16);
    }
}
