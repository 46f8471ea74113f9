//! Vector Index - 문서 하나의 인메모리 벡터 인덱스
//!
//! 코사인 유사도 기반 전수 탐색(k-NN)입니다.
//! 문서당 수백~수천 청크 규모라 ANN 구조 없이도 충분히 빠릅니다.

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

// ============================================================================
// Types
// ============================================================================

/// 청크 텍스트와 임베딩 벡터 쌍
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub text: String,
    pub vector: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// 인덱스 내 삽입 순서 (0-based)
    pub position: usize,
    pub text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 레코드를 소유하는 벡터 인덱스
///
/// 빈 인덱스는 만들 수 없으며, 모든 벡터의 차원이 같아야 합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    records: Vec<EmbeddingRecord>,
}

impl VectorIndex {
    /// 첫 배치로 인덱스 생성
    pub fn new(records: Vec<EmbeddingRecord>) -> Result<Self, IndexError> {
        let dimension = records.first().ok_or(IndexError::Empty)?.vector.len();
        let mut index = Self {
            dimension,
            records: Vec::with_capacity(records.len()),
        };
        index.add(records)?;
        Ok(index)
    }

    /// 레코드 추가
    ///
    /// 차원이 다른 레코드가 하나라도 있으면 아무것도 추가하지 않습니다.
    pub fn add(&mut self, records: Vec<EmbeddingRecord>) -> Result<usize, IndexError> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                found: bad.vector.len(),
            });
        }

        let added = records.len();
        self.records.extend(records);
        Ok(added)
    }

    /// 쿼리 벡터와 가장 가까운 `k`개 레코드
    ///
    /// 유사도 내림차순, 동점이면 삽입 순서.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        self.search_with_floor(query, k, None)
    }

    /// `min_similarity` 미만 결과를 제외하고 검색
    pub fn search_with_floor(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: Option<f32>,
    ) -> Vec<SearchResult> {
        if k == 0 || query.len() != self.dimension {
            return vec![];
        }

        let mut scored: Vec<SearchResult> = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| SearchResult {
                position,
                text: record.text.clone(),
                similarity: cosine_similarity(query, &record.vector),
            })
            .filter(|r| min_similarity.map_or(true, |floor| r.similarity >= floor))
            .collect();

        // sort_by는 안정 정렬이라 동점은 삽입 순서 유지
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
