//! Text Chunking Module
//!
//! 구분자 선호 순서(문장 끝 → 문단 → 줄바꿈 → 글자 수 강제 절단)에 따라
//! 텍스트를 겹치는 청크로 나눕니다.
//!
//! 청크는 항상 원문의 연속 구간이므로, 겹침을 제거하고 이어 붙이면 원문이 복원됩니다.
//! 문장 끝(`.`, `?`, `!`)으로 끝나는 조각은 `chunk_size`를 넘더라도 자르지 않고
//! 하나의 청크로 내보냅니다. 강제 절단은 문장 끝이 없는 구간에만 적용됩니다.

use std::collections::VecDeque;
use std::ops::Range;

use crate::config::RagConfig;

/// 분할 지점 선호 순서 (앞쪽이 우선)
pub const DEFAULT_SEPARATORS: [&str; 6] = [".\n", ". ", "? ", "! ", "\n\n", "\n"];

const SENTENCE_TERMINATORS: [char; 3] = ['.', '?', '!'];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 최대 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::new(1000, 50)
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_rag(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 구분자 재귀 분할 청커
///
/// 1. 텍스트를 `chunk_size` 이하의 조각으로 재귀 분할 (구분자는 앞 조각에 붙음)
/// 2. 조각을 `chunk_size`까지 탐욕적으로 병합
/// 3. 다음 청크는 이전 청크의 마지막 조각들(`chunk_overlap` 이하)로 시작
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkConfig) -> Self {
        // 0 크기는 무한 루프가 되므로 최소 1자
        let config = ChunkConfig {
            chunk_size: config.chunk_size.max(1),
            ..config
        };
        Self { config }
    }

    /// 청크의 원문 바이트 구간 목록
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut pieces = Vec::new();
        self.split_pieces(text, 0..text.len(), 0, &mut pieces);

        self.merge_pieces(text, &pieces)
            .into_iter()
            .filter(|span| !text[span.clone()].trim().is_empty())
            .collect()
    }

    /// `chunk_size` 이하가 될 때까지 구분자 순서대로 재귀 분할
    fn split_pieces(
        &self,
        text: &str,
        range: Range<usize>,
        level: usize,
        out: &mut Vec<Range<usize>>,
    ) {
        let slice = &text[range.clone()];
        if char_len(slice) <= self.config.chunk_size {
            out.push(range);
            return;
        }

        let Some(separator) = self.config.separators.get(level) else {
            if slice.trim_end().ends_with(SENTENCE_TERMINATORS) {
                out.push(range);
            } else {
                self.hard_split(slice, range.start, out);
            }
            return;
        };

        if separator.is_empty() || !slice.contains(separator.as_str()) {
            self.split_pieces(text, range, level + 1, out);
            return;
        }

        let mut start = range.start;
        for (idx, _) in slice.match_indices(separator.as_str()) {
            let end = range.start + idx + separator.len();
            self.split_pieces(text, start..end, level + 1, out);
            start = end;
        }
        if start < range.end {
            self.split_pieces(text, start..range.end, level + 1, out);
        }
    }

    /// 구분자가 없을 때 글자 수 기준 강제 절단
    fn hard_split(&self, slice: &str, offset: usize, out: &mut Vec<Range<usize>>) {
        let mut start = 0;
        let mut count = 0;

        for (i, _) in slice.char_indices() {
            if count == self.config.chunk_size {
                out.push(offset + start..offset + i);
                start = i;
                count = 0;
            }
            count += 1;
        }

        if start < slice.len() {
            out.push(offset + start..offset + slice.len());
        }
    }

    /// 조각 병합 + 오버랩 적용
    fn merge_pieces(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut spans = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(&text[piece.clone()]);

            if total + len > size {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    spans.push(first.0.start..last.0.end);
                }

                // 오버랩 크기 이하이면서 다음 조각이 들어갈 때까지 앞에서 제거
                while total > overlap || (total + len > size && total > 0) {
                    match window.pop_front() {
                        Some((_, removed)) => total -= removed,
                        None => break,
                    }
                }
            }

            window.push_back((piece.clone(), len));
            total += len;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            spans.push(first.0.start..last.0.end);
        }

        spans
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        self.spans(text)
            .into_iter()
            .map(|span| text[span].to_string())
            .collect()
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkConfig::new(size, overlap))
    }

    /// 겹침을 제거하고 이어 붙인 텍스트
    fn reconstruct(text: &str, spans: &[Range<usize>]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for span in spans {
            let start = span.start.max(covered);
            out.push_str(&text[start..span.end]);
            covered = span.end;
        }
        out
    }

    #[test]
    fn test_chunker_empty() {
        assert!(chunker(100, 10).chunk("").is_empty());
        assert!(chunker(100, 10).chunk("  \n ").is_empty());
    }

    #[test]
    fn test_chunker_small_text() {
        let chunks = chunker(1000, 50).chunk("The capital of France is Paris.");
        assert_eq!(chunks, vec!["The capital of France is Paris."]);
    }

    #[test]
    fn test_sentence_overlap() {
        let text = "Aaaa. Bbbb. Cccc. Dddd.";
        let chunks = chunker(12, 6).chunk(text);
        assert_eq!(chunks, vec!["Aaaa. Bbbb. ", "Bbbb. Cccc. ", "Cccc. Dddd."]);
    }

    #[test]
    fn test_hard_cutoff() {
        let text = "a".repeat(25);
        let chunks = chunker(10, 0).chunk(&text);
        assert_eq!(chunks, vec!["a".repeat(10), "a".repeat(10), "a".repeat(5)]);
    }

    #[test]
    fn test_oversized_sentence_emitted_whole() {
        let text = "This single sentence is far longer than the limit. Short.";
        let chunks = chunker(20, 0).chunk(text);
        assert_eq!(
            chunks,
            vec!["This single sentence is far longer than the limit. ", "Short."]
        );

        // 문장 끝이 없는 꼬리는 여전히 강제 절단
        let text = "Way too long question here? trailing words without end";
        let chunks = chunker(20, 0).chunk(text);
        assert_eq!(chunks[0], "Way too long question here? ");
        assert!(chunks[1..].iter().all(|c| c.chars().count() <= 20));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_prefers_sentence_over_newline() {
        let text = "First sentence here. Second one\nwraps here. Third.";
        let chunks = chunker(25, 0).chunk(text);
        assert_eq!(chunks[0], "First sentence here. ");
        assert!(chunks.iter().all(|c| c.chars().count() <= 25));
    }

    #[test]
    fn test_reconstruction_and_bounds() {
        let mut text = String::new();
        for i in 0..60 {
            text.push_str(&format!("Sentence number {} talks about topic {}. ", i, i % 7));
            if i % 9 == 0 {
                text.push_str("\n\n");
            }
        }
        let text = text.trim_end().to_string();

        let size = 120;
        let overlap = 40;
        let spans = chunker(size, overlap).spans(&text);

        assert!(spans.len() > 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().unwrap().end, text.len());

        for span in &spans {
            assert!(text[span.clone()].chars().count() <= size);
        }
        for pair in spans.windows(2) {
            assert!(pair[1].start > pair[0].start);
            assert!(pair[1].start <= pair[0].end);
            let shared = text[pair[1].start..pair[0].end].chars().count();
            assert!(shared <= overlap);
        }

        assert_eq!(reconstruct(&text, &spans), text);
    }

    #[test]
    fn test_unicode_counts_characters() {
        let text = "세계".repeat(10);
        let chunks = chunker(5, 0).chunk(&text);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "One. Two. Three.\nFour. Five.\n\nSix seven eight nine ten.";
        let c = chunker(12, 4);
        assert_eq!(c.chunk(text), c.chunk(text));
    }
}
