//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;

use regex::Regex;

use crate::error::ExtractError;

/// PDF 바이트에서 페이지별 텍스트 추출
///
/// pdf-extract는 문서 전체를 한 번에 처리하므로, 파싱 실패는 문서 전체의 실패입니다.
/// 페이지 경계는 폼피드 문자(또는 페이지 구분자 줄)로 복원합니다.
pub fn extract_text_from_pdf(path: &Path, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![String::new()]);
    }

    Ok(split_pdf_pages(&text))
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)로 페이지 분리 시도
    // 빈 페이지는 빈 텍스트로 유지하고, 마지막 폼피드 뒤의 빈 조각만 제거
    let mut pages: Vec<String> = text.split('\x0c').map(|s| s.trim().to_string()).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.is_empty()) {
        pages.pop();
    }

    if pages.len() > 1 {
        return pages;
    }

    // 페이지 구분자 패턴으로 시도 (예: "--- Page 1 ---")
    if let Ok(page_pattern) =
        Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
    {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    // 분리 실패 - 전체를 하나의 페이지로
    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[1], "Page 2 content");
    }

    #[test]
    fn test_split_pdf_pages_keeps_empty_pages() {
        let pages = split_pdf_pages("first\x0c  \x0cthird\x0c");
        assert_eq!(pages, vec!["first", "", "third"]);
    }

    #[test]
    fn test_split_pdf_pages_with_markers() {
        let text = "intro\n--- Page 2 ---\nsecond";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["intro", "second"]);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let text = "Just some text without page breaks";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_garbage_bytes_are_extraction_error() {
        let result = extract_text_from_pdf(Path::new("bad.pdf"), b"not a pdf at all");
        assert!(matches!(result, Err(ExtractError::Pdf { .. })));
    }
}
