//! 프롬프트 구성
//!
//! 검색된 문맥과 질문(그리고 대화 기록)을 하나의 프롬프트로 만듭니다.

use super::session::ChatTurn;
use super::RetrievedPassage;

/// 후속 질문을 독립 질문으로 바꾸는 프롬프트
pub fn build_condense_prompt(history: &[ChatTurn], question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question, in its original language.\n\
         Chat History:\n{}\n\
         Follow Up Input: {}\n\
         Standalone question:",
        format_history(history),
        question
    )
}

/// 답변 생성 프롬프트
///
/// 문맥은 받은 순서(문서 열거 순서, 문서 내 유사도 순서) 그대로 번호를 붙입니다.
pub fn build_answer_prompt(
    question: &str,
    passages: &[RetrievedPassage],
    history: &[ChatTurn],
) -> String {
    let mut prompt = String::from(
        "Answer the query based on the following context. \
         If the context does not contain the answer, say that you don't know.\n\n",
    );

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&format_history(history));
        prompt.push_str("\n\n");
    }

    prompt.push_str("Context:\n");
    for (i, passage) in passages.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, passage.text.trim()));
    }

    prompt.push_str(&format!("\nQuery: {}\nAnswer:", question));
    prompt
}

fn format_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}
