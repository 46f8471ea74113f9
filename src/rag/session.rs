//! 대화 세션
//!
//! 호출자가 소유하고 매 질문마다 명시적으로 넘기는 대화 기록입니다.

use serde::{Deserialize, Serialize};

/// 질문-답변 한 턴
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// 대화 세션
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    history: Vec<ChatTurn>,
    /// 보관할 최대 턴 수 (None이면 무제한)
    max_turns: Option<usize>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// 최근 `max_turns`개 턴만 유지하는 세션
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            history: Vec::new(),
            max_turns: Some(max_turns.max(1)),
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.history.push(ChatTurn {
            question: question.into(),
            answer: answer.into(),
        });

        if let Some(max) = self.max_turns {
            if self.history.len() > max {
                let excess = self.history.len() - max;
                self.history.drain(..excess);
            }
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
