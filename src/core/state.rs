//! 파이프라인 상태 정의
//!
//! CLASSIFYING → RETRIEVING → SYNTHESIZING → VERIFYING → {DONE, RETRY→SYNTHESIZING, RETRY→RETRIEVING}

use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Classifying,
    Retrieving,
    Synthesizing,
    Verifying,
    /// 같은 후보로 다시 생성
    RetrySynthesizing,
    /// top_k 를 넓혀 다시 검색
    RetryRetrieving,
    Done,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done)
    }

    pub fn is_retry(&self) -> bool {
        matches!(
            self,
            PipelineState::RetrySynthesizing | PipelineState::RetryRetrieving
        )
    }

    /// 허용된 전이인지
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Classifying, Retrieving)
                | (Retrieving, Synthesizing)
                | (Synthesizing, Verifying)
                | (Verifying, Done)
                | (Verifying, RetrySynthesizing)
                | (Verifying, RetryRetrieving)
                | (RetrySynthesizing, Synthesizing)
                | (RetryRetrieving, Retrieving)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Classifying => "CLASSIFYING",
            PipelineState::Retrieving => "RETRIEVING",
            PipelineState::Synthesizing => "SYNTHESIZING",
            PipelineState::Verifying => "VERIFYING",
            PipelineState::RetrySynthesizing => "RETRY→SYNTHESIZING",
            PipelineState::RetryRetrieving => "RETRY→RETRIEVING",
            PipelineState::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// 한 실행 동안 거친 상태 기록
#[derive(Clone, Debug, Serialize)]
pub struct StateTrace {
    states: Vec<PipelineState>,
}

impl StateTrace {
    pub fn new() -> Self {
        Self {
            states: vec![PipelineState::Classifying],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Classifying)
    }

    /// 전이를 기록; 허용되지 않은 전이는 false
    pub fn advance(&mut self, next: PipelineState) -> bool {
        if !self.current().can_transition_to(next) {
            return false;
        }
        self.states.push(next);
        true
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn count(&self, state: PipelineState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }

    pub fn retries(&self) -> usize {
        self.states.iter().filter(|s| s.is_retry()).count()
    }
}

impl Default for StateTrace {
    fn default() -> Self {
        Self::new()
    }
}
