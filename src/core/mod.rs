//! 핵심 계층: 값 객체, 오류, 상태 기계, 오케스트레이터

pub mod error;
pub mod orchestrator;
pub mod state;
pub mod types;

pub use error::{ClassificationError, PipelineError, RetrievalError, SynthesisError};
pub use orchestrator::{HandoverPipeline, PipelineConfig, PipelineRun};
pub use state::{PipelineState, StateTrace};
pub use types::{
    Candidate, CandidateRole, CandidateSet, Check, DocMetadata, DraftAnswer, IntentCategory,
    IntentDescriptor, Question, Urgency, VerificationVerdict, VerifiedAnswer,
};
