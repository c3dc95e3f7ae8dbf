//! 파이프라인 단계: 질문 분석 → 문서 검색 → 답변 생성 → 검증

pub mod intent;
pub mod retriever;
pub mod synthesizer;
pub mod verifier;

pub use intent::IntentClassifier;
pub use retriever::{KeywordRoleClassifier, RoleClassifier, Retriever};
pub use synthesizer::AnswerSynthesizer;
pub use verifier::Verifier;
