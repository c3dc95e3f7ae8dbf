//! Handover - 공공기관 인수인계 질의응답 Agent
//!
//! 모듈 구성:
//! - **agent**: 설정으로 파이프라인 조립 (LLM 백엔드 선택, 인덱스 로드, 싱크)
//! - **agents**: 파이프라인 단계 (질문 분석 / 문서 검색 / 답변 생성 / 검증)
//! - **config**: 설정 로드 (TOML + 환경 변수)
//! - **core**: 값 객체, 오류, 상태 기계, 오케스트레이터
//! - **display**: 답변 출력 형식
//! - **index**: 벡터 인덱스 추상화와 메모리 구현
//! - **llm**: LLM / 임베딩 클라이언트 (Upstage / OpenAI 호환 / Mock)
//! - **sink**: 결과 저장 (txt / json / md)

pub mod agent;
pub mod agents;
pub mod config;
pub mod core;
pub mod display;
pub mod index;
pub mod llm;
pub mod observability;
pub mod sink;

pub use agent::build_pipeline;
pub use crate::core::{HandoverPipeline, PipelineError, PipelineRun};
