//! 파이프라인 오케스트레이터: 명시적 상태 기계
//!
//! CLASSIFYING → RETRIEVING → SYNTHESIZING → VERIFYING → DONE
//! 검증 실패 시 재시도 예산 안에서:
//! - incompleteness 만 실패 → RETRY→SYNTHESIZING (같은 후보로 재생성)
//! - 그 외 재시도 대상 실패 → RETRY→RETRIEVING (top_k 를 넓혀 재검색)
//!
//! 단계 오류는 caveat 이 붙은 답변으로 강등되며, 호출자에게는 PipelineError 만 전달된다.
//! 재시도 중 생성이 실패하면 직전 답변과 판정, 그 답변의 후보를 그대로 돌려준다.
//! 실행은 서로 상태를 공유하지 않으므로 여러 질문을 동시에 돌릴 수 있다.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::agents::{AnswerSynthesizer, IntentClassifier, KeywordRoleClassifier, Retriever, Verifier};
use crate::config::AppConfig;
use crate::core::error::{ClassificationError, PipelineError, RetrievalError, SynthesisError};
use crate::core::state::{PipelineState, StateTrace};
use crate::core::types::{
    CandidateSet, DraftAnswer, IntentDescriptor, Question, VerificationVerdict, VerifiedAnswer,
};
use crate::index::VectorIndex;
use crate::llm::LlmClient;
use crate::sink::ResultSink;

const NOTE_CLASSIFICATION_FALLBACK: &str =
    "질문 의도를 분석하지 못해 일반 질문으로 처리했습니다.";
const NOTE_RETRIEVAL_FAILED: &str = "문서 검색에 실패하여 참고 문서 없이 답변했습니다.";
const NOTE_NO_REFERENCE: &str = "관련 참고 문서를 찾지 못했습니다.";
const NOTE_SYNTHESIS_FAILED: &str = "답변을 생성하지 못했습니다. 잠시 후 다시 시도하세요.";
const NOTE_RETRY_SYNTHESIS_FAILED: &str = "답변 보완에 실패하여 처음 생성한 답변을 보여드립니다.";
const NOTE_RERETRIEVAL_FAILED: &str = "추가 문서 검색에 실패하여 처음 검색한 문서로 답변했습니다.";

/// 실행 제어 값 (AppConfig 에서 구성)
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub top_k: usize,
    pub top_k_increment: usize,
    pub retry_budget: u32,
    pub classify_timeout: Duration,
    pub retrieve_timeout: Duration,
    pub synthesize_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            top_k: cfg.retrieval.top_k,
            top_k_increment: cfg.retrieval.top_k_increment,
            retry_budget: cfg.verification.retry_budget,
            classify_timeout: cfg.timeouts.classify(),
            retrieve_timeout: cfg.timeouts.retrieve(),
            synthesize_timeout: cfg.timeouts.synthesize(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// 한 번의 실행 결과
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub question: Question,
    pub descriptor: IntentDescriptor,
    pub candidates: CandidateSet,
    pub answer: VerifiedAnswer,
    pub trace: StateTrace,
}

pub struct HandoverPipeline {
    classifier: Arc<IntentClassifier>,
    retriever: Arc<Retriever>,
    synthesizer: Arc<AnswerSynthesizer>,
    verifier: Arc<Verifier>,
    config: PipelineConfig,
    sink: Option<Arc<dyn ResultSink>>,
}

impl HandoverPipeline {
    pub fn new(
        classifier: Arc<IntentClassifier>,
        retriever: Arc<Retriever>,
        synthesizer: Arc<AnswerSynthesizer>,
        verifier: Arc<Verifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            classifier,
            retriever,
            synthesizer,
            verifier,
            config,
            sink: None,
        }
    }

    /// 설정과 협력자(분류용 LLM, 답변용 LLM, 인덱스)로 네 단계를 모두 구성
    pub fn from_config(
        cfg: &AppConfig,
        classifier_llm: Arc<dyn LlmClient>,
        answer_llm: Arc<dyn LlmClient>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let roles = Arc::new(KeywordRoleClassifier::from_config(&cfg.retrieval));
        Self::new(
            Arc::new(IntentClassifier::new(classifier_llm)),
            Arc::new(Retriever::new(index, roles)),
            Arc::new(AnswerSynthesizer::new(answer_llm, cfg.synthesis.clone())),
            Arc::new(Verifier::from_config(&cfg.verification)),
            PipelineConfig::from_app(cfg),
        )
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, question: impl Into<String>) -> Result<PipelineRun, PipelineError> {
        let run = self.execute(Question::new(question)).await?;
        self.persist(&run).await;
        Ok(run)
    }

    /// 토큰이 취소되면 진행 중인 단계를 버리고 Cancelled 반환 (아무것도 저장하지 않음)
    pub async fn run_cancellable(
        &self,
        question: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, PipelineError> {
        let question = Question::new(question);
        let run = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("pipeline run cancelled");
                return Err(PipelineError::Cancelled);
            }
            result = self.execute(question) => result?,
        };
        self.persist(&run).await;
        Ok(run)
    }

    /// 여러 질문을 동시에 실행; 결과는 입력 순서
    pub async fn run_batch(&self, questions: Vec<String>) -> Vec<Result<PipelineRun, PipelineError>> {
        let results = join_all(
            questions
                .into_iter()
                .map(|q| self.execute(Question::new(q))),
        )
        .await;

        if let Some(sink) = &self.sink {
            let runs: Vec<PipelineRun> = results.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();
            for run in &runs {
                if let Err(e) = sink.persist(run).await {
                    tracing::warn!(run_id = %run.run_id, "failed to persist result: {}", e);
                }
            }
            if !runs.is_empty() {
                if let Err(e) = sink.persist_batch(&runs).await {
                    tracing::warn!("failed to persist batch summary: {}", e);
                }
            }
        }
        results
    }

    async fn persist(&self, run: &PipelineRun) {
        let Some(sink) = &self.sink else {
            return;
        };
        match sink.persist(run).await {
            Ok(paths) => tracing::debug!(run_id = %run.run_id, files = paths.len(), "result persisted"),
            Err(e) => tracing::warn!(run_id = %run.run_id, "failed to persist result: {}", e),
        }
    }

    async fn execute(&self, question: Question) -> Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", run_id = %run_id);
        self.execute_inner(run_id, question).instrument(span).await
    }

    async fn execute_inner(&self, run_id: Uuid, question: Question) -> Result<PipelineRun, PipelineError> {
        let mut trace = StateTrace::new();
        let mut notes: Vec<&'static str> = Vec::new();
        tracing::info!(state = %PipelineState::Classifying, "question: {}", question.text);

        // CLASSIFYING
        let classified = timeout(self.config.classify_timeout, self.classifier.classify(&question))
            .await
            .unwrap_or(Err(ClassificationError::Timeout));
        let (descriptor, classification_error) = match classified {
            Ok(descriptor) => (descriptor, None),
            Err(e) => {
                tracing::warn!("classification failed, using fallback intent: {}", e);
                notes.push(NOTE_CLASSIFICATION_FALLBACK);
                (IntentDescriptor::fallback(), Some(e))
            }
        };
        tracing::info!(
            intent = descriptor.category.label(),
            urgency = descriptor.urgency.label(),
            document_type = descriptor.document_type_hint.as_deref().unwrap_or("-"),
            "classified"
        );

        // RETRIEVING
        let mut top_k = self.config.top_k;
        enter(&mut trace, PipelineState::Retrieving)?;
        let mut candidates = match self.retrieve(&descriptor, &question, top_k).await {
            Ok(set) => set,
            Err(e) => {
                if let Some(llm_err) = classification_error.as_ref().filter(|e| e.is_transport()) {
                    tracing::error!("index and LLM both unreachable");
                    return Err(PipelineError::CollaboratorsUnavailable {
                        index: e.to_string(),
                        llm: llm_err.to_string(),
                    });
                }
                tracing::warn!("retrieval failed, continuing without references: {}", e);
                notes.push(NOTE_RETRIEVAL_FAILED);
                CandidateSet::empty()
            }
        };

        let mut retries_left = self.config.retry_budget;
        let mut previous: Option<(DraftAnswer, VerificationVerdict, CandidateSet)> = None;
        let (draft, verdict) = loop {
            // SYNTHESIZING
            enter(&mut trace, PipelineState::Synthesizing)?;
            let synthesized = timeout(
                self.config.synthesize_timeout,
                self.synthesizer.synthesize(&descriptor, &question, &candidates),
            )
            .await
            .unwrap_or(Err(SynthesisError::Timeout));

            // VERIFYING
            let draft = match synthesized {
                Ok(draft) => draft,
                Err(e) => {
                    tracing::warn!("synthesis failed: {}", e);
                    enter(&mut trace, PipelineState::Verifying)?;
                    // 생성 자체가 실패한 경우 재시도하지 않음
                    if let Some((draft, mut verdict, kept)) = previous.take() {
                        notes.push(NOTE_RETRY_SYNTHESIS_FAILED);
                        verdict.retry_recommended = false;
                        candidates = kept;
                        break (draft, verdict);
                    }
                    notes.push(NOTE_SYNTHESIS_FAILED);
                    let draft = failed_draft();
                    let verdict = self.verifier.verify(&draft, &candidates, &descriptor, 0);
                    break (draft, verdict);
                }
            };
            enter(&mut trace, PipelineState::Verifying)?;
            let verdict = self.verifier.verify(&draft, &candidates, &descriptor, retries_left);

            if !verdict.retry_recommended || retries_left == 0 {
                break (draft, verdict);
            }
            retries_left -= 1;
            let retry_synthesis_only = verdict.only_incomplete();
            previous = Some((draft, verdict, candidates.clone()));
            if retry_synthesis_only {
                enter(&mut trace, PipelineState::RetrySynthesizing)?;
            } else {
                enter(&mut trace, PipelineState::RetryRetrieving)?;
                top_k += self.config.top_k_increment;
                enter(&mut trace, PipelineState::Retrieving)?;
                match self.retrieve(&descriptor, &question, top_k).await {
                    Ok(set) => candidates = set,
                    Err(e) => {
                        tracing::warn!("re-retrieval failed, keeping previous candidates: {}", e);
                        notes.push(NOTE_RERETRIEVAL_FAILED);
                    }
                }
            }
        };

        if let Some(id) = draft.citations.iter().find(|id| !candidates.contains_source(id)) {
            tracing::error!("answer cites '{}' which is not among the candidates", id);
            return Err(PipelineError::Verification(format!(
                "citation '{}' is not a retrieved candidate",
                id
            )));
        }

        let caveat = compose_caveat(&notes, &draft, &verdict);
        enter(&mut trace, PipelineState::Done)?;
        tracing::info!(
            passed = verdict.passed,
            retries = trace.retries(),
            citations = draft.citations.len(),
            "run finished"
        );

        Ok(PipelineRun {
            run_id,
            question,
            descriptor,
            candidates,
            answer: VerifiedAnswer {
                draft,
                verdict,
                caveat,
            },
            trace,
        })
    }

    async fn retrieve(
        &self,
        descriptor: &IntentDescriptor,
        question: &Question,
        top_k: usize,
    ) -> Result<CandidateSet, RetrievalError> {
        timeout(
            self.config.retrieve_timeout,
            self.retriever.retrieve(descriptor, &question.text, top_k),
        )
        .await
        .unwrap_or(Err(RetrievalError::Timeout))
    }
}

fn enter(trace: &mut StateTrace, next: PipelineState) -> Result<(), PipelineError> {
    let from = trace.current();
    if !trace.advance(next) {
        return Err(PipelineError::Verification(format!(
            "illegal state transition {} -> {}",
            from, next
        )));
    }
    tracing::info!(state = %next, "state transition from {}", from);
    Ok(())
}

fn failed_draft() -> DraftAnswer {
    DraftAnswer {
        summary: NOTE_SYNTHESIS_FAILED.to_string(),
        ..Default::default()
    }
}

/// 강등 사유와 실패한 검사 설명을 합침; 깨끗한 통과면 빈 문자열
fn compose_caveat(notes: &[&str], draft: &DraftAnswer, verdict: &VerificationVerdict) -> String {
    let mut lines: Vec<&str> = notes.to_vec();
    if draft.no_reference && !lines.contains(&NOTE_NO_REFERENCE) {
        lines.push(NOTE_NO_REFERENCE);
    }
    lines.dedup();
    lines.extend(verdict.failed_checks.iter().map(|c| c.describe()));
    lines.extend(verdict.warnings.iter().map(String::as_str));
    lines.join("\n")
}
