//! 파이프라인 통합 테스트: 상태 전이, 재시도, 강등, 취소, 배치

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use handover::config::AppConfig;
use handover::core::{
    Check, DocMetadata, HandoverPipeline, PipelineConfig, PipelineError, PipelineRun,
    PipelineState, Urgency,
};
use handover::index::{IndexError, IndexHit, InMemoryIndex, IndexDocument, VectorIndex};
use handover::llm::{KeywordEmbedder, LlmClient, LlmError, Message, MockLlmClient, Role};
use handover::sink::{FileSink, ResultSink, SinkError};
use tokio_util::sync::CancellationToken;

const FULL_ANSWER: &str = "📌 요약:\n출장신청서 양식 [1] 을 사용합니다.\n\n📝 상세 설명:\n1. 양식 파일을 내려받습니다.\n2. 출장지와 기간을 적습니다.\n\n💡 작성 팁 및 주의사항:\n- 3일 전까지 제출하세요.\n\n📚 출처: [1]";
const NO_TIPS_ANSWER: &str = "📌 요약:\n출장신청서 양식 [1] 을 사용합니다.\n\n📝 상세 설명:\n1. 양식 파일을 내려받습니다.\n\n📚 출처: [1]";

/// 고정 결과를 돌려주는 인덱스; 요청된 k 를 기록
struct FakeIndex {
    hits: Vec<IndexHit>,
    requested: Mutex<Vec<usize>>,
}

impl FakeIndex {
    fn new(hits: Vec<IndexHit>) -> Arc<Self> {
        Arc::new(Self {
            hits,
            requested: Mutex::new(Vec::new()),
        })
    }

    fn requested(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn query(&self, _text: &str, k: usize) -> Result<Vec<IndexHit>, IndexError> {
        self.requested.lock().unwrap().push(k);
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

/// 첫 검색만 성공하고 이후로는 연결 오류
struct FlakyIndex {
    hits: Vec<IndexHit>,
    queries: AtomicUsize,
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn query(&self, _text: &str, k: usize) -> Result<Vec<IndexHit>, IndexError> {
        if self.queries.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(self.hits.iter().take(k).cloned().collect())
        } else {
            Err(IndexError::Unavailable("connection reset".into()))
        }
    }
}

struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn query(&self, _text: &str, _k: usize) -> Result<Vec<IndexHit>, IndexError> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
}

/// 준비된 응답을 순서대로 반환; 마지막 응답은 계속 반복
struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().ok_or(LlmError::EmptyResponse)
        } else {
            replies.front().cloned().ok_or(LlmError::EmptyResponse)
        }
    }
}

/// 고정 응답을 돌려주며 매 호출의 user 프롬프트를 기록
struct PromptRecordingLlm {
    reply: &'static str,
    prompts: Mutex<Vec<String>>,
}

impl PromptRecordingLlm {
    fn new(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// 각 프롬프트에 번호가 매겨진 참고 문서 수
    fn context_sizes(&self) -> Vec<usize> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.lines().filter(|l| l.starts_with('[') && l.contains("] 출처:")).count())
            .collect()
    }
}

#[async_trait]
impl LlmClient for PromptRecordingLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Some(user) = messages.iter().rev().find(|m| m.role == Role::User) {
            self.prompts.lock().unwrap().push(user.content.clone());
        }
        Ok(self.reply.to_string())
    }
}

/// 준비된 응답을 다 쓰면 제한 시간보다 오래 멈춤
struct StallingLlm {
    replies: Mutex<VecDeque<String>>,
}

impl StallingLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl LlmClient for StallingLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => Ok(reply),
            None => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(LlmError::EmptyResponse)
            }
        }
    }
}

struct FailingLlm(LlmError);

#[async_trait]
impl LlmClient for FailingLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Err(self.0.clone())
    }
}

struct SlowLlm;

#[async_trait]
impl LlmClient for SlowLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(FULL_ANSWER.to_string())
    }
}

#[derive(Default)]
struct RecordingSink {
    persisted: AtomicUsize,
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn persist(&self, _run: &PipelineRun) -> Result<Vec<PathBuf>, SinkError> {
        self.persisted.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

fn hit(id: &str, days_old: i64) -> IndexHit {
    IndexHit {
        document_id: id.to_string(),
        excerpt: format!("{id} 본문: 출장지, 출장기간, 출장목적"),
        score: 0.82,
        metadata: DocMetadata {
            last_modified: Some(Utc::now() - chrono::Duration::days(days_old)),
            doc_type: Some("출장신청서".into()),
        },
    }
}

fn pipeline(
    classifier: Arc<dyn LlmClient>,
    answer: Arc<dyn LlmClient>,
    index: Arc<dyn VectorIndex>,
) -> HandoverPipeline {
    HandoverPipeline::from_config(&AppConfig::default(), classifier, answer, index)
}

fn assert_citations_within_candidates(run: &PipelineRun) {
    for id in &run.answer.draft.citations {
        assert!(run.candidates.contains_source(id), "citation {id} not a candidate");
    }
}

#[tokio::test]
async fn fresh_template_passes_cleanly() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    let run = pipeline(Arc::new(MockLlmClient), Arc::new(MockLlmClient), index)
        .run("출장신청서 어떻게 작성하나요?")
        .await
        .unwrap();

    assert_eq!(run.descriptor.document_type_hint.as_deref(), Some("출장신청서"));
    assert!(run.answer.verdict.passed);
    assert!(run.answer.verdict.failed_checks.is_empty());
    assert!(run.answer.caveat.is_empty());
    assert!(run.answer.is_clean());
    assert_eq!(run.answer.draft.citations, vec!["출장신청서_양식.docx"]);
    assert_eq!(
        run.trace.states(),
        &[
            PipelineState::Classifying,
            PipelineState::Retrieving,
            PipelineState::Synthesizing,
            PipelineState::Verifying,
            PipelineState::Done,
        ]
    );
}

#[tokio::test]
async fn stale_only_candidate_flags_staleness_without_retry() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 800)]);
    let run = pipeline(Arc::new(MockLlmClient), Arc::new(MockLlmClient), index.clone())
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    let verdict = &run.answer.verdict;
    assert!(!verdict.passed);
    assert_eq!(verdict.failed_checks.iter().copied().collect::<Vec<_>>(), vec![Check::Staleness]);
    assert!(!verdict.retry_recommended);
    assert_eq!(run.trace.retries(), 0);
    assert_eq!(index.requested().len(), 1);
    assert!(run.answer.caveat.contains("staleness"));
    assert_eq!(run.trace.current(), PipelineState::Done);
}

#[tokio::test]
async fn missing_tips_resynthesizes_once_with_same_candidates() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    // 첫 생성: 본 응답 + 형식 보정 응답 모두 팁 누락, 재생성: 완전한 응답
    let answer = ScriptedLlm::new(&[NO_TIPS_ANSWER, NO_TIPS_ANSWER, FULL_ANSWER]);
    let run = pipeline(Arc::new(MockLlmClient), answer.clone(), index.clone())
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(run.trace.count(PipelineState::RetrySynthesizing), 1);
    assert_eq!(run.trace.count(PipelineState::RetryRetrieving), 0);
    assert_eq!(run.trace.current(), PipelineState::Done);
    assert_eq!(index.requested().len(), 1);
    assert_eq!(answer.calls(), 3);
    assert!(run.answer.verdict.passed);
    assert!(!run.answer.draft.tips.is_empty());
}

#[tokio::test]
async fn retry_budget_exhausted_ends_with_caveat() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    let answer = ScriptedLlm::new(&[NO_TIPS_ANSWER]);
    let run = pipeline(Arc::new(MockLlmClient), answer, index)
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(run.trace.retries(), 1);
    assert_eq!(run.trace.current(), PipelineState::Done);
    assert!(run.answer.verdict.failed_checks.contains(&Check::Incompleteness));
    assert!(!run.answer.verdict.retry_recommended);
    assert!(run.answer.caveat.contains("incompleteness"));
}

#[tokio::test]
async fn high_urgency_uses_same_retry_budget() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    let urgent = pipeline(Arc::new(MockLlmClient), ScriptedLlm::new(&[NO_TIPS_ANSWER]), index.clone())
        .run("출장신청서 양식 급해요")
        .await
        .unwrap();
    let normal = pipeline(Arc::new(MockLlmClient), ScriptedLlm::new(&[NO_TIPS_ANSWER]), index)
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(urgent.descriptor.urgency, Urgency::High);
    assert_eq!(normal.descriptor.urgency, Urgency::Normal);
    assert_eq!(urgent.trace.retries(), 1);
    assert_eq!(urgent.trace.retries(), normal.trace.retries());
}

#[tokio::test]
async fn intent_mismatch_widens_retrieval() {
    let hits: Vec<IndexHit> = (0..20).map(|i| hit(&format!("문서{i}.pdf"), 30)).collect();
    let index = FakeIndex::new(hits);
    // 담당자 질문인데 답변에 담당/연락처/부서/내선 신호어가 없음
    let answer = ScriptedLlm::new(&[FULL_ANSWER]);
    let run = pipeline(Arc::new(MockLlmClient), answer, index.clone())
        .run("예산 담당자 누구야?")
        .await
        .unwrap();

    assert_eq!(run.trace.count(PipelineState::RetryRetrieving), 1);
    assert_eq!(index.requested(), vec![10, 16]);
    assert_eq!(run.candidates.len(), 8);
    assert!(run.answer.verdict.failed_checks.contains(&Check::IntentMismatch));
    assert!(run.answer.caveat.contains("intent_mismatch"));
    assert_citations_within_candidates(&run);
}

#[tokio::test]
async fn widened_retrieval_widens_the_prompt() {
    let hits: Vec<IndexHit> = (0..20).map(|i| hit(&format!("문서{i}.pdf"), 30)).collect();
    let answer = PromptRecordingLlm::new(FULL_ANSWER);
    let run = pipeline(Arc::new(MockLlmClient), answer.clone(), FakeIndex::new(hits))
        .run("예산 담당자 누구야?")
        .await
        .unwrap();

    assert_eq!(run.trace.count(PipelineState::RetryRetrieving), 1);
    assert_eq!(answer.context_sizes(), vec![5, 8]);
    assert!((run.answer.draft.confidence - 1.0 / 8.0).abs() < 1e-6);
}

#[tokio::test]
async fn failed_reretrieval_keeps_candidates_and_says_so() {
    let index = Arc::new(FlakyIndex {
        hits: (0..20).map(|i| hit(&format!("문서{i}.pdf"), 30)).collect(),
        queries: AtomicUsize::new(0),
    });
    let run = pipeline(Arc::new(MockLlmClient), ScriptedLlm::new(&[FULL_ANSWER]), index)
        .run("예산 담당자 누구야?")
        .await
        .unwrap();

    assert_eq!(run.trace.count(PipelineState::RetryRetrieving), 1);
    assert_eq!(run.trace.current(), PipelineState::Done);
    assert_eq!(run.candidates.len(), 5);
    assert!(run.answer.caveat.contains("추가 문서 검색에 실패"));
    assert!(run.answer.caveat.contains("intent_mismatch"));
}

#[tokio::test]
async fn empty_index_yields_no_reference_answer() {
    let answer = ScriptedLlm::new(&[FULL_ANSWER]);
    let run = pipeline(Arc::new(MockLlmClient), answer.clone(), FakeIndex::new(vec![]))
        .run("asdfqwer")
        .await
        .unwrap();

    assert_eq!(run.trace.current(), PipelineState::Done);
    assert!(run.answer.draft.no_reference);
    assert!(run.answer.draft.citations.is_empty());
    assert_eq!(run.answer.draft.confidence, 0.0);
    assert!(run.answer.caveat.contains("관련 참고 문서를 찾지 못했습니다"));
    assert_eq!(answer.calls(), 0);
}

#[tokio::test]
async fn citations_outside_candidates_are_dropped() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30), hit("출장_규정.pdf", 30)]);
    let answer = ScriptedLlm::new(&[
        "📌 요약:\n양식 [1] 과 없는문서.pdf [7] 참고\n📝 상세 설명:\n1. 양식 작성\n💡 작성 팁 및 주의사항:\n- 기한 확인\n📚 출처: [1], [7]",
    ]);
    let run = pipeline(Arc::new(MockLlmClient), answer, index)
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(run.answer.draft.citations, vec!["출장신청서_양식.docx"]);
    assert_citations_within_candidates(&run);
}

#[tokio::test]
async fn overlapping_source_names_do_not_add_phantom_citations() {
    let index = FakeIndex::new(vec![hit("출장_규정.pdf", 30), hit("규정.pdf", 2000)]);
    let answer = ScriptedLlm::new(&[
        "📌 요약:\n출장 규정에 따라 양식을 작성합니다.\n📝 상세 설명:\n1. 양식 작성\n💡 작성 팁 및 주의사항:\n- 기한 확인\n📚 출처: 출장_규정.pdf",
    ]);
    let run = pipeline(Arc::new(MockLlmClient), answer, index)
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(run.answer.draft.citations, vec!["출장_규정.pdf"]);
    assert!((run.answer.draft.confidence - 0.5).abs() < 1e-6);
    assert!(!run.answer.verdict.failed_checks.contains(&Check::Staleness));
}

#[tokio::test]
async fn classification_failure_falls_back_to_general() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    let classifier = ScriptedLlm::new(&["분류할 수 없습니다"]);
    let run = pipeline(classifier, Arc::new(MockLlmClient), index)
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(run.descriptor.category.label(), "일반_질문");
    assert!(run.answer.verdict.passed);
    assert!(run.answer.caveat.contains("일반 질문으로 처리"));
    assert!(!run.answer.is_clean());
}

#[tokio::test]
async fn retrieval_failure_degrades_to_no_reference() {
    let run = pipeline(Arc::new(MockLlmClient), Arc::new(MockLlmClient), Arc::new(DownIndex))
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert!(run.answer.draft.no_reference);
    assert!(run.answer.caveat.contains("문서 검색에 실패"));
    assert_eq!(run.trace.current(), PipelineState::Done);
}

#[tokio::test]
async fn index_and_llm_unreachable_is_fatal() {
    let err = pipeline(
        Arc::new(FailingLlm(LlmError::Transport("connection refused".into()))),
        Arc::new(MockLlmClient),
        Arc::new(DownIndex),
    )
    .run("출장신청서 양식 어디 있나요?")
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::CollaboratorsUnavailable { .. }));
}

#[tokio::test]
async fn synthesis_timeout_becomes_caveat() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    let config = PipelineConfig {
        synthesize_timeout: Duration::from_millis(50),
        ..PipelineConfig::default()
    };
    let run = pipeline(Arc::new(MockLlmClient), Arc::new(SlowLlm), index)
        .with_config(config)
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(run.trace.current(), PipelineState::Done);
    assert_eq!(run.trace.retries(), 0);
    assert!(run.answer.caveat.contains("답변을 생성하지 못했습니다"));
    assert!(!run.answer.verdict.passed);
}

#[tokio::test]
async fn failed_resynthesis_keeps_first_answer() {
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    let config = PipelineConfig {
        synthesize_timeout: Duration::from_millis(200),
        ..PipelineConfig::default()
    };
    // 첫 생성(본 응답 + 형식 보정)은 팁 누락, 재생성은 시간 초과
    let answer = StallingLlm::new(&[NO_TIPS_ANSWER, NO_TIPS_ANSWER]);
    let run = pipeline(Arc::new(MockLlmClient), answer, index)
        .with_config(config)
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();

    assert_eq!(run.trace.count(PipelineState::RetrySynthesizing), 1);
    assert_eq!(run.trace.current(), PipelineState::Done);
    assert_eq!(run.answer.draft.summary, "출장신청서 양식 [1] 을 사용합니다.");
    assert_eq!(run.answer.draft.citations, vec!["출장신청서_양식.docx"]);
    assert!(run.answer.verdict.failed_checks.contains(&Check::Incompleteness));
    assert!(!run.answer.verdict.retry_recommended);
    assert!(run.answer.caveat.contains("답변 보완에 실패"));
    assert!(run.answer.caveat.contains("incompleteness"));
    assert!(!run.answer.caveat.contains("답변을 생성하지 못했습니다"));
}

#[tokio::test]
async fn cancelled_run_persists_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    let pipeline = pipeline(Arc::new(SlowLlm), Arc::new(SlowLlm), index).with_sink(sink.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = pipeline
        .run_cancellable("출장신청서 양식 어디 있나요?", cancel)
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::Cancelled);
    assert_eq!(sink.persisted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn completed_run_is_persisted_once() {
    let sink = Arc::new(RecordingSink::default());
    let index = FakeIndex::new(vec![hit("출장신청서_양식.docx", 30)]);
    pipeline(Arc::new(MockLlmClient), Arc::new(MockLlmClient), index)
        .with_sink(sink.clone())
        .run("출장신청서 양식 어디 있나요?")
        .await
        .unwrap();
    assert_eq!(sink.persisted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_runs_are_independent_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let docs = vec![
        IndexDocument {
            id: "출장신청서_양식.docx".into(),
            text: "출장신청서 양식. 출장지, 출장기간, 출장목적, 예상 경비를 기재".into(),
            doc_type: Some("출장신청서".into()),
            last_modified: Some(Utc::now() - chrono::Duration::days(10)),
            embedding: None,
        },
        IndexDocument {
            id: "예산집행_절차_안내.pdf".into(),
            text: "예산 집행 절차: 품의서 작성, 부서장 결재, 재무팀 검토. 예산 담당 내선 2314".into(),
            doc_type: Some("업무매뉴얼".into()),
            last_modified: Some(Utc::now() - chrono::Duration::days(10)),
            embedding: None,
        },
    ];
    let index = InMemoryIndex::from_documents(Arc::new(KeywordEmbedder::default()), docs)
        .await
        .unwrap();
    let pipeline = pipeline(Arc::new(MockLlmClient), Arc::new(MockLlmClient), Arc::new(index))
        .with_sink(Arc::new(FileSink::new(dir.path())));

    let questions = vec![
        "출장신청서 양식 어디 있나요?".to_string(),
        "예산 집행 절차 알려주세요".to_string(),
        "lorem ipsum".to_string(),
    ];
    let results = pipeline.run_batch(questions.clone()).await;
    assert_eq!(results.len(), 3);

    let runs: Vec<PipelineRun> = results.into_iter().map(|r| r.unwrap()).collect();
    for (run, question) in runs.iter().zip(&questions) {
        assert_eq!(&run.question.text, question);
        assert_eq!(run.trace.current(), PipelineState::Done);
        assert_citations_within_candidates(run);
    }
    assert_ne!(runs[0].run_id, runs[1].run_id);
    assert_eq!(runs[0].answer.draft.citations.first().map(String::as_str), Some("출장신청서_양식.docx"));
    assert!(runs[2].answer.draft.no_reference);

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().any(|n| n.starts_with("all_results_") && n.ends_with(".json")));
    assert_eq!(names.iter().filter(|n| n.starts_with("handover_") && n.ends_with(".md")).count(), 3);
}
