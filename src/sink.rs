//! 결과 저장: 실행이 DONE 에 도달한 뒤에만 호출된다
//!
//! FileSink 는 실행마다 handover_<시각>_<run_id 앞 8자>.{txt,json,md} 를,
//! 배치 실행이면 all_results_<시각>.{txt,json} 을 추가로 쓴다.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::orchestrator::PipelineRun;
use crate::core::types::Check;
use crate::display::{render_answer, render_markdown};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to write result: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 영속화용 평탄화 레코드 (json 파일 형식)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub intent: String,
    pub urgency: String,
    pub document_type: Option<String>,
    pub summary: String,
    pub detail: Vec<String>,
    pub tips: Vec<String>,
    pub citations: Vec<String>,
    pub confidence: f32,
    pub no_reference: bool,
    pub passed: bool,
    pub failed_checks: Vec<Check>,
    pub caveat: String,
    pub states: Vec<String>,
    pub sources: Vec<SourceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub role: String,
    pub score: f32,
}

impl From<&PipelineRun> for RunRecord {
    fn from(run: &PipelineRun) -> Self {
        let draft = &run.answer.draft;
        Self {
            run_id: run.run_id.to_string(),
            timestamp: run.question.asked_at,
            question: run.question.text.clone(),
            intent: run.descriptor.category.label().to_string(),
            urgency: run.descriptor.urgency.label().to_string(),
            document_type: run.descriptor.document_type_hint.clone(),
            summary: draft.summary.clone(),
            detail: draft.detail.clone(),
            tips: draft.tips.clone(),
            citations: draft.citations.clone(),
            confidence: draft.confidence,
            no_reference: draft.no_reference,
            passed: run.answer.verdict.passed,
            failed_checks: run.answer.verdict.failed_checks.iter().copied().collect(),
            caveat: run.answer.caveat.clone(),
            states: run.trace.states().iter().map(|s| s.to_string()).collect(),
            sources: run
                .candidates
                .iter()
                .map(|c| SourceRecord {
                    id: c.source_document_id.clone(),
                    role: c.role.label().to_string(),
                    score: c.similarity_score,
                })
                .collect(),
        }
    }
}

/// 완료된 실행을 받아 저장하는 싱크; 실패해도 답변은 유효하다
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// 저장한 파일 경로 반환
    async fn persist(&self, run: &PipelineRun) -> Result<Vec<PathBuf>, SinkError>;

    /// 배치 요약 (기본: 아무것도 하지 않음)
    async fn persist_batch(&self, _runs: &[PipelineRun]) -> Result<Vec<PathBuf>, SinkError> {
        Ok(Vec::new())
    }
}

pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn write(&self, name: String, contents: String) -> Result<PathBuf, SinkError> {
        let path = self.output_dir.join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

#[async_trait]
impl ResultSink for FileSink {
    async fn persist(&self, run: &PipelineRun) -> Result<Vec<PathBuf>, SinkError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let id = run.run_id.simple().to_string();
        let stem = format!("handover_{}_{}", timestamp(), &id[..8]);

        let text = format!(
            "질문: {}\n의도: {} / 긴급도: {}\n{}\n{}\n",
            run.question.text,
            run.descriptor.category.label(),
            run.descriptor.urgency.label(),
            "=".repeat(60),
            render_answer(run)
        );
        let json = serde_json::to_string_pretty(&RunRecord::from(run))?;

        let paths = vec![
            self.write(format!("{stem}.txt"), text).await?,
            self.write(format!("{stem}.json"), json).await?,
            self.write(format!("{stem}.md"), render_markdown(run)).await?,
        ];
        tracing::info!("result saved to {}", self.output_dir.join(&stem).display());
        Ok(paths)
    }

    async fn persist_batch(&self, runs: &[PipelineRun]) -> Result<Vec<PathBuf>, SinkError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let stem = format!("all_results_{}", timestamp());

        let records: Vec<RunRecord> = runs.iter().map(RunRecord::from).collect();
        let json = serde_json::to_string_pretty(&records)?;
        let text = runs
            .iter()
            .enumerate()
            .map(|(i, run)| format!("[{}] 질문: {}\n{}\n{}", i + 1, run.question.text, "-".repeat(60), render_answer(run)))
            .collect::<Vec<_>>()
            .join(&format!("\n\n{}\n\n", "=".repeat(60)));

        let paths = vec![
            self.write(format!("{stem}.txt"), text).await?,
            self.write(format!("{stem}.json"), json).await?,
        ];
        tracing::info!("batch results ({} runs) saved to {}", runs.len(), self.output_dir.display());
        Ok(paths)
    }
}
