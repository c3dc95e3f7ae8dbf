//! 파이프라인 조립: 설정에서 LLM / 임베더 / 인덱스 / 싱크를 만들어 HandoverPipeline 구성
//!
//! CLI(main.rs)와 통합 테스트가 같은 경로로 파이프라인을 만든다.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::HandoverPipeline;
use crate::index::InMemoryIndex;
use crate::llm::{
    create_embedder_from_config, create_upstage_client, upstage::upstage_api_key, LlmClient,
    MockLlmClient, OpenAiClient,
};
use crate::sink::FileSink;

/// 설정과 환경 변수로 LLM 백엔드 선택 (Upstage / OpenAI 호환 / Mock)
///
/// provider 가 mock 이거나 API 키가 없으면 Mock 으로 대체한다.
pub fn create_llm_from_config(cfg: &AppConfig, model: &str, temperature: f32) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "upstage" if upstage_api_key().is_some() => {
            tracing::info!("Using Upstage LLM ({})", model);
            let client = match cfg.llm.base_url.as_deref() {
                Some(base) => OpenAiClient::new(Some(base), model, upstage_api_key().as_deref()),
                None => create_upstage_client(Some(model)),
            };
            Arc::new(client.with_temperature(temperature))
        }
        "openai" if std::env::var("OPENAI_API_KEY").is_ok() => {
            tracing::info!("Using OpenAI-compatible LLM ({})", model);
            Arc::new(
                OpenAiClient::new(
                    cfg.llm.base_url.as_deref(),
                    model,
                    std::env::var("OPENAI_API_KEY").ok().as_deref(),
                )
                .with_temperature(temperature),
            )
        }
        "mock" => Arc::new(MockLlmClient),
        _ => {
            tracing::warn!("No API key set or provider '{}' unknown, using Mock LLM", provider);
            Arc::new(MockLlmClient)
        }
    }
}

/// 설정 전체로 파이프라인 구성: 인덱스 스냅샷 로드 포함
///
/// 분류기는 temperature 0 의 가벼운 모델, 답변 생성은 기본 모델을 쓴다.
pub async fn build_pipeline(cfg: &AppConfig) -> anyhow::Result<HandoverPipeline> {
    let classifier_llm = create_llm_from_config(cfg, &cfg.llm.classifier_model, 0.0);
    let answer_llm = create_llm_from_config(cfg, &cfg.llm.model, cfg.llm.temperature);

    let embedder = create_embedder_from_config(
        &cfg.llm.provider.to_lowercase(),
        cfg.llm.base_url.as_deref(),
        &cfg.llm.embedding_model,
    );
    let index = InMemoryIndex::load_snapshot(embedder, &cfg.retrieval.index_path).await?;
    if index.is_empty() {
        tracing::warn!("vector index is empty, every answer will have no references");
    }

    let mut pipeline = HandoverPipeline::from_config(cfg, classifier_llm, answer_llm, Arc::new(index));
    if cfg.app.save_results {
        pipeline = pipeline.with_sink(Arc::new(FileSink::new(cfg.app.output_dir.clone())));
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_pipeline_with_mock_and_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg.app.save_results = false;
        cfg.retrieval.index_path = dir.path().join("none.json");

        let pipeline = build_pipeline(&cfg).await.unwrap();
        let run = pipeline.run("출장신청서 양식 어디 있나요?").await.unwrap();
        assert!(run.answer.draft.no_reference);
    }
}
