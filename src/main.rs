//! Handover - 공공기관 인수인계 AI Agent
//!
//! 사용법:
//!   handover                         대화형 모드 (quit / exit / q / 종료 / 끝 으로 종료)
//!   handover "질문1" "질문2" ...      배치 모드 (동시 실행 후 all_results_* 저장)
//!   handover --config my.toml ...    추가 설정 파일
//!
//! 대화형 모드에서 Ctrl-C 는 진행 중인 질문만 취소한다.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use handover::config::{load_config, AppConfig};
use handover::display::render_answer;
use handover::{build_pipeline, observability, HandoverPipeline, PipelineError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let (config_path, questions) = parse_args(std::env::args().skip(1));
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let pipeline = build_pipeline(&cfg)
        .await
        .context("Failed to build pipeline")?;

    if questions.is_empty() {
        interactive(&pipeline, &cfg).await
    } else {
        batch(&pipeline, questions).await;
        Ok(())
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> (Option<PathBuf>, Vec<String>) {
    let mut config_path = None;
    let mut questions = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            config_path = args.next().map(PathBuf::from);
        } else if !arg.trim().is_empty() {
            questions.push(arg);
        }
    }
    (config_path, questions)
}

async fn interactive(pipeline: &HandoverPipeline, cfg: &AppConfig) -> anyhow::Result<()> {
    println!("{}", "=".repeat(60));
    println!("{}", cfg.app.name);
    println!("질문을 입력하세요. 종료: {}", cfg.app.exit_commands.join(", "));
    println!("{}", "=".repeat(60));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n질문> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if cfg
            .app
            .exit_commands
            .iter()
            .any(|c| c.eq_ignore_ascii_case(question))
        {
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let result = pipeline.run_cancellable(question, cancel).await;
        watcher.abort();

        match result {
            Ok(run) => println!("\n{}", render_answer(&run)),
            Err(PipelineError::Cancelled) => println!("\n(질문 처리를 취소했습니다)"),
            Err(e) => eprintln!("\n오류: {}", e),
        }
    }
    println!("종료합니다.");
    Ok(())
}

async fn batch(pipeline: &HandoverPipeline, questions: Vec<String>) {
    let results = pipeline.run_batch(questions.clone()).await;
    for (i, (question, result)) in questions.iter().zip(results).enumerate() {
        println!("\n[{}] 질문: {}\n{}", i + 1, question, "-".repeat(60));
        match result {
            Ok(run) => println!("{}", render_answer(&run)),
            Err(e) => eprintln!("오류: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = ["--config", "x.toml", "질문1", " ", "질문2"].map(String::from);
        let (path, questions) = parse_args(args.into_iter());
        assert_eq!(path, Some(PathBuf::from("x.toml")));
        assert_eq!(questions, vec!["질문1", "질문2"]);
    }
}
