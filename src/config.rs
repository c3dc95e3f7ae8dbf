//! 애플리케이션 설정: config/default.toml 과 환경 변수에서 로드
//!
//! 로드 순서: TOML 파일을 먼저 읽고, 환경 변수 `HANDOVER__*` 로 덮어씀
//! (이중 밑줄은 중첩 키, 예: `HANDOVER__LLM__PROVIDER=openai`).
//! 검증 임계값과 키워드 휴리스틱은 모두 여기서 조정한다.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 설정 루트 (config/default.toml 최상위)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub retrieval: RetrievalSection,
    pub synthesis: SynthesisSection,
    pub verification: VerificationSection,
    pub timeouts: TimeoutsSection,
}

/// [app] 섹션: 결과 저장 위치, 종료 명령어
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub output_dir: PathBuf,
    /// 답변마다 txt / json / md 로 저장할지 여부
    pub save_results: bool,
    pub exit_commands: Vec<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "공공기관 인수인계 AI Agent".to_string(),
            output_dir: PathBuf::from("results"),
            save_results: true,
            exit_commands: vec![
                "quit".into(),
                "exit".into(),
                "q".into(),
                "종료".into(),
                "끝".into(),
            ],
        }
    }
}

/// [llm] 섹션: 백엔드 선택과 모델명
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// upstage / openai / mock
    pub provider: String,
    /// 답변 생성용 모델
    pub model: String,
    /// 질문 분류용 (가볍고 temperature 0)
    pub classifier_model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub embedding_model: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "upstage".to_string(),
            model: "solar-pro".to_string(),
            classifier_model: "solar-1-mini-chat".to_string(),
            base_url: None,
            temperature: 0.3,
            embedding_model: "solar-embedding-1-large".to_string(),
        }
    }
}

/// [retrieval] 섹션: top-k, 재시도 시 확장 폭, 역할 분류 표지어
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
    /// RETRY→RETRIEVING 때마다 top_k 에 더하는 값
    pub top_k_increment: usize,
    /// 인덱스 스냅샷(JSON) 경로
    pub index_path: PathBuf,
    pub template_markers: Vec<String>,
    pub example_markers: Vec<String>,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: 5,
            top_k_increment: 3,
            index_path: PathBuf::from("data/index.json"),
            template_markers: vec![
                "템플릿".into(),
                "양식".into(),
                "서식".into(),
                "template".into(),
            ],
            example_markers: vec![
                "예시".into(),
                "사례".into(),
                "작성례".into(),
                "example".into(),
            ],
        }
    }
}

/// [synthesis] 섹션: 프롬프트에 넣는 문서 발췌 길이 (문서 수는 retrieval.top_k 가 정함)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisSection {
    pub max_excerpt_chars: usize,
}

impl Default for SynthesisSection {
    fn default() -> Self {
        Self {
            max_excerpt_chars: 500,
        }
    }
}

/// [verification] 섹션: 최신성 기준, 재시도 예산, 의도별 신호어
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerificationSection {
    /// 이 일수보다 오래된 인용 문서는 staleness 로 표시
    pub staleness_days: i64,
    /// 실행당 최대 재생성 횟수 (긴급도와 무관)
    pub retry_budget: u32,
    /// 긴급 질문 답변이 이 글자 수를 넘으면 안내 문구 추가
    pub urgent_max_chars: usize,
    /// 답변이 이 글자 수보다 짧으면 안내 문구 추가
    pub min_answer_chars: usize,
    pub template_keywords: Vec<String>,
    pub process_keywords: Vec<String>,
    pub contact_keywords: Vec<String>,
}

impl Default for VerificationSection {
    fn default() -> Self {
        Self {
            staleness_days: 730,
            retry_budget: 1,
            urgent_max_chars: 1000,
            min_answer_chars: 50,
            template_keywords: vec![
                "양식".into(),
                "템플릿".into(),
                "서식".into(),
                "파일".into(),
            ],
            process_keywords: vec!["단계".into(), "순서".into(), "절차".into()],
            contact_keywords: vec![
                "담당".into(),
                "연락처".into(),
                "부서".into(),
                "내선".into(),
            ],
        }
    }
}

/// [timeouts] 섹션: 단계별 제한 시간(초)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    pub classify_secs: u64,
    pub retrieve_secs: u64,
    pub synthesize_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            classify_secs: 20,
            retrieve_secs: 15,
            synthesize_secs: 60,
        }
    }
}

impl TimeoutsSection {
    pub fn classify(&self) -> Duration {
        Duration::from_secs(self.classify_secs)
    }

    pub fn retrieve(&self) -> Duration {
        Duration::from_secs(self.retrieve_secs)
    }

    pub fn synthesize(&self) -> Duration {
        Duration::from_secs(self.synthesize_secs)
    }
}

/// config 디렉터리에서 설정을 로드하고 HANDOVER__* 환경 변수로 덮어씀
///
/// 1. config/default.toml, ../config/default.toml, default.toml 순으로 찾아 첫 번째를 기본 소스로 사용
/// 2. config_path 가 주어지고 파일이 있으면 추가 (앞의 키를 덮어씀)
/// 3. 마지막으로 HANDOVER__* 환경 변수
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HANDOVER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.verification.retry_budget, 1);
        assert_eq!(cfg.verification.staleness_days, 730);
        assert!(cfg.app.exit_commands.iter().any(|c| c == "종료"));
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = 8\n\n[verification]\nretry_budget = 2\n").unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.retrieval.top_k, 8);
        assert_eq!(cfg.retrieval.top_k_increment, 3);
        assert_eq!(cfg.verification.retry_budget, 2);
        assert_eq!(cfg.synthesis.max_excerpt_chars, 500);
    }
}
