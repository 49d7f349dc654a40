//! 설정 관리 -- snortmon.toml 파싱 및 런타임 설정
//!
//! [`SnortmonConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SNORTMON_INGEST_ALERT_FILE=/var/log/snort/alert_json.txt` 형식)
//! 3. 설정 파일 (`snortmon.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), snortmon_core::error::SnortmonError> {
//! use snortmon_core::config::SnortmonConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SnortmonConfig::load("snortmon.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SnortmonConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SnortmonError};

/// snortmon 통합 설정
///
/// `snortmon.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnortmonConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 알림 수집 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 이벤트 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 조회 API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 규칙 갱신 설정
    #[serde(default)]
    pub rules: RulesConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SnortmonConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 상대 경로를 `general.data_dir` 기준으로 변환
    /// 4. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SnortmonError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SnortmonError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SnortmonError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SnortmonError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SnortmonError> {
        toml::from_str(toml_str).map_err(|e| {
            SnortmonError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SNORTMON_{SECTION}_{FIELD}`
    /// 예: `SNORTMON_API_PORT=8080`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SNORTMON_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SNORTMON_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "SNORTMON_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "SNORTMON_GENERAL_PID_FILE");

        // Ingest
        override_bool(&mut self.ingest.enabled, "SNORTMON_INGEST_ENABLED");
        override_string(&mut self.ingest.alert_file, "SNORTMON_INGEST_ALERT_FILE");
        override_string(&mut self.ingest.cursor_path, "SNORTMON_INGEST_CURSOR_PATH");
        override_u64(
            &mut self.ingest.poll_interval_ms,
            "SNORTMON_INGEST_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.ingest.max_read_bytes,
            "SNORTMON_INGEST_MAX_READ_BYTES",
        );
        override_usize(
            &mut self.ingest.rejection_buffer,
            "SNORTMON_INGEST_REJECTION_BUFFER",
        );

        // Storage
        override_string(&mut self.storage.backend, "SNORTMON_STORAGE_BACKEND");
        override_string(
            &mut self.storage.database_path,
            "SNORTMON_STORAGE_DATABASE_PATH",
        );
        override_u64(
            &mut self.storage.busy_timeout_ms,
            "SNORTMON_STORAGE_BUSY_TIMEOUT_MS",
        );

        // API
        override_bool(&mut self.api.enabled, "SNORTMON_API_ENABLED");
        override_string(&mut self.api.listen_addr, "SNORTMON_API_LISTEN_ADDR");
        override_u16(&mut self.api.port, "SNORTMON_API_PORT");
        override_usize(&mut self.api.page_size, "SNORTMON_API_PAGE_SIZE");

        // Rules
        override_argv(
            &mut self.rules.update_command,
            "SNORTMON_RULES_UPDATE_COMMAND",
        );
        override_argv(&mut self.rules.dump_command, "SNORTMON_RULES_DUMP_COMMAND");
        override_argv(
            &mut self.rules.restart_command,
            "SNORTMON_RULES_RESTART_COMMAND",
        );
        override_string(&mut self.rules.dump_path, "SNORTMON_RULES_DUMP_PATH");
        override_u64(&mut self.rules.timeout_secs, "SNORTMON_RULES_TIMEOUT_SECS");

        // Metrics
        override_bool(&mut self.metrics.enabled, "SNORTMON_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "SNORTMON_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "SNORTMON_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "SNORTMON_METRICS_ENDPOINT");
    }

    /// 상태 파일 경로 중 상대 경로를 `general.data_dir` 아래로 옮깁니다.
    ///
    /// 대상은 커서 파일, SQLite 데이터베이스, 규칙 덤프 파일입니다.
    /// 절대 경로와 빈 문자열은 그대로 둡니다.
    pub fn resolve_paths(&mut self) {
        let base = Path::new(&self.general.data_dir);
        for target in [
            &mut self.ingest.cursor_path,
            &mut self.storage.database_path,
            &mut self.rules.dump_path,
        ] {
            if target.is_empty() || Path::new(target.as_str()).is_absolute() {
                continue;
            }
            *target = base.join(target.as_str()).display().to_string();
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SnortmonError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.ingest.enabled {
            if self.ingest.alert_file.is_empty() {
                return Err(invalid(
                    "ingest.alert_file",
                    "must not be empty when ingest is enabled",
                ));
            }
            if self.ingest.cursor_path.is_empty() {
                return Err(invalid(
                    "ingest.cursor_path",
                    "must not be empty when ingest is enabled",
                ));
            }
            if self.ingest.poll_interval_ms == 0 {
                return Err(invalid("ingest.poll_interval_ms", "must be greater than 0"));
            }
            if self.ingest.max_read_bytes == 0 {
                return Err(invalid("ingest.max_read_bytes", "must be greater than 0"));
            }
        }

        // storage backend 검증
        let valid_backends = ["sqlite", "memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(
                "storage.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }
        if self.storage.backend == "sqlite" && self.storage.database_path.is_empty() {
            return Err(invalid(
                "storage.database_path",
                "must not be empty for the sqlite backend",
            ));
        }

        if self.api.enabled && self.api.page_size == 0 {
            return Err(invalid("api.page_size", "must be greater than 0"));
        }

        if self.rules.timeout_secs == 0 {
            return Err(invalid("rules.timeout_secs", "must be greater than 0"));
        }

        if self.metrics.enabled {
            // PrometheusBuilder의 HTTP 리스너는 경로와 무관하게 응답하므로 /metrics만 허용
            if self.metrics.endpoint != "/metrics" {
                return Err(invalid(
                    "metrics.endpoint",
                    "only \"/metrics\" is supported",
                ));
            }
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> SnortmonError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리 (상대 경로로 지정된 상태 파일의 기준)
    pub data_dir: String,
    /// PID 파일 경로
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/snortmon".to_owned(),
            pid_file: "/var/run/snortmon.pid".to_owned(),
        }
    }
}

/// 알림 수집 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 센서가 기록하는 알림 로그 경로 (alert_json)
    pub alert_file: String,
    /// 읽기 커서(바이트 오프셋) 파일 경로
    pub cursor_path: String,
    /// 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 한 번의 폴링에서 읽을 최대 바이트 수
    pub max_read_bytes: usize,
    /// 거부된 라인 로거 채널 용량
    pub rejection_buffer: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alert_file: "/var/log/snort/alert_json.txt".to_owned(),
            cursor_path: "/var/lib/snortmon/cursor".to_owned(),
            poll_interval_ms: 1_000,
            max_read_bytes: 4 * 1024 * 1024, // 4MB
            rejection_buffer: 1_024,
        }
    }
}

/// 이벤트 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 저장소 백엔드 (sqlite, memory)
    pub backend: String,
    /// SQLite 데이터베이스 파일 경로
    pub database_path: String,
    /// 잠금 대기 시간 (밀리초)
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_owned(),
            database_path: "/var/lib/snortmon/snortmon.db".to_owned(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// 조회 API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// 페이지당 결과 수
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 8000,
            page_size: 50,
        }
    }
}

/// 규칙 갱신 설정
///
/// 명령은 셸을 거치지 않는 argv 벡터로 실행됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 규칙 업데이트 명령 (예: pulledpork)
    pub update_command: Vec<String>,
    /// 규칙 메타데이터 덤프 명령 (stdout이 `dump_path`로 저장됨)
    pub dump_command: Vec<String>,
    /// 센서 재시작 명령 (비어 있으면 생략)
    pub restart_command: Vec<String>,
    /// 덤프 파일 경로
    pub dump_path: String,
    /// 각 하위 프로세스 제한 시간 (초)
    pub timeout_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            update_command: vec![
                "pulledpork3".to_owned(),
                "-c".to_owned(),
                "/usr/local/etc/pulledpork3/pulledpork.conf".to_owned(),
            ],
            dump_command: vec![
                "snort".to_owned(),
                "-c".to_owned(),
                "/usr/local/etc/snort/snort.lua".to_owned(),
                "--dump-rule-meta".to_owned(),
            ],
            restart_command: Vec::new(),
            dump_path: "/var/lib/snortmon/rules.json".to_owned(),
            timeout_secs: 600,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

// 공백 기준 분리 (따옴표 처리 없음)
fn override_argv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}
