//! 수집 파이프라인 설정
//!
//! [`IngestSettings`]는 `snortmon-core`의 `IngestConfig`를 기반으로
//! 수집 루프에 필요한 값을 `Duration`/`PathBuf`로 변환해 보관합니다.
//! [`RefreshSettings`]는 `[rules]` 섹션에서 규칙 갱신 명령을 가져옵니다.

use std::path::PathBuf;
use std::time::Duration;

use snortmon_core::config::{IngestConfig, RulesConfig};

use crate::error::IngestError;

/// 폴링 주기 최대값 (1시간)
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(3_600);

/// 한 번에 읽을 수 있는 최대 바이트 (64MB)
const MAX_READ_BYTES_LIMIT: usize = 64 * 1024 * 1024;

/// 수집 루프 설정
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// 센서 알림 로그 경로
    pub alert_file: PathBuf,
    /// 커서 파일 경로
    pub cursor_path: PathBuf,
    /// 폴링 주기
    pub poll_interval: Duration,
    /// 폴링당 최대 읽기 바이트
    pub max_read_bytes: usize,
    /// 거부 라인 채널 용량
    pub rejection_buffer: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_core(&IngestConfig::default())
    }
}

impl IngestSettings {
    /// core 설정에서 수집 설정을 생성합니다.
    pub fn from_core(core: &IngestConfig) -> Self {
        Self {
            alert_file: PathBuf::from(&core.alert_file),
            cursor_path: PathBuf::from(&core.cursor_path),
            poll_interval: Duration::from_millis(core.poll_interval_ms),
            max_read_bytes: core.max_read_bytes,
            rejection_buffer: core.rejection_buffer,
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.alert_file.as_os_str().is_empty() {
            return Err(config_err("alert_file", "must not be empty"));
        }
        if self.cursor_path.as_os_str().is_empty() {
            return Err(config_err("cursor_path", "must not be empty"));
        }
        if self.cursor_path == self.alert_file {
            return Err(config_err("cursor_path", "must differ from alert_file"));
        }
        if self.poll_interval.is_zero() {
            return Err(config_err("poll_interval_ms", "must be greater than 0"));
        }
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(config_err(
                "poll_interval_ms",
                &format!("must be at most {}ms", MAX_POLL_INTERVAL.as_millis()),
            ));
        }
        if self.max_read_bytes == 0 || self.max_read_bytes > MAX_READ_BYTES_LIMIT {
            return Err(config_err(
                "max_read_bytes",
                &format!("must be between 1 and {MAX_READ_BYTES_LIMIT}"),
            ));
        }
        if self.rejection_buffer == 0 {
            return Err(config_err("rejection_buffer", "must be greater than 0"));
        }
        Ok(())
    }
}

fn config_err(field: &str, reason: &str) -> IngestError {
    IngestError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 수집 설정 빌더
#[derive(Default)]
pub struct IngestSettingsBuilder {
    settings: IngestSettings,
}

impl IngestSettingsBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 알림 로그 경로를 설정합니다.
    pub fn alert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.alert_file = path.into();
        self
    }

    /// 커서 파일 경로를 설정합니다.
    pub fn cursor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.cursor_path = path.into();
        self
    }

    /// 폴링 주기를 설정합니다.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// 폴링당 최대 읽기 바이트를 설정합니다.
    pub fn max_read_bytes(mut self, bytes: usize) -> Self {
        self.settings.max_read_bytes = bytes;
        self
    }

    /// 거부 라인 채널 용량을 설정합니다.
    pub fn rejection_buffer(mut self, capacity: usize) -> Self {
        self.settings.rejection_buffer = capacity;
        self
    }

    /// 설정을 검증하고 `IngestSettings`를 생성합니다.
    pub fn build(self) -> Result<IngestSettings, IngestError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// 규칙 갱신 설정
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// 규칙 업데이트 명령
    pub update_command: Vec<String>,
    /// 규칙 덤프 명령
    pub dump_command: Vec<String>,
    /// 센서 재시작 명령 (비어 있으면 생략)
    pub restart_command: Vec<String>,
    /// 덤프 파일 경로
    pub dump_path: PathBuf,
    /// 명령별 제한 시간
    pub timeout: Duration,
}

impl RefreshSettings {
    /// core 설정에서 갱신 설정을 생성합니다.
    pub fn from_core(core: &RulesConfig) -> Self {
        Self {
            update_command: core.update_command.clone(),
            dump_command: core.dump_command.clone(),
            restart_command: core.restart_command.clone(),
            dump_path: PathBuf::from(&core.dump_path),
            timeout: Duration::from_secs(core.timeout_secs),
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// 업데이트 명령은 비워 둘 수 있지만 덤프 명령은 반드시 있어야 합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.dump_command.is_empty() {
            return Err(config_err("dump_command", "must not be empty"));
        }
        if self.dump_path.as_os_str().is_empty() {
            return Err(config_err("dump_path", "must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(config_err("timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::from_core(&RulesConfig::default())
    }
}
