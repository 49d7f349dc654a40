//! 규칙 갱신 -- 외부 업데이트/덤프/재시작 명령 실행
//!
//! # 단계
//! 1. `update_command` 실행 (비어 있으면 생략). 실패하면 중단
//! 2. `dump_command` 실행, stdout을 `dump_path`에 기록. 실패하면 중단
//! 3. 덤프 로드 후 새 규칙만 카탈로그에 추가
//! 4. `restart_command` 실행 (비어 있으면 생략). 실패는 경고만 남김
//!
//! 명령은 셸을 거치지 않고 argv 그대로 실행되며, 각각 `timeout`을 넘으면 종료됩니다.
//! 한 번에 하나의 갱신만 진행됩니다.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use snortmon_core::metrics as m;
use snortmon_core::store::RuleCatalog;
use tokio::process::Command;
use tracing::{info, warn};

use super::dump::{RefreshReport, load_rule_dump};
use crate::config::RefreshSettings;
use crate::error::IngestError;

/// stderr 중 에러 메시지에 포함할 최대 길이
const MAX_STDERR_CHARS: usize = 512;

/// 진행 중인 갱신의 점유 표시. drop되면 해제됩니다.
#[derive(Debug)]
pub struct RefreshGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 규칙 갱신 실행기
pub struct RuleUpdater {
    settings: RefreshSettings,
    catalog: Arc<dyn RuleCatalog>,
    running: Arc<AtomicBool>,
}

impl RuleUpdater {
    /// 새 실행기를 생성합니다.
    pub fn new(settings: RefreshSettings, catalog: Arc<dyn RuleCatalog>) -> Self {
        Self {
            settings,
            catalog,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 갱신이 진행 중인지 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 갱신 슬롯을 점유합니다. 이미 진행 중이면 `None`입니다.
    pub fn try_begin(&self) -> Option<RefreshGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard {
                flag: Arc::clone(&self.running),
            })
    }

    /// 갱신을 실행합니다. 이미 진행 중이면 [`IngestError::RefreshInProgress`]입니다.
    pub async fn refresh(&self) -> Result<RefreshReport, IngestError> {
        let guard = self.try_begin().ok_or(IngestError::RefreshInProgress)?;
        self.refresh_with(guard).await
    }

    /// 미리 점유한 슬롯으로 갱신을 실행합니다.
    pub async fn refresh_with(&self, guard: RefreshGuard) -> Result<RefreshReport, IngestError> {
        let _guard = guard;
        let result = self.run_steps().await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(m::RULES_REFRESH_TOTAL, m::LABEL_RESULT => outcome).increment(1);
        result
    }

    async fn run_steps(&self) -> Result<RefreshReport, IngestError> {
        let timeout = self.settings.timeout;

        if self.settings.update_command.is_empty() {
            info!("no rule update command configured, skipping update step");
        } else {
            info!(command = %self.settings.update_command.join(" "), "updating rules");
            run_command(&self.settings.update_command, None, timeout).await?;
        }

        info!(
            command = %self.settings.dump_command.join(" "),
            dump_path = %self.settings.dump_path.display(),
            "dumping rule metadata"
        );
        run_command(
            &self.settings.dump_command,
            Some(&self.settings.dump_path),
            timeout,
        )
        .await?;

        let path = self.settings.dump_path.clone();
        let catalog = Arc::clone(&self.catalog);
        let report = tokio::task::spawn_blocking(move || load_rule_dump(&path, catalog.as_ref()))
            .await
            .map_err(|e| IngestError::Channel(format!("spawn_blocking failed: {e}")))??;
        metrics::counter!(m::RULES_ADDED_TOTAL).increment(report.added);
        info!(
            added = report.added,
            skipped = report.skipped,
            invalid = report.invalid,
            "rule catalog refreshed"
        );

        if !self.settings.restart_command.is_empty() {
            if let Err(e) = run_command(&self.settings.restart_command, None, timeout).await {
                warn!(error = %e, "sensor restart failed");
            }
        }

        Ok(report)
    }
}

/// argv 명령을 실행합니다. `stdout_path`가 있으면 표준 출력을 그 파일에 씁니다.
async fn run_command(
    argv: &[String],
    stdout_path: Option<&Path>,
    timeout: Duration,
) -> Result<(), IngestError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(IngestError::Config {
            field: "command".to_owned(),
            reason: "must not be empty".to_owned(),
        });
    };
    let failed = |reason: String| IngestError::RuleUpdate {
        command: program.clone(),
        reason,
    };

    let stdout = match stdout_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
            }
            let file = std::fs::File::create(path)
                .map_err(|e| failed(format!("cannot create {}: {e}", path.display())))?;
            Stdio::from(file)
        }
        None => Stdio::null(),
    };

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failed(format!("failed to spawn: {e}")))?;

    // 시간 초과 시 future가 drop되면서 kill_on_drop으로 자식이 종료됩니다.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| IngestError::Timeout {
            command: program.clone(),
            secs: timeout.as_secs(),
        })?
        .map_err(|e| failed(e.to_string()))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
    Err(failed(format!("{}: {stderr}", output.status)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use snortmon_storage::MemoryStore;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    fn settings(dir: &Path, dump_line: &str) -> RefreshSettings {
        RefreshSettings {
            update_command: argv(&["true"]),
            dump_command: argv(&["echo", dump_line]),
            restart_command: Vec::new(),
            dump_path: dir.join("out").join("rules.json"),
            timeout: Duration::from_secs(5),
        }
    }

    const RULE: &str = r#"{"gid": 1, "sid": 42, "rev": 1, "msg": "m", "action": "alert"}"#;

    #[tokio::test]
    async fn refresh_runs_steps_and_loads_dump() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let updater = RuleUpdater::new(settings(dir.path(), RULE), store.clone());

        let report = updater.refresh().await.unwrap();
        assert_eq!(report.added, 1);
        assert!(store.resolve(snortmon_core::types::RuleKey::new(42, 1, 1)).unwrap().is_some());
        assert!(!updater.is_running());

        let report = updater.refresh().await.unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn failed_update_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path(), RULE);
        settings.update_command = argv(&["false"]);
        let updater = RuleUpdater::new(settings, Arc::new(MemoryStore::new()));
        let err = updater.refresh().await.unwrap_err();
        assert!(matches!(err, IngestError::RuleUpdate { .. }));
        assert!(!dir.path().join("out").join("rules.json").exists());
    }

    #[tokio::test]
    async fn failed_restart_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path(), RULE);
        settings.restart_command = argv(&["false"]);
        let updater = RuleUpdater::new(settings, Arc::new(MemoryStore::new()));
        assert_eq!(updater.refresh().await.unwrap().added, 1);
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path(), RULE);
        settings.update_command = argv(&["sleep", "5"]);
        settings.timeout = Duration::from_millis(100);
        let updater = RuleUpdater::new(settings, Arc::new(MemoryStore::new()));
        let err = updater.refresh().await.unwrap_err();
        assert!(matches!(err, IngestError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_update_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path(), RULE);
        settings.update_command = argv(&["/nonexistent/snortmon-test-binary"]);
        let updater = RuleUpdater::new(settings, Arc::new(MemoryStore::new()));
        assert!(matches!(
            updater.refresh().await.unwrap_err(),
            IngestError::RuleUpdate { .. }
        ));
    }

    #[test]
    fn only_one_refresh_at_a_time() {
        let updater = RuleUpdater::new(RefreshSettings::default(), Arc::new(MemoryStore::new()));
        let guard = updater.try_begin().unwrap();
        assert!(updater.is_running());
        assert!(updater.try_begin().is_none());
        drop(guard);
        assert!(updater.try_begin().is_some());
    }
}
