//! 읽기 커서 -- 알림 로그의 바이트 오프셋 영속화
//!
//! 커서는 10진수 오프셋 한 줄을 담은 작은 파일입니다. 길이 초과 라인의
//! 나머지를 버리는 중이면 오프셋 뒤에 ` skip` 표시가 붙습니다 (`4096 skip`).
//! 쓰기는 임시 파일 + rename으로 원자적으로 교체되므로 중간에 죽더라도
//! 이전 값 또는 새 값 중 하나만 남습니다.
//!
//! [`CursorLock`]은 `<cursor_path>.lock`에 대한 `flock(2)` 배타 잠금으로
//! 여러 프로세스가 같은 커서를 동시에 전진시키지 못하게 합니다.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::IngestError;

/// 영속화되는 읽기 위치
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorPosition {
    /// 다음에 읽을 바이트 오프셋
    pub offset: u64,
    /// 오프셋부터 다음 개행까지를 길이 초과 라인의 나머지로 보고 버릴지 여부
    pub skip_partial: bool,
}

impl CursorPosition {
    /// 버릴 조각이 없는 위치
    pub fn at(offset: u64) -> Self {
        Self {
            offset,
            skip_partial: false,
        }
    }
}

const SKIP_MARKER: &str = "skip";

/// 커서 파일 저장소
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    /// 주어진 경로의 커서 저장소를 만듭니다. 파일은 첫 `store()` 때 생성됩니다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 커서 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 잠금 파일 경로 (`<cursor_path>.lock`)
    pub fn lock_path(&self) -> PathBuf {
        with_suffix(&self.path, ".lock")
    }

    /// 저장된 오프셋을 읽습니다. 파일이 없으면 0입니다.
    ///
    /// 내용이 숫자가 아니면 에러를 반환합니다. 0으로 되돌리면 이미 적재한
    /// 알림을 다시 적재하게 되므로 운영자가 직접 확인해야 합니다.
    pub fn load(&self) -> Result<u64, IngestError> {
        self.load_position().map(|position| position.offset)
    }

    /// 오프셋과 건너뛰기 표시를 함께 읽습니다.
    pub fn load_position(&self) -> Result<CursorPosition, IngestError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CursorPosition::default()),
            Err(e) => return Err(self.error(e.to_string())),
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(CursorPosition::default());
        }

        let mut fields = trimmed.split_whitespace();
        let raw_offset = fields.next().unwrap_or_default();
        let offset = raw_offset
            .parse::<u64>()
            .map_err(|e| self.error(format!("invalid offset '{raw_offset}': {e}")))?;
        let skip_partial = match (fields.next(), fields.next()) {
            (None, None) => false,
            (Some(SKIP_MARKER), None) => true,
            _ => return Err(self.error(format!("invalid cursor '{trimmed}'"))),
        };
        Ok(CursorPosition {
            offset,
            skip_partial,
        })
    }

    /// 오프셋을 원자적으로 기록합니다.
    pub fn store(&self, offset: u64) -> Result<(), IngestError> {
        self.store_position(CursorPosition::at(offset))
    }

    /// 오프셋과 건너뛰기 표시를 원자적으로 기록합니다.
    pub fn store_position(&self, position: CursorPosition) -> Result<(), IngestError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.error(e.to_string()))?;
        }

        let tmp = with_suffix(&self.path, ".tmp");
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            if position.skip_partial {
                writeln!(file, "{} {SKIP_MARKER}", position.offset)?;
            } else {
                writeln!(file, "{}", position.offset)?;
            }
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| self.error(e.to_string()))
    }

    fn error(&self, reason: String) -> IngestError {
        IngestError::Cursor {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// `flock(2)` 기반 프로세스 간 배타 잠금
///
/// 값이 drop되면 파일 디스크립터가 닫히면서 잠금이 해제됩니다.
#[derive(Debug)]
pub struct CursorLock {
    _file: File,
}

impl CursorLock {
    /// 잠금을 획득할 때까지 대기합니다.
    pub fn acquire(path: &Path) -> Result<Self, IngestError> {
        let file = open_lock_file(path)?;
        lock(&file, false).map_err(|e| lock_error(path, &e))?;
        Ok(Self { _file: file })
    }

    /// 즉시 잠금을 시도합니다. 다른 보유자가 있으면 `Ok(None)`입니다.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, IngestError> {
        let file = open_lock_file(path)?;
        match lock(&file, true) {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(lock_error(path, &e)),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, IngestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| lock_error(path, &e))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| lock_error(path, &e))
}

fn lock_error(path: &Path, e: &std::io::Error) -> IngestError {
    IngestError::Lock {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(unix)]
fn lock(file: &File, non_blocking: bool) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let mut op = libc::LOCK_EX;
    if non_blocking {
        op |= libc::LOCK_NB;
    }
    loop {
        // SAFETY: fd는 `file`이 살아 있는 동안 유효합니다.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn lock(_file: &File, _non_blocking: bool) -> std::io::Result<()> {
    Ok(())
}
