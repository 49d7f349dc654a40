//! 알림 로그 tail 리더
//!
//! 센서가 계속 덧붙이는 알림 파일에서 마지막 커서 이후의 완전한 라인만 읽어 옵니다.
//!
//! # 동작
//! 1. `<cursor_path>.lock`에 배타 잠금을 겁니다.
//! 2. 커서를 읽고, 파일 크기가 커서보다 작으면 잘린 것으로 보고 0부터 다시 읽습니다.
//! 3. 커서 위치부터 최대 `max_read_bytes`만큼 읽고 `\n`으로 끝나는 라인만 꺼냅니다.
//!    끝의 불완전한 라인은 다음 폴링으로 넘어갑니다.
//! 4. 호출자가 [`TailBatch`]를 처리한 뒤 커밋하면 커서를 기록하고 잠금을 풉니다.
//!    라인이 없어도 기록합니다.
//!
//! 처리 도중 실패하면 [`TailReader::commit_before`]로 실패한 라인의 시작 위치만
//! 기록합니다. 그 라인부터는 다음 폴링에서 다시 읽힙니다.
//!
//! `max_read_bytes`보다 긴 라인은 경고 후 건너뜁니다. 나머지 조각을 버리는 중이라는
//! 표시는 커서 파일에 함께 저장되어 재시작 후에도 유지됩니다.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use snortmon_core::metrics as m;
use tracing::{debug, warn};

use crate::cursor::{CursorLock, CursorPosition, CursorStore};
use crate::error::IngestError;

/// 커서 기반 tail 리더
#[derive(Debug)]
pub struct TailReader {
    path: PathBuf,
    cursor: CursorStore,
    lock_path: PathBuf,
    max_read_bytes: usize,
}

/// 읽었지만 아직 커서에 반영하지 않은 라인
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLine {
    /// 디코딩된 라인 (개행, CR 제외)
    pub text: String,
    /// 라인 첫 바이트의 파일 오프셋
    pub start: u64,
}

/// 한 번의 읽기 결과
///
/// 커밋되거나 drop될 때까지 커서 잠금을 쥐고 있습니다.
/// 커밋 없이 drop되면 커서는 그대로이고 같은 라인이 다시 읽힙니다.
#[derive(Debug)]
pub struct TailBatch {
    lines: Vec<TailLine>,
    /// 전부 처리했을 때 기록할 위치. 파일이 없으면 `None`
    end: Option<CursorPosition>,
    _lock: CursorLock,
}

impl TailBatch {
    /// 읽은 라인들
    pub fn lines(&self) -> &[TailLine] {
        &self.lines
    }

    /// 라인 수
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 라인이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl TailReader {
    /// 새 리더를 생성합니다.
    pub fn new(path: impl Into<PathBuf>, cursor: CursorStore, max_read_bytes: usize) -> Self {
        let lock_path = cursor.lock_path();
        Self {
            path: path.into(),
            cursor,
            lock_path,
            max_read_bytes: max_read_bytes.max(1),
        }
    }

    /// 알림 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 커서 저장소
    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    /// 새로 덧붙은 완전한 라인을 읽고 곧바로 커서를 전진시킵니다.
    pub fn poll(&self) -> Result<Vec<String>, IngestError> {
        let batch = self.read_batch()?;
        let lines = batch.lines.iter().map(|line| line.text.clone()).collect();
        self.commit(batch)?;
        Ok(lines)
    }

    /// 잠금을 잡고 새로 덧붙은 완전한 라인을 읽습니다. 커서는 아직 기록하지 않습니다.
    ///
    /// 파일이 없으면 경고 후 빈 배치를 반환하며, 커밋해도 커서는 건드리지 않습니다.
    /// 권한 거부 등 그 외 I/O 에러는 [`IngestError::Tail`]로 반환됩니다.
    pub fn read_batch(&self) -> Result<TailBatch, IngestError> {
        let lock = CursorLock::acquire(&self.lock_path)?;
        let mut position = self.cursor.load_position()?;

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "alert file not found, waiting for sensor");
                return Ok(TailBatch {
                    lines: Vec::new(),
                    end: None,
                    _lock: lock,
                });
            }
            Err(e) => return Err(self.tail_error(e)),
        };

        let len = file.metadata().map_err(|e| self.tail_error(e))?.len();
        if len < position.offset {
            warn!(
                path = %self.path.display(),
                offset = position.offset,
                len,
                "alert file truncated, re-reading from start"
            );
            position = CursorPosition::default();
        }

        let mut lines = Vec::new();
        if len > position.offset {
            let want = (len - position.offset).min(self.max_read_bytes as u64);
            let mut buf = Vec::with_capacity(want as usize);
            file.seek(SeekFrom::Start(position.offset))
                .map_err(|e| self.tail_error(e))?;
            file.by_ref()
                .take(want)
                .read_to_end(&mut buf)
                .map_err(|e| self.tail_error(e))?;

            self.consume(&buf, &mut position, &mut lines);
        }

        Ok(TailBatch {
            lines,
            end: Some(position),
            _lock: lock,
        })
    }

    /// 배치 전체를 소비한 것으로 커서를 기록하고 잠금을 풉니다.
    pub fn commit(&self, batch: TailBatch) -> Result<(), IngestError> {
        match batch.end {
            Some(position) => self.record(position, batch.lines.len()),
            None => Ok(()),
        }
    }

    /// `index`번째 라인 직전까지만 소비한 것으로 커서를 기록합니다.
    ///
    /// 그 라인과 뒤따르는 라인은 다음 폴링에서 다시 읽힙니다.
    /// `index`가 범위를 벗어나면 [`commit`](Self::commit)과 같습니다.
    pub fn commit_before(&self, batch: TailBatch, index: usize) -> Result<(), IngestError> {
        match batch.lines.get(index) {
            Some(line) => self.record(CursorPosition::at(line.start), index),
            None => self.commit(batch),
        }
    }

    fn record(&self, position: CursorPosition, consumed: usize) -> Result<(), IngestError> {
        self.cursor.store_position(position)?;
        metrics::gauge!(m::INGEST_CURSOR_OFFSET_BYTES).set(position.offset as f64);
        debug!(
            path = %self.path.display(),
            offset = position.offset,
            lines = consumed,
            "tail cursor committed"
        );
        Ok(())
    }

    /// `position.offset`에서 읽은 버퍼에서 라인을 꺼내고 위치를 전진시킵니다.
    fn consume(&self, buf: &[u8], position: &mut CursorPosition, out: &mut Vec<TailLine>) {
        let base = position.offset;
        let mut start = 0;
        if position.skip_partial {
            match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    start = pos + 1;
                    position.skip_partial = false;
                }
                None => {
                    position.offset += buf.len() as u64;
                    return;
                }
            }
        }

        let rest = &buf[start..];
        let (raw_lines, consumed) = split_complete_lines(rest);

        if raw_lines.is_empty() && start == 0 && rest.len() >= self.max_read_bytes {
            warn!(
                path = %self.path.display(),
                max_read_bytes = self.max_read_bytes,
                "line exceeds max_read_bytes, skipping it"
            );
            position.offset += rest.len() as u64;
            position.skip_partial = true;
            return;
        }

        let mut line_start = base + start as u64;
        for raw in raw_lines {
            let next = line_start + raw.len() as u64 + 1;
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if !raw.iter().all(u8::is_ascii_whitespace) {
                out.push(TailLine {
                    text: decode_line(raw),
                    start: line_start,
                });
            }
            line_start = next;
        }
        position.offset = base + (start + consumed) as u64;
    }

    fn tail_error(&self, source: std::io::Error) -> IngestError {
        IngestError::Tail {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// 버퍼를 `\n` 기준으로 나눕니다.
///
/// 개행으로 끝나는 라인들(개행 제외)과 그 라인들이 차지한 바이트 수를 반환합니다.
/// 마지막 개행 뒤의 바이트는 소비하지 않습니다.
pub fn split_complete_lines(buf: &[u8]) -> (Vec<&[u8]>, usize) {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, &b) in buf.iter().enumerate() {
        if b == b'\n' {
            lines.push(&buf[start..i]);
            start = i + 1;
        }
    }
    (lines, start)
}

/// 라인을 UTF-8로 디코딩하고, 실패하면 Latin-1로 해석합니다.
pub fn decode_line(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_owned(),
        // Latin-1은 바이트 값이 곧 코드 포인트
        Err(_) => raw.iter().map(|&b| char::from(b)).collect(),
    }
}
