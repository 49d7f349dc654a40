//! 거부된 라인 로거
//!
//! 워커는 거부된 라인을 mpsc 채널로 보내고, 별도 태스크가 이를 경고 로그로 남깁니다.
//! 채널이 가득 차면 워커가 직접 로그를 남기므로 수집 경로는 막히지 않습니다.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::parser::ParseFailureKind;

/// 로그에 남길 라인 원문의 최대 길이 (문자 수)
const MAX_LOGGED_LINE_CHARS: usize = 512;

/// 거부된 라인
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 거부 분류
    pub kind: ParseFailureKind,
    /// 상세 사유
    pub reason: String,
    /// 원문
    pub line: String,
}

impl RejectedLine {
    /// 로그용으로 잘라낸 원문
    pub fn excerpt(&self) -> &str {
        match self.line.char_indices().nth(MAX_LOGGED_LINE_CHARS) {
            Some((idx, _)) => &self.line[..idx],
            None => &self.line,
        }
    }

    pub(crate) fn log(&self) {
        warn!(
            kind = %self.kind,
            reason = %self.reason,
            line = %self.excerpt(),
            "alert line rejected"
        );
    }
}

/// 채널이 닫힐 때까지 거부 라인을 로그로 남기는 태스크를 띄웁니다.
pub fn spawn_rejection_logger(mut rx: mpsc::Receiver<RejectedLine>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut logged = 0u64;
        while let Some(rejected) = rx.recv().await {
            rejected.log();
            logged += 1;
        }
        debug!(logged, "rejection logger stopped");
        logged
    })
}
