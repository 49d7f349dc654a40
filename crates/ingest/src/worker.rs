//! 수집 워커 -- 한 사이클(poll → parse → append)의 실행 단위
//!
//! 워커는 tail 리더와 커서를 독점합니다. 수집 루프는 워커를 blocking 스레드로
//! 옮겨 사이클을 실행하고 다시 돌려받으므로, 동시에 두 사이클이 돌 수 없습니다.
//! CLI의 일회성 수집도 같은 워커를 직접 호출합니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use snortmon_core::metrics as m;
use snortmon_core::store::EventStore;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error};

use crate::error::IngestError;
use crate::parser::{LineError, ParseFailure, ParseFailureKind, RecordParser};
use crate::rejection::RejectedLine;
use crate::tail::{TailLine, TailReader};

/// 수집 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// 사이클 사이 대기
    Idle,
    /// 파일 읽는 중
    Polling,
    /// 레코드 파싱 중
    Parsing,
    /// 저장소에 쓰는 중
    Persisting,
}

impl IngestState {
    /// 상태 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Parsing => "parsing",
            Self::Persisting => "persisting",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Polling,
            2 => Self::Parsing,
            3 => Self::Persisting,
            _ => Self::Idle,
        }
    }
}

/// 워커와 수집 루프가 공유하는 상태 셀
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    /// 현재 상태
    pub fn get(&self) -> IngestState {
        IngestState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: IngestState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// 한 사이클의 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 읽은 라인 수
    pub lines: usize,
    /// 저장된 이벤트 수
    pub ingested: usize,
    /// 거부된 라인 수
    pub rejected: usize,
    /// 거부 분류별 개수
    pub failed_kinds: BTreeMap<ParseFailureKind, usize>,
}

impl CycleReport {
    /// 읽은 라인이 없었는지 여부
    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// 다른 리포트를 누적합니다.
    pub fn merge(&mut self, other: &CycleReport) {
        self.lines += other.lines;
        self.ingested += other.ingested;
        self.rejected += other.rejected;
        for (kind, count) in &other.failed_kinds {
            *self.failed_kinds.entry(*kind).or_default() += count;
        }
    }

    fn record_rejection(&mut self, kind: ParseFailureKind) {
        self.rejected += 1;
        *self.failed_kinds.entry(kind).or_default() += 1;
    }
}

/// 수집 워커
pub struct IngestionWorker {
    reader: TailReader,
    parser: RecordParser,
    store: Arc<dyn EventStore>,
    rejected_tx: Option<mpsc::Sender<RejectedLine>>,
    state: SharedState,
}

impl IngestionWorker {
    /// 새 워커를 생성합니다. 거부 라인은 채널이 연결되기 전까지 직접 로그로 남깁니다.
    pub fn new(reader: TailReader, parser: RecordParser, store: Arc<dyn EventStore>) -> Self {
        Self {
            reader,
            parser,
            store,
            rejected_tx: None,
            state: SharedState::default(),
        }
    }

    /// 거부 라인 채널을 연결합니다.
    pub fn with_rejection_sender(mut self, tx: mpsc::Sender<RejectedLine>) -> Self {
        self.rejected_tx = Some(tx);
        self
    }

    /// 현재 상태
    pub fn state(&self) -> IngestState {
        self.state.get()
    }

    pub(crate) fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    /// tail 리더
    pub fn reader(&self) -> &TailReader {
        &self.reader
    }

    /// 사이클 하나를 실행합니다.
    ///
    /// 한 라인의 거부는 배치를 멈추지 않습니다. 파일 I/O, 카탈로그, 저장소 에러는
    /// 사이클을 중단하고 에러를 반환합니다. 카탈로그나 저장소 에러가 나면 커서는
    /// 실패한 라인의 시작까지만 전진하므로 그 라인은 다음 사이클에서 다시 처리됩니다.
    /// 어떤 경우든 상태는 `Idle`로 돌아갑니다.
    pub fn run_cycle(&mut self) -> Result<CycleReport, IngestError> {
        let started = Instant::now();
        let result = self.cycle();
        self.state.set(IngestState::Idle);

        metrics::histogram!(m::INGEST_CYCLE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(report) if !report.is_empty() => {
                debug!(
                    lines = report.lines,
                    ingested = report.ingested,
                    rejected = report.rejected,
                    "ingest cycle complete"
                );
            }
            Ok(_) => {}
            Err(_) => metrics::counter!(m::INGEST_CYCLE_ERRORS_TOTAL).increment(1),
        }
        result
    }

    fn cycle(&mut self) -> Result<CycleReport, IngestError> {
        self.state.set(IngestState::Polling);
        let batch = self.reader.read_batch()?;
        let mut report = CycleReport {
            lines: batch.len(),
            ..Default::default()
        };

        match self.process(batch.lines(), &mut report) {
            Ok(()) => {
                metrics::counter!(m::INGEST_LINES_READ_TOTAL).increment(batch.len() as u64);
                self.reader.commit(batch)?;
                Ok(report)
            }
            Err((index, e)) => {
                metrics::counter!(m::INGEST_LINES_READ_TOTAL).increment(index as u64);
                self.reader.commit_before(batch, index)?;
                Err(e)
            }
        }
    }

    /// 라인을 차례로 처리합니다. 실패하면 실패한 라인의 인덱스를 함께 반환합니다.
    fn process(
        &self,
        lines: &[TailLine],
        report: &mut CycleReport,
    ) -> Result<(), (usize, IngestError)> {
        for (index, line) in lines.iter().enumerate() {
            self.state.set(IngestState::Parsing);
            let alert = match self.parser.parse(&line.text) {
                Ok(alert) => alert,
                Err(LineError::Parse(failure)) => {
                    report.record_rejection(failure.kind);
                    self.reject(failure, line.text.clone());
                    continue;
                }
                Err(LineError::Catalog(e)) => {
                    error!(
                        error = %e,
                        offset = line.start,
                        "rule catalog unavailable, rewinding cursor to failed line"
                    );
                    return Err((index, IngestError::Catalog(e)));
                }
            };

            self.state.set(IngestState::Persisting);
            if let Err(e) = self.store.append(alert) {
                error!(
                    error = %e,
                    offset = line.start,
                    ingested = report.ingested,
                    "failed to store alert, rewinding cursor to failed line"
                );
                return Err((index, IngestError::Store(e)));
            }
            report.ingested += 1;
            metrics::counter!(m::INGEST_EVENTS_STORED_TOTAL).increment(1);
        }
        Ok(())
    }

    fn reject(&self, failure: ParseFailure, line: String) {
        metrics::counter!(m::INGEST_LINES_REJECTED_TOTAL, m::LABEL_KIND => failure.kind.as_str())
            .increment(1);
        let rejected = RejectedLine {
            kind: failure.kind,
            reason: failure.reason,
            line,
        };
        let Some(tx) = &self.rejected_tx else {
            rejected.log();
            return;
        };
        match tx.try_send(rejected) {
            Ok(()) => {}
            Err(TrySendError::Full(rejected)) | Err(TrySendError::Closed(rejected)) => {
                rejected.log();
            }
        }
    }
}
