//! `snortmon ingest` command handler

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tracing::info;

use snortmon_core::config::SnortmonConfig;
use snortmon_core::pipeline::Pipeline;
use snortmon_ingest::{
    CycleReport, IngestSettings, IngestionLoopBuilder, IngestionWorker, build_worker,
    spawn_rejection_logger,
};
use snortmon_storage::Stores;

use crate::cli::IngestArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `ingest` command.
pub async fn execute(
    args: IngestArgs,
    config: &SnortmonConfig,
    stores: Stores,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let settings = IngestSettings::from_core(&config.ingest);
    settings.validate()?;

    if args.once {
        let report = ingest_once(&settings, &stores).await?;
        writer.render(&report)?;
        return Ok(());
    }

    follow(settings, stores).await
}

/// Drain the alert file up to its current end and return the totals.
///
/// Cycles repeat until the cursor stops moving, so a backlog larger than
/// `max_read_bytes` is consumed in one invocation.
pub async fn ingest_once(settings: &IngestSettings, stores: &Stores) -> Result<IngestReport, CliError> {
    info!(alert_file = %settings.alert_file.display(), "ingesting pending alerts");

    let worker = build_worker(settings, stores.rules.clone(), stores.events.clone());
    let alert_file = settings.alert_file.display().to_string();

    let (cycles, total, offset) = tokio::task::spawn_blocking(move || drain(worker))
        .await
        .map_err(|e| CliError::Command(format!("ingest task failed: {e}")))??;

    Ok(IngestReport::new(alert_file, cycles, offset, &total))
}

fn drain(mut worker: IngestionWorker) -> Result<(u64, CycleReport, u64), CliError> {
    let mut total = CycleReport::default();
    let mut cycles = 0u64;
    loop {
        let before = worker.reader().cursor().load()?;
        let report = worker.run_cycle()?;
        total.merge(&report);
        cycles += 1;
        let after = worker.reader().cursor().load()?;
        if after == before {
            return Ok((cycles, total, after));
        }
    }
}

/// Run the polling loop until Ctrl+C.
async fn follow(settings: IngestSettings, stores: Stores) -> Result<(), CliError> {
    let (mut ingest, rejected_rx) = IngestionLoopBuilder::new()
        .settings(settings)
        .catalog(stores.rules.clone())
        .store(stores.events.clone())
        .build()?;
    if let Some(rx) = rejected_rx {
        spawn_rejection_logger(rx);
    }

    ingest.start().await?;
    info!("ingestion running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping ingestion");
    ingest.stop().await?;
    Ok(())
}

/// One-shot ingestion result.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    /// Alert file that was read
    pub alert_file: String,
    /// Number of cycles run
    pub cycles: u64,
    /// Cursor offset after the last cycle
    pub offset: u64,
    /// Complete lines read
    pub lines: usize,
    /// Events stored
    pub ingested: usize,
    /// Lines rejected
    pub rejected: usize,
    /// Rejections by kind
    pub rejected_by_kind: BTreeMap<String, usize>,
}

impl IngestReport {
    fn new(alert_file: String, cycles: u64, offset: u64, total: &CycleReport) -> Self {
        Self {
            alert_file,
            cycles,
            offset,
            lines: total.lines,
            ingested: total.ingested,
            rejected: total.rejected,
            rejected_by_kind: total
                .failed_kinds
                .iter()
                .map(|(kind, count)| (kind.as_str().to_owned(), *count))
                .collect(),
        }
    }
}

impl Render for IngestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Ingest: {}", self.alert_file.bold())?;
        writeln!(w, "  Lines read:  {}", self.lines)?;
        writeln!(w, "  Ingested:    {}", self.ingested.to_string().green())?;
        if self.rejected > 0 {
            writeln!(w, "  Rejected:    {}", self.rejected.to_string().yellow())?;
            for (kind, count) in &self.rejected_by_kind {
                writeln!(w, "    {kind:<14} {count}")?;
            }
        } else {
            writeln!(w, "  Rejected:    0")?;
        }
        writeln!(w, "  Offset:      {} ({} cycles)", self.offset, self.cycles)?;
        Ok(())
    }
}
