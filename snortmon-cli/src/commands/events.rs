//! `snortmon events` command handler

use std::io::Write;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use snortmon_core::query::CountRow;
use snortmon_query::QueryEngine;
use snortmon_storage::Stores;

use crate::cli::{EventsAction, EventsArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `events` command.
pub async fn execute(args: EventsArgs, stores: Stores, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        EventsAction::Count { group, period } => {
            let report = tokio::task::spawn_blocking(move || count(&stores, &group, &period))
                .await
                .map_err(|e| CliError::Command(format!("events count task failed: {e}")))??;
            writer.render(&report)
        }
        EventsAction::Purge { yes } => {
            let report = tokio::task::spawn_blocking(move || purge(&stores, yes))
                .await
                .map_err(|e| CliError::Command(format!("events purge task failed: {e}")))??;
            writer.render(&report)
        }
    }
}

/// Aggregate visible events. All groups are returned on one page.
pub fn count(stores: &Stores, group: &str, period: &str) -> Result<CountReport, CliError> {
    let engine = QueryEngine::new(stores.events.clone(), stores.rules.clone()).with_page_size(u64::MAX);
    let params = vec![
        ("type".to_owned(), group.to_owned()),
        ("period".to_owned(), period.to_owned()),
    ];
    let page = engine.count_events(&params, Utc::now())?;
    Ok(CountReport {
        group: group.to_owned(),
        period: period.to_owned(),
        groups: page.count,
        rows: page.results,
    })
}

/// Physically delete every stored event, including soft-deleted ones.
pub fn purge(stores: &Stores, confirmed: bool) -> Result<PurgeReport, CliError> {
    if !confirmed {
        return Err(CliError::Command(
            "refusing to purge events without --yes".to_owned(),
        ));
    }
    let deleted = stores.events.purge()?;
    warn!(deleted, "event store purged");
    Ok(PurgeReport { deleted })
}

/// Aggregation result.
#[derive(Debug, Serialize)]
pub struct CountReport {
    pub group: String,
    pub period: String,
    pub groups: u64,
    pub rows: Vec<CountRow>,
}

impl Render for CountReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Event counts by {} (period: {})",
            self.group.bold(),
            self.period
        )?;
        if self.rows.is_empty() {
            writeln!(w, "  No events.")?;
            return Ok(());
        }
        for row in &self.rows {
            match row {
                CountRow::Sid { sid, count } => {
                    writeln!(w, "  {:>10}  sid {}", count.to_string().bold(), sid)?;
                }
                CountRow::Addr {
                    src_addr,
                    dst_addr,
                    count,
                } => {
                    writeln!(
                        w,
                        "  {:>10}  {} -> {}",
                        count.to_string().bold(),
                        src_addr,
                        dst_addr
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Purge result.
#[derive(Debug, Serialize)]
pub struct PurgeReport {
    pub deleted: u64,
}

impl Render for PurgeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Purged {} events.", self.deleted.to_string().red().bold())
    }
}
