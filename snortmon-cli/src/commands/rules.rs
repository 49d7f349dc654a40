//! `snortmon rules` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use snortmon_core::config::SnortmonConfig;
use snortmon_core::types::Rule;
use snortmon_ingest::{RefreshSettings, RuleUpdater};
use snortmon_query::{Page, QueryEngine};
use snortmon_storage::Stores;

use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config: &SnortmonConfig,
    stores: Stores,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::Update => {
            let report = update(RefreshSettings::from_core(&config.rules), &stores).await?;
            writer.render(&report)
        }
        RulesAction::List {
            sid,
            rev,
            gid,
            page,
        } => {
            let engine = QueryEngine::new(stores.events.clone(), stores.rules.clone())
                .with_page_size(config.api.page_size as u64);
            let filters = RuleListFilters { sid, rev, gid, page };
            let report = tokio::task::spawn_blocking(move || list(&engine, &filters))
                .await
                .map_err(|e| CliError::Command(format!("rules list task failed: {e}")))??;
            writer.render(&report)
        }
    }
}

/// Run the update and dump commands, then load the dump into the catalog.
pub async fn update(settings: RefreshSettings, stores: &Stores) -> Result<RuleUpdateReport, CliError> {
    settings.validate()?;
    let dump_path = settings.dump_path.display().to_string();
    let updater = RuleUpdater::new(settings, stores.rules.clone());

    info!(%dump_path, "refreshing rule catalog");
    let report = updater.refresh().await?;

    Ok(RuleUpdateReport {
        dump_path,
        added: report.added,
        skipped: report.skipped,
        invalid: report.invalid,
    })
}

/// `rules list` filter flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleListFilters {
    pub sid: Option<u32>,
    pub rev: Option<u32>,
    pub gid: Option<u32>,
    pub page: u64,
}

impl RuleListFilters {
    fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let fields = [("sid", self.sid), ("rev", self.rev), ("gid", self.gid)];
        for (name, value) in fields {
            if let Some(value) = value {
                params.push((name.to_owned(), value.to_string()));
            }
        }
        params.push(("page".to_owned(), self.page.to_string()));
        params
    }
}

/// List one page of catalog rules.
pub fn list(engine: &QueryEngine, filters: &RuleListFilters) -> Result<RuleListReport, CliError> {
    let page = engine.list_rules(&filters.params())?;
    Ok(RuleListReport::new(filters.page, page))
}

/// Result of a catalog refresh.
#[derive(Debug, Serialize)]
pub struct RuleUpdateReport {
    pub dump_path: String,
    pub added: u64,
    pub skipped: u64,
    pub invalid: u64,
}

impl Render for RuleUpdateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule update: {}", "OK".green().bold())?;
        writeln!(w, "  Dump:    {}", self.dump_path)?;
        writeln!(w, "  Added:   {}", self.added.to_string().green())?;
        writeln!(w, "  Present: {}", self.skipped)?;
        if self.invalid > 0 {
            writeln!(w, "  Invalid: {}", self.invalid.to_string().yellow())?;
        }
        Ok(())
    }
}

/// A page of catalog rules.
#[derive(Debug, Serialize)]
pub struct RuleListReport {
    pub page: u64,
    pub count: u64,
    pub next: Option<u64>,
    pub previous: Option<u64>,
    pub rules: Vec<RuleEntry>,
}

/// A single rule row.
#[derive(Debug, Serialize)]
pub struct RuleEntry {
    pub sid: u32,
    pub rev: u32,
    pub gid: u32,
    pub action: String,
    pub message: String,
}

impl From<Rule> for RuleEntry {
    fn from(rule: Rule) -> Self {
        Self {
            sid: rule.key.sid,
            rev: rule.key.rev,
            gid: rule.key.gid,
            action: rule.action,
            message: rule.message,
        }
    }
}

impl RuleListReport {
    fn new(page_number: u64, page: Page<Rule>) -> Self {
        let page = page.map(RuleEntry::from);
        Self {
            page: page_number,
            count: page.count,
            next: page.next,
            previous: page.previous,
            rules: page.results,
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.rules.is_empty() {
            writeln!(w, "No rules found.")?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<12} {:<5} {:<5} {:<8} {}",
            "SID".bold(),
            "REV".bold(),
            "GID".bold(),
            "ACTION".bold(),
            "MESSAGE".bold()
        )?;
        for rule in &self.rules {
            let action = match rule.action.as_str() {
                "block" | "drop" | "reject" => rule.action.red(),
                "alert" => rule.action.yellow(),
                _ => rule.action.normal(),
            };
            writeln!(
                w,
                "{:<12} {:<5} {:<5} {:<8} {}",
                rule.sid, rule.rev, rule.gid, action, rule.message
            )?;
        }

        writeln!(w)?;
        write!(w, "Page {} ({} rules total)", self.page, self.count)?;
        if let Some(next) = self.next {
            write!(w, ", next: --page {next}")?;
        }
        writeln!(w)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snortmon_core::store::RuleCatalog;
    use snortmon_core::types::RuleKey;
    use snortmon_query::QueryError;

    fn stores_with_rules(count: u32) -> Stores {
        let stores = Stores::in_memory();
        for sid in 1..=count {
            let rule = Rule::new(RuleKey::new(sid, 1, 1), "alert", format!("rule {sid}"));
            stores.rules.insert_if_absent(&rule).unwrap();
        }
        stores
    }

    fn engine(stores: &Stores, page_size: u64) -> QueryEngine {
        QueryEngine::new(stores.events.clone(), stores.rules.clone()).with_page_size(page_size)
    }

    #[test]
    fn list_pages_through_catalog() {
        let stores = stores_with_rules(5);
        let engine = engine(&stores, 2);

        let first = list(&engine, &RuleListFilters { page: 1, ..Default::default() }).unwrap();
        assert_eq!(first.count, 5);
        assert_eq!(first.rules.len(), 2);
        assert_eq!(first.next, Some(2));

        let last = list(&engine, &RuleListFilters { page: 3, ..Default::default() }).unwrap();
        assert_eq!(last.rules.len(), 1);
        assert_eq!(last.rules[0].sid, 5);
    }

    #[test]
    fn list_filters_by_sid() {
        let stores = stores_with_rules(3);
        let filters = RuleListFilters {
            sid: Some(2),
            page: 1,
            ..Default::default()
        };
        let report = list(&engine(&stores, 50), &filters).unwrap();
        assert_eq!(report.count, 1);
        assert_eq!(report.rules[0].message, "rule 2");
    }

    #[test]
    fn list_past_last_page_is_query_error() {
        let stores = stores_with_rules(1);
        let err = list(&engine(&stores, 50), &RuleListFilters { page: 2, ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, CliError::Query(QueryError::PageNotFound)));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn update_requires_dump_command() {
        let settings = RefreshSettings {
            dump_command: Vec::new(),
            ..Default::default()
        };
        let err = update(settings, &Stores::in_memory()).await.unwrap_err();
        assert!(err.to_string().contains("dump_command"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn update_loads_dump_output() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RefreshSettings {
            update_command: Vec::new(),
            dump_command: vec![
                "echo".to_owned(),
                r#"{"gid": 1, "sid": 42, "rev": 3, "msg": "from dump", "action": "drop"}"#.to_owned(),
            ],
            dump_path: dir.path().join("rules.json"),
            ..Default::default()
        };
        let stores = Stores::in_memory();

        let report = update(settings.clone(), &stores).await.unwrap();
        assert_eq!(report.added, 1);

        let again = update(settings, &stores).await.unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(again.skipped, 1);
        assert!(stores.rules.resolve(RuleKey::new(42, 3, 1)).unwrap().is_some());
    }

    #[test]
    fn render_list_text_shows_rows_and_next_page() {
        let report = RuleListReport {
            page: 1,
            count: 3,
            next: Some(2),
            previous: None,
            rules: vec![RuleEntry {
                sid: 1_000_001,
                rev: 2,
                gid: 1,
                action: "alert".to_owned(),
                message: "TEST rule".to_owned(),
            }],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("1000001"));
        assert!(output.contains("TEST rule"));
        assert!(output.contains("--page 2"));
    }

    #[test]
    fn render_empty_list() {
        let report = RuleListReport {
            page: 1,
            count: 0,
            next: None,
            previous: None,
            rules: Vec::new(),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "No rules found.\n");
    }
}
