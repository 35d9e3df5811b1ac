use crate::output::print_json;
use anyhow::Context;
use bach_core::config::BachConfig;
use bach_core::notifier::{render_table, CONSOLE_CHANNEL};
use bach_core::params::Params;
use bach_core::store::TaskStore;
use bach_core::{Bach, PluginRegistry, RunSummary};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct RunArgs {
    /// Area whose query template builds the report query
    #[arg(long, conflicts_with = "query")]
    pub area: Option<String>,

    /// Raw query sent to the reporting backend as-is
    #[arg(long)]
    pub query: Option<String>,

    /// Account ids (space or comma separated)
    #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
    pub accounts: Vec<String>,

    /// Rule expression; repeat to combine with AND
    #[arg(long = "rule")]
    pub rules: Vec<String>,

    /// Notification channel; repeat for several (default: config default_notifiers)
    #[arg(long)]
    pub notify: Vec<String>,

    /// Actor for the filtered rows, or `none` (default: the area's actor)
    #[arg(long)]
    pub actor: Option<String>,

    /// Read the report from a JSON/YAML file instead of the backend
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Cron schedule stored with the saved task
    #[arg(long, requires = "save")]
    pub schedule: Option<String>,

    /// Save the configuration as a task with this name instead of running it
    #[arg(long)]
    pub save: Option<String>,
}

pub fn run(
    config: &BachConfig,
    args: RunArgs,
    mut params: BTreeMap<String, Params>,
    json: bool,
) -> anyhow::Result<()> {
    let registry = Arc::new(PluginRegistry::from_config(config)?);
    let area_params = params.remove("area").unwrap_or_default();
    let notify_params = params.remove("notify").unwrap_or_default();

    let mut bach = Bach::new(registry.clone());
    if let Some(area) = &args.area {
        bach.with_type(area)?;
    }
    if let Some(query) = &args.query {
        bach.with_query(query)?;
    }
    bach.with_accounts(args.accounts.iter().map(|a| a.trim().to_string()))?
        .with_params(area_params)?;
    bach.add_rules(&args.rules).context("invalid rule")?;

    if let Some(path) = &args.report {
        let fetcher_params = Params::from([("path".to_string(), path.display().to_string())]);
        bach.with_fetcher("file", fetcher_params)?;
    }

    match args.actor.as_deref() {
        Some("none") => {
            bach.without_actor()?;
        }
        Some(name) => {
            bach.with_actor(name, Params::new())?;
        }
        None => {
            let default_actor = match &args.area {
                Some(area) => registry.area(area)?.default_actor.clone(),
                None => None,
            };
            if let Some(actor) = default_actor {
                bach.with_actor(&actor, Params::new())?;
            }
        }
    }

    let channels = if args.notify.is_empty() {
        &config.default_notifiers
    } else {
        &args.notify
    };
    for channel in channels {
        let mut channel_params = notify_params.clone();
        if json {
            keep_stdout_for_json(channel, &mut channel_params);
        }
        bach.add_notify(channel, channel_params)?;
    }

    if let Some(name) = &args.save {
        let mut task = bach.as_task(name)?;
        if let Some(schedule) = &args.schedule {
            task = task.with_schedule(schedule)?;
        }
        let store = super::task::open_store(config)?;
        let id = store.save(&task)?;
        if json {
            print_json(&task)?;
        } else {
            println!("Saved task '{name}' ({id})");
        }
        return Ok(());
    }

    let summary = bach.run()?;
    print_summary(&summary, json)
}

/// With `--json` stdout carries one JSON document, so the console channel
/// is moved to stderr.
pub(crate) fn keep_stdout_for_json(channel: &str, params: &mut Params) {
    if channel == CONSOLE_CHANNEL {
        params.insert("stream".to_string(), "stderr".to_string());
    }
}

pub(crate) fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(summary);
    }
    // The console channel already printed the table.
    if !summary.notifications.delivered.iter().any(|c| c == CONSOLE_CHANNEL) {
        println!("{}", render_table(&summary.result));
    }
    for failure in &summary.notifications.failed {
        eprintln!(
            "warning: notification to '{}' failed: {}",
            failure.channel, failure.error
        );
    }
    Ok(())
}
