use crate::cmd::run::{keep_stdout_for_json, print_summary};
use crate::output::{print_json, print_table};
use anyhow::Context;
use bach_core::batch::run_tasks;
use bach_core::config::BachConfig;
use bach_core::query::QuerySource;
use bach_core::store::{TaskDb, TaskStore};
use bach_core::task::Task;
use bach_core::{Bach, BachError, PluginRegistry};
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// List saved tasks, newest first
    List,

    /// Show one task as YAML (or JSON with --json)
    Show { id: String },

    /// Replay saved tasks
    Run {
        /// Task id (omit with --all)
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,

        /// Run every saved task
        #[arg(long)]
        all: bool,

        /// Tasks running at the same time
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },

    /// Delete a saved task
    Delete { id: String },

    /// Import a task from a YAML file
    Import { file: PathBuf },
}

pub(crate) fn open_store(config: &BachConfig) -> anyhow::Result<TaskDb> {
    TaskDb::open(&config.task_db)
        .with_context(|| format!("cannot open task store {}", config.task_db.display()))
}

pub fn run(config: &BachConfig, subcommand: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match subcommand {
        TaskSubcommand::List => list(&store, json),
        TaskSubcommand::Show { id } => show(&store, &id, json),
        TaskSubcommand::Run { id, all, workers } => {
            let tasks = match id {
                Some(id) => vec![store.load(&id)?],
                None if all => store.list()?,
                None => anyhow::bail!("give a task id or --all"),
            };
            replay(config, &tasks, workers, json)
        }
        TaskSubcommand::Delete { id } => {
            if !store.delete(&id)? {
                return Err(BachError::TaskNotFound(id).into());
            }
            if json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted task {id}");
            }
            Ok(())
        }
        TaskSubcommand::Import { file } => {
            let data = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let task = Task::from_yaml(&data)?;
            let registry = Arc::new(PluginRegistry::from_config(config)?);
            Bach::from_task(registry, &task)
                .with_context(|| format!("task '{}' does not build a pipeline", task.name))?;
            let id = store.save(&task)?;
            if json {
                print_json(&task)?;
            } else {
                println!("Imported task '{}' ({id})", task.name);
            }
            Ok(())
        }
    }
}

fn source(task: &Task) -> String {
    match &task.query {
        Some(QuerySource::Area(area)) => format!("area:{area}"),
        Some(QuerySource::Raw(_)) => "query".to_string(),
        None => "-".to_string(),
    }
}

fn list(store: &TaskDb, json: bool) -> anyhow::Result<()> {
    let tasks = store.list()?;
    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No saved tasks.");
        return Ok(());
    }
    let rows = tasks
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.name.clone(),
                source(t),
                t.rules.len().to_string(),
                t.schedule.clone().unwrap_or_else(|| "-".to_string()),
                t.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "SOURCE", "RULES", "SCHEDULE", "CREATED"], rows);
    Ok(())
}

fn show(store: &TaskDb, id: &str, json: bool) -> anyhow::Result<()> {
    let task = store.load(id)?;
    if json {
        print_json(&task)
    } else {
        print!("{}", serde_yaml::to_string(&task)?);
        Ok(())
    }
}

fn replay(config: &BachConfig, tasks: &[Task], workers: usize, json: bool) -> anyhow::Result<()> {
    let registry = Arc::new(PluginRegistry::from_config(config)?);
    let runs = if json {
        let tasks: Vec<Task> = tasks
            .iter()
            .cloned()
            .map(|mut task| {
                for channel in &mut task.notifiers {
                    keep_stdout_for_json(&channel.name, &mut channel.params);
                }
                task
            })
            .collect();
        run_tasks(registry, &tasks, workers)
    } else {
        run_tasks(registry, tasks, workers)
    };
    let failed = runs.iter().filter(|r| r.outcome.is_err()).count();

    if json {
        let entries: Vec<_> = runs
            .iter()
            .map(|r| match &r.outcome {
                Ok(summary) => serde_json::json!({
                    "task_id": r.task_id,
                    "task_name": r.task_name,
                    "summary": summary,
                }),
                Err(e) => serde_json::json!({
                    "task_id": r.task_id,
                    "task_name": r.task_name,
                    "error": e.to_string(),
                }),
            })
            .collect();
        print_json(&entries)?;
    } else {
        for run in &runs {
            println!("== {} ({})", run.task_name, run.task_id);
            match &run.outcome {
                Ok(summary) => print_summary(summary, false)?,
                Err(e) => println!("failed: {e}"),
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} task(s) failed", runs.len());
    }
    Ok(())
}
