//! Concurrent execution of independent tasks.

use crate::error::{BachError, Result};
use crate::pipeline::{Bach, RunSummary};
use crate::registry::PluginRegistry;
use crate::task::Task;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct TaskRun {
    pub task_id: String,
    pub task_name: String,
    pub outcome: Result<RunSummary>,
}

/// Run every task on its own pipeline, at most `max_workers` at a time.
///
/// Workers pull the next task index from a shared counter, so a slow task
/// only holds up its own worker. Workers share nothing but the registry.
/// Results come back in input order whatever order the workers finish in.
pub fn run_tasks(registry: Arc<PluginRegistry>, tasks: &[Task], max_workers: usize) -> Vec<TaskRun> {
    let workers = max_workers.max(1).min(tasks.len());
    let next = AtomicUsize::new(0);
    let mut outcomes: Vec<Option<Result<RunSummary>>> = tasks.iter().map(|_| None).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let registry = registry.clone();
                let next = &next;
                scope.spawn(move || {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(task) = tasks.get(index) else {
                            break;
                        };
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            Bach::run_task(registry.clone(), task)
                        }))
                        .unwrap_or_else(|_| Err(BachError::Worker(task.name.clone())));
                        done.push((index, outcome));
                    }
                    done
                })
            })
            .collect();
        for handle in handles {
            if let Ok(done) = handle.join() {
                for (index, outcome) in done {
                    outcomes[index] = Some(outcome);
                }
            }
        }
    });

    tasks
        .iter()
        .zip(outcomes)
        .map(|(task, outcome)| {
            let outcome = outcome.unwrap_or_else(|| Err(BachError::Worker(task.name.clone())));
            if let Err(e) = &outcome {
                tracing::warn!(task = %task.name, error = %e, "task failed");
            }
            TaskRun {
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                outcome,
            }
        })
        .collect()
}
