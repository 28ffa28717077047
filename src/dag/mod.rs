// src/dag/mod.rs

//! A small dependency graph of blocking tasks.
//!
//! Each task receives the outputs of its upstream tasks, in the order the
//! upstreams were declared. Ready tasks run on Tokio's blocking pool, at most
//! `max_parallel` at a time; a failed task is retried after a delay and, once
//! out of attempts, every task downstream of it is skipped.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, Semaphore},
    time::Instant,
};
use tracing::{error, info, warn};

use crate::config::DagConfig;

pub type TaskFn<T> = Arc<dyn Fn(&[Arc<T>]) -> Result<T> + Send + Sync>;

struct Task<T> {
    id: String,
    upstream: Vec<String>,
    run: TaskFn<T>,
}

pub struct DagBuilder<T> {
    tasks: Vec<Task<T>>,
}

impl<T> DagBuilder<T> {
    /// Add a task that runs after every task in `upstream` succeeded.
    pub fn task<F>(mut self, id: &str, upstream: &[&str], run: F) -> Self
    where
        F: Fn(&[Arc<T>]) -> Result<T> + Send + Sync + 'static,
    {
        self.tasks.push(Task {
            id: id.to_string(),
            upstream: upstream.iter().map(|u| u.to_string()).collect(),
            run: Arc::new(run),
        });
        self
    }

    /// Validate the graph: ids unique, upstreams known, no cycles.
    pub fn build(self) -> Result<Dag<T>> {
        let mut index = HashMap::new();
        for (i, t) in self.tasks.iter().enumerate() {
            if index.insert(t.id.clone(), i).is_some() {
                bail!("duplicate task id `{}`", t.id);
            }
        }

        let mut deps = Vec::with_capacity(self.tasks.len());
        for t in &self.tasks {
            let ups = t
                .upstream
                .iter()
                .map(|u| {
                    index
                        .get(u)
                        .copied()
                        .ok_or_else(|| anyhow!("task `{}` depends on unknown task `{}`", t.id, u))
                })
                .collect::<Result<Vec<_>>>()?;
            deps.push(ups);
        }

        // Kahn's algorithm; anything left unvisited sits on a cycle
        let n = self.tasks.len();
        let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut downstream = vec![Vec::new(); n];
        for (i, ups) in deps.iter().enumerate() {
            for &u in ups {
                downstream[u].push(i);
            }
        }
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut visited = 0;
        while let Some(i) = queue.pop_front() {
            visited += 1;
            for &d in &downstream[i] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    queue.push_back(d);
                }
            }
        }
        if visited != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| pending[i] > 0)
                .map(|i| self.tasks[i].id.as_str())
                .collect();
            bail!("task graph has a cycle through {}", stuck.join(", "));
        }

        Ok(Dag {
            tasks: self.tasks,
            deps,
        })
    }
}

pub struct Dag<T> {
    tasks: Vec<Task<T>>,
    deps: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Success,
    Failed,
    UpstreamFailed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::UpstreamFailed => "upstream_failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: String,
    pub state: TaskState,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Outcome of one run of the graph, tasks in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.tasks.iter().all(|t| t.state == TaskState::Success)
    }

    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.state != TaskState::Success)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

struct Finished<T> {
    index: usize,
    result: Result<T>,
    attempts: u32,
    elapsed: Duration,
}

impl<T: Send + Sync + 'static> Dag<T> {
    pub fn builder() -> DagBuilder<T> {
        DagBuilder { tasks: Vec::new() }
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    /// Upstream ids of `id`, if the task exists.
    pub fn upstream_of(&self, id: &str) -> Option<&[String]> {
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.upstream.as_slice())
    }

    /// Run every task once, honouring dependencies, and report per-task outcomes.
    pub async fn run(&self, cfg: &DagConfig) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let n = self.tasks.len();
        let sem = Arc::new(Semaphore::new(cfg.max_parallel.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<Finished<T>>();

        let mut outputs: Vec<Option<Arc<T>>> = vec![None; n];
        let mut reports: Vec<Option<TaskReport>> = vec![None; n];
        let mut started = vec![false; n];
        let mut running = 0usize;

        loop {
            // skip what can never run, launch what is ready
            let mut progressed = true;
            while progressed {
                progressed = false;
                for i in 0..n {
                    if started[i] {
                        continue;
                    }
                    let ups = &self.deps[i];
                    let blocked = ups.iter().any(|&u| {
                        reports[u]
                            .as_ref()
                            .map_or(false, |r| r.state != TaskState::Success)
                    });
                    if blocked {
                        warn!(task = %self.tasks[i].id, "upstream failed; skipping");
                        reports[i] = Some(TaskReport {
                            id: self.tasks[i].id.clone(),
                            state: TaskState::UpstreamFailed,
                            attempts: 0,
                            duration_ms: 0,
                            error: None,
                        });
                        started[i] = true;
                        progressed = true;
                        continue;
                    }
                    if ups.iter().all(|&u| outputs[u].is_some()) {
                        let inputs: Vec<Arc<T>> =
                            ups.iter().filter_map(|&u| outputs[u].clone()).collect();
                        self.launch(i, inputs, cfg, Arc::clone(&sem), tx.clone());
                        started[i] = true;
                        running += 1;
                    }
                }
            }

            if running == 0 {
                break;
            }
            let Some(done) = rx.recv().await else { break };
            running -= 1;

            let id = self.tasks[done.index].id.clone();
            let duration_ms = millis(done.elapsed);
            let report = match done.result {
                Ok(value) => {
                    info!(task = %id, attempts = done.attempts, elapsed = ?done.elapsed, "task succeeded");
                    outputs[done.index] = Some(Arc::new(value));
                    TaskReport {
                        id,
                        state: TaskState::Success,
                        attempts: done.attempts,
                        duration_ms,
                        error: None,
                    }
                }
                Err(e) => {
                    error!(task = %id, attempts = done.attempts, "task failed: {:#}", e);
                    TaskReport {
                        id,
                        state: TaskState::Failed,
                        attempts: done.attempts,
                        duration_ms,
                        error: Some(format!("{:#}", e)),
                    }
                }
            };
            reports[done.index] = Some(report);
        }

        let tasks = reports
            .into_iter()
            .zip(&self.tasks)
            .map(|(r, t)| {
                r.unwrap_or_else(|| TaskReport {
                    id: t.id.clone(),
                    state: TaskState::UpstreamFailed,
                    attempts: 0,
                    duration_ms: 0,
                    error: None,
                })
            })
            .collect();

        RunReport {
            started_at,
            duration_ms: millis(clock.elapsed()),
            tasks,
        }
    }

    fn launch(
        &self,
        index: usize,
        inputs: Vec<Arc<T>>,
        cfg: &DagConfig,
        sem: Arc<Semaphore>,
        tx: mpsc::UnboundedSender<Finished<T>>,
    ) {
        let id = self.tasks[index].id.clone();
        let run = Arc::clone(&self.tasks[index].run);
        let retries = cfg.retries;
        let delay = cfg.retry_delay;
        let inputs = Arc::new(inputs);

        tokio::spawn(async move {
            let start = Instant::now();
            let mut attempts = 0u32;
            let result = loop {
                attempts += 1;
                let outcome = match sem.acquire().await {
                    Ok(_permit) => {
                        info!(task = %id, attempt = attempts, "task started");
                        let run = Arc::clone(&run);
                        let inputs = Arc::clone(&inputs);
                        tokio::task::spawn_blocking(move || run(inputs.as_slice()))
                            .await
                            .map_err(|e| anyhow!("task `{}` panicked: {}", id, e))
                            .and_then(|r| r)
                    }
                    Err(e) => Err(anyhow!("task pool closed: {}", e)),
                };
                match outcome {
                    Ok(value) => break Ok(value),
                    Err(e) if attempts > retries => break Err(e),
                    Err(e) => {
                        warn!(
                            task = %id,
                            attempt = attempts,
                            retry_in = ?delay,
                            "task attempt failed: {:#}", e
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            };
            let _ = tx.send(Finished {
                index,
                result,
                attempts,
                elapsed: start.elapsed(),
            });
        });
    }
}
