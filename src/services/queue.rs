//! In-process task queue decoupling writes from cache maintenance and push fan-out.
//!
//! Delivery is at least once: a job failing with a transient error is re-enqueued
//! with exponential backoff until `max_attempts` is reached. Both job kinds are
//! idempotent, so a duplicate run only repeats work.

use crate::common::{ApiResult, AppError};
use crate::services::{CacheMirror, DeviceService, NotifyService};
use futures::future::BoxFuture;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Rebuild the cache of `user`, or of every user owning a device when absent.
    /// Event caches of `stale_devices` are dropped first.
    CacheResync {
        user: Option<String>,
        stale_devices: Vec<String>,
    },
    PushNotify {
        user: String,
        triggering_device: Option<String>,
        sync_token: Option<String>,
    },
}

impl Display for Job {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::CacheResync { user: Some(user), .. } => write!(f, "cache-resync({user})"),
            Job::CacheResync { user: None, .. } => f.write_str("cache-resync(*)"),
            Job::PushNotify { user, .. } => write!(f, "push-notify({user})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(1 << attempt.saturating_sub(1).min(16))
    }
}

struct Queued {
    job: Job,
    attempt: u32,
}

#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Queued>,
}

pub struct TaskReceiver {
    receiver: mpsc::UnboundedReceiver<Queued>,
}

#[cfg(test)]
impl TaskReceiver {
    pub(crate) fn try_next(&mut self) -> Option<Job> {
        self.receiver.try_recv().ok().map(|it| it.job)
    }
}

impl TaskQueue {
    pub fn new() -> (TaskQueue, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (TaskQueue { sender }, TaskReceiver { receiver })
    }

    pub fn enqueue(&self, job: Job) -> ApiResult<()> {
        self.push(Queued { job, attempt: 1 })
    }

    fn push(&self, queued: Queued) -> ApiResult<()> {
        self.sender.send(queued).map_err(|err| {
            AppError::Unavailable(anyhow::anyhow!("task queue closed: {}", err.0.job))
        })
    }

    pub fn trigger_sync(
        &self,
        user: &str,
        triggering_device: Option<&str>,
        sync_token: Option<&str>,
    ) -> ApiResult<()> {
        self.enqueue(Job::PushNotify {
            user: user.to_string(),
            triggering_device: triggering_device.map(str::to_string),
            sync_token: sync_token.map(str::to_string),
        })
    }

    pub fn trigger_cache_resync(&self, user: Option<&str>) -> ApiResult<()> {
        self.enqueue(Job::CacheResync {
            user: user.map(str::to_string),
            stale_devices: Vec::new(),
        })
    }

    /// Schedules the follow-up of a committed write: a cache rebuild for `user` and a
    /// sync push to every other device of theirs.
    pub fn after_write(
        &self,
        user: &str,
        triggering_device: Option<&str>,
        stale_devices: Vec<String>,
    ) -> ApiResult<()> {
        self.enqueue(Job::CacheResync {
            user: Some(user.to_string()),
            stale_devices,
        })?;
        self.trigger_sync(user, triggering_device, None)
    }
}

/// What the worker calls for every dequeued job.
pub trait JobHandler: Send + Sync {
    fn handle<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, ApiResult<()>>;
}

/// Executes jobs against the repository, cache and dispatcher.
pub struct JobRunner {
    repository: Arc<DeviceService>,
    cache: Arc<CacheMirror>,
    notify: Arc<NotifyService>,
}

impl JobRunner {
    pub fn new(
        repository: Arc<DeviceService>,
        cache: Arc<CacheMirror>,
        notify: Arc<NotifyService>,
    ) -> Self {
        Self {
            repository,
            cache,
            notify,
        }
    }

    pub async fn run(&self, job: &Job) -> ApiResult<()> {
        match job {
            Job::CacheResync {
                user: Some(user),
                stale_devices,
            } => {
                for device_id in stale_devices {
                    self.cache.invalidate_events(user, device_id);
                }
                self.cache.repopulate(user).await
            }
            Job::CacheResync { user: None, .. } => self.resync_everyone().await,
            Job::PushNotify {
                user,
                triggering_device,
                sync_token,
            } => self
                .notify
                .notify(user, triggering_device.as_deref(), sync_token.as_deref())
                .await
                .map(|_| ()),
        }
    }

    /// One user's failure is logged and skipped; only failing to list the users
    /// fails the job.
    async fn resync_everyone(&self) -> ApiResult<()> {
        let users = self.repository.list_users_with_devices().await?;
        let mut failed = 0usize;
        for user in &users {
            if let Err(err) = self.cache.repopulate(user).await {
                tracing::warn!(user, reason = %err, "cache repopulation failed");
                failed += 1;
            }
        }
        tracing::info!(users = users.len(), failed, "cache resynced for every user");
        Ok(())
    }
}

impl JobHandler for JobRunner {
    fn handle<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(self.run(job))
    }
}

/// Drains the queue until `shutdown` fires, running jobs concurrently.
pub async fn run_worker<H>(
    queue: TaskQueue,
    mut receiver: TaskReceiver,
    handler: Arc<H>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    H: JobHandler + ?Sized + 'static,
{
    let mut tasks = JoinSet::new();
    loop {
        let queued = tokio::select! {
            _ = shutdown.cancelled() => break,
            queued = receiver.receiver.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
            Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = finished {
                    tracing::error!(reason = %err, "job task panicked");
                }
                continue;
            }
        };
        let handler = handler.clone();
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let Queued { job, attempt } = queued;
            let outcome = handler.handle(&job).await;
            let Err(err) = outcome else {
                tracing::debug!(job = %job, attempt, "job done");
                return;
            };
            if !err.is_transient() {
                tracing::warn!(job = %job, attempt, reason = %err, "job failed permanently");
                return;
            }
            if attempt >= policy.max_attempts {
                tracing::error!(job = %job, attempt, reason = %err, "job abandoned");
                return;
            }
            let delay = policy.delay(attempt);
            tracing::warn!(
                job = %job,
                attempt,
                delay = ?delay,
                reason = %err,
                "job failed, retrying"
            );
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = queue.push(Queued { job, attempt: attempt + 1 });
                }
            }
        });
    }
    tasks.shutdown().await;
    tracing::debug!("task worker stopped");
    Ok(())
}
