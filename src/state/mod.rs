use crate::config::Config;
use crate::extractors::AuthKeys;
use crate::services::{
    CacheMirror, CacheStore, DeviceService, HttpPushTransport, JobRunner, LogPushTransport,
    NotifyService, PushTransport, Store, TaskQueue, TaskReceiver,
};
use crate::utils::TtlCache;
use axum::extract::FromRef;
use std::sync::Arc;

/// Everything a handler may touch. Built once at startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<DeviceService>,
    pub cache: Arc<CacheMirror>,
    pub queue: TaskQueue,
    pub runner: Arc<JobRunner>,
    pub auth: Arc<AuthKeys>,
}

impl FromRef<AppState> for Arc<AuthKeys> {
    fn from_ref(input: &AppState) -> Self {
        input.auth.clone()
    }
}

fn build_transport(config: &Config) -> anyhow::Result<Arc<dyn PushTransport>> {
    let push = &config.push;
    match &push.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint, "push gateway configured");
            Ok(Arc::new(HttpPushTransport::build(
                endpoint.clone(),
                push.api_key.clone(),
                push.retries,
                push.backoff(),
                push.timeout(),
            )?))
        }
        None => {
            tracing::warn!("no push gateway configured, sync messages will only be logged");
            Ok(Arc::new(LogPushTransport))
        }
    }
}

impl AppState {
    pub fn build(store: Store, config: &Config) -> anyhow::Result<(AppState, TaskReceiver)> {
        let transport = build_transport(config)?;
        let cache_store: Arc<dyn CacheStore> =
            Arc::new(TtlCache::<String, String>::new(config.cache.ttl()));
        Ok(Self::assemble(
            store,
            cache_store,
            transport,
            AuthKeys::new(&config.authorize),
        ))
    }

    pub fn assemble(
        store: Store,
        cache_store: Arc<dyn CacheStore>,
        transport: Arc<dyn PushTransport>,
        auth: AuthKeys,
    ) -> (AppState, TaskReceiver) {
        let repository = Arc::new(DeviceService::new(store));
        let cache = Arc::new(CacheMirror::new(cache_store, repository.clone()));
        let notify = Arc::new(NotifyService::new(repository.clone(), transport));
        let runner = Arc::new(JobRunner::new(repository.clone(), cache.clone(), notify));
        let (queue, receiver) = TaskQueue::new();
        let state = AppState {
            repository,
            cache,
            queue,
            runner,
            auth: Arc::new(auth),
        };
        (state, receiver)
    }
}
