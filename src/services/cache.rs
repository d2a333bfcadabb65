//! Best-effort mirror of each user's device and event lists.
//!
//! The cache is never authoritative: mutations invalidate rather than write through,
//! corrupt entries read as misses and substrate failures fall back to the repository.

use crate::common::AppError;
use crate::models::{DeviceView, EventView};
use crate::services::DeviceService;
use crate::utils::TtlCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Key/value substrate holding serialized lists.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn put(&self, key: &str, value: String) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
    /// Substrates without local expiry have nothing to purge.
    fn purge_expired(&self) -> usize {
        0
    }
}

impl CacheStore for TtlCache<String, String> {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(TtlCache::get(self, key))
    }
    fn put(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.insert(key.to_string(), value);
        Ok(())
    }
    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.remove(key);
        Ok(())
    }
    fn clear(&self) -> anyhow::Result<()> {
        TtlCache::clear(self);
        Ok(())
    }
    fn purge_expired(&self) -> usize {
        TtlCache::purge_expired(self)
    }
}

fn devices_key(user: &str) -> String {
    format!("devices:{user}")
}

/// The user is length-prefixed so no (user, device) pair can alias another.
fn events_key(user: &str, device_id: &str) -> String {
    format!("events:{}:{user}:{device_id}", user.len())
}

/// Which path served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Hit,
    Miss,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::Hit => "hit",
            CacheSource::Miss => "miss",
        }
    }
}

impl Display for CacheSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Cached<T> {
    pub value: T,
    pub source: CacheSource,
}

pub struct CacheMirror {
    store: Arc<dyn CacheStore>,
    repository: Arc<DeviceService>,
}

impl CacheMirror {
    pub fn new(store: Arc<dyn CacheStore>, repository: Arc<DeviceService>) -> Self {
        Self { store, repository }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(key, reason = ?err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, reason = %err, "dropping corrupt cache entry");
                self.delete(key);
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.store.put(key, raw));
        if let Err(err) = result {
            tracing::warn!(key, reason = ?err, "cache write failed");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(err) = self.store.delete(key) {
            tracing::warn!(key, reason = ?err, "cache delete failed");
        }
    }

    pub fn read_devices(&self, user: &str) -> Option<Vec<DeviceView>> {
        self.read(&devices_key(user))
    }

    pub fn read_events(&self, user: &str, device_id: &str) -> Option<Vec<EventView>> {
        self.read(&events_key(user, device_id))
    }

    pub fn write_devices(&self, user: &str, views: &[DeviceView]) {
        self.write(&devices_key(user), views)
    }

    pub fn write_events(&self, user: &str, device_id: &str, views: &[EventView]) {
        self.write(&events_key(user, device_id), views)
    }

    pub fn invalidate_devices(&self, user: &str) {
        self.delete(&devices_key(user))
    }

    pub fn invalidate_events(&self, user: &str, device_id: &str) {
        self.delete(&events_key(user, device_id))
    }

    pub fn clear(&self) {
        match self.store.clear() {
            Ok(_) => tracing::info!("cache cleared"),
            Err(err) => tracing::warn!(reason = ?err, "cache clear failed"),
        }
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    /// Rebuilds the cached device list of `user` and the event list of each device.
    ///
    /// Stops at the first device whose events cannot be read, after invalidating that
    /// device's entry. Devices already written stay cached.
    pub async fn repopulate(&self, user: &str) -> Result<(), AppError> {
        let devices = match self.repository.list_devices(user).await {
            Ok(devices) => devices,
            Err(err) => {
                self.invalidate_devices(user);
                return Err(err);
            }
        };
        let views = devices.iter().map(DeviceView::from).collect::<Vec<_>>();
        self.write_devices(user, &views);
        for device in &devices {
            match self.repository.list_events(user, Some(&device.id)).await {
                Ok(events) => {
                    let views = events.into_iter().map(EventView::from).collect::<Vec<_>>();
                    self.write_events(user, &device.id, &views);
                }
                Err(err) => {
                    tracing::warn!(user, device_id = %device.id, "repopulation aborted");
                    self.invalidate_events(user, &device.id);
                    return Err(err);
                }
            }
        }
        tracing::debug!(user, devices = devices.len(), "cache repopulated");
        Ok(())
    }

    /// Read-through device list.
    pub async fn devices(&self, user: &str) -> Result<Cached<Vec<DeviceView>>, AppError> {
        if let Some(value) = self.read_devices(user) {
            tracing::debug!(user, source = %CacheSource::Hit, "devices served");
            return Ok(Cached {
                value,
                source: CacheSource::Hit,
            });
        }
        let value = self
            .repository
            .list_devices(user)
            .await?
            .into_iter()
            .map(DeviceView::from)
            .collect::<Vec<_>>();
        self.write_devices(user, &value);
        tracing::debug!(user, source = %CacheSource::Miss, "devices served");
        Ok(Cached {
            value,
            source: CacheSource::Miss,
        })
    }

    /// Read-through event list of one device.
    ///
    /// Entries are keyed by the requesting user and only written once the repository
    /// accepted that user as owner, so a hit needs no ownership check.
    pub async fn events(
        &self,
        user: &str,
        device_id: &str,
    ) -> Result<Cached<Vec<EventView>>, AppError> {
        if let Some(value) = self.read_events(user, device_id) {
            tracing::debug!(user, device_id, source = %CacheSource::Hit, "events served");
            return Ok(Cached {
                value,
                source: CacheSource::Hit,
            });
        }
        let value = self
            .repository
            .list_events(user, Some(device_id))
            .await?
            .into_iter()
            .map(EventView::from)
            .collect::<Vec<_>>();
        self.write_events(user, device_id, &value);
        tracing::debug!(user, device_id, source = %CacheSource::Miss, "events served");
        Ok(Cached {
            value,
            source: CacheSource::Miss,
        })
    }
}
