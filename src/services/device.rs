use crate::common::AppError;
use crate::models::{DeviceEntity, EventEntity, EventType};
use crate::services::access::authorize;
use crate::services::store::{self, Store};
use crate::utils::now_millis;

/// Device and event repository.
///
/// Every user-facing operation checks existence first and ownership second, so a
/// missing resource always reports `*NotFound` before a foreign one reports
/// `Forbidden`.
pub struct DeviceService {
    store: Store,
}

pub struct AddEventArgs<'a> {
    pub id: &'a str,
    pub occurred_at: i64,
    pub kind: EventType,
    pub number: Option<&'a str>,
    pub name: Option<&'a str>,
    pub message: Option<&'a str>,
}

fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_argument(format!("{field} is required")));
    }
    Ok(())
}

fn check_owner(user: &str, device: &DeviceEntity) -> Result<(), AppError> {
    authorize(Some(user), &device.owner).check()
}

impl DeviceService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get_device(&self, user: &str, device_id: &str) -> Result<DeviceEntity, AppError> {
        let device = store::find_device(self.store.pool(), device_id)
            .await?
            .ok_or_else(|| AppError::DeviceNotFound(device_id.to_string()))?;
        check_owner(user, &device)?;
        Ok(device)
    }

    pub async fn list_devices(&self, user: &str) -> Result<Vec<DeviceEntity>, AppError> {
        Ok(store::devices_by_owner(self.store.pool(), user).await?)
    }

    /// Creates the device or updates the supplied fields; absent fields keep their
    /// stored value. A device registered by another owner is never taken over.
    pub async fn register_device(
        &self,
        user: &str,
        device_id: &str,
        name: Option<&str>,
        push_token: Option<&str>,
    ) -> Result<DeviceEntity, AppError> {
        require(device_id, "device id")?;
        let device = store::upsert_device(self.store.pool(), device_id, user, name, push_token)
            .await?
            .ok_or(AppError::Forbidden)?;
        tracing::info!(user, device_id, "device registered");
        Ok(device)
    }

    /// Removes one device with its events, or every device of `user` when
    /// `device_id` is `None`. Returns the ids actually removed.
    ///
    /// Removing every device stops at the first failure; the failure is only returned
    /// when nothing was removed before it.
    pub async fn unregister_device(
        &self,
        user: &str,
        device_id: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        let Some(device_id) = device_id else {
            let devices = store::devices_by_owner(self.store.pool(), user).await?;
            let mut removed = Vec::with_capacity(devices.len());
            for device in devices {
                match self.remove_device(&device.id).await {
                    Ok(true) => removed.push(device.id),
                    Ok(false) => {}
                    // removed devices must still reach the caller so their caches get dropped
                    Err(err) if !removed.is_empty() => {
                        tracing::warn!(
                            user,
                            device_id = %device.id,
                            reason = %err,
                            "unregister stopped early"
                        );
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
            tracing::info!(user, count = removed.len(), "devices unregistered");
            return Ok(removed);
        };
        let Some(device) = store::find_device(self.store.pool(), device_id).await? else {
            return Ok(Vec::new());
        };
        check_owner(user, &device)?;
        if !self.remove_device(device_id).await? {
            return Ok(Vec::new());
        }
        tracing::info!(user, device_id, "device unregistered");
        Ok(vec![device.id])
    }

    /// Events first, then the device, in one transaction.
    async fn remove_device(&self, device_id: &str) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;
        store::delete_events_of_device(&mut *tx, device_id).await?;
        let removed = store::delete_device(&mut *tx, device_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Every user owning at least one device.
    ///
    /// Not ownership scoped: only the maintenance path may call it.
    pub async fn list_users_with_devices(&self) -> Result<Vec<String>, AppError> {
        Ok(store::distinct_owners(self.store.pool()).await?)
    }

    /// Every device id known to the store, for maintenance sweeps.
    pub async fn list_device_ids(&self) -> Result<Vec<String>, AppError> {
        Ok(store::all_device_ids(self.store.pool()).await?)
    }

    /// Stores the event, overwriting an existing event with the same id on the same
    /// device so a retried request is harmless.
    pub async fn add_event(
        &self,
        user: &str,
        device_id: &str,
        args: AddEventArgs<'_>,
    ) -> Result<EventEntity, AppError> {
        require(device_id, "device id")?;
        require(args.id, "event id")?;
        let event = EventEntity {
            device_id: device_id.to_string(),
            id: args.id.to_string(),
            kind: args.kind,
            occurred_at: args.occurred_at,
            counterpart_number: args.number.map(str::to_string),
            counterpart_name: args.name.map(str::to_string),
            message: args.message.map(str::to_string),
            last_updated: now_millis(),
        };
        // ownership is checked by the insert itself, the lookup only explains a refusal
        if !store::put_owned_event(self.store.pool(), user, &event).await? {
            let device = store::find_device(self.store.pool(), device_id)
                .await?
                .ok_or_else(|| AppError::DeviceNotFound(device_id.to_string()))?;
            check_owner(user, &device)?;
            // owners never change, so an owned device here was created after the insert
            return Err(AppError::DeviceNotFound(device_id.to_string()));
        }
        tracing::info!(user, device_id, event_id = args.id, kind = %args.kind, "event added");
        Ok(event)
    }

    pub async fn get_event(
        &self,
        user: &str,
        device_id: &str,
        event_id: &str,
    ) -> Result<EventEntity, AppError> {
        let device = self.get_device(user, device_id).await?;
        store::find_event(self.store.pool(), &device.id, event_id)
            .await?
            .ok_or_else(|| AppError::EventNotFound(event_id.to_string()))
    }

    /// Events of one device, or of every device owned by `user`.
    pub async fn list_events(
        &self,
        user: &str,
        device_id: Option<&str>,
    ) -> Result<Vec<EventEntity>, AppError> {
        if let Some(device_id) = device_id {
            let device = self.get_device(user, device_id).await?;
            return Ok(store::events_by_device(self.store.pool(), &device.id).await?);
        }
        let mut events = Vec::new();
        for device in store::devices_by_owner(self.store.pool(), user).await? {
            events.extend(store::events_by_device(self.store.pool(), &device.id).await?);
        }
        Ok(events)
    }

    /// Deletes an event found by id alone.
    ///
    /// Event ids are only unique per device: a match on one of the caller's devices
    /// wins (lowest device id first); matches that all belong to other owners are
    /// `Forbidden`. `None` means there was nothing to delete.
    pub async fn delete_event(
        &self,
        user: &str,
        event_id: &str,
    ) -> Result<Option<EventEntity>, AppError> {
        let candidates = store::events_by_id(self.store.pool(), event_id).await?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut target = None;
        for event in candidates {
            let owned = store::find_device(self.store.pool(), &event.device_id)
                .await?
                .is_some_and(|device| device.is_owned_by(user));
            if owned {
                target = Some(event);
                break;
            }
        }
        let Some(event) = target else {
            return Err(AppError::Forbidden);
        };
        if !store::delete_event(self.store.pool(), &event.device_id, &event.id).await? {
            // removed concurrently
            return Ok(None);
        }
        tracing::info!(user, device_id = %event.device_id, event_id, "event deleted");
        Ok(Some(event))
    }

    /// Deletes the events of every device of `user`, one transaction per device.
    pub async fn delete_all_events(&self, user: &str) -> Result<u64, AppError> {
        let mut total = 0;
        for device in store::devices_by_owner(self.store.pool(), user).await? {
            let mut tx = self.store.begin().await?;
            total += store::delete_events_of_device(&mut *tx, &device.id).await?;
            tx.commit().await?;
        }
        tracing::info!(user, count = total, "every event deleted");
        Ok(total)
    }

    /// Maintenance sweep: drops events of `device_id` that occurred more than
    /// `max_age_ms` milliseconds ago.
    pub async fn retire_old_events(
        &self,
        device_id: &str,
        max_age_ms: i64,
    ) -> Result<u64, AppError> {
        let limit = now_millis().saturating_sub(max_age_ms);
        let mut tx = self.store.begin().await?;
        let removed = store::delete_events_before(&mut *tx, device_id, limit).await?;
        tx.commit().await?;
        if removed > 0 {
            tracing::debug!(device_id, removed, "old events retired");
        }
        Ok(removed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn service() -> DeviceService {
        service_with_store().await.0
    }

    /// Service plus a handle on its store, for tests that tamper with the schema.
    pub(crate) async fn service_with_store() -> (DeviceService, Store) {
        let store = Store::memory().await.unwrap();
        (DeviceService::new(store.clone()), store)
    }

    pub(crate) fn sms<'a>(id: &'a str, occurred_at: i64, number: &'a str) -> AddEventArgs<'a> {
        AddEventArgs {
            id,
            occurred_at,
            kind: EventType::ReceivedSms,
            number: Some(number),
            name: None,
            message: Some("hello"),
        }
    }

    #[tokio::test]
    async fn register_then_foreign_register_is_denied() {
        let service = service().await;
        service
            .register_device("u1", "A", Some("Phone"), None)
            .await
            .unwrap();
        let devices = service.list_devices("u1").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "A");
        assert_eq!(devices[0].name.as_deref(), Some("Phone"));

        let result = service
            .register_device("u2", "A", Some("Stolen"), Some("tok"))
            .await;
        assert!(matches!(result, Err(AppError::Forbidden)));
        assert_eq!(service.list_devices("u1").await.unwrap(), devices);
        assert!(service.list_devices("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_is_idempotent_and_keeps_absent_fields() {
        let service = service().await;
        let first = service
            .register_device("u1", "A", Some("Phone"), Some("tok"))
            .await
            .unwrap();
        let second = service
            .register_device("u1", "A", Some("Phone"), Some("tok"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let renamed = service
            .register_device("u1", "A", Some("Tablet"), None)
            .await
            .unwrap();
        assert_eq!(renamed.name.as_deref(), Some("Tablet"));
        assert_eq!(renamed.push_token.as_deref(), Some("tok"));
        assert_eq!(renamed.owner, "u1");
    }

    #[tokio::test]
    async fn register_requires_an_id() {
        let service = service().await;
        let result = service.register_device("u1", " ", None, None).await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn get_device_precedence() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        assert!(matches!(
            service.get_device("u2", "missing").await,
            Err(AppError::DeviceNotFound(_))
        ));
        assert!(matches!(
            service.get_device("u2", "A").await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(service.get_device("u1", "A").await.unwrap().id, "A");
    }

    #[tokio::test]
    async fn event_scenario() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        service
            .add_event("u1", "A", sms("e1", 1000, "123"))
            .await
            .unwrap();

        let event = service.get_event("u1", "A", "e1").await.unwrap();
        assert_eq!(event.counterpart_number.as_deref(), Some("123"));
        assert_eq!(event.kind, EventType::ReceivedSms);
        assert!(event.last_updated > 0);

        assert!(matches!(
            service.get_event("u2", "A", "e1").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            service.get_event("u1", "A", "e2").await,
            Err(AppError::EventNotFound(_))
        ));
        assert!(matches!(
            service.get_event("u1", "B", "e1").await,
            Err(AppError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn add_event_checks_device_then_owner() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        assert!(matches!(
            service.add_event("u1", "B", sms("e1", 1, "1")).await,
            Err(AppError::DeviceNotFound(_))
        ));
        assert!(matches!(
            service.add_event("u2", "A", sms("e1", 1, "1")).await,
            Err(AppError::Forbidden)
        ));
        assert!(service.list_events("u1", Some("A")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_event_overwrites_same_id() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        service.add_event("u1", "A", sms("e1", 1, "111")).await.unwrap();
        service.add_event("u1", "A", sms("e1", 2, "222")).await.unwrap();
        let events = service.list_events("u1", Some("A")).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].occurred_at, 2);
        assert_eq!(events[0].counterpart_number.as_deref(), Some("222"));
    }

    #[tokio::test]
    async fn list_events_unions_every_device() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        service.register_device("u1", "B", None, None).await.unwrap();
        service.register_device("u2", "C", None, None).await.unwrap();
        service.add_event("u1", "A", sms("e1", 1, "1")).await.unwrap();
        service.add_event("u1", "B", sms("e1", 2, "2")).await.unwrap();
        service.add_event("u2", "C", sms("e3", 3, "3")).await.unwrap();

        let events = service.list_events("u1", None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|it| it.device_id != "C"));
        assert!(matches!(
            service.list_events("u1", Some("C")).await,
            Err(AppError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn unregister_cascades_to_events() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        service.add_event("u1", "A", sms("e1", 1, "1")).await.unwrap();
        service.add_event("u1", "A", sms("e2", 2, "2")).await.unwrap();

        let removed = service.unregister_device("u1", Some("A")).await.unwrap();
        assert_eq!(removed, vec!["A".to_string()]);
        assert!(matches!(
            service.list_events("u1", Some("A")).await,
            Err(AppError::DeviceNotFound(_))
        ));
        assert_eq!(service.delete_event("u1", "e1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unregister_foreign_device_is_denied() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        assert!(matches!(
            service.unregister_device("u2", Some("A")).await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(service.list_devices("u1").await.unwrap().len(), 1);
        assert!(service
            .unregister_device("u1", Some("missing"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unregister_all_returns_removed_ids() {
        let service = service().await;
        assert!(service.unregister_device("u1", None).await.unwrap().is_empty());
        service.register_device("u1", "A", None, None).await.unwrap();
        service.register_device("u1", "B", None, None).await.unwrap();
        service.register_device("u2", "C", None, None).await.unwrap();
        let removed = service.unregister_device("u1", None).await.unwrap();
        assert_eq!(removed, vec!["A".to_string(), "B".to_string()]);
        assert!(service.list_devices("u1").await.unwrap().is_empty());
        assert_eq!(service.list_devices("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unregister_all_reports_devices_removed_before_a_failure() {
        let (service, store) = service_with_store().await;
        for id in ["A", "B", "C"] {
            service.register_device("u1", id, None, None).await.unwrap();
        }
        sqlx::query(
            "CREATE TRIGGER keep_b BEFORE DELETE ON devices WHEN old.id = 'B'
             BEGIN SELECT RAISE(ABORT, 'device is pinned'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let removed = service.unregister_device("u1", None).await.unwrap();
        assert_eq!(removed, vec!["A".to_string()]);
        let left = service.list_devices("u1").await.unwrap();
        let left = left.iter().map(|it| it.id.as_str()).collect::<Vec<_>>();
        assert_eq!(left, ["B", "C"]);

        // a failure before anything was removed is still an error
        let result = service.unregister_device("u1", None).await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_on_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::connect(&dir.path().join("devicesync.db")).await.unwrap();
        let service = std::sync::Arc::new(DeviceService::new(store));
        let devices = (0..8).map(|it| format!("D{it}")).collect::<Vec<_>>();
        for id in &devices {
            service.register_device("u1", id, None, None).await.unwrap();
        }

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..200 {
            let service = service.clone();
            let device_id = devices[n % devices.len()].clone();
            tasks.spawn(async move {
                let event_id = format!("e{n}");
                service
                    .add_event("u1", &device_id, sms(&event_id, n as i64, "1"))
                    .await
                    .map(|_| ())
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert_eq!(service.list_events("u1", None).await.unwrap().len(), 200);

        // removals contend with the same writers
        let mut tasks = tokio::task::JoinSet::new();
        for id in devices.clone() {
            let service = service.clone();
            tasks.spawn(async move { service.unregister_device("u1", Some(&id)).await });
        }
        for id in devices {
            let service = service.clone();
            tasks.spawn(async move {
                service.retire_old_events(&id, 0).await.map(|_| Vec::new())
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }
        assert!(service.list_devices("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_event_is_a_noop_when_gone() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        service.add_event("u1", "A", sms("e1", 1, "1")).await.unwrap();

        let deleted = service.delete_event("u1", "e1").await.unwrap();
        assert_eq!(deleted.map(|it| it.device_id), Some("A".to_string()));
        assert_eq!(service.delete_event("u1", "e1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_event_prefers_the_callers_device() {
        let service = service().await;
        service.register_device("u1", "B", None, None).await.unwrap();
        service.register_device("u2", "A", None, None).await.unwrap();
        service.add_event("u1", "B", sms("e1", 1, "1")).await.unwrap();
        service.add_event("u2", "A", sms("e1", 1, "1")).await.unwrap();

        let deleted = service.delete_event("u1", "e1").await.unwrap().unwrap();
        assert_eq!(deleted.device_id, "B");
        assert!(matches!(
            service.delete_event("u1", "e1").await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(service.list_events("u2", Some("A")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_all_events_keeps_devices() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        service.register_device("u1", "B", None, None).await.unwrap();
        service.register_device("u2", "C", None, None).await.unwrap();
        service.add_event("u1", "A", sms("e1", 1, "1")).await.unwrap();
        service.add_event("u1", "B", sms("e2", 1, "1")).await.unwrap();
        service.add_event("u2", "C", sms("e3", 1, "1")).await.unwrap();

        assert_eq!(service.delete_all_events("u1").await.unwrap(), 2);
        assert!(service.list_events("u1", None).await.unwrap().is_empty());
        assert_eq!(service.list_devices("u1").await.unwrap().len(), 2);
        assert_eq!(service.list_events("u2", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retention_removes_only_old_events() {
        let service = service().await;
        service.register_device("u1", "A", None, None).await.unwrap();
        let now = now_millis();
        service.add_event("u1", "A", sms("old", now - 2000, "1")).await.unwrap();
        service.add_event("u1", "A", sms("new", now - 500, "2")).await.unwrap();

        assert_eq!(service.retire_old_events("A", 1000).await.unwrap(), 1);
        let events = service.list_events("u1", Some("A")).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "new");
    }

    #[tokio::test]
    async fn users_with_devices() {
        let service = service().await;
        assert!(service.list_users_with_devices().await.unwrap().is_empty());
        service.register_device("u2", "C", None, None).await.unwrap();
        service.register_device("u1", "A", None, None).await.unwrap();
        service.register_device("u1", "B", None, None).await.unwrap();
        assert_eq!(
            service.list_users_with_devices().await.unwrap(),
            vec!["u1".to_string(), "u2".to_string()]
        );
        assert_eq!(service.list_device_ids().await.unwrap().len(), 3);
    }
}
