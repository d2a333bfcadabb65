use crate::common::AppError;
use crate::services::DeviceService;
use crate::services::push::{PushMessage, PushTransport};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Deterministic per (user, device) key the push gateway uses to coalesce pending
/// messages. Both parts are length-prefixed so distinct pairs never hash the same input.
pub fn collapse_key(user: &str, device_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((user.len() as u64).to_be_bytes());
    hasher.update(user.as_bytes());
    hasher.update((device_id.len() as u64).to_be_bytes());
    hasher.update(device_id.as_bytes());
    let mut hash = format!("{:x}", hasher.finalize());
    hash.truncate(32);
    hash
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifyReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Fans a "sync" push out to every device of a user except the one that caused it.
pub struct NotifyService {
    repository: Arc<DeviceService>,
    transport: Arc<dyn PushTransport>,
}

impl NotifyService {
    pub fn new(repository: Arc<DeviceService>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            repository,
            transport,
        }
    }

    /// Only listing the devices can fail; a failed send is logged, counted and
    /// does not stop the remaining devices.
    pub async fn notify(
        &self,
        user: &str,
        triggering_device_id: Option<&str>,
        sync_token: Option<&str>,
    ) -> Result<NotifyReport, AppError> {
        let mut report = NotifyReport::default();
        for device in self.repository.list_devices(user).await? {
            if triggering_device_id == Some(device.id.as_str()) {
                report.skipped += 1;
                continue;
            }
            let push_token = match device.push_token.as_deref() {
                Some(push_token) if device.can_receive_push() => push_token,
                _ => {
                    report.skipped += 1;
                    continue;
                }
            };
            let collapse_key = collapse_key(user, &device.id);
            let message = PushMessage {
                push_token,
                collapse_key: &collapse_key,
                sync_token,
            };
            match self.transport.send(message).await {
                Ok(_) => {
                    tracing::debug!(user, device_id = %device.id, "sync pushed");
                    report.sent += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        user,
                        device_id = %device.id,
                        reason = %err,
                        "failed to push sync"
                    );
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            user,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "sync notification dispatched"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::device::tests::service;
    use crate::services::push::tests::RecordingTransport;

    async fn setup(
        transport: RecordingTransport,
    ) -> (Arc<DeviceService>, Arc<RecordingTransport>, NotifyService) {
        let repository = Arc::new(service().await);
        let transport = Arc::new(transport);
        let notify = NotifyService::new(repository.clone(), transport.clone());
        (repository, transport, notify)
    }

    #[test]
    fn collapse_key_is_deterministic() {
        assert_eq!(collapse_key("u1", "A"), collapse_key("u1", "A"));
        assert_eq!(collapse_key("u1", "A").len(), 32);
        assert_ne!(collapse_key("u1", "A"), collapse_key("u1", "B"));
        assert_ne!(collapse_key("u1", "A"), collapse_key("u2", "A"));
        assert_ne!(collapse_key("u1A", ""), collapse_key("u1", "A"));
    }

    #[tokio::test]
    async fn skips_trigger_and_tokenless_devices() {
        let (repository, transport, notify) = setup(RecordingTransport::default()).await;
        repository.register_device("u1", "A", None, Some("tok-a")).await.unwrap();
        repository.register_device("u1", "B", None, Some("tok-b")).await.unwrap();
        repository.register_device("u1", "C", None, None).await.unwrap();
        repository.register_device("u1", "D", None, Some("")).await.unwrap();
        repository.register_device("u2", "E", None, Some("tok-e")).await.unwrap();

        let report = notify.notify("u1", Some("A"), Some("s-1")).await.unwrap();
        assert_eq!(
            report,
            NotifyReport {
                sent: 1,
                skipped: 3,
                failed: 0
            }
        );
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].push_token, "tok-b");
        assert_eq!(sent[0].collapse_key, collapse_key("u1", "B"));
        assert_eq!(sent[0].sync_token.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn same_pair_gets_same_key_every_call() {
        let (repository, transport, notify) = setup(RecordingTransport::default()).await;
        repository.register_device("u1", "A", None, Some("tok-a")).await.unwrap();
        notify.notify("u1", None, None).await.unwrap();
        notify.notify("u1", None, Some("other")).await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].collapse_key, sent[1].collapse_key);
        assert_eq!(sent[0].sync_token, None);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let (repository, transport, notify) =
            setup(RecordingTransport::failing(&["tok-a"])).await;
        repository.register_device("u1", "A", None, Some("tok-a")).await.unwrap();
        repository.register_device("u1", "B", None, Some("tok-b")).await.unwrap();

        let report = notify.notify("u1", None, None).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(transport.sent()[0].push_token, "tok-b");
    }

    #[tokio::test]
    async fn user_without_devices_sends_nothing() {
        let (_, transport, notify) = setup(RecordingTransport::default()).await;
        assert_eq!(notify.notify("nobody", None, None).await.unwrap(), NotifyReport::default());
        assert!(transport.sent().is_empty());
    }
}
