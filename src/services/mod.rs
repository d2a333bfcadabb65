pub mod access;
pub mod cache;
pub mod device;
pub mod maintenance;
pub mod notify;
pub mod push;
pub mod queue;
pub mod store;

pub use cache::{CacheMirror, CacheStore, Cached};
pub use device::{AddEventArgs, DeviceService};
pub use maintenance::Maintenance;
pub use notify::NotifyService;
pub use push::{HttpPushTransport, LogPushTransport, PushTransport};
pub use queue::{Job, JobRunner, RetryPolicy, TaskQueue, TaskReceiver};
pub use store::Store;
