pub mod claims;

pub use claims::{AuthKeys, TaskCaller, UserId};
