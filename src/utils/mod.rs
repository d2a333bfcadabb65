mod ttl_cache;

pub use ttl_cache::*;

/// Milliseconds since the Unix epoch, the unit every stored timestamp uses.
#[inline]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
