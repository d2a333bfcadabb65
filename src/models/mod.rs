pub mod device;
pub mod dtos;
pub mod event;

pub use device::{DeviceEntity, DeviceView};
pub use event::{EventEntity, EventType, EventView};
