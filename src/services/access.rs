//! Ownership is the only authorization predicate: a caller may touch a device, and
//! transitively its events, only when it is the device's owner.

use crate::common::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

impl Access {
    pub fn check(self) -> Result<(), AppError> {
        match self {
            Access::Allowed => Ok(()),
            Access::Denied => Err(AppError::Forbidden),
        }
    }
}

/// `None` stands for a caller without identity and never matches an owner.
pub fn authorize(requesting_user: Option<&str>, resource_owner: &str) -> Access {
    match requesting_user {
        Some(user) if user == resource_owner => Access::Allowed,
        _ => Access::Denied,
    }
}
