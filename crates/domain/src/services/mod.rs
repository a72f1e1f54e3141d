//! External collaborators consumed by the domain services.

pub mod cache;
pub mod messaging;
pub mod shipping;
