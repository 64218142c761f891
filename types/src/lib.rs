//! Shared types for the Tardet surveillance backend.
//!
//! This crate contains the domain records and API types shared between
//! the backend and its clients.

/// Default port for the Tardet backend server.
pub const DEFAULT_PORT: u16 = 8000;

pub mod alert;
pub mod api;
pub mod device;
pub mod model;
pub mod node;
pub mod user;

// Re-export commonly used types
pub use alert::{Alert, AlertId, AlertLevel, AlertResult, AlertStatus, AlertType, AlertTypeId};
pub use device::{Company, CompanyId, Device, DeviceId, VendorKind};
pub use model::{DeviceModelBinding, Model, ModelId, ModelRule, RuleId};
pub use node::{Node, NodeId, NodeTreeEntry};
pub use user::{Role, User, UserId, UserInfo};
