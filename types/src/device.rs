//! Camera devices and the vendor companies that make them.

use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Unique identifier for a device.
pub type DeviceId = Uuid;

/// Unique identifier for a vendor company.
pub type CompanyId = Uuid;

/// A camera registered with the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Device {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: DeviceId,
    /// Display name of the camera
    pub name: String,
    /// Unique device code
    pub code: String,
    /// Person responsible for the device
    #[serde(default)]
    pub director: Option<String>,
    /// Host name or IP address of the camera
    pub ip_address: String,
    /// RTSP port of the camera
    pub port: u16,
    /// Account used to log in to the camera
    pub admin_account: String,
    /// Admin password, AES-256-CBC encrypted and base64 encoded
    pub admin_pwd: String,
    /// Vendor company; a device without one cannot be streamed
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    pub company_id: Option<CompanyId>,
    /// Organizational node the device belongs to
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub connected_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disconnected_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_online: bool,
}

impl Device {
    /// The `host:port` pair used to reach the camera.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

/// Camera manufacturer families with known stream layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum VendorKind {
    Hikvision,
    Dahua,
    Uniview,
    #[default]
    Generic,
}

/// A vendor company and its stream layout.
///
/// The stream scheme and path come from the built-in table for
/// [`VendorKind`] unless overridden here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Company {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: CompanyId,
    pub name: String,
    #[serde(default)]
    pub vendor: VendorKind,
    /// Overrides the vendor's stream scheme (e.g. "rtsp")
    #[serde(default)]
    pub stream_scheme: Option<String>,
    /// Overrides the vendor's stream path (e.g. "/Streaming/Channels/101")
    #[serde(default)]
    pub stream_path: Option<String>,
}
