//! Alert records and alert types.

use crate::device::DeviceId;
use crate::model::{ModelId, RuleId};
use crate::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Unique identifier for an alert.
pub type AlertId = Uuid;

/// Unique identifier for an alert type.
pub type AlertTypeId = Uuid;

/// A category of alert, shown in `idx` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertType {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: AlertTypeId,
    pub name: String,
    pub idx: u32,
}

/// Severity assigned when an alert is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum AlertLevel {
    A,
    B,
    C,
    D,
}

/// Outcome recorded when an alert is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AlertResult {
    FalseAlarm,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Unhandled,
    Handled,
}

/// An alert raised by a detection model on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Alert {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: AlertId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub device_id: DeviceId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub model_id: ModelId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub rule_id: RuleId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub alert_type: AlertTypeId,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub alert_msg: Option<String>,
    pub alert_time: DateTime<Utc>,
    #[serde(default)]
    pub alert_level: Option<AlertLevel>,
    #[serde(default)]
    pub alert_result: Option<AlertResult>,
    #[serde(default)]
    pub status: AlertStatus,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    pub handled_user: Option<UserId>,
    #[serde(default)]
    pub handled_time: Option<DateTime<Utc>>,
}
