//! Detection models, their rules, and device bindings.

use crate::alert::AlertTypeId;
use crate::device::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Unique identifier for a detection model.
pub type ModelId = Uuid;

/// Unique identifier for a model rule.
pub type RuleId = Uuid;

/// A detection model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Model {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: ModelId,
    pub name: String,
    /// Alert type raised by this model
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    pub alert_type: Option<AlertTypeId>,
    pub created_time: DateTime<Utc>,
}

/// A recognition rule (weights file) belonging to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ModelRule {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: RuleId,
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub model_id: ModelId,
    /// Path of the rule file; fixed once the rule is created
    pub path: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub updated_time: Option<DateTime<Utc>>,
}

/// Binds a model and a subset of its rules to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceModelBinding {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub device_id: DeviceId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub model_id: ModelId,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub rule_ids: Vec<RuleId>,
}
