//! API request and response types.

use crate::alert::{Alert, AlertId, AlertLevel, AlertResult, AlertStatus, AlertType, AlertTypeId};
use crate::device::{Company, CompanyId, Device, DeviceId, VendorKind};
use crate::model::{DeviceModelBinding, Model, ModelId, ModelRule, RuleId};
use crate::node::{Node, NodeId, NodeTreeEntry};
use crate::user::{Role, UserId, UserInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

#[cfg(feature = "validation")]
use garde::Validate;

/// Page size used when a list request does not give one.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

// ============================================================================
// Common Types
// ============================================================================

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Offset pagination for list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct PageQuery {
    /// Number of records to skip (default 0)
    pub skip: Option<usize>,
    /// Maximum number of records to return (default 10)
    pub limit: Option<usize>,
}

impl PageQuery {
    /// Apply this page to an already ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
            .collect()
    }
}

// ============================================================================
// User API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateUserRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 50)))]
    pub usercode: String,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 50)))]
    pub username: String,
    #[cfg_attr(feature = "validation", garde(length(min = 6, max = 72)))]
    pub password: String,
    #[cfg_attr(feature = "validation", garde(skip))]
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateUserRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 50)))]
    pub username: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(min = 6, max = 72)))]
    pub password: Option<String>,
    #[cfg_attr(feature = "validation", garde(skip))]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct UserResponse {
    pub user: UserInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct UserListResponse {
    pub total: usize,
    pub users: Vec<UserInfo>,
}

// ============================================================================
// Company API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateCompanyRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 100)))]
    pub name: String,
    #[serde(default)]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub vendor: VendorKind,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 16)))]
    pub stream_scheme: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 255)))]
    pub stream_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateCompanyRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 100)))]
    pub name: Option<String>,
    #[cfg_attr(feature = "validation", garde(skip))]
    pub vendor: Option<VendorKind>,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 16)))]
    pub stream_scheme: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 255)))]
    pub stream_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CompanyResponse {
    pub company: Company,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CompanyListResponse {
    pub companies: Vec<Company>,
}

// ============================================================================
// Device API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateDeviceRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 20)))]
    pub name: String,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 36)))]
    pub code: String,
    #[cfg_attr(feature = "validation", garde(length(max = 30)))]
    pub director: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 255)))]
    pub ip_address: String,
    #[cfg_attr(feature = "validation", garde(range(min = 1)))]
    pub port: u16,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 64)))]
    pub admin_account: String,
    /// Plain-text admin password; stored encrypted
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 128)))]
    pub admin_pwd: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub company_id: CompanyId,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub node_id: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateDeviceRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 20)))]
    pub name: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(max = 30)))]
    pub director: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 255)))]
    pub ip_address: Option<String>,
    #[cfg_attr(feature = "validation", garde(range(min = 1)))]
    pub port: Option<u16>,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 64)))]
    pub admin_account: Option<String>,
    /// Plain-text admin password; stored encrypted
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 128)))]
    pub admin_pwd: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub company_id: Option<CompanyId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub node_id: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct DeviceListQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    /// Only devices attached to this node or one of its descendants
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = Uuid))]
    pub node_id: Option<NodeId>,
}

impl DeviceListQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            skip: self.skip,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceResponse {
    pub device: Device,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceListResponse {
    pub total: usize,
    pub devices: Vec<Device>,
}

/// Result of an on-demand reachability probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceProbeResponse {
    /// "reachable", "unreachable" or "timed_out"
    pub outcome: String,
    pub device: Device,
}

// ============================================================================
// Node API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateNodeRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 100)))]
    pub name: String,
    /// Parent node; omitted for a top-level node
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub parent_id: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NodeResponse {
    pub node: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NodeListResponse {
    pub total: usize,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct NodeTreeResponse {
    pub tree: Vec<NodeTreeEntry>,
}

// ============================================================================
// Model and Rule API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateModelRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 20)))]
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub alert_type: Option<AlertTypeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateModelRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 20)))]
    pub name: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub alert_type: Option<AlertTypeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ModelResponse {
    pub model: Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ModelListResponse {
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateRuleRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 20)))]
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub model_id: ModelId,
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 255)))]
    pub path: String,
    #[cfg_attr(feature = "validation", garde(length(max = 255)))]
    pub notes: Option<String>,
}

/// Rule update; the rule path cannot be changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateRuleRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 20)))]
    pub name: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(max = 255)))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct RuleListQuery {
    /// Only rules belonging to this model
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = Uuid))]
    pub model_id: Option<ModelId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RuleResponse {
    pub rule: ModelRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RuleListResponse {
    pub rules: Vec<ModelRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateBindingRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub model_id: ModelId,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub rule_ids: Vec<RuleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BindingResponse {
    pub binding: DeviceModelBinding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BindingListResponse {
    pub bindings: Vec<DeviceModelBinding>,
}

// ============================================================================
// Alert API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateAlertTypeRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 50)))]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UpdateAlertTypeRequest {
    #[cfg_attr(feature = "validation", garde(length(min = 1, max = 50)))]
    pub name: Option<String>,
    #[cfg_attr(feature = "validation", garde(range(min = 1)))]
    pub idx: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertTypeResponse {
    pub alert_type: AlertType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertTypeListResponse {
    pub alert_types: Vec<AlertType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateAlertRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub device_id: DeviceId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub model_id: ModelId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub rule_id: RuleId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub alert_type: AlertTypeId,
    #[cfg_attr(feature = "validation", garde(length(max = 255)))]
    pub image_url: Option<String>,
    #[cfg_attr(feature = "validation", garde(length(max = 255)))]
    pub alert_msg: Option<String>,
}

/// Marks one or more alerts as handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct HandleAlertsRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    #[cfg_attr(feature = "validation", garde(length(min = 1)))]
    pub ids: Vec<AlertId>,
    #[cfg_attr(feature = "validation", garde(skip))]
    pub alert_result: AlertResult,
    #[cfg_attr(feature = "validation", garde(skip))]
    pub alert_level: AlertLevel,
    /// Handling user; defaults to the caller
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = Uuid))]
    #[cfg_attr(feature = "validation", garde(skip))]
    pub handled_user: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct HandleAlertsResponse {
    pub handled: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct AlertListQuery {
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = Uuid))]
    pub device_id: Option<DeviceId>,
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = Uuid))]
    pub model_id: Option<ModelId>,
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = Uuid))]
    pub rule_id: Option<RuleId>,
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = Uuid))]
    pub alert_type: Option<AlertTypeId>,
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>))]
    pub status: Option<AlertStatus>,
    /// Only alerts raised at or after this time (RFC 3339)
    pub start_time: Option<DateTime<Utc>>,
    /// Only alerts raised at or before this time (RFC 3339)
    pub end_time: Option<DateTime<Utc>>,
}

impl AlertListQuery {
    /// Whether an alert passes every filter set on this query.
    pub fn matches(&self, alert: &Alert) -> bool {
        self.device_id.is_none_or(|id| alert.device_id == id)
            && self.model_id.is_none_or(|id| alert.model_id == id)
            && self.rule_id.is_none_or(|id| alert.rule_id == id)
            && self.alert_type.is_none_or(|id| alert.alert_type == id)
            && self.status.is_none_or(|s| alert.status == s)
            && self.start_time.is_none_or(|t| alert.alert_time >= t)
            && self.end_time.is_none_or(|t| alert.alert_time <= t)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertResponse {
    pub alert: Alert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct AlertListResponse {
    pub total: usize,
    pub alerts: Vec<Alert>,
}
