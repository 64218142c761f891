//! OpenAPI documentation configuration.

use tardet_types::api::{
    AlertListResponse, AlertResponse, AlertTypeListResponse, AlertTypeResponse,
    BindingListResponse, BindingResponse, CompanyListResponse, CompanyResponse,
    CreateAlertRequest, CreateAlertTypeRequest, CreateBindingRequest, CreateCompanyRequest,
    CreateDeviceRequest, CreateModelRequest, CreateNodeRequest, CreateRuleRequest,
    CreateUserRequest, DeviceListResponse, DeviceProbeResponse, DeviceResponse, ErrorResponse,
    HandleAlertsRequest, HandleAlertsResponse, ModelListResponse, ModelResponse,
    NodeListResponse, NodeResponse, NodeTreeResponse, RuleListResponse, RuleResponse,
    UpdateAlertTypeRequest, UpdateCompanyRequest, UpdateDeviceRequest, UpdateModelRequest,
    UpdateRuleRequest, UpdateUserRequest, UserListResponse, UserResponse,
};
use tardet_types::{
    Alert, AlertLevel, AlertResult, AlertStatus, AlertType, Company, Device, DeviceModelBinding,
    Model, ModelRule, Node, NodeTreeEntry, Role, UserInfo, VendorKind,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::create_user,
        crate::api::users::update_user,
        crate::api::users::delete_user,
        crate::api::companies::list_companies,
        crate::api::companies::get_company,
        crate::api::companies::create_company,
        crate::api::companies::update_company,
        crate::api::companies::delete_company,
        crate::api::devices::list_devices,
        crate::api::devices::get_device,
        crate::api::devices::create_device,
        crate::api::devices::update_device,
        crate::api::devices::delete_device,
        crate::api::devices::probe_device,
        crate::api::devices::list_bindings,
        crate::api::devices::create_binding,
        crate::api::devices::delete_binding,
        crate::api::nodes::list_nodes,
        crate::api::nodes::node_tree,
        crate::api::nodes::get_node,
        crate::api::nodes::create_node,
        crate::api::nodes::delete_node,
        crate::api::models::list_models,
        crate::api::models::get_model,
        crate::api::models::create_model,
        crate::api::models::update_model,
        crate::api::models::delete_model,
        crate::api::models::list_rules,
        crate::api::models::get_rule,
        crate::api::models::create_rule,
        crate::api::models::update_rule,
        crate::api::models::delete_rule,
        crate::api::alerts::list_alert_types,
        crate::api::alerts::create_alert_type,
        crate::api::alerts::update_alert_type,
        crate::api::alerts::delete_alert_type,
        crate::api::alerts::list_alerts,
        crate::api::alerts::get_alert,
        crate::api::alerts::create_alert,
        crate::api::alerts::handle_alerts,
        crate::api::play::play_handler,
    ),
    components(
        schemas(
            ErrorResponse,
            Role,
            UserInfo,
            CreateUserRequest,
            UpdateUserRequest,
            UserResponse,
            UserListResponse,
            VendorKind,
            Company,
            CreateCompanyRequest,
            UpdateCompanyRequest,
            CompanyResponse,
            CompanyListResponse,
            Device,
            CreateDeviceRequest,
            UpdateDeviceRequest,
            DeviceResponse,
            DeviceListResponse,
            DeviceProbeResponse,
            Node,
            NodeTreeEntry,
            CreateNodeRequest,
            NodeResponse,
            NodeListResponse,
            NodeTreeResponse,
            Model,
            ModelRule,
            DeviceModelBinding,
            CreateModelRequest,
            UpdateModelRequest,
            ModelResponse,
            ModelListResponse,
            CreateRuleRequest,
            UpdateRuleRequest,
            RuleResponse,
            RuleListResponse,
            CreateBindingRequest,
            BindingResponse,
            BindingListResponse,
            AlertType,
            AlertLevel,
            AlertResult,
            AlertStatus,
            Alert,
            CreateAlertTypeRequest,
            UpdateAlertTypeRequest,
            AlertTypeResponse,
            AlertTypeListResponse,
            CreateAlertRequest,
            HandleAlertsRequest,
            HandleAlertsResponse,
            AlertResponse,
            AlertListResponse,
        )
    ),
    tags(
        (name = "users", description = "User account management"),
        (name = "companies", description = "Camera vendor management"),
        (name = "devices", description = "Camera device management, probes and model bindings"),
        (name = "nodes", description = "Organization hierarchy"),
        (name = "models", description = "Detection models and their rules"),
        (name = "alerts", description = "Alert types and alert records"),
        (name = "play", description = "Live video relay over WebSocket")
    ),
    info(
        title = "Tardet Surveillance API",
        version = "0.3.0",
        description = "REST API for managing cameras, detection models and alerts, with live video relay",
        license(
            name = "MIT OR Apache-2.0"
        )
    )
)]
pub struct ApiDoc;
