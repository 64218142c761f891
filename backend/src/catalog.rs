//! In-memory catalog of users, devices, nodes, models and alerts.
//!
//! Every mutation validates the cross-record invariants, applies the change
//! in memory and returns the [`ChangeSet`] that the caller persists.

use crate::storage::{ChangeSet, Record, RecordKind};
use chrono::Utc;
use std::collections::HashMap;
use tardet_types::api::{
    AlertListQuery, CreateAlertRequest, CreateAlertTypeRequest, CreateBindingRequest,
    CreateCompanyRequest, CreateDeviceRequest, CreateModelRequest, CreateNodeRequest,
    CreateRuleRequest, CreateUserRequest, HandleAlertsRequest, UpdateAlertTypeRequest,
    UpdateCompanyRequest, UpdateDeviceRequest, UpdateModelRequest, UpdateRuleRequest,
    UpdateUserRequest,
};
use tardet_types::node::NODE_CODE_SEGMENT;
use tardet_types::{
    Alert, AlertStatus, AlertType, AlertTypeId, Company, CompanyId, Device, DeviceId,
    DeviceModelBinding, Model, ModelId, ModelRule, Node, NodeId, NodeTreeEntry, RuleId, User,
    UserId,
};
use uuid::Uuid;

/// Highest sibling counter a node code segment can hold.
const MAX_SIBLING_CODE: u32 = 999;

/// Errors raised by catalog operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Trimmed value of a required text field.
fn required(field: &str, value: &str) -> CatalogResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CatalogError::Invalid(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

/// Blank optional text is stored as absent.
fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    users: HashMap<UserId, User>,
    companies: HashMap<CompanyId, Company>,
    devices: HashMap<DeviceId, Device>,
    nodes: HashMap<NodeId, Node>,
    models: HashMap<ModelId, Model>,
    rules: HashMap<RuleId, ModelRule>,
    bindings: HashMap<Uuid, DeviceModelBinding>,
    alert_types: HashMap<AlertTypeId, AlertType>,
    alerts: HashMap<Uuid, Alert>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a catalog from persisted records.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut catalog = Self::default();
        for record in records {
            match record {
                Record::User(r) => {
                    catalog.users.insert(r.id, r);
                }
                Record::Company(r) => {
                    catalog.companies.insert(r.id, r);
                }
                Record::Device(r) => {
                    catalog.devices.insert(r.id, r);
                }
                Record::Node(r) => {
                    catalog.nodes.insert(r.id, r);
                }
                Record::Model(r) => {
                    catalog.models.insert(r.id, r);
                }
                Record::Rule(r) => {
                    catalog.rules.insert(r.id, r);
                }
                Record::Binding(r) => {
                    catalog.bindings.insert(r.id, r);
                }
                Record::AlertType(r) => {
                    catalog.alert_types.insert(r.id, r);
                }
                Record::Alert(r) => {
                    catalog.alerts.insert(r.id, r);
                }
            }
        }
        catalog
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// All users, oldest first.
    pub fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.created_time
                .cmp(&b.created_time)
                .then_with(|| a.usercode.cmp(&b.usercode))
        });
        users
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_by_code(&self, usercode: &str) -> Option<&User> {
        self.users.values().find(|u| u.usercode == usercode)
    }

    /// Create a user. The password must already be hashed.
    pub fn create_user(
        &mut self,
        req: &CreateUserRequest,
        password_hash: String,
        creator_id: Option<UserId>,
    ) -> CatalogResult<(User, ChangeSet)> {
        let usercode = required("usercode", &req.usercode)?;
        if self.user_by_code(&usercode).is_some() {
            return Err(CatalogError::Conflict(format!(
                "usercode '{}' already exists",
                usercode
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            usercode,
            username: required("username", &req.username)?,
            password_hash,
            role: req.role,
            creator_id,
            created_time: Utc::now(),
        };
        self.users.insert(user.id, user.clone());
        let changes = ChangeSet::default().upsert(Record::User(user.clone()));
        Ok((user, changes))
    }

    /// Insert a fully formed user, such as the bootstrap administrator.
    pub fn insert_user(&mut self, user: User) -> CatalogResult<((), ChangeSet)> {
        if self.user_by_code(&user.usercode).is_some() {
            return Err(CatalogError::Conflict(format!(
                "usercode '{}' already exists",
                user.usercode
            )));
        }
        let changes = ChangeSet::default().upsert(Record::User(user.clone()));
        self.users.insert(user.id, user);
        Ok(((), changes))
    }

    /// Update a user. A new password must already be hashed.
    pub fn update_user(
        &mut self,
        usercode: &str,
        req: &UpdateUserRequest,
        password_hash: Option<String>,
    ) -> CatalogResult<(User, ChangeSet)> {
        let id = self
            .user_by_code(usercode)
            .map(|u| u.id)
            .ok_or(CatalogError::NotFound("user"))?;
        let username = req
            .username
            .as_deref()
            .map(|name| required("username", name))
            .transpose()?;

        let user = self
            .users
            .get_mut(&id)
            .ok_or(CatalogError::NotFound("user"))?;
        if let Some(username) = username {
            user.username = username;
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        if let Some(role) = req.role {
            user.role = role;
        }

        let user = user.clone();
        let changes = ChangeSet::default().upsert(Record::User(user.clone()));
        Ok((user, changes))
    }

    pub fn delete_user(
        &mut self,
        usercode: &str,
        acting_user: Option<UserId>,
    ) -> CatalogResult<ChangeSet> {
        let id = self
            .user_by_code(usercode)
            .map(|u| u.id)
            .ok_or(CatalogError::NotFound("user"))?;
        if acting_user == Some(id) {
            return Err(CatalogError::Invalid(
                "users cannot delete themselves".to_string(),
            ));
        }

        self.users.remove(&id);
        Ok(ChangeSet::default().delete(RecordKind::User, id))
    }

    // ------------------------------------------------------------------
    // Companies
    // ------------------------------------------------------------------

    /// All companies ordered by name.
    pub fn companies(&self) -> Vec<Company> {
        let mut companies: Vec<Company> = self.companies.values().cloned().collect();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        companies
    }

    pub fn company(&self, id: CompanyId) -> Option<&Company> {
        self.companies.get(&id)
    }

    fn company_name_taken(&self, name: &str, except: Option<CompanyId>) -> bool {
        self.companies
            .values()
            .any(|c| c.name == name && Some(c.id) != except)
    }

    pub fn create_company(
        &mut self,
        req: &CreateCompanyRequest,
    ) -> CatalogResult<(Company, ChangeSet)> {
        let name = required("name", &req.name)?;
        if self.company_name_taken(&name, None) {
            return Err(CatalogError::Conflict(format!(
                "company '{}' already exists",
                name
            )));
        }

        let company = Company {
            id: Uuid::new_v4(),
            name,
            vendor: req.vendor,
            stream_scheme: optional(req.stream_scheme.as_deref()),
            stream_path: optional(req.stream_path.as_deref()),
        };
        self.companies.insert(company.id, company.clone());
        let changes = ChangeSet::default().upsert(Record::Company(company.clone()));
        Ok((company, changes))
    }

    /// Update a company. Blank stream overrides clear the override.
    pub fn update_company(
        &mut self,
        id: CompanyId,
        req: &UpdateCompanyRequest,
    ) -> CatalogResult<(Company, ChangeSet)> {
        if !self.companies.contains_key(&id) {
            return Err(CatalogError::NotFound("company"));
        }
        let name = req
            .name
            .as_deref()
            .map(|name| required("name", name))
            .transpose()?;
        if let Some(name) = &name {
            if self.company_name_taken(name, Some(id)) {
                return Err(CatalogError::Conflict(format!(
                    "company '{}' already exists",
                    name
                )));
            }
        }

        let company = self
            .companies
            .get_mut(&id)
            .ok_or(CatalogError::NotFound("company"))?;
        if let Some(name) = name {
            company.name = name;
        }
        if let Some(vendor) = req.vendor {
            company.vendor = vendor;
        }
        if let Some(scheme) = &req.stream_scheme {
            company.stream_scheme = optional(Some(scheme.as_str()));
        }
        if let Some(path) = &req.stream_path {
            company.stream_path = optional(Some(path.as_str()));
        }

        let company = company.clone();
        let changes = ChangeSet::default().upsert(Record::Company(company.clone()));
        Ok((company, changes))
    }

    pub fn delete_company(&mut self, id: CompanyId) -> CatalogResult<ChangeSet> {
        if !self.companies.contains_key(&id) {
            return Err(CatalogError::NotFound("company"));
        }
        let in_use = self
            .devices
            .values()
            .filter(|d| d.company_id == Some(id))
            .count();
        if in_use > 0 {
            return Err(CatalogError::Conflict(format!(
                "company is referenced by {} device(s)",
                in_use
            )));
        }

        self.companies.remove(&id);
        Ok(ChangeSet::default().delete(RecordKind::Company, id))
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    /// Devices ordered by code, optionally limited to a node's subtree.
    pub fn devices(&self, node: Option<NodeId>) -> CatalogResult<Vec<Device>> {
        let subtree: Option<Vec<NodeId>> = match node {
            Some(id) => {
                let root = self.nodes.get(&id).ok_or(CatalogError::NotFound("node"))?;
                Some(
                    self.nodes
                        .values()
                        .filter(|n| root.contains(n))
                        .map(|n| n.id)
                        .collect(),
                )
            }
            None => None,
        };

        let mut devices: Vec<Device> = self
            .devices
            .values()
            .filter(|d| match &subtree {
                Some(ids) => d.node_id.is_some_and(|n| ids.contains(&n)),
                None => true,
            })
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(devices)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Create a device. The admin password must already be encrypted.
    pub fn create_device(
        &mut self,
        req: &CreateDeviceRequest,
        encrypted_pwd: String,
    ) -> CatalogResult<(Device, ChangeSet)> {
        let code = required("code", &req.code)?;
        if self.devices.values().any(|d| d.code == code) {
            return Err(CatalogError::Conflict(format!(
                "device code '{}' already exists",
                code
            )));
        }
        if !self.companies.contains_key(&req.company_id) {
            return Err(CatalogError::NotFound("company"));
        }
        if let Some(node_id) = req.node_id {
            if !self.nodes.contains_key(&node_id) {
                return Err(CatalogError::NotFound("node"));
            }
        }

        let device = Device {
            id: Uuid::new_v4(),
            name: required("name", &req.name)?,
            code,
            director: optional(req.director.as_deref()),
            ip_address: required("ip_address", &req.ip_address)?,
            port: req.port,
            admin_account: required("admin_account", &req.admin_account)?,
            admin_pwd: encrypted_pwd,
            company_id: Some(req.company_id),
            node_id: req.node_id,
            connected_time: None,
            disconnected_time: None,
            sync_time: None,
            is_online: false,
        };
        self.devices.insert(device.id, device.clone());
        let changes = ChangeSet::default().upsert(Record::Device(device.clone()));
        Ok((device, changes))
    }

    /// Update a device. A new admin password must already be encrypted.
    pub fn update_device(
        &mut self,
        id: DeviceId,
        req: &UpdateDeviceRequest,
        encrypted_pwd: Option<String>,
    ) -> CatalogResult<(Device, ChangeSet)> {
        if !self.devices.contains_key(&id) {
            return Err(CatalogError::NotFound("device"));
        }
        if let Some(company_id) = req.company_id {
            if !self.companies.contains_key(&company_id) {
                return Err(CatalogError::NotFound("company"));
            }
        }
        if let Some(node_id) = req.node_id {
            if !self.nodes.contains_key(&node_id) {
                return Err(CatalogError::NotFound("node"));
            }
        }
        let name = req
            .name
            .as_deref()
            .map(|v| required("name", v))
            .transpose()?;
        let ip_address = req
            .ip_address
            .as_deref()
            .map(|v| required("ip_address", v))
            .transpose()?;
        let admin_account = req
            .admin_account
            .as_deref()
            .map(|v| required("admin_account", v))
            .transpose()?;

        let device = self
            .devices
            .get_mut(&id)
            .ok_or(CatalogError::NotFound("device"))?;
        if let Some(name) = name {
            device.name = name;
        }
        if let Some(director) = &req.director {
            device.director = optional(Some(director.as_str()));
        }
        if let Some(ip_address) = ip_address {
            device.ip_address = ip_address;
        }
        if let Some(port) = req.port {
            device.port = port;
        }
        if let Some(admin_account) = admin_account {
            device.admin_account = admin_account;
        }
        if let Some(pwd) = encrypted_pwd {
            device.admin_pwd = pwd;
        }
        if let Some(company_id) = req.company_id {
            device.company_id = Some(company_id);
        }
        if let Some(node_id) = req.node_id {
            device.node_id = Some(node_id);
        }

        let device = device.clone();
        let changes = ChangeSet::default().upsert(Record::Device(device.clone()));
        Ok((device, changes))
    }

    /// Delete a device together with its model bindings.
    pub fn delete_device(&mut self, id: DeviceId) -> CatalogResult<ChangeSet> {
        if self.devices.remove(&id).is_none() {
            return Err(CatalogError::NotFound("device"));
        }

        let mut changes = ChangeSet::default().delete(RecordKind::Device, id);
        let bindings: Vec<Uuid> = self
            .bindings
            .values()
            .filter(|b| b.device_id == id)
            .map(|b| b.id)
            .collect();
        for binding in bindings {
            self.bindings.remove(&binding);
            changes = changes.delete(RecordKind::Binding, binding);
        }
        Ok(changes)
    }

    /// Record the outcome of a reachability probe.
    ///
    /// Connect and disconnect times only move when the online flag flips.
    pub fn record_probe(
        &mut self,
        id: DeviceId,
        reachable: bool,
    ) -> CatalogResult<(Device, ChangeSet)> {
        let device = self
            .devices
            .get_mut(&id)
            .ok_or(CatalogError::NotFound("device"))?;

        let now = Utc::now();
        if reachable && !device.is_online {
            device.connected_time = Some(now);
        } else if !reachable && device.is_online {
            device.disconnected_time = Some(now);
        }
        device.is_online = reachable;
        device.sync_time = Some(now);

        let device = device.clone();
        let changes = ChangeSet::default().upsert(Record::Device(device.clone()));
        Ok((device, changes))
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// All nodes ordered by code.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.code.cmp(&b.code));
        nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Nodes arranged by code prefix. Nodes whose parent code is missing
    /// become roots.
    pub fn node_tree(&self) -> Vec<NodeTreeEntry> {
        let nodes = self.nodes();
        let codes: Vec<&str> = nodes.iter().map(|n| n.code.as_str()).collect();

        fn children_of(parent: &Node, nodes: &[Node]) -> Vec<NodeTreeEntry> {
            nodes
                .iter()
                .filter(|n| n.parent_code() == Some(parent.code.as_str()))
                .map(|n| NodeTreeEntry {
                    node: n.clone(),
                    children: children_of(n, nodes),
                })
                .collect()
        }

        nodes
            .iter()
            .filter(|n| n.parent_code().is_none_or(|p| !codes.contains(&p)))
            .map(|n| NodeTreeEntry {
                node: n.clone(),
                children: children_of(n, &nodes),
            })
            .collect()
    }

    /// Next free code under `parent_code`: last sibling counter + 1.
    fn next_node_code(&self, parent_code: &str) -> CatalogResult<String> {
        let level_len = parent_code.len() + NODE_CODE_SEGMENT;
        let last = self
            .nodes
            .values()
            .filter(|n| n.code.len() == level_len && n.code.starts_with(parent_code))
            .filter_map(|n| n.code[parent_code.len()..].parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        let next = last + 1;
        if next > MAX_SIBLING_CODE {
            return Err(CatalogError::Conflict(
                "no free node code left under this parent".to_string(),
            ));
        }
        Ok(format!(
            "{}{:0width$}",
            parent_code,
            next,
            width = NODE_CODE_SEGMENT
        ))
    }

    /// Create a node under an optional parent.
    pub fn create_node(&mut self, req: &CreateNodeRequest) -> CatalogResult<(Node, ChangeSet)> {
        let name = required("name", &req.name)?;
        let (parent_code, level) = match req.parent_id {
            Some(parent_id) => {
                let parent = self
                    .nodes
                    .get(&parent_id)
                    .ok_or(CatalogError::NotFound("parent node"))?;
                (parent.code.clone(), parent.level + 1)
            }
            None => (String::new(), 1),
        };
        let code = self.next_node_code(&parent_code)?;

        let node = Node {
            id: Uuid::new_v4(),
            name,
            parent_id: req.parent_id,
            level,
            code,
            is_leaf: true,
            created_time: Utc::now(),
        };
        self.nodes.insert(node.id, node.clone());
        let mut changes = ChangeSet::default().upsert(Record::Node(node.clone()));

        if let Some(parent) = req.parent_id.and_then(|id| self.nodes.get_mut(&id)) {
            if parent.is_leaf {
                parent.is_leaf = false;
                changes = changes.upsert(Record::Node(parent.clone()));
            }
        }
        Ok((node, changes))
    }

    /// Delete a node and its whole subtree. Devices attached to removed
    /// nodes are detached.
    pub fn delete_node(&mut self, id: NodeId) -> CatalogResult<ChangeSet> {
        let root = self
            .nodes
            .get(&id)
            .cloned()
            .ok_or(CatalogError::NotFound("node"))?;

        let removed: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| root.contains(n))
            .map(|n| n.id)
            .collect();

        let mut changes = ChangeSet::default();
        for node_id in &removed {
            self.nodes.remove(node_id);
            changes = changes.delete(RecordKind::Node, *node_id);
        }

        for device in self.devices.values_mut() {
            if device.node_id.is_some_and(|n| removed.contains(&n)) {
                device.node_id = None;
                changes = changes.upsert(Record::Device(device.clone()));
            }
        }

        // The parent becomes a leaf again once its last child is gone
        if let Some(parent_code) = root.parent_code() {
            let has_children = self
                .nodes
                .values()
                .any(|n| n.parent_code() == Some(parent_code));
            if !has_children {
                if let Some(parent) = self.nodes.values_mut().find(|n| n.code == parent_code) {
                    parent.is_leaf = true;
                    changes = changes.upsert(Record::Node(parent.clone()));
                }
            }
        }

        Ok(changes)
    }

    // ------------------------------------------------------------------
    // Models, rules and bindings
    // ------------------------------------------------------------------

    /// All models ordered by name.
    pub fn models(&self) -> Vec<Model> {
        let mut models: Vec<Model> = self.models.values().cloned().collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(&id)
    }

    fn model_name_taken(&self, name: &str, except: Option<ModelId>) -> bool {
        self.models
            .values()
            .any(|m| m.name == name && Some(m.id) != except)
    }

    pub fn create_model(&mut self, req: &CreateModelRequest) -> CatalogResult<(Model, ChangeSet)> {
        let name = required("name", &req.name)?;
        if self.model_name_taken(&name, None) {
            return Err(CatalogError::Conflict(format!(
                "model '{}' already exists",
                name
            )));
        }
        if let Some(alert_type) = req.alert_type {
            if !self.alert_types.contains_key(&alert_type) {
                return Err(CatalogError::NotFound("alert type"));
            }
        }

        let model = Model {
            id: Uuid::new_v4(),
            name,
            alert_type: req.alert_type,
            created_time: Utc::now(),
        };
        self.models.insert(model.id, model.clone());
        let changes = ChangeSet::default().upsert(Record::Model(model.clone()));
        Ok((model, changes))
    }

    pub fn update_model(
        &mut self,
        id: ModelId,
        req: &UpdateModelRequest,
    ) -> CatalogResult<(Model, ChangeSet)> {
        if !self.models.contains_key(&id) {
            return Err(CatalogError::NotFound("model"));
        }
        let name = req
            .name
            .as_deref()
            .map(|v| required("name", v))
            .transpose()?;
        if let Some(name) = &name {
            if self.model_name_taken(name, Some(id)) {
                return Err(CatalogError::Conflict(format!(
                    "model '{}' already exists",
                    name
                )));
            }
        }
        if let Some(alert_type) = req.alert_type {
            if !self.alert_types.contains_key(&alert_type) {
                return Err(CatalogError::NotFound("alert type"));
            }
        }

        let model = self
            .models
            .get_mut(&id)
            .ok_or(CatalogError::NotFound("model"))?;
        if let Some(name) = name {
            model.name = name;
        }
        if let Some(alert_type) = req.alert_type {
            model.alert_type = Some(alert_type);
        }

        let model = model.clone();
        let changes = ChangeSet::default().upsert(Record::Model(model.clone()));
        Ok((model, changes))
    }

    /// Delete a model together with its rules and bindings.
    pub fn delete_model(&mut self, id: ModelId) -> CatalogResult<ChangeSet> {
        if self.models.remove(&id).is_none() {
            return Err(CatalogError::NotFound("model"));
        }

        let mut changes = ChangeSet::default().delete(RecordKind::Model, id);
        let rules: Vec<RuleId> = self
            .rules
            .values()
            .filter(|r| r.model_id == id)
            .map(|r| r.id)
            .collect();
        for rule in rules {
            self.rules.remove(&rule);
            changes = changes.delete(RecordKind::Rule, rule);
        }

        let bindings: Vec<Uuid> = self
            .bindings
            .values()
            .filter(|b| b.model_id == id)
            .map(|b| b.id)
            .collect();
        for binding in bindings {
            self.bindings.remove(&binding);
            changes = changes.delete(RecordKind::Binding, binding);
        }
        Ok(changes)
    }

    /// Rules ordered by name, optionally limited to one model.
    pub fn rules(&self, model: Option<ModelId>) -> Vec<ModelRule> {
        let mut rules: Vec<ModelRule> = self
            .rules
            .values()
            .filter(|r| model.is_none_or(|m| r.model_id == m))
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&ModelRule> {
        self.rules.get(&id)
    }

    fn rule_name_taken(&self, name: &str, except: Option<RuleId>) -> bool {
        self.rules
            .values()
            .any(|r| r.name == name && Some(r.id) != except)
    }

    pub fn create_rule(&mut self, req: &CreateRuleRequest) -> CatalogResult<(ModelRule, ChangeSet)> {
        let name = required("name", &req.name)?;
        if self.rule_name_taken(&name, None) {
            return Err(CatalogError::Conflict(format!(
                "rule '{}' already exists",
                name
            )));
        }
        if !self.models.contains_key(&req.model_id) {
            return Err(CatalogError::NotFound("model"));
        }

        let rule = ModelRule {
            id: Uuid::new_v4(),
            name,
            model_id: req.model_id,
            path: required("path", &req.path)?,
            notes: optional(req.notes.as_deref()),
            created_time: Utc::now(),
            updated_time: None,
        };
        self.rules.insert(rule.id, rule.clone());
        let changes = ChangeSet::default().upsert(Record::Rule(rule.clone()));
        Ok((rule, changes))
    }

    /// Update a rule's name or notes. The path never changes.
    pub fn update_rule(
        &mut self,
        id: RuleId,
        req: &UpdateRuleRequest,
    ) -> CatalogResult<(ModelRule, ChangeSet)> {
        if !self.rules.contains_key(&id) {
            return Err(CatalogError::NotFound("rule"));
        }
        let name = req
            .name
            .as_deref()
            .map(|v| required("name", v))
            .transpose()?;
        if let Some(name) = &name {
            if self.rule_name_taken(name, Some(id)) {
                return Err(CatalogError::Conflict(format!(
                    "rule '{}' already exists",
                    name
                )));
            }
        }

        let rule = self
            .rules
            .get_mut(&id)
            .ok_or(CatalogError::NotFound("rule"))?;
        if let Some(name) = name {
            rule.name = name;
        }
        if let Some(notes) = &req.notes {
            rule.notes = optional(Some(notes.as_str()));
        }
        rule.updated_time = Some(Utc::now());

        let rule = rule.clone();
        let changes = ChangeSet::default().upsert(Record::Rule(rule.clone()));
        Ok((rule, changes))
    }

    /// Delete a rule and drop it from every binding. Bindings left without
    /// rules are removed.
    pub fn delete_rule(&mut self, id: RuleId) -> CatalogResult<ChangeSet> {
        if self.rules.remove(&id).is_none() {
            return Err(CatalogError::NotFound("rule"));
        }

        let mut changes = ChangeSet::default().delete(RecordKind::Rule, id);
        let mut emptied = Vec::new();
        for binding in self.bindings.values_mut() {
            if binding.rule_ids.contains(&id) {
                binding.rule_ids.retain(|r| *r != id);
                if binding.rule_ids.is_empty() {
                    emptied.push(binding.id);
                } else {
                    changes = changes.upsert(Record::Binding(binding.clone()));
                }
            }
        }
        for binding in emptied {
            self.bindings.remove(&binding);
            changes = changes.delete(RecordKind::Binding, binding);
        }
        Ok(changes)
    }

    pub fn bindings_for_device(
        &self,
        device_id: DeviceId,
    ) -> CatalogResult<Vec<DeviceModelBinding>> {
        if !self.devices.contains_key(&device_id) {
            return Err(CatalogError::NotFound("device"));
        }
        let mut bindings: Vec<DeviceModelBinding> = self
            .bindings
            .values()
            .filter(|b| b.device_id == device_id)
            .cloned()
            .collect();
        bindings.sort_by_key(|b| b.id);
        Ok(bindings)
    }

    /// Bind a model and a subset of its rules to a device.
    pub fn create_binding(
        &mut self,
        device_id: DeviceId,
        req: &CreateBindingRequest,
    ) -> CatalogResult<(DeviceModelBinding, ChangeSet)> {
        if !self.devices.contains_key(&device_id) {
            return Err(CatalogError::NotFound("device"));
        }
        if !self.models.contains_key(&req.model_id) {
            return Err(CatalogError::NotFound("model"));
        }
        if req.rule_ids.is_empty() {
            return Err(CatalogError::Invalid(
                "a binding needs at least one rule".to_string(),
            ));
        }
        if self
            .bindings
            .values()
            .any(|b| b.device_id == device_id && b.model_id == req.model_id)
        {
            return Err(CatalogError::Conflict(
                "model is already bound to this device".to_string(),
            ));
        }

        let mut rule_ids = Vec::with_capacity(req.rule_ids.len());
        for rule_id in &req.rule_ids {
            let rule = self
                .rules
                .get(rule_id)
                .ok_or(CatalogError::NotFound("rule"))?;
            if rule.model_id != req.model_id {
                return Err(CatalogError::Invalid(format!(
                    "rule '{}' does not belong to the model",
                    rule.name
                )));
            }
            if !rule_ids.contains(rule_id) {
                rule_ids.push(*rule_id);
            }
        }

        let binding = DeviceModelBinding {
            id: Uuid::new_v4(),
            device_id,
            model_id: req.model_id,
            rule_ids,
        };
        self.bindings.insert(binding.id, binding.clone());
        let changes = ChangeSet::default().upsert(Record::Binding(binding.clone()));
        Ok((binding, changes))
    }

    pub fn delete_binding(
        &mut self,
        device_id: DeviceId,
        binding_id: Uuid,
    ) -> CatalogResult<ChangeSet> {
        match self.bindings.get(&binding_id) {
            Some(b) if b.device_id == device_id => {
                self.bindings.remove(&binding_id);
                Ok(ChangeSet::default().delete(RecordKind::Binding, binding_id))
            }
            _ => Err(CatalogError::NotFound("binding")),
        }
    }

    // ------------------------------------------------------------------
    // Alert types and alerts
    // ------------------------------------------------------------------

    /// All alert types ordered by idx.
    pub fn alert_types(&self) -> Vec<AlertType> {
        let mut types: Vec<AlertType> = self.alert_types.values().cloned().collect();
        types.sort_by_key(|t| t.idx);
        types
    }

    pub fn alert_type(&self, id: AlertTypeId) -> Option<&AlertType> {
        self.alert_types.get(&id)
    }

    fn alert_type_name_taken(&self, name: &str, except: Option<AlertTypeId>) -> bool {
        self.alert_types
            .values()
            .any(|t| t.name == name && Some(t.id) != except)
    }

    /// Create an alert type with the next free idx.
    pub fn create_alert_type(
        &mut self,
        req: &CreateAlertTypeRequest,
    ) -> CatalogResult<(AlertType, ChangeSet)> {
        let name = required("name", &req.name)?;
        if self.alert_type_name_taken(&name, None) {
            return Err(CatalogError::Conflict(format!(
                "alert type '{}' already exists",
                name
            )));
        }

        let idx = self.alert_types.values().map(|t| t.idx).max().unwrap_or(0) + 1;
        let alert_type = AlertType {
            id: Uuid::new_v4(),
            name,
            idx,
        };
        self.alert_types.insert(alert_type.id, alert_type.clone());
        let changes = ChangeSet::default().upsert(Record::AlertType(alert_type.clone()));
        Ok((alert_type, changes))
    }

    pub fn update_alert_type(
        &mut self,
        id: AlertTypeId,
        req: &UpdateAlertTypeRequest,
    ) -> CatalogResult<(AlertType, ChangeSet)> {
        if !self.alert_types.contains_key(&id) {
            return Err(CatalogError::NotFound("alert type"));
        }
        let name = req
            .name
            .as_deref()
            .map(|v| required("name", v))
            .transpose()?;
        if let Some(name) = &name {
            if self.alert_type_name_taken(name, Some(id)) {
                return Err(CatalogError::Conflict(format!(
                    "alert type '{}' already exists",
                    name
                )));
            }
        }
        if let Some(idx) = req.idx {
            if self
                .alert_types
                .values()
                .any(|t| t.idx == idx && t.id != id)
            {
                return Err(CatalogError::Conflict(format!(
                    "alert type idx {} is already used",
                    idx
                )));
            }
        }

        let alert_type = self
            .alert_types
            .get_mut(&id)
            .ok_or(CatalogError::NotFound("alert type"))?;
        if let Some(name) = name {
            alert_type.name = name;
        }
        if let Some(idx) = req.idx {
            alert_type.idx = idx;
        }

        let alert_type = alert_type.clone();
        let changes = ChangeSet::default().upsert(Record::AlertType(alert_type.clone()));
        Ok((alert_type, changes))
    }

    /// Delete an alert type that no model or alert refers to.
    pub fn delete_alert_type(&mut self, id: AlertTypeId) -> CatalogResult<ChangeSet> {
        if !self.alert_types.contains_key(&id) {
            return Err(CatalogError::NotFound("alert type"));
        }
        if self.models.values().any(|m| m.alert_type == Some(id))
            || self.alerts.values().any(|a| a.alert_type == id)
        {
            return Err(CatalogError::Conflict(
                "alert type is still in use".to_string(),
            ));
        }

        self.alert_types.remove(&id);
        Ok(ChangeSet::default().delete(RecordKind::AlertType, id))
    }

    pub fn alert(&self, id: Uuid) -> Option<&Alert> {
        self.alerts.get(&id)
    }

    /// Alerts passing the query's filters, newest first.
    pub fn alerts(&self, query: &AlertListQuery) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.alert_time.cmp(&a.alert_time));
        alerts
    }

    /// Raise an alert. Every referenced record must exist and the rule must
    /// belong to the model.
    pub fn create_alert(&mut self, req: &CreateAlertRequest) -> CatalogResult<(Alert, ChangeSet)> {
        if !self.devices.contains_key(&req.device_id) {
            return Err(CatalogError::NotFound("device"));
        }
        if !self.models.contains_key(&req.model_id) {
            return Err(CatalogError::NotFound("model"));
        }
        let rule = self
            .rules
            .get(&req.rule_id)
            .ok_or(CatalogError::NotFound("rule"))?;
        if rule.model_id != req.model_id {
            return Err(CatalogError::Invalid(
                "rule does not belong to the model".to_string(),
            ));
        }
        if !self.alert_types.contains_key(&req.alert_type) {
            return Err(CatalogError::NotFound("alert type"));
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            device_id: req.device_id,
            model_id: req.model_id,
            rule_id: req.rule_id,
            alert_type: req.alert_type,
            image_url: optional(req.image_url.as_deref()),
            alert_msg: optional(req.alert_msg.as_deref()),
            alert_time: Utc::now(),
            alert_level: None,
            alert_result: None,
            status: AlertStatus::Unhandled,
            handled_user: None,
            handled_time: None,
        };
        self.alerts.insert(alert.id, alert.clone());
        let changes = ChangeSet::default().upsert(Record::Alert(alert.clone()));
        Ok((alert, changes))
    }

    /// Mark alerts as handled. Unknown ids are skipped; the call fails only
    /// when none of them exist.
    pub fn handle_alerts(
        &mut self,
        req: &HandleAlertsRequest,
        handled_user: UserId,
    ) -> CatalogResult<(usize, ChangeSet)> {
        if !self.users.contains_key(&handled_user) {
            return Err(CatalogError::NotFound("user"));
        }

        let now = Utc::now();
        let mut changes = ChangeSet::default();
        let mut handled = 0;
        for id in &req.ids {
            if let Some(alert) = self.alerts.get_mut(id) {
                alert.alert_result = Some(req.alert_result);
                alert.alert_level = Some(req.alert_level);
                alert.handled_user = Some(handled_user);
                alert.handled_time = Some(now);
                alert.status = AlertStatus::Handled;
                changes = changes.upsert(Record::Alert(alert.clone()));
                handled += 1;
            }
        }

        if handled == 0 {
            return Err(CatalogError::NotFound("alert"));
        }
        Ok((handled, changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tardet_types::{AlertLevel, AlertResult, Role, VendorKind};

    fn catalog_with_company() -> (Catalog, Company) {
        let mut catalog = Catalog::new();
        let (company, _) = catalog
            .create_company(&CreateCompanyRequest {
                name: "Hikvision".to_string(),
                vendor: VendorKind::Hikvision,
                stream_scheme: None,
                stream_path: None,
            })
            .unwrap();
        (catalog, company)
    }

    fn device_request(code: &str, company_id: CompanyId) -> CreateDeviceRequest {
        CreateDeviceRequest {
            name: format!("Camera {}", code),
            code: code.to_string(),
            director: None,
            ip_address: "10.0.0.5".to_string(),
            port: 554,
            admin_account: "admin".to_string(),
            admin_pwd: "secret".to_string(),
            company_id,
            node_id: None,
        }
    }

    fn node_request(name: &str, parent_id: Option<NodeId>) -> CreateNodeRequest {
        CreateNodeRequest {
            name: name.to_string(),
            parent_id,
        }
    }

    fn user_request(usercode: &str) -> CreateUserRequest {
        CreateUserRequest {
            usercode: usercode.to_string(),
            username: usercode.to_uppercase(),
            password: "password".to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn test_create_user_rejects_duplicate_usercode() {
        let mut catalog = Catalog::new();
        let (user, changes) = catalog
            .create_user(&user_request("alice"), "hash".to_string(), None)
            .unwrap();
        assert_eq!(changes.upserts, vec![Record::User(user)]);

        let err = catalog
            .create_user(&user_request("alice"), "hash".to_string(), None)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
        assert_eq!(catalog.user_count(), 1);
    }

    #[test]
    fn test_user_cannot_delete_self() {
        let mut catalog = Catalog::new();
        let (alice, _) = catalog
            .create_user(&user_request("alice"), "hash".to_string(), None)
            .unwrap();
        let (bob, _) = catalog
            .create_user(&user_request("bob"), "hash".to_string(), Some(alice.id))
            .unwrap();

        assert!(matches!(
            catalog.delete_user("alice", Some(alice.id)),
            Err(CatalogError::Invalid(_))
        ));

        let changes = catalog.delete_user("bob", Some(alice.id)).unwrap();
        assert_eq!(changes.deletes, vec![(RecordKind::User, bob.id)]);
        assert!(catalog.user_by_code("bob").is_none());
    }

    #[test]
    fn test_update_user_keeps_hash_without_new_password() {
        let mut catalog = Catalog::new();
        catalog
            .create_user(&user_request("alice"), "old".to_string(), None)
            .unwrap();

        let (user, _) = catalog
            .update_user(
                "alice",
                &UpdateUserRequest {
                    username: Some("Alice A.".to_string()),
                    password: None,
                    role: Some(Role::Admin),
                },
                None,
            )
            .unwrap();
        assert_eq!(user.username, "Alice A.");
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.password_hash, "old");
    }

    #[test]
    fn test_company_delete_blocked_by_devices() {
        let (mut catalog, company) = catalog_with_company();
        let (device, _) = catalog
            .create_device(&device_request("CAM-1", company.id), "enc".to_string())
            .unwrap();

        assert!(matches!(
            catalog.delete_company(company.id),
            Err(CatalogError::Conflict(_))
        ));

        catalog.delete_device(device.id).unwrap();
        let changes = catalog.delete_company(company.id).unwrap();
        assert_eq!(changes.deletes, vec![(RecordKind::Company, company.id)]);
    }

    #[test]
    fn test_company_name_unique() {
        let (mut catalog, _) = catalog_with_company();
        let err = catalog
            .create_company(&CreateCompanyRequest {
                name: " Hikvision ".to_string(),
                vendor: VendorKind::Generic,
                stream_scheme: None,
                stream_path: None,
            })
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[test]
    fn test_create_device_checks_references() {
        let (mut catalog, company) = catalog_with_company();

        let err = catalog
            .create_device(&device_request("CAM-1", Uuid::new_v4()), "enc".to_string())
            .unwrap_err();
        assert_eq!(err, CatalogError::NotFound("company"));

        let mut req = device_request("CAM-1", company.id);
        req.node_id = Some(Uuid::new_v4());
        let err = catalog.create_device(&req, "enc".to_string()).unwrap_err();
        assert_eq!(err, CatalogError::NotFound("node"));

        let (device, _) = catalog
            .create_device(&device_request("CAM-1", company.id), "enc".to_string())
            .unwrap();
        assert_eq!(device.admin_pwd, "enc");
        assert!(!device.is_online);

        let err = catalog
            .create_device(&device_request("CAM-1", company.id), "enc".to_string())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[test]
    fn test_record_probe_tracks_transitions() {
        let (mut catalog, company) = catalog_with_company();
        let (device, _) = catalog
            .create_device(&device_request("CAM-1", company.id), "enc".to_string())
            .unwrap();

        let (online, _) = catalog.record_probe(device.id, true).unwrap();
        assert!(online.is_online);
        assert!(online.connected_time.is_some());
        assert!(online.disconnected_time.is_none());
        assert!(online.sync_time.is_some());

        let (again, _) = catalog.record_probe(device.id, true).unwrap();
        assert_eq!(again.connected_time, online.connected_time);

        let (offline, _) = catalog.record_probe(device.id, false).unwrap();
        assert!(!offline.is_online);
        assert!(offline.disconnected_time.is_some());
    }

    #[test]
    fn test_node_codes_follow_siblings() {
        let mut catalog = Catalog::new();
        let (root, _) = catalog.create_node(&node_request("Campus", None)).unwrap();
        assert_eq!(root.code, "001");
        assert_eq!(root.level, 1);

        let (a, changes) = catalog
            .create_node(&node_request("Building A", Some(root.id)))
            .unwrap();
        assert_eq!(a.code, "001001");
        assert_eq!(a.level, 2);
        // Parent lost its leaf flag in the same change set
        assert_eq!(changes.upserts.len(), 2);
        assert!(!catalog.node(root.id).unwrap().is_leaf);

        let (b, _) = catalog
            .create_node(&node_request("Building B", Some(root.id)))
            .unwrap();
        assert_eq!(b.code, "001002");

        let (second_root, _) = catalog.create_node(&node_request("Depot", None)).unwrap();
        assert_eq!(second_root.code, "002");

        let err = catalog
            .create_node(&node_request("Orphan", Some(Uuid::new_v4())))
            .unwrap_err();
        assert_eq!(err, CatalogError::NotFound("parent node"));
    }

    #[test]
    fn test_node_code_overflow() {
        let mut catalog = Catalog::new();
        let (root, _) = catalog.create_node(&node_request("Campus", None)).unwrap();
        let last = Node {
            id: Uuid::new_v4(),
            name: "Last".to_string(),
            parent_id: Some(root.id),
            level: 2,
            code: "001999".to_string(),
            is_leaf: true,
            created_time: Utc::now(),
        };
        catalog.nodes.insert(last.id, last);

        let err = catalog
            .create_node(&node_request("One more", Some(root.id)))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[test]
    fn test_node_tree_nests_by_code() {
        let mut catalog = Catalog::new();
        let (root, _) = catalog.create_node(&node_request("Campus", None)).unwrap();
        let (a, _) = catalog
            .create_node(&node_request("A", Some(root.id)))
            .unwrap();
        catalog
            .create_node(&node_request("A-1", Some(a.id)))
            .unwrap();
        catalog.create_node(&node_request("Depot", None)).unwrap();

        let tree = catalog.node_tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].node.code, "001");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].children[0].node.code, "001001001");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_delete_node_removes_subtree_and_detaches_devices() {
        let (mut catalog, company) = catalog_with_company();
        let (root, _) = catalog.create_node(&node_request("Campus", None)).unwrap();
        let (a, _) = catalog
            .create_node(&node_request("A", Some(root.id)))
            .unwrap();
        let (a1, _) = catalog
            .create_node(&node_request("A-1", Some(a.id)))
            .unwrap();

        let mut req = device_request("CAM-1", company.id);
        req.node_id = Some(a1.id);
        let (device, _) = catalog.create_device(&req, "enc".to_string()).unwrap();

        let changes = catalog.delete_node(a.id).unwrap();
        assert_eq!(changes.deletes.len(), 2);
        assert!(catalog.node(a.id).is_none());
        assert!(catalog.node(a1.id).is_none());
        assert_eq!(catalog.device(device.id).unwrap().node_id, None);
        assert!(catalog.node(root.id).unwrap().is_leaf);
    }

    #[test]
    fn test_devices_filtered_by_subtree() {
        let (mut catalog, company) = catalog_with_company();
        let (root, _) = catalog.create_node(&node_request("Campus", None)).unwrap();
        let (a, _) = catalog
            .create_node(&node_request("A", Some(root.id)))
            .unwrap();
        let (depot, _) = catalog.create_node(&node_request("Depot", None)).unwrap();

        let mut req = device_request("CAM-2", company.id);
        req.node_id = Some(a.id);
        catalog.create_device(&req, "enc".to_string()).unwrap();
        let mut req = device_request("CAM-1", company.id);
        req.node_id = Some(depot.id);
        catalog.create_device(&req, "enc".to_string()).unwrap();

        let under_root = catalog.devices(Some(root.id)).unwrap();
        assert_eq!(under_root.len(), 1);
        assert_eq!(under_root[0].code, "CAM-2");

        let all = catalog.devices(None).unwrap();
        assert_eq!(
            all.iter().map(|d| d.code.as_str()).collect::<Vec<_>>(),
            vec!["CAM-1", "CAM-2"]
        );
    }

    fn catalog_with_model() -> (Catalog, Device, Model, ModelRule) {
        let (mut catalog, company) = catalog_with_company();
        let (device, _) = catalog
            .create_device(&device_request("CAM-1", company.id), "enc".to_string())
            .unwrap();
        let (model, _) = catalog
            .create_model(&CreateModelRequest {
                name: "helmet".to_string(),
                alert_type: None,
            })
            .unwrap();
        let (rule, _) = catalog
            .create_rule(&CreateRuleRequest {
                name: "no-helmet".to_string(),
                model_id: model.id,
                path: "/rules/no-helmet.json".to_string(),
                notes: None,
            })
            .unwrap();
        (catalog, device, model, rule)
    }

    #[test]
    fn test_binding_rules_must_belong_to_model() {
        let (mut catalog, device, model, rule) = catalog_with_model();
        let (other, _) = catalog
            .create_model(&CreateModelRequest {
                name: "smoke".to_string(),
                alert_type: None,
            })
            .unwrap();
        let (foreign, _) = catalog
            .create_rule(&CreateRuleRequest {
                name: "smoke-detected".to_string(),
                model_id: other.id,
                path: "/rules/smoke.json".to_string(),
                notes: None,
            })
            .unwrap();

        let err = catalog
            .create_binding(
                device.id,
                &CreateBindingRequest {
                    model_id: model.id,
                    rule_ids: vec![rule.id, foreign.id],
                },
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));

        let (binding, _) = catalog
            .create_binding(
                device.id,
                &CreateBindingRequest {
                    model_id: model.id,
                    rule_ids: vec![rule.id, rule.id],
                },
            )
            .unwrap();
        assert_eq!(binding.rule_ids, vec![rule.id]);
        assert_eq!(catalog.bindings_for_device(device.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_model_cascades() {
        let (mut catalog, device, model, rule) = catalog_with_model();
        let (binding, _) = catalog
            .create_binding(
                device.id,
                &CreateBindingRequest {
                    model_id: model.id,
                    rule_ids: vec![rule.id],
                },
            )
            .unwrap();

        let changes = catalog.delete_model(model.id).unwrap();
        assert!(changes.deletes.contains(&(RecordKind::Model, model.id)));
        assert!(changes.deletes.contains(&(RecordKind::Rule, rule.id)));
        assert!(changes.deletes.contains(&(RecordKind::Binding, binding.id)));
        assert!(catalog.rule(rule.id).is_none());
        assert!(catalog.bindings_for_device(device.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_device_cascades_bindings() {
        let (mut catalog, device, model, rule) = catalog_with_model();
        let (binding, _) = catalog
            .create_binding(
                device.id,
                &CreateBindingRequest {
                    model_id: model.id,
                    rule_ids: vec![rule.id],
                },
            )
            .unwrap();

        let changes = catalog.delete_device(device.id).unwrap();
        assert!(changes.deletes.contains(&(RecordKind::Binding, binding.id)));
        assert!(catalog.bindings.is_empty());
    }

    #[test]
    fn test_delete_rule_prunes_bindings() {
        let (mut catalog, device, model, rule) = catalog_with_model();
        catalog
            .create_binding(
                device.id,
                &CreateBindingRequest {
                    model_id: model.id,
                    rule_ids: vec![rule.id],
                },
            )
            .unwrap();

        catalog.delete_rule(rule.id).unwrap();
        assert!(catalog.bindings_for_device(device.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_rule_keeps_path() {
        let (mut catalog, _, _, rule) = catalog_with_model();
        let (updated, _) = catalog
            .update_rule(
                rule.id,
                &UpdateRuleRequest {
                    name: Some("no-helmet-v2".to_string()),
                    notes: Some("tuned".to_string()),
                },
            )
            .unwrap();
        assert_eq!(updated.path, rule.path);
        assert_eq!(updated.notes.as_deref(), Some("tuned"));
        assert!(updated.updated_time.is_some());
    }

    #[test]
    fn test_alert_type_idx_assignment() {
        let mut catalog = Catalog::new();
        let (first, _) = catalog
            .create_alert_type(&CreateAlertTypeRequest {
                name: "intrusion".to_string(),
            })
            .unwrap();
        let (second, _) = catalog
            .create_alert_type(&CreateAlertTypeRequest {
                name: "fire".to_string(),
            })
            .unwrap();
        assert_eq!((first.idx, second.idx), (1, 2));

        let err = catalog
            .update_alert_type(
                second.id,
                &UpdateAlertTypeRequest {
                    name: None,
                    idx: Some(1),
                },
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        catalog
            .update_alert_type(
                second.id,
                &UpdateAlertTypeRequest {
                    name: None,
                    idx: Some(10),
                },
            )
            .unwrap();
        let (third, _) = catalog
            .create_alert_type(&CreateAlertTypeRequest {
                name: "smoke".to_string(),
            })
            .unwrap();
        assert_eq!(third.idx, 11);
        assert_eq!(
            catalog
                .alert_types()
                .iter()
                .map(|t| t.idx)
                .collect::<Vec<_>>(),
            vec![1, 10, 11]
        );
    }

    #[test]
    fn test_alert_lifecycle() {
        let (mut catalog, device, model, rule) = catalog_with_model();
        let (alert_type, _) = catalog
            .create_alert_type(&CreateAlertTypeRequest {
                name: "no helmet".to_string(),
            })
            .unwrap();
        let (handler, _) = catalog
            .create_user(&user_request("guard"), "hash".to_string(), None)
            .unwrap();

        let request = CreateAlertRequest {
            device_id: device.id,
            model_id: model.id,
            rule_id: rule.id,
            alert_type: alert_type.id,
            image_url: Some("/snapshots/1.jpg".to_string()),
            alert_msg: None,
        };
        let (first, _) = catalog.create_alert(&request).unwrap();
        let (second, _) = catalog.create_alert(&request).unwrap();

        let listed = catalog.alerts(&AlertListQuery::default());
        assert_eq!(listed.len(), 2);
        assert!(listed[0].alert_time >= listed[1].alert_time);

        let (handled, changes) = catalog
            .handle_alerts(
                &HandleAlertsRequest {
                    ids: vec![first.id, Uuid::new_v4()],
                    alert_result: AlertResult::Confirmed,
                    alert_level: AlertLevel::B,
                    handled_user: None,
                },
                handler.id,
            )
            .unwrap();
        assert_eq!(handled, 1);
        assert_eq!(changes.upserts.len(), 1);

        let alert = catalog.alert(first.id).unwrap();
        assert_eq!(alert.status, AlertStatus::Handled);
        assert_eq!(alert.handled_user, Some(handler.id));
        assert!(alert.handled_time.is_some());

        let unhandled = catalog.alerts(&AlertListQuery {
            status: Some(AlertStatus::Unhandled),
            ..Default::default()
        });
        assert_eq!(unhandled.len(), 1);
        assert_eq!(unhandled[0].id, second.id);

        let err = catalog
            .handle_alerts(
                &HandleAlertsRequest {
                    ids: vec![Uuid::new_v4()],
                    alert_result: AlertResult::FalseAlarm,
                    alert_level: AlertLevel::D,
                    handled_user: None,
                },
                handler.id,
            )
            .unwrap_err();
        assert_eq!(err, CatalogError::NotFound("alert"));

        assert!(matches!(
            catalog.delete_alert_type(alert_type.id),
            Err(CatalogError::Conflict(_))
        ));
    }

    #[test]
    fn test_create_alert_checks_references() {
        let (mut catalog, device, model, rule) = catalog_with_model();
        let err = catalog
            .create_alert(&CreateAlertRequest {
                device_id: device.id,
                model_id: model.id,
                rule_id: rule.id,
                alert_type: Uuid::new_v4(),
                image_url: None,
                alert_msg: None,
            })
            .unwrap_err();
        assert_eq!(err, CatalogError::NotFound("alert type"));
    }

    #[test]
    fn test_from_records_roundtrip() {
        let (mut catalog, company) = catalog_with_company();
        let (_, changes) = catalog
            .create_device(&device_request("CAM-1", company.id), "enc".to_string())
            .unwrap();

        let mut records = vec![Record::Company(company.clone())];
        records.extend(changes.upserts);
        let rebuilt = Catalog::from_records(records);
        assert_eq!(rebuilt.companies(), vec![company]);
        assert_eq!(rebuilt.devices(None).unwrap().len(), 1);
    }
}
