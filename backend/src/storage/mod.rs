//! Storage layer for persisting catalog records.

mod json_storage;
mod postgres_storage;

pub use json_storage::JsonFileStorage;
pub use postgres_storage::PostgresStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tardet_types::{
    Alert, AlertType, Company, Device, DeviceModelBinding, Model, ModelRule, Node, User,
};
use uuid::Uuid;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The kind of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    User,
    Company,
    Device,
    Node,
    Model,
    Rule,
    Binding,
    AlertType,
    Alert,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Company => "company",
            RecordKind::Device => "device",
            RecordKind::Node => "node",
            RecordKind::Model => "model",
            RecordKind::Rule => "rule",
            RecordKind::Binding => "binding",
            RecordKind::AlertType => "alert_type",
            RecordKind::Alert => "alert",
        }
    }
}

/// A record as persisted by a storage backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    User(User),
    Company(Company),
    Device(Device),
    Node(Node),
    Model(Model),
    Rule(ModelRule),
    Binding(DeviceModelBinding),
    AlertType(AlertType),
    Alert(Alert),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::User(_) => RecordKind::User,
            Record::Company(_) => RecordKind::Company,
            Record::Device(_) => RecordKind::Device,
            Record::Node(_) => RecordKind::Node,
            Record::Model(_) => RecordKind::Model,
            Record::Rule(_) => RecordKind::Rule,
            Record::Binding(_) => RecordKind::Binding,
            Record::AlertType(_) => RecordKind::AlertType,
            Record::Alert(_) => RecordKind::Alert,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::User(r) => r.id,
            Record::Company(r) => r.id,
            Record::Device(r) => r.id,
            Record::Node(r) => r.id,
            Record::Model(r) => r.id,
            Record::Rule(r) => r.id,
            Record::Binding(r) => r.id,
            Record::AlertType(r) => r.id,
            Record::Alert(r) => r.id,
        }
    }

    pub fn key(&self) -> RecordKey {
        (self.kind(), self.id())
    }
}

/// Identifies a stored record.
pub type RecordKey = (RecordKind, Uuid);

/// Records written and removed by one catalog mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub upserts: Vec<Record>,
    pub deletes: Vec<RecordKey>,
}

impl ChangeSet {
    pub fn upsert(mut self, record: Record) -> Self {
        self.upserts.push(record);
        self
    }

    pub fn delete(mut self, kind: RecordKind, id: Uuid) -> Self {
        self.deletes.push((kind, id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Trait for record storage backends.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load every stored record.
    async fn load_all(&self) -> Result<Vec<Record>>;

    /// Persist one mutation: write `upserts`, then remove `deletes`.
    async fn apply(&self, changes: &ChangeSet) -> Result<()>;
}
