//! Application state management.

use crate::auth::{AuthConfig, Principal, TokenRegistry};
use crate::catalog::{Catalog, CatalogError, CatalogResult};
use crate::relay::{
    DeviceDirectory, GstSourceOpener, PingProber, Prober, RelayConfig, RelayDeps, SecretCipher,
    SecretError, SourceOpener,
};
use crate::storage::{ChangeSet, JsonFileStorage, Storage, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use tardet_types::{Company, CompanyId, Device, DeviceId, Role, User, UserId};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Errors from a persisted catalog mutation.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to persist change: {0}")]
    Storage(#[from] StorageError),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// All catalog records
    catalog: RwLock<Catalog>,
    /// Storage backend
    storage: Arc<dyn Storage>,
    /// Held from a mutation's catalog change until its storage write ends
    persist: Mutex<()>,
    /// Authentication settings
    auth: AuthConfig,
    /// Issued bearer tokens
    tokens: TokenRegistry,
    /// Cipher for stored device credentials
    cipher: Option<SecretCipher>,
    /// Relay timing and encoding
    relay: RelayConfig,
    /// Device reachability probe
    prober: Arc<dyn Prober>,
    /// Opens camera streams
    opener: Arc<dyn SourceOpener>,
    /// Cancelled on server shutdown; relay sessions use child tokens
    shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state with the given storage backend and the
    /// default ping prober and GStreamer source opener.
    pub fn new(
        storage: impl Storage + 'static,
        auth: AuthConfig,
        cipher: Option<SecretCipher>,
        relay: RelayConfig,
    ) -> Self {
        let opener = GstSourceOpener::new(relay.open_timeout(), relay.pull_timeout());
        Self::with_collaborators(
            storage,
            auth,
            cipher,
            relay,
            Arc::new(PingProber::new()),
            Arc::new(opener),
        )
    }

    /// Create new application state with explicit relay collaborators.
    pub fn with_collaborators(
        storage: impl Storage + 'static,
        auth: AuthConfig,
        cipher: Option<SecretCipher>,
        relay: RelayConfig,
        prober: Arc<dyn Prober>,
        opener: Arc<dyn SourceOpener>,
    ) -> Self {
        if cipher.is_none() {
            warn!("No credential key configured; devices cannot be created or streamed");
        }
        Self {
            inner: Arc::new(AppStateInner {
                catalog: RwLock::new(Catalog::new()),
                storage: Arc::new(storage),
                persist: Mutex::new(()),
                tokens: TokenRegistry::new(&auth),
                auth,
                cipher,
                relay,
                prober,
                opener,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Create new application state with JSON file storage.
    pub fn with_json_storage(
        store_path: impl AsRef<std::path::Path>,
        auth: AuthConfig,
        cipher: Option<SecretCipher>,
        relay: RelayConfig,
    ) -> Self {
        Self::new(JsonFileStorage::new(store_path), auth, cipher, relay)
    }

    /// Create new application state with PostgreSQL storage.
    ///
    /// Connects to the database and runs migrations.
    pub async fn with_postgres_storage(
        database_url: &str,
        auth: AuthConfig,
        cipher: Option<SecretCipher>,
        relay: RelayConfig,
    ) -> anyhow::Result<Self> {
        use crate::storage::PostgresStorage;

        let storage = PostgresStorage::new(database_url).await?;
        storage.run_migrations().await?;

        Ok(Self::new(storage, auth, cipher, relay))
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.inner.auth
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.inner.tokens
    }

    pub fn relay_config(&self) -> &RelayConfig {
        &self.inner.relay
    }

    pub fn prober(&self) -> &dyn Prober {
        self.inner.prober.as_ref()
    }

    /// Token cancelled when the server shuts down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Collaborators for a relay session.
    pub fn relay_deps(&self) -> RelayDeps<'_> {
        RelayDeps {
            directory: self,
            secrets: &self.inner.cipher,
            prober: self.inner.prober.as_ref(),
            opener: self.inner.opener.as_ref(),
        }
    }

    /// Encrypt a device credential for storage.
    pub fn encrypt_secret(&self, plaintext: &str) -> Result<String, SecretError> {
        self.inner
            .cipher
            .as_ref()
            .map(|cipher| cipher.encrypt(plaintext))
            .ok_or(SecretError::NotConfigured)
    }

    /// Read access to the catalog. Do not hold the guard across other awaits.
    pub async fn catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.inner.catalog.read().await
    }

    /// Apply a catalog mutation and persist the records it touched.
    ///
    /// Mutations are persisted in the order they were applied. The catalog
    /// lock is released before storage is written, so readers are not
    /// blocked by I/O. If the write fails the catalog is reloaded from
    /// storage, discarding the change.
    pub async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Catalog) -> CatalogResult<(T, ChangeSet)>,
    ) -> Result<T, StateError> {
        let _persist = self.inner.persist.lock().await;

        let (value, changes) = {
            let mut catalog = self.inner.catalog.write().await;
            change(&mut catalog)?
        };

        if let Err(e) = self.inner.storage.apply(&changes).await {
            error!("Failed to persist catalog change: {}", e);
            self.restore_from_storage().await;
            return Err(e.into());
        }
        Ok(value)
    }

    /// Replace the in-memory catalog with what storage holds.
    async fn restore_from_storage(&self) {
        match self.inner.storage.load_all().await {
            Ok(records) => {
                *self.inner.catalog.write().await = Catalog::from_records(records);
                warn!("Discarded unpersisted change, catalog reloaded from storage");
            }
            Err(e) => error!("Failed to reload catalog after storage error: {}", e),
        }
    }

    /// Resolve a user id to a principal, if the user still exists.
    pub async fn principal_for(&self, user_id: UserId) -> Option<Principal> {
        self.catalog()
            .await
            .user(user_id)
            .map(|user| Principal::User {
                id: user.id,
                usercode: user.usercode.clone(),
                role: user.role,
            })
    }

    /// Load records from storage into memory.
    pub async fn load_from_storage(&self) -> anyhow::Result<()> {
        info!("Loading records from storage...");
        match self.inner.storage.load_all().await {
            Ok(records) => {
                let count = records.len();
                *self.inner.catalog.write().await = Catalog::from_records(records);
                info!("Loaded {} records from storage", count);
                Ok(())
            }
            Err(e) => {
                error!("Failed to load records from storage: {}", e);
                Err(e.into())
            }
        }
    }

    /// Create the configured administrator when no user exists yet.
    pub async fn bootstrap_admin(&self) -> anyhow::Result<()> {
        let auth = &self.inner.auth;
        if self.catalog().await.user_count() > 0 {
            return Ok(());
        }

        let (Some(usercode), Some(hash)) = (&auth.admin_user, &auth.admin_password_hash) else {
            warn!("No users exist and no bootstrap admin is configured; nobody can log in");
            return Ok(());
        };

        let admin = User {
            id: Uuid::new_v4(),
            usercode: usercode.clone(),
            username: usercode.clone(),
            password_hash: hash.clone(),
            role: Role::Admin,
            creator_id: None,
            created_time: chrono::Utc::now(),
        };
        self.mutate(|catalog| catalog.insert_user(admin)).await?;
        info!("Created bootstrap administrator '{}'", usercode);
        Ok(())
    }
}

#[async_trait]
impl DeviceDirectory for AppState {
    async fn get_device(&self, id: DeviceId) -> Option<Device> {
        self.catalog().await.device(id).cloned()
    }

    async fn get_company(&self, id: CompanyId) -> Option<Company> {
        self.catalog().await.company(id).cloned()
    }
}
