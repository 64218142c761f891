//! Cross-platform data path resolution.
//!
//! Decides where the JSON record store lives based on platform conventions
//! and Docker detection.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name of the JSON record store inside the data directory.
pub const STORE_FILE_NAME: &str = "store.json";

/// Represents the resolved paths for application data storage.
#[derive(Debug, Clone)]
pub struct DataPaths {
    /// Path to the JSON record store
    pub store_path: PathBuf,
}

/// Configuration for path resolution.
#[derive(Debug, Default)]
pub struct PathConfig {
    /// Explicit data directory (store.json will be inside)
    pub data_dir: Option<PathBuf>,
    /// Explicit path to the store file
    pub store_path: Option<PathBuf>,
}

impl DataPaths {
    /// Resolve data paths based on configuration.
    ///
    /// Priority (highest to lowest):
    /// 1. Explicit store_path if provided
    /// 2. Explicit data_dir if provided
    /// 3. Default directory (platform-specific or Docker-detected)
    pub fn resolve(config: PathConfig) -> anyhow::Result<Self> {
        if let Some(path) = config.store_path {
            info!("Using custom store path: {}", path.display());
            return Ok(Self { store_path: path });
        }

        let base_dir = match config.data_dir {
            Some(dir) => dir,
            None => Self::default_data_dir(),
        };

        if !base_dir.exists() {
            std::fs::create_dir_all(&base_dir)?;
            info!("Created data directory: {}", base_dir.display());
        }

        let store_path = base_dir.join(STORE_FILE_NAME);
        Self::check_legacy_store(&store_path);

        info!("Record store: {}", store_path.display());
        Ok(Self { store_path })
    }

    /// Determine the default data directory based on platform and environment.
    fn default_data_dir() -> PathBuf {
        if Self::is_docker() {
            info!("Docker environment detected, using ./data/ for storage");
            return PathBuf::from("./data");
        }

        match ProjectDirs::from("", "", "tardet") {
            Some(proj_dirs) => {
                let data_dir = proj_dirs.data_dir().to_path_buf();
                info!(
                    "Using platform-specific data directory: {}",
                    data_dir.display()
                );
                data_dir
            }
            None => {
                warn!("Could not determine user data directory, falling back to ./data/");
                PathBuf::from("./data")
            }
        }
    }

    /// Detect if running inside a Docker container.
    fn is_docker() -> bool {
        if Path::new("/.dockerenv").exists() {
            return true;
        }

        if let Ok(cgroup) = std::fs::read_to_string("/proc/self/cgroup") {
            if cgroup.contains("docker") || cgroup.contains("containerd") {
                return true;
            }
        }

        false
    }

    /// Warn about a store file in the working directory that is not the one in use.
    fn check_legacy_store(store_path: &Path) {
        let cwd_store = Path::new(".").join(STORE_FILE_NAME);
        if cwd_store.exists() && cwd_store.canonicalize().ok() != store_path.canonicalize().ok() {
            warn!(
                "Found {} in current directory, but using: {}",
                STORE_FILE_NAME,
                store_path.display()
            );
            warn!("Consider moving your data or using --store-path to specify the location");
        }
    }
}
