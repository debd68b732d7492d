//! Application state management

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use zenith_core::{AppConfig, Database, Error, Result};

/// Resolved directories, configuration and the open database
pub struct AppState {
    data_dir: PathBuf,
    pub config: AppConfig,
    pub db: Database,
}

impl AppState {
    /// Open state under `data_dir` (or the platform default) with an optional config override
    pub fn new(data_dir: Option<PathBuf>, config_path: Option<&Path>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => Self::data_path()?,
        };
        std::fs::create_dir_all(&data_dir)?;

        let config = match config_path {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::load_from_dir(&data_dir)?,
        };

        let db_path = config.database_path(&data_dir);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %db_path.display(), "Opening database");
        let db = Database::open(&db_path)?;

        Ok(Self {
            data_dir,
            config,
            db,
        })
    }

    fn data_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "zenith", "zenith").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Render an amount with the configured currency prefix
    pub fn money(&self, amount: zenith_core::Money) -> String {
        amount.display(&self.config.currency)
    }
}
