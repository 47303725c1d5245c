use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level config loaded from `engine.toml`. None of these options change
/// analytical behaviour — they only affect transport, storage location and
/// the (unimplemented) auth surface described in the HTTP layer's contract.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_max_upload_size_mb")]
    pub max_upload_size_mb: u64,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_token_expiry")]
    pub access_token_expire_minutes: u64,
    #[serde(default = "default_admin_username")]
    pub default_admin_username: String,
    #[serde(default = "default_admin_password_file")]
    pub initial_admin_password_file: PathBuf,
    #[serde(default)]
    pub db_backend: DbBackend,
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_port: Option<u16>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub app_debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    #[default]
    Sqlite,
    Mysql,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_max_upload_size_mb() -> u64 {
    200
}

fn default_token_expiry() -> u64 {
    60
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password_file() -> PathBuf {
    PathBuf::from("./admin_password.txt")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            max_upload_size_mb: default_max_upload_size_mb(),
            allowed_origins: Vec::new(),
            access_token_expire_minutes: default_token_expiry(),
            default_admin_username: default_admin_username(),
            initial_admin_password_file: default_admin_password_file(),
            db_backend: DbBackend::default(),
            db_host: None,
            db_port: None,
            db_name: None,
            db_user: None,
            db_password: None,
            app_debug: false,
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file, then apply `ENGINE_*` environment variable
    /// overrides on top (see `apply_env_overrides`). Returns defaults (still
    /// subject to env overrides) if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            Self::default()
        } else {
            let contents = std::fs::read_to_string(path)?;
            let config: EngineConfig = toml::from_str(&contents)?;
            tracing::info!("loaded config from {}", path.display());
            config
        };

        config.apply_env_overrides()?;

        if config.db_backend == DbBackend::Mysql {
            anyhow::bail!("db_backend = mysql is accepted by the schema but not implemented by this build");
        }
        Ok(config)
    }

    /// Overrides individual fields from `ENGINE_*` environment variables, the
    /// same prefix `main` already uses for `ENGINE_CONFIG`. A variable that is
    /// set but fails to parse is a startup error, not a silent skip.
    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("ENGINE_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGINE_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGINE_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGINE_MAX_UPLOAD_SIZE_MB") {
            self.max_upload_size_mb = v
                .parse()
                .map_err(|_| anyhow::anyhow!("ENGINE_MAX_UPLOAD_SIZE_MB must be an integer, got {v:?}"))?;
        }
        if let Ok(v) = std::env::var("ENGINE_ALLOWED_ORIGINS") {
            self.allowed_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("ENGINE_ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.access_token_expire_minutes = v
                .parse()
                .map_err(|_| anyhow::anyhow!("ENGINE_ACCESS_TOKEN_EXPIRE_MINUTES must be an integer, got {v:?}"))?;
        }
        if let Ok(v) = std::env::var("ENGINE_DEFAULT_ADMIN_USERNAME") {
            self.default_admin_username = v;
        }
        if let Ok(v) = std::env::var("ENGINE_INITIAL_ADMIN_PASSWORD_FILE") {
            self.initial_admin_password_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ENGINE_DB_BACKEND") {
            self.db_backend = match v.to_lowercase().as_str() {
                "sqlite" => DbBackend::Sqlite,
                "mysql" => DbBackend::Mysql,
                other => anyhow::bail!("ENGINE_DB_BACKEND must be \"sqlite\" or \"mysql\", got {other:?}"),
            };
        }
        if let Ok(v) = std::env::var("ENGINE_DB_HOST") {
            self.db_host = Some(v);
        }
        if let Ok(v) = std::env::var("ENGINE_DB_PORT") {
            self.db_port = Some(
                v.parse()
                    .map_err(|_| anyhow::anyhow!("ENGINE_DB_PORT must be a port number, got {v:?}"))?,
            );
        }
        if let Ok(v) = std::env::var("ENGINE_DB_NAME") {
            self.db_name = Some(v);
        }
        if let Ok(v) = std::env::var("ENGINE_DB_USER") {
            self.db_user = Some(v);
        }
        if let Ok(v) = std::env::var("ENGINE_DB_PASSWORD") {
            self.db_password = Some(v);
        }
        if let Ok(v) = std::env::var("ENGINE_APP_DEBUG") {
            self.app_debug = matches!(v.trim(), "1" | "true" | "TRUE" | "True");
        }
        Ok(())
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("engine.db")
    }
}
