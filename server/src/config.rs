use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "./fleetwatch.toml";

/// Fleetwatch live route server
///
/// Flags that are not given on the command line are left unset so they do not
/// shadow values from the TOML file or the environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "fleetwatch-server", version, about = "Fleetwatch live route server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "FLEETWATCH_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "FLEETWATCH_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys)
    #[arg(long, env = "FLEETWATCH_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// HS256 secret shared with the identity provider
    #[arg(long, env = "FLEETWATCH_JWT_SECRET", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Allowed CORS origins (comma separated); empty allows any origin
    #[arg(long, env = "FLEETWATCH_CORS_ORIGINS", value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cors_origins: Vec<String>,
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    #[serde(default)]
    pub json_logs: bool,
    pub data_dir: String,
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// WebSocket liveness settings (loaded from [ws] section in TOML)
    #[serde(default)]
    pub ws: WsConfig,
    #[serde(skip)]
    pub generate_config: bool,
}

/// WebSocket keepalive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing (default: 10)
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            jwt_secret: None,
            cors_origins: Vec::new(),
            ws: WsConfig::default(),
            generate_config: false,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (FLEETWATCH_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Cli::parse())
    }

    pub fn load_from(cli: Cli) -> Result<Self, figment::Error> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            // List values come through clap, which splits them
            .merge(Env::prefixed("FLEETWATCH_").split("__").ignore(&["cors_origins"]))
            .merge(Serialized::defaults(&cli))
            .extract()?;

        config.generate_config = cli.generate_config;
        Ok(config)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Fleetwatch Server Configuration
# Place this file at ./fleetwatch.toml or specify with --config <path>
# All settings can be overridden via environment variables (FLEETWATCH_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3001)
# port = 3001

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and the generated JWT key
# data_dir = "./data"

# HS256 secret shared with the identity provider.
# When unset, a random key is generated in data_dir/jwt_secret.
# jwt_secret = ""

# Origins allowed by CORS (empty = any origin)
# cors_origins = ["https://dashboard.example.com", "http://localhost:5173"]

# ---- WebSocket liveness ----
# [ws]
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults_and_cli_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetwatch.toml");
        std::fs::write(
            &path,
            "port = 4000\ndata_dir = \"/var/lib/fleetwatch\"\n[ws]\nping_interval_secs = 5\n",
        )
        .unwrap();

        let cli = Cli {
            config: Some(path.to_str().unwrap().to_string()),
            port: Some(5000),
            ..Cli::default()
        };
        let config = Config::load_from(cli).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.data_dir, "/var/lib/fleetwatch");
        assert_eq!(config.ws.ping_interval_secs, 5);
        assert_eq!(config.ws.pong_timeout_secs, 10);
        assert_eq!(config.bind_address, "0.0.0.0");
    }

    #[test]
    fn template_is_valid_toml_with_defaults() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(&generate_config_template()))
            .extract()
            .unwrap();
        assert_eq!(config.port, 3001);
        assert!(config.cors_origins.is_empty());
    }
}
