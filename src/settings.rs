use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub identity: Identity,
    pub store: Store,
    pub pdp: Pdp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

/// The identity resolver endpoint (credential -> principal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub endpoint: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// The document store endpoint (collections of JSON documents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// The policy decision point endpoint (allow/deny checks, resource sync).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pdp {
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    3000
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8091".to_string(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8092".to_string(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for Pdp {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8093".to_string(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default("identity.endpoint", Identity::default().endpoint)
            .into_diagnostic()?
            .set_default("identity.timeout_ms", Identity::default().timeout_ms)
            .into_diagnostic()?
            .set_default("store.endpoint", Store::default().endpoint)
            .into_diagnostic()?
            .set_default("store.timeout_ms", Store::default().timeout_ms)
            .into_diagnostic()?
            .set_default("pdp.endpoint", Pdp::default().endpoint)
            .into_diagnostic()?
            .set_default("pdp.timeout_ms", Pdp::default().timeout_ms)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: COURSEGATE__SERVER__PORT=9090, etc.
        builder =
            builder.add_source(config::Environment::with_prefix("COURSEGATE").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let s: Settings = cfg.try_deserialize().into_diagnostic()?;
        Ok(s)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Settings::load reads process env; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_settings_load_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nonexistent.toml");

        let settings =
            Settings::load(config_path.to_str().unwrap()).expect("Failed to load settings");

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.identity.endpoint, "http://127.0.0.1:8091");
        assert_eq!(settings.store.endpoint, "http://127.0.0.1:8092");
        assert_eq!(settings.pdp.endpoint, "http://127.0.0.1:8093");
        assert_eq!(settings.pdp.timeout_ms, 3000);
    }

    #[test]
    fn test_settings_load_from_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 9090

[identity]
endpoint = "http://identity.internal:7000"

[store]
endpoint = "http://docstore.internal:7001"
timeout_ms = 500

[pdp]
endpoint = "http://pdp.internal:7002"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings =
            Settings::load(config_path.to_str().unwrap()).expect("Failed to load settings");

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.identity.endpoint, "http://identity.internal:7000");
        assert_eq!(settings.store.endpoint, "http://docstore.internal:7001");
        assert_eq!(settings.store.timeout_ms, 500);
        assert_eq!(settings.pdp.endpoint, "http://pdp.internal:7002");
        // Sections without an explicit timeout keep the default
        assert_eq!(settings.pdp.timeout_ms, 3000);
    }

    #[test]
    fn test_settings_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[server]
host = "127.0.0.1"
port = 8080
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        env::set_var("COURSEGATE__SERVER__PORT", "9999");
        env::set_var("COURSEGATE__PDP__ENDPOINT", "http://pdp.override:9000");

        let settings =
            Settings::load(config_path.to_str().unwrap()).expect("Failed to load settings");

        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.pdp.endpoint, "http://pdp.override:9000");

        env::remove_var("COURSEGATE__SERVER__PORT");
        env::remove_var("COURSEGATE__PDP__ENDPOINT");
    }

    #[test]
    fn test_listen_addr() {
        let mut settings = Settings::default();
        settings.server.host = "localhost".to_string();
        settings.server.port = 3000;
        assert_eq!(settings.listen_addr(), "localhost:3000");
    }
}
