use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_WEBSITE_API_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

const CONFIG_DIR_NAME: &str = "webguide";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub website_api_url: String,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| anyhow!("Invalid server address {}:{}: {err}", self.host, self.port))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    gemini_api_key: Option<String>,
    gemini_model: Option<String>,
    gemini_base_url: Option<String>,
    website_api_url: Option<String>,
    server: Option<RawServerConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServerConfig {
    host: Option<String>,
    port: Option<u16>,
}

impl AppConfig {
    /// Loads the TOML config (explicit path or XDG discovery), then lets
    /// environment variables win over file values. `.env` is read first so a
    /// local development file behaves like exported variables.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => discover_config_path()?,
        };
        let file_config = load_file_config(&config_path)?;

        dotenvy::dotenv().ok();

        let file = |get: fn(&RawFileConfig) -> Option<&String>| {
            file_config
                .as_ref()
                .and_then(get)
                .and_then(|value| non_empty(value).map(ToOwned::to_owned))
        };

        let server_file = file_config.as_ref().and_then(|cfg| cfg.server.as_ref());
        let server = ServerConfig {
            host: env_non_empty("SERVER_HOST")
                .or_else(|| {
                    server_file
                        .and_then(|s| s.host.as_ref())
                        .and_then(|value| non_empty(value).map(ToOwned::to_owned))
                })
                .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
            port: match env_non_empty("SERVER_PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| anyhow!("Invalid SERVER_PORT value '{raw}'"))?,
                None => server_file
                    .and_then(|s| s.port)
                    .unwrap_or(DEFAULT_SERVER_PORT),
            },
        };

        Ok(Self {
            gemini_api_key: env_non_empty("GEMINI_API_KEY")
                .or_else(|| file(|cfg| cfg.gemini_api_key.as_ref())),
            gemini_model: env_non_empty("GEMINI_MODEL")
                .or_else(|| file(|cfg| cfg.gemini_model.as_ref()))
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: env_non_empty("GEMINI_BASE_URL")
                .or_else(|| file(|cfg| cfg.gemini_base_url.as_ref()))
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            website_api_url: env_non_empty("WEBSITE_API_URL")
                .or_else(|| file(|cfg| cfg.website_api_url.as_ref()))
                .unwrap_or_else(|| DEFAULT_WEBSITE_API_URL.to_string()),
            server,
        })
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, DEFAULT_GEMINI_MODEL, DEFAULT_SERVER_PORT, DEFAULT_WEBSITE_API_URL};
    use serial_test::serial;
    use std::env;
    use std::fs;
    use std::path::Path;

    fn reset_vars() {
        unsafe {
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("GEMINI_MODEL");
            env::remove_var("GEMINI_BASE_URL");
            env::remove_var("WEBSITE_API_URL");
            env::remove_var("SERVER_HOST");
            env::remove_var("SERVER_PORT");
            env::remove_var("XDG_CONFIG_HOME");
        }
    }

    fn with_cwd<T>(path: &Path, f: impl FnOnce() -> T) -> T {
        let cwd = env::current_dir().expect("current dir");
        env::set_current_dir(path).expect("set current dir");
        let result = f();
        env::set_current_dir(cwd).expect("restore current dir");
        result
    }

    #[test]
    #[serial]
    fn load_uses_defaults_when_unset() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load(None).expect("load config"));
        assert_eq!(cfg.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(cfg.website_api_url, DEFAULT_WEBSITE_API_URL);
        assert_eq!(cfg.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(cfg.gemini_api_key, None);
    }

    #[test]
    #[serial]
    fn load_env_overrides_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_dir = tmp.path().join("webguide");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(
            config_dir.join("config.toml"),
            r#"
gemini_api_key = "file_key"
gemini_model = "file_model"
website_api_url = "http://file.example.com"
"#,
        )
        .expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("GEMINI_API_KEY", "os_key");
            env::set_var("GEMINI_MODEL", "os_model");
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load(None).expect("load config"));
        assert_eq!(cfg.gemini_api_key.as_deref(), Some("os_key"));
        assert_eq!(cfg.gemini_model, "os_model");
        assert_eq!(cfg.website_api_url, "http://file.example.com");
    }

    #[test]
    #[serial]
    fn load_reads_server_table() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_dir = tmp.path().join("webguide");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(
            config_dir.join("config.toml"),
            r#"
[server]
host = "0.0.0.0"
port = 9000
"#,
        )
        .expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let cfg = with_cwd(tmp.path(), || AppConfig::load(None).expect("load config"));
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 9000);
        assert!(cfg.server.bind_addr().is_ok());
    }

    #[test]
    #[serial]
    fn load_rejects_invalid_server_port_env() {
        let tmp = tempfile::tempdir().expect("tempdir");
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
            env::set_var("SERVER_PORT", "not-a-port");
        }

        let err = with_cwd(tmp.path(), || {
            AppConfig::load(None).expect_err("load should fail")
        });
        assert!(err.to_string().contains("Invalid SERVER_PORT"));
    }

    #[test]
    #[serial]
    fn load_uses_explicit_path_over_discovery() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_path = tmp.path().join("custom.toml");
        fs::write(&config_path, r#"gemini_model = "explicit_model""#).expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let cfg = with_cwd(tmp.path(), || {
            AppConfig::load(Some(&config_path)).expect("load config")
        });
        assert_eq!(cfg.gemini_model, "explicit_model");
    }

    #[test]
    #[serial]
    fn load_fails_when_xdg_config_home_is_empty() {
        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", "   ");
        }

        let err = AppConfig::load(None).expect_err("load should fail");
        assert!(
            err.to_string()
                .contains("Failed to resolve config path: XDG_CONFIG_HOME is set but empty")
        );
    }

    #[test]
    #[serial]
    fn load_fails_on_unknown_root_key() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config_dir = tmp.path().join("webguide");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(config_dir.join("config.toml"), "unknown_key = 1").expect("write config");

        reset_vars();
        unsafe {
            env::set_var("XDG_CONFIG_HOME", tmp.path());
        }

        let err = with_cwd(tmp.path(), || {
            AppConfig::load(None).expect_err("load should fail")
        });
        assert!(err.to_string().contains("Failed to load config"));
        assert!(err.to_string().contains("unknown field"));
    }
}
