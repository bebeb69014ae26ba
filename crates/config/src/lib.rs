//! 统一配置中心
//!
//! 加载顺序：内置默认值 -> `APP_CONFIG_FILE` 指向的文件（toml/yaml/json）
//! -> `APP_` 前缀的环境变量（`__` 表示嵌套，例如 `APP_SERVER__PORT`）。

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("{field}: {message}")]
    Semantic { field: &'static str, message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// 未配置时使用内存仓储
    #[serde(default)]
    #[validate(url)]
    pub url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

/// 实时连接相关配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RealtimeConfig {
    /// 单条连接出站队列积压超过该值时记录告警
    #[validate(range(min = 1))]
    pub outbound_buffer_warn: usize,
    /// 积压达到该值时断开连接
    #[validate(range(min = 1))]
    pub outbound_buffer_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub realtime: RealtimeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
                cors_origins: vec!["*".into()],
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
            },
            realtime: RealtimeConfig {
                outbound_buffer_warn: 1024,
                outbound_buffer_limit: 8192,
            },
        }
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的顺序合并
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::figment())
    }

    pub fn load_from(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = figment.extract()?;
        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(url) = &self.database.url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(ConfigError::Semantic {
                    field: "database.url",
                    message: "only postgres:// URLs are supported".into(),
                });
            }
        }
        if self.realtime.outbound_buffer_limit < self.realtime.outbound_buffer_warn {
            return Err(ConfigError::Semantic {
                field: "realtime.outbound_buffer_limit",
                message: "must not be lower than outbound_buffer_warn".into(),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 脱敏后的配置文本，用于日志
    pub fn sanitize(&self) -> String {
        let mut text = format!("{:?}", self);
        if let Some(start) = text.find("postgres") {
            let end = text[start..]
                .find('"')
                .map(|i| start + i)
                .unwrap_or(text.len());
            text.replace_range(start..end, "postgres://[REDACTED]");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_use_in_memory_storage() {
        Jail::expect_with(|_jail| {
            let cfg = AppConfig::load().expect("defaults load");
            assert_eq!(cfg.server.port, 8080);
            assert!(cfg.database.url.is_none());
            assert_eq!(cfg.bind_address(), "127.0.0.1:8080");
            Ok(())
        });
    }

    #[test]
    fn file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "app.toml",
                r#"
                [server]
                host = "0.0.0.0"
                port = 9000

                [realtime]
                outbound_buffer_warn = 64
                "#,
            )?;
            jail.set_env("APP_CONFIG_FILE", "app.toml");
            jail.set_env("APP_SERVER__PORT", "9100");
            jail.set_env("APP_DATABASE__URL", "postgres://u:p@localhost:5432/chat");

            let cfg = AppConfig::load().expect("layered load");
            assert_eq!(cfg.server.host, "0.0.0.0");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.realtime.outbound_buffer_warn, 64);
            assert_eq!(
                cfg.database.url.as_deref(),
                Some("postgres://u:p@localhost:5432/chat")
            );
            Ok(())
        });
    }

    #[test]
    fn yaml_file_is_supported() {
        Jail::expect_with(|jail| {
            jail.create_file("app.yaml", "server:\n  port: 7000\n")?;
            jail.set_env("APP_CONFIG_FILE", "app.yaml");
            let cfg = AppConfig::load().expect("yaml load");
            assert_eq!(cfg.server.port, 7000);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_SERVER__PORT", "0");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid(_))));
            Ok(())
        });

        Jail::expect_with(|jail| {
            jail.set_env("APP_DATABASE__URL", "mysql://localhost/chat");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Semantic { .. })));
            Ok(())
        });
    }

    #[test]
    fn yaml_flow_sequences_load() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "app.yml",
                "server:\n  cors_origins: [\"*\", \"http://localhost:3000\"]\nrealtime:\n  outbound_buffer_warn: 8\n  outbound_buffer_limit: 16\n",
            )?;
            jail.set_env("APP_CONFIG_FILE", "app.yml");
            let cfg = AppConfig::load().expect("yaml with flow sequence");
            assert_eq!(cfg.server.cors_origins, ["*", "http://localhost:3000"]);
            assert_eq!(cfg.realtime.outbound_buffer_limit, 16);
            Ok(())
        });
    }

    #[test]
    fn buffer_limit_below_warning_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_REALTIME__OUTBOUND_BUFFER_WARN", "100");
            jail.set_env("APP_REALTIME__OUTBOUND_BUFFER_LIMIT", "10");
            assert!(matches!(
                AppConfig::load(),
                Err(ConfigError::Semantic { field: "realtime.outbound_buffer_limit", .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn sanitize_hides_database_credentials() {
        let mut cfg = AppConfig::default();
        cfg.database.url = Some("postgres://user:secret@db/chat".into());
        let text = cfg.sanitize();
        assert!(!text.contains("secret"));
        assert!(text.contains("[REDACTED]"));
    }
}
