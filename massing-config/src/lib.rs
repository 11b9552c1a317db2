use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use massing_core::units::UnitSystem;
use serde::Deserialize;
use thiserror::Error;

/// 配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "MASSING_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    /// 检查数值之间的约束，返回第一个不满足的原因。
    pub fn validate(&self) -> Result<(), String> {
        let context = &self.context;
        if self.session.history_limit == 0 {
            return Err("session.history_limit 必须大于 0".to_string());
        }
        let positive = [
            ("context.default_radius_m", context.default_radius_m),
            ("context.default_level_height_m", context.default_level_height_m),
            ("context.min_height_m", context.min_height_m),
            ("context.fallback_height_m", context.fallback_height_m),
        ];
        if let Some((name, value)) = positive
            .iter()
            .find(|(_, value)| !(value.is_finite() && *value > 0.0))
        {
            return Err(format!("{name} 必须为正数，当前为 {value}"));
        }
        if !(context.max_height_m.is_finite() && context.max_height_m >= context.min_height_m) {
            return Err(format!(
                "context.max_height_m ({}) 不能小于 context.min_height_m ({})",
                context.max_height_m, context.min_height_m
            ));
        }
        if !(context.min_area_m2.is_finite() && context.min_area_m2 >= 0.0) {
            return Err("context.min_area_m2 不能为负数".to_string());
        }
        Ok(())
    }

    /// 自动发现配置文件：优先读取环境变量 `MASSING_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 会话相关设置：历史深度与默认单位制。
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub default_units: UnitSystem,
}

impl SessionConfig {
    fn default_history_limit() -> usize {
        50
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: Self::default_history_limit(),
            default_units: UnitSystem::default(),
        }
    }
}

/// 周边建筑查询与准备流程的参数。
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "ContextConfig::default_radius_m")]
    pub default_radius_m: f64,
    #[serde(default = "ContextConfig::default_max_buildings")]
    pub max_buildings: usize,
    #[serde(default = "ContextConfig::default_level_height_m")]
    pub default_level_height_m: f64,
    #[serde(default = "ContextConfig::default_min_height_m")]
    pub min_height_m: f64,
    #[serde(default = "ContextConfig::default_max_height_m")]
    pub max_height_m: f64,
    #[serde(default = "ContextConfig::default_fallback_height_m")]
    pub fallback_height_m: f64,
    #[serde(default = "ContextConfig::default_min_area_m2")]
    pub min_area_m2: f64,
}

impl ContextConfig {
    fn default_radius_m() -> f64 {
        100.0
    }

    fn default_max_buildings() -> usize {
        400
    }

    fn default_level_height_m() -> f64 {
        3.2
    }

    fn default_min_height_m() -> f64 {
        6.0
    }

    fn default_max_height_m() -> f64 {
        80.0
    }

    fn default_fallback_height_m() -> f64 {
        12.0
    }

    fn default_min_area_m2() -> f64 {
        0.01
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_radius_m: Self::default_radius_m(),
            max_buildings: Self::default_max_buildings(),
            default_level_height_m: Self::default_level_height_m(),
            min_height_m: Self::default_min_height_m(),
            max_height_m: Self::default_max_height_m(),
            fallback_height_m: Self::default_fallback_height_m(),
            min_area_m2: Self::default_min_area_m2(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置文件 {path:?} 无效: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_every_section() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.session.history_limit, 50);
        assert_eq!(cfg.session.default_units, UnitSystem::Metric);
        assert_eq!(cfg.context.default_radius_m, 100.0);
        assert_eq!(cfg.context.max_buildings, 400);
        assert_eq!(cfg.context.default_level_height_m, 3.2);
        assert_eq!(cfg.context.min_height_m, 6.0);
        assert_eq!(cfg.context.max_height_m, 80.0);
        assert_eq!(cfg.context.fallback_height_m, 12.0);
        assert_eq!(cfg.context.min_area_m2, 0.01);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [session]
            history_limit = 20
            default_units = "imperial"

            [context]
            default_radius_m = 250.0
            max_buildings = 150
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.session.history_limit, 20);
        assert_eq!(cfg.session.default_units, UnitSystem::Imperial);
        assert_eq!(cfg.context.default_radius_m, 250.0);
        assert_eq!(cfg.context.max_buildings, 150);
        assert_eq!(cfg.context.max_height_m, 80.0);
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[session]\nhistory_limit = \"many\"").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn inconsistent_heights_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[context]\nmin_height_m = 30.0\nmax_height_m = 10.0").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let mut cfg = AppConfig::default();
        cfg.session.history_limit = 0;
        assert!(cfg.validate().is_err());
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
