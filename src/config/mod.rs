/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量覆盖和配置验证
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod particles;
pub mod presentation;

pub use particles::EmitterConfig;
pub use presentation::{ColorFormat, PresentationConfig, Resolution, SimulatedHeadsetConfig};

/// 同时运行的发射器上限
pub const MAX_EMITTERS: usize = 2;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 应用主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 发射器配置（最多两个：主发射器、副发射器）
    pub emitters: Vec<EmitterConfig>,

    /// 呈现配置
    pub presentation: PresentationConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            emitters: vec![EmitterConfig::primary(), EmitterConfig::secondary()],
            presentation: PresentationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Some(count) = env_parse::<u32>("LINKFIELD_PARTICLE_COUNT") {
            for emitter in &mut self.emitters {
                emitter.particle_count = count;
            }
        }
        if let Some(batch) = env_parse::<u32>("LINKFIELD_BATCH_SIZE") {
            for emitter in &mut self.emitters {
                emitter.batch_size = batch;
            }
        }
        if let Some(width) = env_parse("LINKFIELD_WINDOW_WIDTH") {
            self.presentation.window.width = width;
        }
        if let Some(height) = env_parse("LINKFIELD_WINDOW_HEIGHT") {
            self.presentation.window.height = height;
        }
        if let Ok(val) = env::var("LINKFIELD_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.emitters.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one emitter is required".to_string(),
            ));
        }
        if self.emitters.len() > MAX_EMITTERS {
            return Err(ConfigError::ValidationError(format!(
                "At most {} emitters are supported, got {}",
                MAX_EMITTERS,
                self.emitters.len()
            )));
        }
        for emitter in &self.emitters {
            emitter.validate()?;
        }
        self.presentation.validate()
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./linkfield.toml
    /// 2. ./linkfield.json
    /// 3. ~/.config/linkfield/config.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file("linkfield.toml") {
            tracing::info!(target: "engine", "Loaded config from linkfield.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("linkfield.json") {
            tracing::info!(target: "engine", "Loaded config from linkfield.json");
            return config;
        }

        if let Some(home) = env::var_os("HOME") {
            let config_path = PathBuf::from(home)
                .join(".config")
                .join("linkfield")
                .join("config.toml");

            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "engine", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::info!(target: "engine", "Using default configuration");
        Self::default()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 未设置时生效）
    pub level: LogLevel,

    /// 是否输出日志 target
    pub show_targets: bool,
}

use crate::impl_default;

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    show_targets: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// 不区分大小写地解析级别名
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}
