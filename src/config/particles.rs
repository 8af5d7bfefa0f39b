use super::{ConfigError, ConfigResult};
use crate::render::particles::EmitterParams;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// 发射器配置
///
/// 粒子数与批量在构造时确定；`params` 可在运行时通过 `set_params` 修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// 粒子槽数量 N
    pub particle_count: u32,

    /// 每帧生成批量 K
    pub batch_size: u32,

    /// 可调参数
    #[serde(default)]
    pub params: EmitterParams,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            particle_count: 1024,
            batch_size: 8,
            params: EmitterParams::default(),
        }
    }
}

impl EmitterConfig {
    /// 主发射器默认配置
    pub fn primary() -> Self {
        Self::default()
    }

    /// 副发射器默认配置（色相错开，向下漂移）
    pub fn secondary() -> Self {
        Self {
            params: EmitterParams {
                base_hue: 0.08,
                velocity_bias: Vec3::new(0.0, -0.02, 0.0),
                ..EmitterParams::default()
            },
            ..Self::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.particle_count == 0 {
            return Err(ConfigError::ValidationError(
                "Emitter particle_count must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "Emitter batch_size must be greater than zero".to_string(),
            ));
        }
        self.params
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_differs_in_hue() {
        let primary = EmitterConfig::primary();
        let secondary = EmitterConfig::secondary();
        assert_ne!(primary.params.base_hue, secondary.params.base_hue);
        assert!(secondary.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = EmitterConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
