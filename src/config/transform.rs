//! Built-in transforms selectable from config

use serde::{Deserialize, Serialize};

use crate::tensor::{OneOrMany, Transform};

/// Transform as written in a task config, e.g. `{type: scale, factor: 0.5}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    Identity,
    Scale { factor: f64 },
    Affine { mul: f64, add: f64 },
    Clamp { min: f64, max: f64 },
}

impl TransformConfig {
    pub fn to_transform(&self) -> Transform {
        match *self {
            TransformConfig::Identity => Transform::identity(),
            TransformConfig::Scale { factor } => Transform::scale(factor),
            TransformConfig::Affine { mul, add } => Transform::affine(mul, add),
            TransformConfig::Clamp { min, max } => Transform::clamp(min, max),
        }
    }
}

/// Convert a single-or-list transform config
pub fn build_transforms(config: &OneOrMany<TransformConfig>) -> OneOrMany<Transform> {
    config.as_ref().map(TransformConfig::to_transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_list_configs() {
        let one: OneOrMany<TransformConfig> =
            serde_yaml::from_str("{type: scale, factor: 0.5}").unwrap();
        assert_eq!(one, OneOrMany::One(TransformConfig::Scale { factor: 0.5 }));

        let many: OneOrMany<TransformConfig> =
            serde_yaml::from_str("[{type: identity}, {type: clamp, min: 0.0, max: 1.0}]").unwrap();
        let built = build_transforms(&many);
        assert!(built.is_many());
        assert_eq!(built.as_slice()[1].name(), "clamp(0, 1)");
    }
}
