//! Extra arguments forwarded to model functions

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

/// Positional or keyword argument passed alongside the input.
///
/// Tensor arguments follow the model onto its device; everything else is
/// passed through unchanged.
#[derive(Debug, Clone)]
pub enum Arg {
    Tensor(Tensor),
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl Arg {
    /// Copy tensor arguments to `device`
    pub fn to_device(&self, device: &Device) -> candle_core::Result<Arg> {
        match self {
            Arg::Tensor(t) => Ok(Arg::Tensor(t.to_device(device)?)),
            other => Ok(other.clone()),
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Arg::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Numeric value, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Float(v) => Some(*v),
            Arg::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<Tensor> for Arg {
    fn from(t: Tensor) -> Self {
        Arg::Tensor(t)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Text(v.to_string())
    }
}

/// Scalar argument as written in a task config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Vector literal, becomes a 1-D f32 tensor
    Vector(Vec<f32>),
}

impl ArgValue {
    pub fn into_arg(self) -> candle_core::Result<Arg> {
        Ok(match self {
            ArgValue::Bool(v) => Arg::Bool(v),
            ArgValue::Int(v) => Arg::Int(v),
            ArgValue::Float(v) => Arg::Float(v),
            ArgValue::Text(v) => Arg::Text(v),
            ArgValue::Vector(v) => Arg::Tensor(Tensor::new(v.as_slice(), &Device::Cpu)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_tensor_args_pass_through() {
        let arg = Arg::from(3i64).to_device(&Device::Cpu).unwrap();
        assert_eq!(arg.as_f64(), Some(3.0));
        assert!(arg.as_tensor().is_none());
    }

    #[test]
    fn test_arg_values_from_yaml() {
        let values: Vec<ArgValue> = serde_yaml::from_str("[true, 2, 0.5, hello, [1.0, 2.0]]").unwrap();
        assert_eq!(values[0], ArgValue::Bool(true));
        assert_eq!(values[1], ArgValue::Int(2));
        assert_eq!(values[2], ArgValue::Float(0.5));
        assert_eq!(values[3], ArgValue::Text("hello".into()));

        let arg = values[4].clone().into_arg().unwrap();
        assert_eq!(arg.as_tensor().unwrap().dims(), &[2]);
    }
}
