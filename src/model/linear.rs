//! Dense affine layer

use std::collections::BTreeMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};

use super::{unknown_function, Arg, DeviceModel, FunctionSelector, Model};
use crate::tensor::OneOrMany;

/// `y = x W^T + b`, applied to every input in a list.
///
/// Keyword arguments:
/// - `scale` (number): multiplies the output
/// - `offset` (tensor): broadcast-added to the output
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// `weight` is `[out_features, in_features]`, `bias` is `[out_features]`
    pub fn new(weight: Tensor, bias: Option<Tensor>) -> candle_core::Result<Self> {
        let (out_features, _) = weight.dims2()?;
        if let Some(bias) = &bias {
            let len = bias.dims1()?;
            if len != out_features {
                candle_core::bail!(
                    "bias has {} entries, weight has {} output features",
                    len,
                    out_features
                );
            }
        }
        Ok(Self {
            weight: weight.to_device(&Device::Cpu)?,
            bias: bias.map(|b| b.to_device(&Device::Cpu)).transpose()?,
        })
    }

    /// Load `weight` (and optional `bias`) from a safetensors file
    pub fn load<P: AsRef<Path>>(path: P) -> candle_core::Result<Self> {
        let mut tensors = candle_core::safetensors::load(path.as_ref(), &Device::Cpu)?;
        let weight = tensors.remove("weight").ok_or_else(|| {
            candle_core::Error::Msg(format!(
                "{}: missing 'weight' tensor",
                path.as_ref().display()
            ))
        })?;
        let bias = tensors.remove("bias");
        Self::new(weight.to_dtype(DType::F32)?, bias.map(|b| b.to_dtype(DType::F32)).transpose()?)
    }

    pub fn in_features(&self) -> usize {
        self.weight.dims()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.dims()[0]
    }
}

impl Model for Linear {
    fn name(&self) -> &str {
        "linear"
    }

    fn to_device(&self, device: &Device) -> candle_core::Result<Box<dyn DeviceModel>> {
        Ok(Box::new(DeviceLinear {
            device: device.clone(),
            weight_t: self.weight.to_device(device)?.t()?.contiguous()?,
            bias: self.bias.as_ref().map(|b| b.to_device(device)).transpose()?,
        }))
    }
}

struct DeviceLinear {
    device: Device,
    weight_t: Tensor,
    bias: Option<Tensor>,
}

impl DeviceLinear {
    fn forward(&self, x: &Tensor, kwargs: &BTreeMap<String, Arg>) -> candle_core::Result<Tensor> {
        let x = x.to_dtype(self.weight_t.dtype())?;
        let mut y = x.broadcast_matmul(&self.weight_t)?;
        if let Some(bias) = &self.bias {
            y = y.broadcast_add(bias)?;
        }
        if let Some(scale) = kwargs.get("scale").and_then(Arg::as_f64) {
            y = y.affine(scale, 0.0)?;
        }
        if let Some(offset) = kwargs.get("offset").and_then(Arg::as_tensor) {
            y = y.broadcast_add(&offset.to_dtype(y.dtype())?)?;
        }
        Ok(y)
    }
}

impl DeviceModel for DeviceLinear {
    fn device(&self) -> &Device {
        &self.device
    }

    fn call(
        &self,
        function: &FunctionSelector,
        input: OneOrMany<Tensor>,
        _args: &[Arg],
        kwargs: &BTreeMap<String, Arg>,
    ) -> candle_core::Result<OneOrMany<Tensor>> {
        match function {
            FunctionSelector::Call => {}
            FunctionSelector::Named(name) if name == "forward" => {}
            _ => return Err(unknown_function("linear", function)),
        }
        input.try_map(|_, x| self.forward(&x, kwargs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Linear {
        let weight = Tensor::new(&[[1f32, 0.0], [1.0, 1.0], [0.0, 2.0]], &Device::Cpu).unwrap();
        let bias = Tensor::new(&[0f32, 0.5, -1.0], &Device::Cpu).unwrap();
        Linear::new(weight, Some(bias)).unwrap()
    }

    #[test]
    fn test_linear_forward() {
        let model = layer().to_device(&Device::Cpu).unwrap();
        let x = Tensor::new(&[[1f32, 2.0], [0.0, 1.0]], &Device::Cpu).unwrap();
        let out = model
            .call(&FunctionSelector::Call, OneOrMany::One(x), &[], &BTreeMap::new())
            .unwrap()
            .into_vec();
        assert_eq!(
            out[0].to_vec2::<f32>().unwrap(),
            vec![vec![1.0, 3.5, 3.0], vec![0.0, 1.5, 1.0]]
        );
    }

    #[test]
    fn test_linear_kwargs() {
        let model = layer().to_device(&Device::Cpu).unwrap();
        let x = Tensor::new(&[[1f32, 2.0]], &Device::Cpu).unwrap();
        let mut kwargs = BTreeMap::new();
        kwargs.insert("scale".to_string(), Arg::Float(2.0));
        kwargs.insert(
            "offset".to_string(),
            Arg::Tensor(Tensor::new(&[1f32, 1.0, 1.0], &Device::Cpu).unwrap()),
        );
        let out = model
            .call(&FunctionSelector::named("forward"), OneOrMany::One(x), &[], &kwargs)
            .unwrap()
            .into_vec();
        assert_eq!(out[0].to_vec2::<f32>().unwrap(), vec![vec![3.0, 8.0, 7.0]]);
    }

    #[test]
    fn test_bias_shape_checked() {
        let weight = Tensor::zeros((3, 2), DType::F32, &Device::Cpu).unwrap();
        let bias = Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap();
        assert!(Linear::new(weight, Some(bias)).is_err());
    }

    #[test]
    fn test_load_from_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linear.safetensors");
        let mut tensors = std::collections::HashMap::new();
        tensors.insert(
            "weight".to_string(),
            Tensor::ones((4, 3), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let model = Linear::load(&path).unwrap();
        assert_eq!(model.in_features(), 3);
        assert_eq!(model.out_features(), 4);
    }
}
