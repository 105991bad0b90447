//! Pass-through model

use std::collections::BTreeMap;
use std::time::Duration;

use candle_core::{Device, Tensor};

use super::{unknown_function, Arg, DeviceModel, FunctionSelector, Model};
use crate::tensor::OneOrMany;

/// Returns its input unchanged.
///
/// Functions:
/// - call / `forward`: the input, same shape
/// - `first`: the first input only (always single)
/// - `pair`: every input twice, as a list
///
/// An optional latency is slept on every call to simulate device work.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    latency: Option<Duration>,
}

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

impl Model for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn to_device(&self, device: &Device) -> candle_core::Result<Box<dyn DeviceModel>> {
        Ok(Box::new(DeviceIdentity {
            device: device.clone(),
            latency: self.latency,
        }))
    }
}

struct DeviceIdentity {
    device: Device,
    latency: Option<Duration>,
}

impl DeviceModel for DeviceIdentity {
    fn device(&self) -> &Device {
        &self.device
    }

    fn call(
        &self,
        function: &FunctionSelector,
        input: OneOrMany<Tensor>,
        _args: &[Arg],
        _kwargs: &BTreeMap<String, Arg>,
    ) -> candle_core::Result<OneOrMany<Tensor>> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        match function {
            FunctionSelector::Call => Ok(input),
            FunctionSelector::Named(name) => match name.as_str() {
                "forward" => Ok(input),
                "first" => input
                    .into_vec()
                    .into_iter()
                    .next()
                    .map(OneOrMany::One)
                    .ok_or_else(|| candle_core::Error::Msg("empty input list".to_string())),
                "pair" => Ok(OneOrMany::Many(
                    input
                        .into_vec()
                        .into_iter()
                        .flat_map(|t| [t.clone(), t])
                        .collect(),
                )),
                _ => Err(unknown_function("identity", function)),
            },
        }
    }
}
