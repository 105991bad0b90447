//! Host array to model tensor conversion

use candle_core::{DType, Tensor};

use super::{OneOrMany, Transform};
use crate::error::{Phase, Result, TaskError};

/// Converts record payloads into model inputs and model outputs back into
/// record payloads.
///
/// When `sample_wise` is set (the task runs batched) transforms are applied
/// to one sample at a time along axis 0, never to the whole array.
#[derive(Debug, Clone, Copy)]
pub struct TensorAdapter {
    dtype: DType,
    sample_wise: bool,
}

impl TensorAdapter {
    pub fn new(dtype: DType, sample_wise: bool) -> Self {
        Self { dtype, sample_wise }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Input path: transform (if any), then cast to the model element type
    pub fn forward(
        &self,
        inputs: OneOrMany<Tensor>,
        transforms: Option<&OneOrMany<Transform>>,
    ) -> Result<OneOrMany<Tensor>> {
        let transformed = self.transform(inputs, transforms, Phase::Input)?;
        transformed.try_map(|index, tensor| {
            tensor
                .to_dtype(self.dtype)
                .map_err(|source| TaskError::Transform {
                    phase: Phase::Input,
                    index,
                    source,
                })
        })
    }

    /// Output path: transform (if any); values keep the model's element type
    pub fn inverse(
        &self,
        outputs: OneOrMany<Tensor>,
        transforms: Option<&OneOrMany<Transform>>,
    ) -> Result<OneOrMany<Tensor>> {
        self.transform(outputs, transforms, Phase::Output)
    }

    fn transform(
        &self,
        tensors: OneOrMany<Tensor>,
        transforms: Option<&OneOrMany<Transform>>,
        phase: Phase,
    ) -> Result<OneOrMany<Tensor>> {
        let Some(transforms) = transforms else {
            return Ok(tensors);
        };
        tensors
            .pair_with(transforms, phase)?
            .try_map(|index, (tensor, transform)| {
                let result = if self.sample_wise {
                    transform.apply_per_sample(&tensor)
                } else {
                    transform.apply(&tensor)
                };
                result.map_err(|source| {
                    tracing::warn!("{} transform '{}' failed: {}", phase, transform.name(), source);
                    TaskError::Transform {
                        phase,
                        index,
                        source,
                    }
                })
            })
    }
}

/// Length of the sample axis shared by all tensors.
///
/// Every element of a list must agree on its leading dimension; scalars
/// have no sample axis and are rejected.
pub fn sample_count(tensors: &OneOrMany<Tensor>) -> Result<usize> {
    let mut lengths = Vec::with_capacity(tensors.len());
    for (index, tensor) in tensors.iter().enumerate() {
        match tensor.dims().first() {
            Some(n) => lengths.push(*n),
            None => {
                return Err(TaskError::Config {
                    phase: Phase::Input,
                    message: format!("input #{} is a scalar and has no sample axis", index),
                })
            }
        }
    }
    match lengths.split_first() {
        None => Err(TaskError::Config {
            phase: Phase::Input,
            message: "empty input list".to_string(),
        }),
        Some((first, rest)) if rest.iter().all(|n| n == first) => Ok(*first),
        Some(_) => Err(TaskError::Config {
            phase: Phase::Input,
            message: format!("inputs disagree on sample axis length: {:?}", lengths),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn ramp(n: usize, width: usize) -> Tensor {
        Tensor::arange(0u32, (n * width) as u32, &Device::Cpu)
            .unwrap()
            .reshape((n, width))
            .unwrap()
    }

    #[test]
    fn test_forward_without_transform_only_casts() {
        let adapter = TensorAdapter::new(DType::F32, false);
        let x = ramp(3, 2);
        let out = adapter.forward(OneOrMany::One(x.clone()), None).unwrap();
        let OneOrMany::One(out) = out else {
            panic!("expected single output");
        };
        assert_eq!(out.dtype(), DType::F32);
        assert_eq!(out.dims(), x.dims());
        let back: Vec<Vec<u32>> = out.to_dtype(DType::U32).unwrap().to_vec2().unwrap();
        assert_eq!(back, x.to_vec2::<u32>().unwrap());
    }

    #[test]
    fn test_inverse_without_transform_is_identity() {
        let adapter = TensorAdapter::new(DType::F32, true);
        let y = ramp(2, 2).to_dtype(DType::F64).unwrap();
        let out = adapter.inverse(OneOrMany::One(y.clone()), None).unwrap();
        let OneOrMany::One(out) = out else {
            panic!("expected single output");
        };
        assert_eq!(out.dtype(), DType::F64);
        assert_eq!(out.to_vec2::<f64>().unwrap(), y.to_vec2::<f64>().unwrap());
    }

    #[test]
    fn test_forward_list_applies_transforms_in_order() {
        let adapter = TensorAdapter::new(DType::F32, false);
        let inputs = OneOrMany::Many(vec![ramp(2, 1), ramp(2, 1)]);
        let transforms = OneOrMany::Many(vec![Transform::scale(2.0), Transform::affine(1.0, 10.0)]);
        let out = adapter.forward(inputs, Some(&transforms)).unwrap().into_vec();
        assert_eq!(out[0].to_vec2::<f32>().unwrap(), vec![vec![0.0], vec![2.0]]);
        assert_eq!(out[1].to_vec2::<f32>().unwrap(), vec![vec![10.0], vec![11.0]]);
    }

    #[test]
    fn test_sample_wise_transform() {
        let row_sum = Transform::new("row_sum", |t| t.sum_keepdim(0));
        let adapter = TensorAdapter::new(DType::F32, true);
        let x = ramp(3, 2).to_dtype(DType::F32).unwrap();
        let out = adapter
            .forward(OneOrMany::One(x), Some(&OneOrMany::One(row_sum)))
            .unwrap()
            .into_vec();
        assert_eq!(out[0].dims(), &[3, 1]);
        assert_eq!(
            out[0].to_vec2::<f32>().unwrap(),
            vec![vec![1.0], vec![5.0], vec![9.0]]
        );
    }

    #[test]
    fn test_cardinality_mismatch_is_configuration_error() {
        let adapter = TensorAdapter::new(DType::F32, false);
        let err = adapter
            .forward(
                OneOrMany::Many(vec![ramp(1, 1)]),
                Some(&OneOrMany::One(Transform::identity())),
            )
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.phase(), Phase::Input);

        let err = adapter
            .inverse(
                OneOrMany::One(ramp(1, 1)),
                Some(&OneOrMany::Many(vec![Transform::identity()])),
            )
            .unwrap_err();
        assert_eq!(err.phase(), Phase::Output);
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(sample_count(&OneOrMany::One(ramp(7, 3))).unwrap(), 7);
        assert_eq!(
            sample_count(&OneOrMany::Many(vec![ramp(4, 1), ramp(4, 9)])).unwrap(),
            4
        );
        let err = sample_count(&OneOrMany::Many(vec![ramp(4, 1), ramp(5, 1)])).unwrap_err();
        assert!(err.is_configuration());

        let scalar = Tensor::new(1f32, &Device::Cpu).unwrap();
        assert!(sample_count(&OneOrMany::One(scalar)).is_err());
    }
}
