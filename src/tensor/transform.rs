//! Caller-supplied array transforms

use std::fmt;
use std::sync::Arc;

use candle_core::Tensor;

type TransformFn = dyn Fn(&Tensor) -> candle_core::Result<Tensor> + Send + Sync;

/// Pure array-in/array-out function applied before the element-type cast on
/// the way in, or after the copy back to host on the way out.
#[derive(Clone)]
pub struct Transform {
    name: Arc<str>,
    f: Arc<TransformFn>,
}

impl Transform {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Tensor) -> candle_core::Result<Tensor> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            f: Arc::new(f),
        }
    }

    pub fn identity() -> Self {
        Self::new("identity", |t| Ok(t.clone()))
    }

    /// `x * factor`
    pub fn scale(factor: f64) -> Self {
        Self::new(format!("scale({})", factor), move |t| t.affine(factor, 0.0))
    }

    /// `x * mul + add`
    pub fn affine(mul: f64, add: f64) -> Self {
        Self::new(format!("affine({}, {})", mul, add), move |t| {
            t.affine(mul, add)
        })
    }

    /// Clamp every element into `[min, max]`
    pub fn clamp(min: f64, max: f64) -> Self {
        Self::new(format!("clamp({}, {})", min, max), move |t| {
            let bound = |v: f64| {
                Tensor::new(v, t.device())?
                    .to_dtype(t.dtype())?
                    .broadcast_as(t.dims())
            };
            t.maximum(&bound(min)?)?.minimum(&bound(max)?)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply to the whole array at once
    pub fn apply(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        (self.f)(tensor)
    }

    /// Apply to each sample along axis 0 and stack the results back.
    ///
    /// An input with no samples gives an empty output whose trailing shape
    /// and dtype are what the transform makes of one all-zero sample.
    pub fn apply_per_sample(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        let n = tensor.dim(0)?;
        if n == 0 {
            let zero = Tensor::zeros(&tensor.dims()[1..], tensor.dtype(), tensor.device())?;
            let sample = self.apply(&zero)?;
            let mut dims = Vec::with_capacity(sample.rank() + 1);
            dims.push(0);
            dims.extend_from_slice(sample.dims());
            return Tensor::zeros(dims, sample.dtype(), sample.device());
        }
        let samples = (0..n)
            .map(|i| tensor.get(i).and_then(|sample| self.apply(&sample)))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Tensor::stack(&samples, 0)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transform").field(&self.name).finish()
    }
}
