//! Model abstraction
//!
//! A [`Model`] is the host-resident home copy owned by a task. Each execution
//! asks it for a short-lived [`DeviceModel`] on the borrowed device; the home
//! copy itself is only ever read.

mod arg;
mod identity;
mod linear;

pub use arg::{Arg, ArgValue};
pub use identity::Identity;
pub use linear::Linear;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use candle_core::{Device, Tensor};

use crate::tensor::OneOrMany;

/// Which model function an execution invokes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FunctionSelector {
    /// The model's standard invocation
    #[default]
    Call,
    /// A named function exposed by the model
    Named(String),
}

impl FunctionSelector {
    pub fn named(name: impl Into<String>) -> Self {
        FunctionSelector::Named(name.into())
    }

    pub fn from_option(name: Option<&str>) -> Self {
        name.map(Self::named).unwrap_or_default()
    }
}

impl fmt::Display for FunctionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionSelector::Call => f.write_str("<call>"),
            FunctionSelector::Named(name) => f.write_str(name),
        }
    }
}

/// Host-resident model weights
pub trait Model: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Copy the model onto `device`.
    ///
    /// The returned handle is owned by one execution and dropped when it ends.
    fn to_device(&self, device: &Device) -> candle_core::Result<Box<dyn DeviceModel>>;
}

/// A model copy resident on one device
pub trait DeviceModel: Send {
    /// Device holding this copy's weights
    fn device(&self) -> &Device;

    /// Run `function` on `input`.
    ///
    /// `input`, and tensors among `args`/`kwargs`, are already on
    /// [`DeviceModel::device`]. The output shape (single or list) is the
    /// model's own choice.
    fn call(
        &self,
        function: &FunctionSelector,
        input: OneOrMany<Tensor>,
        args: &[Arg],
        kwargs: &BTreeMap<String, Arg>,
    ) -> candle_core::Result<OneOrMany<Tensor>>;
}

/// Shared handle to a task's model
pub type ModelHandle = Arc<dyn Model>;

/// Error for functions a model does not expose
pub(crate) fn unknown_function(model: &str, function: &FunctionSelector) -> candle_core::Error {
    candle_core::Error::Msg(format!("model '{}' has no function '{}'", model, function))
}
