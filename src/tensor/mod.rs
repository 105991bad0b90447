//! Tensor plumbing between the record and the model
//!
//! - `OneOrMany`: single-or-list shape used by every stage
//! - `Transform`: user supplied pre/post-processing
//! - `TensorAdapter`: forward (transform + cast) and inverse conversions

mod adapter;
mod one_or_many;
mod transform;

pub use adapter::{sample_count, TensorAdapter};
pub use one_or_many::OneOrMany;
pub use transform::Transform;
