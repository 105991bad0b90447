//! Record store interface
//!
//! A record is a set of named tensor fields. Tasks read their inputs from it
//! and write their outputs back into it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use candle_core::{Device, Tensor};

use crate::error::{Result, TaskError};

/// Named slots holding host-resident tensors
pub trait Record {
    fn get(&self, field: &str) -> Option<Tensor>;

    fn set(&mut self, field: &str, value: Tensor);

    fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }
}

/// In-memory record
#[derive(Debug, Clone, Default)]
pub struct MemoryRecord {
    fields: BTreeMap<String, Tensor>,
}

impl MemoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: impl Into<String>, value: Tensor) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read every tensor of a safetensors file into host memory
    pub fn load_safetensors<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fields = candle_core::safetensors::load(path, &Device::Cpu).map_err(|source| {
            TaskError::Storage {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!("Loaded {} fields from {}", fields.len(), path.display());
        Ok(Self {
            fields: fields.into_iter().collect(),
        })
    }

    /// Write every field to a safetensors file
    pub fn save_safetensors<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let fields: HashMap<&str, Tensor> = self
            .fields
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor.clone()))
            .collect();
        candle_core::safetensors::save(&fields, path).map_err(|source| TaskError::Storage {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Record for MemoryRecord {
    fn get(&self, field: &str) -> Option<Tensor> {
        self.fields.get(field).cloned()
    }

    fn set(&mut self, field: &str, value: Tensor) {
        self.fields.insert(field.to_string(), value);
    }
}

impl Record for HashMap<String, Tensor> {
    fn get(&self, field: &str) -> Option<Tensor> {
        HashMap::get(self, field).cloned()
    }

    fn set(&mut self, field: &str, value: Tensor) {
        self.insert(field.to_string(), value);
    }
}
