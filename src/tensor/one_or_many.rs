//! Single-value-or-list container shared by every stage

use serde::{Deserialize, Serialize};

use crate::error::{Phase, Result, TaskError};

/// Either a single value or an ordered list of values.
///
/// Field names, transforms, input tensors and model outputs all use this
/// shape; [`OneOrMany::pair_with`] is the single place where two of them are
/// checked against each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    /// Number of values (1 for `One`)
    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    /// Short shape description for error messages
    pub fn describe(&self) -> String {
        match self {
            OneOrMany::One(_) => "single".to_string(),
            OneOrMany::Many(values) => format!("list of {}", values.len()),
        }
    }

    pub fn as_ref(&self) -> OneOrMany<&T> {
        match self {
            OneOrMany::One(value) => OneOrMany::One(value),
            OneOrMany::Many(values) => OneOrMany::Many(values.iter().collect()),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> OneOrMany<U> {
        match self {
            OneOrMany::One(value) => OneOrMany::One(f(value)),
            OneOrMany::Many(values) => OneOrMany::Many(values.into_iter().map(f).collect()),
        }
    }

    /// Fallible map; `f` also receives the list index (0 for `One`)
    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(usize, T) -> std::result::Result<U, E>,
    ) -> std::result::Result<OneOrMany<U>, E> {
        match self {
            OneOrMany::One(value) => Ok(OneOrMany::One(f(0, value)?)),
            OneOrMany::Many(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, value)| f(i, value))
                .collect::<std::result::Result<Vec<_>, E>>()
                .map(OneOrMany::Many),
        }
    }

    /// True if both sides are `One`, or both are `Many` of equal length
    pub fn matches<U>(&self, other: &OneOrMany<U>) -> bool {
        match (self, other) {
            (OneOrMany::One(_), OneOrMany::One(_)) => true,
            (OneOrMany::Many(a), OneOrMany::Many(b)) => a.len() == b.len(),
            _ => false,
        }
    }

    /// Zip with `other` element-wise, failing with a cardinality error
    /// (attributed to `phase`) unless both sides have the same shape.
    pub fn pair_with<'a, U>(
        self,
        other: &'a OneOrMany<U>,
        phase: Phase,
    ) -> Result<OneOrMany<(T, &'a U)>> {
        match (self, other) {
            (OneOrMany::One(value), OneOrMany::One(paired)) => Ok(OneOrMany::One((value, paired))),
            (OneOrMany::Many(values), OneOrMany::Many(paired)) if values.len() == paired.len() => {
                Ok(OneOrMany::Many(values.into_iter().zip(paired.iter()).collect()))
            }
            (left, right) => Err(TaskError::Cardinality {
                phase,
                left: left.describe(),
                right: right.describe(),
            }),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

impl From<&str> for OneOrMany<String> {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<&str>> for OneOrMany<String> {
    fn from(values: Vec<&str>) -> Self {
        OneOrMany::Many(values.into_iter().map(str::to_string).collect())
    }
}
