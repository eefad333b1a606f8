//! Transition element schema and sampled batch columns

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Scalar type of one transition element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementDtype {
    /// Unsigned byte (typically observations)
    U8,
    /// Signed 32-bit integer (typically actions)
    I32,
    /// 32-bit float (rewards, returns, annotations)
    F32,
}

/// Declared name, per-transition shape and dtype of one batch element.
///
/// The shape excludes the leading batch dimension; an empty shape means a
/// scalar per transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Element name, e.g. `observation` or `reward`
    pub name: String,
    /// Per-transition shape, without the batch dimension
    pub shape: Vec<usize>,
    /// Scalar type
    pub dtype: ElementDtype,
}

impl ElementSpec {
    /// Create a new element spec
    pub fn new(name: impl Into<String>, shape: Vec<usize>, dtype: ElementDtype) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
        }
    }
}

/// One batch column with its concrete array payload
#[derive(Debug, Clone, PartialEq)]
pub enum ElementData {
    /// Unsigned byte column
    U8(ArrayD<u8>),
    /// Signed 32-bit integer column
    I32(ArrayD<i32>),
    /// 32-bit float column
    F32(ArrayD<f32>),
}

impl ElementData {
    /// Scalar type of this column
    #[must_use]
    pub fn dtype(&self) -> ElementDtype {
        match self {
            Self::U8(_) => ElementDtype::U8,
            Self::I32(_) => ElementDtype::I32,
            Self::F32(_) => ElementDtype::F32,
        }
    }

    /// Length of the leading batch dimension, zero for an empty column
    #[must_use]
    pub fn batch_len(&self) -> usize {
        let shape = match self {
            Self::U8(a) => a.shape(),
            Self::I32(a) => a.shape(),
            Self::F32(a) => a.shape(),
        };
        shape.first().copied().unwrap_or(0)
    }
}

/// A sampled batch of transitions: named columns sharing a leading batch
/// dimension, in the order the shard declared them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionBatch {
    columns: Vec<(String, ElementData)>,
}

impl TransitionBatch {
    /// Create an empty batch
    #[must_use]
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Append a named column
    pub fn push(&mut self, name: impl Into<String>, data: ElementData) {
        self.columns.push((name.into(), data));
    }

    /// Look up a column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ElementData> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data)
    }

    /// Column names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Number of columns
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Batch size, taken from the first column
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns
            .first()
            .map_or(0, |(_, data)| data.batch_len())
    }

    /// Whether the batch holds no transitions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn f32_column(values: Vec<f32>) -> ElementData {
        let len = values.len();
        ElementData::F32(ArrayD::from_shape_vec(IxDyn(&[len]), values).unwrap())
    }

    #[test]
    fn batch_reports_len_from_first_column() {
        let mut batch = TransitionBatch::new();
        batch.push("reward", f32_column(vec![1.0, 2.0, 3.0]));
        batch.push("terminal", f32_column(vec![0.0, 0.0, 1.0]));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.num_columns(), 2);
        assert!(!batch.is_empty());
    }

    #[test]
    fn batch_column_lookup_by_name() {
        let mut batch = TransitionBatch::new();
        batch.push("reward", f32_column(vec![0.5]));
        assert!(batch.column("reward").is_some());
        assert!(batch.column("action").is_none());
        assert_eq!(batch.column("reward").unwrap().dtype(), ElementDtype::F32);
    }

    #[test]
    fn empty_batch_is_empty() {
        let batch = TransitionBatch::new();
        assert_eq!(batch.len(), 0);
        assert!(batch.is_empty());
        assert_eq!(batch.names().count(), 0);
    }

    #[test]
    fn element_data_batch_len_uses_leading_dim() {
        let data = ElementData::U8(ArrayD::zeros(IxDyn(&[4, 84, 84])));
        assert_eq!(data.batch_len(), 4);
        assert_eq!(data.dtype(), ElementDtype::U8);
    }
}
