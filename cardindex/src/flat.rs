use std::cmp::Ordering;

use crate::error::IndexError;

/// Similarity metric of an index. Stored in the artifact header by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Dot product of unit-length vectors, i.e. cosine similarity.
    InnerProduct,
}

impl Metric {
    pub fn id(self) -> u32 {
        match self {
            Metric::InnerProduct => 1,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Metric::InnerProduct),
            _ => None,
        }
    }
}

/// Hit is a single result from a similarity search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Insertion position of the matched vector.
    pub position: usize,

    /// Inner product between the query and the matched vector.
    /// Higher values indicate higher similarity.
    pub score: f32,
}

/// Compute the inner product of two equal-length vectors.
///
/// Uses f64 intermediate precision. For unit vectors the result lies in
/// `[-1, 1]` and equals cosine similarity; no clamping is applied.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as f64 * y as f64;
    }
    dot as f32
}

/// Orders hits by descending score, then ascending insertion position.
fn rank_order(a: &Hit, b: &Hit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

/// FlatIndex stores N vectors of dimension D contiguously and answers
/// exact k-NN queries by exhaustive inner product.
///
/// Vectors are only appended while an index is being built. Once wrapped
/// in an [`IndexSnapshot`](crate::IndexSnapshot) it is never mutated again.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    metric: Metric,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Result<Self, IndexError> {
        if dim == 0 {
            return Err(IndexError::InvalidDimension(dim));
        }
        Ok(Self {
            dim,
            metric: Metric::InnerProduct,
            data: Vec::new(),
        })
    }

    pub(crate) fn from_parts(dim: usize, metric: Metric, data: Vec<f32>) -> Result<Self, IndexError> {
        if dim == 0 {
            return Err(IndexError::InvalidDimension(dim));
        }
        if data.len() % dim != 0 {
            return Err(IndexError::InvalidFormat(format!(
                "{} components is not a multiple of dimension {dim}",
                data.len()
            )));
        }
        Ok(Self { dim, metric, data })
    }

    /// Append a vector and return its position.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                got: vector.len(),
                want: self.dim,
            });
        }
        let pos = self.len();
        self.data.extend_from_slice(vector);
        Ok(pos)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Return the number of vectors in the index.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return the vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Iterate vectors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }

    pub(crate) fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Return the top-k most similar vectors to the query, ordered by
    /// descending score. Equal scores are ordered by insertion position.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Hit>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                got: query.len(),
                want: self.dim,
            });
        }
        if self.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let mut hits: Vec<Hit> = self
            .iter()
            .enumerate()
            .map(|(position, v)| Hit {
                position,
                score: inner_product(query, v),
            })
            .collect();

        if top_k < hits.len() {
            hits.select_nth_unstable_by(top_k - 1, rank_order);
            hits.truncate(top_k);
        }
        hits.sort_by(rank_order);
        Ok(hits)
    }
}
