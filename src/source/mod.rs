//! Record-producing pipelines that workers replicate.
//!
//! A [`SourcePipeline`] is stateful and is driven through passes: `produce`
//! returns records until the pass is exhausted (`None`), and the next call
//! begins a new pass. Workers call [`SourcePipeline::reset_state`] once after
//! they fork so that replicas diverge (for example by reseeding an RNG).

mod builtin;

pub use builtin::{RandomSource, RangeSource};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Expected number of records per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Count {
    Known(usize),
    Unknown,
}

impl Count {
    /// The number of records an epoch stops after, if any.
    ///
    /// A known count of zero does not limit the stream.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Count::Known(n) if *n > 0 => Some(*n),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Count::Known(_))
    }
}

impl From<Option<usize>> for Count {
    fn from(size: Option<usize>) -> Self {
        size.map_or(Count::Unknown, Count::Known)
    }
}

impl std::fmt::Display for Count {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Count::Known(n) => write!(f, "{}", n),
            Count::Unknown => write!(f, "unknown"),
        }
    }
}

pub trait SourcePipeline {
    type Record: Serialize + DeserializeOwned;

    /// Reset internal and random state. Called once per worker, after fork.
    fn reset_state(&mut self);

    /// Produce the next record of the current pass, or `None` when the pass is
    /// exhausted. Calling again after `None` starts a new pass.
    fn produce(&mut self) -> Option<Self::Record>;

    /// Records per pass, or `None` when the pipeline cannot tell.
    fn size(&self) -> Option<usize> {
        None
    }
}

impl<P: SourcePipeline + ?Sized> SourcePipeline for Box<P> {
    type Record = P::Record;

    fn reset_state(&mut self) {
        (**self).reset_state()
    }

    fn produce(&mut self) -> Option<Self::Record> {
        (**self).produce()
    }

    fn size(&self) -> Option<usize> {
        (**self).size()
    }
}
