//! Liveness tokens linking tile slots to the handles they were loaded from.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_TENSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Which kind of handle a token refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorKind {
    Matrix,
    Vector,
}

impl fmt::Display for TensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matrix => f.write_str("matrix"),
            Self::Vector => f.write_str("vector"),
        }
    }
}

/// Identity anchor owned by a tensor handle. Dropping it invalidates every
/// token taken from it.
#[derive(Debug)]
pub(crate) struct Liveness {
    id: u64,
    kind: TensorKind,
    anchor: Arc<()>,
}

impl Liveness {
    pub(crate) fn new(kind: TensorKind) -> Self {
        Self { id: NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed), kind, anchor: Arc::new(()) }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn token(&self) -> TensorToken {
        TensorToken { id: self.id, kind: self.kind, alive: Arc::downgrade(&self.anchor) }
    }
}

/// Non-owning reference to a tensor handle held by a tile context.
#[derive(Debug, Clone)]
pub struct TensorToken {
    id: u64,
    kind: TensorKind,
    alive: Weak<()>,
}

impl TensorToken {
    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TensorKind {
        self.kind
    }

    /// Whether the handle this token came from still exists.
    pub fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

impl PartialEq for TensorToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TensorToken {}

impl fmt::Display for TensorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)?;
        if !self.is_alive() {
            f.write_str(" (dropped)")?;
        }
        Ok(())
    }
}
