//! Lookup keys
//!
//! A key is a lookup shape tag plus the ordered identifier values of the
//! lookup. The shape takes part in equality, so the same identifier used by
//! two different lookups never collides.

use std::hash::{Hash, Hasher};

/// The lookup shapes the cache understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LookupShape {
    /// Single entity by primary identifier
    Id,
    /// Single entity by reference identifier
    ReferenceId,
    /// Every entity issued to a subject
    Subject,
    /// Every entity owned by an application
    ApplicationId,
    /// Every entity attached to an authorization
    AuthorizationId,
}

impl LookupShape {
    /// All shapes, in declaration order
    pub const ALL: [LookupShape; 5] = [
        LookupShape::Id,
        LookupShape::ReferenceId,
        LookupShape::Subject,
        LookupShape::ApplicationId,
        LookupShape::AuthorizationId,
    ];

    /// Whether lookups of this shape resolve to an ordered list of entities
    #[inline]
    pub fn is_one_to_many(self) -> bool {
        matches!(
            self,
            LookupShape::Subject | LookupShape::ApplicationId | LookupShape::AuthorizationId
        )
    }

    /// Dense index for per-shape counters
    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Stable label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            LookupShape::Id => "id",
            LookupShape::ReferenceId => "reference_id",
            LookupShape::Subject => "subject",
            LookupShape::ApplicationId => "application_id",
            LookupShape::AuthorizationId => "authorization_id",
        }
    }
}

impl std::fmt::Display for LookupShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key - shape tag plus identifier values
#[derive(Clone, Debug, Eq)]
pub struct LookupKey {
    /// Pre-computed hash of shape and values (for fast comparison)
    hash: u64,
    /// Lookup shape
    shape: LookupShape,
    /// Identifier values, compared ordinally
    values: Box<[String]>,
}

impl LookupKey {
    /// Create a key from a shape and its identifier values
    pub fn new<I, S>(shape: LookupShape, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Box<[String]> = values.into_iter().map(Into::into).collect();
        let hash = Self::compute_hash(shape, &values);
        Self {
            hash,
            shape,
            values,
        }
    }

    /// Key for a single-identifier lookup
    pub fn single(shape: LookupShape, value: impl Into<String>) -> Self {
        Self::new(shape, [value.into()])
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::single(LookupShape::Id, id)
    }

    pub fn reference_id(reference_id: impl Into<String>) -> Self {
        Self::single(LookupShape::ReferenceId, reference_id)
    }

    pub fn subject(subject: impl Into<String>) -> Self {
        Self::single(LookupShape::Subject, subject)
    }

    pub fn application_id(application_id: impl Into<String>) -> Self {
        Self::single(LookupShape::ApplicationId, application_id)
    }

    pub fn authorization_id(authorization_id: impl Into<String>) -> Self {
        Self::single(LookupShape::AuthorizationId, authorization_id)
    }

    /// FxHash over the shape tag and each length-prefixed value, so
    /// `["ab", "c"]` and `["a", "bc"]` hash differently.
    fn compute_hash(shape: LookupShape, values: &[String]) -> u64 {
        const SEED: u64 = 0x517cc1b727220a95;
        let mut hash = SEED;
        let mut mix = |word: u64| {
            hash = (hash.rotate_left(5) ^ word).wrapping_mul(SEED);
        };

        mix(shape as u64);
        for value in values {
            mix(value.len() as u64);
            for &byte in value.as_bytes() {
                mix(byte as u64);
            }
        }
        hash
    }

    /// Get the lookup shape
    #[inline]
    pub fn shape(&self) -> LookupShape {
        self.shape
    }

}

impl PartialEq for LookupKey {
    fn eq(&self, other: &Self) -> bool {
        // Fast path: compare hashes first
        if self.hash != other.hash || self.shape != other.shape {
            return false;
        }
        self.values == other.values
    }
}

impl Hash for LookupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl std::fmt::Display for LookupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.shape, self.values.join(","))
    }
}
