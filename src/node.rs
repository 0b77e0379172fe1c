//! Field cache nodes and the candidate dispatch loop.
//!
//! [`Standard`](crate::Standard) and [`Origin`](crate::Origin) both own a
//! [`FieldCache`]. Resolving a missing field walks an ordered list of
//! candidate subnodes, stopping at the first one that produces a value.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{ContentError, ContractError};
use crate::value::FieldValue;

/// Outcome of consulting one candidate for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The candidate produced a value. Never [`FieldValue::Absent`].
    Found(FieldValue),
    /// The candidate confirmed it has no value for the field.
    Absent,
    /// The candidate has nothing to say right now; try the next one.
    Unavailable(ContentError),
    /// The candidate violated its declared contract; stop resolving.
    Fatal(ContractError),
}

impl Lookup {
    /// Wraps a value, mapping [`FieldValue::Absent`] to [`Lookup::Absent`].
    #[must_use]
    pub fn from_value(value: FieldValue) -> Self {
        if value.is_absent() {
            Self::Absent
        } else {
            Self::Found(value)
        }
    }

    /// Returns true for [`Lookup::Found`].
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl From<Result<FieldValue, ContractError>> for Lookup {
    fn from(result: Result<FieldValue, ContractError>) -> Self {
        match result {
            Ok(value) => Self::from_value(value),
            Err(err) => Self::Fatal(err),
        }
    }
}

/// A mapping from field name to cached value.
///
/// Writers are serialized by an internal lock, so the check-then-write in
/// [`FieldCache::update_field`] is atomic. The lock is never held while
/// candidates are consulted.
#[derive(Debug, Default)]
pub struct FieldCache {
    fields: Mutex<HashMap<String, FieldValue>>,
}

impl FieldCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-filled with `fields`.
    #[must_use]
    pub fn with_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        Self {
            fields: Mutex::new(fields.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    // Entries are plain values, a poisoned lock leaves them consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, FieldValue>> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caches `value` under `name`, returning whether the write took effect.
    ///
    /// This is the only place deciding whose value wins:
    /// - an unset field is always written;
    /// - a field cached as [`FieldValue::Absent`] is always overwritten;
    /// - a present field is overwritten only by a `preferred` write, which
    ///   may be [`FieldValue::Absent`].
    pub fn update_field(&self, name: &str, value: FieldValue, preferred: bool) -> bool {
        let mut fields = self.lock();
        if let Some(existing) = fields.get(name) {
            if existing.is_present() && !preferred {
                return false;
            }
        }
        fields.insert(name.to_string(), value);
        true
    }

    /// Returns the cached value (present or Absent) of `name`, if any.
    #[must_use]
    pub fn cached(&self, name: &str) -> Option<FieldValue> {
        self.lock().get(name).cloned()
    }

    /// Whether `name` has a cache entry.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Number of cached entries, Absent ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies every cached entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, FieldValue> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Resolves `name`, consulting `candidates` in order on a cache miss.
    ///
    /// A cached entry is returned as is. Otherwise the first candidate
    /// returning [`Lookup::Found`] wins and later candidates are not
    /// consulted. When every candidate is exhausted the field is cached as
    /// [`FieldValue::Absent`], so asking again performs no lookups.
    ///
    /// # Errors
    ///
    /// Returns the [`ContractError`] of a candidate answering
    /// [`Lookup::Fatal`].
    pub fn resolve<C, I, F>(&self, name: &str, candidates: I, mut consult: F) -> Result<FieldValue, ContractError>
    where
        I: IntoIterator<Item = C>,
        F: FnMut(C) -> Lookup,
    {
        if let Some(value) = self.cached(name) {
            tracing::debug!(field = name, "use cached value");
            return Ok(value);
        }

        for candidate in candidates {
            match consult(candidate) {
                Lookup::Found(value) => return Ok(value),
                Lookup::Absent => {}
                Lookup::Unavailable(err) => {
                    tracing::debug!(field = name, error = %err, "candidate unavailable, continue");
                }
                Lookup::Fatal(err) => return Err(err),
            }
        }

        tracing::debug!(field = name, "field not found");
        if self.update_field(name, FieldValue::Absent, false) {
            return Ok(FieldValue::Absent);
        }
        // A concurrent writer cached a value meanwhile.
        Ok(self.cached(name).unwrap_or(FieldValue::Absent))
    }
}
