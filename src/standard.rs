//! Standards: the root resolvable entity.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::code::StandardCode;
use crate::error::{ContractError, SscnError, SscnResult, ValidationError};
use crate::node::{FieldCache, Lookup};
use crate::origin::Origin;
use crate::registry::{SourceId, SourceRegistry};
use crate::value::FieldValue;

/// Field holding a standard's title.
pub const TITLE_FIELD: &str = "title";

/// A standard and everything learned about it so far.
///
/// Fields are resolved lazily on [`Standard::get_field`] and cached forever.
/// Obtain instances from a [`StandardStore`](crate::StandardStore) so each
/// code maps to a single accumulator.
pub struct Standard {
    code: StandardCode,
    registry: Arc<SourceRegistry>,
    fields: FieldCache,
    origins: Mutex<HashMap<SourceId, Arc<Origin>>>,
}

impl Standard {
    /// Creates a standard resolving through `registry`.
    #[must_use]
    pub fn new(code: StandardCode, registry: Arc<SourceRegistry>) -> Self {
        Self {
            code,
            registry,
            fields: FieldCache::new(),
            origins: Mutex::new(HashMap::new()),
        }
    }

    /// The standard's code.
    #[must_use]
    pub const fn code(&self) -> &StandardCode {
        &self.code
    }

    /// The registry sources are taken from.
    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// The standard's public field cache.
    #[must_use]
    pub const fn fields(&self) -> &FieldCache {
        &self.fields
    }

    /// Resolves public field `name`.
    ///
    /// Returns the cached value when there is one. Otherwise every source
    /// offering the field is asked in registration order until one answers;
    /// if none does, the field is cached as [`FieldValue::Absent`].
    ///
    /// # Errors
    ///
    /// - [`ValidationError::NotConcrete`] if the code is not concrete.
    /// - [`ContractError`] if a page violates its declarations.
    pub fn get_field(&self, name: &str) -> SscnResult<FieldValue> {
        if !self.code.is_concrete() {
            return Err(SscnError::Validation(ValidationError::NotConcrete {
                code: self.code.to_string(),
            }));
        }
        Ok(self.resolve_field(name)?)
    }

    pub(crate) fn resolve_field(&self, name: &str) -> Result<FieldValue, ContractError> {
        let span = tracing::debug_span!("get_field", code = %self.code, field = name);
        let _enter = span.enter();

        let candidates = self
            .registry
            .sources()
            .iter()
            .filter(|source| source.offers(name))
            .map(|source| source.id());
        self.fields.resolve(name, candidates, |id| match self.origin(id) {
            Some(origin) => {
                tracing::debug!(origin = origin.name(), "dispatching to origin");
                Lookup::from(origin.get_field(self, name))
            }
            None => Lookup::Absent,
        })
    }

    /// Caches `value` under `name`; see [`FieldCache::update_field`].
    pub fn update_field(&self, name: &str, value: FieldValue, preferred: bool) -> bool {
        self.fields.update_field(name, value, preferred)
    }

    /// The cached value of `name`, without resolving.
    #[must_use]
    pub fn cached_field(&self, name: &str) -> Option<FieldValue> {
        self.fields.cached(name)
    }

    /// The origin of source `id`, created on first use.
    ///
    /// Returns `None` if `id` is not registered.
    #[must_use]
    pub fn origin(&self, id: SourceId) -> Option<Arc<Origin>> {
        let kind = self.registry.get(id)?;
        let mut origins = self.origins.lock().unwrap_or_else(PoisonError::into_inner);
        let origin = origins
            .entry(id)
            .or_insert_with(|| Arc::new(Origin::new(Arc::clone(kind))));
        Some(Arc::clone(origin))
    }

    /// The origin of the source named `name`, created on first use.
    #[must_use]
    pub fn origin_by_name(&self, name: &str) -> Option<Arc<Origin>> {
        let id = self.registry.find(name)?.id();
        self.origin(id)
    }

    /// `"{code} {title}"` once a title is cached, otherwise the code.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.fields.cached(TITLE_FIELD) {
            Some(FieldValue::Text(title)) if !title.is_empty() => format!("{} {title}", self.code),
            _ => self.code.to_string(),
        }
    }

    /// A file name for this standard; see [`StandardCode::file_name`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotConcrete`] for non-concrete codes.
    pub fn file_name(&self, suffix: &str) -> Result<String, ValidationError> {
        self.code.file_name(suffix)
    }

    /// Copies the cached fields, payload bytes excluded.
    #[must_use]
    pub fn snapshot(&self) -> StandardSnapshot {
        let fields = self
            .fields
            .snapshot()
            .into_iter()
            .filter(|(_, value)| !matches!(value, FieldValue::Bytes(_)))
            .collect();
        StandardSnapshot {
            code: self.code.clone(),
            fields,
        }
    }

    /// [`Standard::snapshot`] as JSON.
    ///
    /// # Errors
    ///
    /// Returns an internal error if serialization fails.
    pub fn to_json(&self) -> SscnResult<String> {
        serde_json::to_string(&self.snapshot()).map_err(|e| SscnError::internal(format!("serialize standard: {e}")))
    }
}

impl fmt::Debug for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Standard")
            .field("code", &self.code)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Serializable copy of a standard's cached fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandardSnapshot {
    /// The standard's code.
    pub code: StandardCode,
    /// Cached fields, Absent markers included.
    pub fields: BTreeMap<String, FieldValue>,
}
