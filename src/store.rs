//! Bounded store of standards.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::code::StandardCode;
use crate::error::{SscnResult, ValidationError};
use crate::registry::SourceRegistry;
use crate::standard::Standard;

#[derive(Debug, Default)]
struct StoreState {
    by_code: HashMap<StandardCode, Arc<Standard>>,
    // Insertion order, oldest first.
    order: VecDeque<StandardCode>,
}

/// Maps codes to shared [`Standard`]s, holding at most `capacity` of them.
///
/// When full, the oldest inserted standard is evicted. Reads do not refresh
/// an entry's position. An evicted standard stays usable by whoever still
/// holds it, but the store hands out a fresh one for its code afterwards.
#[derive(Debug)]
pub struct StandardStore {
    registry: Arc<SourceRegistry>,
    capacity: usize,
    state: Mutex<StoreState>,
}

impl StandardStore {
    /// Creates a store sized by `Settings::store_capacity`.
    #[must_use]
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        let capacity = registry.settings().store_capacity;
        Self::with_capacity(registry, capacity)
    }

    /// Creates a store holding at most `capacity` standards (at least one).
    #[must_use]
    pub fn with_capacity(registry: Arc<SourceRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            capacity: capacity.max(1),
            state: Mutex::new(StoreState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The registry new standards resolve through.
    #[must_use]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Returns the standard for `code`, creating it if absent.
    pub fn get_or_create(&self, code: &StandardCode) -> Arc<Standard> {
        let mut state = self.state();
        if let Some(standard) = state.by_code.get(code) {
            return Arc::clone(standard);
        }

        let standard = Arc::new(Standard::new(code.clone(), Arc::clone(&self.registry)));
        state.by_code.insert(code.clone(), Arc::clone(&standard));
        state.order.push_back(code.clone());
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.by_code.remove(&oldest);
                tracing::debug!(code = %oldest, "evicted standard");
            }
        }
        standard
    }

    /// Parses `text` as a full code and returns its standard.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MalformedCode`] if `text` is not a code,
    /// [`ValidationError::NotConcrete`] if it does not name one standard.
    pub fn get_by_text(&self, text: &str) -> SscnResult<Arc<Standard>> {
        let code = StandardCode::parse(text, true)?;
        if !code.is_concrete() {
            return Err(ValidationError::NotConcrete {
                code: code.to_string(),
            }
            .into());
        }
        Ok(self.get_or_create(&code))
    }

    /// Returns the standard for `code` if held.
    #[must_use]
    pub fn get(&self, code: &StandardCode) -> Option<Arc<Standard>> {
        self.state().by_code.get(code).cloned()
    }

    /// Whether a standard for `code` is held.
    #[must_use]
    pub fn contains(&self, code: &StandardCode) -> bool {
        self.state().by_code.contains_key(code)
    }

    /// Number of held standards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().by_code.len()
    }

    /// Whether no standard is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().by_code.is_empty()
    }

    /// Maximum number of held standards.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
