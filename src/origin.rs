//! Origins: one source kind bound to one standard.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{ContractError, TransportError};
use crate::node::{FieldCache, Lookup};
use crate::page::Page;
use crate::registry::SourceKind;
use crate::standard::Standard;
use crate::transport::{RequestTarget, Response};
use crate::value::FieldValue;

/// The pages of one source kind working for one standard.
///
/// Holds the source-only fields (such as detail page URLs) and the Absent
/// markers for fields this source could not produce. Page instances are
/// created lazily, once per page kind.
pub struct Origin {
    kind: Arc<SourceKind>,
    fields: FieldCache,
    pages: Mutex<HashMap<usize, Arc<Page>>>,
}

impl Origin {
    pub(crate) fn new(kind: Arc<SourceKind>) -> Self {
        Self {
            kind,
            fields: FieldCache::new(),
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// The source kind.
    #[must_use]
    pub fn kind(&self) -> &Arc<SourceKind> {
        &self.kind
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// The origin's own field cache.
    #[must_use]
    pub const fn fields(&self) -> &FieldCache {
        &self.fields
    }

    /// The cached value of `name`, if any.
    #[must_use]
    pub fn cached_field(&self, name: &str) -> Option<FieldValue> {
        self.fields.cached(name)
    }

    /// The instance of the page kind at `index`, created on first use.
    ///
    /// Returns `None` if the source has no page at `index`.
    #[must_use]
    pub fn page(&self, index: usize) -> Option<Arc<Page>> {
        let kind = self.kind.pages().get(index)?;
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        let page = pages
            .entry(index)
            .or_insert_with(|| Arc::new(Page::new(Arc::clone(kind))));
        Some(Arc::clone(page))
    }

    /// The page instance named `name`, created on first use.
    #[must_use]
    pub fn page_by_name(&self, name: &str) -> Option<Arc<Page>> {
        let index = self.kind.pages().iter().position(|p| p.name() == name)?;
        self.page(index)
    }

    /// Sends `target` through the source's shared session.
    ///
    /// # Errors
    ///
    /// See [`Session::request`](crate::registry::Session::request).
    pub fn request(&self, target: &RequestTarget) -> Result<Response, TransportError> {
        self.kind.session().request(target)
    }

    /// Resolves `name` for `standard` through this source's pages.
    ///
    /// Works for both public and source-only fields.
    pub(crate) fn get_field(&self, standard: &Standard, name: &str) -> Result<FieldValue, ContractError> {
        let candidates = self.kind.candidate_pages(name);
        tracing::debug!(origin = self.name(), field = name, pages = candidates.len(), "dispatching to pages");
        self.fields.resolve(name, candidates, |index| match self.page(index) {
            Some(page) => page.get_field(standard, self, name),
            None => Lookup::Absent,
        })
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("source", &self.name())
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
