//! Source registration.
//!
//! A source kind is an ordered pipeline of page kinds answering fields for
//! one remote data source. Registering it validates the page declarations,
//! computes the field sets used for dispatch, and binds the one transport
//! session every origin of that kind shares.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ContractError, TransportError};
use crate::page::PageKind;
use crate::settings::Settings;
use crate::transport::{Request, RequestTarget, Response, Transport};

/// Position of a source kind in its registry.
///
/// Ids are assigned in registration order, which is also the order a
/// standard consults its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(usize);

impl SourceId {
    /// The registration index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Declaration of a source kind, consumed by [`SourceRegistry::register`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use sscn::{PayloadPage, SourceSpec};
///
/// let spec = SourceSpec::new("csres")
///     .full_name("工标网")
///     .page(Arc::new(PayloadPage::new("csres.download", "download_url")));
/// assert_eq!(spec.name(), "csres");
/// ```
#[derive(Clone)]
pub struct SourceSpec {
    name: String,
    full_name: Option<String>,
    timeout: Option<Duration>,
    pages: Vec<Arc<dyn PageKind>>,
}

impl SourceSpec {
    /// Starts a declaration for the source called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: None,
            timeout: None,
            pages: Vec::new(),
        }
    }

    /// Human readable name.
    #[must_use]
    pub fn full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    /// Overrides the request timeout from the settings.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends a page. Declared order is dispatch order.
    #[must_use]
    pub fn page(mut self, page: Arc<dyn PageKind>) -> Self {
        self.pages.push(page);
        self
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("name", &self.name)
            .field("full_name", &self.full_name)
            .field("timeout", &self.timeout)
            .field("pages", &self.pages.iter().map(|p| p.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Request executor shared by every origin of one source kind.
pub struct Session {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    request_max_retry: u32,
}

impl Session {
    /// Creates a session over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration, request_max_retry: u32) -> Self {
        Self {
            transport,
            timeout,
            request_max_retry,
        }
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `target`, retrying on timeout only.
    ///
    /// # Errors
    ///
    /// The last [`TransportError`] once retries are exhausted, or the first
    /// non-timeout error.
    pub fn request(&self, target: &RequestTarget) -> Result<Response, TransportError> {
        let request = Request::new(target.clone(), self.timeout);
        let mut retries = 0;
        loop {
            tracing::info!(method = ?target.method, url = %target.url, "request");
            match self.transport.send(&request) {
                Err(err) if err.is_timeout() && retries < self.request_max_retry => {
                    retries += 1;
                    tracing::info!(url = %target.url, retry = retries, "request timed out, retrying");
                }
                result => return result,
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("timeout", &self.timeout)
            .field("request_max_retry", &self.request_max_retry)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Source kinds
// ----------------------------------------------------------------------------

/// A validated, registered source kind.
pub struct SourceKind {
    id: SourceId,
    name: String,
    full_name: Option<String>,
    pages: Vec<Arc<dyn PageKind>>,
    public_fields: BTreeSet<String>,
    preferred_fields: BTreeSet<String>,
    session: Session,
}

impl SourceKind {
    /// Registry id.
    #[must_use]
    pub const fn id(&self) -> SourceId {
        self.id
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable name, falling back to [`SourceKind::name`].
    #[must_use]
    pub fn full_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.name)
    }

    /// Page kinds in declared order.
    #[must_use]
    pub fn pages(&self) -> &[Arc<dyn PageKind>] {
        &self.pages
    }

    /// Union of the pages' public fields.
    #[must_use]
    pub const fn public_fields(&self) -> &BTreeSet<String> {
        &self.public_fields
    }

    /// Union of the pages' preferred public fields.
    #[must_use]
    pub const fn preferred_fields(&self) -> &BTreeSet<String> {
        &self.preferred_fields
    }

    /// Whether the source can answer `field` for a standard.
    #[must_use]
    pub fn offers(&self, field: &str) -> bool {
        self.public_fields.contains(field)
    }

    /// The shared session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Indices of the pages responsible for `field`, in dispatch order:
    /// pages preferring it first, then the other pages declaring it.
    #[must_use]
    pub fn candidate_pages(&self, field: &str) -> Vec<usize> {
        let preferred = self
            .pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.prefers(field))
            .map(|(idx, _)| idx);
        let declared = self
            .pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.declares(field) && !page.prefers(field))
            .map(|(idx, _)| idx);
        preferred.chain(declared).collect()
    }

    fn build(id: SourceId, spec: SourceSpec, session: Session) -> Result<Self, ContractError> {
        if spec.pages.is_empty() {
            return Err(ContractError::EmptySource {
                source_name: spec.name,
            });
        }

        let mut page_names = HashSet::new();
        let mut public_fields = BTreeSet::new();
        let mut preferred_fields = BTreeSet::new();
        for page in &spec.pages {
            if !page_names.insert(page.name().to_string()) {
                return Err(ContractError::DuplicatePage {
                    source_name: spec.name.clone(),
                    page: page.name().to_string(),
                });
            }
            if let Some(&field) = page
                .public_fields()
                .iter()
                .find(|&&field| page.source_only_fields().contains(&field))
            {
                return Err(ContractError::ConflictingDeclaration {
                    page: page.name().to_string(),
                    field: field.to_string(),
                });
            }
            for &field in page.preferred_fields() {
                if !page.declares(field) {
                    return Err(ContractError::UndeclaredPreferredField {
                        page: page.name().to_string(),
                        field: field.to_string(),
                    });
                }
                if !page.is_source_only(field) {
                    preferred_fields.insert(field.to_string());
                }
            }
            public_fields.extend(page.public_fields().iter().map(ToString::to_string));
        }

        Ok(Self {
            id,
            name: spec.name,
            full_name: spec.full_name,
            pages: spec.pages,
            public_fields,
            preferred_fields,
            session,
        })
    }
}

impl fmt::Debug for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceKind")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("public_fields", &self.public_fields)
            .field("preferred_fields", &self.preferred_fields)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Registered source kinds plus the settings they run with.
///
/// Build it once, then share it behind an `Arc` with every store.
#[derive(Debug)]
pub struct SourceRegistry {
    settings: Arc<Settings>,
    sources: Vec<Arc<SourceKind>>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            sources: Vec::new(),
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validates and registers a source kind using `transport` as its session.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractError`] if the name is taken, no page is composed,
    /// a page name repeats, or a page's declarations are inconsistent.
    pub fn register(&mut self, spec: SourceSpec, transport: Arc<dyn Transport>) -> Result<SourceId, ContractError> {
        if self.find(spec.name()).is_some() {
            return Err(ContractError::DuplicateSource {
                source_name: spec.name,
            });
        }
        let id = SourceId(self.sources.len());
        let timeout = spec.timeout.unwrap_or_else(|| self.settings.timeout());
        let session = Session::new(transport, timeout, self.settings.request_max_retry);
        let kind = SourceKind::build(id, spec, session)?;
        tracing::debug!(source = kind.name(), fields = ?kind.public_fields(), "source registered");
        self.sources.push(Arc::new(kind));
        Ok(id)
    }

    /// Registers a source kind with its own HTTP session.
    ///
    /// # Errors
    ///
    /// Declaration errors as in [`SourceRegistry::register`], or a transport
    /// error if the HTTP client cannot be built.
    #[cfg(feature = "http")]
    pub fn register_http(&mut self, spec: SourceSpec) -> crate::error::SscnResult<SourceId> {
        let transport = crate::transport::HttpTransport::new(&self.settings)?;
        Ok(self.register(spec, Arc::new(transport))?)
    }

    /// Source kinds in registration order.
    #[must_use]
    pub fn sources(&self) -> &[Arc<SourceKind>] {
        &self.sources
    }

    /// Looks up a source kind by id.
    #[must_use]
    pub fn get(&self, id: SourceId) -> Option<&Arc<SourceKind>> {
        self.sources.get(id.0)
    }

    /// Looks up a source kind by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Arc<SourceKind>> {
        self.sources.iter().find(|source| source.name() == name)
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::PageError;
    use crate::page::{Fields, PageContext};

    struct Decl {
        name: &'static str,
        public: &'static [&'static str],
        source_only: &'static [&'static str],
        preferred: &'static [&'static str],
    }

    impl PageKind for Decl {
        fn name(&self) -> &str {
            self.name
        }

        fn public_fields(&self) -> &[&'static str] {
            self.public
        }

        fn source_only_fields(&self) -> &[&'static str] {
            self.source_only
        }

        fn preferred_fields(&self) -> &[&'static str] {
            self.preferred
        }

        fn target(&self, _ctx: &PageContext<'_>) -> Result<Option<RequestTarget>, PageError> {
            Ok(None)
        }

        fn extract(&self, _ctx: &PageContext<'_>, _response: &Response) -> Result<Fields, PageError> {
            Ok(Fields::new())
        }
    }

    fn decl(
        name: &'static str,
        public: &'static [&'static str],
        source_only: &'static [&'static str],
        preferred: &'static [&'static str],
    ) -> Arc<dyn PageKind> {
        Arc::new(Decl {
            name,
            public,
            source_only,
            preferred,
        })
    }

    struct TimingOut {
        calls: AtomicUsize,
    }

    impl Transport for TimingOut {
        fn send(&self, request: &Request) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Timeout {
                url: request.target.url.clone(),
                timeout_ms: request.timeout_ms(),
            })
        }
    }

    struct Refused {
        calls: AtomicUsize,
    }

    impl Transport for Refused {
        fn send(&self, request: &Request) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Connection {
                url: request.target.url.clone(),
                message: "refused".to_string(),
            })
        }
    }

    fn refused() -> Arc<dyn Transport> {
        Arc::new(Refused {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_field_sets_and_candidate_order() {
        let mut registry = SourceRegistry::new(Settings::default());
        let spec = SourceSpec::new("csres")
            .page(decl("search", &["title", "status"], &["detail_url"], &[]))
            .page(decl("detail", &["title", "status", "brief"], &["download_url"], &["status"]))
            .page(decl("latest", &["status"], &[], &["status"]));
        let id = registry.register(spec, refused()).unwrap();
        let source = registry.get(id).unwrap();

        let public: Vec<_> = source.public_fields().iter().map(String::as_str).collect();
        assert_eq!(public, vec!["brief", "status", "title"]);
        assert!(source.preferred_fields().contains("status"));
        assert!(!source.offers("detail_url"));

        assert_eq!(source.candidate_pages("status"), vec![1, 2, 0]);
        assert_eq!(source.candidate_pages("title"), vec![0, 1]);
        assert_eq!(source.candidate_pages("download_url"), vec![1]);
        assert!(source.candidate_pages("pdf").is_empty());
    }

    #[test]
    fn test_source_only_preferred_is_not_public_preferred() {
        let mut registry = SourceRegistry::new(Settings::default());
        let spec = SourceSpec::new("bzko").page(decl("search", &["title"], &["detail_url"], &["detail_url"]));
        let id = registry.register(spec, refused()).unwrap();
        assert!(registry.get(id).unwrap().preferred_fields().is_empty());
    }

    #[test]
    fn test_register_rejects_bad_declarations() {
        let mut registry = SourceRegistry::new(Settings::default());

        let err = registry.register(SourceSpec::new("empty"), refused()).unwrap_err();
        assert!(matches!(err, ContractError::EmptySource { .. }));

        let spec = SourceSpec::new("dup")
            .page(decl("search", &["title"], &[], &[]))
            .page(decl("search", &["status"], &[], &[]));
        let err = registry.register(spec, refused()).unwrap_err();
        assert!(matches!(err, ContractError::DuplicatePage { .. }));

        let spec = SourceSpec::new("both").page(decl("search", &["url"], &["url"], &[]));
        let err = registry.register(spec, refused()).unwrap_err();
        assert!(matches!(err, ContractError::ConflictingDeclaration { .. }));

        let spec = SourceSpec::new("pref").page(decl("search", &["title"], &[], &["status"]));
        let err = registry.register(spec, refused()).unwrap_err();
        assert!(matches!(err, ContractError::UndeclaredPreferredField { .. }));

        assert!(registry.is_empty());
        registry
            .register(SourceSpec::new("ok").page(decl("search", &["title"], &[], &[])), refused())
            .unwrap();
        let err = registry
            .register(SourceSpec::new("ok").page(decl("search", &["title"], &[], &[])), refused())
            .unwrap_err();
        assert!(matches!(err, ContractError::DuplicateSource { .. }));
        assert_eq!(registry.len(), 1);
        assert!(registry.find("ok").is_some());
    }

    #[test]
    fn test_session_retries_timeouts_only() {
        let transport = Arc::new(TimingOut {
            calls: AtomicUsize::new(0),
        });
        let session = Session::new(transport.clone(), Duration::from_millis(10), 2);
        let err = session.request(&RequestTarget::get("http://example.com")).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

        let transport = Arc::new(Refused {
            calls: AtomicUsize::new(0),
        });
        let session = Session::new(transport.clone(), Duration::from_millis(10), 2);
        let err = session.request(&RequestTarget::get("http://example.com")).unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_source_timeout_override() {
        let mut registry = SourceRegistry::new(Settings::default());
        let spec = SourceSpec::new("ccsn")
            .timeout(Duration::from_secs(10))
            .page(decl("search", &["title"], &[], &[]));
        let id = registry.register(spec, refused()).unwrap();
        assert_eq!(registry.get(id).unwrap().session().timeout(), Duration::from_secs(10));

        let spec = SourceSpec::new("bzorg").page(decl("search", &["title"], &[], &[]));
        let id = registry.register(spec, refused()).unwrap();
        assert_eq!(registry.get(id).unwrap().session().timeout(), Duration::from_secs(3));
    }
}
