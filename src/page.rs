//! Pages: one request plus parsing inside a source's pipeline.
//!
//! A [`PageKind`] is the plugin describing a page: which fields it declares,
//! how to build its request, and how to extract fields from the response.
//! A [`Page`] is the per-origin instance carrying the fetch state machine:
//!
//! ```text
//! Unattempted --fetch ok--> Succeeded
//!      |
//!      +------fetch err---> Failed --(request error, below retry ceiling)--> fetch again
//!      |
//!      +--contract error--> Broken (reported on every later lookup)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::code::StandardCode;
use crate::error::{ContentError, ContractError, PageError};
use crate::node::Lookup;
use crate::origin::Origin;
use crate::settings::Settings;
use crate::standard::Standard;
use crate::transport::{RequestTarget, Response};
use crate::value::FieldValue;

/// Fields extracted by a page, keyed by name.
///
/// Names starting with `_` are intermediate values and are dropped.
pub type Fields = BTreeMap<String, FieldValue>;

/// Name of the payload field produced by [`PayloadPage`].
pub const PAYLOAD_FIELD: &str = "pdf";

/// Whether `name` marks a private intermediate field.
#[must_use]
pub fn is_private_field(name: &str) -> bool {
    name.starts_with('_')
}

/// A page plugin.
///
/// Declarations are static: every field in [`public_fields`] and
/// [`source_only_fields`] must be present in the mapping returned by
/// [`extract`], and no other non-private field may be.
///
/// [`public_fields`]: PageKind::public_fields
/// [`source_only_fields`]: PageKind::source_only_fields
/// [`extract`]: PageKind::extract
pub trait PageKind: Send + Sync {
    /// Page name, unique within its source.
    fn name(&self) -> &str;

    /// Fields written to the standard.
    fn public_fields(&self) -> &[&'static str] {
        &[]
    }

    /// Fields kept by the origin for its own pages, e.g. a detail page URL.
    fn source_only_fields(&self) -> &[&'static str] {
        &[]
    }

    /// Declared fields whose values override values cached by other sources.
    fn preferred_fields(&self) -> &[&'static str] {
        &[]
    }

    /// Whether fetched fields are written to the caches.
    ///
    /// Non-caching pages fetch again on every request.
    fn caches_fields(&self) -> bool {
        true
    }

    /// `Referer` header added to every request of this page.
    fn referer(&self) -> Option<&str> {
        None
    }

    /// Builds the request, or `None` when no target can be derived.
    ///
    /// # Errors
    ///
    /// Plugin failures; see [`PageError`].
    fn target(&self, ctx: &PageContext<'_>) -> Result<Option<RequestTarget>, PageError>;

    /// Extracts fields from a fetched response.
    ///
    /// # Errors
    ///
    /// Plugin failures; [`ContentError::StandardNotFound`] when a listing has
    /// no entry for the standard.
    fn extract(&self, ctx: &PageContext<'_>, response: &Response) -> Result<Fields, PageError>;

    /// Whether this page declares `field`, publicly or source-only.
    fn declares(&self, field: &str) -> bool {
        self.public_fields().contains(&field) || self.source_only_fields().contains(&field)
    }

    /// Whether this page prefers `field`.
    fn prefers(&self, field: &str) -> bool {
        self.preferred_fields().contains(&field)
    }

    /// Whether `field` is source-only for this page.
    fn is_source_only(&self, field: &str) -> bool {
        self.source_only_fields().contains(&field)
    }
}

// ----------------------------------------------------------------------------
// Context
// ----------------------------------------------------------------------------

/// What a page plugin can see while building requests and extracting fields.
pub struct PageContext<'a> {
    standard: &'a Standard,
    origin: &'a Origin,
    response_url: Option<&'a str>,
}

impl<'a> PageContext<'a> {
    pub(crate) const fn new(standard: &'a Standard, origin: &'a Origin) -> Self {
        Self {
            standard,
            origin,
            response_url: None,
        }
    }

    const fn with_response<'b>(&self, url: &'b str) -> PageContext<'b>
    where
        'a: 'b,
    {
        PageContext {
            standard: self.standard,
            origin: self.origin,
            response_url: Some(url),
        }
    }

    /// The code of the standard being resolved.
    #[must_use]
    pub fn code(&self) -> &StandardCode {
        self.standard.code()
    }

    /// Name of the origin owning the page.
    #[must_use]
    pub fn origin_name(&self) -> &str {
        self.origin.name()
    }

    /// Engine settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.standard.registry().settings()
    }

    /// Resolves a field through the owning origin, e.g. a source-only URL
    /// produced by an earlier page.
    ///
    /// # Errors
    ///
    /// Contract violations of the pages consulted.
    pub fn origin_field(&self, name: &str) -> Result<FieldValue, PageError> {
        Ok(self.origin.get_field(self.standard, name)?)
    }

    /// Resolves a public field through the standard.
    ///
    /// # Errors
    ///
    /// Contract violations of the pages consulted.
    pub fn standard_field(&self, name: &str) -> Result<FieldValue, PageError> {
        Ok(self.standard.resolve_field(name)?)
    }

    /// URL of the response being extracted, if any.
    #[must_use]
    pub const fn response_url(&self) -> Option<&str> {
        self.response_url
    }

    /// Joins a possibly relative link against the response URL.
    #[must_use]
    pub fn join_url(&self, link: &str) -> Option<String> {
        if let Ok(absolute) = url::Url::parse(link) {
            return Some(absolute.to_string());
        }
        let base = url::Url::parse(self.response_url?).ok()?;
        base.join(link).ok().map(|u| u.to_string())
    }
}

impl fmt::Debug for PageContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageContext")
            .field("code", self.code())
            .field("origin", &self.origin_name())
            .field("response_url", &self.response_url)
            .finish()
    }
}

/// Returns the first entry of a listing that `matches` the standard.
///
/// # Errors
///
/// Returns [`ContentError::StandardNotFound`] if nothing matches.
pub fn select_entry<T, I, F>(ctx: &PageContext<'_>, entries: I, mut matches: F) -> Result<T, ContentError>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> bool,
{
    entries.into_iter().find(|entry| matches(entry)).ok_or_else(|| {
        tracing::info!(code = %ctx.code(), origin = ctx.origin_name(), "standard not found in listing");
        ContentError::StandardNotFound {
            origin: ctx.origin_name().to_string(),
        }
    })
}

// ----------------------------------------------------------------------------
// State machine
// ----------------------------------------------------------------------------

/// Fetch outcome of a page instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageOutcome {
    /// Not fetched yet, or fetched by a non-caching page.
    #[default]
    Unattempted,
    /// Fetched; its fields were handed to their owners.
    Succeeded,
    /// The last fetch failed.
    Failed,
    /// The page violated its declared contract; every later lookup reports it.
    Broken,
}

#[derive(Debug, Clone, Default)]
struct PageState {
    outcome: PageOutcome,
    consecutive_request_errors: u32,
    failed_on_request: bool,
    last_url: Option<String>,
    contract_error: Option<ContractError>,
}

/// A page instance bound to one origin.
pub struct Page {
    kind: Arc<dyn PageKind>,
    state: Mutex<PageState>,
}

impl Page {
    pub(crate) fn new(kind: Arc<dyn PageKind>) -> Self {
        Self {
            kind,
            state: Mutex::new(PageState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The plugin behind this page.
    #[must_use]
    pub fn kind(&self) -> &Arc<dyn PageKind> {
        &self.kind
    }

    /// Page name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Current fetch outcome.
    #[must_use]
    pub fn outcome(&self) -> PageOutcome {
        self.state().outcome
    }

    /// Request errors since the last success.
    #[must_use]
    pub fn consecutive_request_errors(&self) -> u32 {
        self.state().consecutive_request_errors
    }

    /// The contract violation that broke this page, if any.
    #[must_use]
    pub fn contract_error(&self) -> Option<ContractError> {
        self.state().contract_error.clone()
    }

    /// Final URL of the last response received.
    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.state().last_url.clone()
    }

    /// Fetches the page if its state allows and returns field `name`.
    pub(crate) fn get_field(&self, standard: &Standard, origin: &Origin, name: &str) -> Lookup {
        tracing::debug!(page = self.name(), code = %standard.code(), field = name, "getting field");
        let max_retry = standard.registry().settings().max_page_retry;

        {
            let state = self.state();
            match state.outcome {
                // Fields of a succeeded page are cached by their owners.
                PageOutcome::Succeeded => {
                    return Lookup::Unavailable(ContentError::not_found(format!(
                        "page `{}` already fetched",
                        self.name()
                    )));
                }
                PageOutcome::Failed => {
                    if !state.failed_on_request || state.consecutive_request_errors >= max_retry {
                        return Lookup::Unavailable(ContentError::unavailable(format!(
                            "page `{}` failed",
                            self.name()
                        )));
                    }
                    tracing::info!(
                        page = self.name(),
                        errors = state.consecutive_request_errors,
                        "retrying page after request error"
                    );
                }
                PageOutcome::Broken => {
                    if let Some(err) = &state.contract_error {
                        return Lookup::Fatal(err.clone());
                    }
                }
                PageOutcome::Unattempted => {}
            }
        }

        // No lock is held while fetching, plugins may re-enter the origin.
        let ctx = PageContext::new(standard, origin);
        match self.fetch(&ctx) {
            Ok(mut fields) => {
                {
                    let mut state = self.state();
                    state.outcome = if self.kind.caches_fields() {
                        PageOutcome::Succeeded
                    } else {
                        PageOutcome::Unattempted
                    };
                    state.consecutive_request_errors = 0;
                    state.failed_on_request = false;
                }
                let value = fields.remove(name).unwrap_or(FieldValue::Absent);
                tracing::debug!(page = self.name(), field = name, found = value.is_present(), "field fetched");
                Lookup::from_value(value)
            }
            Err(FetchError::Contract(err)) => {
                {
                    let mut state = self.state();
                    state.outcome = PageOutcome::Broken;
                    state.failed_on_request = false;
                    state.contract_error = Some(err.clone());
                }
                tracing::error!(page = self.name(), error = %err, "page violated its field contract");
                Lookup::Fatal(err)
            }
            Err(FetchError::Content(err)) => {
                let on_request = err.is_request();
                self.fail(on_request);
                Lookup::Unavailable(err)
            }
            Err(FetchError::Other(message)) => {
                self.fail(false);
                tracing::error!(page = self.name(), error = %message, "page errored");
                Lookup::Unavailable(ContentError::unavailable(message))
            }
        }
    }

    fn fail(&self, on_request: bool) {
        let mut state = self.state();
        state.outcome = PageOutcome::Failed;
        state.failed_on_request = on_request;
        if on_request {
            state.consecutive_request_errors += 1;
        }
    }

    fn fetch(&self, ctx: &PageContext<'_>) -> Result<Fields, FetchError> {
        let mut target = self
            .kind
            .target(ctx)?
            .ok_or_else(|| ContentError::not_found(format!("no request target for page `{}`", self.name())))?;
        if let Some(referer) = self.kind.referer() {
            if !target.has_header("Referer") {
                target = target.header("Referer", referer);
            }
        }

        let response = ctx.origin.request(&target).map_err(ContentError::from)?;
        self.state().last_url = Some(response.url.clone());

        let ctx = ctx.with_response(&response.url);
        let fields = self.kind.extract(&ctx, &response)?;
        self.distribute(&ctx, fields)
    }

    /// Checks `fields` against the declarations and writes each declared
    /// field to its owner.
    fn distribute(&self, ctx: &PageContext<'_>, fields: Fields) -> Result<Fields, FetchError> {
        let kind = &self.kind;
        for name in fields.keys() {
            if !is_private_field(name) && !kind.declares(name) {
                return Err(FetchError::Contract(ContractError::UnregisteredField {
                    page: self.name().to_string(),
                    field: name.clone(),
                }));
            }
        }
        let declared = kind.public_fields().iter().chain(kind.source_only_fields());
        for &name in declared.clone() {
            if !fields.contains_key(name) {
                return Err(FetchError::Contract(ContractError::MissingDeclaredField {
                    page: self.name().to_string(),
                    field: name.to_string(),
                }));
            }
        }

        if kind.caches_fields() {
            for &name in declared {
                let value = fields.get(name).cloned().unwrap_or(FieldValue::Absent);
                let preferred = kind.prefers(name);
                if kind.is_source_only(name) {
                    ctx.origin.fields().update_field(name, value, preferred);
                } else {
                    ctx.standard.fields().update_field(name, value, preferred);
                }
            }
        }

        Ok(fields.into_iter().filter(|(k, _)| !is_private_field(k)).collect())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("name", &self.name())
            .field("state", &*self.state())
            .finish()
    }
}

enum FetchError {
    Content(ContentError),
    Contract(ContractError),
    Other(String),
}

impl From<ContentError> for FetchError {
    fn from(err: ContentError) -> Self {
        Self::Content(err)
    }
}

impl From<PageError> for FetchError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::Content(e) => Self::Content(e),
            PageError::Contract(e) => Self::Contract(e),
            PageError::Other(message) => Self::Other(message),
        }
    }
}

// ----------------------------------------------------------------------------
// Payload download
// ----------------------------------------------------------------------------

/// Downloads the full text of a standard into [`PAYLOAD_FIELD`].
///
/// The download URL is read from a source-only field produced by an earlier
/// page of the same origin. Payloads are never cached; every request fetches
/// again.
#[derive(Debug, Clone)]
pub struct PayloadPage {
    name: String,
    url_field: &'static str,
}

impl PayloadPage {
    /// Creates a downloader reading its URL from `url_field`.
    #[must_use]
    pub fn new(name: impl Into<String>, url_field: &'static str) -> Self {
        Self {
            name: name.into(),
            url_field,
        }
    }

    /// The source-only field holding the download URL.
    #[must_use]
    pub const fn url_field(&self) -> &'static str {
        self.url_field
    }
}

impl PageKind for PayloadPage {
    fn name(&self) -> &str {
        &self.name
    }

    fn public_fields(&self) -> &[&'static str] {
        &[PAYLOAD_FIELD]
    }

    fn caches_fields(&self) -> bool {
        false
    }

    fn target(&self, ctx: &PageContext<'_>) -> Result<Option<RequestTarget>, PageError> {
        match ctx.origin_field(self.url_field)? {
            FieldValue::Text(url) if !url.is_empty() => Ok(Some(RequestTarget::get(url))),
            _ => Err(ContentError::not_found(format!("no `{}` for payload", self.url_field)).into()),
        }
    }

    fn extract(&self, _ctx: &PageContext<'_>, response: &Response) -> Result<Fields, PageError> {
        if !response.is_success() {
            return Err(ContentError::unavailable(format!("payload request returned {}", response.status)).into());
        }
        Ok(Fields::from([(PAYLOAD_FIELD.to_string(), FieldValue::Bytes(response.body.clone()))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Declared;

    impl PageKind for Declared {
        fn name(&self) -> &str {
            "search"
        }

        fn public_fields(&self) -> &[&'static str] {
            &["title", "status"]
        }

        fn source_only_fields(&self) -> &[&'static str] {
            &["detail_page_url"]
        }

        fn preferred_fields(&self) -> &[&'static str] {
            &["status"]
        }

        fn target(&self, _ctx: &PageContext<'_>) -> Result<Option<RequestTarget>, PageError> {
            Ok(None)
        }

        fn extract(&self, _ctx: &PageContext<'_>, _response: &Response) -> Result<Fields, PageError> {
            Ok(Fields::new())
        }
    }

    #[test]
    fn test_declarations() {
        let page = Declared;
        assert!(page.declares("title"));
        assert!(page.declares("detail_page_url"));
        assert!(!page.declares("brief"));
        assert!(page.prefers("status"));
        assert!(!page.prefers("title"));
        assert!(page.is_source_only("detail_page_url"));
        assert!(!page.is_source_only("title"));
        assert!(page.caches_fields());
    }

    #[test]
    fn test_private_field() {
        assert!(is_private_field("_info"));
        assert!(!is_private_field("info"));
    }

    #[test]
    fn test_payload_page_declarations() {
        let page = PayloadPage::new("download", "download_url");
        assert_eq!(page.public_fields(), &[PAYLOAD_FIELD]);
        assert_eq!(page.url_field(), "download_url");
        assert!(!page.caches_fields());
    }

    #[test]
    fn test_new_page_is_unattempted() {
        let page = Page::new(Arc::new(Declared));
        assert_eq!(page.outcome(), PageOutcome::Unattempted);
        assert_eq!(page.consecutive_request_errors(), 0);
        assert_eq!(page.last_url(), None);
    }
}
