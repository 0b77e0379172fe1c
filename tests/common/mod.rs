//! In-memory sources for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use sscn::{
    ContentError, FieldValue, Fields, PageContext, PageError, PageKind, Request, RequestTarget, Response,
    Settings, SourceRegistry, SourceSpec, StandardCode, Transport, TransportError,
};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(&'static str),
    Bytes(Vec<u8>),
    Timeout,
    Refused,
}

/// Transport answering from a per-URL script and counting calls.
///
/// Replies are consumed in order; the last one repeats forever. Unknown
/// URLs are refused.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, url: &str, replies: Vec<Reply>) {
        self.script.lock().unwrap().insert(url.to_string(), replies.into());
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut script = self.script.lock().unwrap();
        let replies = script.get_mut(url)?;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let url = request.target.url.clone();
        *self.calls.lock().unwrap().entry(url.clone()).or_insert(0) += 1;
        match self.next_reply(&url) {
            Some(Reply::Body(body)) => Ok(Response::new(url, 200, body.as_bytes())),
            Some(Reply::Bytes(bytes)) => Ok(Response::new(url, 200, bytes)),
            Some(Reply::Timeout) => Err(TransportError::Timeout {
                url,
                timeout_ms: request.timeout_ms(),
            }),
            Some(Reply::Refused) | None => Err(TransportError::Connection {
                url,
                message: "connection refused".to_string(),
            }),
        }
    }
}

type Extractor = dyn Fn(&PageContext<'_>, &Response) -> Result<Fields, PageError> + Send + Sync;

/// A configurable page.
///
/// Requests `url`, or the URL stored in an origin field when built with
/// [`FakePage::url_from`].
pub struct FakePage {
    name: &'static str,
    url: &'static str,
    url_field: Option<&'static str>,
    public: &'static [&'static str],
    source_only: &'static [&'static str],
    preferred: &'static [&'static str],
    extract: Box<Extractor>,
}

impl FakePage {
    pub fn new(name: &'static str, url: &'static str) -> Self {
        Self {
            name,
            url,
            url_field: None,
            public: &[],
            source_only: &[],
            preferred: &[],
            extract: Box::new(|_, _| Ok(Fields::new())),
        }
    }

    pub fn url_from(mut self, field: &'static str) -> Self {
        self.url_field = Some(field);
        self
    }

    pub fn public(mut self, fields: &'static [&'static str]) -> Self {
        self.public = fields;
        self
    }

    pub fn source_only(mut self, fields: &'static [&'static str]) -> Self {
        self.source_only = fields;
        self
    }

    pub fn preferred(mut self, fields: &'static [&'static str]) -> Self {
        self.preferred = fields;
        self
    }

    /// Always extracts `fields`.
    pub fn returns(self, fields: Vec<(&'static str, FieldValue)>) -> Self {
        self.extract_with(move |_, _| Ok(fields.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()))
    }

    pub fn extract_with<F>(mut self, extract: F) -> Self
    where
        F: Fn(&PageContext<'_>, &Response) -> Result<Fields, PageError> + Send + Sync + 'static,
    {
        self.extract = Box::new(extract);
        self
    }

    pub fn build(self) -> Arc<dyn PageKind> {
        Arc::new(self)
    }
}

impl PageKind for FakePage {
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

    fn target(&self, ctx: &PageContext<'_>) -> Result<Option<RequestTarget>, PageError> {
        let Some(field) = self.url_field else {
            return Ok(Some(RequestTarget::get(self.url)));
        };
        match ctx.origin_field(field)? {
            FieldValue::Text(url) => Ok(Some(RequestTarget::get(url))),
            _ => Err(ContentError::not_found(format!("no `{field}`")).into()),
        }
    }

    fn extract(&self, ctx: &PageContext<'_>, response: &Response) -> Result<Fields, PageError> {
        (self.extract)(ctx, response)
    }
}

pub fn code(text: &str) -> StandardCode {
    StandardCode::parse(text, true).unwrap()
}

pub fn text(value: &str) -> FieldValue {
    FieldValue::from(value)
}

/// A registry over `sources`, each with its own scripted transport.
pub fn registry(settings: Settings, sources: Vec<(SourceSpec, Arc<ScriptedTransport>)>) -> Arc<SourceRegistry> {
    let mut registry = SourceRegistry::new(settings);
    for (spec, transport) in sources {
        registry.register(spec, transport).unwrap();
    }
    Arc::new(registry)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
