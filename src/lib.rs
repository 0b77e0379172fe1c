//! # sscn - Standard resolution from unreliable sources
//!
//! sscn resolves the attributes ("fields") of engineering standards, such as
//! title, status, or the full text, by querying an ordered set of independent
//! remote sources and merging their partial answers into one cached record.
//!
//! ## Core Concepts
//!
//! - **StandardCode**: a parsed, comparable standard identifier
//! - **Standard**: the root entity; caches public fields, owns one origin per source
//! - **Origin**: one source working for one standard; caches source-only fields
//! - **Page**: one request plus parsing, with a retry budget
//! - **SourceRegistry**: validated source declarations and their sessions
//! - **StandardStore**: bounded FIFO map of standards
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sscn::{Settings, SourceRegistry, SourceSpec, StandardStore};
//!
//! let mut registry = SourceRegistry::new(Settings::default());
//! registry.register_http(SourceSpec::new("csres").page(Arc::new(CsresSearch)))?;
//!
//! let store = StandardStore::new(Arc::new(registry));
//! let standard = store.get_by_text("GB/T 50001-2017")?;
//! println!("{}", standard.get_field("title")?);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod code;
pub mod download;
pub mod engine;
pub mod error;
pub mod node;
pub mod origin;
pub mod page;
pub mod registry;
pub mod settings;
pub mod standard;
pub mod store;
pub mod transport;
pub mod value;

pub use code::{Category, StandardCode};
pub use download::{save_payload, SaveOutcome, PAYLOAD_SUFFIX};
pub use engine::{ResolveHandle, ResolverRuntime, RuntimeConfig};
pub use error::{
    ContentError, ContractError, ExecutionError, PageError, SscnError, SscnResult, TransportError,
    ValidationError,
};
pub use node::{FieldCache, Lookup};
pub use origin::Origin;
pub use page::{select_entry, Fields, Page, PageContext, PageKind, PageOutcome, PayloadPage, PAYLOAD_FIELD};
pub use registry::{Session, SourceId, SourceKind, SourceRegistry, SourceSpec};
pub use settings::Settings;
pub use standard::{Standard, StandardSnapshot};
pub use store::StandardStore;
pub use transport::{Method, Request, RequestTarget, Response, Transport};
pub use value::{FieldValue, Status};

#[cfg(feature = "http")]
pub use transport::HttpTransport;
