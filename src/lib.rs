// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod cache;
pub mod config;
pub mod digest;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::cache::CacheStore;
pub use crate::config::Settings;
pub use crate::digest::{DigestChunk, DigestComposer};
pub use crate::ingest::types::{Item, Language, SourceProvider};
pub use crate::notify::{deliver, DeliveryResult, FormatMode, Messenger, OutgoingMessage};
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::translate::{TranslationPolicy, Translator};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "pipeline=info,ingest=info,digest=info,notify=info,warn";

/// Stdout logging; `RUST_LOG` overrides the default filter and
/// `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
