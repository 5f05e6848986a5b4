//! # Cache Module
//!
//! In-process TTL cache used for read-through responses.
//!
//! The cache stores arbitrary JSON payloads keyed by string and evicts
//! lazily: an expired entry is only removed when an operation touches it.
//! There is no background sweeper and no size bound; the working set is a
//! handful of response keys ("current playing", one weather key), so the
//! mapping stays tiny by construction.
//!
//! ## Semantics
//!
//! - `set` overwrites unconditionally; a missing TTL means the entry lives
//!   until an explicit `delete`.
//! - `get` on an expired entry removes it and reports a miss.
//! - `ttl` is three-way: seconds remaining, [`TtlStatus::NoExpiry`] for
//!   entries without a deadline, [`TtlStatus::Missing`] for unknown or
//!   just-expired keys.
//! - `expire` re-arms the deadline of a live entry and refuses dead ones.
//!
//! Every operation takes the store lock exactly once, so the
//! check-expired-then-remove sequence is atomic under concurrent handlers.

pub mod ttl_cache;

use serde_json::Value;
pub use ttl_cache::{TtlCache, TtlStatus};

/// Clave del cache para la respuesta de "current playing".
pub const CURRENT_PLAYING_CACHE_KEY: &str = "current-playing";

/// Cache compartido de respuestas JSON del servicio.
pub type ResponseCache = TtlCache<String, Value>;
