//! Riverbero core library.
//!
//! Riverbero keeps typed, process-local caches under continuous observation:
//! every mutation wakes a per-cache monitor that reduces the current contents
//! into a single derived projection and, when that projection actually
//! changes, records it and pushes it to subscribed observers over WebSocket.
//!
//! Layout:
//!
//! - [`cache`]: typed item stores, change monitoring, reduction, and the
//!   process-wide store registry
//! - [`relay`]: subscriber pool, fan-out, and the WebSocket relay server
//! - [`config`]: layered settings (file → environment → CLI)
//! - [`infra`]: telemetry and infrastructure errors

pub mod cache;
pub mod config;
pub mod infra;
pub mod relay;
