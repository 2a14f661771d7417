//! Translation resolution engine.
//!
//! Resolves `(text, source, target)` through administrator overrides, a
//! freshness-aware cache and a tiered set of machine-translation providers.
//! See [`resolver::Resolver::resolve`] for the pipeline.

pub mod anchor;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod language;
pub mod metrics;
pub mod overrides;
pub mod providers;
pub mod resolver;
pub mod security;
pub mod server;
#[cfg(test)]
mod testing;
