//! Core types: records, integrity, the digest chain, queries, configuration
//! and errors

pub mod chain;
pub mod config;
pub mod error;
pub mod integrity;
pub mod mime;
pub mod query;
pub mod record;
