//! # engram-service
//!
//! The transport-agnostic boundary surface: one method per operation,
//! request/response structs per the external contract, and the wiring
//! between the vault, the consolidation scheduler, the spectral learner,
//! and the coupling map. Embedders bring their own transport.

pub mod api;
mod service;
pub mod telemetry;

pub use service::EngramService;
