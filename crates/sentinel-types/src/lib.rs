//! Core types and traits for the protected-field sentinel.
//!
//! Webhook DTOs follow Linear's camelCase payloads for JSON compatibility.

mod audit;
mod cache;
mod decision;
mod dto;
mod event;
mod job;
mod record;
mod traits;

pub use audit::*;
pub use cache::*;
pub use decision::*;
pub use dto::*;
pub use event::*;
pub use job::*;
pub use record::*;
pub use traits::*;
