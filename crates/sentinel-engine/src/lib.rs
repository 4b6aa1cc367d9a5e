//! Enforcement engine: decides whether a change to a protected record is allowed and
//! reverts it when it is not.

mod config;
mod detect;
mod engine;
mod labels;
mod render;
mod revert;

pub use config::{AgentIdentity, AllowList, EnforcementConfig, EnforcementMode, ParseModeError};
pub use engine::EnforcementEngine;
pub use render::{notice_comment, revert_comment};
pub use revert::RevertPlan;
pub use sentinel_types::{EnforcementResult, Enforcer, SkipReason};
