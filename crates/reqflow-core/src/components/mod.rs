//! Analysis components shipped with the core.
//!
//! - [`generic`]: `GenericFallbackComponent`, the designated last resort
//! - [`fixed`]: `FixedComponent`, canned payloads for config-driven registries
//! - [`command`]: `CommandComponent`, an external process speaking JSON

pub mod command;
pub mod fixed;
pub mod generic;

pub use command::CommandComponent;
pub use fixed::FixedComponent;
pub use generic::GenericFallbackComponent;
