// src/lib.rs

pub mod config;
pub mod core;

// Re-export
pub use crate::core::channel::{ClientChannel, ParsedServiceConfig, ResolverUpdate, RpcInfo};
pub use crate::core::selector::{ConfigSelector, PickResult};
pub use crate::core::{ResolverError, ResolverOptions, Target, XdsResolver};
