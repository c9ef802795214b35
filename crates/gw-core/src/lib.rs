//! # gw-core
//!
//! Shared data model for the LLM gateway: the unified request/response
//! types, the per-request context, provider/key configuration, virtual-key
//! governance records, and the weighted key selector.
//!
//! Every other crate in the workspace (`gw-providers`, `gw-mcp`,
//! `gw-plugins`, `gw-governance`, `gw-server`) depends on this one; it has
//! no dependency on any of them.

pub mod chunk;
pub mod context;
pub mod error;
pub mod key;
pub mod message;
pub mod provider_config;
pub mod request;
pub mod response;
pub mod selector;
pub mod virtual_key;

pub use chunk::{ChunkEvent, ChunkKind};
pub use context::{ContextBuilder, RequestContext};
pub use error::{ErrorKind, GatewayError, Result};
pub use key::Key;
pub use message::{Message, Role};
pub use provider_config::{NetworkConfig, PerformanceConfig, ProviderConfig};
pub use request::{Request, RequestCommon, RequestPayload};
pub use response::{Response, ResponseCommon, ResponsePayload, TokenUsage};
pub use selector::{KeySelector, SelectionError, SelectionMetadata};
pub use virtual_key::{Budget, RateLimit, VirtualKey};
