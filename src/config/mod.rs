//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → command line overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → NodeConfig (validated, immutable)
//!     → passed by reference to startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the member list is the only thing
//!   that changes at runtime, and it comes from discovery
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{
    BackendConfig, DiscoveryConfig, ListenerConfig, NodeConfig, ObservabilityConfig, RingConfig,
    SecurityConfig, TimeoutConfig,
};
