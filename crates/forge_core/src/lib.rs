// Shared primitives for the token deployment stack.

pub mod address;
pub mod logging;
pub mod network;
pub mod policy;

// Re-export primary types for convenient access.
pub use address::{Address, AddressError, hash_bytes};
pub use network::{Network, NetworkConfig, default_network_configs, validate_url};
pub use policy::{NetworkPolicy, PolicyStore};
