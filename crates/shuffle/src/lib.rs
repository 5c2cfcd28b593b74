//! Shuffle backend plumbing consumed at plan-conversion time.
//!
//! The converter never touches shuffle storage; it only needs to know which
//! backends exist and how many partitions a given configuration declares.
//!
//! Key modules:
//! - [`config`]: opaque shuffle write configuration
//! - [`backend`]: backend factory contract and registry
//! - [`local`]: reference file-backed backend

pub mod backend;
pub mod config;
pub mod local;

pub use backend::{
    global_shuffle_backend_registry, register_global_shuffle_backend, ShuffleBackendFactory,
    ShuffleBackendRegistry,
};
pub use config::ShuffleConfig;
pub use local::{LocalPersistentShuffle, LocalShuffleInfo};
