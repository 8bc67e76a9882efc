//! Instance cache engine.
//!
//! Serves record representations from a shared cache and keeps them in step
//! with the backing store:
//!
//! - **Read path** ([`InstanceCache::get_instances`]): one bulk cache read,
//!   load and serialize on miss, one bulk write-back
//! - **Write path** ([`InstanceCache::update_instance`]): re-serialize, compare
//!   with the cached entry, and report dependents when it changed
//! - **Cascades** ([`CascadeQueue`], [`CascadeWorker`]): dependents are
//!   refreshed asynchronously, one generation at a time
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `instcache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! versions = ["default"]
//! default_version = "default"
//!
//! [cascade]
//! max_depth = 16
//! # ... see config.rs for all options
//! ```

mod backend;
pub mod codec;
mod config;
mod consumer;
mod error;
mod events;
mod instance;
mod keys;
mod lock;
mod memory;
mod planner;
mod query;
mod registry;
mod resolver;
mod store;
mod trigger;
mod updater;

pub use backend::{CacheBackend, NullBackend, backend_from_config, backend_from_settings};
pub use codec::{FieldCodec, FieldCodecs, PassThroughCodec, RepresentationBuilder};
pub use config::{CacheConfig, CascadeConfig, DEFAULT_VERSION};
pub use consumer::CascadeWorker;
pub use error::{BackendError, BoxError, CacheError, QueryError};
pub use events::{CascadeDispatcher, CascadeJob, CascadeQueue, Epoch};
pub use instance::InstanceCache;
pub use keys::{DEFAULT_KEY_PREFIX, Keyspace};
pub(crate) use keys::KEY_SEPARATOR;
pub use memory::MemoryBackend;
pub use planner::CascadePlan;
pub use query::{CachedQuery, KeySource};
pub use registry::{
    Invalidation, Invalidator, InvalidatorFn, Loader, LoaderFn, Registration, Registry,
    RegistryBuilder, Serializer, invalidator_fn, loader_fn,
};
pub use resolver::{InstanceRequest, ResolvedInstance};
pub use store::RepresentationStore;
pub use trigger::CacheTrigger;
pub use updater::{RecordState, UpdateOptions};
