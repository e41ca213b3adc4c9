//! Cascading soft-delete and restore engine.
//!
//! Entity types and their associations are registered once in a
//! [`Registry`]. The [`Engine`] destroys a record by stamping its
//! destruction timestamp, cascades the same timestamp to every dependent and
//! later restores exactly those dependents whose stored timestamp still
//! matches, all inside one transaction per top-level call.
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .entity(EntityDef::new("Post", "posts").soft_delete()
//!         .association(Association::has_many("comments", "Comment", "post_id").dependent()))
//!     .entity(EntityDef::new("Comment", "comments").soft_delete())
//!     .build()?;
//! let engine = Engine::new(registry, EngineConfig::default());
//!
//! let mut post = engine.find(&db, "Post", RecordId::Int(1)).await?;
//! engine.destroy(&db, &mut post).await?;
//! engine.restore(&db, &mut post).await?;
//! ```

pub mod callbacks;
pub mod clock;
pub mod infra;
pub mod registry;
pub mod scope;
pub mod service;
mod traversal;

pub use callbacks::{Callbacks, Event, Flow, Next, Operation};
#[cfg(any(test, feature = "test-utils"))]
pub use clock::MockClock;
pub use clock::{Clock, SystemClock};
pub use infra::Database;
pub use registry::{CascadeStep, EntityType, Registry, RegistryBuilder};
pub use scope::{Scope, Visibility};
pub use service::Engine;
