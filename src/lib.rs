#![deny(missing_docs)]
//! Target-Flow: an incremental, dependency-driven update engine for live,
//! versioned records.
//!
//! A registry of named *targets*, each depending on zero or more *facts*
//! (externally stored data with monotonically increasing version stamps)
//! and/or other targets, each carrying an optional update script. When an
//! update is requested for a target, the resolver walks the target's
//! precomputed topological dependency order, decides staleness by stamp
//! comparison, runs update scripts only where needed, and commits the whole
//! pass as one fact-store transaction, rolling back and restoring the prior
//! stamp bookkeeping on any failure.
//!
//! The same problem a build system solves (targets, staleness, topological
//! re-execution), applied to live mutable records instead of files, with the
//! store's transaction providing all-or-nothing semantics per request.
//!
//! # Key properties
//!
//! - **Stamp-driven staleness**: a target re-runs only when a tracked fact or
//!   a dependency target carries a newer stamp than it last observed.
//! - **Conservative default**: a target with no fact dependency cannot prove
//!   freshness and is re-run every time it is reached.
//! - **Atomic passes**: one request, one transaction; a failing script or
//!   commit leaves every stamp exactly as it was before the attempt.
//! - **External collaborators**: the fact store ([`FactStore`]) and the
//!   scripting engine ([`ScriptBackend`] / [`UpdateScript`]) are boundary
//!   traits; the crate ships [`MemoryFactStore`] as a stock store.
//!
//! # Example
//!
//! ```ignore
//! use target_flow::{Resolver, TargetDecl};
//!
//! let decls = vec![
//!     TargetDecl::new("routing").depends_on("$zones").with_script("lua", source),
//!     TargetDecl::new("accounting").depends_on("routing").depends_on("$calls"),
//! ];
//! let mut resolver = Resolver::new(store, &backend, decls, Some("routing".into()))?;
//! resolver.update_by_name("accounting")?;
//! ```
//!
//! # Concurrency
//!
//! Single-threaded and synchronous: no internal locking, no
//! cancellation, no timeouts. Callers serialize update requests; bounded
//! script execution time is the scripting backend's responsibility.

mod error;
mod graph;
mod resolver;
mod script;
mod stamp;
mod store;
mod target;

pub use error::{ResolverError, ScriptCreateError, StoreError};
pub use resolver::{Resolver, UpdateOutcome};
pub use script::{ScriptBackend, ScriptContext, ScriptOutcome, UpdateScript};
pub use stamp::Stamp;
pub use store::{FactStore, MemoryFactStore, TxHandle};
pub use target::{FactId, ScriptDecl, TargetDecl, TargetId, FACT_SIGIL};
