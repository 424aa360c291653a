//! Cache control engine.
//!
//! Four independent tiers can be flushed or purged:
//!
//! - **http**: the edge cache in front of the site, reached over HTTP
//! - **object**: the in-process object cache
//! - **opcode**: compiled code and templates
//! - **transient**: expiring values persisted in the options table
//!
//! ## Flow
//!
//! 1. [`CacheHooks`] maps host events and option changes to tiers through the
//!    static [`TriggerMap`]
//! 2. [`CacheControl`] de-duplicates within the current execution and calls
//!    the [`CacheDriver`]s
//! 3. the http driver encodes requests for the edge through [`EdgeTransport`]
//! 4. at the end of the execution, [`CacheControl::shutdown`] repeats every
//!    flush that succeeded
//!
//! The binary does not dispatch host events itself. [`CacheHooks`] is the
//! library entry point for a host that does; the REST route, the web flush
//! trigger and the CLI call [`CacheControl`] directly.

mod control;
pub mod drivers;
pub mod edge;
mod events;
mod ledger;
pub(crate) mod lock;
mod middleware;
mod shutdown;
mod trigger;
mod urls;

pub use control::{CacheControl, FlushReport};
pub use drivers::{CacheDriver, DriverError, DriverSet, FlushOutcome};
pub use edge::{EdgeRequest, EdgeTarget, EdgeTransport, ReqwestTransport};
pub use events::{CacheEvent, CacheObserver, EventKind};
pub use ledger::{normalize_url, normalize_urls};
pub use middleware::{CacheState, execution_scope};
pub use shutdown::DeferredQueue;
pub use trigger::{CacheHooks, TriggerMap};
pub use urls::content_urls;
