//! Protocol-aware sleeper proxy.
//!
//! Impersonates stopped game servers on the wire: answers server-list status
//! pings with a synthetic "sleeping" response at zero VM cost, and turns the
//! first real login attempt into a wake request against the orchestrator.

pub mod codec;
pub mod directory;
pub mod listener;
pub mod metrics;
pub mod packet;
pub mod status;

pub use directory::{ServerDirectory, SleeperView, ViewState, WakeRefusal};
pub use listener::{serve, subdomain_of};
pub use status::{SLEEPING_SUFFIX, sleeping_status};
