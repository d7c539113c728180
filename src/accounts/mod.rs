//! Account management: the credential pool behind the crawl engine
//!
//! # Components
//!
//! - `AccountState` / `Account`: lifecycle state machine for one credential
//! - `CooldownPolicy`: ban threshold and exponential backoff parameters
//! - `AccountPool`: concurrent checkout of authenticated sessions

mod pool;
mod state;

pub use pool::{AccountLease, AccountPool, PoolError, ReleaseOutcome};
pub use state::{Account, AccountState, CooldownPolicy, Credentials};
