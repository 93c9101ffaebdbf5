//! Storage Module
//!
//! The shared key-value map and the background task that keeps expired
//! entries from accumulating.
//!
//! ```text
//!   Connection tasks            Sweeper task
//!   (get / set)                 (purge_expired every 100ms)
//!        │                           │
//!        ▼                           ▼
//! ┌─────────────────────────────────────────┐
//! │                 Store                   │
//! │       Mutex<HashMap<Bytes, Entry>>      │
//! └─────────────────────────────────────────┘
//! ```

pub mod expiry;
pub mod store;

pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use store::{Entry, Store, StoreStats};
