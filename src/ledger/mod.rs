//! Cross-run fingerprint ledger.
//!
//! The ledger remembers, for every relative path ever seen under a backup
//! root, the fingerprint it had the last time it was observed. It is the
//! only state that outlives a single run, and it is what lets a new run
//! recognize files that were already captured unchanged.
//!
//! # Architecture
//!
//! The ledger is split into two components:
//!
//! * [`data`]: The in-memory [`Ledger`] value passed into and returned from
//!   classification.
//! * [`store`]: JSON persistence with atomic replacement.
//!
//! # Concurrency
//!
//! The store is not designed for concurrent writers. Two runs saving against
//! the same backup root at the same time race on the whole mapping and the
//! last writer wins. Callers must run one backup at a time per root.

pub mod data;
pub mod store;

pub use data::Ledger;
pub use store::{LedgerError, LedgerStatus, LedgerStore, LoadedLedger, LEDGER_FILE_NAME};
