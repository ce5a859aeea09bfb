//! An in-memory, transactional key-value store with pessimistic concurrency
//! control: every write takes an exclusive per-key lock, held until
//! commit or abort. Waiters block behind a bounded-timeout condition
//! variable, and a wait-for graph is checked on every new wait edge so that
//! deadlocks are detected online rather than by timeout alone -- the
//! youngest transaction in the cycle (by start order) is aborted to break
//! it.
//!
//! ## Getting started
//!
//! ```rust
//! use kv::config::EngineConfig;
//! use kv::engine::Engine;
//!
//! let engine = Engine::new(EngineConfig::default());
//!
//! let txn = engine.begin().unwrap();
//! txn.put(b"a", vec![0x01]).unwrap();
//! assert_eq!(txn.get(b"a").unwrap(), Some(vec![0x01]));
//! txn.commit().unwrap();
//!
//! let check = engine.begin().unwrap();
//! assert_eq!(check.get(b"a").unwrap(), Some(vec![0x01]));
//! check.commit().unwrap();
//! ```

pub mod config;
pub mod engine;
pub mod error;
mod graph;
mod hash;
mod kvmap;
mod lock;
pub mod txn;
