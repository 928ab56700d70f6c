//! # Surmise - Property-Based Testing over Choice Sequences
//!
//! Surmise generates test inputs from a replayable stream of integer choices.
//! Every value a [`Possibility`] produces is a deterministic function of the
//! choices it drew, so shrinking a failure means shrinking its choice
//! sequence: shorter first, then lexicographically smaller. Minimal failing
//! sequences can be persisted and replayed first on the next run.
//!
//! ## Quick Start
//!
//! ```rust
//! use surmise::{Config, Property, integers, vectors};
//!
//! let outcome = Property::new("sum_is_small", vectors(integers(0u32, 100)), |v: Vec<u32>| {
//!     v.iter().sum::<u32>() < 150
//! })
//! .config(Config::new().seed(7))
//! .check()
//! .unwrap();
//!
//! // The minimal counterexample is found and shrunk
//! assert!(outcome.is_falsified());
//! assert_eq!(outcome.value().map(|v| v.iter().sum::<u32>()), Some(150));
//! ```
//!
//! Predicates may also return `Result`, panic, or reject inputs:
//!
//! ```rust
//! use surmise::{Property, Stop, assume, integers};
//!
//! let outcome = Property::new("even_halves", integers(0i64, 1000), |x: i64| -> Result<bool, Stop> {
//!     assume(x % 2 == 0)?;
//!     Ok((x / 2) * 2 == x)
//! })
//! .seed(3)
//! .check()
//! .unwrap();
//! assert!(outcome.is_pass());
//! ```

pub mod attempt;
pub mod config;
pub mod context;
pub(crate) mod engine;
pub mod error;
pub mod outcome;
pub mod possibility;
pub mod primitives;
pub mod property;
pub mod rng;
pub mod shrink;
pub mod statistics;
pub mod store;

// Re-export the main public API
pub use attempt::{Attempt, Event, Span, Status};
pub use config::{
    Config, ConfigError, DEFAULT_STORE_DIR, ErrorComparator, StoreSetting, default_config,
    set_default_config, with_default_config,
};
pub use context::{assume, event, in_attempt, labeled_event, reject, target};
pub use error::{Diagnostic, ErrorInfo, Stop, StoreError};
pub use outcome::{Counterexample, Outcome, Record, Replay, Verdict};
pub use possibility::{Boxed, Possibility, named};
pub use primitives::*;
pub use property::{Judge, Judgement, Property, check, check_with_config};
pub use shrink::simpler;
pub use statistics::{EventTally, RunStats};
pub use store::{DirectoryStore, ExampleKind, ExampleStore, InMemoryStore, StoredExample};
