//! foresight-state — evaluation history store.
//!
//! Backed by [redb](https://docs.rs/redb), keeps the ordered history of
//! evaluations for every (target, model) pair and hands out monotonically
//! increasing evaluation IDs.
//!
//! # Architecture
//!
//! Evaluations are JSON-serialized into redb's `&[u8]` value columns under
//! composite keys `{target}:{model}:{id}`, with the ID zero-padded so a
//! prefix scan yields a history in ID order. A separate counter table keyed
//! by `{target}:{model}` tracks the next ID, so IDs are never reused even
//! after the history is pruned.
//!
//! The `EvaluationStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across blocking tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::EvaluationStore;
