//! Property derivation engine.
//!
//! A derivation declares how one field property is computed from the live
//! form value. The engine splits into focused pieces:
//!
//! - [`collector`]: pure walk of the field tree into a flat entry collection
//! - [`store`]: per-field override signals consumed by field renderers
//! - [`applicator`]: evaluates one collection pass against a value snapshot
//! - [`orchestrator`]: reactive wiring plus the immediate and debounced
//!   pipelines

mod applicator;
mod collector;
mod entry;
mod orchestrator;
mod store;

pub use applicator::{ApplyOutcome, PropertyDerivationApplicator};
pub use collector::collect_entries;
pub use entry::{
    DEFAULT_DEBOUNCE_MS, Dependencies, PropertyDerivationCollection, PropertyDerivationEntry,
    extract_expression_deps,
};
pub use orchestrator::{DerivationOrchestrator, SAMPLE_WINDOW_MS};
pub use store::PropertyOverrideStore;
