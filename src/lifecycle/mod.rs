//! Lifecycle state machine - safe reconfiguration of a live form.
//!
//! A configuration swap must not lose uncommitted user input, must not
//! double-render, and must not let the old and new field trees race. The
//! machine is split the way the rendering pipeline is split elsewhere in
//! this codebase: pure computation ([`machine::transition`]) behind a
//! stateful driver ([`LifecycleDriver`]) that owns sequencing and effects.

mod driver;
mod machine;
mod state;

pub use driver::LifecycleDriver;
pub use machine::transition;
pub use state::{Action, LifecycleState, SideEffect, TransitionPhase, TransitionRecord};
