//! The handles user code holds: stages, shared stages, events, and the join
//! combinators built on them.

mod combinators;
mod event;
mod local;
mod shared;
mod stage;

pub use combinators::{combine, when_all, when_all_iter};
pub use event::Event;
pub use local::{LocalStage, local_spawn, local_spawn_on};
pub use shared::SharedStage;
pub use stage::{Stage, spawn, spawn_flat, spawn_flat_on, spawn_on};
