//! Wire event protocol for the agent gateway: the `Event` tagged union (spec §3) plus
//! stream-local sequencing. Depends on nothing else in the workspace so every other crate
//! can treat this as the shared wire contract.

pub mod event;
pub mod sequence;

pub use event::{Event, PartialBlock, PermissionDecision, StopReason, ToolResultStatus, Usage};
pub use sequence::{Sequencer, SequencedEvent};
