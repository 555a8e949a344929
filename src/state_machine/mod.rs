// Report lifecycle state machine
//
// States, events and the transition table for reports, plus the persisting
// `ReportStateMachine` that applies transitions through a `ReportRepository`.

pub mod actions;
pub mod errors;
pub mod events;
pub mod guards;
pub mod report_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::ReportEvent;
pub use report_state_machine::ReportStateMachine;
pub use states::ReportState;
