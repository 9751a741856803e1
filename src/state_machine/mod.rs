// State machine module for the cluster lifecycle
//
// Status values, the events that move them, and the single transition table
// that every status change goes through.

pub mod cluster_state_machine;
pub mod events;
pub mod states;

pub use cluster_state_machine::ClusterStateMachine;
pub use events::ClusterEvent;
pub use states::ClusterStatus;
