//! GRC Agent Registry & Lifecycle
//!
//! Agents register here, move through the lifecycle state machine, and
//! expose health snapshots the scheduler routes on.
//!
//! ```text
//! Registered ──start()──▶ Initializing ──ready──▶ Idle ◀──┐
//!                              │                  │        │
//!                              └──fail──▶ Failed  │   task completes
//!                                                 ▼        │
//!                                              Running ────┘
//!                                                 │
//!                                                 └──stop()──▶ Stopped
//! ```

#![warn(missing_docs)]

pub mod agent;
pub mod registry;

pub use agent::{cancel_pair, Agent, AgentConfig, AgentState, CancelHandle, CancelSignal};
pub use registry::{AgentHealth, AgentRegistry};
