//! Agent glue for Cadence: everything between the schedulers and the
//! reasoning engine's session.
//!
//! 1. **Tick** or **heartbeat job** fires (see `cadence-workflow`)
//! 2. **Format** a prompt (world state, job instructions, handbooks)
//! 3. **Queue** the turn on the single [`PromptQueue`]
//! 4. **Trim** the history, refresh the system prompt, submit, trim again
//!
//! Only one turn touches the shared session at any moment.

pub mod context;
pub mod orchestrator;
pub mod prompt;
pub mod queue;
pub mod runtime;

pub use context::{ContextWindow, estimate_message_chars, trim};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, TickFormatter};
pub use queue::{PromptQueue, QueueError};
pub use runtime::{
    AgentRuntime, RuntimeConfigApplyResult, RuntimeConfigChange, RuntimeConfigManager,
    RuntimeConfigUpdateResult,
};
