//! # Cadence Core
//!
//! Domain types, collaborator traits, and error definitions for the Cadence
//! agent scheduler. The scheduling crates never talk to a reasoning engine or
//! a game directly; they go through the traits defined here.
//!
//! ## Collaborators
//!
//! - [`Session`]: the reasoning engine's single shared conversation
//! - [`WorldAdapter`]: supplies world-state snapshots for tick prompts
//!
//! Implementations live in the embedding application (or in test mocks).

pub mod error;
pub mod message;
pub mod session;
pub mod world;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, SessionError, WorldError};
pub use message::{Content, ContentBlock, Message, Role};
pub use session::{Session, ToolDefinition};
pub use world::WorldAdapter;
