//! Conversation list and active-conversation state
//!
//! The registry owns structural state (which conversations exist, which one is
//! active); the session owns the messages of the active one.

pub mod registry;
pub mod session;
mod writer;

pub use registry::ConversationRegistry;
pub use session::{ConversationSession, SendOutcome};
