pub mod service;
pub mod sessions;

pub use service::{ChatService, StartedSession};
pub use sessions::{ChatSession, SessionRegistry};
