mod commands;
mod engine;
pub mod error;
pub mod external;
mod session;
mod state;

pub use engine::Engine;
pub use session::SessionId;
