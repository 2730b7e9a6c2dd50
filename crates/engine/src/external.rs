//! Seams to the peripheral collaborators: the question source and the
//! message gateway. The binary provides the concrete transports.

use core::fmt::{self, Display};
use std::sync::Arc;

use async_trait::async_trait;
use model::{Record, UserId};

/// Outcome of asking a source for one randomly selected record.
pub enum Fetch {
    Record(Record),
    Empty,
}

#[derive(Debug)]
pub enum SourceError {
    Unavailable,
}

impl Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unavailable => "The question source is unavailable right now.",
        })
    }
}

impl std::error::Error for SourceError {}

#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch_random(&self, user: UserId) -> Result<Fetch, SourceError>;
}

/// Re-establishes a source from its persisted URL, lazily at load time or
/// when the user links a new one.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn QuestionSource>, SourceError>;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Button {
    pub label: &'static str,
    pub token: &'static str,
}

/// Inline keyboard attached to an outgoing message; each button reports its
/// token back through [`MessageGateway`]'s button-press path.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug)]
pub struct GatewayError;

impl Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("message delivery failed")
    }
}

impl std::error::Error for GatewayError {}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(&self, user: UserId, text: &str, keyboard: Option<&Keyboard>) -> Result<(), GatewayError>;
}
