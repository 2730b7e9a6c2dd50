use core::fmt::{self, Display};

/// Non-fatal faults surfaced to the user as guidance. Delivery paths log
/// these and carry on with the next cycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    NoSource,
    NoInterval,
    SourceUnavailable,
    SourceEmpty,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoSource => "No question source is linked yet. Use the setup button first.",
            Self::NoInterval => "No question interval is configured. Set an interval first.",
            Self::SourceUnavailable => "The question source is unavailable right now.",
            Self::SourceEmpty => "The question source has no usable records.",
        })
    }
}

pub type Result<T> = core::result::Result<T, Error>;
