pub mod question;
pub mod schedule;

use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub use question::{QuestionType, normalize_reply, normalized_answers};
pub use schedule::{QuestionMode, QuietWindow, ScheduleConfig};

/// Opaque per-chat identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One vocabulary row from a question source. The field aliases accept the
/// column headers of a published sheet export verbatim.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Record {
    #[serde(alias = "Kanji")]
    pub term: String,
    #[serde(alias = "Reading")]
    pub reading: String,
    #[serde(alias = "Meaning")]
    pub meaning: String,
}
