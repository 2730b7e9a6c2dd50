use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::Record;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Reading,
    Meaning,
    ReverseReading,
    ReverseMeaning,
}

impl QuestionType {
    pub const ALL: [Self; 4] = [Self::Reading, Self::Meaning, Self::ReverseReading, Self::ReverseMeaning];

    /// Field holding the accepted answers for this question type. Reverse
    /// types answer with the original term, not the reading/meaning field.
    pub fn answer_field(self, record: &Record) -> &str {
        match self {
            Self::Reading => &record.reading,
            Self::Meaning => &record.meaning,
            Self::ReverseReading | Self::ReverseMeaning => &record.term,
        }
    }

    /// Field shown to the user when asking this question type.
    pub fn prompt_field(self, record: &Record) -> &str {
        match self {
            Self::Reading | Self::Meaning => &record.term,
            Self::ReverseReading => &record.reading,
            Self::ReverseMeaning => &record.meaning,
        }
    }
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reading => "reading",
            Self::Meaning => "meaning",
            Self::ReverseReading => "reverse reading",
            Self::ReverseMeaning => "reverse meaning",
        })
    }
}

/// Splits a comma-separated answer field into the normalized accepted set:
/// trimmed, lowercased, empties dropped.
pub fn normalized_answers(field: &str) -> Vec<Box<str>> {
    field
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase().into_boxed_str())
        .collect()
}

/// Normalizes an incoming reply the same way the accepted set is built.
/// Matching is exact over normalized strings; no fuzzy or partial matches.
pub fn normalize_reply(reply: &str) -> String {
    reply.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{QuestionType, normalize_reply, normalized_answers};
    use crate::Record;

    fn record() -> Record {
        Record {
            term: "Nihon".to_owned(),
            reading: "nihon, nippon".to_owned(),
            meaning: "Japan".to_owned(),
        }
    }

    #[test]
    fn forward_types_answer_with_their_field() {
        let record = record();
        assert_eq!(QuestionType::Reading.answer_field(&record), "nihon, nippon");
        assert_eq!(QuestionType::Meaning.answer_field(&record), "Japan");
    }

    #[test]
    fn reverse_types_answer_with_the_term() {
        let record = record();
        assert_eq!(QuestionType::ReverseReading.answer_field(&record), "Nihon");
        assert_eq!(QuestionType::ReverseMeaning.answer_field(&record), "Nihon");
    }

    #[test]
    fn prompt_fields_mirror_the_direction() {
        let record = record();
        assert_eq!(QuestionType::Reading.prompt_field(&record), "Nihon");
        assert_eq!(QuestionType::ReverseReading.prompt_field(&record), "nihon, nippon");
        assert_eq!(QuestionType::ReverseMeaning.prompt_field(&record), "Japan");
    }

    #[test]
    fn answers_are_split_trimmed_and_lowercased() {
        let answers = normalized_answers(" Sun ,  MOON ,, star ");
        let answers: Vec<_> = answers.iter().map(AsRef::as_ref).collect();
        assert_eq!(answers, ["sun", "moon", "star"]);
    }

    #[test]
    fn replies_normalize_like_answers() {
        assert_eq!(normalize_reply("  MoOn "), "moon");
        assert!(normalized_answers("Sun, Moon").iter().any(|a| a.as_ref() == normalize_reply(" MOON ")));
    }
}
