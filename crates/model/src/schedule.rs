use core::fmt::{self, Display};
use core::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::question::QuestionType;

/// Daily time range during which automatic delivery is suppressed. The
/// window may span midnight.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct QuietWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietWindow {
    /// Whether `now` falls inside the window. When `start <= end` the window
    /// is the plain closed range; otherwise it wraps midnight and holds for
    /// `now >= start || now <= end`.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

impl FromStr for QuietWindow {
    type Err = ParseWindowError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (start, end) = text.trim().split_once('-').ok_or(ParseWindowError)?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| ParseWindowError)?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| ParseWindowError)?;
        Ok(Self { start, end })
    }
}

impl Display for QuietWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParseWindowError;

impl Display for ParseWindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid format. Use HH:MM-HH:MM (e.g. 22:00-07:00).")
    }
}

/// How the question type of the next question is chosen.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionMode {
    Fixed(QuestionType),
    /// Uniform draw over the enabled pool in [`ScheduleConfig::random_pool`].
    Random,
}

/// Per-user configuration. Created on first settings interaction, mutated by
/// settings commands, persisted after every mutation, never deleted. Every
/// field carries a serde default so older settings files still load.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between automatic questions; unset means no schedule can run.
    #[serde(default)]
    pub interval_minutes: Option<u32>,
    /// Answer deadline in minutes; zero disables the watchdog.
    #[serde(default)]
    pub timeout_minutes: u32,
    #[serde(default)]
    pub quiet: Option<QuietWindow>,
    /// Gates scheduler-originated delivery only; manual questions are
    /// unaffected.
    #[serde(default = "default_auto_send")]
    pub auto_send: bool,
    #[serde(default = "default_mode")]
    pub mode: QuestionMode,
    /// Whether random mode may draw reverse variants is a configuration
    /// choice, so the pool is explicit rather than hardcoded.
    #[serde(default = "default_random_pool")]
    pub random_pool: Vec<QuestionType>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: None,
            timeout_minutes: 0,
            quiet: None,
            auto_send: default_auto_send(),
            mode: default_mode(),
            random_pool: default_random_pool(),
        }
    }
}

fn default_auto_send() -> bool {
    true
}

const fn default_mode() -> QuestionMode {
    QuestionMode::Random
}

fn default_random_pool() -> Vec<QuestionType> {
    vec![QuestionType::Reading, QuestionType::Meaning]
}

#[cfg(test)]
mod tests {
    use super::{QuestionMode, QuietWindow, ScheduleConfig};
    use crate::question::QuestionType;

    fn window(text: &str) -> QuietWindow {
        text.parse().unwrap()
    }

    fn time(text: &str) -> chrono::NaiveTime {
        chrono::NaiveTime::parse_from_str(text, "%H:%M").unwrap()
    }

    #[test]
    fn plain_window_is_a_closed_range() {
        let quiet = window("09:00-17:00");
        assert!(quiet.contains(time("09:00")));
        assert!(quiet.contains(time("12:30")));
        assert!(quiet.contains(time("17:00")));
        assert!(!quiet.contains(time("08:59")));
        assert!(!quiet.contains(time("17:01")));
    }

    #[test]
    fn midnight_wrap_covers_both_sides() {
        let quiet = window("22:00-07:00");
        assert!(quiet.contains(time("22:00")));
        assert!(quiet.contains(time("23:59")));
        assert!(quiet.contains(time("00:00")));
        assert!(quiet.contains(time("03:00")));
        assert!(quiet.contains(time("07:00")));
        assert!(!quiet.contains(time("07:01")));
        assert!(!quiet.contains(time("12:00")));
        assert!(!quiet.contains(time("21:59")));
    }

    #[test]
    fn scenario_quiet_at_half_past_eleven_but_not_mid_morning() {
        let quiet = window("23:00-06:00");
        assert!(quiet.contains(time("23:30")));
        assert!(!quiet.contains(time("10:00")));
    }

    #[test]
    fn window_round_trips_through_display() {
        let quiet = window("22:00-07:00");
        assert_eq!(quiet.to_string(), "22:00-07:00");
        assert_eq!(quiet.to_string().parse::<QuietWindow>().unwrap(), quiet);
    }

    #[test]
    fn malformed_windows_are_rejected() {
        assert!("22:00".parse::<QuietWindow>().is_err());
        assert!("25:00-07:00".parse::<QuietWindow>().is_err());
        assert!("22:00/07:00".parse::<QuietWindow>().is_err());
    }

    #[test]
    fn config_defaults_survive_a_sparse_document() {
        let config: ScheduleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ScheduleConfig::default());
        assert!(config.auto_send);
        assert_eq!(config.mode, QuestionMode::Random);
        assert_eq!(config.random_pool, [QuestionType::Reading, QuestionType::Meaning]);
    }

    #[test]
    fn config_round_trips_with_all_fields_set() {
        let config = ScheduleConfig {
            interval_minutes: Some(15),
            timeout_minutes: 5,
            quiet: Some(window("23:00-06:00")),
            auto_send: false,
            mode: QuestionMode::Fixed(QuestionType::ReverseMeaning),
            random_pool: QuestionType::ALL.to_vec(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<ScheduleConfig>(&json).unwrap(), config);
    }
}
