use model::{QuestionMode, QuestionType};

use crate::external::{Button, Keyboard};

/// Button tokens understood by the router. Everything the menu keyboard can
/// emit parses into one of these.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Command {
    Setup,
    StartSchedule,
    NextQuestion,
    ChooseMode,
    SetMode(QuestionMode),
    SetInterval,
    SetTimeout,
    SetQuietWindow,
    ShowSettings,
    StopSchedule,
    StopAutoSend,
}

impl Command {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "setup" => Self::Setup,
            "quiz" => Self::StartSchedule,
            "next" => Self::NextQuestion,
            "setmode" => Self::ChooseMode,
            "setinterval" => Self::SetInterval,
            "settimeout" => Self::SetTimeout,
            "setquietinterval" => Self::SetQuietWindow,
            "settings" => Self::ShowSettings,
            "stopquiz" => Self::StopSchedule,
            "stopquizauto" => Self::StopAutoSend,
            "mode_random" => Self::SetMode(QuestionMode::Random),
            "mode_reading" => Self::SetMode(QuestionMode::Fixed(QuestionType::Reading)),
            "mode_meaning" => Self::SetMode(QuestionMode::Fixed(QuestionType::Meaning)),
            "mode_reverse_reading" => Self::SetMode(QuestionMode::Fixed(QuestionType::ReverseReading)),
            "mode_reverse_meaning" => Self::SetMode(QuestionMode::Fixed(QuestionType::ReverseMeaning)),
            _ => return None,
        })
    }
}

/// One button per row, like the command menu of the bot.
pub(crate) fn command_keyboard() -> Keyboard {
    const COMMANDS: [Button; 10] = [
        Button { label: "Set up question source", token: "setup" },
        Button { label: "Start schedule", token: "quiz" },
        Button { label: "Next question", token: "next" },
        Button { label: "Set question mode", token: "setmode" },
        Button { label: "Set question interval", token: "setinterval" },
        Button { label: "Set answer timeout", token: "settimeout" },
        Button { label: "Set quiet window", token: "setquietinterval" },
        Button { label: "Show current settings", token: "settings" },
        Button { label: "Stop schedule", token: "stopquiz" },
        Button { label: "Stop automatic sending", token: "stopquizauto" },
    ];
    Keyboard { rows: COMMANDS.iter().map(|&button| vec![button]).collect() }
}

pub(crate) fn mode_keyboard() -> Keyboard {
    const MODES: [Button; 5] = [
        Button { label: "Reading", token: "mode_reading" },
        Button { label: "Meaning", token: "mode_meaning" },
        Button { label: "Reverse reading", token: "mode_reverse_reading" },
        Button { label: "Reverse meaning", token: "mode_reverse_meaning" },
        Button { label: "Random", token: "mode_random" },
    ];
    Keyboard { rows: vec![MODES.to_vec()] }
}

#[cfg(test)]
mod tests {
    use super::{Command, command_keyboard, mode_keyboard};
    use model::{QuestionMode, QuestionType};

    #[test]
    fn every_menu_button_parses() {
        for row in command_keyboard().rows.iter().chain(mode_keyboard().rows.iter()) {
            for button in row {
                assert!(Command::parse(button.token).is_some(), "unparsed token {:?}", button.token);
            }
        }
    }

    #[test]
    fn mode_tokens_carry_their_payload() {
        assert_eq!(Command::parse("mode_random"), Some(Command::SetMode(QuestionMode::Random)));
        assert_eq!(
            Command::parse("mode_reverse_reading"),
            Some(Command::SetMode(QuestionMode::Fixed(QuestionType::ReverseReading)))
        );
        assert_eq!(Command::parse("mode_bogus"), None);
    }
}
