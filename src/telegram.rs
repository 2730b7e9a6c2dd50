//! Minimal serde subset of the Telegram Bot API: just the update shapes the
//! webhook receives and the payloads the gateway posts back.

use serde::{Deserialize, Serialize};

use engine::external::Keyboard;

#[derive(Deserialize, Debug)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize, Debug)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct User {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

impl CallbackQuery {
    /// Chat the pressed button lives in; private chats fall back to the
    /// pressing user when the original message is no longer available.
    pub fn chat_id(&self) -> i64 {
        self.message.as_ref().map_or(self.from.id, |message| message.chat.id)
    }
}

#[derive(Serialize, Debug)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<ReplyMarkup>,
}

#[derive(Serialize, Debug)]
pub struct ReplyMarkup {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Serialize, Debug)]
pub struct InlineButton {
    pub text: &'static str,
    pub callback_data: &'static str,
}

impl From<&Keyboard> for ReplyMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        let inline_keyboard = keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter().map(|button| InlineButton { text: button.label, callback_data: button.token }).collect()
            })
            .collect();
        Self { inline_keyboard }
    }
}

#[derive(Serialize, Debug)]
pub struct AnswerCallbackQuery<'a> {
    pub callback_query_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::{SendMessage, Update};
    use engine::external::{Button, Keyboard};

    #[test]
    fn text_message_update_parses() {
        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 10,
                "message": { "message_id": 1, "chat": { "id": 42, "type": "private" }, "text": "nihon" }
            }"#,
        )
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("nihon"));
        assert!(update.callback_query.is_none());
    }

    #[test]
    fn callback_update_parses_and_resolves_its_chat() {
        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 11,
                "callback_query": {
                    "id": "abc",
                    "from": { "id": 7, "is_bot": false, "first_name": "x" },
                    "message": { "message_id": 2, "chat": { "id": 42, "type": "private" } },
                    "data": "next"
                }
            }"#,
        )
        .unwrap();
        let callback = update.callback_query.unwrap();
        assert_eq!(callback.chat_id(), 42);
        assert_eq!(callback.data.as_deref(), Some("next"));
    }

    #[test]
    fn send_message_omits_an_absent_keyboard() {
        let bare = serde_json::to_value(SendMessage { chat_id: 42, text: "hi", reply_markup: None }).unwrap();
        assert!(bare.get("reply_markup").is_none());

        let keyboard = Keyboard { rows: vec![vec![Button { label: "Next question", token: "next" }]] };
        let with = serde_json::to_value(SendMessage {
            chat_id: 42,
            text: "hi",
            reply_markup: Some((&keyboard).into()),
        })
        .unwrap();
        assert_eq!(with["reply_markup"]["inline_keyboard"][0][0]["callback_data"], "next");
    }
}
