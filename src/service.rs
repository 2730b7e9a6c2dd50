use std::sync::Arc;

use engine::Engine;
use http_body_util::BodyExt;
use hyper::{Method, Request, StatusCode, Uri, body::Body};
use model::UserId;

use crate::gateway::TelegramGateway;
use crate::telegram::Update;

pub struct App {
    pub engine: Engine,
    pub gateway: Arc<TelegramGateway>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`, when webhook
    /// authentication is configured.
    pub secret: Option<Box<str>>,
}

pub async fn try_respond<B: Body>(req: Request<B>, app: &App) -> Result<(), StatusCode> {
    // Disable all non-`POST` requests
    if req.method() != Method::POST {
        return Err(StatusCode::METHOD_NOT_ALLOWED);
    }

    // Telegram only ever posts to the webhook root.
    if req.uri() != &Uri::from_static("/") {
        return Err(StatusCode::NOT_FOUND);
    }

    if let Some(expected) = app.secret.as_deref() {
        let token = req
            .headers()
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|value| value.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;
        if token != expected {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    // Parse the incoming update
    let bytes =
        req.into_body().collect().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.to_bytes();
    let update: Update = serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;
    log::debug!("update {} received", update.update_id);

    if let Some(callback) = update.callback_query {
        // Answer first so the button stops spinning even if handling stalls.
        app.gateway.acknowledge(&callback.id).await;
        let user = UserId(callback.chat_id());
        if let Some(token) = callback.data.as_deref() {
            app.engine.on_button(user, token).await;
        }
        return Ok(());
    }

    let Some(message) = update.message else {
        log::debug!("update {} carries nothing to handle", update.update_id);
        return Ok(());
    };
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };

    let user = UserId(message.chat.id);
    if let Some(command) = text.trim().strip_prefix('/') {
        match command {
            "start" | "help" => app.engine.show_menu(user).await,
            // Text aliases for their menu buttons.
            "quiz" | "stopquizauto" => app.engine.on_button(user, command).await,
            _ => log::debug!("{user}: ignoring unknown command /{command}"),
        }
    } else {
        app.engine.on_reply(user, text).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use engine::Engine;
    use engine::external::{GatewayError, Keyboard, MessageGateway, QuestionSource, SourceConnector, SourceError};
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::{Method, Request};
    use model::UserId;
    use store::{SettingsStore, UserSettings};

    use super::{App, try_respond};
    use crate::gateway::TelegramGateway;

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingGateway {
        fn count(&self, needle: &str) -> usize {
            self.sent.lock().unwrap().iter().filter(|text| text.contains(needle)).count()
        }
    }

    #[async_trait]
    impl MessageGateway for RecordingGateway {
        async fn send(&self, _: UserId, text: &str, _: Option<&Keyboard>) -> Result<(), GatewayError> {
            self.sent.lock().unwrap().push(text.to_owned());
            Ok(())
        }
    }

    struct NoConnector;

    #[async_trait]
    impl SourceConnector for NoConnector {
        async fn connect(&self, _: &str) -> Result<Arc<dyn QuestionSource>, SourceError> {
            Err(SourceError::Unavailable)
        }
    }

    struct NullStore;

    #[async_trait]
    impl SettingsStore for NullStore {
        async fn load_all(&self) -> store::error::Result<HashMap<UserId, UserSettings>> {
            Ok(HashMap::new())
        }

        async fn save(&self, _: UserId, _: &UserSettings) -> store::error::Result<()> {
            Ok(())
        }
    }

    fn app() -> (App, Arc<RecordingGateway>) {
        let recorder = Arc::new(RecordingGateway::default());
        let engine = Engine::new(
            Arc::clone(&recorder) as Arc<dyn engine::external::MessageGateway>,
            Arc::new(NoConnector),
            Arc::new(NullStore),
        );
        (App { engine, gateway: Arc::new(TelegramGateway::new("unused")), secret: None }, recorder)
    }

    fn update(text: &str) -> Request<Full<Bytes>> {
        let json = format!(
            r#"{{ "update_id": 1, "message": {{ "message_id": 1, "chat": {{ "id": 42, "type": "private" }}, "text": "{text}" }} }}"#
        );
        Request::builder().method(Method::POST).uri("/").body(Full::new(Bytes::from(json))).unwrap()
    }

    #[tokio::test]
    async fn help_shows_the_menu_like_start() {
        let (app, recorder) = app();
        try_respond(update("/help"), &app).await.unwrap();
        try_respond(update("/start"), &app).await.unwrap();
        assert_eq!(recorder.count("Pick a command below"), 2);
    }

    #[tokio::test]
    async fn text_command_aliases_route_to_their_buttons() {
        let (app, recorder) = app();
        try_respond(update("/quiz"), &app).await.unwrap();
        assert_eq!(recorder.count("No question interval is configured."), 1);
        try_respond(update("/stopquizauto"), &app).await.unwrap();
        assert_eq!(recorder.count("Automatic sending disabled."), 1);
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        let (app, recorder) = app();
        try_respond(update("/frobnicate"), &app).await.unwrap();
        assert_eq!(recorder.sent.lock().unwrap().len(), 0);
    }
}
