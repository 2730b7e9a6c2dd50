use async_trait::async_trait;
use engine::external::{GatewayError, Keyboard, MessageGateway};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use model::UserId;
use serde::Serialize;

use crate::telegram::{AnswerCallbackQuery, ReplyMarkup, SendMessage};

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

pub fn https_client() -> HttpsClient {
    Client::builder(TokioExecutor::new()).build(HttpsConnector::new())
}

/// Outbound half of the Bot API: JSON posts against the per-bot endpoint.
pub struct TelegramGateway {
    /// `https://api.telegram.org/bot<token>/`, trailing slash included.
    prefix: Box<str>,
    client: HttpsClient,
}

impl TelegramGateway {
    pub fn new(token: &str) -> Self {
        Self { prefix: format!("https://api.telegram.org/bot{token}/").into(), client: https_client() }
    }

    async fn post<T: Serialize>(&self, method: &str, payload: &T) -> Result<(), GatewayError> {
        let uri: Uri = [self.prefix.as_ref(), method].concat().parse().map_err(|_| GatewayError)?;
        let json = serde_json::to_vec(payload).map_err(|_| GatewayError)?;
        let request = Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(json)))
            .map_err(|_| GatewayError)?;

        let response = self.client.request(request).await.map_err(|_| GatewayError)?;
        let status = response.status();
        // Drain the body so the connection is reusable.
        let _ = response.into_body().collect().await;
        if status.is_success() {
            Ok(())
        } else {
            log::warn!("telegram responded {status} to {method}");
            Err(GatewayError)
        }
    }

    /// Telegram keeps the pressed button in a loading state until its
    /// callback query is answered.
    pub async fn acknowledge(&self, callback_id: &str) {
        let payload = AnswerCallbackQuery { callback_query_id: callback_id };
        if let Err(err) = self.post("answerCallbackQuery", &payload).await {
            log::warn!("failed to answer callback query: {err}");
        }
    }
}

#[async_trait]
impl MessageGateway for TelegramGateway {
    async fn send(&self, user: UserId, text: &str, keyboard: Option<&Keyboard>) -> Result<(), GatewayError> {
        let payload = SendMessage { chat_id: user.0, text, reply_markup: keyboard.map(ReplyMarkup::from) };
        self.post("sendMessage", &payload).await
    }
}
