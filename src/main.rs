mod gateway;
mod service;
mod source;
mod telegram;

use std::convert::Infallible;
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use engine::Engine;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use store::JsonFileStore;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use crate::gateway::TelegramGateway;
use crate::service::App;
use crate::source::SheetConnector;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parse environment variables
    let port: u16 = env::var("PORT")?.parse()?;
    let token = env::var("BOT_TOKEN")?;
    let settings_path = env::var("SETTINGS_PATH").unwrap_or_else(|_| "user_settings.json".to_owned());
    let secret = env::var("WEBHOOK_SECRET").ok();

    let runtime = Runtime::new()?;
    runtime.block_on(run(port, &token, settings_path, secret))
}

async fn run(port: u16, token: &str, settings_path: String, secret: Option<String>) -> anyhow::Result<()> {
    let gateway = Arc::new(TelegramGateway::new(token));
    let connector = Arc::new(SheetConnector::new());
    let store = Arc::new(JsonFileStore::new(settings_path));

    // Restore persisted users and resume their schedules before accepting
    // any webhook traffic.
    let engine = Engine::new(
        Arc::clone(&gateway) as Arc<dyn engine::external::MessageGateway>,
        connector,
        store,
    );
    engine.bootstrap().await?;

    let app = Arc::new(App { engine, gateway, secret: secret.map(Into::into) });
    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");

    loop {
        let (stream, _) = tokio::select! {
            conn = listener.accept() => conn?,
            res = tokio::signal::ctrl_c() => {
                res?;
                log::info!("shutting down");
                break;
            }
        };

        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let app = Arc::clone(&app);
                async move {
                    let status = match service::try_respond(req, &app).await {
                        Ok(()) => StatusCode::OK,
                        Err(code) => code,
                    };
                    let mut response = Response::new(Empty::<Bytes>::new());
                    *response.status_mut() = status;
                    Ok::<_, Infallible>(response)
                }
            });
            if let Err(err) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                log::error!("connection error: {err}");
            }
        });
    }
    Ok(())
}
