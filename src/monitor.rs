use axum::extract::Extension;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::mpsc;

use crate::core::types::Level;

#[derive(Debug)]
pub enum MonitorMessage {
    /// Level of last applied block
    Head(Level),
}

#[derive(Default)]
struct MonitorData {
    head_level: Option<Level>,
}

type SharedState = Arc<RwLock<MonitorData>>;

pub struct Monitor {
    port: u16,
    tx: mpsc::Sender<MonitorMessage>,
    rx: mpsc::Receiver<MonitorMessage>,
}

impl Monitor {
    pub fn new(port: u16) -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self { port, tx, rx }
    }

    pub fn sender(&self) -> mpsc::Sender<MonitorMessage> {
        self.tx.clone()
    }

    pub async fn start(&mut self) {
        let state = SharedState::default();

        self.start_server(state.clone());

        while let Some(msg) = self.rx.recv().await {
            match msg {
                MonitorMessage::Head(level) => match state.write() {
                    Ok(mut data) => data.head_level = Some(level),
                    Err(e) => tracing::error!("poisoned monitor state: {e}"),
                },
            };
        }
    }

    fn start_server(&self, state: SharedState) {
        let app = Router::new()
            .route(
                "/",
                get(|| async { "Hey there, you're probably after /status" }),
            )
            .route("/status", get(status))
            .layer(Extension(state));

        let address = SocketAddr::from(([0, 0, 0, 0], self.port));
        tokio::spawn(async move {
            tracing::info!("listening on {}", &address);

            if let Err(e) = axum::Server::bind(&address)
                .serve(app.into_make_service())
                .await
            {
                tracing::error!("monitor server stopped: {e}");
            }
        });
    }
}

async fn status(Extension(state): Extension<SharedState>) -> String {
    let level = state.read().ok().and_then(|data| data.head_level);
    match level {
        Some(level) => format!("head level: {level}"),
        None => String::from("head level: none"),
    }
}
