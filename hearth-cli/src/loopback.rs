use anyhow::{Context, Result, anyhow, bail};
use axum::{
    Router,
    extract::{OriginalUri, State},
    response::Html,
    routing::get,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use url::Url;

/// How long `login` waits for the browser to come back
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

const DONE_PAGE: &str = "<!doctype html><title>Hearth</title>\
    <p>Login received. You can close this window and return to the terminal.</p>";

/// One-shot HTTP listener bound to the redirect URI's host and port
///
/// Bind it before sending the user to the authorization server, so that the
/// redirect cannot arrive before anyone listens.
pub struct LoopbackListener {
    redirect_uri: Url,
    listener: TcpListener,
}

impl LoopbackListener {
    pub async fn bind(redirect_uri: &Url) -> Result<Self> {
        if redirect_uri.scheme() != "http" {
            bail!("redirect uri must be a plain http loopback address: {redirect_uri}");
        }
        let host = redirect_uri
            .host_str()
            .context("redirect uri has no host")?;
        if !matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
            bail!("redirect uri must point to this machine, got host '{host}'");
        }
        let port = redirect_uri
            .port_or_known_default()
            .context("redirect uri has no port")?;

        let listener = TcpListener::bind((host.trim_matches(['[', ']']), port))
            .await
            .with_context(|| format!("binding {host}:{port} for the login redirect"))?;
        info!("waiting for the login redirect on {redirect_uri}");
        Ok(Self {
            redirect_uri: redirect_uri.clone(),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the redirect and return the full URL the browser was sent to.
    pub async fn wait(self, timeout: Duration) -> Result<Url> {
        let (url_tx, mut url_rx) = mpsc::channel::<Url>(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route(self.redirect_uri.path(), get(receive_redirect))
            .with_state(RedirectState {
                redirect_uri: self.redirect_uri.clone(),
                url_tx,
            });

        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let received = tokio::time::timeout(timeout, url_rx.recv()).await;
        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("loopback server error: {e}"),
            Err(e) => debug!("loopback server task ended abnormally: {e}"),
        }

        match received {
            Ok(Some(url)) => Ok(url),
            Ok(None) => Err(anyhow!("loopback listener stopped before the redirect")),
            Err(_) => Err(anyhow!(
                "no login redirect received within {} seconds",
                timeout.as_secs()
            )),
        }
    }
}

#[derive(Clone)]
struct RedirectState {
    redirect_uri: Url,
    url_tx: mpsc::Sender<Url>,
}

async fn receive_redirect(
    State(state): State<RedirectState>,
    OriginalUri(uri): OriginalUri,
) -> Html<&'static str> {
    let mut url = state.redirect_uri.clone();
    url.set_query(uri.query());
    // Only the first redirect matters; later ones find the channel full or closed
    let _ = state.url_tx.try_send(url);
    Html(DONE_PAGE)
}
