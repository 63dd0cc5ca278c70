use hearth_auth::client::UserAgent;
use tracing::{debug, warn};
use url::Url;

/// Opens pages in the system browser
///
/// A terminal has no address bar to rewrite, so `replace_location` only logs.
#[derive(Debug, Default)]
pub struct BrowserUserAgent;

impl UserAgent for BrowserUserAgent {
    fn navigate(&self, url: &Url) {
        eprintln!("Opening {url}");
        if let Err(e) = webbrowser::open(url.as_str()) {
            warn!("could not open a browser: {e}");
            eprintln!("Open the URL above in a browser to continue.");
        }
    }

    fn replace_location(&self, url: &Url) {
        debug!("location now {url}");
    }

    fn alert(&self, message: &str) {
        eprintln!("{message}");
    }
}
