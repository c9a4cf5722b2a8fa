//! Navigation side effects
//!
//! Logout and the callback flow end by sending the user somewhere else (the
//! provider's end-session page, the landing route, the login route). The host
//! application decides what "navigate" means by supplying a [`Navigator`].

use tokio::sync::mpsc;
use tracing::info;
use url::Url;

/// Sink for navigation targets (absolute URLs or app-relative routes)
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Navigator that only logs the target
///
/// Query strings are dropped from the log line since end-session targets
/// carry the ID token as `id_token_hint`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, target: &str) {
        info!(target = %without_query(target), "Navigation requested");
    }
}

fn without_query(target: &str) -> String {
    match Url::parse(target) {
        Ok(mut url) => {
            url.set_query(None);
            url.to_string()
        }
        Err(_) => target.split('?').next().unwrap_or(target).to_string(),
    }
}

/// Navigator that forwards targets over a channel to the host's router
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelNavigator {
    /// Create the navigator and the receiving end for the router
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, target: &str) {
        if self.sender.send(target.to_string()).is_err() {
            tracing::warn!(target = %target, "Navigation receiver dropped");
        }
    }
}
