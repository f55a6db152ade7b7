//! Language server for Etude. Keeps an in-memory index of every open
//! file (live buffer, last compile, derived symbol and usage tables) and
//! answers document symbols, definitions, highlights, hover, and rename
//! from it. One edit recompiles the edited file synchronously; other
//! open files recompile lazily the next time they are queried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tower_lsp::lsp_types::Url;
use tower_lsp::Client;

pub mod document;
pub mod extract;

mod diagnostics;
mod navigation;
mod server;
mod state;
#[cfg(test)]
mod tests;

pub use server::run;

use state::{BackendState, FileEntry};

pub struct Backend {
    client: Client,
    state: Arc<Mutex<BackendState>>,
    initialized: AtomicBool,
}

impl Backend {
    fn new(client: Client) -> Self {
        Backend {
            client,
            state: Arc::new(Mutex::new(BackendState::default())),
            initialized: AtomicBool::new(false),
        }
    }

    fn ready(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn set_ready(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Looks up (or opens) the entry for `uri`, answers from it, then
    /// publishes the diagnostics the lookup may have produced.
    async fn with_entry<F, R>(&self, uri: &Url, f: F) -> Option<R>
    where
        F: FnOnce(&FileEntry) -> R,
    {
        let (result, diagnostics, publish_uri) = {
            let mut state = self.state.lock().await;
            let path = state.find_or_open(uri);
            let entry = state.entry(&path)?;
            (f(entry), entry.diagnostics(), entry.uri.clone())
        };
        self.client
            .publish_diagnostics(publish_uri, diagnostics, None)
            .await;
        Some(result)
    }
}
