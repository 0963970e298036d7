//! Configuration change listener.
//!
//! The configuration distribution service pushes documents to every
//! registered listener whose [`ConfigListener::is_listening_configuration`]
//! accepts the document path.

/// Receiver of configuration documents keyed by path.
pub trait ConfigListener: Send + Sync {
    /// Name of this listener (for logging and debugging).
    fn name(&self) -> &str;

    /// Returns `true` if documents at `path` should be delivered here.
    fn is_listening_configuration(&self, path: &str) -> bool;

    /// Called once per document when the watcher starts.
    fn on_init(&self, path: &str, document: &str) {
        self.on_refresh(path, document);
    }

    /// Called whenever a document changes.
    fn on_refresh(&self, path: &str, document: &str);

    /// Called when a document is deleted.
    fn on_remove(&self, path: &str);
}

/// Fans documents out to every interested listener.
#[derive(Default)]
pub struct ConfigListeners {
    listeners: Vec<std::sync::Arc<dyn ConfigListener>>,
}

impl ConfigListeners {
    /// Creates an empty listener set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    #[must_use]
    pub fn with(mut self, listener: std::sync::Arc<dyn ConfigListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Returns `true` if any listener wants documents at `path`.
    #[must_use]
    pub fn is_listening_configuration(&self, path: &str) -> bool {
        self.listeners
            .iter()
            .any(|l| l.is_listening_configuration(path))
    }

    /// Delivers an initial document.
    pub fn on_init(&self, path: &str, document: &str) {
        for listener in self.interested(path) {
            listener.on_init(path, document);
        }
    }

    /// Delivers a changed document.
    pub fn on_refresh(&self, path: &str, document: &str) {
        for listener in self.interested(path) {
            tracing::trace!(listener = listener.name(), path, "Delivering configuration");
            listener.on_refresh(path, document);
        }
    }

    /// Delivers a deletion.
    pub fn on_remove(&self, path: &str) {
        for listener in self.interested(path) {
            listener.on_remove(path);
        }
    }

    fn interested<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a dyn ConfigListener> {
        self.listeners
            .iter()
            .map(|l| l.as_ref())
            .filter(move |l| l.is_listening_configuration(path))
    }
}
