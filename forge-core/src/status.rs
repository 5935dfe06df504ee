use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct StatusInner {
    text: String,
    last_error: String,
}

/// Human-readable status and last error, shared by all threads except audio.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<StatusInner>>,
}

impl StatusBoard {
    pub fn new(initial: &str) -> Self {
        let board = Self::default();
        board.set_text(initial);
        board
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn last_error(&self) -> String {
        self.lock().last_error.clone()
    }

    pub fn set_text(&self, text: &str) {
        let mut inner = self.lock();
        inner.text.clear();
        inner.text.push_str(text);
    }

    /// Record an error and show it as the status.
    pub fn set_error(&self, message: &str) {
        let mut inner = self.lock();
        inner.last_error = message.to_string();
        inner.text = message.to_string();
    }
}
