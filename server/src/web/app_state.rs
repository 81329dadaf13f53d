use crate::engine::chat_engine::ChatEngine;

/// Shared state handed to every HTTP handler.
pub struct AppState {
    pub engine: ChatEngine,
}
