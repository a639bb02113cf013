use axum::Router;

use crate::state::SharedState;

pub mod websocket;

/// Compose all route trees and wire in the shared state.
pub fn router(state: SharedState) -> Router<()> {
    websocket::router().with_state(state)
}
