/// Player dispatcher routing players into per-challenge rooms.
pub mod engine;
/// Reward and attempt history checks.
pub mod restrictions;
/// WebSocket connection and message handling service.
pub mod websocket_service;
