// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod file_store;
pub mod frame_decoder;
pub mod websocket_transport;
