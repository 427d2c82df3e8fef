//! WebSocket endpoint for real-time shipment updates.

pub mod handler;

pub use handler::handle_socket;
