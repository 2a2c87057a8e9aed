// Route modules for Parley Server
pub mod peers; // Registry diagnostics
pub mod websocket; // Signaling relay endpoint
