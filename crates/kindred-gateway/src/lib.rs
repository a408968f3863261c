//! Real-time delivery: pairwise rooms, per-connection sessions and the
//! WebSocket loop that drives them.

pub mod connection;
pub mod dispatcher;
pub mod room;
pub mod session;

pub use dispatcher::{ConnId, Dispatcher};
pub use session::{Gateway, GatewayConfig, Session};
