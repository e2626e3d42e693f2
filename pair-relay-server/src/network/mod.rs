//! Network Layer
//!
//! WebSocket transport for the relay. All session rules live in `game/`;
//! this layer only decodes, routes and delivers.

pub mod protocol;
pub mod transport;
pub mod relay;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, JoinAck, JoinPayload, MovePayload, ErrorCode};
pub use transport::{ConnectionHub, Transport};
pub use relay::Relay;
pub use server::{RelayServer, ServerConfig, RelayServerError};
