//! Types shared between the pong server and its clients.
//!
//! Everything that crosses the WebSocket lives here so that the wire format
//! has a single definition (and a single set of TypeScript bindings).

pub mod config;
pub mod protocol;

pub use config::GameConfig;
pub use protocol::{ClientMsg, GameSnapshot, ProtocolError, ServerMsg};
