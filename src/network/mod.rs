//! Networking: one TCP port carrying both device uploads and HTTP reads.
//!
//! [`server`] accepts connections, [`dispatcher`] sniffs each one and hands
//! it to [`upload`] or [`http`]. [`protocol`] defines the upload header and
//! [`client`] speaks both sides for tools and tests.

pub mod client;
pub mod dispatcher;
pub mod http;
pub mod protocol;
pub mod server;
pub mod upload;

pub use dispatcher::{handle_connection, ConnectionKind, RelayContext};
pub use protocol::{HeaderLayout, UploadHeader};
pub use server::RelayServer;
pub use upload::UploadOutcome;
