mod error;
mod registry;
mod session;
mod types;

pub use error::{SignalingError, SignalingResult};
pub use registry::{RoomRegistry, RoomSnapshot};
pub use session::SignalingSession;
pub use types::{
    new_share_id, ClientMessage, ConnId, Outbound, PeerHandle, Role, ServerMessage, SessionTag,
};
