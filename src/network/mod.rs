//! Client wire boundary and the channel's single upstream link to the
//! world server.
//!
//! The client-facing codec is a pluggable seam ([`codec::ClientCodec`]);
//! the world link is concrete, since its shape (one upstream, request/
//! response for login, fire-and-forget for everything else) is fixed:
//! `world.send_packet` acknowledgements that block until a response
//! arrives (login) must not hold any lock across the suspension point.

mod codec;
mod message;
mod world;

pub use codec::{ClientCodec, NullCodec};
pub use message::{
    ClientCode, ClientMessage, InternalAction, LogoutAction, LogoutActionWire, LogoutCode,
    RelayEnvelope, RelayMode, ServerPacket, ShopBuyRequest,
};
pub use world::{LoginMode, LoginOutcome, LogoutNotifyAction, WebGameAction, WorldConnection, WorldPacket};
