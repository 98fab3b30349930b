//! Client wire codec boundary.
//!
//! The concrete client packet format is intentionally left pluggable: `ClientCodec` is the
//! seam a real deployment's binary protocol implements. Production builds
//! supply one; tests use [`NullCodec`], which never accepts bytes, to
//! exercise everything above the wire without a real framing.

use super::message::ClientMessage;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

pub trait ClientCodec:
    Decoder<Item = ClientMessage, Error = std::io::Error>
    + Encoder<ClientMessage, Error = std::io::Error>
    + Send
    + 'static
{
}

impl<T> ClientCodec for T where
    T: Decoder<Item = ClientMessage, Error = std::io::Error>
        + Encoder<ClientMessage, Error = std::io::Error>
        + Send
        + 'static
{
}

/// A codec that decodes nothing and encodes nothing; used in tests that
/// drive the server through its in-process API instead of real sockets.
#[derive(Default)]
pub struct NullCodec;

impl Decoder for NullCodec {
    type Item = ClientMessage;
    type Error = std::io::Error;

    fn decode(&mut self, _src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(None)
    }
}

impl Encoder<ClientMessage> for NullCodec {
    type Error = std::io::Error;

    fn encode(&mut self, _item: ClientMessage, _dst: &mut BytesMut) -> Result<(), Self::Error> {
        Ok(())
    }
}
