//! Message-oriented stream abstraction.
//!
//! The handshake driver treats each item it receives as exactly one Noise
//! message. Byte-oriented transports (TCP, pipes) are adapted with
//! [`framed`], which uses the conventional Noise framing of a 2-byte
//! big-endian length prefix.

use std::io;

use bytes::{Bytes, BytesMut};
use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::channel::MAX_NOISE_MESSAGE_SIZE;

/// Width of the length prefix written before every message.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// An ordered, duplex stream of whole messages.
pub trait MessageStream:
    Stream<Item = io::Result<BytesMut>> + Sink<Bytes, Error = io::Error> + Unpin
{
}

impl<T> MessageStream for T where
    T: Stream<Item = io::Result<BytesMut>> + Sink<Bytes, Error = io::Error> + Unpin
{
}

/// Frames a byte stream into length-prefixed Noise messages.
pub fn framed<T>(io: T) -> Framed<T, LengthDelimitedCodec>
where
    T: AsyncRead + AsyncWrite,
{
    let codec = LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_PREFIX_SIZE)
        .max_frame_length(MAX_NOISE_MESSAGE_SIZE)
        .new_codec();
    Framed::new(io, codec)
}
