//! Newline-delimited JSON framing.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};

use crate::common::error::ProtocolError;
use crate::protocol::frames::{ClientFrame, ServerFrame};

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(ClientFrame),
    /// The line could not be turned into a frame. The stream stays usable.
    Malformed { reason: String },
}

/// Codec for relay frames, one JSON document per line.
pub struct FrameCodec {
    lines: LinesCodec,
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_length),
        }
    }

    fn parse(line: &str) -> Inbound {
        match serde_json::from_str::<ClientFrame>(line) {
            Ok(frame) => Inbound::Frame(frame),
            Err(e) => Inbound::Malformed {
                reason: e.to_string(),
            },
        }
    }

    fn next_inbound(
        &mut self,
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Option<Inbound>>, ProtocolError> {
        match decoded {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    // Blank keepalive line, keep reading
                    return Ok(Some(None));
                }
                Ok(Some(Some(Self::parse(line))))
            }
            Ok(None) => Ok(None),
            // LinesCodec discards the rest of the oversized line on its own
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Some(Inbound::Malformed {
                reason: ProtocolError::FrameTooLong.to_string(),
            }))),
            Err(e) => Err(e.into()),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Inbound;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let decoded = self.lines.decode(src);
            match self.next_inbound(decoded)? {
                Some(Some(inbound)) => return Ok(Some(inbound)),
                Some(None) => continue,
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let decoded = self.lines.decode_eof(src);
            match self.next_inbound(decoded)? {
                Some(Some(inbound)) => return Ok(Some(inbound)),
                Some(None) => continue,
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<ServerFrame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: ServerFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&item)?;
        self.lines.encode(line, dst)?;
        Ok(())
    }
}

/// A framed client connection.
pub type RelayConnection<S> = Framed<S, FrameCodec>;

/// Create a new framed connection from a stream.
pub fn new_relay_connection<S: AsyncRead + AsyncWrite>(
    stream: S,
    max_frame_length: usize,
) -> RelayConnection<S> {
    Framed::new(stream, FrameCodec::new(max_frame_length))
}
