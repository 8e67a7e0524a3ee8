//! Wire-Format fuer Chat-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge zaehlt nur die Payload-Bytes. Zu grosse Frames und
//! ungueltiges JSON sind `InvalidData`-Fehler; die Verbindung gilt danach
//! als unbrauchbar.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::ChatMessage;

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Groesstes Limit das das u32-Laengenfeld darstellen kann
pub const MAX_FRAME_SIZE_LIMIT: usize = u32::MAX as usize;

fn zu_gross(art: &str, laenge: usize, maximum: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{art} zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)"),
    )
}

fn kodieren(message: &ChatMessage, max_frame_size: usize) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(message).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Serialisierung fehlgeschlagen: {e}"),
        )
    })?;
    if json.len() > max_frame_size {
        return Err(zu_gross("Nachricht", json.len(), max_frame_size));
    }
    Ok(json)
}

fn dekodieren(payload: &[u8]) -> io::Result<ChatMessage> {
    serde_json::from_slice(payload).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Deserialisierung fehlgeschlagen: {e}"),
        )
    })
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer `Framed<TcpStream, FrameCodec>`
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use plauder_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit eigener maximaler Frame-Groesse
    ///
    /// Werte ueber `MAX_FRAME_SIZE_LIMIT` werden darauf begrenzt.
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE_LIMIT),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = ChatMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(zu_gross("Frame", length, self.max_frame_size));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);
        dekodieren(&payload).map(Some)
    }
}

impl Encoder<ChatMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ChatMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = kodieren(&item, self.max_frame_size)?;
        let laenge = u32::try_from(json.len())
            .map_err(|_| zu_gross("Nachricht", json.len(), MAX_FRAME_SIZE_LIMIT))?;
        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(laenge);
        dst.put_slice(&json);
        Ok(())
    }
}
