//! Wire-Format der Signaling-Verbindung
//!
//! Frame-basiert: Laenge (u32 big-endian) + JSON-`SignalMessage`.
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! |       Laenge (u32 BE, 4 Bytes)    | Payload   |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Ein TCP-Strom pro Teilnehmer liefert die Frames in Sendereihenfolge;
//! die Reihenfolge pro Raum stellt anschliessend der Raum-Actor her.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::signal::SignalMessage;

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

fn ungueltig(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// tokio-util Codec fuer `Framed<TcpStream, FrameCodec>`
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Codec mit Standard-Limit
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Codec mit eigener maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
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
    type Item = SignalMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let laenge = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if laenge > self.max_frame_size {
            return Err(ungueltig(format!(
                "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                laenge, self.max_frame_size
            )));
        }

        let gesamt = LENGTH_FIELD_SIZE + laenge;
        if src.len() < gesamt {
            src.reserve(gesamt - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(laenge);

        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| ungueltig(format!("Ungueltige Signaling-Nachricht: {}", e)))
    }
}

impl Encoder<SignalMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: SignalMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)
            .map_err(|e| ungueltig(format!("JSON-Serialisierung fehlgeschlagen: {}", e)))?;

        if json.len() > self.max_frame_size {
            return Err(ungueltig(format!(
                "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                json.len(),
                self.max_frame_size
            )));
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalPayload;
    use nexus_core::types::RoomId;

    fn join(raum: &str) -> SignalMessage {
        SignalMessage::new(SignalPayload::JoinRoom {
            room_id: RoomId::from(raum),
        })
    }

    #[test]
    fn nachrichten_bleiben_in_reihenfolge() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for raum in ["a", "b", "c"] {
            codec.encode(join(raum), &mut buf).unwrap();
        }

        for raum in ["a", "b", "c"] {
            let msg = codec.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert_eq!(msg, join(raum));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn halber_frame_wartet() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(join("v1"), &mut buf).unwrap();

        let haelfte = buf.len() / 2;
        let mut teil = buf.split_to(haelfte);
        assert!(codec.decode(&mut teil).unwrap().is_none());

        teil.unsplit(buf);
        assert_eq!(codec.decode(&mut teil).unwrap(), Some(join("v1")));
    }

    #[test]
    fn zu_grosser_frame_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);
        assert!(codec.decode(&mut buf).is_err());

        let mut klein = FrameCodec::with_max_size(10);
        assert!(klein.encode(join("v1"), &mut BytesMut::new()).is_err());
    }

    #[test]
    fn kaputtes_json_ist_fehler() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_slice(b"{x}");
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
