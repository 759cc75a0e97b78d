//! Packet framing.
//!
//! Every message is wrapped in packets of a 3-byte little-endian payload
//! length, a 1-byte sequence id, and the payload itself. Payloads of
//! [`MAX_PAYLOAD_LEN`] and above are split into continuation packets, the
//! first shorter packet (possibly empty) ends the message.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::ProtocolError;

/// Largest payload a single packet can carry.
pub const MAX_PAYLOAD_LEN: usize = 0xff_ffff;

/// Packet header size.
pub const HEADER_LEN: usize = 4;

/// Sequence id bookkeeping and payload reassembly.
///
/// Both sides of one command exchange share a single sequence counter:
/// the request packets consume the first ids and the response packets
/// continue from there. [`reset`][PacketCodec::reset] starts a new exchange.
#[derive(Debug, Default)]
pub struct PacketCodec {
    seq: u8,
    pending: Option<BytesMut>,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new command exchange, sequence restarts at zero.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.pending = None;
    }

    /// Claim the next sequence id for an outgoing packet.
    pub fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = seq.wrapping_add(1);
        seq
    }

    pub(crate) fn seq(&self) -> u8 {
        self.seq
    }

    pub(crate) fn set_seq(&mut self, seq: u8) {
        self.seq = seq;
    }

    /// Extract one complete payload from `buf`, reassembling split packets.
    ///
    /// Returns [`None`] when more socket data is required.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        loop {
            let Some(header) = buf.get(..HEADER_LEN) else {
                return Ok(None);
            };

            let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            let seq = header[3];

            if seq != self.seq {
                return Err(ProtocolError::out_of_sync(self.seq, seq));
            }

            if buf.len() < HEADER_LEN + len {
                buf.reserve(HEADER_LEN + len - buf.len());
                return Ok(None);
            }

            self.seq = self.seq.wrapping_add(1);
            buf.advance(HEADER_LEN);
            let payload = buf.split_to(len);

            match &mut self.pending {
                Some(pending) => {
                    pending.extend_from_slice(&payload);
                    if len < MAX_PAYLOAD_LEN {
                        let assembled = self.pending.take().expect("pending is some");
                        return Ok(Some(assembled.freeze()));
                    }
                },
                None if len == MAX_PAYLOAD_LEN => {
                    self.pending = Some(payload);
                },
                None => return Ok(Some(payload.freeze())),
            }
        }
    }
}

/// Frame `payload` into `buf`, splitting at [`MAX_PAYLOAD_LEN`].
///
/// `seq` is advanced once per packet written. A payload that is an exact
/// multiple of the limit is terminated by an empty packet.
pub fn encode(payload: &[u8], seq: &mut u8, buf: &mut BytesMut) {
    let mut offset = 0;
    loop {
        let end = usize::min(offset + MAX_PAYLOAD_LEN, payload.len());
        let chunk = &payload[offset..end];

        buf.reserve(HEADER_LEN + chunk.len());
        buf.put_uint_le(chunk.len() as u64, 3);
        buf.put_u8(*seq);
        buf.put(chunk);

        *seq = seq.wrapping_add(1);
        offset = end;

        if chunk.len() < MAX_PAYLOAD_LEN {
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::{HEADER_LEN, MAX_PAYLOAD_LEN, PacketCodec, encode};

    fn frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        let mut seq = 0;
        encode(payload, &mut seq, &mut buf);
        buf
    }

    fn reassemble(mut buf: BytesMut) -> Vec<u8> {
        let mut codec = PacketCodec::new();
        codec.decode(&mut buf).unwrap().expect("complete payload").to_vec()
    }

    #[test]
    fn single_packet() {
        let buf = frame(b"\x03SELECT 1");
        assert_eq!(buf.len(), HEADER_LEN + 9);
        assert_eq!(&buf[..4], &[9, 0, 0, 0]);
        assert_eq!(reassemble(buf), b"\x03SELECT 1");
    }

    #[test]
    fn empty_payload_is_one_empty_packet() {
        let buf = frame(b"");
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
        assert_eq!(reassemble(buf), b"");
    }

    #[test]
    fn split_below_boundary_stays_single() {
        let payload = vec![0xaa; MAX_PAYLOAD_LEN - 1];
        let buf = frame(&payload);
        assert_eq!(buf.len(), HEADER_LEN + payload.len());
        assert_eq!(reassemble(buf), payload);
    }

    #[test]
    fn split_at_boundary_appends_empty_packet() {
        let payload = vec![0xbb; MAX_PAYLOAD_LEN];
        let buf = frame(&payload);
        // full packet + empty terminator
        assert_eq!(buf.len(), HEADER_LEN + MAX_PAYLOAD_LEN + HEADER_LEN);
        assert_eq!(buf[HEADER_LEN - 1], 0);
        assert_eq!(buf[buf.len() - 1], 1); // terminator sequence id
        assert_eq!(reassemble(buf), payload);
    }

    #[test]
    fn split_above_boundary() {
        let payload = vec![0xcc; MAX_PAYLOAD_LEN + 10];
        let buf = frame(&payload);
        assert_eq!(buf.len(), 2 * HEADER_LEN + payload.len());
        assert_eq!(reassemble(buf), payload);
    }

    #[test]
    fn split_across_three_packets() {
        let payload = vec![0xdd; 2 * MAX_PAYLOAD_LEN + 5];
        let buf = frame(&payload);
        assert_eq!(buf.len(), 3 * HEADER_LEN + payload.len());
        assert_eq!(buf[HEADER_LEN - 1], 0);
        assert_eq!(buf[2 * HEADER_LEN + MAX_PAYLOAD_LEN - 1], 1);
        assert_eq!(reassemble(buf), payload);
    }

    #[test]
    fn partial_header_and_payload_return_none() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&[5u8, 0, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        let mut buf = BytesMut::from(&[5u8, 0, 0, 0, b'a', b'b'][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn sequence_gap_is_an_error() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&[1u8, 0, 0, 2, b'x'][..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn sequence_continues_across_packets() {
        let mut buf = BytesMut::new();
        let mut seq = 0;
        encode(b"a", &mut seq, &mut buf);
        encode(b"bc", &mut seq, &mut buf);
        assert_eq!(seq, 2);

        let mut codec = PacketCodec::new();
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"a");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"bc");
    }
}
