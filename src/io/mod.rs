//! View serialization: the magic-framed binary format, the diff format and
//! the transport shims built on top of them.
//!
//! All framing integers are big-endian. The path section is the exception:
//! path store indices, path lengths and the opaque path encodings
//! themselves travel in native byte order (see DESIGN.md for the
//! endianness policy); the section cross-check counts stay big-endian.

use crate::error::BgpViewError;
use crate::view::{PeerRef, PfxPeerRef, PfxRef};
use bytes::{BufMut, BytesMut};
use std::io::Read;
use std::net::IpAddr;

pub mod file;

#[cfg(feature = "kafka")]
pub mod kafka;

pub mod diff;

/// Generic magic carried in the top 32 bits of every frame marker ("BGPV").
pub const VIEW_MAGIC: u32 = 0x4247_5056;

/// Start-of-view marker ("STRT").
pub const VIEW_START_MAGIC: u32 = 0x5354_5254;
/// End-of-view marker ("VEND").
pub const VIEW_END_MAGIC: u32 = 0x5645_4E44;
/// End-of-peer-list marker ("PEND").
pub const VIEW_PEER_END_MAGIC: u32 = 0x5045_4E44;
/// End-of-path-table marker ("PATH").
pub const VIEW_PATH_END_MAGIC: u32 = 0x5041_5448;
/// End-of-prefix-table marker ("XEND").
pub const VIEW_PFX_END_MAGIC: u32 = 0x5845_4E44;
/// Start-of-diff marker ("DIFF").
pub const VIEW_DIFF_MAGIC: u32 = 0x4449_4646;

/// Caller-supplied encoding filter, consulted at three granularities.
///
/// Returning `false` from `keep_peer` skips the peer entirely, from
/// `keep_pfx` skips the prefix and all of its pfx-peers, and from
/// `keep_pfx_peer` skips that one edge. Prefixes whose pfx-peers are all
/// filtered out are not emitted at all.
pub trait ViewFilter {
    fn keep_peer(&self, peer: &PeerRef) -> bool {
        let _ = peer;
        true
    }

    fn keep_pfx(&self, pfx: &PfxRef) -> bool {
        let _ = pfx;
        true
    }

    fn keep_pfx_peer(&self, pfx_peer: &PfxPeerRef) -> bool {
        let _ = pfx_peer;
        true
    }
}

/// A filter that keeps everything.
pub struct KeepAll;

impl ViewFilter for KeepAll {}

pub(crate) fn put_magic(buf: &mut BytesMut, sub_magic: u32) {
    buf.put_u32(VIEW_MAGIC);
    buf.put_u32(sub_magic);
}

pub(crate) fn put_ip(buf: &mut BytesMut, ip: &IpAddr) {
    match ip {
        IpAddr::V4(v4) => {
            buf.put_u8(4);
            buf.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.put_u8(16);
            buf.put_slice(&v6.octets());
        }
    }
}

/// Buffered reader over a view stream that can peek at frame markers
/// without consuming them, mirroring the framing protocol: every section is
/// scanned entry-by-entry until its end marker appears.
pub(crate) struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> FrameReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        FrameReader {
            inner,
            buf: Vec::with_capacity(16),
            pos: 0,
        }
    }

    fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    // Tries to buffer at least `n` bytes; returns the number available,
    // which is smaller only at end of stream.
    fn top_up(&mut self, n: usize) -> Result<usize, BgpViewError> {
        let mut tmp = [0u8; 16];
        while self.buffered() < n {
            let need = n - self.buffered();
            let got = self.inner.read(&mut tmp[..need])?;
            if got == 0 {
                break;
            }
            if self.pos > 0 {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }
            self.buf.extend_from_slice(&tmp[..got]);
        }
        Ok(self.buffered())
    }

    /// Peeks at the next 8-byte frame marker. `Ok(None)` on a clean end of
    /// stream; a partial marker is a truncation error.
    pub(crate) fn peek_marker(&mut self) -> Result<Option<u64>, BgpViewError> {
        match self.top_up(8)? {
            0 => Ok(None),
            n if n < 8 => Err(BgpViewError::CorruptStream(
                "truncated frame marker".to_string(),
            )),
            _ => {
                let bytes: [u8; 8] = self.buf[self.pos..self.pos + 8].try_into().unwrap();
                Ok(Some(u64::from_be_bytes(bytes)))
            }
        }
    }

    /// Consumes the next 8 bytes iff they equal `VIEW_MAGIC ‖ sub_magic`.
    pub(crate) fn check_magic(&mut self, sub_magic: u32) -> Result<bool, BgpViewError> {
        let expected = ((VIEW_MAGIC as u64) << 32) | sub_magic as u64;
        match self.peek_marker()? {
            Some(marker) if marker == expected => {
                self.pos += 8;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(BgpViewError::CorruptStream(
                "unexpected end of stream".to_string(),
            )),
        }
    }

    /// Like [FrameReader::check_magic] but fails when the marker is absent.
    pub(crate) fn expect_magic(&mut self, sub_magic: u32, what: &str) -> Result<(), BgpViewError> {
        if !self.check_magic(sub_magic)? {
            return Err(BgpViewError::CorruptStream(format!("missing {} magic", what)));
        }
        Ok(())
    }

    pub(crate) fn read_exact_buf(&mut self, out: &mut [u8]) -> Result<(), BgpViewError> {
        let from_buf = out.len().min(self.buffered());
        out[..from_buf].copy_from_slice(&self.buf[self.pos..self.pos + from_buf]);
        self.pos += from_buf;
        if from_buf < out.len() {
            self.inner.read_exact(&mut out[from_buf..]).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    BgpViewError::CorruptStream("truncated view stream".to_string())
                } else {
                    BgpViewError::IoError(e)
                }
            })?;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, BgpViewError> {
        let mut b = [0u8; 1];
        self.read_exact_buf(&mut b)?;
        Ok(b[0])
    }

    pub(crate) fn read_u16_be(&mut self) -> Result<u16, BgpViewError> {
        let mut b = [0u8; 2];
        self.read_exact_buf(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub(crate) fn read_u32_be(&mut self) -> Result<u32, BgpViewError> {
        let mut b = [0u8; 4];
        self.read_exact_buf(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    pub(crate) fn read_u16_ne(&mut self) -> Result<u16, BgpViewError> {
        let mut b = [0u8; 2];
        self.read_exact_buf(&mut b)?;
        Ok(u16::from_ne_bytes(b))
    }

    pub(crate) fn read_u32_ne(&mut self) -> Result<u32, BgpViewError> {
        let mut b = [0u8; 4];
        self.read_exact_buf(&mut b)?;
        Ok(u32::from_ne_bytes(b))
    }

    pub(crate) fn read_n_bytes(&mut self, n: usize) -> Result<Vec<u8>, BgpViewError> {
        let mut buf = vec![0u8; n];
        self.read_exact_buf(&mut buf)?;
        Ok(buf)
    }

    /// Reads an IP address framed as `len: u8 ∈ {4, 16}` plus octets.
    pub(crate) fn read_ip(&mut self) -> Result<IpAddr, BgpViewError> {
        match self.read_u8()? {
            4 => {
                let mut octets = [0u8; 4];
                self.read_exact_buf(&mut octets)?;
                Ok(IpAddr::from(octets))
            }
            16 => {
                let mut octets = [0u8; 16];
                self.read_exact_buf(&mut octets)?;
                Ok(IpAddr::from(octets))
            }
            len => Err(BgpViewError::InvalidFormat(format!(
                "invalid ip address length {}",
                len
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_check_magic_consumes_on_match_only() {
        let mut buf = BytesMut::new();
        put_magic(&mut buf, VIEW_START_MAGIC);
        buf.put_u32(42);
        let data = buf.freeze();

        let mut fr = FrameReader::new(Cursor::new(data.to_vec()));
        assert!(!fr.check_magic(VIEW_END_MAGIC).unwrap());
        assert!(fr.check_magic(VIEW_START_MAGIC).unwrap());
        assert_eq!(fr.read_u32_be().unwrap(), 42);
    }

    #[test]
    fn test_peek_marker_eof() {
        let mut fr = FrameReader::new(Cursor::new(Vec::new()));
        assert!(fr.peek_marker().unwrap().is_none());

        // partial markers are truncation errors
        let mut fr = FrameReader::new(Cursor::new(vec![0u8; 5]));
        assert!(matches!(
            fr.peek_marker(),
            Err(BgpViewError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_reads_drain_peek_buffer() {
        // a failed magic check buffers 8 bytes; subsequent small reads must
        // consume them before touching the stream again
        let data = vec![0, 1, 0, 0, 0, 2, 0, 3, 9, 9];
        let mut fr = FrameReader::new(Cursor::new(data));
        assert!(!fr.check_magic(VIEW_PEER_END_MAGIC).unwrap());
        assert_eq!(fr.read_u16_be().unwrap(), 1);
        assert_eq!(fr.read_u32_be().unwrap(), 2);
        assert_eq!(fr.read_u16_be().unwrap(), 3);
        assert_eq!(fr.read_u16_be().unwrap(), 0x0909);
    }

    #[test]
    fn test_read_ip() {
        let mut buf = BytesMut::new();
        put_ip(&mut buf, &"10.0.0.1".parse().unwrap());
        put_ip(&mut buf, &"2001:db8::1".parse().unwrap());
        buf.put_u8(7);

        let mut fr = FrameReader::new(Cursor::new(buf.freeze().to_vec()));
        assert_eq!(fr.read_ip().unwrap(), "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(
            fr.read_ip().unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
        assert!(matches!(
            fr.read_ip(),
            Err(BgpViewError::InvalidFormat(_))
        ));
    }
}
