//! AS path segments and the opaque byte encoding used by the path store.

use crate::error::BgpViewError;
use bytes::{BufMut, Bytes, BytesMut};
use itertools::Itertools;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

/// AS path segment type, numbered as on the BGP wire.
///
/// <https://datatracker.ietf.org/doc/html/rfc4271#section-4.3> and RFC 5065
/// for the confederation segment types.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SegmentType {
    AsSet = 1,
    AsSequence = 2,
    ConfedSequence = 3,
    ConfedSet = 4,
}

/// One AS path segment: a segment type plus an ordered list of ASNs.
///
/// Hash and equality are by type + ASNs. Most segments observed in RIB data
/// are short sequences, hence the inline capacity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AsPathSegment {
    pub seg_type: SegmentType,
    pub asns: SmallVec<[u32; 8]>,
}

impl AsPathSegment {
    pub fn new<A: AsRef<[u32]>>(seg_type: SegmentType, asns: A) -> Self {
        AsPathSegment {
            seg_type,
            asns: SmallVec::from_slice(asns.as_ref()),
        }
    }

    /// Shorthand for creating an `AsSequence` segment.
    pub fn sequence<A: AsRef<[u32]>>(asns: A) -> Self {
        Self::new(SegmentType::AsSequence, asns)
    }

    /// Shorthand for creating an `AsSet` segment.
    pub fn set<A: AsRef<[u32]>>(asns: A) -> Self {
        Self::new(SegmentType::AsSet, asns)
    }

    pub fn len(&self) -> usize {
        self.asns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.asns.is_empty()
    }

    pub fn is_confed(&self) -> bool {
        matches!(
            self.seg_type,
            SegmentType::ConfedSequence | SegmentType::ConfedSet
        )
    }
}

impl Display for AsPathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.seg_type {
            SegmentType::AsSequence => write!(f, "{}", self.asns.iter().join(" ")),
            SegmentType::AsSet => write!(f, "{{{}}}", self.asns.iter().join(",")),
            SegmentType::ConfedSequence => write!(f, "({})", self.asns.iter().join(" ")),
            SegmentType::ConfedSet => write!(f, "({{{}}})", self.asns.iter().join(",")),
        }
    }
}

/// An ordered list of AS path segments.
///
/// The storage encoding is a sequence of
/// `{seg_type: u8, asn_count: u8, asns: [u32; asn_count]}` records with the
/// ASNs in native byte order: equal paths produce equal encodings on one
/// host, and the path store content-addresses on that encoding. Files and
/// frames carrying path encodings are therefore only interoperable between
/// same-endianness hosts (see DESIGN.md).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AsPath {
    pub segments: Vec<AsPathSegment>,
}

impl AsPath {
    pub fn new() -> Self {
        AsPath::default()
    }

    pub fn from_segments(segments: Vec<AsPathSegment>) -> Self {
        AsPath { segments }
    }

    /// Shorthand for a path consisting of a single `AsSequence`.
    pub fn from_sequence<A: AsRef<[u32]>>(asns: A) -> Self {
        AsPath {
            segments: vec![AsPathSegment::sequence(asns)],
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The origin segment of the path (the last segment), if any.
    pub fn origin_segment(&self) -> Option<&AsPathSegment> {
        self.segments.last()
    }

    /// The origin ASN, if the path originates from a single AS.
    pub fn origin_asn(&self) -> Option<u32> {
        let seg = self.origin_segment()?;
        match seg.seg_type {
            SegmentType::AsSequence => seg.asns.last().copied(),
            _ => (seg.asns.len() == 1).then(|| seg.asns[0]),
        }
    }

    /// Serializes the path to its opaque storage encoding.
    ///
    /// Fails with `InvalidArg` if any segment holds more than 255 ASNs (the
    /// encoding's count field is one byte, as on the BGP wire).
    pub fn encode(&self) -> Result<Bytes, BgpViewError> {
        let mut buf = BytesMut::with_capacity(self.segments.iter().map(|s| 2 + s.len() * 4).sum());
        for segment in &self.segments {
            if segment.asns.len() > u8::MAX as usize {
                return Err(BgpViewError::InvalidArg(format!(
                    "as path segment with {} asns exceeds encoding limit",
                    segment.asns.len()
                )));
            }
            buf.put_u8(segment.seg_type.into());
            buf.put_u8(segment.asns.len() as u8);
            for asn in &segment.asns {
                buf.put_slice(&asn.to_ne_bytes());
            }
        }
        Ok(buf.freeze())
    }

    /// Deserializes a path from its opaque storage encoding.
    pub fn decode(mut data: &[u8]) -> Result<AsPath, BgpViewError> {
        let mut segments = Vec::new();
        while !data.is_empty() {
            if data.len() < 2 {
                return Err(BgpViewError::InvalidFormat(
                    "truncated as path segment header".to_string(),
                ));
            }
            let seg_type = SegmentType::try_from(data[0]).map_err(|_| {
                BgpViewError::InvalidFormat(format!("unknown as path segment type {}", data[0]))
            })?;
            let count = data[1] as usize;
            data = &data[2..];
            if data.len() < count * 4 {
                return Err(BgpViewError::InvalidFormat(
                    "truncated as path segment body".to_string(),
                ));
            }
            let mut asns: SmallVec<[u32; 8]> = SmallVec::with_capacity(count);
            for chunk in data[..count * 4].chunks_exact(4) {
                asns.push(u32::from_ne_bytes(chunk.try_into().unwrap()));
            }
            data = &data[count * 4..];
            segments.push(AsPathSegment { seg_type, asns });
        }
        Ok(AsPath { segments })
    }
}

impl Display for AsPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.iter().join(" "))
    }
}
