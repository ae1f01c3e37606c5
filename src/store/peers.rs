//! Peer signature store: interns `(collector, peer_ip, peer_asn)` triples
//! to compact 16-bit peer ids.

use crate::error::BgpViewError;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

/// Compact id of an interned peer signature. Id 0 is reserved as invalid.
pub type PeerId = u16;

/// Maximum length in bytes of a collector name.
pub const COLLECTOR_NAME_MAX_LEN: usize = 255;

/// The identity of a peer as seen from a collector.
///
/// Signatures are immutable once interned: distinct signatures map to
/// distinct ids and the same triple always maps to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerSignature {
    pub collector: String,
    pub peer_ip: IpAddr,
    pub peer_asn: u32,
}

impl Display for PeerSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.collector, self.peer_asn, self.peer_ip)
    }
}

/// Interning store for peer signatures.
#[derive(Debug, Default)]
pub struct PeerSignatureStore {
    // id = index + 1; id 0 stays reserved
    signatures: Vec<PeerSignature>,
    ids: HashMap<PeerSignature, PeerId>,
}

impl PeerSignatureStore {
    pub fn new() -> Self {
        PeerSignatureStore::default()
    }

    /// Interns a signature and returns its id. Idempotent.
    ///
    /// Fails with `InvalidArg` when the collector name exceeds
    /// [COLLECTOR_NAME_MAX_LEN] bytes and with `Capacity` when the 16-bit id
    /// space is exhausted.
    pub fn intern(
        &mut self,
        collector: &str,
        peer_ip: IpAddr,
        peer_asn: u32,
    ) -> Result<PeerId, BgpViewError> {
        if collector.len() > COLLECTOR_NAME_MAX_LEN {
            return Err(BgpViewError::InvalidArg(format!(
                "collector name longer than {} bytes",
                COLLECTOR_NAME_MAX_LEN
            )));
        }

        let sig = PeerSignature {
            collector: collector.to_string(),
            peer_ip,
            peer_asn,
        };
        if let Some(id) = self.ids.get(&sig) {
            return Ok(*id);
        }

        // id 0 is reserved, so only u16::MAX - 1 signatures fit
        if self.signatures.len() >= u16::MAX as usize - 1 {
            return Err(BgpViewError::Capacity("peer id space"));
        }

        self.signatures.push(sig.clone());
        let id = self.signatures.len() as PeerId;
        self.ids.insert(sig, id);
        Ok(id)
    }

    /// Looks up the signature of an interned id.
    pub fn lookup(&self, id: PeerId) -> Result<&PeerSignature, BgpViewError> {
        id.checked_sub(1)
            .and_then(|idx| self.signatures.get(idx as usize))
            .ok_or_else(|| BgpViewError::NotFound(format!("peer id {}", id)))
    }

    /// Iterates over all interned `(id, signature)` pairs. Order is
    /// unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, &PeerSignature)> {
        self.signatures
            .iter()
            .enumerate()
            .map(|(idx, sig)| (idx as PeerId + 1, sig))
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
