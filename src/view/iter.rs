//! Iteration over peers, prefixes and pfx-peers with field filters.
//!
//! Iterators borrow the view, so outstanding cursors statically prevent
//! mutation (mutating the view invalidates iterators by construction).
//! Iteration order is unspecified but stable between mutations.

use crate::error::BgpViewError;
use crate::models::{Afi, AsPath};
use crate::store::{PathId, PeerId, PeerSignature};
use crate::view::{BgpView, PeerInfo, PfxEntry, PfxPeerInfo};
use bitflags::bitflags;
use ipnet::IpNet;

bitflags! {
    /// Field-state filter for iteration.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct FieldFilter: u8 {
        const ACTIVE = 0b01;
        const INACTIVE = 0b10;
        const ALL = 0b11;
    }
}

impl FieldFilter {
    #[inline]
    pub(crate) fn admits(&self, active: bool) -> bool {
        if active {
            self.contains(FieldFilter::ACTIVE)
        } else {
            self.contains(FieldFilter::INACTIVE)
        }
    }
}

/// A peer position within a view.
#[derive(Debug, Clone, Copy)]
pub struct PeerRef<'a> {
    view: &'a BgpView,
    id: PeerId,
    info: &'a PeerInfo,
}

impl<'a> PeerRef<'a> {
    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    pub fn info(&self) -> &'a PeerInfo {
        self.info
    }

    pub fn is_active(&self) -> bool {
        self.info.is_active()
    }

    /// The interned signature of this peer.
    pub fn sig(&self) -> Result<PeerSignature, BgpViewError> {
        self.view.sig_store().read().lookup(self.id).cloned()
    }
}

/// A prefix position within a view; pfx-peers are reached through it.
#[derive(Debug, Clone, Copy)]
pub struct PfxRef<'a> {
    view: &'a BgpView,
    pfx: IpNet,
    entry: &'a PfxEntry,
}

impl<'a> PfxRef<'a> {
    pub fn pfx(&self) -> IpNet {
        self.pfx
    }

    pub fn is_active(&self) -> bool {
        self.entry.is_active()
    }

    /// Iterates the pfx-peers of this prefix matching the filter.
    pub fn peers(&self, filter: FieldFilter) -> impl Iterator<Item = PfxPeerRef<'a>> + 'a {
        let view = self.view;
        let pfx = self.pfx;
        self.entry
            .peers
            .iter()
            .filter(move |(_, pp)| filter.admits(pp.is_active()))
            .map(move |(id, pp)| PfxPeerRef {
                view,
                pfx,
                peer_id: *id,
                info: pp,
            })
    }

    pub fn peer_cnt(&self, filter: FieldFilter) -> usize {
        self.entry
            .peers
            .values()
            .filter(|pp| filter.admits(pp.is_active()))
            .count()
    }
}

/// A pfx-peer position: the edge between one prefix and one peer.
#[derive(Debug, Clone, Copy)]
pub struct PfxPeerRef<'a> {
    view: &'a BgpView,
    pfx: IpNet,
    peer_id: PeerId,
    info: &'a PfxPeerInfo,
}

impl PfxPeerRef<'_> {
    pub fn pfx(&self) -> IpNet {
        self.pfx
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn path_id(&self) -> PathId {
        self.info.path_id()
    }

    pub fn is_active(&self) -> bool {
        self.info.is_active()
    }

    /// The peer's interned signature.
    pub fn sig(&self) -> Result<PeerSignature, BgpViewError> {
        self.view.sig_store().read().lookup(self.peer_id).cloned()
    }

    /// View-level info of the peer on this edge.
    pub fn peer_info(&self) -> Option<&'_ PeerInfo> {
        self.view.peer_info(self.peer_id)
    }

    /// Decodes the AS path attached to this edge.
    pub fn path(&self) -> Result<AsPath, BgpViewError> {
        self.view
            .path_store()
            .read()
            .get(self.info.path_id())?
            .to_path()
    }
}

impl BgpView {
    /// Iterates the peers of the view matching the filter.
    pub fn peers(&self, filter: FieldFilter) -> impl Iterator<Item = PeerRef<'_>> + '_ {
        self.peers
            .iter()
            .filter(move |(_, info)| filter.admits(info.is_active()))
            .map(move |(id, info)| PeerRef {
                view: self,
                id: *id,
                info,
            })
    }

    /// Iterates the prefixes of the view matching the filter and family.
    pub fn pfxs(
        &self,
        filter: FieldFilter,
        family: Option<Afi>,
    ) -> impl Iterator<Item = PfxRef<'_>> + '_ {
        self.pfxs
            .iter()
            .filter(move |(pfx, entry)| {
                filter.admits(entry.is_active())
                    && family.map(|f| Afi::of_pfx(pfx) == f).unwrap_or(true)
            })
            .map(move |(pfx, entry)| PfxRef {
                view: self,
                pfx: *pfx,
                entry,
            })
    }

    /// Positions on a single prefix, if present.
    pub fn pfx(&self, pfx: &IpNet) -> Option<PfxRef<'_>> {
        self.pfxs.get(pfx).map(|entry| PfxRef {
            view: self,
            pfx: *pfx,
            entry,
        })
    }
}
