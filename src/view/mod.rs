//! The view: a triply-indexed `(prefix, peer, path)` container with
//! active/inactive state at every level.
//!
//! A view owns its peer and prefix maps exclusively; the peer-signature and
//! AS-path stores are shared handles, so snapshots made with [BgpView::dup]
//! resolve the same ids as the original. All mutators keep the following
//! invariants:
//!
//! 1. a prefix is active iff it has at least one active pfx-peer,
//! 2. a peer is active iff at least one pfx-peer on it is active (the
//!    explicit [BgpView::activate_peer] override exists for decoders that
//!    install peers before their pfx-peers),
//! 3. per-peer v4/v6 counts equal the number of active pfx-peers by family,
//! 4. removing a peer removes all of its pfx-peers; an emptied prefix stays
//!    in the map, inactive, until [BgpView::gc],
//! 5. every pfx-peer path id resolves in the path store.
//!
//! Invariant breakage is a bug: debug builds abort, release builds poison
//! the view and fail all further mutations fast.

use crate::error::BgpViewError;
use crate::models::Afi;
use crate::store::{AsPathStore, PathId, PeerId, PeerSignatureStore};
use ipnet::IpNet;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

mod iter;
pub use iter::*;

/// Per-peer state within a view.
#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
    active: bool,
    pfx_cnt_v4: u32,
    pfx_cnt_v6: u32,
    // total pfx-peers (active or not), maintained for gc
    pfx_peer_cnt: u32,
}

impl PeerInfo {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of active IPv4 pfx-peers on this peer.
    pub fn pfx_cnt_v4(&self) -> u32 {
        self.pfx_cnt_v4
    }

    /// Number of active IPv6 pfx-peers on this peer.
    pub fn pfx_cnt_v6(&self) -> u32 {
        self.pfx_cnt_v6
    }
}

/// Per-(prefix, peer) state within a view.
#[derive(Debug, Clone)]
pub struct PfxPeerInfo {
    path_id: PathId,
    active: bool,
}

impl PfxPeerInfo {
    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PfxEntry {
    pub(crate) active_cnt: u32,
    pub(crate) peers: HashMap<PeerId, PfxPeerInfo>,
}

impl PfxEntry {
    pub(crate) fn is_active(&self) -> bool {
        self.active_cnt > 0
    }
}

/// A time-indexed snapshot of routing state across collectors and peers.
#[derive(Debug)]
pub struct BgpView {
    time: u32,
    pub(crate) peers: HashMap<PeerId, PeerInfo>,
    pub(crate) pfxs: HashMap<IpNet, PfxEntry>,
    sig_store: Arc<RwLock<PeerSignatureStore>>,
    path_store: Arc<RwLock<AsPathStore>>,
    poisoned: bool,
}

impl Default for BgpView {
    fn default() -> Self {
        BgpView::new()
    }
}

impl BgpView {
    /// Creates an empty view with fresh stores.
    pub fn new() -> Self {
        BgpView::with_stores(
            Arc::new(RwLock::new(PeerSignatureStore::new())),
            Arc::new(RwLock::new(AsPathStore::new())),
        )
    }

    /// Creates an empty view sharing the given stores.
    pub fn with_stores(
        sig_store: Arc<RwLock<PeerSignatureStore>>,
        path_store: Arc<RwLock<AsPathStore>>,
    ) -> Self {
        BgpView {
            time: 0,
            peers: HashMap::new(),
            pfxs: HashMap::new(),
            sig_store,
            path_store,
            poisoned: false,
        }
    }

    pub fn sig_store(&self) -> &Arc<RwLock<PeerSignatureStore>> {
        &self.sig_store
    }

    pub fn path_store(&self) -> &Arc<RwLock<AsPathStore>> {
        &self.path_store
    }

    /// Whether two views share the same store instances.
    pub fn same_stores(&self, other: &BgpView) -> bool {
        Arc::ptr_eq(&self.sig_store, &other.sig_store)
            && Arc::ptr_eq(&self.path_store, &other.path_store)
    }

    pub fn get_time(&self) -> u32 {
        self.time
    }

    pub fn set_time(&mut self, time: u32) {
        self.time = time;
    }

    fn guard(&self) -> Result<(), BgpViewError> {
        if self.poisoned {
            return Err(BgpViewError::Internal("view is poisoned".to_string()));
        }
        Ok(())
    }

    #[cold]
    fn poison(&mut self, msg: &str) -> BgpViewError {
        debug_assert!(false, "view invariant violated: {}", msg);
        self.poisoned = true;
        BgpViewError::Internal(format!("view invariant violated: {}", msg))
    }

    /// Interns the signature and creates an inactive peer if it is not part
    /// of the view yet.
    pub fn add_peer(
        &mut self,
        collector: &str,
        peer_ip: IpAddr,
        peer_asn: u32,
    ) -> Result<PeerId, BgpViewError> {
        self.guard()?;
        let id = self.sig_store.write().intern(collector, peer_ip, peer_asn)?;
        self.peers.entry(id).or_default();
        Ok(id)
    }

    /// Marks a peer active. Returns whether the flag changed.
    ///
    /// Used by decoders that install peers ahead of their pfx-peers; the
    /// engine relies on pfx-peer activation to propagate instead.
    pub fn activate_peer(&mut self, peer_id: PeerId) -> Result<bool, BgpViewError> {
        self.guard()?;
        let peer = self
            .peers
            .get_mut(&peer_id)
            .ok_or_else(|| BgpViewError::NotFound(format!("peer id {}", peer_id)))?;
        let changed = !peer.active;
        peer.active = true;
        Ok(changed)
    }

    /// Deactivates a peer and all of its pfx-peers. Returns whether the
    /// peer's flag changed.
    pub fn deactivate_peer(&mut self, peer_id: PeerId) -> Result<bool, BgpViewError> {
        self.guard()?;
        let peer = self
            .peers
            .get_mut(&peer_id)
            .ok_or_else(|| BgpViewError::NotFound(format!("peer id {}", peer_id)))?;
        let changed = peer.active;
        peer.active = false;
        peer.pfx_cnt_v4 = 0;
        peer.pfx_cnt_v6 = 0;

        for entry in self.pfxs.values_mut() {
            if let Some(pp) = entry.peers.get_mut(&peer_id) {
                if pp.active {
                    pp.active = false;
                    entry.active_cnt = entry.active_cnt.saturating_sub(1);
                }
            }
        }
        Ok(changed)
    }

    /// Removes a peer and all of its pfx-peers. Emptied prefixes stay in the
    /// map (inactive) until [BgpView::gc].
    pub fn remove_peer(&mut self, peer_id: PeerId) -> Result<(), BgpViewError> {
        self.guard()?;
        if self.peers.remove(&peer_id).is_none() {
            return Err(BgpViewError::NotFound(format!("peer id {}", peer_id)));
        }
        for entry in self.pfxs.values_mut() {
            if let Some(pp) = entry.peers.remove(&peer_id) {
                if pp.active {
                    entry.active_cnt = entry.active_cnt.saturating_sub(1);
                }
            }
        }
        Ok(())
    }

    /// Inserts or updates a pfx-peer. The pfx-peer is left inactive; callers
    /// activate it explicitly once the route should count.
    pub fn add_pfx_peer(
        &mut self,
        pfx: IpNet,
        peer_id: PeerId,
        path_id: PathId,
    ) -> Result<(), BgpViewError> {
        self.guard()?;
        if !self.peers.contains_key(&peer_id) {
            return Err(BgpViewError::NotFound(format!("peer id {}", peer_id)));
        }
        // every stored path id must resolve (invariant 5)
        self.path_store.read().get(path_id)?;

        let entry = self.pfxs.entry(pfx).or_default();
        let was_active = match entry.peers.get_mut(&peer_id) {
            Some(pp) => {
                let was_active = pp.active;
                pp.active = false;
                pp.path_id = path_id;
                if was_active {
                    entry.active_cnt = entry.active_cnt.saturating_sub(1);
                }
                Some(was_active)
            }
            None => {
                entry.peers.insert(
                    peer_id,
                    PfxPeerInfo {
                        path_id,
                        active: false,
                    },
                );
                None
            }
        };
        match was_active {
            // an updated pfx-peer loses its active state; callers re-activate
            Some(true) => self.on_pfx_peer_deactivated(&pfx, peer_id)?,
            Some(false) => {}
            None => {
                if let Some(peer) = self.peers.get_mut(&peer_id) {
                    peer.pfx_peer_cnt += 1;
                }
            }
        }
        Ok(())
    }

    /// Activates a pfx-peer, propagating prefix and peer activation and the
    /// per-family counts. Returns whether the flag changed.
    pub fn activate_pfx_peer(
        &mut self,
        pfx: IpNet,
        peer_id: PeerId,
    ) -> Result<bool, BgpViewError> {
        self.guard()?;
        let entry = self
            .pfxs
            .get_mut(&pfx)
            .ok_or_else(|| BgpViewError::NotFound(format!("pfx {}", pfx)))?;
        let pp = entry
            .peers
            .get_mut(&peer_id)
            .ok_or_else(|| BgpViewError::NotFound(format!("pfx-peer {}/{}", pfx, peer_id)))?;
        if pp.active {
            return Ok(false);
        }
        pp.active = true;
        entry.active_cnt += 1;

        match self.peers.get_mut(&peer_id) {
            Some(peer) => {
                match Afi::of_pfx(&pfx) {
                    Afi::Ipv4 => peer.pfx_cnt_v4 += 1,
                    Afi::Ipv6 => peer.pfx_cnt_v6 += 1,
                }
                peer.active = true;
            }
            None => return Err(self.poison("pfx-peer for unknown peer")),
        }
        Ok(true)
    }

    /// Deactivates a pfx-peer, leaving it present, and propagates the state
    /// downward. Returns whether the flag changed.
    pub fn deactivate_pfx_peer(
        &mut self,
        pfx: IpNet,
        peer_id: PeerId,
    ) -> Result<bool, BgpViewError> {
        self.guard()?;
        let underflow = {
            let entry = self
                .pfxs
                .get_mut(&pfx)
                .ok_or_else(|| BgpViewError::NotFound(format!("pfx {}", pfx)))?;
            let pp = entry
                .peers
                .get_mut(&peer_id)
                .ok_or_else(|| BgpViewError::NotFound(format!("pfx-peer {}/{}", pfx, peer_id)))?;
            if !pp.active {
                return Ok(false);
            }
            pp.active = false;
            if entry.active_cnt == 0 {
                true
            } else {
                entry.active_cnt -= 1;
                false
            }
        };
        if underflow {
            return Err(self.poison("active pfx-peer on inactive prefix"));
        }
        self.on_pfx_peer_deactivated(&pfx, peer_id)?;
        Ok(true)
    }

    // Adjusts peer counts after one active pfx-peer of (pfx, peer_id) was
    // deactivated or removed.
    fn on_pfx_peer_deactivated(&mut self, pfx: &IpNet, peer_id: PeerId) -> Result<(), BgpViewError> {
        let family = Afi::of_pfx(pfx);
        let underflow = match self.peers.get_mut(&peer_id) {
            Some(peer) => {
                let cnt = match family {
                    Afi::Ipv4 => &mut peer.pfx_cnt_v4,
                    Afi::Ipv6 => &mut peer.pfx_cnt_v6,
                };
                if *cnt == 0 {
                    true
                } else {
                    *cnt -= 1;
                    if peer.pfx_cnt_v4 == 0 && peer.pfx_cnt_v6 == 0 {
                        peer.active = false;
                    }
                    false
                }
            }
            None => true,
        };
        if underflow {
            return Err(self.poison("pfx-peer count underflow"));
        }
        Ok(())
    }

    /// Removes a pfx-peer. The prefix entry itself stays in the map.
    pub fn remove_pfx_peer(&mut self, pfx: IpNet, peer_id: PeerId) -> Result<(), BgpViewError> {
        self.deactivate_pfx_peer(pfx, peer_id)?;
        let entry = self
            .pfxs
            .get_mut(&pfx)
            .ok_or_else(|| BgpViewError::NotFound(format!("pfx {}", pfx)))?;
        entry.peers.remove(&peer_id);
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.pfx_peer_cnt = peer.pfx_peer_cnt.saturating_sub(1);
        }
        Ok(())
    }

    /// Drops prefixes with no remaining pfx-peers and peers with no
    /// remaining pfx-peers; only inactive entries are dropped.
    pub fn gc(&mut self) {
        self.pfxs
            .retain(|_, entry| !(entry.peers.is_empty() && !entry.is_active()));
        self.peers
            .retain(|_, peer| !(peer.pfx_peer_cnt == 0 && !peer.active));
    }

    /// Empties the peer and prefix maps. The shared stores are retained.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.pfxs.clear();
    }

    /// Structural deep copy sharing the same stores.
    pub fn dup(&self) -> BgpView {
        BgpView {
            time: self.time,
            peers: self.peers.clone(),
            pfxs: self.pfxs.clone(),
            sig_store: Arc::clone(&self.sig_store),
            path_store: Arc::clone(&self.path_store),
            poisoned: self.poisoned,
        }
    }

    /// Replaces this view's contents with a deep copy of `src`, adopting
    /// `src`'s stores.
    pub fn copy_from(&mut self, src: &BgpView) {
        *self = src.dup();
    }

    // Moves `other`'s contents into `self`. Used by decoders to commit a
    // scratch view built on the same stores.
    pub(crate) fn adopt(&mut self, other: BgpView) {
        self.time = other.time;
        self.peers = other.peers;
        self.pfxs = other.pfxs;
    }

    /// Number of prefixes matching the filter (and family, if given).
    pub fn pfx_cnt(&self, filter: FieldFilter, family: Option<Afi>) -> usize {
        self.pfxs(filter, family).count()
    }

    /// Number of peers matching the filter.
    pub fn peer_cnt(&self, filter: FieldFilter) -> usize {
        self.peers(filter).count()
    }

    /// Number of pfx-peers on a prefix matching the filter; 0 for an
    /// unknown prefix.
    pub fn pfx_peer_cnt(&self, pfx: &IpNet, filter: FieldFilter) -> usize {
        self.pfx(pfx).map(|p| p.peer_cnt(filter)).unwrap_or(0)
    }

    pub fn peer_info(&self, peer_id: PeerId) -> Option<&PeerInfo> {
        self.peers.get(&peer_id)
    }

    pub fn pfx_peer_info(&self, pfx: &IpNet, peer_id: PeerId) -> Option<&PfxPeerInfo> {
        self.pfxs.get(pfx).and_then(|e| e.peers.get(&peer_id))
    }
}
