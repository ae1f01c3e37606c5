//! Internal per-collector, per-peer and per-(peer, prefix) state of the
//! routing-table engine.

use crate::models::{AsPathSegment, PeerFsmState};
use crate::store::{PathId, PeerId};
use bitflags::bitflags;
use ipnet::IpNet;
use std::collections::{HashMap, HashSet};

bitflags! {
    /// Announcement status of one (collector, peer, prefix).
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub(crate) struct PfxStatus: u8 {
        /// Announced in the active (reference) state.
        const ANNOUNCED = 0x01;
        /// Announced in the under-construction RIB.
        const UC_ANNOUNCED = 0x10;
    }
}

impl Default for PfxStatus {
    fn default() -> Self {
        PfxStatus::empty()
    }
}

/// Inferred status of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CollectorStatus {
    /// Not enough information yet (initialization, or corrupted data).
    UNKNOWN,
    UP,
    DOWN,
}

/// State attached to one (collector, peer, prefix).
#[derive(Debug, Clone, Default)]
pub(crate) struct PfxPeerRt {
    /// Path observed in the current under-construction RIB.
    pub uc_path_id: Option<PathId>,
    /// Offset of the last RIB message for this prefix from the UC RIB start.
    pub bgp_time_uc_delta: u16,
    /// BGP time of the most recent operation involving this prefix/peer.
    pub bgp_time_last: u32,
    pub status: PfxStatus,
}

/// State attached to one (collector, peer).
#[derive(Debug)]
pub(crate) struct PeerRt {
    pub collector: String,
    /// If the peer is active the state is ESTABLISHED; when inactive it
    /// reflects the last observed session state, UNKNOWN if none was seen.
    pub fsm_state: PeerFsmState,
    pub bgp_time_ref_rib_start: u32,
    pub bgp_time_ref_rib_end: u32,
    /// 0 while no under-construction RIB is open.
    pub bgp_time_uc_rib_start: u32,
    pub bgp_time_uc_rib_end: u32,
    pub last_ts: u32,
    pub metrics_generated: bool,
    pub kp_idxs: Option<PeerMetricIdx>,

    // interval counters
    pub rib_messages_cnt: u32,
    pub pfx_announcements_cnt: u32,
    pub pfx_withdrawals_cnt: u32,
    pub state_messages_cnt: u32,
    pub rib_positive_mismatches_cnt: u32,
    pub rib_negative_mismatches_cnt: u32,
    pub announcing_origins: HashSet<AsPathSegment>,
    pub announced_pfxs: HashSet<IpNet>,
    pub withdrawn_pfxs: HashSet<IpNet>,

    pub pfx_state: HashMap<IpNet, PfxPeerRt>,
}

impl PeerRt {
    pub fn new(collector: &str) -> Self {
        PeerRt {
            collector: collector.to_string(),
            fsm_state: PeerFsmState::UNKNOWN,
            bgp_time_ref_rib_start: 0,
            bgp_time_ref_rib_end: 0,
            bgp_time_uc_rib_start: 0,
            bgp_time_uc_rib_end: 0,
            last_ts: 0,
            metrics_generated: false,
            kp_idxs: None,
            rib_messages_cnt: 0,
            pfx_announcements_cnt: 0,
            pfx_withdrawals_cnt: 0,
            state_messages_cnt: 0,
            rib_positive_mismatches_cnt: 0,
            rib_negative_mismatches_cnt: 0,
            announcing_origins: HashSet::new(),
            announced_pfxs: HashSet::new(),
            withdrawn_pfxs: HashSet::new(),
            pfx_state: HashMap::new(),
        }
    }

    pub fn uc_open(&self) -> bool {
        self.bgp_time_uc_rib_start > 0
    }

    pub fn reset_interval_counters(&mut self) {
        self.rib_messages_cnt = 0;
        self.pfx_announcements_cnt = 0;
        self.pfx_withdrawals_cnt = 0;
        self.state_messages_cnt = 0;
        self.rib_positive_mismatches_cnt = 0;
        self.rib_negative_mismatches_cnt = 0;
        self.announcing_origins.clear();
        self.announced_pfxs.clear();
        self.withdrawn_pfxs.clear();
    }
}

/// Metric indices of one peer within the key package.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeerMetricIdx {
    pub status: usize,
    pub active_v4_pfxs: usize,
    pub active_v6_pfxs: usize,
    pub inactive_v4_pfxs: usize,
    pub inactive_v6_pfxs: usize,
    pub rib_messages: usize,
    pub announcements: usize,
    pub withdrawals: usize,
    pub state_messages: usize,
    pub positive_mismatches: usize,
    pub negative_mismatches: usize,
    pub announcing_origin_ases: usize,
    pub announced_pfxs: usize,
    pub withdrawn_pfxs: usize,
}

/// State attached to one collector.
#[derive(Debug)]
pub(crate) struct CollectorRt {
    pub peer_ids: HashSet<PeerId>,
    /// Last time the collector was involved in bgp operations (bgp time).
    pub bgp_time_last: u32,
    pub bgp_time_ref_rib_dump_time: u32,
    pub bgp_time_ref_rib_start_time: u32,
    /// 0 while no under-construction RIB is open.
    pub bgp_time_uc_rib_dump_time: u32,
    pub bgp_time_uc_rib_start_time: u32,
    pub state: CollectorStatus,
    /// End-of-valid-RIB promotion due at the end of the interval.
    pub eovrib_flag: bool,
    /// Statistics are published only once the collector has produced a
    /// complete RIB.
    pub publish_flag: bool,
    pub kp_idxs: Option<CollectorMetricIdx>,

    // interval counters
    pub valid_record_cnt: u32,
    pub corrupted_record_cnt: u32,
    pub empty_record_cnt: u32,
}

impl CollectorRt {
    pub fn new() -> Self {
        CollectorRt {
            peer_ids: HashSet::new(),
            bgp_time_last: 0,
            bgp_time_ref_rib_dump_time: 0,
            bgp_time_ref_rib_start_time: 0,
            bgp_time_uc_rib_dump_time: 0,
            bgp_time_uc_rib_start_time: 0,
            state: CollectorStatus::UNKNOWN,
            eovrib_flag: false,
            publish_flag: false,
            kp_idxs: None,
            valid_record_cnt: 0,
            corrupted_record_cnt: 0,
            empty_record_cnt: 0,
        }
    }

    pub fn reset_interval_counters(&mut self) {
        self.valid_record_cnt = 0;
        self.corrupted_record_cnt = 0;
        self.empty_record_cnt = 0;
    }
}

/// Metric indices of one collector within the key package.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CollectorMetricIdx {
    pub status: usize,
    pub peers_cnt: usize,
    pub active_peers_cnt: usize,
    pub active_peer_ases_cnt: usize,
    pub valid_record_cnt: usize,
    pub corrupted_record_cnt: usize,
    pub empty_record_cnt: usize,
}
