//! The routing-table state engine.
//!
//! Consumes a stream of [BgpElem]s grouped by `(collector, peer)` and
//! maintains an eventually-consistent [BgpView]: RIB dumps are ingested
//! into an under-construction (UC) timeline and promoted to the reference
//! state at the end-of-valid-RIB signal, live announcements and withdrawals
//! are applied against the reference timeline, and peer session changes
//! invalidate the trust epoch. The engine owns no view; the caller injects
//! one (always the same instance) into every call.
//!
//! Within one `(collector, peer)` stream elements are processed in arrival
//! order. [RoutingTables::interval_end] is a barrier: elements behind it
//! fail with `OutOfOrder`. The engine never aborts on input: corrupted and
//! empty records are counted, unknown collectors and peers are
//! auto-registered, stale updates are dropped.

use crate::error::BgpViewError;
use crate::models::{Afi, BgpElem, DumpPosition, ElemType, PeerFsmState, RecordStatus};
use crate::store::PeerId;
use crate::utils::graphite_safe;
use crate::view::BgpView;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

mod metrics;
mod state;

pub use metrics::{KeyPackage, MetricSnapshot};
pub use state::CollectorStatus;

use state::{CollectorMetricIdx, CollectorRt, PeerMetricIdx, PeerRt, PfxStatus};

/// Inactive per-prefix state unseen for this long is dropped at interval
/// boundaries: no RIB has refreshed it for 24 hours.
pub const DEPRECATED_INFO_INTERVAL: u32 = 24 * 3600;

/// Default metric prefix.
pub const DEFAULT_METRIC_PREFIX: &str = "bgp";

/// Per-collector/per-peer state machine producing a [BgpView] from a BGP
/// element stream.
#[derive(Debug)]
pub struct RoutingTables {
    metric_prefix: String,
    metrics_output_on: bool,
    collectors: HashMap<String, CollectorRt>,
    peers: HashMap<PeerId, PeerRt>,
    kp: KeyPackage,
    bgp_time_interval_start: u32,
    /// The barrier: elements with older timestamps are rejected. 0 until
    /// the first interval completes.
    bgp_time_interval_end: u32,
}

impl Default for RoutingTables {
    fn default() -> Self {
        RoutingTables::new(DEFAULT_METRIC_PREFIX)
    }
}

impl RoutingTables {
    pub fn new(metric_prefix: &str) -> Self {
        RoutingTables {
            metric_prefix: graphite_safe(metric_prefix),
            metrics_output_on: true,
            collectors: HashMap::new(),
            peers: HashMap::new(),
            kp: KeyPackage::new(),
            bgp_time_interval_start: 0,
            bgp_time_interval_end: 0,
        }
    }

    /// Enables or disables metric generation at interval boundaries.
    pub fn set_metrics_output(&mut self, on: bool) {
        self.metrics_output_on = on;
    }

    /// Starts a new interval and stamps the view with its time.
    pub fn interval_start(&mut self, view: &mut BgpView, ts: u32) -> Result<(), BgpViewError> {
        if self.bgp_time_interval_end > 0 && ts < self.bgp_time_interval_end {
            return Err(BgpViewError::OutOfOrder {
                barrier: self.bgp_time_interval_end,
                ts,
            });
        }
        self.bgp_time_interval_start = ts;
        view.set_time(ts);
        Ok(())
    }

    /// Applies one element to the engine state and the view.
    ///
    /// Per-element problems (corrupted records, stale updates, unknown
    /// element shapes) are counted or logged and dropped; only barrier
    /// violations and resource exhaustion surface as errors.
    pub fn process_elem(
        &mut self,
        view: &mut BgpView,
        elem: &BgpElem,
    ) -> Result<(), BgpViewError> {
        if self.bgp_time_interval_end > 0 && elem.timestamp < self.bgp_time_interval_end {
            return Err(BgpViewError::OutOfOrder {
                barrier: self.bgp_time_interval_end,
                ts: elem.timestamp,
            });
        }

        let collector = self
            .collectors
            .entry(elem.collector.clone())
            .or_insert_with(CollectorRt::new);

        match elem.record_status {
            RecordStatus::CORRUPTED => {
                collector.corrupted_record_cnt += 1;
                return Ok(());
            }
            RecordStatus::EMPTY => {
                collector.empty_record_cnt += 1;
                return Ok(());
            }
            RecordStatus::VALID => {
                collector.valid_record_cnt += 1;
            }
        }
        collector.bgp_time_last = collector.bgp_time_last.max(elem.timestamp);

        // unknown peers are auto-registered; id space exhaustion is fatal
        let peer_id = view.add_peer(&elem.collector, elem.peer_ip, elem.peer_asn)?;
        collector.peer_ids.insert(peer_id);
        let peer = self
            .peers
            .entry(peer_id)
            .or_insert_with(|| PeerRt::new(&elem.collector));
        peer.last_ts = peer.last_ts.max(elem.timestamp);

        match elem.elem_type {
            ElemType::RIB => handle_rib(view, peer, collector, elem),
            ElemType::ANNOUNCE => handle_announce(view, peer_id, peer, elem),
            ElemType::WITHDRAW => handle_withdraw(view, peer_id, peer, elem),
            ElemType::STATE => handle_state(view, peer_id, peer, elem),
        }
    }

    /// Closes the interval at `ts`: applies pending end-of-valid-RIB
    /// promotions, emits the interval statistics, drops deprecated
    /// per-prefix state and raises the barrier. The view is not reset; it
    /// carries the cumulative active routing state.
    pub fn interval_end(
        &mut self,
        view: &mut BgpView,
        ts: u32,
    ) -> Result<MetricSnapshot, BgpViewError> {
        if ts < self.bgp_time_interval_end || ts < self.bgp_time_interval_start {
            return Err(BgpViewError::OutOfOrder {
                barrier: self.bgp_time_interval_end.max(self.bgp_time_interval_start),
                ts,
            });
        }

        self.apply_end_of_valid_rib(view, ts)?;

        let snapshot = if self.metrics_output_on {
            self.generate_metrics(view)?
        } else {
            MetricSnapshot::default()
        };

        self.drop_deprecated_state(view, ts);
        view.gc();

        self.bgp_time_interval_end = ts;
        Ok(snapshot)
    }

    fn apply_end_of_valid_rib(
        &mut self,
        view: &mut BgpView,
        ts: u32,
    ) -> Result<(), BgpViewError> {
        for collector in self.collectors.values_mut() {
            if !collector.eovrib_flag {
                continue;
            }
            for peer_id in &collector.peer_ids {
                if let Some(peer) = self.peers.get_mut(peer_id) {
                    if peer.uc_open() {
                        promote_uc_rib(view, *peer_id, peer, ts)?;
                    }
                }
            }

            collector.bgp_time_ref_rib_dump_time = collector.bgp_time_uc_rib_dump_time;
            collector.bgp_time_ref_rib_start_time = collector.bgp_time_uc_rib_start_time;
            collector.bgp_time_uc_rib_dump_time = 0;
            collector.bgp_time_uc_rib_start_time = 0;
            collector.eovrib_flag = false;
            collector.state = CollectorStatus::UP;
            collector.publish_flag = true;
        }
        Ok(())
    }

    fn generate_metrics(&mut self, view: &BgpView) -> Result<MetricSnapshot, BgpViewError> {
        for (name, collector) in self.collectors.iter_mut() {
            if !collector.publish_flag {
                continue;
            }
            let collector_gr = graphite_safe(name);

            let idxs = *collector.kp_idxs.get_or_insert_with(|| CollectorMetricIdx {
                status: self
                    .kp
                    .add_key(&format!("{}.{}.status", self.metric_prefix, collector_gr)),
                peers_cnt: self
                    .kp
                    .add_key(&format!("{}.{}.peers_cnt", self.metric_prefix, collector_gr)),
                active_peers_cnt: self.kp.add_key(&format!(
                    "{}.{}.active_peers_cnt",
                    self.metric_prefix, collector_gr
                )),
                active_peer_ases_cnt: self.kp.add_key(&format!(
                    "{}.{}.active_peer_ases_cnt",
                    self.metric_prefix, collector_gr
                )),
                valid_record_cnt: self.kp.add_key(&format!(
                    "{}.{}.valid_record_cnt",
                    self.metric_prefix, collector_gr
                )),
                corrupted_record_cnt: self.kp.add_key(&format!(
                    "{}.{}.corrupted_record_cnt",
                    self.metric_prefix, collector_gr
                )),
                empty_record_cnt: self.kp.add_key(&format!(
                    "{}.{}.empty_record_cnt",
                    self.metric_prefix, collector_gr
                )),
            });

            let mut active_peers = 0u64;
            let mut active_ases: HashSet<u32> = HashSet::new();
            for peer_id in &collector.peer_ids {
                if view.peer_info(*peer_id).map(|p| p.is_active()).unwrap_or(false) {
                    active_peers += 1;
                    if let Ok(sig) = view.sig_store().read().lookup(*peer_id) {
                        active_ases.insert(sig.peer_asn);
                    }
                }
            }

            self.kp.set(idxs.status, collector.state as u64);
            self.kp.set(idxs.peers_cnt, collector.peer_ids.len() as u64);
            self.kp.set(idxs.active_peers_cnt, active_peers);
            self.kp
                .set(idxs.active_peer_ases_cnt, active_ases.len() as u64);
            self.kp
                .set(idxs.valid_record_cnt, collector.valid_record_cnt as u64);
            self.kp.set(
                idxs.corrupted_record_cnt,
                collector.corrupted_record_cnt as u64,
            );
            self.kp
                .set(idxs.empty_record_cnt, collector.empty_record_cnt as u64);
            collector.reset_interval_counters();

            for peer_id in &collector.peer_ids {
                let Some(peer) = self.peers.get_mut(peer_id) else {
                    continue;
                };
                let sig = view.sig_store().read().lookup(*peer_id)?.clone();
                let peer_gr = format!(
                    "{}.{}.peer.{}.{}",
                    self.metric_prefix,
                    collector_gr,
                    sig.peer_asn,
                    graphite_safe(&sig.peer_ip.to_string())
                );

                let idxs = *peer.kp_idxs.get_or_insert_with(|| PeerMetricIdx {
                    status: self.kp.add_key(&format!("{}.status", peer_gr)),
                    active_v4_pfxs: self.kp.add_key(&format!("{}.active_v4_pfxs_cnt", peer_gr)),
                    active_v6_pfxs: self.kp.add_key(&format!("{}.active_v6_pfxs_cnt", peer_gr)),
                    inactive_v4_pfxs: self
                        .kp
                        .add_key(&format!("{}.inactive_v4_pfxs_cnt", peer_gr)),
                    inactive_v6_pfxs: self
                        .kp
                        .add_key(&format!("{}.inactive_v6_pfxs_cnt", peer_gr)),
                    rib_messages: self.kp.add_key(&format!("{}.rib_messages_cnt", peer_gr)),
                    announcements: self
                        .kp
                        .add_key(&format!("{}.pfx_announcements_cnt", peer_gr)),
                    withdrawals: self
                        .kp
                        .add_key(&format!("{}.pfx_withdrawals_cnt", peer_gr)),
                    state_messages: self
                        .kp
                        .add_key(&format!("{}.state_messages_cnt", peer_gr)),
                    positive_mismatches: self
                        .kp
                        .add_key(&format!("{}.rib_positive_mismatches_cnt", peer_gr)),
                    negative_mismatches: self
                        .kp
                        .add_key(&format!("{}.rib_negative_mismatches_cnt", peer_gr)),
                    announcing_origin_ases: self
                        .kp
                        .add_key(&format!("{}.announcing_origin_ases_cnt", peer_gr)),
                    announced_pfxs: self.kp.add_key(&format!("{}.announced_pfxs_cnt", peer_gr)),
                    withdrawn_pfxs: self.kp.add_key(&format!("{}.withdrawn_pfxs_cnt", peer_gr)),
                });

                let (active_v4, active_v6) = view
                    .peer_info(*peer_id)
                    .map(|p| (p.pfx_cnt_v4() as u64, p.pfx_cnt_v6() as u64))
                    .unwrap_or((0, 0));
                let mut inactive_v4 = 0u64;
                let mut inactive_v6 = 0u64;
                for (pfx, st) in &peer.pfx_state {
                    if !st.status.contains(PfxStatus::ANNOUNCED) {
                        match Afi::of_pfx(pfx) {
                            Afi::Ipv4 => inactive_v4 += 1,
                            Afi::Ipv6 => inactive_v6 += 1,
                        }
                    }
                }

                self.kp.set(idxs.status, peer.fsm_state as u64);
                self.kp.set(idxs.active_v4_pfxs, active_v4);
                self.kp.set(idxs.active_v6_pfxs, active_v6);
                self.kp.set(idxs.inactive_v4_pfxs, inactive_v4);
                self.kp.set(idxs.inactive_v6_pfxs, inactive_v6);
                self.kp.set(idxs.rib_messages, peer.rib_messages_cnt as u64);
                self.kp
                    .set(idxs.announcements, peer.pfx_announcements_cnt as u64);
                self.kp
                    .set(idxs.withdrawals, peer.pfx_withdrawals_cnt as u64);
                self.kp
                    .set(idxs.state_messages, peer.state_messages_cnt as u64);
                self.kp.set(
                    idxs.positive_mismatches,
                    peer.rib_positive_mismatches_cnt as u64,
                );
                self.kp.set(
                    idxs.negative_mismatches,
                    peer.rib_negative_mismatches_cnt as u64,
                );
                self.kp.set(
                    idxs.announcing_origin_ases,
                    peer.announcing_origins.len() as u64,
                );
                self.kp
                    .set(idxs.announced_pfxs, peer.announced_pfxs.len() as u64);
                self.kp
                    .set(idxs.withdrawn_pfxs, peer.withdrawn_pfxs.len() as u64);

                peer.metrics_generated = true;
                peer.reset_interval_counters();
            }
        }

        Ok(self.kp.snapshot(self.bgp_time_interval_start))
    }

    // Inactive per-prefix state unseen for DEPRECATED_INFO_INTERVAL is
    // dropped from both the engine and the view.
    fn drop_deprecated_state(&mut self, view: &mut BgpView, ts: u32) {
        let cutoff = ts.saturating_sub(DEPRECATED_INFO_INTERVAL);
        if cutoff == 0 {
            return;
        }
        for (peer_id, peer) in self.peers.iter_mut() {
            peer.pfx_state.retain(|pfx, st| {
                let stale = st.status.is_empty() && st.bgp_time_last < cutoff;
                if stale {
                    // the view may never have seen a UC-only prefix
                    let _ = view.remove_pfx_peer(*pfx, *peer_id);
                }
                !stale
            });
        }
    }

    /// Session state of a peer, if the engine has seen it.
    pub fn peer_fsm_state(&self, peer_id: PeerId) -> Option<PeerFsmState> {
        self.peers.get(&peer_id).map(|p| p.fsm_state)
    }

    /// `(start, end)` of the peer's reference RIB window.
    pub fn peer_ref_rib_window(&self, peer_id: PeerId) -> Option<(u32, u32)> {
        self.peers
            .get(&peer_id)
            .map(|p| (p.bgp_time_ref_rib_start, p.bgp_time_ref_rib_end))
    }

    /// `(start, end)` of the peer's under-construction RIB window; `(0, 0)`
    /// while no UC RIB is open.
    pub fn peer_uc_rib_window(&self, peer_id: PeerId) -> Option<(u32, u32)> {
        self.peers
            .get(&peer_id)
            .map(|p| (p.bgp_time_uc_rib_start, p.bgp_time_uc_rib_end))
    }

    /// `(positive, negative)` RIB mismatch counters of the current interval.
    pub fn peer_mismatch_counts(&self, peer_id: PeerId) -> Option<(u32, u32)> {
        self.peers.get(&peer_id).map(|p| {
            (
                p.rib_positive_mismatches_cnt,
                p.rib_negative_mismatches_cnt,
            )
        })
    }

    pub fn collector_status(&self, collector: &str) -> Option<CollectorStatus> {
        self.collectors.get(collector).map(|c| c.state)
    }

    /// `(valid, corrupted, empty)` record counters of the current interval.
    pub fn collector_record_counts(&self, collector: &str) -> Option<(u32, u32, u32)> {
        self.collectors.get(collector).map(|c| {
            (
                c.valid_record_cnt,
                c.corrupted_record_cnt,
                c.empty_record_cnt,
            )
        })
    }
}

fn handle_rib(
    view: &mut BgpView,
    peer: &mut PeerRt,
    collector: &mut CollectorRt,
    elem: &BgpElem,
) -> Result<(), BgpViewError> {
    let ts = elem.timestamp;
    peer.rib_messages_cnt += 1;

    if !peer.uc_open() {
        peer.bgp_time_uc_rib_start = ts;
        peer.bgp_time_uc_rib_end = ts;
    }
    if collector.bgp_time_uc_rib_start_time == 0 {
        collector.bgp_time_uc_rib_start_time = ts;
        collector.bgp_time_uc_rib_dump_time = ts;
    }

    if let (Some(pfx), Some(path)) = (elem.prefix, elem.as_path.as_ref()) {
        let path_id = view.path_store().write().insert_path(path, true)?;
        let delta = ts.saturating_sub(peer.bgp_time_uc_rib_start).min(u16::MAX as u32) as u16;
        let st = peer.pfx_state.entry(pfx).or_default();
        st.uc_path_id = Some(path_id);
        st.status.insert(PfxStatus::UC_ANNOUNCED);
        st.bgp_time_uc_delta = delta;
        st.bgp_time_last = st.bgp_time_last.max(ts);
        peer.bgp_time_uc_rib_end = peer.bgp_time_uc_rib_end.max(ts);
    }

    if elem.dump_pos == DumpPosition::END {
        peer.bgp_time_uc_rib_end = peer.bgp_time_uc_rib_end.max(ts);
        collector.eovrib_flag = true;
    }
    Ok(())
}

fn handle_announce(
    view: &mut BgpView,
    peer_id: PeerId,
    peer: &mut PeerRt,
    elem: &BgpElem,
) -> Result<(), BgpViewError> {
    let ts = elem.timestamp;
    let (Some(pfx), Some(path)) = (elem.prefix, elem.as_path.as_ref()) else {
        warn!("announcement without prefix or path from {}", elem.peer_ip);
        return Ok(());
    };

    peer.pfx_announcements_cnt += 1;
    peer.announced_pfxs.insert(pfx);
    if let Some(origin) = path.origin_segment() {
        peer.announcing_origins.insert(origin.clone());
    }

    if peer.fsm_state != PeerFsmState::ESTABLISHED {
        debug!("dropping announcement from non-established peer {}", elem.peer_ip);
        return Ok(());
    }
    if ts < peer.bgp_time_ref_rib_start {
        debug!("dropping stale announcement from {} at {}", elem.peer_ip, ts);
        return Ok(());
    }

    let path_id = view.path_store().write().insert_path(path, true)?;

    if peer.uc_open() && ts >= peer.bgp_time_uc_rib_start {
        // a complete snapshot is under construction; fold the update into it
        let delta = ts.saturating_sub(peer.bgp_time_uc_rib_start).min(u16::MAX as u32) as u16;
        let st = peer.pfx_state.entry(pfx).or_default();
        st.uc_path_id = Some(path_id);
        st.status.insert(PfxStatus::UC_ANNOUNCED);
        st.bgp_time_uc_delta = delta;
        st.bgp_time_last = st.bgp_time_last.max(ts);
    } else {
        view.add_pfx_peer(pfx, peer_id, path_id)?;
        view.activate_pfx_peer(pfx, peer_id)?;
        let st = peer.pfx_state.entry(pfx).or_default();
        st.status.insert(PfxStatus::ANNOUNCED);
        st.bgp_time_last = st.bgp_time_last.max(ts);
    }
    Ok(())
}

fn handle_withdraw(
    view: &mut BgpView,
    peer_id: PeerId,
    peer: &mut PeerRt,
    elem: &BgpElem,
) -> Result<(), BgpViewError> {
    let ts = elem.timestamp;
    let Some(pfx) = elem.prefix else {
        warn!("withdrawal without prefix from {}", elem.peer_ip);
        return Ok(());
    };

    peer.pfx_withdrawals_cnt += 1;
    peer.withdrawn_pfxs.insert(pfx);

    if peer.fsm_state != PeerFsmState::ESTABLISHED {
        debug!("dropping withdrawal from non-established peer {}", elem.peer_ip);
        return Ok(());
    }
    if ts < peer.bgp_time_ref_rib_start {
        debug!("dropping stale withdrawal from {} at {}", elem.peer_ip, ts);
        return Ok(());
    }

    let uc_window = peer.uc_open() && ts >= peer.bgp_time_uc_rib_start;
    let Some(st) = peer.pfx_state.get_mut(&pfx) else {
        // never announced by this peer; nothing to undo
        return Ok(());
    };

    if uc_window {
        st.status.remove(PfxStatus::UC_ANNOUNCED);
        st.uc_path_id = None;
    }
    if st.status.contains(PfxStatus::ANNOUNCED) {
        view.deactivate_pfx_peer(pfx, peer_id)?;
        st.status.remove(PfxStatus::ANNOUNCED);
    }
    st.bgp_time_last = st.bgp_time_last.max(ts);
    Ok(())
}

fn handle_state(
    view: &mut BgpView,
    peer_id: PeerId,
    peer: &mut PeerRt,
    elem: &BgpElem,
) -> Result<(), BgpViewError> {
    let ts = elem.timestamp;
    peer.state_messages_cnt += 1;

    let Some(new_state) = elem.new_state else {
        warn!("state element without a new state from {}", elem.peer_ip);
        return Ok(());
    };
    let old_state = peer.fsm_state;
    peer.fsm_state = new_state;

    if old_state == PeerFsmState::ESTABLISHED && new_state != PeerFsmState::ESTABLISHED {
        // session lost: nothing this peer advertised can be trusted anymore
        view.deactivate_peer(peer_id)?;
        for st in peer.pfx_state.values_mut() {
            st.status.remove(PfxStatus::ANNOUNCED);
            st.bgp_time_last = st.bgp_time_last.max(ts);
        }
        peer.bgp_time_ref_rib_start = ts;
        peer.bgp_time_ref_rib_end = ts;
    } else if new_state == PeerFsmState::ESTABLISHED && old_state != PeerFsmState::ESTABLISHED {
        // fresh session: new trust epoch, wait for a RIB or announcements
        peer.reset_interval_counters();
        peer.bgp_time_ref_rib_start = ts;
        peer.bgp_time_ref_rib_end = ts;
    }
    Ok(())
}

// Promotes the under-construction RIB of one peer to its reference state.
//
// A prefix both in the UC RIB and touched by a live update resolves to the
// newer timestamp, ties in favor of the UC entry (it represents a complete
// snapshot). Active prefixes not present in the new RIB are deactivated
// (positive mismatch) unless a live update refreshed them during the dump;
// UC prefixes that were inactive before count as negative mismatches.
fn promote_uc_rib(
    view: &mut BgpView,
    peer_id: PeerId,
    peer: &mut PeerRt,
    eovrib_ts: u32,
) -> Result<(), BgpViewError> {
    peer.bgp_time_uc_rib_end = peer.bgp_time_uc_rib_end.max(eovrib_ts);
    let uc_start = peer.bgp_time_uc_rib_start;

    for (pfx, st) in peer.pfx_state.iter_mut() {
        if st.status.contains(PfxStatus::UC_ANNOUNCED) {
            let uc_ts = uc_start.saturating_add(st.bgp_time_uc_delta as u32);
            let uc_wins = st.bgp_time_last <= uc_ts || !st.status.contains(PfxStatus::ANNOUNCED);
            if uc_wins {
                if !st.status.contains(PfxStatus::ANNOUNCED) {
                    peer.rib_negative_mismatches_cnt += 1;
                }
                if let Some(path_id) = st.uc_path_id {
                    view.add_pfx_peer(*pfx, peer_id, path_id)?;
                    view.activate_pfx_peer(*pfx, peer_id)?;
                }
                st.status.insert(PfxStatus::ANNOUNCED);
                st.bgp_time_last = st.bgp_time_last.max(uc_ts);
            }
            st.status.remove(PfxStatus::UC_ANNOUNCED);
            st.uc_path_id = None;
            st.bgp_time_uc_delta = 0;
        } else if st.status.contains(PfxStatus::ANNOUNCED) && st.bgp_time_last < uc_start {
            // active route missing from the complete snapshot
            view.deactivate_pfx_peer(*pfx, peer_id)?;
            st.status.remove(PfxStatus::ANNOUNCED);
            peer.rib_positive_mismatches_cnt += 1;
        }
    }

    peer.bgp_time_ref_rib_start = peer.bgp_time_uc_rib_start;
    peer.bgp_time_ref_rib_end = peer.bgp_time_uc_rib_end;
    peer.bgp_time_uc_rib_start = 0;
    peer.bgp_time_uc_rib_end = 0;
    // a complete RIB implies the session is up
    peer.fsm_state = PeerFsmState::ESTABLISHED;
    Ok(())
}
