//! Parent-relative view diffs for the sync/diff wire protocol.
//!
//! A diff frame carries the pfx-peer delta between a parent view P and the
//! current view V (both on the same stores): prefixes added since P are
//! emitted whole, removed prefixes as bare remove records, and changed
//! prefixes as per-edge add/change/remove lists. Prefixes with identical
//! active pfx-peer sets are omitted. Applying a diff on top of the parent
//! reconstructs the current view's active routing state.

use crate::error::BgpViewError;
use crate::io::file::{encode_paths, put_peer_entry, read_paths, read_pfx, read_view_frame};
use crate::io::*;
use crate::store::{PathId, PeerId};
use crate::view::{BgpView, FieldFilter};
use bytes::{BufMut, Bytes, BytesMut};
use ipnet::IpNet;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

/// Per-prefix diff record type.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum DiffOp {
    ADD = 1,
    REMOVE = 2,
    CHANGE = 3,
}

/// Statistics of one produced diff frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Prefixes with identical pfx-peer sets in parent and current (not on
    /// the wire).
    pub common_pfxs_cnt: u32,
    pub added_pfxs_cnt: u32,
    pub removed_pfxs_cnt: u32,
    pub changed_pfxs_cnt: u32,
    pub added_pfx_peer_cnt: u32,
    pub changed_pfx_peer_cnt: u32,
    pub removed_pfx_peer_cnt: u32,
    /// Prefixes carried by the last sync frame (filled by the sender).
    pub sync_pfx_cnt: u32,
    /// Prefixes in the current view's projection.
    pub pfx_cnt: u32,
}

/// The kind of frame found on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Sync,
    Diff,
}

// The filtered active pfx-peer projection of a view, keyed by prefix; the
// unit both sides of a diff are compared in.
fn active_projection(
    view: &BgpView,
    filter: Option<&dyn ViewFilter>,
) -> HashMap<IpNet, HashMap<PeerId, PathId>> {
    let admitted: HashSet<PeerId> = view
        .peers(FieldFilter::ACTIVE)
        .filter(|p| filter.map(|f| f.keep_peer(p)).unwrap_or(true))
        .map(|p| p.peer_id())
        .collect();

    let mut projection = HashMap::new();
    for pfx in view.pfxs(FieldFilter::ACTIVE, None) {
        if let Some(f) = filter {
            if !f.keep_pfx(&pfx) {
                continue;
            }
        }
        let mut edges = HashMap::new();
        for pfx_peer in pfx.peers(FieldFilter::ACTIVE) {
            if !admitted.contains(&pfx_peer.peer_id()) {
                continue;
            }
            if let Some(f) = filter {
                if !f.keep_pfx_peer(&pfx_peer) {
                    continue;
                }
            }
            edges.insert(pfx_peer.peer_id(), pfx_peer.path_id());
        }
        if !edges.is_empty() {
            projection.insert(pfx.pfx(), edges);
        }
    }
    projection
}

fn put_pfx(buf: &mut BytesMut, pfx: &IpNet) {
    put_ip(buf, &pfx.addr());
    buf.put_u8(pfx.prefix_len());
}

fn put_edge_list(buf: &mut BytesMut, edges: &[(PeerId, PathId)]) {
    for (peer_id, path_id) in edges {
        buf.put_u16(*peer_id);
        buf.put_u32_ne(path_id.idx);
    }
    put_magic(buf, VIEW_PEER_END_MAGIC);
    buf.put_u16(edges.len() as u16);
}

/// Computes and serializes the diff between `parent` and `current`.
///
/// Both views must share the same stores; `InvalidArg` otherwise.
pub fn encode_diff(
    parent: &BgpView,
    current: &BgpView,
    filter: Option<&dyn ViewFilter>,
) -> Result<(Bytes, DiffStats), BgpViewError> {
    if !parent.same_stores(current) {
        return Err(BgpViewError::InvalidArg(
            "diff requires parent and current view to share stores".to_string(),
        ));
    }

    let parent_proj = active_projection(parent, filter);
    let current_proj = active_projection(current, filter);

    let mut stats = DiffStats {
        pfx_cnt: current_proj.len() as u32,
        ..Default::default()
    };

    let mut buf = BytesMut::with_capacity(4096);
    put_magic(&mut buf, VIEW_DIFF_MAGIC);
    buf.put_u32(current.get_time());
    buf.put_u32(parent.get_time());

    // the peer section must cover every peer the records reference,
    // including peers whose last edge is being removed (they may be
    // inactive in the current view and absent from its active iteration)
    let mut referenced: HashSet<PeerId> = current
        .peers(FieldFilter::ACTIVE)
        .filter(|p| filter.map(|f| f.keep_peer(p)).unwrap_or(true))
        .map(|p| p.peer_id())
        .collect();
    for (pfx, parent_edges) in &parent_proj {
        match current_proj.get(pfx) {
            Some(edges) if edges == parent_edges => {}
            _ => referenced.extend(parent_edges.keys()),
        }
    }
    {
        let sig_store = current.sig_store().read();
        let mut peers_tx: u16 = 0;
        for peer_id in &referenced {
            put_peer_entry(&mut buf, *peer_id, sig_store.lookup(*peer_id)?);
            peers_tx += 1;
        }
        put_magic(&mut buf, VIEW_PEER_END_MAGIC);
        buf.put_u16(peers_tx);
    }

    encode_paths(&mut buf, current);

    let mut records: u32 = 0;

    for (pfx, edges) in &current_proj {
        match parent_proj.get(pfx) {
            None => {
                // new prefix: emitted whole
                put_pfx(&mut buf, pfx);
                buf.put_u8(DiffOp::ADD.into());
                let list: Vec<(PeerId, PathId)> =
                    edges.iter().map(|(p, id)| (*p, *id)).collect();
                put_edge_list(&mut buf, &list);
                stats.added_pfxs_cnt += 1;
                stats.added_pfx_peer_cnt += list.len() as u32;
                records += 1;
            }
            Some(parent_edges) if parent_edges == edges => {
                stats.common_pfxs_cnt += 1;
            }
            Some(parent_edges) => {
                let mut added = Vec::new();
                let mut changed = Vec::new();
                let mut removed = Vec::new();
                for (peer_id, path_id) in edges {
                    match parent_edges.get(peer_id) {
                        None => added.push((*peer_id, *path_id)),
                        Some(old) if old != path_id => changed.push((*peer_id, *path_id)),
                        Some(_) => {}
                    }
                }
                for peer_id in parent_edges.keys() {
                    if !edges.contains_key(peer_id) {
                        removed.push(*peer_id);
                    }
                }

                put_pfx(&mut buf, pfx);
                buf.put_u8(DiffOp::CHANGE.into());
                put_edge_list(&mut buf, &added);
                put_edge_list(&mut buf, &changed);
                for peer_id in &removed {
                    buf.put_u16(*peer_id);
                }
                put_magic(&mut buf, VIEW_PEER_END_MAGIC);
                buf.put_u16(removed.len() as u16);

                stats.changed_pfxs_cnt += 1;
                stats.added_pfx_peer_cnt += added.len() as u32;
                stats.changed_pfx_peer_cnt += changed.len() as u32;
                stats.removed_pfx_peer_cnt += removed.len() as u32;
                records += 1;
            }
        }
    }

    for pfx in parent_proj.keys() {
        if !current_proj.contains_key(pfx) {
            put_pfx(&mut buf, pfx);
            buf.put_u8(DiffOp::REMOVE.into());
            stats.removed_pfxs_cnt += 1;
            records += 1;
        }
    }

    put_magic(&mut buf, VIEW_PFX_END_MAGIC);
    buf.put_u32(records);
    put_magic(&mut buf, VIEW_END_MAGIC);

    Ok((buf.freeze(), stats))
}

/// Serializes a diff to a writer. See [encode_diff].
pub fn write_diff<W: Write>(
    writer: &mut W,
    parent: &BgpView,
    current: &BgpView,
    filter: Option<&dyn ViewFilter>,
) -> Result<DiffStats, BgpViewError> {
    let (bytes, stats) = encode_diff(parent, current, filter)?;
    writer.write_all(&bytes)?;
    Ok(stats)
}

/// Reads one diff frame and applies it to `view` (typically the previously
/// received parent). Returns `Ok(false)` on clean end of stream. On any
/// error the view is left structurally unchanged.
pub fn read_diff<R: Read>(reader: &mut R, view: &mut BgpView) -> Result<bool, BgpViewError> {
    let mut fr = FrameReader::new(reader);
    if fr.peek_marker()?.is_none() {
        return Ok(false);
    }
    read_diff_frame(&mut fr, view)?;
    Ok(true)
}

/// Reads the next frame (sync or diff) and applies it to `view`.
///
/// A sync frame replaces the view's contents, a diff frame patches them.
/// Returns `Ok(None)` on a clean end of stream.
pub fn read_frame<R: Read>(
    reader: &mut R,
    view: &mut BgpView,
) -> Result<Option<FrameKind>, BgpViewError> {
    let mut fr = FrameReader::new(reader);
    let marker = match fr.peek_marker()? {
        None => return Ok(None),
        Some(m) => m,
    };
    match (marker & 0xffff_ffff) as u32 {
        VIEW_START_MAGIC => {
            read_view_frame(&mut fr, view)?;
            Ok(Some(FrameKind::Sync))
        }
        VIEW_DIFF_MAGIC => {
            read_diff_frame(&mut fr, view)?;
            Ok(Some(FrameKind::Diff))
        }
        other => Err(BgpViewError::CorruptStream(format!(
            "unknown frame magic {:#010x}",
            other
        ))),
    }
}

fn read_diff_frame<R: Read>(
    fr: &mut FrameReader<R>,
    view: &mut BgpView,
) -> Result<(), BgpViewError> {
    fr.expect_magic(VIEW_DIFF_MAGIC, "diff-start")?;
    let time = fr.read_u32_be()?;
    let _parent_time = fr.read_u32_be()?;

    // patch a scratch copy; commit only on success
    let mut scratch = view.dup();
    scratch.set_time(time);

    let peer_map = read_diff_peers(fr, &mut scratch)?;
    let path_map = read_paths(fr, &mut scratch)?;

    let mut records_rx: u32 = 0;
    while !fr.check_magic(VIEW_PFX_END_MAGIC)? {
        let pfx = read_pfx(fr)?;
        let op = fr.read_u8()?;
        let op = DiffOp::try_from(op)
            .map_err(|_| BgpViewError::InvalidFormat(format!("unknown diff op {}", op)))?;
        records_rx += 1;

        match op {
            DiffOp::ADD => {
                apply_edge_list(fr, &mut scratch, pfx, &peer_map, &path_map)?;
            }
            DiffOp::REMOVE => {
                let peer_ids: Vec<PeerId> = scratch
                    .pfx(&pfx)
                    .map(|p| p.peers(FieldFilter::ALL).map(|pp| pp.peer_id()).collect())
                    .unwrap_or_default();
                for peer_id in peer_ids {
                    scratch.remove_pfx_peer(pfx, peer_id)?;
                }
            }
            DiffOp::CHANGE => {
                // added, then changed edges: both upsert + activate
                apply_edge_list(fr, &mut scratch, pfx, &peer_map, &path_map)?;
                apply_edge_list(fr, &mut scratch, pfx, &peer_map, &path_map)?;

                let mut removed_rx: u16 = 0;
                while !fr.check_magic(VIEW_PEER_END_MAGIC)? {
                    let remote_peer = fr.read_u16_be()?;
                    let peer_id = *peer_map.get(&remote_peer).ok_or_else(|| {
                        BgpViewError::CorruptStream(format!(
                            "unknown peer id {} in diff",
                            remote_peer
                        ))
                    })?;
                    scratch.remove_pfx_peer(pfx, peer_id).map_err(|_| {
                        BgpViewError::CorruptStream(format!(
                            "diff removes unknown pfx-peer {}/{}",
                            pfx, peer_id
                        ))
                    })?;
                    removed_rx += 1;
                }
                let removed_sent = fr.read_u16_be()?;
                if removed_sent != removed_rx {
                    return Err(BgpViewError::CorruptStream(format!(
                        "removed pfx-peer count mismatch for {}: sent {}, received {}",
                        pfx, removed_sent, removed_rx
                    )));
                }
            }
        }
    }

    let records_sent = fr.read_u32_be()?;
    if records_sent != records_rx {
        return Err(BgpViewError::CorruptStream(format!(
            "diff record count mismatch: sent {}, received {}",
            records_sent, records_rx
        )));
    }
    fr.expect_magic(VIEW_END_MAGIC, "end-of-diff")?;

    view.adopt(scratch);
    Ok(())
}

// Same wire layout as the sync peer section, but peers are only
// registered, never activated: a diff patches peer activity through its
// edge records, and some referenced peers (removed edges) are inactive.
fn read_diff_peers<R: Read>(
    fr: &mut FrameReader<R>,
    view: &mut BgpView,
) -> Result<HashMap<PeerId, PeerId>, BgpViewError> {
    let mut idmap = HashMap::new();
    let mut peers_rx: u16 = 0;

    while !fr.check_magic(VIEW_PEER_END_MAGIC)? {
        let remote_id = fr.read_u16_be()?;
        let collector_len = fr.read_u8()?;
        let collector = String::from_utf8(fr.read_n_bytes(collector_len as usize)?)
            .map_err(|_| BgpViewError::InvalidFormat("non-utf8 collector name".to_string()))?;
        let peer_ip = fr.read_ip()?;
        let peer_asn = fr.read_u32_be()?;

        let local_id = view.add_peer(&collector, peer_ip, peer_asn)?;
        idmap.insert(remote_id, local_id);
        peers_rx += 1;
    }

    let peers_sent = fr.read_u16_be()?;
    if peers_sent != peers_rx {
        return Err(BgpViewError::CorruptStream(format!(
            "peer count mismatch: sent {}, received {}",
            peers_sent, peers_rx
        )));
    }
    Ok(idmap)
}

fn apply_edge_list<R: Read>(
    fr: &mut FrameReader<R>,
    view: &mut BgpView,
    pfx: IpNet,
    peer_map: &HashMap<PeerId, PeerId>,
    path_map: &HashMap<u32, PathId>,
) -> Result<(), BgpViewError> {
    let mut edges_rx: u16 = 0;
    while !fr.check_magic(VIEW_PEER_END_MAGIC)? {
        let remote_peer = fr.read_u16_be()?;
        let remote_path = fr.read_u32_ne()?;
        edges_rx += 1;

        let peer_id = *peer_map.get(&remote_peer).ok_or_else(|| {
            BgpViewError::CorruptStream(format!("unknown peer id {} in diff", remote_peer))
        })?;
        let path_id = *path_map.get(&remote_path).ok_or_else(|| {
            BgpViewError::CorruptStream(format!("unknown path index {} in diff", remote_path))
        })?;

        view.add_pfx_peer(pfx, peer_id, path_id)?;
        view.activate_pfx_peer(pfx, peer_id)?;
    }
    let edges_sent = fr.read_u16_be()?;
    if edges_sent != edges_rx {
        return Err(BgpViewError::CorruptStream(format!(
            "pfx-peer count mismatch for {}: sent {}, received {}",
            pfx, edges_sent, edges_rx
        )));
    }
    Ok(())
}
