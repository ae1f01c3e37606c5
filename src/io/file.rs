//! Full-view serialization: the magic-framed binary format and the ASCII
//! dump.
//!
//! A binary stream may carry any number of concatenated views; end of
//! stream at a view boundary is the normal termination. Decoding never
//! touches the caller's view on failure: the frame is decoded into a
//! scratch view sharing the caller's stores and committed only once the
//! end-of-view magic has been verified.

use crate::error::BgpViewError;
use crate::io::*;
use crate::models::Afi;
use crate::store::{PathId, PeerId};
use crate::view::{BgpView, FieldFilter};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::io::{Read, Write};

/// Serializes a view (its active projection) into a framed byte buffer.
pub fn encode_view(
    view: &BgpView,
    filter: Option<&dyn ViewFilter>,
) -> Result<Bytes, BgpViewError> {
    let mut buf = BytesMut::with_capacity(4096);

    put_magic(&mut buf, VIEW_START_MAGIC);
    buf.put_u32(view.get_time());

    encode_peers(&mut buf, view, filter)?;
    encode_paths(&mut buf, view);
    encode_pfxs(&mut buf, view, filter);

    put_magic(&mut buf, VIEW_END_MAGIC);
    Ok(buf.freeze())
}

/// Serializes a view to a writer. See [encode_view].
pub fn write_view<W: Write>(
    writer: &mut W,
    view: &BgpView,
    filter: Option<&dyn ViewFilter>,
) -> Result<(), BgpViewError> {
    let bytes = encode_view(view, filter)?;
    writer.write_all(&bytes)?;
    Ok(())
}

// Emits one peer-section entry.
pub(crate) fn put_peer_entry(buf: &mut BytesMut, peer_id: PeerId, sig: &crate::store::PeerSignature) {
    buf.put_u16(peer_id);
    buf.put_u8(sig.collector.len() as u8);
    buf.put_slice(sig.collector.as_bytes());
    put_ip(buf, &sig.peer_ip);
    buf.put_u32(sig.peer_asn);
}

fn encode_peers(
    buf: &mut BytesMut,
    view: &BgpView,
    filter: Option<&dyn ViewFilter>,
) -> Result<(), BgpViewError> {
    let mut peers_tx: u16 = 0;
    for peer in view.peers(FieldFilter::ACTIVE) {
        if let Some(f) = filter {
            if !f.keep_peer(&peer) {
                continue;
            }
        }
        let sig = peer.sig()?;
        put_peer_entry(buf, peer.peer_id(), &sig);
        peers_tx += 1;
    }

    put_magic(buf, VIEW_PEER_END_MAGIC);
    buf.put_u16(peers_tx);
    Ok(())
}

pub(crate) fn encode_paths(buf: &mut BytesMut, view: &BgpView) {
    let store = view.path_store().read();
    let mut paths_tx: u32 = 0;
    for path in store.iter_paths() {
        buf.put_u32_ne(path.path_id().idx);
        buf.put_u8(path.is_core() as u8);
        buf.put_u16_ne(path.encoding().len() as u16);
        buf.put_slice(path.encoding());
        paths_tx += 1;
    }

    put_magic(buf, VIEW_PATH_END_MAGIC);
    buf.put_u32(paths_tx);
}

fn encode_pfxs(buf: &mut BytesMut, view: &BgpView, filter: Option<&dyn ViewFilter>) {
    let mut pfx_tx: u32 = 0;
    let mut peer_buf = BytesMut::new();

    for pfx in view.pfxs(FieldFilter::ACTIVE, None) {
        if let Some(f) = filter {
            if !f.keep_pfx(&pfx) {
                continue;
            }
        }

        peer_buf.clear();
        let mut peers_cnt: u16 = 0;
        for pfx_peer in pfx.peers(FieldFilter::ACTIVE) {
            if let Some(f) = filter {
                if !f.keep_pfx_peer(&pfx_peer) {
                    continue;
                }
            }
            peer_buf.put_u16(pfx_peer.peer_id());
            peer_buf.put_u32_ne(pfx_peer.path_id().idx);
            peers_cnt += 1;
        }

        // a prefix is only emitted with at least one surviving pfx-peer
        if peers_cnt == 0 {
            continue;
        }

        put_ip(buf, &pfx.pfx().addr());
        buf.put_u8(pfx.pfx().prefix_len());
        buf.put_slice(&peer_buf);
        put_magic(buf, VIEW_PEER_END_MAGIC);
        buf.put_u16(peers_cnt);
        pfx_tx += 1;
    }

    put_magic(buf, VIEW_PFX_END_MAGIC);
    buf.put_u32(pfx_tx);
}

/// Reads one view from the stream into `view`, replacing its contents.
///
/// Returns `Ok(false)` on a clean end of stream before any view bytes (no
/// view available); `Ok(true)` once a complete view has been decoded and
/// committed. On any decoding error the caller's view is left structurally
/// unchanged.
pub fn read_view<R: Read>(reader: &mut R, view: &mut BgpView) -> Result<bool, BgpViewError> {
    let mut fr = FrameReader::new(reader);

    // end of stream at a view boundary is the normal termination
    if fr.peek_marker()?.is_none() {
        return Ok(false);
    }
    read_view_frame(&mut fr, view)?;
    Ok(true)
}

pub(crate) fn read_view_frame<R: Read>(
    fr: &mut FrameReader<R>,
    view: &mut BgpView,
) -> Result<(), BgpViewError> {
    fr.expect_magic(VIEW_START_MAGIC, "view-start")?;

    let mut scratch = BgpView::with_stores(
        view.sig_store().clone(),
        view.path_store().clone(),
    );
    scratch.set_time(fr.read_u32_be()?);

    let peer_map = read_peers(fr, &mut scratch)?;
    let path_map = read_paths(fr, &mut scratch)?;
    read_pfxs(fr, &mut scratch, &peer_map, &path_map)?;

    fr.expect_magic(VIEW_END_MAGIC, "end-of-view")?;

    view.adopt(scratch);
    Ok(())
}

pub(crate) fn read_peers<R: Read>(
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
        view.activate_peer(local_id)?;
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

pub(crate) fn read_paths<R: Read>(
    fr: &mut FrameReader<R>,
    view: &mut BgpView,
) -> Result<HashMap<u32, PathId>, BgpViewError> {
    let mut idmap = HashMap::new();
    let mut paths_rx: u32 = 0;

    while !fr.check_magic(VIEW_PATH_END_MAGIC)? {
        let remote_idx = fr.read_u32_ne()?;
        let is_core = fr.read_u8()? != 0;
        let path_len = fr.read_u16_ne()?;
        let path_data = fr.read_n_bytes(path_len as usize)?;

        let path_id = view.path_store().write().insert(&path_data, is_core)?;
        idmap.insert(remote_idx, path_id);
        paths_rx += 1;
    }

    let paths_sent = fr.read_u32_be()?;
    if paths_sent != paths_rx {
        return Err(BgpViewError::CorruptStream(format!(
            "path count mismatch: sent {}, received {}",
            paths_sent, paths_rx
        )));
    }
    Ok(idmap)
}

fn read_pfxs<R: Read>(
    fr: &mut FrameReader<R>,
    view: &mut BgpView,
    peer_map: &HashMap<PeerId, PeerId>,
    path_map: &HashMap<u32, PathId>,
) -> Result<(), BgpViewError> {
    let mut pfx_rx: u32 = 0;

    while !fr.check_magic(VIEW_PFX_END_MAGIC)? {
        let pfx = read_pfx(fr)?;
        let mut pfx_peer_rx: u16 = 0;

        while !fr.check_magic(VIEW_PEER_END_MAGIC)? {
            let remote_peer = fr.read_u16_be()?;
            let remote_path = fr.read_u32_ne()?;
            pfx_peer_rx += 1;

            let peer_id = *peer_map.get(&remote_peer).ok_or_else(|| {
                BgpViewError::CorruptStream(format!("unknown peer id {} in stream", remote_peer))
            })?;
            let path_id = *path_map.get(&remote_path).ok_or_else(|| {
                BgpViewError::CorruptStream(format!("unknown path index {} in stream", remote_path))
            })?;

            view.add_pfx_peer(pfx, peer_id, path_id)?;
            view.activate_pfx_peer(pfx, peer_id)?;
        }

        let peers_sent = fr.read_u16_be()?;
        if peers_sent != pfx_peer_rx {
            return Err(BgpViewError::CorruptStream(format!(
                "pfx-peer count mismatch for {}: sent {}, received {}",
                pfx, peers_sent, pfx_peer_rx
            )));
        }
        pfx_rx += 1;
    }

    let pfxs_sent = fr.read_u32_be()?;
    if pfxs_sent != pfx_rx {
        return Err(BgpViewError::CorruptStream(format!(
            "pfx count mismatch: sent {}, received {}",
            pfxs_sent, pfx_rx
        )));
    }
    Ok(())
}

pub(crate) fn read_pfx<R: Read>(fr: &mut FrameReader<R>) -> Result<ipnet::IpNet, BgpViewError> {
    let addr = fr.read_ip()?;
    let mask_len = fr.read_u8()?;
    ipnet::IpNet::new(addr, mask_len)
        .map_err(|_| BgpViewError::InvalidFormat(format!("invalid prefix {}/{}", addr, mask_len)))
}

/// Writes the view's active routing state as an ASCII dump: one
/// pipe-separated line per active pfx-peer, preceded by a short header.
pub fn write_view_ascii<W: Write>(writer: &mut W, view: &BgpView) -> Result<(), BgpViewError> {
    let time = view.get_time();
    writeln!(writer, "# View {}", time)?;
    writeln!(
        writer,
        "# IPv4 Prefixes: {}",
        view.pfx_cnt(FieldFilter::ACTIVE, Some(Afi::Ipv4))
    )?;
    writeln!(
        writer,
        "# IPv6 Prefixes: {}",
        view.pfx_cnt(FieldFilter::ACTIVE, Some(Afi::Ipv6))
    )?;

    for pfx in view.pfxs(FieldFilter::ACTIVE, None) {
        for pfx_peer in pfx.peers(FieldFilter::ACTIVE) {
            let sig = pfx_peer.sig()?;
            let path = pfx_peer.path()?;
            let origin = path
                .origin_segment()
                .map(|seg| seg.to_string())
                .unwrap_or_default();
            writeln!(
                writer,
                "{}|{}|{}|{}|{}|{}|{}",
                time,
                pfx.pfx(),
                sig.collector,
                sig.peer_asn,
                sig.peer_ip,
                path,
                origin
            )?;
        }
    }
    Ok(())
}
