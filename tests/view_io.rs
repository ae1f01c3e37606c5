//! Round-trip and wire-protocol tests for the binary view codec and the
//! sync/diff codec.

use bgpview::error::BgpViewError;
use bgpview::io::diff::{encode_diff, read_diff, read_frame, FrameKind};
use bgpview::io::file::{encode_view, read_view, write_view, write_view_ascii};
use bgpview::io::{ViewFilter, VIEW_MAGIC, VIEW_PATH_END_MAGIC};
use bgpview::models::{AsPath, AsPathSegment, SegmentType};
use bgpview::view::{BgpView, FieldFilter, PeerRef, PfxPeerRef};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::net::IpAddr;

type PeerKey = (String, String, u32);
type EdgeMap = BTreeMap<PeerKey, (Vec<u8>, bool)>;

/// Store-independent structural projection of a view's active state:
/// peer/path ids may be renumbered across the wire, signatures and path
/// encodings may not.
fn projection(view: &BgpView) -> (u32, BTreeSet<PeerKey>, BTreeMap<String, EdgeMap>) {
    let peers: BTreeSet<PeerKey> = view
        .peers(FieldFilter::ACTIVE)
        .map(|p| {
            let sig = p.sig().unwrap();
            (sig.collector, sig.peer_ip.to_string(), sig.peer_asn)
        })
        .collect();

    let mut pfxs = BTreeMap::new();
    for pfx in view.pfxs(FieldFilter::ACTIVE, None) {
        let mut edges = EdgeMap::new();
        for pfx_peer in pfx.peers(FieldFilter::ACTIVE) {
            let sig = pfx_peer.sig().unwrap();
            let store = view.path_store().read();
            let path = store.get(pfx_peer.path_id()).unwrap();
            edges.insert(
                (sig.collector, sig.peer_ip.to_string(), sig.peer_asn),
                (path.encoding().to_vec(), path.is_core()),
            );
        }
        pfxs.insert(pfx.pfx().to_string(), edges);
    }
    (view.get_time(), peers, pfxs)
}

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn add_active(view: &mut BgpView, pfx: &str, peer: u16, path: &AsPath) {
    let path_id = view.path_store().write().insert_path(path, true).unwrap();
    view.add_pfx_peer(pfx.parse().unwrap(), peer, path_id).unwrap();
    view.activate_pfx_peer(pfx.parse().unwrap(), peer).unwrap();
}

/// A view with v4+v6 peers, boundary mask lengths and set/confed path
/// segments.
fn populated_view() -> BgpView {
    let mut view = BgpView::new();
    view.set_time(3600);
    let p1 = view.add_peer("rrc00", addr("10.0.0.1"), 65001).unwrap();
    let p2 = view.add_peer("route-views2", addr("2001:db8::1"), 3356).unwrap();

    let seq = AsPath::from_sequence([65001, 65002]);
    let with_set = AsPath::from_segments(vec![
        AsPathSegment::sequence([65001]),
        AsPathSegment::set([65010, 65011, 65012]),
    ]);
    let confed = AsPath::from_segments(vec![
        AsPathSegment::new(SegmentType::ConfedSequence, [64512, 64513]),
        AsPathSegment::new(SegmentType::ConfedSet, [64514]),
        AsPathSegment::sequence([3356]),
    ]);

    add_active(&mut view, "0.0.0.0/0", p1, &seq);
    add_active(&mut view, "10.1.0.0/16", p1, &with_set);
    add_active(&mut view, "192.0.2.1/32", p1, &seq);
    add_active(&mut view, "10.1.0.0/16", p2, &confed);
    add_active(&mut view, "2001:db8::/32", p2, &confed);
    add_active(&mut view, "2001:db8::1/128", p2, &seq);

    // an inactive edge must never cross the wire
    let pid = view
        .path_store()
        .write()
        .insert_path(&AsPath::from_sequence([65099]), true)
        .unwrap();
    view.add_pfx_peer("203.0.113.0/24".parse().unwrap(), p1, pid)
        .unwrap();
    view
}

#[test]
fn test_empty_view_round_trip() {
    let mut view = BgpView::new();
    view.set_time(42);

    let bytes = encode_view(&view, None).unwrap();
    let mut received = BgpView::new();
    let mut cursor = Cursor::new(bytes.to_vec());
    assert!(read_view(&mut cursor, &mut received).unwrap());
    assert_eq!(received.get_time(), 42);
    assert_eq!(received.peer_cnt(FieldFilter::ALL), 0);
    assert_eq!(received.pfx_cnt(FieldFilter::ALL, None), 0);
    assert!(!read_view(&mut cursor, &mut received).unwrap());
}

#[test]
fn test_round_trip_preserves_structure() {
    let view = populated_view();

    let bytes = encode_view(&view, None).unwrap();
    let mut received = BgpView::new();
    // pre-seed the receiver's stores so remote ids require renumbering
    received
        .add_peer("seed-collector", addr("192.168.0.1"), 1)
        .unwrap();
    received
        .path_store()
        .write()
        .insert_path(&AsPath::from_sequence([1, 2, 3]), false)
        .unwrap();

    let mut cursor = Cursor::new(bytes.to_vec());
    assert!(read_view(&mut cursor, &mut received).unwrap());

    assert_eq!(projection(&received), projection(&view));
    assert_eq!(received.get_time(), 3600);
}

#[test]
fn test_concatenated_views_decode_in_order() {
    let v1 = populated_view();
    let mut v2 = v1.dup();
    v2.set_time(7200);
    let p1 = v2
        .peers(FieldFilter::ACTIVE)
        .find(|p| p.sig().unwrap().peer_asn == 65001)
        .unwrap()
        .peer_id();
    v2.deactivate_pfx_peer("0.0.0.0/0".parse().unwrap(), p1)
        .unwrap();

    let mut stream = Vec::new();
    write_view(&mut stream, &v1, None).unwrap();
    write_view(&mut stream, &v2, None).unwrap();

    let mut cursor = Cursor::new(stream);
    let mut received = BgpView::new();
    assert!(read_view(&mut cursor, &mut received).unwrap());
    assert_eq!(projection(&received), projection(&v1));
    assert!(read_view(&mut cursor, &mut received).unwrap());
    assert_eq!(projection(&received), projection(&v2));
    assert!(!read_view(&mut cursor, &mut received).unwrap());
}

struct DropAsn(u32);

impl ViewFilter for DropAsn {
    fn keep_peer(&self, peer: &PeerRef) -> bool {
        peer.sig().map(|s| s.peer_asn != self.0).unwrap_or(false)
    }

    fn keep_pfx_peer(&self, pfx_peer: &PfxPeerRef) -> bool {
        pfx_peer.sig().map(|s| s.peer_asn != self.0).unwrap_or(false)
    }
}

#[test]
fn test_filtered_encode_is_projected_view() {
    let view = populated_view();

    let bytes = encode_view(&view, Some(&DropAsn(3356))).unwrap();
    let mut received = BgpView::new();
    assert!(read_view(&mut Cursor::new(bytes.to_vec()), &mut received).unwrap());

    // expected: the view with peer 3356 and all of its edges removed
    let mut expected = view.dup();
    let p2 = expected
        .peers(FieldFilter::ALL)
        .find(|p| p.sig().unwrap().peer_asn == 3356)
        .map(|p| p.peer_id())
        .unwrap();
    expected.remove_peer(p2).unwrap();

    assert_eq!(projection(&received), projection(&expected));
}

#[test]
fn test_truncated_path_section_is_corrupt_and_view_untouched() {
    let view = populated_view();
    let bytes = encode_view(&view, None).unwrap();

    // cut the stream between the path-section end magic and its count
    let marker: Vec<u8> = VIEW_MAGIC
        .to_be_bytes()
        .iter()
        .chain(VIEW_PATH_END_MAGIC.to_be_bytes().iter())
        .copied()
        .collect();
    let pos = bytes
        .windows(8)
        .position(|w| w == marker.as_slice())
        .expect("path end magic present");
    let truncated = &bytes[..pos + 8];

    let mut receiver = BgpView::new();
    receiver.set_time(7);
    receiver.add_peer("keepme", addr("172.16.0.1"), 64999).unwrap();
    let before = projection(&receiver);

    let err = read_view(&mut Cursor::new(truncated.to_vec()), &mut receiver).unwrap_err();
    assert!(matches!(err, BgpViewError::CorruptStream(_)));
    assert_eq!(projection(&receiver), before);
    assert_eq!(receiver.get_time(), 7);
}

#[test]
fn test_count_mismatch_is_corrupt() {
    let view = populated_view();
    let bytes = encode_view(&view, None).unwrap();

    // the final 12 bytes are VEND magic; the 2 bytes before the pfx count
    // belong to the count itself. Corrupt the trailing pfx count (u32 BE
    // right before the VEND magic).
    let mut corrupted = bytes.to_vec();
    let len = corrupted.len();
    let pfx_cnt_pos = len - 8 - 4;
    corrupted[pfx_cnt_pos] ^= 0xff;

    let mut receiver = BgpView::new();
    let err = read_view(&mut Cursor::new(corrupted), &mut receiver).unwrap_err();
    assert!(matches!(err, BgpViewError::CorruptStream(_)));
}

#[test]
fn test_invalid_ip_length_is_invalid_format() {
    // view-start magic, time, then a peer entry with ip_len 7
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&VIEW_MAGIC.to_be_bytes());
    bytes.extend_from_slice(&0x5354_5254u32.to_be_bytes()); // STRT
    bytes.extend_from_slice(&100u32.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes()); // peer id
    bytes.push(1); // collector len
    bytes.push(b'r');
    bytes.push(7); // bogus ip length
    bytes.extend_from_slice(&[0; 16]);

    let mut receiver = BgpView::new();
    let err = read_view(&mut Cursor::new(bytes), &mut receiver).unwrap_err();
    assert!(matches!(err, BgpViewError::InvalidFormat(_)));
}

#[test]
fn test_missing_start_magic_is_corrupt() {
    let mut receiver = BgpView::new();
    let err = read_view(&mut Cursor::new(vec![0u8; 16]), &mut receiver).unwrap_err();
    assert!(matches!(err, BgpViewError::CorruptStream(_)));
}

#[test]
fn test_ascii_dump() {
    let mut view = BgpView::new();
    view.set_time(1000);
    let peer = view.add_peer("rrc00", addr("10.0.0.1"), 65001).unwrap();
    add_active(&mut view, "10.1.0.0/16", peer, &AsPath::from_sequence([65001]));

    let mut out = Vec::new();
    write_view_ascii(&mut out, &view).unwrap();
    let text = String::from_utf8(out).unwrap();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "# View 1000");
    assert_eq!(lines[1], "# IPv4 Prefixes: 1");
    assert_eq!(lines[2], "# IPv6 Prefixes: 0");
    assert_eq!(lines[3], "1000|10.1.0.0/16|rrc00|65001|10.0.0.1|65001|65001");
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_diff_requires_shared_stores() {
    let a = BgpView::new();
    let b = BgpView::new();
    assert!(matches!(
        encode_diff(&a, &b, None),
        Err(BgpViewError::InvalidArg(_))
    ));
}

#[test]
fn test_diff_round_trip_and_stats() {
    // parent: two prefixes on one peer
    let mut parent = BgpView::new();
    parent.set_time(3600);
    let p1 = parent.add_peer("rrc00", addr("10.0.0.1"), 65001).unwrap();
    let p2 = parent.add_peer("rrc00", addr("10.0.0.2"), 65002).unwrap();
    add_active(&mut parent, "10.1.0.0/16", p1, &AsPath::from_sequence([65001]));
    add_active(&mut parent, "10.2.0.0/16", p1, &AsPath::from_sequence([65001, 65002]));
    add_active(&mut parent, "10.4.0.0/16", p1, &AsPath::from_sequence([65001]));

    // current: one prefix removed, one added, one changed (new path on p1,
    // new edge via p2), one untouched
    let mut current = parent.dup();
    current.set_time(3605);
    current
        .deactivate_pfx_peer("10.1.0.0/16".parse().unwrap(), p1)
        .unwrap();
    add_active(&mut current, "10.3.0.0/16", p1, &AsPath::from_sequence([65001, 65003]));
    add_active(&mut current, "10.2.0.0/16", p1, &AsPath::from_sequence([65001, 65009]));
    add_active(&mut current, "10.2.0.0/16", p2, &AsPath::from_sequence([65002]));

    let (frame, stats) = encode_diff(&parent, &current, None).unwrap();
    assert_eq!(stats.common_pfxs_cnt, 1);
    assert_eq!(stats.added_pfxs_cnt, 1);
    assert_eq!(stats.removed_pfxs_cnt, 1);
    assert_eq!(stats.changed_pfxs_cnt, 1);
    assert_eq!(stats.added_pfx_peer_cnt, 2); // 10.3/16 via p1, 10.2/16 via p2
    assert_eq!(stats.changed_pfx_peer_cnt, 1); // 10.2/16 via p1
    assert_eq!(stats.removed_pfx_peer_cnt, 0);
    assert_eq!(stats.pfx_cnt, 3);

    // applying the diff on top of the parent restores the current view
    let mut patched = parent.dup();
    assert!(read_diff(&mut Cursor::new(frame.to_vec()), &mut patched).unwrap());
    assert_eq!(projection(&patched), projection(&current));
    assert_eq!(patched.get_time(), 3605);
}

#[test]
fn test_sync_then_diff_wire_sequence() {
    // producer side: sync at 3600, diff at 3605
    let mut v1 = BgpView::new();
    v1.set_time(3600);
    let p1 = v1.add_peer("rrc00", addr("10.0.0.1"), 65001).unwrap();
    add_active(&mut v1, "10.1.0.0/16", p1, &AsPath::from_sequence([65001]));
    add_active(&mut v1, "10.2.0.0/16", p1, &AsPath::from_sequence([65001, 65002]));

    let mut v2 = v1.dup();
    v2.set_time(3605);
    v2.deactivate_pfx_peer("10.1.0.0/16".parse().unwrap(), p1)
        .unwrap();

    let mut stream = Vec::new();
    write_view(&mut stream, &v1, None).unwrap();
    let (diff_frame, _) = encode_diff(&v1, &v2, None).unwrap();
    stream.extend_from_slice(&diff_frame);

    // receiver side: one view, patched in place
    let mut cursor = Cursor::new(stream);
    let mut received = BgpView::new();
    assert_eq!(
        read_frame(&mut cursor, &mut received).unwrap(),
        Some(FrameKind::Sync)
    );
    assert_eq!(projection(&received), projection(&v1));
    assert_eq!(
        read_frame(&mut cursor, &mut received).unwrap(),
        Some(FrameKind::Diff)
    );
    assert_eq!(projection(&received), projection(&v2));
    assert_eq!(read_frame(&mut cursor, &mut received).unwrap(), None);
}

#[test]
fn test_diff_of_identical_views_is_all_common() {
    let mut view = BgpView::new();
    view.set_time(3600);
    let p1 = view.add_peer("rrc00", addr("10.0.0.1"), 65001).unwrap();
    add_active(&mut view, "10.1.0.0/16", p1, &AsPath::from_sequence([65001]));

    let mut same = view.dup();
    same.set_time(3605);

    let (frame, stats) = encode_diff(&view, &same, None).unwrap();
    assert_eq!(stats.common_pfxs_cnt, 1);
    assert_eq!(stats.added_pfxs_cnt + stats.removed_pfxs_cnt + stats.changed_pfxs_cnt, 0);

    let mut patched = view.dup();
    assert!(read_diff(&mut Cursor::new(frame.to_vec()), &mut patched).unwrap());
    assert_eq!(projection(&patched), projection(&same));
}
