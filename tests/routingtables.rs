//! End-to-end scenarios for the routing-table state engine.

use bgpview::error::BgpViewError;
use bgpview::models::{
    AsPath, BgpElem, DumpPosition, ElemType, PeerFsmState, RecordStatus, RecordType,
};
use bgpview::rt::{CollectorStatus, MetricSnapshot, RoutingTables};
use bgpview::store::PeerId;
use bgpview::view::{BgpView, FieldFilter};
use ipnet::IpNet;
use std::net::IpAddr;

fn metric(snapshot: &MetricSnapshot, key: &str) -> u64 {
    snapshot
        .metrics
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| *v)
        .unwrap_or_else(|| panic!("missing metric {}", key))
}

const COLLECTOR: &str = "rrc00";
const PEER_ASN: u32 = 65001;

fn peer_ip() -> IpAddr {
    "10.0.0.1".parse().unwrap()
}

fn pfx(s: &str) -> IpNet {
    s.parse().unwrap()
}

fn rib_end_elem(ts: u32) -> BgpElem {
    BgpElem {
        record_type: RecordType::RIB,
        dump_pos: DumpPosition::END,
        timestamp: ts,
        collector: COLLECTOR.to_string(),
        peer_ip: peer_ip(),
        peer_asn: PEER_ASN,
        elem_type: ElemType::RIB,
        ..Default::default()
    }
}

fn peer_id(view: &BgpView) -> PeerId {
    view.sig_store()
        .read()
        .iter()
        .find(|(_, sig)| sig.peer_ip == peer_ip())
        .map(|(id, _)| id)
        .unwrap()
}

/// Scenario: a complete RIB dump is ingested and promoted at the interval
/// boundary.
fn rib_promotion_setup() -> (RoutingTables, BgpView, MetricSnapshot) {
    let mut rt = RoutingTables::new("bgp");
    let mut view = BgpView::new();

    rt.interval_start(&mut view, 1000).unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1000,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
            DumpPosition::START,
        ),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1000,
            "10.2.0.0/16",
            AsPath::from_sequence([65001, 65002]),
            DumpPosition::MIDDLE,
        ),
    )
    .unwrap();
    rt.process_elem(&mut view, &rib_end_elem(1010)).unwrap();
    let snapshot = rt.interval_end(&mut view, 1010).unwrap();
    (rt, view, snapshot)
}

#[test]
fn test_rib_promotion() {
    let (rt, view, snapshot) = rib_promotion_setup();
    let peer = peer_id(&view);

    assert!(view.peer_info(peer).unwrap().is_active());
    assert_eq!(view.peer_info(peer).unwrap().pfx_cnt_v4(), 2);
    assert_eq!(view.pfx_cnt(FieldFilter::ACTIVE, None), 2);
    assert!(view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).unwrap().is_active());
    assert!(view.pfx_peer_info(&pfx("10.2.0.0/16"), peer).unwrap().is_active());

    assert_eq!(rt.peer_ref_rib_window(peer), Some((1000, 1010)));
    assert_eq!(rt.peer_uc_rib_window(peer), Some((0, 0)));
    assert_eq!(rt.peer_fsm_state(peer), Some(PeerFsmState::ESTABLISHED));
    assert_eq!(rt.collector_status(COLLECTOR), Some(CollectorStatus::UP));

    // both prefixes were previously unknown, so they count as negative
    // mismatches of the first promotion
    assert_eq!(
        metric(&snapshot, "bgp.rrc00.peer.65001.10_0_0_1.rib_positive_mismatches_cnt"),
        0
    );
    assert_eq!(
        metric(&snapshot, "bgp.rrc00.peer.65001.10_0_0_1.rib_negative_mismatches_cnt"),
        2
    );

    // the promoted paths resolve through the view
    let path = view
        .pfx(&pfx("10.2.0.0/16"))
        .unwrap()
        .peers(FieldFilter::ACTIVE)
        .next()
        .unwrap()
        .path()
        .unwrap();
    assert_eq!(path, AsPath::from_sequence([65001, 65002]));
}

#[test]
fn test_withdrawal_inside_ref_window() {
    let (mut rt, mut view, _) = rib_promotion_setup();
    let peer = peer_id(&view);

    rt.process_elem(
        &mut view,
        &BgpElem::withdraw(COLLECTOR, peer_ip(), PEER_ASN, 1020, "10.1.0.0/16"),
    )
    .unwrap();

    let info = view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).unwrap();
    assert!(!info.is_active());
    assert!(!view.pfx(&pfx("10.1.0.0/16")).unwrap().is_active());
    // the peer stays active through 10.2.0.0/16
    assert!(view.peer_info(peer).unwrap().is_active());
    assert_eq!(view.peer_info(peer).unwrap().pfx_cnt_v4(), 1);
}

#[test]
fn test_peer_state_down() {
    let (mut rt, mut view, _) = rib_promotion_setup();
    let peer = peer_id(&view);

    rt.process_elem(
        &mut view,
        &BgpElem::withdraw(COLLECTOR, peer_ip(), PEER_ASN, 1020, "10.1.0.0/16"),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::state_change(COLLECTOR, peer_ip(), PEER_ASN, 1030, PeerFsmState::IDLE),
    )
    .unwrap();

    assert!(!view.peer_info(peer).unwrap().is_active());
    assert!(!view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).unwrap().is_active());
    assert!(!view.pfx_peer_info(&pfx("10.2.0.0/16"), peer).unwrap().is_active());
    assert_eq!(view.pfx_cnt(FieldFilter::ACTIVE, None), 0);

    // new trust epoch starts at the state change
    assert_eq!(rt.peer_ref_rib_window(peer), Some((1030, 1030)));
    assert_eq!(rt.peer_fsm_state(peer), Some(PeerFsmState::IDLE));
}

#[test]
fn test_stale_update_dropped() {
    let (mut rt, mut view, _) = rib_promotion_setup();
    let peer = peer_id(&view);

    // interval barrier rejects anything behind interval_end
    let err = rt
        .process_elem(
            &mut view,
            &BgpElem::withdraw(COLLECTOR, peer_ip(), PEER_ASN, 900, "10.1.0.0/16"),
        )
        .unwrap_err();
    assert!(matches!(err, BgpViewError::OutOfOrder { .. }));
    assert!(view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).unwrap().is_active());
}

#[test]
fn test_update_from_non_established_peer_dropped() {
    let mut rt = RoutingTables::new("bgp");
    let mut view = BgpView::new();
    rt.interval_start(&mut view, 100).unwrap();

    // the peer is auto-registered but not established; the route is dropped
    rt.process_elem(
        &mut view,
        &BgpElem::announce(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            100,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
        ),
    )
    .unwrap();
    let peer = peer_id(&view);
    assert_eq!(rt.peer_fsm_state(peer), Some(PeerFsmState::UNKNOWN));
    assert_eq!(view.pfx_cnt(FieldFilter::ALL, None), 0);

    // once established, announcements apply
    rt.process_elem(
        &mut view,
        &BgpElem::state_change(COLLECTOR, peer_ip(), PEER_ASN, 110, PeerFsmState::ESTABLISHED),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::announce(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            120,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
        ),
    )
    .unwrap();
    assert!(view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).unwrap().is_active());
    assert!(view.peer_info(peer).unwrap().is_active());
}

#[test]
fn test_second_rib_mismatches() {
    let (mut rt, mut view, _) = rib_promotion_setup();
    let peer = peer_id(&view);

    // second dump: 10.1.0.0/16 still present, 10.2.0.0/16 gone, 10.4.0.0/16
    // appears
    rt.interval_start(&mut view, 1050).unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1050,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
            DumpPosition::START,
        ),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1050,
            "10.4.0.0/16",
            AsPath::from_sequence([65001, 65004]),
            DumpPosition::MIDDLE,
        ),
    )
    .unwrap();
    rt.process_elem(&mut view, &rib_end_elem(1060)).unwrap();
    let snapshot = rt.interval_end(&mut view, 1060).unwrap();

    assert!(view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).unwrap().is_active());
    assert!(view.pfx_peer_info(&pfx("10.4.0.0/16"), peer).unwrap().is_active());
    // active route missing from the complete snapshot was deactivated
    assert!(!view.pfx_peer_info(&pfx("10.2.0.0/16"), peer).unwrap().is_active());

    // one positive mismatch (10.2/16), one negative (10.4/16)
    assert_eq!(
        metric(&snapshot, "bgp.rrc00.peer.65001.10_0_0_1.rib_positive_mismatches_cnt"),
        1
    );
    assert_eq!(
        metric(&snapshot, "bgp.rrc00.peer.65001.10_0_0_1.rib_negative_mismatches_cnt"),
        1
    );
    assert_eq!(rt.peer_ref_rib_window(peer), Some((1050, 1060)));
}

#[test]
fn test_live_announce_during_dump_wins_tiebreak() {
    let mut rt = RoutingTables::new("bgp");
    let mut view = BgpView::new();
    rt.interval_start(&mut view, 1000).unwrap();

    rt.process_elem(
        &mut view,
        &BgpElem::state_change(COLLECTOR, peer_ip(), PEER_ASN, 1000, PeerFsmState::ESTABLISHED),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1001,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
            DumpPosition::START,
        ),
    )
    .unwrap();
    // a newer announcement for the same prefix arrives mid-dump
    rt.process_elem(
        &mut view,
        &BgpElem::announce(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1005,
            "10.1.0.0/16",
            AsPath::from_sequence([65001, 65007]),
        ),
    )
    .unwrap();
    rt.process_elem(&mut view, &rib_end_elem(1010)).unwrap();
    rt.interval_end(&mut view, 1010).unwrap();

    let peer = peer_id(&view);
    let path = view
        .pfx(&pfx("10.1.0.0/16"))
        .unwrap()
        .peers(FieldFilter::ACTIVE)
        .next()
        .unwrap()
        .path()
        .unwrap();
    // the newer timestamp wins
    assert_eq!(path, AsPath::from_sequence([65001, 65007]));
    assert!(view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).unwrap().is_active());
}

#[test]
fn test_corrupted_and_empty_records_counted() {
    let mut rt = RoutingTables::new("bgp");
    let mut view = BgpView::new();
    rt.interval_start(&mut view, 100).unwrap();

    for status in [RecordStatus::CORRUPTED, RecordStatus::CORRUPTED, RecordStatus::EMPTY] {
        rt.process_elem(
            &mut view,
            &BgpElem {
                record_status: status,
                timestamp: 100,
                collector: COLLECTOR.to_string(),
                peer_ip: peer_ip(),
                peer_asn: PEER_ASN,
                ..Default::default()
            },
        )
        .unwrap();
    }

    assert_eq!(rt.collector_record_counts(COLLECTOR), Some((0, 2, 1)));
    // corrupted/empty records register no peers
    assert_eq!(view.peer_cnt(FieldFilter::ALL), 0);
}

#[test]
fn test_interval_end_out_of_order() {
    let (mut rt, mut view, _) = rib_promotion_setup();
    let err = rt.interval_end(&mut view, 900).unwrap_err();
    assert!(matches!(err, BgpViewError::OutOfOrder { .. }));

    let err = rt.interval_start(&mut view, 900).unwrap_err();
    assert!(matches!(err, BgpViewError::OutOfOrder { .. }));
}

#[test]
fn test_deprecated_state_dropped_after_24h() {
    let mut rt = RoutingTables::new("bgp");
    let mut view = BgpView::new();
    let start = 100_000;

    rt.interval_start(&mut view, start).unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::state_change(COLLECTOR, peer_ip(), PEER_ASN, start, PeerFsmState::ESTABLISHED),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::announce(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            start,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
        ),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::withdraw(COLLECTOR, peer_ip(), PEER_ASN, start + 10, "10.1.0.0/16"),
    )
    .unwrap();
    let peer = peer_id(&view);
    assert!(view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).is_some());

    // an interval boundary a day later reaps the inactive state
    rt.interval_end(&mut view, start + 10 + 24 * 3600 + 1).unwrap();
    assert!(view.pfx_peer_info(&pfx("10.1.0.0/16"), peer).is_none());
    assert!(view.pfx(&pfx("10.1.0.0/16")).is_none());
}

#[test]
fn test_metrics_snapshot() {
    let mut rt = RoutingTables::new("bgp");
    let mut view = BgpView::new();

    rt.interval_start(&mut view, 1000).unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1000,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
            DumpPosition::START,
        ),
    )
    .unwrap();
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            COLLECTOR,
            peer_ip(),
            PEER_ASN,
            1000,
            "10.2.0.0/16",
            AsPath::from_sequence([65001, 65002]),
            DumpPosition::MIDDLE,
        ),
    )
    .unwrap();
    rt.process_elem(&mut view, &rib_end_elem(1010)).unwrap();
    let snapshot = rt.interval_end(&mut view, 1010).unwrap();

    assert_eq!(snapshot.time, 1000);
    assert_eq!(metric(&snapshot, "bgp.rrc00.valid_record_cnt"), 3);
    assert_eq!(metric(&snapshot, "bgp.rrc00.peers_cnt"), 1);
    assert_eq!(metric(&snapshot, "bgp.rrc00.active_peers_cnt"), 1);
    assert_eq!(metric(&snapshot, "bgp.rrc00.active_peer_ases_cnt"), 1);
    assert_eq!(
        metric(&snapshot, "bgp.rrc00.peer.65001.10_0_0_1.active_v4_pfxs_cnt"),
        2
    );
    assert_eq!(
        metric(&snapshot, "bgp.rrc00.peer.65001.10_0_0_1.rib_messages_cnt"),
        3
    );
    assert_eq!(
        metric(&snapshot, "bgp.rrc00.peer.65001.10_0_0_1.status"),
        PeerFsmState::ESTABLISHED as u64
    );

    // metrics are withheld until the collector has published a full RIB
    let mut rt2 = RoutingTables::new("bgp");
    let mut view2 = BgpView::new();
    rt2.interval_start(&mut view2, 100).unwrap();
    rt2.process_elem(
        &mut view2,
        &BgpElem::state_change(COLLECTOR, peer_ip(), PEER_ASN, 100, PeerFsmState::ESTABLISHED),
    )
    .unwrap();
    let snapshot2 = rt2.interval_end(&mut view2, 110).unwrap();
    assert!(snapshot2.metrics.is_empty());
}

#[test]
fn test_multiple_collectors_independent() {
    let mut rt = RoutingTables::new("bgp");
    let mut view = BgpView::new();
    rt.interval_start(&mut view, 1000).unwrap();

    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            "rrc00",
            peer_ip(),
            PEER_ASN,
            1000,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
            DumpPosition::START,
        ),
    )
    .unwrap();
    // same peer ip/asn on another collector is a distinct peer signature
    rt.process_elem(
        &mut view,
        &BgpElem::rib_entry(
            "route-views2",
            peer_ip(),
            PEER_ASN,
            1000,
            "10.1.0.0/16",
            AsPath::from_sequence([65001]),
            DumpPosition::START,
        ),
    )
    .unwrap();
    assert_eq!(view.peer_cnt(FieldFilter::ALL), 2);

    // only rrc00 finishes its dump
    rt.process_elem(&mut view, &rib_end_elem(1010)).unwrap();
    rt.interval_end(&mut view, 1010).unwrap();

    assert_eq!(rt.collector_status("rrc00"), Some(CollectorStatus::UP));
    assert_eq!(rt.collector_status("route-views2"), Some(CollectorStatus::UNKNOWN));
    // route-views2's under-construction routes were not promoted
    assert_eq!(view.pfx_peer_cnt(&pfx("10.1.0.0/16"), FieldFilter::ACTIVE), 1);
}
