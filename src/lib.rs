/*!
BGPView is a BGP data-analysis framework that maintains a shared,
time-indexed snapshot ("view") of the global routing table as observed by
many collectors and their peers.

The crate provides:

- **the view**: a triply-indexed `(prefix, peer, as-path)` container with
  active/inactive state at every level, interned peer signatures and
  content-addressed AS paths, and deterministic iteration ([view::BgpView]);
- **the routing-table state engine**: a per-collector/per-peer state
  machine that consumes BGP elements (RIB entries, announcements,
  withdrawals, session state changes) and reconciles overlapping RIB dumps
  against live update streams ([rt::RoutingTables]);
- **view serialization**: a magic-framed binary format for full views, a
  parent-relative diff format for the sync/diff wire protocol, and an ASCII
  dump ([io::file], [io::diff]);
- **consumers**: a rotating file archiver and a kafka view-sender
  ([consumers]).

# Examples

## Building a view by hand

```
use bgpview::models::AsPath;
use bgpview::view::{BgpView, FieldFilter};

let mut view = BgpView::new();
let peer = view
    .add_peer("rrc00", "10.0.0.1".parse().unwrap(), 65001)
    .unwrap();
let path = view
    .path_store()
    .write()
    .insert_path(&AsPath::from_sequence([65001]), true)
    .unwrap();

view.add_pfx_peer("10.1.0.0/16".parse().unwrap(), peer, path)
    .unwrap();
view.activate_pfx_peer("10.1.0.0/16".parse().unwrap(), peer)
    .unwrap();

assert_eq!(view.pfx_cnt(FieldFilter::ACTIVE, None), 1);
for pfx in view.pfxs(FieldFilter::ACTIVE, None) {
    for pfx_peer in pfx.peers(FieldFilter::ACTIVE) {
        println!("{} via {}", pfx.pfx(), pfx_peer.path().unwrap());
    }
}
```

## Ingesting a RIB dump through the state engine

```
use bgpview::models::{AsPath, BgpElem, DumpPosition};
use bgpview::rt::RoutingTables;
use bgpview::view::{BgpView, FieldFilter};

let peer_ip = "10.0.0.1".parse().unwrap();
let mut view = BgpView::new();
let mut rt = RoutingTables::new("bgp");

rt.interval_start(&mut view, 1000).unwrap();
rt.process_elem(
    &mut view,
    &BgpElem::rib_entry(
        "rrc00",
        peer_ip,
        65001,
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
        "rrc00",
        peer_ip,
        65001,
        1005,
        "10.2.0.0/16",
        AsPath::from_sequence([65001, 65002]),
        DumpPosition::END,
    ),
)
.unwrap();
// the end-of-valid-RIB promotion runs at the interval boundary
rt.interval_end(&mut view, 1010).unwrap();

assert_eq!(view.pfx_cnt(FieldFilter::ACTIVE, None), 2);
```

## Serializing views

```
use bgpview::io::file::{read_view, write_view};
use bgpview::view::BgpView;
use std::io::Cursor;

let view = BgpView::new();
let mut bytes = Vec::new();
write_view(&mut bytes, &view, None).unwrap();

let mut received = BgpView::new();
let mut cursor = Cursor::new(bytes);
assert!(read_view(&mut cursor, &mut received).unwrap());
assert!(!read_view(&mut cursor, &mut received).unwrap()); // end of stream
```
*/

pub mod consumers;
pub mod error;
pub mod io;
pub mod models;
pub mod rt;
pub mod store;
pub mod utils;
pub mod view;

pub use error::BgpViewError;
pub use models::BgpElem;
pub use rt::RoutingTables;
pub use view::BgpView;
