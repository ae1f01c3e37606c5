//! Per-prefix BGP elements, the input of the routing-table state engine.

use crate::models::AsPath;
use ipnet::IpNet;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// Type of the record an element was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecordType {
    RIB,
    UPDATE,
}

/// Validity of the record an element was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecordStatus {
    VALID,
    CORRUPTED,
    EMPTY,
}

/// Position of a record within a RIB dump. `END` marks the end of a valid
/// RIB and schedules the under-construction promotion at the next interval
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DumpPosition {
    START,
    MIDDLE,
    END,
}

/// Element type.
///
/// - `RIB`: an entry of a RIB dump
/// - `ANNOUNCE`: announcement/reachable prefix
/// - `WITHDRAW`: withdrawn/unreachable prefix
/// - `STATE`: peer session state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElemType {
    RIB,
    ANNOUNCE,
    WITHDRAW,
    STATE,
}

/// BGP finite state machine states. A peer is considered up only in
/// `ESTABLISHED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeerFsmState {
    UNKNOWN,
    IDLE,
    CONNECT,
    ACTIVE,
    OPENSENT,
    OPENCONFIRM,
    ESTABLISHED,
}

/// A single per-prefix BGP element as observed by one peer of one
/// collector, tagged with the record-level metadata the state engine needs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BgpElem {
    pub record_type: RecordType,
    pub record_status: RecordStatus,
    pub dump_pos: DumpPosition,
    pub timestamp: u32,
    pub collector: String,
    pub peer_ip: IpAddr,
    pub peer_asn: u32,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub elem_type: ElemType,
    pub prefix: Option<IpNet>,
    pub as_path: Option<AsPath>,
    pub new_state: Option<PeerFsmState>,
}

impl Default for BgpElem {
    fn default() -> Self {
        BgpElem {
            record_type: RecordType::UPDATE,
            record_status: RecordStatus::VALID,
            dump_pos: DumpPosition::MIDDLE,
            timestamp: 0,
            collector: String::new(),
            peer_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            peer_asn: 0,
            elem_type: ElemType::ANNOUNCE,
            prefix: None,
            as_path: None,
            new_state: None,
        }
    }
}

impl BgpElem {
    /// A RIB dump entry.
    pub fn rib_entry(
        collector: &str,
        peer_ip: IpAddr,
        peer_asn: u32,
        timestamp: u32,
        prefix: &str,
        path: AsPath,
        dump_pos: DumpPosition,
    ) -> Self {
        BgpElem {
            record_type: RecordType::RIB,
            dump_pos,
            timestamp,
            collector: collector.to_string(),
            peer_ip,
            peer_asn,
            elem_type: ElemType::RIB,
            prefix: Some(IpNet::from_str(prefix).expect("valid prefix literal")),
            as_path: Some(path),
            ..Default::default()
        }
    }

    /// A live announcement.
    pub fn announce(
        collector: &str,
        peer_ip: IpAddr,
        peer_asn: u32,
        timestamp: u32,
        prefix: &str,
        path: AsPath,
    ) -> Self {
        BgpElem {
            timestamp,
            collector: collector.to_string(),
            peer_ip,
            peer_asn,
            elem_type: ElemType::ANNOUNCE,
            prefix: Some(IpNet::from_str(prefix).expect("valid prefix literal")),
            as_path: Some(path),
            ..Default::default()
        }
    }

    /// A live withdrawal.
    pub fn withdraw(
        collector: &str,
        peer_ip: IpAddr,
        peer_asn: u32,
        timestamp: u32,
        prefix: &str,
    ) -> Self {
        BgpElem {
            timestamp,
            collector: collector.to_string(),
            peer_ip,
            peer_asn,
            elem_type: ElemType::WITHDRAW,
            prefix: Some(IpNet::from_str(prefix).expect("valid prefix literal")),
            ..Default::default()
        }
    }

    /// A peer session state change.
    pub fn state_change(
        collector: &str,
        peer_ip: IpAddr,
        peer_asn: u32,
        timestamp: u32,
        new_state: PeerFsmState,
    ) -> Self {
        BgpElem {
            timestamp,
            collector: collector.to_string(),
            peer_ip,
            peer_asn,
            elem_type: ElemType::STATE,
            new_state: Some(new_state),
            ..Default::default()
        }
    }
}

struct OptionToStr<'a, T>(&'a Option<T>);

impl<T: Display> Display for OptionToStr<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            None => Ok(()),
            Some(x) => write!(f, "{}", x),
        }
    }
}

impl Display for BgpElem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let t = match self.elem_type {
            ElemType::RIB => "R",
            ElemType::ANNOUNCE => "A",
            ElemType::WITHDRAW => "W",
            ElemType::STATE => "S",
        };
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}",
            t,
            self.timestamp,
            self.collector,
            self.peer_ip,
            self.peer_asn,
            OptionToStr(&self.prefix),
            OptionToStr(&self.as_path),
        )
    }
}
