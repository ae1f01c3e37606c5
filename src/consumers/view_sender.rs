//! The view-sender: publishes each processed view over a transport as
//! either a full sync frame or a parent-relative diff.
//!
//! Sync frames go out whenever the view time falls on the sync cadence;
//! all other views are sent as diffs against the previously published
//! view. Until the first aligned sync has been published, views are
//! skipped entirely so every consumer can bootstrap from a sync frame.
//! Peers below the full-feed thresholds are filtered from everything that
//! is published.

use crate::error::BgpViewError;
use crate::io::diff::DiffStats;
use crate::io::kafka::{KafkaConfig, KafkaSender};
use crate::io::ViewFilter;
use crate::utils::graphite_safe;
use crate::view::{BgpView, PeerRef, PfxPeerRef};
use log::{debug, info};

/// A sync frame is sent once every this many seconds (aligned to a
/// multiple), by default once per hour on the hour.
pub const SECONDS_BETWEEN_SYNC: u32 = 3600;

/// Default full-feed thresholds: peers advertising fewer prefixes are
/// considered partial feeds and are not published.
pub const FILTER_FF_V4CNT_DEFAULT: u32 = 400_000;
pub const FILTER_FF_V6CNT_DEFAULT: u32 = 10_000;

/// Transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoModule {
    Kafka,
    Zmq,
}

/// View-sender configuration.
#[derive(Debug, Clone)]
pub struct ViewSenderConfig {
    pub io_module: IoModule,
    /// Instance name; sanitized into metric paths.
    pub instance: String,
    /// Cadence of full syncs in seconds.
    pub sync_interval: u32,
    /// Peers with fewer active IPv4 prefixes than this (and fewer IPv6
    /// prefixes than `filter_ff_v6_min`) are dropped.
    pub filter_ff_v4_min: u32,
    pub filter_ff_v6_min: u32,
}

impl ViewSenderConfig {
    pub fn new(instance: &str) -> Self {
        ViewSenderConfig {
            io_module: IoModule::Kafka,
            instance: instance.to_string(),
            sync_interval: SECONDS_BETWEEN_SYNC,
            filter_ff_v4_min: FILTER_FF_V4CNT_DEFAULT,
            filter_ff_v6_min: FILTER_FF_V6CNT_DEFAULT,
        }
    }
}

/// Keeps only full-feed peers: a peer passes when it clears the IPv4 or
/// the IPv6 active-prefix threshold.
#[derive(Debug, Clone, Copy)]
pub struct FullFeedFilter {
    pub v4_min: u32,
    pub v6_min: u32,
}

impl ViewFilter for FullFeedFilter {
    fn keep_peer(&self, peer: &PeerRef) -> bool {
        peer.info().pfx_cnt_v4() >= self.v4_min || peer.info().pfx_cnt_v6() >= self.v6_min
    }

    fn keep_pfx_peer(&self, pfx_peer: &PfxPeerRef) -> bool {
        pfx_peer
            .peer_info()
            .map(|info| info.pfx_cnt_v4() >= self.v4_min || info.pfx_cnt_v6() >= self.v6_min)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameDecision {
    Sync,
    Diff,
    Skip,
}

// Sync on the cadence; diff only once a parent exists and the first
// aligned sync has been published; skip everything before alignment.
pub(crate) fn decide_frame(
    time: u32,
    sync_interval: u32,
    has_parent: bool,
    synced: bool,
) -> FrameDecision {
    if time % sync_interval == 0 {
        FrameDecision::Sync
    } else if synced && has_parent {
        FrameDecision::Diff
    } else {
        FrameDecision::Skip
    }
}

/// Publishes views over kafka on the sync/diff cadence.
pub struct ViewSender {
    config: ViewSenderConfig,
    gr_instance: String,
    sender: KafkaSender,
    parent: Option<BgpView>,
    synced: bool,
}

impl ViewSender {
    pub fn new(config: ViewSenderConfig, kafka: KafkaConfig) -> Result<Self, BgpViewError> {
        match config.io_module {
            IoModule::Kafka => {}
            IoModule::Zmq => {
                return Err(BgpViewError::InvalidArg(
                    "zmq io module is not built into this crate".to_string(),
                ))
            }
        }
        if config.sync_interval == 0 {
            return Err(BgpViewError::InvalidArg(
                "sync interval must be positive".to_string(),
            ));
        }
        let gr_instance = graphite_safe(&config.instance);
        Ok(ViewSender {
            config,
            gr_instance,
            sender: KafkaSender::new(kafka)?,
            parent: None,
            synced: false,
        })
    }

    /// Metric-safe instance name.
    pub fn instance(&self) -> &str {
        &self.gr_instance
    }

    /// Publishes one view. Returns the frame statistics, or `None` when
    /// publication was skipped waiting for sync alignment.
    pub fn process_view(&mut self, view: &BgpView) -> Result<Option<DiffStats>, BgpViewError> {
        let filter = FullFeedFilter {
            v4_min: self.config.filter_ff_v4_min,
            v6_min: self.config.filter_ff_v6_min,
        };

        match decide_frame(
            view.get_time(),
            self.config.sync_interval,
            self.parent.is_some(),
            self.synced,
        ) {
            FrameDecision::Sync => {
                let sync_pfx_cnt = self.sender.send_sync(view, Some(&filter))?;
                info!(
                    "{}: sent sync frame at {} ({} pfxs)",
                    self.gr_instance,
                    view.get_time(),
                    sync_pfx_cnt
                );
                self.parent = Some(view.dup());
                self.synced = true;
                Ok(Some(DiffStats {
                    sync_pfx_cnt,
                    pfx_cnt: sync_pfx_cnt,
                    ..Default::default()
                }))
            }
            FrameDecision::Diff => {
                let parent = self
                    .parent
                    .as_ref()
                    .ok_or_else(|| BgpViewError::Internal("diff without parent".to_string()))?;
                let stats = self.sender.send_diff(parent, view, Some(&filter))?;
                debug!(
                    "{}: sent diff frame at {} (+{} ~{} -{} pfxs)",
                    self.gr_instance,
                    view.get_time(),
                    stats.added_pfxs_cnt,
                    stats.changed_pfxs_cnt,
                    stats.removed_pfxs_cnt
                );
                self.parent = Some(view.dup());
                Ok(Some(stats))
            }
            FrameDecision::Skip => {
                info!(
                    "{}: view at {} not aligned with sync cadence yet; skipping",
                    self.gr_instance,
                    view.get_time()
                );
                Ok(None)
            }
        }
    }
}
