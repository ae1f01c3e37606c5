//! Kafka transport: publishes view frames to a per-producer topic group.
//!
//! Topic namespace: `{namespace}.{identity}.{pfxs|peers|meta}` for a
//! producer's data topics, `{namespace}.members` for producer liveness and
//! `{namespace}.globalmeta[.{channel}]` for the global consumer side.
//! Frames inside the pfxs topic follow the binary view/diff formats.
//!
//! Transport failures mark the sender disconnected and are retried with
//! exponential backoff (10 s doubling to a 180 s cap, five attempts per
//! frame) on the next send.

use crate::error::BgpViewError;
use crate::io::diff::{encode_diff, DiffStats};
use crate::io::file::encode_view;
use crate::io::ViewFilter;
use crate::view::BgpView;
use bytes::{BufMut, BytesMut};
use kafka::producer::{Producer, Record, RequiredAcks};
use log::{info, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const CONNECT_MAX_RETRIES: u32 = 5;
const CONNECT_BACKOFF_START_SECS: u64 = 10;
const CONNECT_BACKOFF_CAP_SECS: u64 = 180;

pub const NAMESPACE_DEFAULT: &str = "bgpview";
pub const BROKERS_DEFAULT: &str = "localhost:9092";

/// Kafka connection and topic-namespace configuration.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub namespace: String,
    /// Producer identity; distinguishes topic groups within the namespace.
    pub identity: String,
    /// Optional global metadata channel.
    pub channel: Option<String>,
}

impl KafkaConfig {
    pub fn new(identity: &str) -> Self {
        KafkaConfig {
            brokers: vec![BROKERS_DEFAULT.to_string()],
            namespace: NAMESPACE_DEFAULT.to_string(),
            identity: identity.to_string(),
            channel: None,
        }
    }

    pub fn pfxs_topic(&self) -> String {
        format!("{}.{}.pfxs", self.namespace, self.identity)
    }

    pub fn peers_topic(&self) -> String {
        format!("{}.{}.peers", self.namespace, self.identity)
    }

    pub fn meta_topic(&self) -> String {
        format!("{}.{}.meta", self.namespace, self.identity)
    }

    pub fn members_topic(&self) -> String {
        format!("{}.members", self.namespace)
    }

    pub fn globalmeta_topic(&self) -> String {
        match &self.channel {
            Some(channel) => format!("{}.globalmeta.{}", self.namespace, channel),
            None => format!("{}.globalmeta", self.namespace),
        }
    }
}

/// Frame type tag carried on the meta topic.
const META_SYNC: u8 = b'S';
const META_DIFF: u8 = b'D';

/// Producer-side kafka client for view frames.
pub struct KafkaSender {
    config: KafkaConfig,
    producer: Option<Producer>,
    connected: bool,
}

impl KafkaSender {
    pub fn new(config: KafkaConfig) -> Result<Self, BgpViewError> {
        if config.identity.is_empty() {
            return Err(BgpViewError::InvalidArg(
                "kafka producer requires an identity".to_string(),
            ));
        }
        Ok(KafkaSender {
            config,
            producer: None,
            connected: false,
        })
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    // Connects with exponential backoff; gives up for the current frame
    // after CONNECT_MAX_RETRIES attempts.
    fn ensure_connected(&mut self) -> Result<&mut Producer, BgpViewError> {
        if self.connected && self.producer.is_some() {
            return Ok(self.producer.as_mut().expect("producer present"));
        }

        let mut wait = CONNECT_BACKOFF_START_SECS;
        let mut last_err = String::new();
        for attempt in 0..CONNECT_MAX_RETRIES {
            match Producer::from_hosts(self.config.brokers.clone())
                .with_ack_timeout(Duration::from_secs(5))
                .with_required_acks(RequiredAcks::One)
                .create()
            {
                Ok(producer) => {
                    self.producer = Some(producer);
                    self.connected = true;
                    return Ok(self.producer.as_mut().expect("producer just set"));
                }
                Err(e) => {
                    last_err = e.to_string();
                    if attempt + 1 < CONNECT_MAX_RETRIES {
                        warn!(
                            "failed to connect to kafka ({}); retrying in {} seconds",
                            last_err, wait
                        );
                        std::thread::sleep(Duration::from_secs(wait));
                        wait = (wait * 2).min(CONNECT_BACKOFF_CAP_SECS);
                    }
                }
            }
        }
        Err(BgpViewError::Transport(format!(
            "giving up connecting to kafka after {} attempts: {}",
            CONNECT_MAX_RETRIES, last_err
        )))
    }

    fn produce(&mut self, topic: &str, payload: &[u8]) -> Result<(), BgpViewError> {
        let producer = self.ensure_connected()?;
        match producer.send(&Record::from_value(topic, payload)) {
            Ok(()) => Ok(()),
            Err(e) => {
                // connection state is preserved for the backoff reconnect
                self.connected = false;
                Err(BgpViewError::Transport(e.to_string()))
            }
        }
    }

    fn send_meta(&mut self, kind: u8, time: u32, parent_time: u32) -> Result<(), BgpViewError> {
        let mut meta = BytesMut::with_capacity(9);
        meta.put_u8(kind);
        meta.put_u32(time);
        meta.put_u32(parent_time);
        let topic = self.config.meta_topic();
        self.produce(&topic, &meta)
    }

    /// Publishes a full view as a sync frame. Returns the number of
    /// prefixes in the view's (filtered) active projection.
    pub fn send_sync(
        &mut self,
        view: &BgpView,
        filter: Option<&dyn ViewFilter>,
    ) -> Result<u32, BgpViewError> {
        let frame = encode_view(view, filter)?;
        let topic = self.config.pfxs_topic();
        self.produce(&topic, &frame)?;
        self.send_meta(META_SYNC, view.get_time(), view.get_time())?;
        Ok(view.pfx_cnt(crate::view::FieldFilter::ACTIVE, None) as u32)
    }

    /// Publishes the delta between `parent` and `view` as a diff frame.
    pub fn send_diff(
        &mut self,
        parent: &BgpView,
        view: &BgpView,
        filter: Option<&dyn ViewFilter>,
    ) -> Result<DiffStats, BgpViewError> {
        let (frame, stats) = encode_diff(parent, view, filter)?;
        let topic = self.config.pfxs_topic();
        self.produce(&topic, &frame)?;
        self.send_meta(META_DIFF, view.get_time(), parent.get_time())?;
        Ok(stats)
    }

    /// Announces this producer on the members topic; `time = 0` signals a
    /// graceful shutdown.
    pub fn send_members_update(&mut self, time: u32) -> Result<(), BgpViewError> {
        let payload = format!("{} {}", self.config.identity, time);
        let topic = self.config.members_topic();
        self.produce(&topic, payload.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    IDLE,
    RUNNING,
    SHUTDOWN,
}

struct Job {
    view: BgpView,
    parent: Option<BgpView>,
}

struct Slot {
    state: WorkerState,
    job: Option<Job>,
}

/// Background sender worker: one per `(identity, topic-group)`.
///
/// The main task hands over detached view snapshots through a single slot
/// protected by a mutex and condition variable; ownership of a submitted
/// snapshot is exclusive to the worker. The worker observes shutdown
/// between jobs and drains a pending job before exiting.
pub struct SenderWorker {
    slot: Arc<(Mutex<Slot>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl SenderWorker {
    pub fn spawn(
        sender: KafkaSender,
        filter: Option<Box<dyn ViewFilter + Send>>,
    ) -> SenderWorker {
        let slot = Arc::new((
            Mutex::new(Slot {
                state: WorkerState::IDLE,
                job: None,
            }),
            Condvar::new(),
        ));
        let worker_slot = Arc::clone(&slot);
        let handle = std::thread::spawn(move || worker_loop(sender, worker_slot, filter));
        SenderWorker {
            slot,
            handle: Some(handle),
        }
    }

    /// Hands a detached snapshot (and optionally its parent) to the worker.
    /// Fails with `Transport` when the worker is still busy with the
    /// previous frame or already shut down.
    pub fn submit(&self, view: BgpView, parent: Option<BgpView>) -> Result<(), BgpViewError> {
        let (mutex, cond) = &*self.slot;
        let mut slot = mutex.lock();
        match slot.state {
            WorkerState::SHUTDOWN => {
                return Err(BgpViewError::Transport("sender worker shut down".to_string()))
            }
            WorkerState::RUNNING => {
                return Err(BgpViewError::Transport(
                    "sender worker busy; dropping frame".to_string(),
                ))
            }
            WorkerState::IDLE => {}
        }
        slot.job = Some(Job { view, parent });
        slot.state = WorkerState::RUNNING;
        cond.notify_one();
        Ok(())
    }

    /// Requests shutdown and waits for the worker to drain.
    pub fn shutdown(mut self) {
        {
            let (mutex, cond) = &*self.slot;
            let mut slot = mutex.lock();
            slot.state = WorkerState::SHUTDOWN;
            cond.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SenderWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let (mutex, cond) = &*self.slot;
            let mut slot = mutex.lock();
            slot.state = WorkerState::SHUTDOWN;
            cond.notify_one();
            drop(slot);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(
    mut sender: KafkaSender,
    slot: Arc<(Mutex<Slot>, Condvar)>,
    filter: Option<Box<dyn ViewFilter + Send>>,
) {
    let (mutex, cond) = &*slot;
    loop {
        let (job, shutting_down) = {
            let mut slot = mutex.lock();
            loop {
                match slot.state {
                    WorkerState::SHUTDOWN => break (slot.job.take(), true),
                    WorkerState::RUNNING if slot.job.is_some() => {
                        break (slot.job.take(), false)
                    }
                    _ => cond.wait(&mut slot),
                }
            }
        };

        if let Some(job) = job {
            let filter_ref = filter.as_deref().map(|f| f as &dyn ViewFilter);
            let result = match &job.parent {
                Some(parent) => sender.send_diff(parent, &job.view, filter_ref).map(|_| ()),
                None => sender.send_sync(&job.view, filter_ref).map(|_| ()),
            };
            if let Err(e) = result {
                warn!("failed to publish view frame: {}", e);
            }
        }

        if shutting_down {
            info!("sender worker for {} draining and exiting", sender.config().identity);
            let _ = sender.send_members_update(0);
            return;
        }

        let mut slot = mutex.lock();
        if slot.state == WorkerState::RUNNING {
            slot.state = WorkerState::IDLE;
        }
    }
}
