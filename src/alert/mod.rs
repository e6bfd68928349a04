//! 告警分发 (AlertDispatcher)
//!
//! 固定数量的告警线程 + 有界队列. 队列满时丢弃新告警 (不阻塞采集线程).
//! 每个告警: 保存证据 → 解析位置 → 发送通知 → 写入记录 → 回写状态.
//! 告警线程的任何错误都不会回传到采集线程.

pub mod evidence;
pub mod geocoder;
pub mod notifier;
pub mod record_store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::events::Event;
use crate::status::{StatusStore, StatusUpdate};

pub use evidence::EvidenceStore;
pub use geocoder::{CoordinateGeocoder, Geocoder, LocationResolver, OpenCageGeocoder};
pub use notifier::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use record_store::{EventRecord, JsonlRecordStore, RecordStore};

#[derive(Clone, Debug)]
pub struct AlertConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// 通知/记录失败后的额外重试次数
    pub retries: u32,
    pub retry_base: Duration,
    pub recipient: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 16,
            retries: 2,
            retry_base: Duration::from_millis(500),
            recipient: "alerts@localhost".to_string(),
        }
    }
}

/// 一个待处理的告警 (事件按值拷贝 + 标注后的 JPEG)
#[derive(Clone, Debug)]
pub struct AlertJob {
    pub event: Event,
    pub jpeg: Bytes,
}

/// 告警线程共享的外部协作者
pub struct AlertServices {
    pub evidence: EvidenceStore,
    pub resolver: Arc<LocationResolver>,
    pub notifier: Box<dyn Notifier>,
    pub records: Box<dyn RecordStore>,
    pub status: Arc<StatusStore>,
}

/// 单个告警的处理结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertOutcome {
    pub persisted: bool,
    pub notified: bool,
    pub recorded: bool,
    pub location: String,
}

impl AlertOutcome {
    pub fn sent(&self) -> bool {
        self.notified && self.recorded
    }
}

struct Worker {
    config: AlertConfig,
    services: AlertServices,
    completed: AtomicU64,
}

pub struct AlertDispatcher {
    tx: Mutex<Option<Sender<AlertJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Worker>,
    dropped: AtomicU64,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig, services: AlertServices) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(config.queue_capacity.max(1));
        let worker_count = config.workers.max(1);
        let shared = Arc::new(Worker {
            config,
            services,
            completed: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx: Receiver<AlertJob> = rx.clone();
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("alert-{i}"))
                .spawn(move || {
                    for job in rx.iter() {
                        shared.process(job);
                    }
                })?;
            workers.push(handle);
        }
        info!("✅ 告警线程池启动: {} 线程, 队列 {}", worker_count, shared.config.queue_capacity);

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            shared,
            dropped: AtomicU64::new(0),
        })
    }

    /// 非阻塞投递, 队列满或已关闭时丢弃并返回 false
    pub fn dispatch(&self, job: AlertJob) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("⚠️ 告警线程池已关闭, 丢弃告警 {}", job.event.image_path);
            return false;
        };
        match tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "⚠️ 告警队列已满, 丢弃告警 {} (累计丢弃 {})",
                    job.event.image_path, dropped
                );
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// 关闭队列并等待已入队的告警全部处理完
    pub fn shutdown(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if handle.join().is_err() {
                error!("❌ 告警线程异常退出");
            }
        }
    }
}

impl Worker {
    fn process(&self, job: AlertJob) -> AlertOutcome {
        let AlertJob { event, jpeg } = job;
        let services = &self.services;

        let persisted = match services.evidence.save(&event.image_path, &jpeg) {
            Ok(_) => true,
            Err(e) => {
                error!("❌ 证据保存失败: {}", e);
                false
            }
        };

        let location = match &event.location {
            Some(location) => location.clone(),
            None => services.resolver.resolve(),
        };

        let notification = Notification::for_event(
            &event,
            &self.config.recipient,
            &location,
            &services.resolver.map_link(),
            jpeg,
        );
        let notified = self.with_retry("通知", || services.notifier.send(&notification));

        let record = EventRecord {
            event_type: event.kind,
            location: location.clone(),
            image_path: event.image_path.clone(),
            timestamp: event.timestamp,
        };
        let recorded = self.with_retry("记录", || services.records.insert(&record));

        let outcome = AlertOutcome {
            persisted,
            notified,
            recorded,
            location,
        };

        // 只回写仍描述同一事件的状态
        let mut update = StatusUpdate::new().location(Some(outcome.location.clone()));
        if outcome.sent() {
            update = update.alert_sent(true);
        }
        let path = event.image_path.as_str();
        let applied = services
            .status
            .update_if(|s| s.last_image_path.as_deref() == Some(path), update);
        if !applied {
            info!("📊 告警 {} 完成时状态已更新为新事件, 跳过回写", path);
        }

        self.completed.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    /// 首次尝试 + `retries` 次指数退避重试
    fn with_retry<F>(&self, what: &str, mut attempt: F) -> bool
    where
        F: FnMut() -> Result<()>,
    {
        let mut delay = self.config.retry_base;
        for n in 0..=self.config.retries {
            match attempt() {
                Ok(()) => return true,
                Err(e) if n < self.config.retries => {
                    warn!("⚠️ {}失败 (第{}次), {:?} 后重试: {}", what, n + 1, delay, e);
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                Err(e) => error!("❌ {}失败, 放弃: {}", what, e),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::error::SentinelError;
    use crate::events::EventKind;
    use chrono::Local;
    use std::sync::atomic::AtomicUsize;

    struct FlakyNotifier {
        failures_left: AtomicUsize,
        calls: Arc<AtomicUsize>,
    }

    impl Notifier for FlakyNotifier {
        fn send(&self, _n: &Notification) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(SentinelError::NotifyFailure("smtp down".into()));
            }
            Ok(())
        }
    }

    struct FailingGeocoder;

    impl Geocoder for FailingGeocoder {
        fn reverse(&self, _lat: f64, _lon: f64) -> Result<Option<String>> {
            Err(SentinelError::GeocodeFailure("timeout".into()))
        }
    }

    /// 阻塞直到测试放行, 用于填满队列
    struct GateNotifier {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl Notifier for GateNotifier {
        fn send(&self, _n: &Notification) -> Result<()> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        status: Arc<StatusStore>,
        records_path: std::path::PathBuf,
        evidence_root: std::path::PathBuf,
    }

    fn config(workers: usize, queue_capacity: usize) -> AlertConfig {
        AlertConfig {
            workers,
            queue_capacity,
            retries: 2,
            retry_base: Duration::from_millis(1),
            recipient: "ops@example.com".into(),
        }
    }

    fn build(
        config: AlertConfig,
        notifier: Box<dyn Notifier>,
        geocoder: Box<dyn Geocoder>,
    ) -> (AlertDispatcher, Fixture) {
        let dir = tempfile::tempdir().unwrap();
        let status = Arc::new(StatusStore::new());
        let records_path = dir.path().join("events.jsonl");
        let evidence_root = dir.path().join("evidence");
        let services = AlertServices {
            evidence: EvidenceStore::new(&evidence_root),
            resolver: Arc::new(LocationResolver::new(geocoder, 12.9716, 77.5946)),
            notifier,
            records: Box::new(JsonlRecordStore::new(&records_path)),
            status: status.clone(),
        };
        let dispatcher = AlertDispatcher::new(config, services).unwrap();
        let fixture = Fixture {
            _dir: dir,
            status,
            records_path,
            evidence_root,
        };
        (dispatcher, fixture)
    }

    /// 模拟采集线程: 先原子替换状态, 再投递告警
    fn raise(status: &StatusStore, dispatcher: &AlertDispatcher, id: u64, kind: EventKind) -> Event {
        let event = Event::new(id, kind, BBox::new(0.0, 0.0, 5.0, 5.0), Local::now(), None);
        raise_event(status, dispatcher, event)
    }

    fn raise_event(status: &StatusStore, dispatcher: &AlertDispatcher, event: Event) -> Event {
        let kind = event.kind;
        status.replace(
            StatusUpdate::new()
                .fire_detected(kind == EventKind::Fire)
                .accident_detected(kind == EventKind::Collision)
                .last_event(Some(kind))
                .last_image_path(Some(event.image_path.clone()))
                .alert_sent(false),
        );
        dispatcher.dispatch(AlertJob {
            event: event.clone(),
            jpeg: Bytes::from_static(b"\xFF\xD8jpeg"),
        });
        event
    }

    #[test]
    fn test_successful_alert_marks_sent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = FlakyNotifier {
            failures_left: AtomicUsize::new(1),
            calls: calls.clone(),
        };
        let (dispatcher, fx) = build(config(1, 4), Box::new(notifier), Box::new(CoordinateGeocoder));
        let event = raise(&fx.status, &dispatcher, 1, EventKind::Collision);
        dispatcher.shutdown();

        let status = fx.status.read();
        assert!(status.alert_sent);
        assert_eq!(status.location.as_deref(), Some("12.9716, 77.5946"));
        // 第一次失败, 重试成功
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(fx.evidence_root.join(&event.image_path).is_file());

        let records = JsonlRecordStore::new(&fx.records_path).load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image_path, event.image_path);
        assert_eq!(dispatcher.completed(), 1);
    }

    #[test]
    fn test_notify_failure_keeps_alert_unsent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = FlakyNotifier {
            failures_left: AtomicUsize::new(usize::MAX),
            calls: calls.clone(),
        };
        let (dispatcher, fx) = build(config(1, 4), Box::new(notifier), Box::new(FailingGeocoder));
        raise(&fx.status, &dispatcher, 1, EventKind::Fire);
        dispatcher.shutdown();

        let status = fx.status.read();
        assert!(!status.alert_sent);
        assert!(status.fire_detected);
        assert_eq!(status.location.as_deref(), Some(geocoder::LOCATION_ERROR));
        // 首次 + 2 次重试
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 记录仍然写入
        assert_eq!(JsonlRecordStore::new(&fx.records_path).load().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_completion_does_not_mark_newer_event() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let notifier = GateNotifier {
            entered: entered_tx,
            release: release_rx,
        };
        let (dispatcher, fx) = build(config(1, 4), Box::new(notifier), Box::new(CoordinateGeocoder));

        raise(&fx.status, &dispatcher, 1, EventKind::Collision);
        entered_rx.recv().unwrap();
        // 第一个告警处理中, 新事件覆盖状态
        let newer = raise(&fx.status, &dispatcher, 2, EventKind::Fire);
        release_tx.send(()).unwrap();
        entered_rx.recv().unwrap();
        let mid = fx.status.read();
        assert_eq!(mid.last_image_path.as_deref(), Some(newer.image_path.as_str()));
        assert!(!mid.alert_sent);

        release_tx.send(()).unwrap();
        dispatcher.shutdown();
        assert!(fx.status.read().alert_sent);
    }

    /// 先阻塞, 放行后对指定附件返回失败
    struct SelectiveGateNotifier {
        entered: Sender<()>,
        release: Receiver<()>,
        failing_attachment: String,
    }

    impl Notifier for SelectiveGateNotifier {
        fn send(&self, n: &Notification) -> Result<()> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            if n.attachment_name == self.failing_attachment {
                return Err(SentinelError::NotifyFailure("smtp down".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_same_second_events_keep_separate_alert_outcomes() {
        use chrono::TimeZone;

        let t0 = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = Event::new(1, EventKind::Collision, BBox::new(0.0, 0.0, 5.0, 5.0), t0, None);
        let second = Event::new(
            2,
            EventKind::Collision,
            BBox::new(0.0, 0.0, 5.0, 5.0),
            t0 + chrono::TimeDelta::milliseconds(100),
            None,
        );
        assert_ne!(first.image_path, second.image_path);

        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let notifier = SelectiveGateNotifier {
            entered: entered_tx,
            release: release_rx,
            failing_attachment: "accident_20240101_000000_2.jpg".into(),
        };
        let mut cfg = config(1, 4);
        cfg.retries = 0;
        let (dispatcher, fx) = build(cfg, Box::new(notifier), Box::new(CoordinateGeocoder));

        raise_event(&fx.status, &dispatcher, first.clone());
        entered_rx.recv().unwrap();
        let second = raise_event(&fx.status, &dispatcher, second);

        // 第一个告警成功完成, 不能把第二个事件标记为已发送
        release_tx.send(()).unwrap();
        entered_rx.recv().unwrap();
        let mid = fx.status.read();
        assert_eq!(mid.last_image_path.as_deref(), Some(second.image_path.as_str()));
        assert!(!mid.alert_sent);

        // 第二个告警通知失败
        release_tx.send(()).unwrap();
        dispatcher.shutdown();
        assert!(!fx.status.read().alert_sent);

        // 两份证据各自落盘
        assert!(fx.evidence_root.join(&first.image_path).is_file());
        assert!(fx.evidence_root.join(&second.image_path).is_file());
        let records = JsonlRecordStore::new(&fx.records_path).load().unwrap();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].image_path, records[1].image_path);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let notifier = GateNotifier {
            entered: entered_tx,
            release: release_rx,
        };
        let (dispatcher, fx) = build(config(1, 1), Box::new(notifier), Box::new(CoordinateGeocoder));

        raise(&fx.status, &dispatcher, 1, EventKind::Fire);
        entered_rx.recv().unwrap();
        raise(&fx.status, &dispatcher, 2, EventKind::Fire);
        raise(&fx.status, &dispatcher, 3, EventKind::Fire);
        assert_eq!(dispatcher.dropped(), 1);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        dispatcher.shutdown();
        assert_eq!(dispatcher.completed(), 2);

        assert!(!dispatcher.dispatch(AlertJob {
            event: Event::new(9, EventKind::Fire, BBox::default(), Local::now(), None),
            jpeg: Bytes::new(),
        }));
        assert_eq!(dispatcher.dropped(), 2);
    }
}
