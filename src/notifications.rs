//! In-process publish/subscribe for transient user-facing notifications.
//!
//! Producers call [`NotificationBroadcaster::show`] (or one of the kind
//! shorthands); every current subscriber is called synchronously with the new
//! notification, in subscription order. Notifications with a positive
//! duration remove themselves once it elapses. Subscribers only ever see
//! creation events, never removals.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use crate::config::NotificationConfig;
use crate::metrics::{NOTIFICATIONS_ACTIVE, NOTIFICATIONS_DISMISSED, NOTIFICATIONS_SHOWN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Warning => "warning",
            NotificationKind::Info => "info",
        };
        f.write_str(s)
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(NotificationKind::Success),
            "error" => Ok(NotificationKind::Error),
            "warning" => Ok(NotificationKind::Warning),
            "info" => Ok(NotificationKind::Info),
            other => Err(format!("unknown notification type: {}", other)),
        }
    }
}

impl TryFrom<String> for NotificationKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, <NotificationKind as TryFrom<String>>::Error> {
        value.parse()
    }
}

/// Optional call-to-action attached to a notification.
#[derive(Clone, Serialize)]
pub struct NotificationAction {
    pub label: String,
    #[serde(skip)]
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl NotificationAction {
    pub fn new<F>(label: impl Into<String>, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            callback: Arc::new(callback),
        }
    }

    // Called when the user engages the action
    pub fn invoke(&self) {
        (self.callback)();
    }
}

impl fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    /// Auto-dismiss delay in milliseconds; zero or negative never expires.
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NotificationAction>,
}

pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Tracked {
    seq: u64,
    notification: Notification,
}

struct Inner {
    listeners: Mutex<Vec<(u64, Listener)>>,
    active: DashMap<String, Tracked>,
    timers: DashMap<String, JoinHandle<()>>,
    next_seq: AtomicU64,
    config: NotificationConfig,
}

impl Inner {
    fn remove(&self, id: &str, cancel_timer: bool) -> bool {
        if let Some((_, timer)) = self.timers.remove(id) {
            if cancel_timer {
                timer.abort();
            }
        }

        let found = self.active.remove(id).is_some();
        if found {
            NOTIFICATIONS_DISMISSED.inc();
            NOTIFICATIONS_ACTIVE.set(self.active.len() as f64);
        }
        found
    }
}

/// Handle returned by [`NotificationBroadcaster::subscribe`].
///
/// Dropping it does not unsubscribe; the listener stays registered until
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping the handle leaves the listener registered with no way to remove it"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
    subscribed: AtomicBool,
}

impl Subscription {
    /// Removes this listener. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        if !self.subscribed.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            let mut listeners = inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.retain(|(id, _)| *id != self.id);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
pub struct NotificationBroadcaster {
    inner: Arc<Inner>,
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new(NotificationConfig::default())
    }
}

impl NotificationBroadcaster {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(Vec::new()),
                active: DashMap::new(),
                timers: DashMap::new(),
                next_seq: AtomicU64::new(0),
                config,
            }),
        }
    }

    #[must_use = "keep the handle to be able to unsubscribe"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        let mut listeners = self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push((id, listener));
        tracing::debug!(subscribers = listeners.len(), "notification listener subscribed");

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
            subscribed: AtomicBool::new(true),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn show(&self, message: impl Into<String>, kind: NotificationKind, duration_ms: i64) -> String {
        self.show_with_action(message, kind, duration_ms, None)
    }

    pub fn show_with_action(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        duration_ms: i64,
        action: Option<NotificationAction>,
    ) -> String {
        let message = message.into();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);

        // the id is reserved and stored under one shard lock
        let notification = loop {
            let id = candidate_id();
            if let Entry::Vacant(slot) = self.inner.active.entry(id.clone()) {
                let notification = Notification {
                    id,
                    kind,
                    message,
                    duration_ms,
                    created_at: Utc::now(),
                    action,
                };
                slot.insert(Tracked {
                    seq,
                    notification: notification.clone(),
                });
                break notification;
            }
        };
        let id = notification.id.clone();
        NOTIFICATIONS_SHOWN.inc();
        NOTIFICATIONS_ACTIVE.set(self.inner.active.len() as f64);
        tracing::debug!(id = %id, kind = %kind, duration_ms, "notification raised");

        // snapshot so listeners can call back into the broadcaster
        let listeners: Vec<Listener> = {
            let guard = self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(&notification);
        }

        if duration_ms > 0 && self.inner.active.contains_key(&id) {
            self.schedule_expiry(&id, Duration::from_millis(duration_ms as u64));
        }

        id
    }

    pub fn success(&self, message: impl Into<String>, duration_ms: Option<i64>) -> String {
        self.show(message, NotificationKind::Success, self.duration_or_default(duration_ms))
    }

    pub fn error(&self, message: impl Into<String>, duration_ms: Option<i64>) -> String {
        self.show(message, NotificationKind::Error, self.duration_or_default(duration_ms))
    }

    pub fn warning(&self, message: impl Into<String>, duration_ms: Option<i64>) -> String {
        self.show(message, NotificationKind::Warning, self.duration_or_default(duration_ms))
    }

    pub fn info(&self, message: impl Into<String>, duration_ms: Option<i64>) -> String {
        self.show(message, NotificationKind::Info, self.duration_or_default(duration_ms))
    }

    /// Removes a notification early. Returns whether it was still tracked.
    pub fn dismiss(&self, id: &str) -> bool {
        let found = self.inner.remove(id, true);
        if found {
            tracing::debug!(id, "notification dismissed");
        }
        found
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.inner.active.get(id).map(|t| t.notification.clone())
    }

    /// Currently tracked notifications, oldest first.
    pub fn active(&self) -> Vec<Notification> {
        let mut tracked: Vec<(u64, Notification)> = self
            .inner
            .active
            .iter()
            .map(|t| (t.seq, t.notification.clone()))
            .collect();
        tracked.sort_by_key(|(seq, _)| *seq);
        tracked.into_iter().map(|(_, n)| n).collect()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.len()
    }

    /// Cancels every auto-dismiss timer and drops all listeners and notifications.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.inner.timers.iter().map(|t| t.key().clone()).collect();
        for id in ids {
            if let Some((_, timer)) = self.inner.timers.remove(&id) {
                timer.abort();
            }
        }
        self.inner.active.clear();
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        NOTIFICATIONS_ACTIVE.set(0.0);
        tracing::info!("notification broadcaster shut down");
    }

    fn duration_or_default(&self, duration_ms: Option<i64>) -> i64 {
        duration_ms.unwrap_or(self.inner.config.default_duration_ms)
    }

    fn schedule_expiry(&self, id: &str, delay: Duration) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(id, "no async runtime, notification will not auto-dismiss");
            return;
        };

        let inner = Arc::downgrade(&self.inner);
        let timer_id = id.to_string();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                if inner.remove(&timer_id, false) {
                    tracing::debug!(id = %timer_id, "notification expired");
                }
            }
        });

        self.inner.timers.insert(id.to_string(), handle);
        // expired before the handle was recorded
        if !self.inner.active.contains_key(id) {
            self.inner.timers.remove(id);
        }
    }
}

// creation time plus a random suffix
fn candidate_id() -> String {
    let suffix = rand::thread_rng().r#gen::<u32>();
    format!("{}-{:08x}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Success".parse::<NotificationKind>(), Ok(NotificationKind::Success));
        assert_eq!(" warning ".parse::<NotificationKind>(), Ok(NotificationKind::Warning));
        assert!("loud".parse::<NotificationKind>().is_err());
        assert_eq!(NotificationKind::default(), NotificationKind::Info);
    }

    #[test]
    fn kind_deserializes_with_same_rules_as_parse() {
        let kind: NotificationKind = serde_json::from_str("\"Success\"").unwrap();
        assert_eq!(kind, NotificationKind::Success);
        let kind: NotificationKind = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(kind, NotificationKind::Warning);
        assert!(serde_json::from_str::<NotificationKind>("\"loud\"").is_err());
        assert_eq!(serde_json::to_value(NotificationKind::Error).unwrap(), "error");
    }

    #[test]
    fn concurrent_shows_never_share_an_id() {
        let broadcaster = NotificationBroadcaster::default();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let broadcaster = broadcaster.clone();
                std::thread::spawn(move || {
                    (0..200)
                        .map(|i| broadcaster.show(format!("n{}", i), NotificationKind::Info, 0))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<String> = threads.into_iter().flat_map(|t| t.join().unwrap()).collect();
        assert_eq!(broadcaster.active().len(), 1_600);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1_600);
    }

    #[test]
    fn dropped_handle_keeps_listener_registered() {
        let broadcaster = NotificationBroadcaster::default();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        drop(broadcaster.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        broadcaster.show("still heard", NotificationKind::Info, 0);
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fan_out_reaches_subscribers_in_order() {
        let broadcaster = NotificationBroadcaster::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let _a = broadcaster.subscribe(move |n| {
            first.lock().unwrap().push(("first", n.id.clone(), n.kind, n.message.clone()));
        });
        let second = Arc::clone(&seen);
        let _b = broadcaster.subscribe(move |n| {
            second.lock().unwrap().push(("second", n.id.clone(), n.kind, n.message.clone()));
        });

        let id = broadcaster.show("hi", NotificationKind::Success, 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        for (_, seen_id, kind, message) in seen.iter() {
            assert_eq!(seen_id, &id);
            assert_eq!(*kind, NotificationKind::Success);
            assert_eq!(message, "hi");
        }
    }

    #[test]
    fn late_subscriber_misses_earlier_notifications() {
        let broadcaster = NotificationBroadcaster::default();
        broadcaster.show("before", NotificationKind::Info, 0);

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = broadcaster.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        broadcaster.show("after", NotificationKind::Info, 0);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_isolated() {
        let broadcaster = NotificationBroadcaster::default();
        let kept = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));

        let k = Arc::clone(&kept);
        let _keep = broadcaster.subscribe(move |_| {
            k.fetch_add(1, Ordering::SeqCst);
        });
        let d = Arc::clone(&dropped);
        let gone = broadcaster.subscribe(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        gone.unsubscribe();
        gone.unsubscribe();
        assert!(!gone.is_subscribed());
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.show("x", NotificationKind::Info, 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dismiss_reports_whether_found() {
        let broadcaster = NotificationBroadcaster::default();
        let id = broadcaster.show("x", NotificationKind::Error, 0);
        assert!(broadcaster.get(&id).is_some());

        assert!(broadcaster.dismiss(&id));
        assert!(!broadcaster.dismiss(&id));
        assert!(!broadcaster.dismiss("no-such-id"));
        assert!(broadcaster.active().is_empty());
    }

    #[test]
    fn listener_may_dismiss_during_delivery() {
        let broadcaster = NotificationBroadcaster::default();
        let handle = broadcaster.clone();
        let _sub = broadcaster.subscribe(move |n| {
            handle.dismiss(&n.id);
        });

        let id = broadcaster.show("gone", NotificationKind::Info, 0);
        assert!(broadcaster.get(&id).is_none());
    }

    #[test]
    fn shorthands_use_configured_default_duration() {
        let broadcaster = NotificationBroadcaster::new(NotificationConfig {
            default_duration_ms: 0,
        });
        let ok = broadcaster.success("saved", None);
        let warn = broadcaster.warning("careful", Some(-5));

        assert_eq!(broadcaster.get(&ok).map(|n| (n.kind, n.duration_ms)), Some((NotificationKind::Success, 0)));
        assert_eq!(broadcaster.get(&warn).map(|n| n.duration_ms), Some(-5));
        assert_eq!(broadcaster.pending_timers(), 0);
    }

    #[test]
    fn without_runtime_positive_duration_stays_active() {
        let broadcaster = NotificationBroadcaster::default();
        let id = broadcaster.info("no timer here", Some(10));
        assert!(broadcaster.get(&id).is_some());
        assert_eq!(broadcaster.pending_timers(), 0);
    }

    #[test]
    fn action_callback_runs_on_invoke() {
        let broadcaster = NotificationBroadcaster::default();
        let clicks = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&clicks);
        let action = NotificationAction::new("Undo", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let id = broadcaster.show_with_action("deleted", NotificationKind::Warning, 0, Some(action));
        let notification = broadcaster.get(&id).unwrap();
        notification.action.as_ref().unwrap().invoke();
        assert_eq!(clicks.load(Ordering::SeqCst), 1);

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["action"]["label"], "Undo");
    }

    #[test]
    fn active_lists_in_creation_order() {
        let broadcaster = NotificationBroadcaster::default();
        let a = broadcaster.show("a", NotificationKind::Info, 0);
        let b = broadcaster.show("b", NotificationKind::Info, 0);
        let c = broadcaster.show("c", NotificationKind::Info, 0);
        broadcaster.dismiss(&b);

        let ids: Vec<String> = broadcaster.active().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[tokio::test(start_paused = true)]
    async fn notification_expires_after_duration() {
        let broadcaster = NotificationBroadcaster::default();
        let id = broadcaster.show("bye", NotificationKind::Info, 100);
        assert_eq!(broadcaster.pending_timers(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(broadcaster.get(&id).is_none());
        assert!(!broadcaster.dismiss(&id));
        assert_eq!(broadcaster.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_dismiss_cancels_timer() {
        let broadcaster = NotificationBroadcaster::default();
        let id = broadcaster.show("early", NotificationKind::Info, 1_000);

        assert!(broadcaster.dismiss(&id));
        assert_eq!(broadcaster.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_outstanding_work() {
        let broadcaster = NotificationBroadcaster::default();
        let _sub = broadcaster.subscribe(|_| {});
        broadcaster.show("one", NotificationKind::Info, 1_000);
        broadcaster.show("two", NotificationKind::Info, 2_000);

        broadcaster.shutdown();

        assert_eq!(broadcaster.pending_timers(), 0);
        assert!(broadcaster.active().is_empty());
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
