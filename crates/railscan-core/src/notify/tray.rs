//! ToastTray - 通知を表示する面の状態
//!
//! バスに 1 回だけ subscribe し（マウント時）、表示中のトーストを到着順に保持する。
//!
//! # ライフサイクル（トーストごと）
//! - created → displayed: 受信した瞬間に一覧へ追加
//! - displayed → dismissed: `duration` 経過（タイマー）または `dismiss()` のどちらか早い方
//! - 削除は冪等。`dismiss()` はタイマーを abort するので二重削除は起きない
//! - 表示数は `watch` チャネルで公開し、`wait_until_empty()` で「全部消えた」を待てる

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::bus::NotificationBus;
use crate::domain::{NotificationMessage, Severity, ToastId};
use crate::observer::{Subscription, lock};
use crate::ports::IdGenerator;

/// A toast currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveToast {
    pub id: ToastId,
    pub text: String,
    pub severity: Severity,
}

struct TrayState {
    toasts: Vec<ActiveToast>,
    timers: HashMap<ToastId, JoinHandle<()>>,
    /// Number of toasts on screen, republished after every change.
    shown: watch::Sender<usize>,
}

impl TrayState {
    fn new() -> Self {
        let (shown, _) = watch::channel(0);
        Self {
            toasts: Vec::new(),
            timers: HashMap::new(),
            shown,
        }
    }

    fn publish_len(&self) {
        self.shown.send_replace(self.toasts.len());
    }
}

/// The list of toasts a rendering surface shows.
pub struct ToastTray {
    state: Arc<Mutex<TrayState>>,
    subscription: Subscription,
}

impl ToastTray {
    /// Subscribe to `bus`. Expiry timers are spawned on `runtime`.
    pub fn attach(bus: &NotificationBus, ids: Arc<dyn IdGenerator>, runtime: Handle) -> Self {
        let state = Arc::new(Mutex::new(TrayState::new()));

        let subscription = bus.subscribe({
            let state = Arc::downgrade(&state);
            move |message: &NotificationMessage| {
                if let Some(state) = state.upgrade() {
                    display(&state, ids.generate_toast_id(), message, &runtime);
                }
            }
        });

        Self { state, subscription }
    }

    /// Toasts on screen, oldest first.
    pub fn active(&self) -> Vec<ActiveToast> {
        lock(&self.state).toasts.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once no toast is on screen. Returns at once if the tray is empty.
    pub async fn wait_until_empty(&self) {
        let mut shown = lock(&self.state).shown.subscribe();
        // The sender lives in `self.state`, so it outlives this borrow.
        let _ = shown.wait_for(|count| *count == 0).await;
    }

    /// Remove a toast before its timer fires. Returns false if it was already gone.
    pub fn dismiss(&self, id: ToastId) -> bool {
        let (removed, timer) = remove(&self.state, id);
        if let Some(timer) = timer {
            timer.abort();
        }
        removed
    }

    /// Unsubscribe from the bus and drop everything on screen.
    pub fn detach(&self) {
        self.subscription.unsubscribe();
        let mut state = lock(&self.state);
        state.toasts.clear();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        state.publish_len();
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_active()
    }
}

impl Drop for ToastTray {
    fn drop(&mut self) {
        self.detach();
    }
}

fn display(state: &Arc<Mutex<TrayState>>, id: ToastId, message: &NotificationMessage, runtime: &Handle) {
    let mut guard = lock(state);
    guard.toasts.push(ActiveToast {
        id,
        text: message.text.clone(),
        severity: message.severity,
    });
    guard.publish_len();

    let weak: Weak<Mutex<TrayState>> = Arc::downgrade(state);
    let duration = message.duration;
    // The timer cannot remove the toast before it is registered: it needs the lock we hold.
    let timer = runtime.spawn(async move {
        tokio::time::sleep(duration).await;
        if let Some(state) = weak.upgrade() {
            remove(&state, id);
        }
    });
    guard.timers.insert(id, timer);
}

fn remove(state: &Mutex<TrayState>, id: ToastId) -> (bool, Option<JoinHandle<()>>) {
    let mut guard = lock(state);
    let before = guard.toasts.len();
    guard.toasts.retain(|toast| toast.id != id);
    let removed = guard.toasts.len() != before;
    if removed {
        guard.publish_len();
    }
    (removed, guard.timers.remove(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{SystemClock, UlidGenerator};
    use std::time::Duration;

    fn tray(bus: &NotificationBus) -> ToastTray {
        ToastTray::attach(bus, Arc::new(UlidGenerator::new(SystemClock)), Handle::current())
    }

    /// Let spawned timer tasks observe the advanced clock.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn toast_is_displayed_on_receipt() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);

        bus.warning("Safety Alert: 2 defect(s) detected.");

        let active = tray.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, Severity::Warning);
        assert_eq!(active[0].text, "Safety Alert: 2 defect(s) detected.");
    }

    #[tokio::test(start_paused = true)]
    async fn toast_expires_after_its_duration() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);

        bus.info("short");
        settle().await;

        tokio::time::advance(Duration::from_millis(3999)).await;
        settle().await;
        assert_eq!(tray.len(), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert!(tray.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn toasts_expire_independently() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);

        bus.show_for("fast", Severity::Info, Duration::from_millis(100));
        bus.show_for("slow", Severity::Info, Duration::from_millis(1000));
        settle().await;

        tokio::time::advance(Duration::from_millis(150)).await;
        settle().await;

        let texts: Vec<String> = tray.active().into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["slow".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_is_idempotent_and_cancels_timer() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);
        bus.error("Analysis Failed: timeout");
        let id = tray.active()[0].id;

        assert!(tray.dismiss(id));
        assert!(!tray.dismiss(id));
        assert!(tray.is_empty());

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert!(tray.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_empty_resolves_when_last_toast_expires() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);
        bus.show_for("first", Severity::Info, Duration::from_millis(100));
        bus.show_for("second", Severity::Info, Duration::from_millis(300));
        let started = tokio::time::Instant::now();

        tokio::time::timeout(Duration::from_secs(1), tray.wait_until_empty())
            .await
            .expect("tray should drain");

        assert!(tray.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_empty_returns_at_once_when_nothing_is_shown() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);

        tokio::time::timeout(Duration::from_millis(1), tray.wait_until_empty())
            .await
            .expect("empty tray should not wait");
    }

    #[tokio::test(start_paused = true)]
    async fn dismissing_the_last_toast_wakes_waiters() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);
        bus.show_for("sticky", Severity::Info, Duration::from_secs(3600));
        let id = tray.active()[0].id;

        let (waited, dismissed) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(1), tray.wait_until_empty()),
            async {
                tokio::task::yield_now().await;
                tray.dismiss(id)
            }
        );

        assert!(dismissed);
        assert!(waited.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn detach_stops_receiving() {
        let bus = NotificationBus::new();
        let tray = tray(&bus);
        bus.info("before");

        tray.detach();
        let delivered = bus.info("after");

        assert_eq!(delivered, 0);
        assert!(!tray.is_attached());
        assert!(tray.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_tray_unsubscribes() {
        let bus = NotificationBus::new();
        {
            let _tray = tray(&bus);
            assert_eq!(bus.observer_count(), 1);
        }
        assert_eq!(bus.observer_count(), 0);
    }
}
