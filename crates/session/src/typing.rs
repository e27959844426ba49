//! Typing presence: local debounce and remote roster.
//!
//! The local side is a per-room state machine (`Idle → Typing → Idle`)
//! driven by keystrokes. Each room has at most one owner timer task;
//! re-arming aborts the previous task while holding the state lock, so a
//! stale timer can never fire after a newer keystroke.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::trace;

use partyline_core::{ClientEvent, TypingSignal, TYPING_IDLE_MS};

/// Default staleness bound for remote typists, a safety net for lost stop
/// signals. The relayed `is_typing: false` signal is the primary removal
/// path.
pub const DEFAULT_ROSTER_STALE: Duration = Duration::from_millis(TYPING_IDLE_MS * 5);

/// Emits typing-start/stop signals for the local user.
pub struct TypingTracker {
    out: mpsc::Sender<ClientEvent>,
    idle_after: Duration,
    timers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TypingTracker {
    pub fn new(out: mpsc::Sender<ClientEvent>) -> Self {
        Self::with_idle_after(out, Duration::from_millis(TYPING_IDLE_MS))
    }

    /// Custom idle window; timing tests shrink it.
    pub fn with_idle_after(out: mpsc::Sender<ClientEvent>, idle_after: Duration) -> Self {
        Self {
            out,
            idle_after,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record keystroke activity in a room.
    ///
    /// The first keystroke while idle emits a typing-start signal; every
    /// keystroke re-arms the idle timer that will emit typing-stop.
    pub async fn keystroke(&self, chat_id: &str) {
        let mut timers = self.timers.lock().await;

        let was_typing = match timers.remove(chat_id) {
            Some(previous) => {
                previous.abort();
                true
            }
            None => false,
        };

        if !was_typing {
            trace!(chat_id, "typing started");
            let _ = self
                .out
                .send(ClientEvent::Typing {
                    chat_id: chat_id.to_string(),
                    is_typing: true,
                })
                .await;
        }

        let out = self.out.clone();
        let shared = self.timers.clone();
        let idle_after = self.idle_after;
        let room = chat_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(idle_after).await;
            // Only the current owner of the slot may emit the stop signal.
            let mut timers = shared.lock().await;
            if timers.remove(&room).is_some() {
                trace!(chat_id = %room, "typing idled out");
                let _ = out
                    .send(ClientEvent::Typing {
                        chat_id: room,
                        is_typing: false,
                    })
                    .await;
            }
        });
        timers.insert(chat_id.to_string(), timer);
    }

    /// Force the transition back to idle, canceling any pending timer.
    /// Called on message send and on explicit stop.
    pub async fn stop(&self, chat_id: &str) {
        let mut timers = self.timers.lock().await;
        if let Some(timer) = timers.remove(chat_id) {
            timer.abort();
            trace!(chat_id, "typing stopped");
            let _ = self
                .out
                .send(ClientEvent::Typing {
                    chat_id: chat_id.to_string(),
                    is_typing: false,
                })
                .await;
        }
    }

    /// Whether the local user currently counts as typing in a room.
    pub async fn is_typing(&self, chat_id: &str) -> bool {
        self.timers.lock().await.contains_key(chat_id)
    }
}

/// Remote typists per room, as observed from relayed typing signals.
///
/// One `TypingSignal` per user id, never a single value: several members
/// can type concurrently and a fresh start replaces the previous signal.
/// Signals also expire after a staleness window in case a stop signal was
/// lost in transit.
#[derive(Debug)]
pub struct TypingRoster {
    ttl: chrono::Duration,
    rooms: HashMap<String, HashMap<String, TypingSignal>>,
}

impl TypingRoster {
    pub fn new() -> Self {
        Self::with_stale_after(DEFAULT_ROSTER_STALE)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        let ttl = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        Self {
            ttl,
            rooms: HashMap::new(),
        }
    }

    /// Apply a relayed typing signal. A start inserts or refreshes the
    /// user's signal; a stop removes it.
    pub fn apply(&mut self, chat_id: &str, user_id: &str, is_typing: bool) {
        if is_typing {
            self.rooms.entry(chat_id.to_string()).or_default().insert(
                user_id.to_string(),
                TypingSignal::expiring_in(chat_id, user_id, self.ttl),
            );
        } else if let Some(room) = self.rooms.get_mut(chat_id) {
            room.remove(user_id);
        }
    }

    /// Users currently typing in a room, pruning expired signals.
    pub fn typists(&mut self, chat_id: &str) -> Vec<String> {
        match self.rooms.get_mut(chat_id) {
            Some(room) => {
                room.retain(|_, signal| !signal.is_expired());
                let mut users: Vec<String> = room.keys().cloned().collect();
                users.sort();
                users
            }
            None => Vec::new(),
        }
    }
}

impl Default for TypingRoster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    async fn recv_typing(rx: &mut mpsc::Receiver<ClientEvent>) -> (String, bool) {
        match timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Some(ClientEvent::Typing { chat_id, is_typing })) => (chat_id, is_typing),
            other => panic!("expected typing event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn first_keystroke_starts_idle_timer_emits_stop() {
        let (tx, mut rx) = mpsc::channel(8);
        let tracker = TypingTracker::with_idle_after(tx, Duration::from_millis(30));

        tracker.keystroke("r1").await;
        assert_eq!(recv_typing(&mut rx).await, ("r1".to_string(), true));
        assert!(tracker.is_typing("r1").await);

        // No further keystrokes: the timer fires and emits the stop.
        assert_eq!(recv_typing(&mut rx).await, ("r1".to_string(), false));
        assert!(!tracker.is_typing("r1").await);
    }

    #[tokio::test]
    async fn keystrokes_rearm_the_timer_without_restarting() {
        let (tx, mut rx) = mpsc::channel(8);
        let tracker = TypingTracker::with_idle_after(tx, Duration::from_millis(50));

        tracker.keystroke("r1").await;
        assert_eq!(recv_typing(&mut rx).await, ("r1".to_string(), true));

        for _ in 0..3 {
            sleep(Duration::from_millis(20)).await;
            tracker.keystroke("r1").await;
        }

        // Still typing: the re-armed timer has not fired and no second
        // start signal was emitted.
        assert!(tracker.is_typing("r1").await);
        assert_eq!(recv_typing(&mut rx).await, ("r1".to_string(), false));
    }

    #[tokio::test]
    async fn send_forces_immediate_stop() {
        let (tx, mut rx) = mpsc::channel(8);
        let tracker = TypingTracker::with_idle_after(tx, Duration::from_secs(60));

        tracker.keystroke("r1").await;
        assert_eq!(recv_typing(&mut rx).await, ("r1".to_string(), true));

        tracker.stop("r1").await;
        assert_eq!(recv_typing(&mut rx).await, ("r1".to_string(), false));
        assert!(!tracker.is_typing("r1").await);

        // Stopping while idle emits nothing.
        tracker.stop("r1").await;
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn rooms_have_independent_typing_state() {
        let (tx, mut rx) = mpsc::channel(8);
        let tracker = TypingTracker::with_idle_after(tx, Duration::from_secs(60));

        tracker.keystroke("r1").await;
        tracker.keystroke("r2").await;
        assert_eq!(recv_typing(&mut rx).await, ("r1".to_string(), true));
        assert_eq!(recv_typing(&mut rx).await, ("r2".to_string(), true));

        tracker.stop("r1").await;
        assert!(!tracker.is_typing("r1").await);
        assert!(tracker.is_typing("r2").await);
    }

    #[test]
    fn roster_tracks_concurrent_typists_as_a_set() {
        let mut roster = TypingRoster::new();
        roster.apply("r1", "alice", true);
        roster.apply("r1", "bob", true);
        roster.apply("r1", "alice", true); // refresh, not duplicate

        assert_eq!(roster.typists("r1"), vec!["alice", "bob"]);

        roster.apply("r1", "alice", false);
        assert_eq!(roster.typists("r1"), vec!["bob"]);
        assert!(roster.typists("r2").is_empty());
    }

    #[test]
    fn roster_prunes_stale_entries() {
        let mut roster = TypingRoster::with_stale_after(Duration::from_millis(0));
        roster.apply("r1", "alice", true);
        std::thread::sleep(Duration::from_millis(5));
        assert!(roster.typists("r1").is_empty());
    }

    #[test]
    fn restart_extends_a_typists_deadline() {
        let mut roster = TypingRoster::with_stale_after(Duration::from_millis(40));
        roster.apply("r1", "alice", true);
        std::thread::sleep(Duration::from_millis(25));

        // Refreshed before expiry: the signal outlives the original window.
        roster.apply("r1", "alice", true);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(roster.typists("r1"), vec!["alice"]);
    }
}
