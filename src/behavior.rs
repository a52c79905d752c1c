//! User Behavior State Store.
//!
//! - per-user: okno ostatnich K wiadomości (FIFO), czas ostatniego ostrzeżenia, historia wejść
//! - per-guild: wspólne okno wejść (raid)
//!
//! Stan per-user siedzi w ograniczonym cache (moka: pojemność + TTL bezczynności), więc
//! użytkownicy, którzy przestali pisać, w końcu wypadają z pamięci.
//! Każdy wpis ma własny mutex – sprawdzenie i aktualizacja okna są atomowe per user.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;

#[derive(Debug, Clone)]
pub struct UserBehaviorState {
    pub user_id: u64,
    pub recent_messages: VecDeque<String>,
    pub last_warning_at: Option<DateTime<Utc>>,
    pub join_history: VecDeque<DateTime<Utc>>,
}

impl UserBehaviorState {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            recent_messages: VecDeque::new(),
            last_warning_at: None,
            join_history: VecDeque::new(),
        }
    }

    /// Dopisz wiadomość; najstarsza wypada, gdy okno ma już `cap` wpisów.
    pub fn push_message(&mut self, text: &str, cap: usize) {
        while self.recent_messages.len() >= cap.max(1) {
            self.recent_messages.pop_front();
        }
        self.recent_messages.push_back(text.to_string());
    }

    /// Okno pełne i wszystkie wpisy identyczne (porównanie dokładne).
    pub fn window_is_uniform(&self, cap: usize) -> bool {
        if self.recent_messages.len() < cap {
            return false;
        }
        let mut it = self.recent_messages.iter();
        match it.next() {
            Some(first) => it.all(|m| m == first),
            None => false,
        }
    }

    pub fn clear_window(&mut self) {
        self.recent_messages.clear();
    }

    pub fn cooldown_elapsed(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_warning_at {
            None => true,
            Some(at) => elapsed(at, now) > cooldown,
        }
    }

    pub fn record_join(&mut self, at: DateTime<Utc>, window: Duration) {
        self.join_history.push_back(at);
        prune_older_than(&mut self.join_history, window, at);
    }
}

#[derive(Debug)]
pub struct BehaviorStore {
    users: Cache<u64, Arc<Mutex<UserBehaviorState>>>,
    guild_joins: DashMap<u64, Mutex<VecDeque<DateTime<Utc>>>>,
    window: usize,
}

impl BehaviorStore {
    pub fn new(window: usize, capacity: u64, idle_ttl: Duration) -> Self {
        Self {
            // LRU zamiast domyślnego TinyLFU: nowy użytkownik zawsze dostaje wpis
            users: Cache::builder()
                .max_capacity(capacity.max(1))
                .eviction_policy(EvictionPolicy::lru())
                .time_to_idle(idle_ttl.max(Duration::from_secs(1)))
                .build(),
            guild_joins: DashMap::new(),
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /* --------- per-user --------- */

    pub fn get_or_create(&self, user_id: u64) -> Arc<Mutex<UserBehaviorState>> {
        self.users
            .get_with(user_id, || Arc::new(Mutex::new(UserBehaviorState::new(user_id))))
    }

    /// Wykonaj `f` pod mutexem danego użytkownika.
    pub fn with_user<R>(&self, user_id: u64, f: impl FnOnce(&mut UserBehaviorState) -> R) -> R {
        let entry = self.get_or_create(user_id);
        let mut guard = lock(&entry);
        f(&mut guard)
    }

    pub fn record_message(&self, user_id: u64, text: &str) -> usize {
        let cap = self.window;
        self.with_user(user_id, |s| {
            s.push_message(text, cap);
            s.recent_messages.len()
        })
    }

    pub fn clear_window(&self, user_id: u64) {
        self.with_user(user_id, |s| s.clear_window());
    }

    pub fn record_warning(&self, user_id: u64, at: DateTime<Utc>) {
        self.with_user(user_id, |s| s.last_warning_at = Some(at));
    }

    pub fn record_member_join(&self, user_id: u64, at: DateTime<Utc>, window: Duration) {
        self.with_user(user_id, |s| s.record_join(at, window));
    }

    /// Kopia stanu (bez tworzenia wpisu).
    pub fn snapshot(&self, user_id: u64) -> Option<UserBehaviorState> {
        self.users.get(&user_id).map(|e| lock(&e).clone())
    }

    pub fn tracked_users(&self) -> u64 {
        self.users.run_pending_tasks();
        self.users.entry_count()
    }

    /* --------- per-guild (raid) --------- */

    pub fn record_join(&self, guild_id: u64, at: DateTime<Utc>) {
        let entry = self.guild_joins.entry(guild_id).or_default();
        lock(&entry).push_back(at);
    }

    /// Usuń wejścia starsze niż `window`; zwraca liczbę pozostałych.
    pub fn prune_joins(&self, guild_id: u64, now: DateTime<Utc>, window: Duration) -> usize {
        match self.guild_joins.get(&guild_id) {
            Some(entry) => {
                let mut q = lock(&entry);
                prune_older_than(&mut q, window, now);
                q.len()
            }
            None => 0,
        }
    }

    /// record_join + prune_joins pod jednym lockiem.
    pub fn record_join_and_count(&self, guild_id: u64, now: DateTime<Utc>, window: Duration) -> usize {
        let entry = self.guild_joins.entry(guild_id).or_default();
        let mut q = lock(&entry);
        q.push_back(now);
        prune_older_than(&mut q, window, now);
        q.len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // zatruty mutex = panika w innym handlerze; stan okna nadal jest spójny
    m.lock().unwrap_or_else(|p| p.into_inner())
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

fn prune_older_than(q: &mut VecDeque<DateTime<Utc>>, window: Duration, now: DateTime<Utc>) {
    while let Some(&front) = q.front() {
        if elapsed(front, now) > window {
            q.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store() -> BehaviorStore {
        BehaviorStore::new(4, 1_000, Duration::from_secs(3600))
    }

    #[test]
    fn fifo_evicts_oldest() {
        let s = store();
        for t in ["a", "b", "c", "d", "e"] {
            s.record_message(7, t);
        }
        let snap = s.snapshot(7).unwrap();
        assert_eq!(snap.recent_messages, VecDeque::from(vec![
            "b".to_string(), "c".into(), "d".into(), "e".into()
        ]));
        assert!(!snap.window_is_uniform(4));
    }

    #[test]
    fn uniform_window_requires_full_window() {
        let s = store();
        for _ in 0..3 {
            s.record_message(1, "hi");
        }
        assert!(!s.snapshot(1).unwrap().window_is_uniform(4));
        s.record_message(1, "hi");
        assert!(s.snapshot(1).unwrap().window_is_uniform(4));
        s.clear_window(1);
        assert!(s.snapshot(1).unwrap().recent_messages.is_empty());
    }

    #[test]
    fn guild_join_window_prunes() {
        let s = store();
        let t0 = Utc::now();
        let w = Duration::from_secs(60);
        s.record_join(1, t0);
        s.record_join(1, t0 + chrono::Duration::seconds(30));
        assert_eq!(s.prune_joins(1, t0 + chrono::Duration::seconds(61), w), 1);
        assert_eq!(s.prune_joins(2, t0, w), 0);
        assert_eq!(s.record_join_and_count(1, t0 + chrono::Duration::seconds(200), w), 1);
    }

    #[test]
    fn member_join_history_stays_inside_window() {
        let s = store();
        let t0 = Utc::now();
        let w = Duration::from_secs(60);
        s.record_member_join(5, t0, w);
        s.record_member_join(5, t0 + chrono::Duration::seconds(120), w);
        assert_eq!(s.snapshot(5).unwrap().join_history.len(), 1);
    }

    #[test]
    fn capacity_bounds_tracked_users() {
        let s = BehaviorStore::new(4, 10, Duration::from_secs(3600));
        for uid in 0..500u64 {
            s.record_message(uid, "x");
        }
        assert!(s.tracked_users() <= 10);
    }

    proptest! {
        #[test]
        fn window_never_exceeds_capacity(
            cap in 1usize..8,
            msgs in proptest::collection::vec("[ab]{1,2}", 0..40),
        ) {
            let mut st = UserBehaviorState::new(1);
            for m in &msgs {
                st.push_message(m, cap);
                prop_assert!(st.recent_messages.len() <= cap);
            }
        }
    }
}
