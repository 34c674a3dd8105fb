//! Keyed debouncer: "latest submission wins".
//!
//! Each `submit` replaces whatever is pending for its key. The replaced
//! submission's `on_superseded` runs immediately on the caller's thread; the
//! survivor's `run` fires on a timer thread once the key has been quiet for
//! the configured delay.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Pending {
    ticket: u64,
    on_superseded: Callback,
}

pub struct Debouncer<K> {
    name: &'static str,
    delay: Duration,
    pending: Arc<Mutex<HashMap<K, Pending>>>,
    next_ticket: AtomicU64,
}

fn lock<K>(m: &Mutex<HashMap<K, Pending>>) -> MutexGuard<'_, HashMap<K, Pending>> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns the ticket assigned to this submission.
    pub fn submit<R, S>(&self, key: K, run: R, on_superseded: S) -> u64
    where
        R: FnOnce() + Send + 'static,
        S: FnOnce() + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let replaced = lock(&self.pending).insert(
            key.clone(),
            Pending {
                ticket,
                on_superseded: Box::new(on_superseded),
            },
        );
        if let Some(prev) = replaced {
            tracing::debug!(debouncer = self.name, key = ?key, ticket = prev.ticket, "superseded");
            (prev.on_superseded)();
        }

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        let name = self.name;
        thread::spawn(move || {
            thread::sleep(delay);
            let fire = {
                let mut map = lock(&pending);
                match map.get(&key) {
                    Some(p) if p.ticket == ticket => {
                        map.remove(&key);
                        true
                    }
                    _ => false,
                }
            };
            if fire {
                tracing::debug!(debouncer = name, key = ?key, ticket, "fired");
                run();
            }
        });
        ticket
    }

    /// Drops every pending submission, notifying each as superseded.
    pub fn cancel_all(&self) {
        let drained: Vec<Pending> = lock(&self.pending).drain().map(|(_, p)| p).collect();
        for p in drained {
            (p.on_superseded)();
        }
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn only_latest_submission_for_a_key_runs() {
        let d: Debouncer<&'static str> = Debouncer::new("test", Duration::from_millis(80));
        let (tx, rx) = mpsc::channel::<String>();

        for i in 0..3 {
            let ran = tx.clone();
            let dropped = tx.clone();
            d.submit(
                "classroom-check",
                move || ran.send(format!("ran {}", i)).expect("send"),
                move || dropped.send(format!("superseded {}", i)).expect("send"),
            );
        }

        let mut got: Vec<String> = Vec::new();
        for _ in 0..3 {
            got.push(rx.recv_timeout(Duration::from_secs(2)).expect("event"));
        }
        assert_eq!(got, vec!["superseded 0", "superseded 1", "ran 2"]);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn different_keys_do_not_interfere() {
        let d: Debouncer<u32> = Debouncer::new("test", Duration::from_millis(30));
        let (tx, rx) = mpsc::channel::<u32>();
        for key in [1u32, 2] {
            let tx = tx.clone();
            d.submit(key, move || tx.send(key).expect("send"), || {});
        }
        let mut got = vec![
            rx.recv_timeout(Duration::from_secs(2)).expect("first"),
            rx.recv_timeout(Duration::from_secs(2)).expect("second"),
        ];
        got.sort();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn cancel_all_notifies_pending() {
        let d: Debouncer<u32> = Debouncer::new("test", Duration::from_secs(5));
        let (tx, rx) = mpsc::channel::<&'static str>();
        let t2 = tx.clone();
        d.submit(7, move || tx.send("ran").expect("send"), move || t2.send("cancelled").expect("send"));
        d.cancel_all();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).expect("event"), "cancelled");
        assert_eq!(d.pending_len(), 0);
    }
}
