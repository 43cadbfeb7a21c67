// src/cleanup.rs

//! Deferred deletion of request artifacts.
//!
//! Each request schedules exactly the paths it created. Nothing here globs
//! or sweeps directories, so concurrent requests never touch each other's files.

use chrono::{DateTime, TimeDelta, Utc};
use std::{
    fs, io,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock(Mutex::new(start))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *now = after(*now, by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// `start + d`, clamped to the latest representable instant.
fn after(start: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| start.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(u64);

#[derive(Debug)]
struct Ticket {
    id: TicketId,
    due: DateTime<Utc>,
    paths: Vec<PathBuf>,
}

/// Expiry queue of artifact paths.
pub struct CleanupQueue<C: Clock = SystemClock> {
    clock: C,
    tickets: Mutex<Vec<Ticket>>,
    next_id: AtomicU64,
}

impl CleanupQueue<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for CleanupQueue<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> CleanupQueue<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            tickets: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Delete `paths` once `delay` has passed.
    pub fn schedule(&self, paths: Vec<PathBuf>, delay: Duration) -> TicketId {
        let id = TicketId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let due = after(self.clock.now(), delay);
        info!(files = paths.len(), %due, "scheduled artifact cleanup");
        self.lock().push(Ticket { id, due, paths });
        id
    }

    /// Drop a ticket without deleting anything. Returns false if it already ran.
    pub fn cancel(&self, id: TicketId) -> bool {
        let mut tickets = self.lock();
        let before = tickets.len();
        tickets.retain(|t| t.id != id);
        tickets.len() != before
    }

    /// Delete every path whose deadline has passed; returns the paths removed.
    /// Files that are already gone count as removed.
    pub fn run_due(&self) -> Vec<PathBuf> {
        let now = self.clock.now();
        let due: Vec<Ticket> = {
            let mut tickets = self.lock();
            let (due, keep) = tickets.drain(..).partition(|t| t.due <= now);
            *tickets = keep;
            due
        };

        let mut removed = Vec::new();
        for path in due.into_iter().flat_map(|t| t.paths) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "deleted file");
                    removed.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => removed.push(path),
                Err(e) => warn!(path = %path.display(), error = %e, "could not delete file"),
            }
        }
        removed
    }

    /// Number of paths still waiting.
    pub fn pending(&self) -> usize {
        self.lock().iter().map(|t| t.paths.len()).sum()
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock().iter().map(|t| t.due).min()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Ticket>> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run the queue on a tokio interval until nothing is pending.
pub fn spawn_cleanup_loop<C>(queue: Arc<CleanupQueue<C>>, tick: Duration) -> JoinHandle<()>
where
    C: Clock + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            queue.run_due();
            if queue.pending() == 0 {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &PathBuf) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn deletes_only_scheduled_paths_after_delay() {
        let tmp = tempdir().unwrap();
        let ours = tmp.path().join("0101_export.csv");
        let theirs = tmp.path().join("0101_import.csv");
        touch(&ours);
        touch(&theirs);

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = CleanupQueue::with_clock(clock.clone());
        queue.schedule(vec![ours.clone()], Duration::from_secs(10));

        clock.advance(Duration::from_secs(9));
        assert!(queue.run_due().is_empty());
        assert!(ours.exists());

        clock.advance(Duration::from_secs(1));
        assert_eq!(queue.run_due(), vec![ours.clone()]);
        assert!(!ours.exists());
        assert!(theirs.exists());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn cancelled_tickets_never_delete() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("combined_countrywise_trade.csv");
        touch(&path);

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = CleanupQueue::with_clock(clock.clone());
        let id = queue.schedule(vec![path.clone()], Duration::from_secs(10));
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));

        clock.advance(Duration::from_secs(60));
        assert!(queue.run_due().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn tickets_expire_independently() {
        let tmp = tempdir().unwrap();
        let early = tmp.path().join("a.csv");
        let late = tmp.path().join("b.csv");
        touch(&early);
        touch(&late);

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = CleanupQueue::with_clock(clock.clone());
        queue.schedule(vec![late.clone()], Duration::from_secs(30));
        queue.schedule(vec![early.clone(), tmp.path().join("gone.csv")], Duration::from_secs(5));
        assert_eq!(queue.pending(), 3);

        clock.advance(Duration::from_secs(5));
        let removed = queue.run_due();
        assert_eq!(removed.len(), 2);
        assert!(late.exists());
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.next_due(), Some(clock.now() + TimeDelta::seconds(25)));
    }

    #[test]
    fn huge_delay_never_comes_due() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("0101_import.csv");
        touch(&path);

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let queue = CleanupQueue::with_clock(clock.clone());
        queue.schedule(vec![path.clone()], Duration::MAX);
        queue.schedule(vec![path.clone()], Duration::from_secs(u64::MAX / 2));
        assert_eq!(queue.next_due(), Some(DateTime::<Utc>::MAX_UTC));

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert!(queue.run_due().is_empty());
        assert!(path.exists());
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test]
    async fn loop_drains_queue_then_stops() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("0102_import.csv");
        touch(&path);

        let queue = Arc::new(CleanupQueue::new());
        queue.schedule(vec![path.clone()], Duration::from_millis(20));
        spawn_cleanup_loop(queue.clone(), Duration::from_millis(5))
            .await
            .unwrap();
        assert!(!path.exists());
        assert_eq!(queue.pending(), 0);
    }
}
