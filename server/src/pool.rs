//! Dynamic worker thread pool.
//!
//! The pool keeps between `low_watermark` and `high_watermark` threads
//! alive. A submission spawns a thread only when nobody is idle and
//! the ceiling has room; an idle thread that outlives `idle_timeout`
//! exits unless that would drop the pool below the floor, in which
//! case it parks until work arrives. Stopping is cooperative: queued
//! tasks still run, in-flight tasks complete, then the threads exit.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Pool lifecycle.
///
/// `Running` admits tasks; `Stopping` drains the queue and retires
/// threads; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Stopping,
    Stopped,
}

/// Queue and counters, guarded by the pool mutex.
struct PoolState {
    queue: VecDeque<Task>,
    /// Threads currently executing a task.
    active: usize,
    /// Threads parked on the non-empty condition.
    idle: usize,
    state: State,
}

struct Shared {
    state: Mutex<PoolState>,
    /// Signaled on submission and on stop.
    not_empty: Condvar,
    /// Signaled by the last exiting worker during shutdown.
    all_exited: Condvar,
    low_watermark: usize,
    high_watermark: usize,
    max_queue: usize,
    idle_timeout: Duration,
    next_worker_id: AtomicUsize,
}

/// A dynamic thread pool with watermark-bounded sizing.
///
/// # Example
///
/// ```
/// use kiln_server::pool::ThreadPool;
/// use std::time::Duration;
///
/// let pool = ThreadPool::new(1, 4, 64, Duration::from_secs(30));
/// assert!(pool.submit(|| println!("hello from the pool")));
/// pool.stop(true);
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
}

impl ThreadPool {
    /// Create a pool and spawn the `low_watermark` resident threads.
    ///
    /// # Panics
    ///
    /// Panics if `high_watermark` is zero or below `low_watermark`.
    pub fn new(
        low_watermark: usize,
        high_watermark: usize,
        max_queue: usize,
        idle_timeout: Duration,
    ) -> Self {
        assert!(high_watermark >= 1, "pool needs at least one thread");
        assert!(
            high_watermark >= low_watermark,
            "high watermark below low watermark"
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                active: 0,
                idle: 0,
                state: State::Running,
            }),
            not_empty: Condvar::new(),
            all_exited: Condvar::new(),
            low_watermark,
            high_watermark,
            max_queue,
            idle_timeout,
            next_worker_id: AtomicUsize::new(0),
        });

        {
            let mut st = shared.state.lock();
            for _ in 0..low_watermark {
                spawn_worker(&shared, &mut st);
            }
        }

        Self { shared }
    }

    /// Enqueue a task for execution.
    ///
    /// Returns `false` without running the task when the pool is not
    /// running or the queue is saturated; the task is dropped in that
    /// case.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut st = self.shared.state.lock();
        if st.state != State::Running || st.queue.len() >= self.shared.max_queue {
            return false;
        }

        st.queue.push_back(Box::new(task));
        if st.idle == 0 && st.active + st.idle < self.shared.high_watermark {
            spawn_worker(&self.shared, &mut st);
        }
        self.shared.not_empty.notify_one();
        true
    }

    /// Stop the pool.
    ///
    /// No further tasks are admitted; queued and in-flight tasks run
    /// to completion. With `wait` set, blocks until every worker has
    /// exited. Safe to call repeatedly.
    pub fn stop(&self, wait: bool) {
        let mut st = self.shared.state.lock();
        if st.state == State::Stopped {
            return;
        }
        st.state = State::Stopping;
        self.shared.not_empty.notify_all();

        if wait {
            while st.active + st.idle > 0 {
                self.shared.all_exited.wait(&mut st);
            }
        }
        if st.active + st.idle == 0 {
            st.state = State::Stopped;
        }
    }

    /// Live worker threads (idle plus executing).
    pub fn worker_count(&self) -> usize {
        let st = self.shared.state.lock();
        st.active + st.idle
    }

    /// Tasks waiting for a thread.
    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop(true);
    }
}

/// Spawn a worker registered as idle. Callers hold the pool lock.
fn spawn_worker(shared: &Arc<Shared>, st: &mut PoolState) {
    let id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
    st.idle += 1;
    let shared = shared.clone();
    thread::Builder::new()
        .name(format!("pool-worker-{}", id))
        .spawn(move || worker_loop(shared))
        .expect("failed to spawn pool worker thread");
}

fn worker_loop(shared: Arc<Shared>) {
    let mut st = shared.state.lock();
    loop {
        while st.queue.is_empty() && st.state == State::Running {
            let timed_out = shared
                .not_empty
                .wait_for(&mut st, shared.idle_timeout)
                .timed_out();
            if timed_out && st.queue.is_empty() && st.state == State::Running {
                if st.active + st.idle <= shared.low_watermark {
                    // At the floor: park until work or shutdown.
                    shared.not_empty.wait(&mut st);
                } else {
                    // Surplus thread, retire.
                    st.idle -= 1;
                    debug!("surplus pool worker retiring after idle timeout");
                    return;
                }
            }
        }

        let Some(task) = st.queue.pop_front() else {
            // Stopping with a drained queue: exit, and let the last
            // worker out signal the stop waiter.
            st.idle -= 1;
            if st.state == State::Stopping && st.active + st.idle == 0 {
                st.state = State::Stopped;
                shared.all_exited.notify_all();
            }
            return;
        };

        st.idle -= 1;
        st.active += 1;
        drop(st);

        // Tasks contain their own error handling; a panic is contained
        // here so the worker survives.
        if std::panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("pool task panicked");
        }

        st = shared.state.lock();
        st.active -= 1;
        st.idle += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    /// A task that spins until released, to hold workers busy.
    fn gated_task(ran: Arc<AtomicUsize>, release: Arc<AtomicBool>) -> impl FnOnce() + Send {
        move || {
            while !release.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            ran.fetch_add(1, Ordering::AcqRel);
        }
    }

    #[test]
    fn executes_submitted_tasks() {
        let pool = ThreadPool::new(1, 4, 64, Duration::from_secs(30));
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let ran = ran.clone();
            assert!(pool.submit(move || {
                ran.fetch_add(1, Ordering::AcqRel);
            }));
        }
        assert!(wait_until(Duration::from_secs(2), || {
            ran.load(Ordering::Acquire) == 16
        }));
        pool.stop(true);
    }

    #[test]
    fn submit_rejects_when_queue_saturated() {
        let pool = ThreadPool::new(1, 1, 1, Duration::from_secs(30));
        let ran = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(AtomicBool::new(false));

        // Occupies the single worker.
        assert!(pool.submit(gated_task(ran.clone(), release.clone())));
        assert!(wait_until(Duration::from_secs(2), || pool.queue_len() == 0));
        // Fills the queue.
        assert!(pool.submit(gated_task(ran.clone(), release.clone())));
        // Queue is saturated now.
        assert!(!pool.submit(|| {}));

        release.store(true, Ordering::Release);
        assert!(wait_until(Duration::from_secs(2), || {
            ran.load(Ordering::Acquire) == 2
        }));
        pool.stop(true);
    }

    #[test]
    fn submit_rejects_after_stop() {
        let pool = ThreadPool::new(1, 2, 8, Duration::from_secs(30));
        pool.stop(true);
        assert!(!pool.submit(|| {}));
    }

    #[test]
    fn stop_drains_queue_and_joins_workers() {
        let pool = ThreadPool::new(2, 4, 64, Duration::from_secs(30));
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let ran = ran.clone();
            assert!(pool.submit(move || {
                thread::sleep(Duration::from_millis(2));
                ran.fetch_add(1, Ordering::AcqRel);
            }));
        }
        pool.stop(true);
        assert_eq!(ran.load(Ordering::Acquire), 32);
        assert_eq!(pool.queue_len(), 0);
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn thread_count_stays_within_watermarks() {
        let pool = ThreadPool::new(1, 3, 64, Duration::from_secs(30));
        let ran = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(AtomicBool::new(false));

        for _ in 0..12 {
            assert!(pool.submit(gated_task(ran.clone(), release.clone())));
        }
        thread::sleep(Duration::from_millis(50));
        let count = pool.worker_count();
        assert!(count >= 1 && count <= 3, "worker count {} out of bounds", count);

        release.store(true, Ordering::Release);
        assert!(wait_until(Duration::from_secs(2), || {
            ran.load(Ordering::Acquire) == 12
        }));
        pool.stop(true);
    }

    #[test]
    fn surplus_workers_retire_to_the_floor() {
        let pool = ThreadPool::new(1, 4, 64, Duration::from_millis(50));
        let ran = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(AtomicBool::new(false));

        for _ in 0..4 {
            assert!(pool.submit(gated_task(ran.clone(), release.clone())));
            // Let the task reach a worker so the next submission sees
            // nobody idle and grows the pool.
            assert!(wait_until(Duration::from_secs(2), || pool.queue_len() == 0));
        }
        assert_eq!(pool.worker_count(), 4);

        release.store(true, Ordering::Release);
        assert!(wait_until(Duration::from_secs(2), || {
            ran.load(Ordering::Acquire) == 4
        }));
        // Idle timeout passes; the pool shrinks back to the floor.
        assert!(wait_until(Duration::from_secs(2), || pool.worker_count() == 1));
        pool.stop(true);
    }

    #[test]
    fn worker_survives_a_panicking_task() {
        let pool = ThreadPool::new(1, 1, 8, Duration::from_secs(30));
        assert!(pool.submit(|| panic!("task failure")));
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = ran.clone();
            assert!(pool.submit(move || ran.store(true, Ordering::Release)));
        }
        assert!(wait_until(Duration::from_secs(2), || {
            ran.load(Ordering::Acquire)
        }));
        pool.stop(true);
    }

    #[test]
    fn stop_is_idempotent() {
        let pool = ThreadPool::new(1, 2, 8, Duration::from_secs(30));
        pool.stop(true);
        pool.stop(true);
        pool.stop(false);
        assert_eq!(pool.worker_count(), 0);
        // Drop runs stop once more.
    }
}
