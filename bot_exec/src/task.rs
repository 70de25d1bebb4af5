//! # Task Monitor
//!
//! Bookkeeping for the background threads started by a connection. Every thread holds a
//! `TaskGuard` for its lifetime, so the number of live tasks is always known, and checks
//! `TaskMonitor::is_alive` to know when to stop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Liveness flag and live task counter shared by all background tasks.
#[derive(Debug, Default)]
pub struct TaskMonitor {
    alive: AtomicBool,
    num_tasks: AtomicUsize,
}

/// Held by a running task. Dropping it decrements the live task count.
#[derive(Debug)]
pub struct TaskGuard {
    monitor: Arc<TaskMonitor>,
    name: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TaskMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow tasks to run.
    pub fn start(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Signal all tasks to stop at their next check.
    pub fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Number of tasks which have not yet exited.
    pub fn num_tasks(&self) -> usize {
        self.num_tasks.load(Ordering::SeqCst)
    }

    /// Register a task, returning the guard it must hold until it exits.
    pub fn register(self: &Arc<Self>, name: &str) -> TaskGuard {
        let n = self.num_tasks.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Task {} started, {} tasks running", name, n);
        TaskGuard {
            monitor: self.clone(),
            name: name.to_string(),
        }
    }

    /// Spawn a named thread which is registered with the monitor for its whole lifetime.
    pub fn spawn<F, T>(self: &Arc<Self>, name: &str, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.register(name);
        thread::Builder::new().name(name.to_string()).spawn(move || {
            let _guard = guard;
            f()
        })
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let remaining = self.monitor.num_tasks.fetch_sub(1, Ordering::SeqCst) - 1;
        info!("Task {} exited, {} tasks remain", self.name, remaining);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_task_count() {
        let monitor = Arc::new(TaskMonitor::new());
        assert!(!monitor.is_alive());
        monitor.start();

        let (tx, rx) = mpsc::channel::<()>();
        let m = monitor.clone();
        let jh = monitor
            .spawn("test_task", move || {
                // Wait for the test to release the task
                rx.recv().ok();
                m.is_alive()
            })
            .unwrap();

        assert_eq!(monitor.num_tasks(), 1);

        monitor.stop();
        tx.send(()).unwrap();
        assert_eq!(jh.join().unwrap(), false);
        assert_eq!(monitor.num_tasks(), 0);
    }

    #[test]
    fn test_guard_without_thread() {
        let monitor = Arc::new(TaskMonitor::new());
        {
            let _a = monitor.register("a");
            let _b = monitor.register("b");
            assert_eq!(monitor.num_tasks(), 2);
        }
        assert_eq!(monitor.num_tasks(), 0);
    }
}
