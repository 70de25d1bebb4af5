//! # Navigation control module
//!
//! Drives the base toward a goal pose with a proportional controller running in its own task.
//! There is no path planning or obstacle avoidance: the robot heads straight for the goal.
//!
//! At most one navigation task runs at a time. Setting a new goal while navigating replaces the
//! goal of the running task. When the goal is reached, or the session stops, the task posts a
//! zero velocity, waits one tick and posts it again before going idle, so the stop can't be lost
//! to a command posted in between.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::tc::Tc;
use log::{debug, info, warn};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};
use util::module::State;

use crate::{cmd_mux::CommandMux, data_store::TelemetryStore, task::TaskMonitor};

pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Navigation controller. Owns the goal and the navigation task.
#[derive(Debug)]
pub struct NavCtrl {
    params: Params,

    shared: Arc<Mutex<NavShared>>,

    task_jh: Mutex<Option<JoinHandle<()>>>,
}

/// Mode and goal, behind a single lock.
#[derive(Debug, Default)]
struct NavShared {
    mode: NavMode,
    target: Option<NavTarget>,

    /// Incremented every time the goal changes
    generation: u64,
}

/// Handle for cancelling navigation from another task.
#[derive(Debug, Clone)]
pub struct NavCancel {
    shared: Arc<Mutex<NavShared>>,
}

/// Handles the navigation task needs.
#[derive(Debug, Clone)]
pub struct NavLinks {
    pub store: Arc<TelemetryStore>,
    pub mux: Arc<CommandMux>,
    pub monitor: Arc<TaskMonitor>,

    /// Control tick period
    pub period: Duration,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavMode {
    Idle,
    Navigating,
}

#[derive(Debug, thiserror::Error)]
pub enum NavCtrlError {
    #[error("Navigation goal contains a non-finite value")]
    NonFiniteTarget,

    #[error("The current pose contains a non-finite value")]
    NonFinitePose,

    #[error("Could not start the navigation task: {0}")]
    TaskSpawnError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for NavMode {
    fn default() -> Self {
        NavMode::Idle
    }
}

impl NavCtrl {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            shared: Arc::new(Mutex::new(NavShared::default())),
            task_jh: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn mode(&self) -> NavMode {
        lock(&self.shared).mode
    }

    /// Current goal, if navigating.
    pub fn target(&self) -> Option<NavTarget> {
        let shared = lock(&self.shared);
        match shared.mode {
            NavMode::Navigating => shared.target,
            NavMode::Idle => None,
        }
    }

    /// Navigate to a goal.
    ///
    /// If a goal is already being navigated to it is replaced, otherwise a navigation task is
    /// started.
    pub fn go_to(&self, target: NavTarget, links: &NavLinks) -> Result<(), NavCtrlError> {
        if !target.is_finite() {
            return Err(NavCtrlError::NonFiniteTarget);
        }

        let mut task_jh = lock(&self.task_jh);
        {
            let mut shared = lock(&self.shared);
            shared.target = Some(target);
            shared.generation += 1;

            if shared.mode == NavMode::Navigating {
                debug!("Navigation goal replaced by {:?}", target);
                return Ok(());
            }

            shared.mode = NavMode::Navigating;
        }

        // The previous task has already gone idle, so this returns promptly
        if let Some(jh) = task_jh.take() {
            jh.join().ok();
        }

        info!("Navigating to {:?}", target);

        let shared = self.shared.clone();
        let params = self.params.clone();
        let task_links = links.clone();
        match links.monitor.spawn("nav_ctrl", move || {
            nav_task(shared, params, task_links)
        }) {
            Ok(jh) => {
                *task_jh = Some(jh);
                Ok(())
            }
            Err(e) => {
                let mut shared = lock(&self.shared);
                shared.mode = NavMode::Idle;
                shared.target = None;
                Err(NavCtrlError::TaskSpawnError(e))
            }
        }
    }

    /// Stop navigating. The task posts the stop commands and exits.
    pub fn cancel(&self) {
        cancel(&self.shared);
    }

    /// Handle which cancels navigation without access to the controller.
    pub fn cancel_handle(&self) -> NavCancel {
        NavCancel {
            shared: self.shared.clone(),
        }
    }

    /// Wait for the navigation task to exit, if there is one.
    pub fn join(&self) {
        if let Some(jh) = lock(&self.task_jh).take() {
            if jh.join().is_err() {
                warn!("Navigation task panicked");
            }
        }
    }
}

impl NavCancel {
    pub fn cancel(&self) {
        cancel(&self.shared);
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn cancel(shared: &Mutex<NavShared>) {
    let mut shared = lock(shared);
    if shared.mode == NavMode::Navigating {
        info!("Navigation cancelled");
        shared.target = None;
        shared.generation += 1;
    }
}

fn nav_task(shared: Arc<Mutex<NavShared>>, params: Params, links: NavLinks) {
    let mut step = NavStep::default();
    if let Err(e) = step.init(params) {
        warn!("Could not initialise navigation: {}", e);
    }

    loop {
        let (target, generation) = {
            let shared = lock(&shared);
            (shared.target, shared.generation)
        };

        let target = match target {
            Some(t) if links.monitor.is_alive() => t,
            _ => {
                // Cancelled or the session is stopping
                post_stop(&links);
                if finish(&shared, generation) {
                    break;
                }
                continue;
            }
        };

        let input = InputData {
            pose: links.store.pose(),
            target,
        };

        match step.proc(&input) {
            Ok((NavOutput::Drive(tc), _)) => links.mux.post(tc),
            Ok((NavOutput::Arrived, report)) => {
                info!(
                    "Navigation goal reached (distance {:.4} m, heading error {:.4} rad)",
                    report.dist_m, report.heading_err_rad
                );
                post_stop(&links);
                if finish(&shared, generation) {
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!("Navigation stopped: {}", e);
                post_stop(&links);
                if finish(&shared, generation) {
                    break;
                }
                continue;
            }
        }

        thread::sleep(links.period);
    }
}

/// Post a zero velocity twice, one tick apart.
fn post_stop(links: &NavLinks) {
    links.mux.post(Tc::stop_base());
    thread::sleep(links.period);
    links.mux.post(Tc::stop_base());
}

/// Go idle unless the goal changed since `generation`. Returns `true` if the task should exit.
fn finish(shared: &Mutex<NavShared>, generation: u64) -> bool {
    let mut shared = lock(shared);
    if shared.generation == generation || shared.target.is_none() {
        shared.mode = NavMode::Idle;
        shared.target = None;
        true
    } else {
        debug!("New navigation goal set while stopping, continuing");
        false
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    match m.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tc::Channel;
    use std::{io::Write, time::Instant};

    /// Writer standing in for the control stream.
    #[derive(Debug, Clone, Default)]
    struct Wire(Arc<Mutex<Vec<u8>>>);

    impl Write for Wire {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            lock(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Wire {
        fn frames(&self) -> String {
            String::from_utf8(lock(&self.0).clone()).unwrap()
        }
    }

    fn links() -> NavLinks {
        let monitor = Arc::new(TaskMonitor::new());
        monitor.start();
        NavLinks {
            store: Arc::new(TelemetryStore::new()),
            mux: Arc::new(CommandMux::new()),
            monitor,
            period: Duration::from_millis(2),
        }
    }

    fn wait_idle(nav: &NavCtrl) {
        let start = Instant::now();
        while nav.mode() != NavMode::Idle {
            assert!(start.elapsed() < Duration::from_secs(5), "Navigation never went idle");
            thread::sleep(Duration::from_millis(1));
        }
        nav.join();
    }

    #[test]
    fn test_goal_already_reached() {
        let links = links();
        let nav = NavCtrl::new(Params::default());

        nav.go_to(NavTarget::new(0.0, 0.0, 0.0, nav.params()), &links)
            .unwrap();
        wait_idle(&nav);

        assert_eq!(links.mux.take(Channel::Base), Some(Tc::stop_base()));
        assert_eq!(nav.target(), None);
        assert_eq!(links.monitor.num_tasks(), 0);
    }

    #[test]
    fn test_stop_reaches_wire() {
        let links = links();
        let nav = NavCtrl::new(Params::default());

        let wire = Wire::default();
        let sender = {
            let mux = links.mux.clone();
            let monitor = links.monitor.clone();
            let mut wire = wire.clone();
            thread::spawn(move || mux.run(&mut wire, Duration::from_millis(1), &monitor))
        };

        nav.go_to(NavTarget::new(0.0, 0.0, 0.0, nav.params()), &links)
            .unwrap();
        wait_idle(&nav);
        assert!(links
            .mux
            .wait_drained(Duration::from_secs(1), Duration::from_millis(1)));

        links.monitor.stop();
        sender.join().unwrap().unwrap();

        let frames = wire.frames();
        let num_stops = frames.matches("/base:0;0;0^^^").count();
        assert!(num_stops >= 1 && num_stops <= 2, "{} stops sent", num_stops);
        assert_eq!(frames.matches("^^^").count(), num_stops);
    }

    #[test]
    fn test_cancel_handle() {
        let links = links();
        let nav = NavCtrl::new(Params::default());
        let handle = nav.cancel_handle();

        nav.go_to(NavTarget::new(10.0, 0.0, 0.0, nav.params()), &links)
            .unwrap();
        thread::spawn(move || handle.cancel()).join().unwrap();
        wait_idle(&nav);

        assert_eq!(links.mux.take(Channel::Base), Some(Tc::stop_base()));
        assert_eq!(nav.target(), None);
    }

    #[test]
    fn test_goal_replaced() {
        let links = links();
        let nav = NavCtrl::new(Params::default());

        nav.go_to(NavTarget::new(10.0, 0.0, 0.0, nav.params()), &links)
            .unwrap();
        assert_eq!(nav.mode(), NavMode::Navigating);

        // Replacing the goal doesn't start a second task
        nav.go_to(NavTarget::new(0.0, 0.0, 0.0, nav.params()), &links)
            .unwrap();
        assert!(links.monitor.num_tasks() <= 1);

        wait_idle(&nav);
        assert_eq!(links.mux.take(Channel::Base), Some(Tc::stop_base()));
        assert_eq!(links.monitor.num_tasks(), 0);
    }

    #[test]
    fn test_cancel() {
        let links = links();
        let nav = NavCtrl::new(Params::default());

        nav.go_to(NavTarget::new(10.0, 0.0, 0.0, nav.params()), &links)
            .unwrap();
        nav.cancel();
        wait_idle(&nav);

        assert_eq!(links.mux.take(Channel::Base), Some(Tc::stop_base()));
    }

    #[test]
    fn test_session_stop() {
        let links = links();
        let nav = NavCtrl::new(Params::default());

        nav.go_to(NavTarget::new(10.0, 0.0, 0.0, nav.params()), &links)
            .unwrap();
        links.monitor.stop();
        wait_idle(&nav);

        assert_eq!(links.mux.take(Channel::Base), Some(Tc::stop_base()));
    }

    #[test]
    fn test_non_finite_goal() {
        let links = links();
        let nav = NavCtrl::new(Params::default());

        let r = nav.go_to(NavTarget::new(f64::NAN, 0.0, 0.0, nav.params()), &links);
        assert!(matches!(r, Err(NavCtrlError::NonFiniteTarget)));
        assert_eq!(nav.mode(), NavMode::Idle);
    }
}
