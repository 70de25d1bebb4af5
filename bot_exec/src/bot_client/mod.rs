//! # Bot Client
//!
//! A session with one robot. The client owns the control stream connection and every task
//! working on it:
//!
//! - the receiver, reassembling frames from the control stream,
//! - the decode worker, applying frames to the telemetry store and integrating odometry,
//! - the sender, draining the command multiplexer onto the control stream,
//! - one consumer per enabled camera,
//! - the navigation task while navigating.
//!
//! Telemetry recording and replay tasks are independent of the connection and run until stopped
//! or the client is dropped.
//!
//! Losing the link moves the client to `ShuttingDown` and cancels navigation. Call `disconnect` to
//! release it. The stop and fold commands are still sent on disconnect unless writing to the
//! control stream has failed.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod receiver;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::{
        arm::{ArmId, NUM_JOINTS},
        cam::{CamId, CamImage, FrameDecoder, ImageCrateDecoder},
    },
    tc::Tc,
};
use log::{debug, error, info, warn};
use nalgebra::Point3;
use std::{
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, MutexGuard,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use util::module::State;

use crate::{
    arm_ctrl::{self, ArmCmd, ArmCtrl, ArmCtrlError, ArmDemand, ArmState, IkTarget},
    cam_client::{CamClient, CamFrames},
    cmd_mux::CommandMux,
    data_store::{LidarSnapshot, TelemetryStore},
    launcher::{NoopLauncher, StackLauncher},
    loc::{OdometryIntegrator, Pose, WheelEncoders},
    nav_ctrl::{self, NavCancel, NavCtrl, NavCtrlError, NavLinks, NavMode, NavTarget},
    params::BotExecParams,
    task::TaskMonitor,
    tm_log::{self, TmLogError, TmLogger},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Poll period while waiting for the multiplexer to drain.
const DRAIN_POLL: Duration = Duration::from_millis(5);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Session with a robot.
pub struct BotClient {
    params: BotExecParams,

    launcher: Box<dyn StackLauncher>,
    decoder: Arc<dyn FrameDecoder>,

    state: Arc<Mutex<ConnectionState>>,
    link: Mutex<Option<Link>>,

    /// Set by the sender when a write to the control stream fails
    write_failed: Arc<AtomicBool>,

    store: Arc<TelemetryStore>,
    integrator: Arc<OdometryIntegrator>,
    mux: Arc<CommandMux>,
    cams: Arc<CamFrames>,

    arm_ctrl: Mutex<ArmCtrl>,
    nav_ctrl: NavCtrl,

    /// Tasks tied to the connection
    monitor: Arc<TaskMonitor>,

    /// Recording and replay tasks
    tm_monitor: Arc<TaskMonitor>,
    tm_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Resources of an open connection.
#[derive(Debug)]
struct Link {
    control: Option<TcpStream>,
    cam_streams: Vec<TcpStream>,
    tasks: Vec<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

#[derive(Debug, thiserror::Error)]
pub enum BotClientError {
    #[error("Not connected to a robot")]
    NotConnected,

    #[error("Already connected to a robot")]
    AlreadyConnected,

    #[error("The robot's onboard stack could not be started")]
    StackLaunchFailed,

    #[error("Could not resolve the robot address \"{0}\"")]
    AddressResolution(String),

    #[error("Could not connect to the robot: {0}")]
    ConnectError(std::io::Error),

    #[error("Could not configure the control stream: {0}")]
    SocketConfigError(std::io::Error),

    #[error("Could not start a task: {0}")]
    TaskSpawnError(std::io::Error),

    #[error("Arm control error: {0}")]
    ArmCtrlError(ArmCtrlError),

    #[error("Navigation error: {0}")]
    NavCtrlError(NavCtrlError),

    #[error("Telemetry log error: {0}")]
    TmLogError(TmLogError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BotClient {
    /// Create a new disconnected client.
    pub fn new(
        params: BotExecParams,
        arm_params: arm_ctrl::Params,
        nav_params: nav_ctrl::Params,
    ) -> Self {
        let tm_monitor = Arc::new(TaskMonitor::new());
        tm_monitor.start();

        Self {
            params,
            launcher: Box::new(NoopLauncher),
            decoder: Arc::new(ImageCrateDecoder),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            link: Mutex::new(None),
            write_failed: Arc::new(AtomicBool::new(false)),
            store: Arc::new(TelemetryStore::new()),
            integrator: Arc::new(OdometryIntegrator::new()),
            mux: Arc::new(CommandMux::new()),
            cams: Arc::new(CamFrames::new()),
            arm_ctrl: Mutex::new(ArmCtrl::new(arm_params)),
            nav_ctrl: NavCtrl::new(nav_params),
            monitor: Arc::new(TaskMonitor::new()),
            tm_monitor,
            tm_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Use the given launcher to bring up the robot's onboard stack.
    pub fn with_launcher(mut self, launcher: Box<dyn StackLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Use the given decoder for camera frames.
    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn params(&self) -> &BotExecParams {
        &self.params
    }

    // ---- CONNECTION ----

    /// Connect to the robot at `address`, a hostname or IP address.
    pub fn connect(&self, address: &str) -> Result<(), BotClientError> {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Disconnected {
                return Err(BotClientError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        info!("Connecting to robot at {}", address);

        match self.open_link(address) {
            Ok(link) => {
                *lock(&self.link) = Some(link);
                *lock(&self.state) = ConnectionState::Connected;
                info!("Connected to robot at {}", address);
                Ok(())
            }
            Err(e) => {
                *lock(&self.state) = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Stop the robot, fold the arms and release the connection.
    ///
    /// Does nothing if not connected. Also called when the client is dropped.
    pub fn disconnect(&self) {
        let link = {
            let mut state = lock(&self.state);
            match *state {
                ConnectionState::Disconnected | ConnectionState::Connecting => return,
                ConnectionState::Connected | ConnectionState::ShuttingDown => (),
            }
            *state = ConnectionState::ShuttingDown;
            lock(&self.link).take()
        };

        info!("Disconnecting from robot");

        // Let the navigation task post its stop while the sender is still running
        self.nav_ctrl.cancel();
        self.nav_ctrl.join();

        if self.write_failed.load(Ordering::SeqCst) {
            warn!("Control stream write failed, the robot could not be stopped");
        } else {
            self.stop_motion();
        }

        self.monitor.stop();
        if let Some(link) = link {
            link.release();
        }

        self.mux.clear();
        lock(&self.arm_ctrl).reset();

        *lock(&self.state) = ConnectionState::Disconnected;
        info!(
            "Disconnected, {} commands sent, {} tasks remain",
            self.mux.num_sent(),
            self.num_live_tasks()
        );
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Number of background tasks still running.
    pub fn num_live_tasks(&self) -> usize {
        self.monitor.num_tasks() + self.tm_monitor.num_tasks()
    }

    // ---- COMMANDS ----

    /// Set the base velocity.
    ///
    /// Units: meters/second forward and lateral, radians/second rotation
    pub fn move_base(
        &self,
        forward: f64,
        lateral: f64,
        rotation: f64,
    ) -> Result<(), BotClientError> {
        self.ensure_connected()?;
        self.mux.post(Tc::BaseMove {
            forward,
            lateral,
            rotation,
        });
        Ok(())
    }

    /// Move an arm. Joints not given in the demand keep their last commanded value.
    pub fn move_arm(
        &self,
        arm: ArmId,
        demand: ArmDemand,
    ) -> Result<arm_ctrl::StatusReport, BotClientError> {
        self.arm_cmd(arm, ArmCmd::Move(demand))
    }

    /// Set the joint velocities of an arm.
    ///
    /// Units: degrees/second
    pub fn set_arm_velocity(
        &self,
        arm: ArmId,
        vel: [f64; NUM_JOINTS],
    ) -> Result<arm_ctrl::StatusReport, BotClientError> {
        self.arm_cmd(arm, ArmCmd::Velocity(vel))
    }

    /// Fold an arm and open its gripper.
    pub fn fold_arm(&self, arm: ArmId) -> Result<(), BotClientError> {
        self.arm_cmd(arm, ArmCmd::Fold).map(|_| ())
    }

    /// Navigate the base to a pose in the odometry frame.
    ///
    /// Precision, gain and maximum speed default to the navigation parameters. If already
    /// navigating the goal is replaced.
    pub fn go_to(
        &self,
        x_m: f64,
        y_m: f64,
        heading_rad: f64,
        precision: Option<f64>,
        gain: Option<f64>,
        max_speed_ms: Option<f64>,
    ) -> Result<(), BotClientError> {
        self.ensure_connected()?;

        let mut target = NavTarget::new(x_m, y_m, heading_rad, self.nav_ctrl.params());
        if let Some(p) = precision {
            target.precision = p;
        }
        if let Some(k) = gain {
            target.gain = k;
        }
        if let Some(s) = max_speed_ms {
            target.max_speed_ms = s;
        }

        let links = NavLinks {
            store: self.store.clone(),
            mux: self.mux.clone(),
            monitor: self.monitor.clone(),
            period: self.params.cmd_period(),
        };

        self.nav_ctrl
            .go_to(target, &links)
            .map_err(BotClientError::NavCtrlError)
    }

    /// Stop navigating, if navigating.
    pub fn cancel_navigation(&self) {
        self.nav_ctrl.cancel();
    }

    pub fn nav_mode(&self) -> NavMode {
        self.nav_ctrl.mode()
    }

    /// Solve joints 2 to 4 of an arm for a planar target without moving it.
    pub fn solve_arm(&self, arm: ArmId, target: &IkTarget) -> arm_ctrl::IkSolution {
        lock(&self.arm_ctrl).solve_arm(arm, target)
    }

    /// Solve joints 1 to 4 of an arm for a 3D target without moving it. Experimental.
    pub fn solve_arm_cartesian_experimental(
        &self,
        arm: ArmId,
        target: &Point3<f64>,
        wrist_rad: f64,
    ) -> arm_ctrl::CartesianIkSolution {
        lock(&self.arm_ctrl).solve_cartesian_experimental(arm, target, wrist_rad)
    }

    /// Last commanded state of an arm.
    pub fn arm_state(&self, arm: ArmId) -> ArmState {
        lock(&self.arm_ctrl).arm_state(arm)
    }

    // ---- TELEMETRY ----

    pub fn get_pose(&self) -> Pose {
        self.store.pose()
    }

    /// Joint angles reported by an arm, in degrees.
    pub fn get_arm_pose(&self, arm: ArmId) -> Option<[f64; NUM_JOINTS]> {
        self.store.arm_pose(arm)
    }

    /// Latest lidar scan and the pose at which it was taken.
    pub fn get_lidar_scan(&self) -> Option<LidarSnapshot> {
        self.store.lidar_scan()
    }

    pub fn get_wheels(&self) -> Option<WheelEncoders> {
        self.store.wheels()
    }

    pub fn get_increment(&self) -> Option<Vec<f64>> {
        self.store.increment()
    }

    /// Sum of the absolute wheel encoder deltas integrated so far.
    pub fn get_distance_travelled(&self) -> f64 {
        self.store.distance_travelled()
    }

    pub fn get_rgb_frame(&self) -> CamImage {
        self.cams.get(CamId::Rgb)
    }

    pub fn get_depth_frame(&self) -> CamImage {
        self.cams.get(CamId::Depth)
    }

    /// Camera frame with the channels in BGR order.
    pub fn get_bgr_frame(&self, cam: CamId) -> CamImage {
        let mut img = self.cams.get(cam);
        img.data = img.to_bgr();
        img
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    // ---- RECORDING ----

    /// Start recording lidar scans and wheel samples, appending to `path` or to the default file
    /// in `dir`.
    ///
    /// Returns the path of the recording.
    pub fn start_telemetry_log(&self, path: &Path) -> Result<PathBuf, BotClientError> {
        let path = if path.is_dir() {
            path.join(tm_log::TM_LOG_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        let logger = TmLogger::create(&path).map_err(BotClientError::TmLogError)?;

        let store = self.store.clone();
        let monitor = self.tm_monitor.clone();
        let period = util::time::period_from_freq_hz(self.params.tm_log_freq_hz)
            .unwrap_or_else(|| Duration::from_millis(100));

        let jh = self
            .tm_monitor
            .spawn("tm_logger", move || {
                if let Err(e) = logger.run(&store, &monitor, period) {
                    error!("Telemetry logger stopped: {}", e);
                }
            })
            .map_err(BotClientError::TaskSpawnError)?;
        lock(&self.tm_tasks).push(jh);

        Ok(path)
    }

    /// Replay a recording into the telemetry store at the recording frequency.
    ///
    /// Only allowed while disconnected. Returns the number of records that will be replayed.
    pub fn replay(&self, path: &Path) -> Result<usize, BotClientError> {
        if self.connection_state() != ConnectionState::Disconnected {
            return Err(BotClientError::AlreadyConnected);
        }

        let records = tm_log::read_log(path).map_err(BotClientError::TmLogError)?;
        let num_records = records.len();
        info!("Replaying {} records from {:?}", num_records, path);

        let store = self.store.clone();
        let integrator = self.integrator.clone();
        let monitor = self.tm_monitor.clone();
        let period = util::time::period_from_freq_hz(self.params.tm_log_freq_hz)
            .unwrap_or_else(|| Duration::from_millis(100));

        let jh = self
            .tm_monitor
            .spawn("tm_replay", move || {
                tm_log::replay(&records, &store, &integrator, &monitor, period);
            })
            .map_err(BotClientError::TaskSpawnError)?;
        lock(&self.tm_tasks).push(jh);

        Ok(num_records)
    }

    /// Stop all recording and replay tasks.
    pub fn stop_tm_tasks(&self) {
        self.tm_monitor.stop();
        for jh in lock(&self.tm_tasks).drain(..) {
            if jh.join().is_err() {
                warn!("Telemetry task panicked");
            }
        }
        self.tm_monitor.start();
    }

    // ---- PRIVATE ----

    fn ensure_connected(&self) -> Result<(), BotClientError> {
        match self.connection_state() {
            ConnectionState::Connected => Ok(()),
            _ => Err(BotClientError::NotConnected),
        }
    }

    fn arm_cmd(&self, arm: ArmId, cmd: ArmCmd) -> Result<arm_ctrl::StatusReport, BotClientError> {
        self.ensure_connected()?;

        let (tcs, report) = lock(&self.arm_ctrl)
            .proc(&arm_ctrl::InputData { arm, cmd })
            .map_err(BotClientError::ArmCtrlError)?;

        for tc in tcs {
            self.mux.post(tc);
        }

        Ok(report)
    }

    fn open_link(&self, address: &str) -> Result<Link, BotClientError> {
        if !self
            .launcher
            .ensure_running(address, self.params.force_restart)
        {
            return Err(BotClientError::StackLaunchFailed);
        }

        let control_addr = resolve(address, self.params.control_port)?;
        let stream = TcpStream::connect_timeout(&control_addr, self.params.connect_timeout())
            .map_err(BotClientError::ConnectError)?;
        stream
            .set_read_timeout(Some(self.params.read_timeout()))
            .map_err(BotClientError::SocketConfigError)?;
        stream
            .set_nodelay(true)
            .map_err(BotClientError::SocketConfigError)?;

        self.store.reset_link();
        self.integrator.reset();
        self.mux.clear();
        self.write_failed.store(false, Ordering::SeqCst);
        self.monitor.start();

        let mut link = Link {
            control: Some(stream),
            cam_streams: Vec::new(),
            tasks: Vec::new(),
        };

        if let Err(e) = self.spawn_tasks(address, &mut link) {
            self.monitor.stop();
            link.release();
            return Err(e);
        }

        Ok(link)
    }

    fn spawn_tasks(&self, address: &str, link: &mut Link) -> Result<(), BotClientError> {
        let reader = link.clone_control()?;
        let mut writer = link.clone_control()?;

        let (frames_tx, frames_rx) = mpsc::sync_channel(self.params.frame_queue_len.max(1));

        // Receiver
        let monitor = self.monitor.clone();
        let state = self.state.clone();
        let nav_cancel = self.nav_ctrl.cancel_handle();
        link.tasks.push(
            self.monitor
                .spawn("receiver", move || {
                    receiver::run_receiver(reader, frames_tx, &monitor, || {
                        set_link_lost(&state, &nav_cancel)
                    })
                })
                .map_err(BotClientError::TaskSpawnError)?,
        );

        // Decode worker
        let monitor = self.monitor.clone();
        let store = self.store.clone();
        let integrator = self.integrator.clone();
        link.tasks.push(
            self.monitor
                .spawn("decoder", move || {
                    receiver::run_decoder(frames_rx, &store, &integrator, &monitor);
                })
                .map_err(BotClientError::TaskSpawnError)?,
        );

        // Sender
        let monitor = self.monitor.clone();
        let mux = self.mux.clone();
        let state = self.state.clone();
        let nav_cancel = self.nav_ctrl.cancel_handle();
        let write_failed = self.write_failed.clone();
        let period = self.params.cmd_period();
        link.tasks.push(
            self.monitor
                .spawn("sender", move || {
                    if let Err(e) = mux.run(&mut writer, period, &monitor) {
                        error!("Command sender stopped: {}", e);
                        write_failed.store(true, Ordering::SeqCst);
                        set_link_lost(&state, &nav_cancel);
                    }
                })
                .map_err(BotClientError::TaskSpawnError)?,
        );

        // Cameras
        let cams = [
            (CamId::Rgb, self.params.rgb_cam_enabled, self.params.rgb_video_port),
            (
                CamId::Depth,
                self.params.depth_cam_enabled,
                self.params.depth_video_port,
            ),
        ];
        for (cam, enabled, port) in cams.iter() {
            if !*enabled {
                continue;
            }

            // A camera which can't be reached is disabled, the link still comes up
            let addr = match resolve(address, *port) {
                Ok(a) => a,
                Err(e) => {
                    warn!("{:?} camera disabled: {}", cam, e);
                    continue;
                }
            };
            let client = match CamClient::connect(*cam, &addr, self.params.connect_timeout()) {
                Ok(c) => c,
                Err(e) => {
                    warn!("{:?} camera disabled: {}", cam, e);
                    continue;
                }
            };

            match client.shutdown_handle() {
                Ok(h) => link.cam_streams.push(h),
                Err(e) => {
                    warn!("{:?} camera disabled: {}", cam, e);
                    continue;
                }
            }

            let decoder = self.decoder.clone();
            let frames = self.cams.clone();
            let monitor = self.monitor.clone();
            link.tasks.push(
                self.monitor
                    .spawn(&format!("cam_{:?}", cam).to_lowercase(), move || {
                        if let Err(e) = client.run(decoder.as_ref(), &frames, &monitor) {
                            warn!("Camera consumer stopped: {}", e);
                        }
                    })
                    .map_err(BotClientError::TaskSpawnError)?,
            );
        }

        debug!("{} connection tasks started", link.tasks.len());

        Ok(())
    }

    /// Post the stop and fold commands and wait for them to be sent.
    ///
    /// Each arm is folded in turn since the multiplexer only holds one arm command at a time.
    fn stop_motion(&self) {
        let deadline = Instant::now() + self.params.shutdown_drain_timeout();

        self.mux.post(Tc::stop_base());

        for arm in ArmId::ALL.iter() {
            let fold = lock(&self.arm_ctrl).proc(&arm_ctrl::InputData {
                arm: *arm,
                cmd: ArmCmd::Fold,
            });
            match fold {
                Ok((tcs, _)) => tcs.into_iter().for_each(|tc| self.mux.post(tc)),
                Err(e) => warn!("Could not fold arm {}: {}", arm, e),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.mux.wait_drained(remaining, DRAIN_POLL) {
                warn!("Stop commands not sent before the drain timeout");
                return;
            }
        }
    }
}

impl Drop for BotClient {
    fn drop(&mut self) {
        self.disconnect();
        self.tm_monitor.stop();
        for jh in lock(&self.tm_tasks).drain(..) {
            jh.join().ok();
        }
    }
}

impl Link {
    fn clone_control(&self) -> Result<TcpStream, BotClientError> {
        match &self.control {
            Some(s) => s.try_clone().map_err(BotClientError::SocketConfigError),
            None => Err(BotClientError::NotConnected),
        }
    }

    /// Shut the streams down, unblocking the tasks, and wait for the tasks to exit.
    fn release(mut self) {
        if let Some(s) = self.control.take() {
            s.shutdown(Shutdown::Both).ok();
        }
        for s in self.cam_streams.drain(..) {
            s.shutdown(Shutdown::Both).ok();
        }
        for jh in self.tasks.drain(..) {
            if jh.join().is_err() {
                warn!("A connection task panicked");
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn resolve(address: &str, port: u16) -> Result<SocketAddr, BotClientError> {
    (address, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| BotClientError::AddressResolution(address.to_string()))
}

/// Move to `ShuttingDown` and stop navigating so no further drive commands are posted.
fn set_link_lost(state: &Mutex<ConnectionState>, nav_cancel: &NavCancel) {
    {
        let mut state = lock(state);
        if *state == ConnectionState::Connected {
            *state = ConnectionState::ShuttingDown;
        }
    }
    nav_cancel.cancel();
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    match m.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
