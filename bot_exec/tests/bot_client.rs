//! Connection lifecycle of `BotClient` against a robot simulated with a local TCP listener.

use std::{
    io::{Read, Write},
    net::TcpListener,
    thread,
    time::{Duration, Instant},
};

use bot_lib::{
    arm_ctrl::{self, ArmDemand},
    bot_client::{BotClient, BotClientError, ConnectionState},
    nav_ctrl::{self, NavMode},
    params::BotExecParams,
};
use comms_if::eqpt::arm::ArmId;

fn params(port: u16) -> BotExecParams {
    BotExecParams {
        control_port: port,
        rgb_cam_enabled: false,
        depth_cam_enabled: false,
        cmd_freq_hz: 200.0,
        ..Default::default()
    }
}

fn wait_for<F: Fn() -> bool>(what: &str, f: F) {
    let start = Instant::now();
    while !f() {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "Timed out waiting for {}",
            what
        );
        thread::sleep(Duration::from_millis(5));
    }
}

fn lidar_frame() -> String {
    let ranges: Vec<String> = (0..200).map(|i| format!("{}", 1.0 + i as f64 * 0.01)).collect();
    format!(".laser#{}\r\n", ranges.join(";"))
}

#[test]
fn test_connection_lifecycle() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // Simulated robot: send some telemetry then record everything received until the client
    // closes the stream
    let robot = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();

        let mut tm = String::new();
        tm.push_str(".wheels#0;0;0;0\r\n");
        tm.push_str(".manip0#168;66;-150;105;166\r\n");
        tm.push_str("not a frame\r\n");
        tm.push_str(".wheels#2;2;2;2\r\n");
        tm.push_str(&lidar_frame());
        stream.write_all(tm.as_bytes()).unwrap();

        let mut received = String::new();
        stream.read_to_string(&mut received).unwrap();
        received
    });

    let client = BotClient::new(
        params(port),
        arm_ctrl::Params::default(),
        nav_ctrl::Params::default(),
    );

    client.connect("127.0.0.1").unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert!(matches!(
        client.connect("127.0.0.1"),
        Err(BotClientError::AlreadyConnected)
    ));

    // Telemetry in
    wait_for("lidar scan", || client.get_lidar_scan().is_some());
    assert_eq!(client.get_wheels(), Some([2.0; 4]));
    assert_eq!(client.get_arm_pose(ArmId::Arm0), Some([0.0; 5]));
    assert!(client.get_pose().x_m > 0.0);

    let scan = client.get_lidar_scan().unwrap();
    assert_eq!(scan.scan.len(), 200);
    assert_eq!(scan.wheels, Some([2.0; 4]));
    assert_eq!(scan.pose, client.get_pose());

    // Commands out
    client.move_base(0.1, 0.0, 0.0).unwrap();
    client
        .move_arm(ArmId::Arm1, ArmDemand::default().with_joint(0, 10.0))
        .unwrap();
    thread::sleep(Duration::from_millis(100));

    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let received = robot.join().unwrap();

    let base_move = received.find("/base:0.1;0;0^^^").unwrap();
    let stop = received.rfind("/base:0;0;0^^^").unwrap();
    assert!(base_move < stop);
    assert!(received.contains("/arm:1;158;10;-70;195;166^^^"));
    assert!(received.contains("/grip:0;2^^^"));
    assert!(received.contains("/arm:0;168;10;-70;195;166^^^"));
    assert!(received.contains("/grip:1;2^^^"));
    assert!(received.contains("/arm:1;168;10;-70;195;166^^^"));

    // Disconnecting again does nothing
    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    wait_for("tasks to exit", || client.num_live_tasks() == 0);

    // Commands are refused once disconnected
    assert!(matches!(
        client.move_base(0.1, 0.0, 0.0),
        Err(BotClientError::NotConnected)
    ));
}

#[test]
fn test_link_lost() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let robot = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let client = BotClient::new(
        params(port),
        arm_ctrl::Params::default(),
        nav_ctrl::Params::default(),
    );
    client.connect("127.0.0.1").unwrap();
    robot.join().unwrap();

    wait_for("link lost", || {
        client.connection_state() == ConnectionState::ShuttingDown
    });
    assert!(matches!(
        client.move_base(0.1, 0.0, 0.0),
        Err(BotClientError::NotConnected)
    ));

    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.num_live_tasks(), 0);
}

#[test]
fn test_read_timeout_while_navigating() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // Silent robot: never sends telemetry but keeps reading commands
    let robot = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = String::new();
        stream.read_to_string(&mut received).unwrap();
        received
    });

    let client = BotClient::new(
        BotExecParams {
            read_timeout_s: 0.3,
            ..params(port)
        },
        arm_ctrl::Params::default(),
        nav_ctrl::Params::default(),
    );
    client.connect("127.0.0.1").unwrap();
    client.go_to(10.0, 0.0, 0.0, None, None, None).unwrap();
    assert_eq!(client.nav_mode(), NavMode::Navigating);

    wait_for("link lost", || {
        client.connection_state() == ConnectionState::ShuttingDown
    });
    wait_for("navigation to stop", || client.nav_mode() == NavMode::Idle);
    assert!(matches!(
        client.go_to(10.0, 0.0, 0.0, None, None, None),
        Err(BotClientError::NotConnected)
    ));

    client.disconnect();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.num_live_tasks(), 0);

    // The stream is still writable so the stop and fold go out after the last drive command
    let received = robot.join().unwrap();
    let last_drive = received.rfind("/base:0.2;").unwrap();
    let last_stop = received.rfind("/base:0;0;0^^^").unwrap();
    assert!(last_drive < last_stop);
    assert!(received.contains("/arm:0;168;10;-70;195;166^^^"));
    assert!(received.contains("/arm:1;168;10;-70;195;166^^^"));
}

#[test]
fn test_connect_refused() {
    // Bind then drop to get a port nothing is listening on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let client = BotClient::new(
        params(port),
        arm_ctrl::Params::default(),
        nav_ctrl::Params::default(),
    );

    assert!(matches!(
        client.connect("127.0.0.1"),
        Err(BotClientError::ConnectError(_))
    ));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}
