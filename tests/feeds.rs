//! End-to-end feed tests against a fake IPC server and real UDP datagrams.

use gazefeed::network::EYE_ADDRESS;
use gazefeed::osc;
use gazefeed::protocol::{
    self, CommandType, EyeSample, GazeFrame, HandshakeResult, GAZE_REQUEST_SIZE,
    HANDSHAKE_REQUEST_SIZE, IPC_VERSION,
};
use gazefeed::{
    create_device_ipc_tracker, create_osc_tracker, DeviceConfig, DeviceIpcTracker, EyeTracker,
    FeedIdentity, GazeError, GazeObserver, GazeVector, NullObserver, OscConfig, OscTracker,
};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn assert_close(a: GazeVector, b: GazeVector) {
    assert!(
        (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5 && (a.z - b.z).abs() < 1e-5,
        "{} != {}",
        a,
        b
    );
}

#[derive(Default)]
struct CountingObserver {
    unavailable: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    accepted: AtomicUsize,
}

impl GazeObserver for CountingObserver {
    fn feed_unavailable(&self, _feed: FeedIdentity, _error: &GazeError) {
        self.unavailable.fetch_add(1, Ordering::SeqCst);
    }
    fn worker_started(&self, _feed: FeedIdentity) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn worker_stopped(&self, _feed: FeedIdentity) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
    fn sample_accepted(&self, _feed: FeedIdentity, _gaze: GazeVector) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }
}

// -- Fake PSVR2 Toolkit IPC server --

enum GazeReplies {
    /// Answer every gaze request with this frame.
    Frame(GazeFrame),
    /// Read requests but never answer them.
    Silent,
    /// Close the connection right after the handshake.
    Hangup,
    /// Answer the first request in two parts with `pause` between them,
    /// counting request bytes that arrive meanwhile; then answer normally.
    Split {
        frame: GazeFrame,
        at: usize,
        pause: Duration,
        early_bytes: Arc<AtomicUsize>,
    },
}

struct FakeServer {
    addr: SocketAddr,
    thread: JoinHandle<()>,
}

fn spawn_server(handshake_reply: [u8; 9], replies: GazeReplies) -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let thread = std::thread::spawn(move || {
        let (mut peer, _) = listener.accept().unwrap();
        serve(&mut peer, handshake_reply, replies);
    });
    FakeServer { addr, thread }
}

fn serve(peer: &mut TcpStream, handshake_reply: [u8; 9], replies: GazeReplies) {
    let mut request = [0u8; HANDSHAKE_REQUEST_SIZE];
    if peer.read_exact(&mut request).is_err() {
        return;
    }
    assert_eq!(&request[..2], &[CommandType::ClientRequestHandshake as u8, 0]);
    assert_eq!(u16::from_le_bytes([request[6], request[7]]), IPC_VERSION);
    assert_eq!(
        u32::from_le_bytes([request[8], request[9], request[10], request[11]]),
        std::process::id()
    );
    if peer.write_all(&handshake_reply).is_err() {
        return;
    }

    match replies {
        GazeReplies::Frame(frame) => serve_frames(peer, &protocol::build_gaze_response(&frame)),
        GazeReplies::Silent => {
            let _ = std::io::copy(peer, &mut std::io::sink());
        }
        GazeReplies::Hangup => {}
        GazeReplies::Split {
            frame,
            at,
            pause,
            early_bytes,
        } => {
            let response = protocol::build_gaze_response(&frame);
            let mut request = [0u8; GAZE_REQUEST_SIZE];
            if peer.read_exact(&mut request).is_err() {
                return;
            }
            peer.write_all(&response[..at]).unwrap();

            peer.set_read_timeout(Some(pause)).unwrap();
            let mut scratch = [0u8; 64];
            let deadline = Instant::now() + pause;
            while Instant::now() < deadline {
                match peer.read(&mut scratch) {
                    Ok(0) => return,
                    Ok(n) => {
                        early_bytes.fetch_add(n, Ordering::SeqCst);
                    }
                    Err(_) => {}
                }
            }
            peer.set_read_timeout(None).unwrap();
            peer.write_all(&response[at..]).unwrap();
            serve_frames(peer, &response);
        }
    }
}

fn serve_frames(peer: &mut TcpStream, response: &[u8]) {
    let mut request = [0u8; GAZE_REQUEST_SIZE];
    while peer.read_exact(&mut request).is_ok() {
        assert_eq!(request, protocol::build_gaze_request());
        if peer.write_all(response).is_err() {
            break;
        }
    }
}

fn success_reply() -> [u8; 9] {
    protocol::build_handshake_response(
        CommandType::ServerHandshakeResult,
        HandshakeResult::Success,
        IPC_VERSION,
    )
}

fn device_config(addr: SocketAddr) -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.server_addr = addr;
    config.connect_attempts = 3;
    config.connect_retry_delay = Duration::from_millis(20);
    config.handshake_attempts = 20;
    config
}

fn frame(left: [f32; 3], left_valid: bool, right: [f32; 3], right_valid: bool) -> GazeFrame {
    GazeFrame {
        left: EyeSample::with_direction(left.into(), left_valid),
        right: EyeSample::with_direction(right.into(), right_valid),
    }
}

#[test]
fn device_handshake_success() {
    init_logging();
    let server = spawn_server(success_reply(), GazeReplies::Silent);
    let tracker = DeviceIpcTracker::connect(device_config(server.addr), Arc::new(NullObserver)).unwrap();
    assert_eq!(tracker.server_version(), IPC_VERSION);
    assert_eq!(tracker.feed(), FeedIdentity::DeviceIpc);
    assert!(!tracker.is_gaze_available(Instant::now()));
    drop(tracker);
    server.thread.join().unwrap();
}

#[test]
fn device_handshake_rejected_result_code() {
    init_logging();
    let reply = protocol::build_handshake_response(
        CommandType::ServerHandshakeResult,
        HandshakeResult::InvalidVersion,
        IPC_VERSION + 1,
    );
    let server = spawn_server(reply, GazeReplies::Silent);
    let result = DeviceIpcTracker::connect(device_config(server.addr), Arc::new(NullObserver));
    assert!(matches!(
        result,
        Err(GazeError::FeedUnavailable {
            feed: FeedIdentity::DeviceIpc,
            ..
        })
    ));
    drop(result);
    server.thread.join().unwrap();
}

#[test]
fn device_handshake_wrong_message_type() {
    init_logging();
    let reply = protocol::build_handshake_response(
        CommandType::ServerPong,
        HandshakeResult::Success,
        IPC_VERSION,
    );
    let server = spawn_server(reply, GazeReplies::Silent);
    let observer = Arc::new(CountingObserver::default());
    let tracker = create_device_ipc_tracker(device_config(server.addr), observer.clone());
    assert!(tracker.is_none());
    assert_eq!(observer.unavailable.load(Ordering::SeqCst), 1);
    server.thread.join().unwrap();
}

#[test]
fn device_handshake_timeout() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = device_config(listener.local_addr().unwrap());
    config.handshake_attempts = 3;
    config.handshake_retry_delay = Duration::from_millis(20);

    // Accepted by the backlog but never answered.
    let begin = Instant::now();
    let result = DeviceIpcTracker::connect(config, Arc::new(NullObserver));
    assert!(matches!(result, Err(GazeError::FeedUnavailable { .. })));
    assert!(begin.elapsed() < Duration::from_secs(5));
}

#[test]
fn device_gaze_frames_reach_cache() {
    init_logging();
    let server = spawn_server(
        success_reply(),
        GazeReplies::Frame(frame([0.1, 0.2, 0.3], true, [0.3, 0.2, 0.1], true)),
    );
    let observer = Arc::new(CountingObserver::default());
    let mut tracker = DeviceIpcTracker::connect(device_config(server.addr), observer.clone()).unwrap();
    tracker.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || tracker.is_gaze_available(Instant::now())));
    let gaze = tracker.gaze(Instant::now()).unwrap();
    assert_close(gaze, GazeVector::new(-0.2, 0.2, -0.2));

    tracker.stop();
    assert_eq!(observer.started.load(Ordering::SeqCst), 1);
    assert_eq!(observer.stopped.load(Ordering::SeqCst), 1);
    assert!(observer.accepted.load(Ordering::SeqCst) >= 1);
    server.thread.join().unwrap();
}

#[test]
fn device_opposite_eyes_average_to_zero() {
    init_logging();
    let server = spawn_server(
        success_reply(),
        GazeReplies::Frame(frame([1.0, 0.0, 0.0], true, [-1.0, 0.0, 0.0], true)),
    );
    let mut tracker = DeviceIpcTracker::connect(device_config(server.addr), Arc::new(NullObserver)).unwrap();
    tracker.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || tracker.is_gaze_available(Instant::now())));
    assert_eq!(tracker.gaze(Instant::now()), Some(GazeVector::new(0.0, 0.0, 0.0)));
    drop(tracker);
    server.thread.join().unwrap();
}

#[test]
fn device_one_invalid_eye_never_updates() {
    init_logging();
    let server = spawn_server(
        success_reply(),
        GazeReplies::Frame(frame([0.1, 0.2, 0.3], true, [0.3, 0.2, 0.1], false)),
    );
    let observer = Arc::new(CountingObserver::default());
    let mut tracker = DeviceIpcTracker::connect(device_config(server.addr), observer.clone()).unwrap();
    tracker.start().unwrap();

    std::thread::sleep(Duration::from_millis(200));
    assert!(!tracker.is_gaze_available(Instant::now()));
    assert_eq!(tracker.gaze(Instant::now()), None);
    assert_eq!(observer.accepted.load(Ordering::SeqCst), 0);
    drop(tracker);
    server.thread.join().unwrap();
}

#[test]
fn device_late_frame_is_completed_without_new_request() {
    init_logging();
    let early_bytes = Arc::new(AtomicUsize::new(0));
    let pause = Duration::from_millis(150);
    let server = spawn_server(
        success_reply(),
        GazeReplies::Split {
            frame: frame([0.1, 0.2, 0.3], true, [0.3, 0.2, 0.1], true),
            at: 30,
            pause,
            early_bytes: early_bytes.clone(),
        },
    );
    let config = device_config(server.addr);
    assert!(config.read_budget() < pause);
    let mut tracker = DeviceIpcTracker::connect(config, Arc::new(NullObserver)).unwrap();
    tracker.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || tracker.is_gaze_available(Instant::now())));
    assert_close(tracker.gaze(Instant::now()).unwrap(), GazeVector::new(-0.2, 0.2, -0.2));
    assert_eq!(early_bytes.load(Ordering::SeqCst), 0);
    drop(tracker);
    server.thread.join().unwrap();
}

#[test]
fn device_reader_survives_server_hangup_until_stopped() {
    init_logging();
    let server = spawn_server(success_reply(), GazeReplies::Hangup);
    let observer = Arc::new(CountingObserver::default());
    let mut tracker = DeviceIpcTracker::connect(device_config(server.addr), observer.clone()).unwrap();
    server.thread.join().unwrap();
    tracker.start().unwrap();

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(observer.started.load(Ordering::SeqCst), 1);
    assert_eq!(observer.stopped.load(Ordering::SeqCst), 0);
    assert!(!tracker.is_gaze_available(Instant::now()));

    let begin = Instant::now();
    tracker.stop();
    assert!(begin.elapsed() < Duration::from_secs(2));
    assert_eq!(observer.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn device_stop_while_blocked_in_read_is_bounded() {
    init_logging();
    let server = spawn_server(success_reply(), GazeReplies::Silent);
    let mut config = device_config(server.addr);
    // A single gaze read may block for up to 30 s.
    config.read_attempts = 3000;
    config.read_retry_delay = Duration::from_millis(10);
    let mut tracker = DeviceIpcTracker::connect(config, Arc::new(NullObserver)).unwrap();
    tracker.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let begin = Instant::now();
    tracker.stop();
    assert!(begin.elapsed() < Duration::from_secs(2));

    // Second stop is a no-op; restart is refused.
    tracker.stop();
    assert!(matches!(tracker.start(), Err(GazeError::Stopped)));
    drop(tracker);
    server.thread.join().unwrap();
}

#[test]
fn device_start_twice_is_refused() {
    init_logging();
    let server = spawn_server(success_reply(), GazeReplies::Silent);
    let mut tracker = DeviceIpcTracker::connect(device_config(server.addr), Arc::new(NullObserver)).unwrap();
    tracker.start().unwrap();
    assert!(matches!(tracker.start(), Err(GazeError::AlreadyStarted)));
    drop(tracker);
    server.thread.join().unwrap();
}

// -- OSC feed --

fn osc_config() -> OscConfig {
    OscConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        recv_timeout: Duration::from_millis(100),
    }
}

fn send_to(addr: SocketAddr, packet: &[u8]) {
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(packet, addr).unwrap();
}

#[test]
fn osc_straight_ahead_message() {
    init_logging();
    let mut tracker = OscTracker::bind(osc_config(), Arc::new(NullObserver)).unwrap();
    assert_eq!(tracker.feed(), FeedIdentity::NetworkOsc);
    tracker.start().unwrap();

    let packet = osc::encode_float_message(EYE_ADDRESS, &[0.0, 0.0, 0.0, 0.0]);
    let addr = tracker.local_addr();
    assert!(wait_until(Duration::from_secs(5), || {
        send_to(addr, &packet);
        tracker.is_gaze_available(Instant::now())
    }));
    assert_close(tracker.gaze(Instant::now()).unwrap(), GazeVector::new(0.0, 0.0, -1.0));
    tracker.stop();
}

#[test]
fn osc_other_addresses_never_update() {
    init_logging();
    let observer = Arc::new(CountingObserver::default());
    let mut tracker = OscTracker::bind(osc_config(), observer.clone()).unwrap();
    tracker.start().unwrap();

    let addr = tracker.local_addr();
    for _ in 0..10 {
        send_to(addr, &osc::encode_float_message("/tracking/eye/CenterPitchYaw", &[0.0, 0.0]));
        send_to(addr, &osc::encode_float_message("/avatar/parameters/EyeLid", &[1.0]));
        send_to(addr, b"garbage");
    }
    std::thread::sleep(Duration::from_millis(200));
    assert!(!tracker.is_gaze_available(Instant::now()));
    assert_eq!(observer.accepted.load(Ordering::SeqCst), 0);

    // The loop survived the garbage and still handles real messages.
    let packet = osc::encode_float_message(EYE_ADDRESS, &[0.0, 90.0, 0.0, 90.0]);
    assert!(wait_until(Duration::from_secs(5), || {
        send_to(addr, &packet);
        tracker.is_gaze_available(Instant::now())
    }));
    assert_close(tracker.gaze(Instant::now()).unwrap(), GazeVector::new(1.0, 0.0, 0.0));
}

#[test]
fn osc_stop_interrupts_blocking_receive() {
    init_logging();
    let mut config = osc_config();
    config.recv_timeout = Duration::from_secs(30);
    let observer = Arc::new(CountingObserver::default());
    let mut tracker = OscTracker::bind(config, observer.clone()).unwrap();
    tracker.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || observer.started.load(Ordering::SeqCst) == 1));

    let begin = Instant::now();
    tracker.stop();
    assert!(begin.elapsed() < Duration::from_secs(2));
    assert_eq!(observer.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn osc_port_in_use_is_no_tracker() {
    init_logging();
    let occupied = UdpSocket::bind("127.0.0.1:0").unwrap();
    let config = OscConfig {
        bind_addr: occupied.local_addr().unwrap(),
        ..osc_config()
    };
    let observer = Arc::new(CountingObserver::default());
    assert!(create_osc_tracker(config, observer.clone()).is_none());
    assert_eq!(observer.unavailable.load(Ordering::SeqCst), 1);
}
