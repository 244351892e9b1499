//! Broadcast the current gaze direction to WebSocket clients.
//!
//! Usage:
//!   cargo run --example ws_server
//!   Connect to ws://localhost:8081
//!
//! Each message is `{"available":true,"x":..,"y":..,"z":..,"feed":".."}`,
//! sent at ~60 Hz.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tungstenite::Message;

const PORT: u16 = 8081;

type WsClient = Arc<Mutex<tungstenite::WebSocket<TcpStream>>>;

fn main() {
    env_logger::init();

    let clients: Arc<Mutex<Vec<WsClient>>> = Arc::new(Mutex::new(Vec::new()));

    let gaze_clients = clients.clone();
    let running = Arc::new(AtomicBool::new(true));
    let gaze_running = running.clone();

    let gaze_thread = std::thread::Builder::new()
        .name("gaze-broadcast".into())
        .spawn(move || {
            gaze_loop(gaze_clients, gaze_running);
        })
        .expect("Failed to spawn gaze thread");

    let listener = TcpListener::bind(format!("0.0.0.0:{}", PORT)).unwrap_or_else(|e| {
        eprintln!("Failed to bind port {}: {}", PORT, e);
        std::process::exit(1);
    });
    eprintln!("[WS] Listening on ws://localhost:{}", PORT);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                eprintln!("[TCP] accept error: {}", e);
                continue;
            }
        };

        // Write timeout keeps a slow client from stalling the broadcast.
        stream.set_write_timeout(Some(Duration::from_secs(2))).ok();
        stream.set_nodelay(true).ok();

        match tungstenite::accept(stream) {
            Ok(ws) => {
                let mut list = clients.lock().unwrap();
                list.push(Arc::new(Mutex::new(ws)));
                eprintln!("[WS] Client connected ({} total)", list.len());
            }
            Err(e) => eprintln!("[WS] handshake error: {}", e),
        }
    }

    running.store(false, Ordering::Relaxed);
    let _ = gaze_thread.join();
}

/// Poll the tracker and broadcast JSON to all WebSocket clients.
fn gaze_loop(clients: Arc<Mutex<Vec<WsClient>>>, running: Arc<AtomicBool>) {
    let feeds = gazefeed::config::feeds_from_env(gazefeed::FeedSet::all());
    let mut tracker = loop {
        if !running.load(Ordering::Relaxed) {
            return;
        }
        match gazefeed::select_tracker(feeds, Arc::new(gazefeed::LogObserver)) {
            Some(t) => break t,
            None => {
                eprintln!("[GAZE] No feed available, retrying in 5s...");
                std::thread::sleep(Duration::from_secs(5));
            }
        }
    };

    if let Err(e) = tracker.start() {
        eprintln!("[GAZE] Failed to start {}: {}", tracker.feed(), e);
        return;
    }
    eprintln!("[GAZE] Broadcasting {} gaze to WebSocket clients...", tracker.feed());

    let interval = Duration::from_millis(16);
    let mut sent: u64 = 0;
    let mut last_report = Instant::now();

    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        let json = match tracker.gaze(now) {
            Some(g) => format!(
                "{{\"available\":true,\"x\":{:.5},\"y\":{:.5},\"z\":{:.5},\"feed\":\"{}\"}}",
                g.x,
                g.y,
                g.z,
                tracker.feed()
            ),
            None => format!("{{\"available\":false,\"feed\":\"{}\"}}", tracker.feed()),
        };

        let msg = Message::Text(json);
        let mut list = clients.lock().unwrap();
        list.retain(|ws_arc| {
            let mut ws = ws_arc.lock().unwrap();
            ws.send(msg.clone()).is_ok()
        });
        let client_count = list.len();
        drop(list);
        sent += 1;

        if now.duration_since(last_report) >= Duration::from_secs(5) {
            eprintln!("[GAZE] {} messages sent, {} client(s)", sent, client_count);
            sent = 0;
            last_report = now;
        }

        std::thread::sleep(interval);
    }

    tracker.stop();
}
