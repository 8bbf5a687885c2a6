// crates/rkvision-media/src/publisher.rs
//
// MJPEG Publisher: per-channel bounded ingress queue, a single encoder
// thread, and an HTTP accept loop that fans out one thread per connection.
// `latest_jpeg` is the latest-wins slot every client thread reads from.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use rkvision_core::constants::{INGRESS_QUEUE_CAPACITY, STREAM_FRAME_INTERVAL_MS};
use rkvision_core::{Detection, EncodedJpeg};
use tiny_http::{Header, Response, Server};

use crate::annotate::{annotate, AnnotatedFrame};
use crate::jpeg::JpegEncoder;

struct PushedFrame {
    display_bgr: Vec<u8>,
    width: u32,
    height: u32,
    detections: Vec<Detection>,
    capture_ts_ms: i64,
}

#[derive(Default)]
struct Stats {
    frames_encoded: AtomicU64,
    frames_dropped: AtomicU64,
    frames_pushed: AtomicU64,
    clients_connected: AtomicU32,
    avg_encode_ms: Mutex<f64>,
    fps: Mutex<f64>,
}

struct Shared {
    queue: Mutex<std::collections::VecDeque<PushedFrame>>,
    queue_cv: Condvar,
    latest_jpeg: Mutex<Option<EncodedJpeg>>,
    jpeg_cv: Condvar,
    should_stop: AtomicBool,
    stats: Stats,
}

pub struct MjpegPublisher {
    shared: Arc<Shared>,
    encoder_thread: Option<thread::JoinHandle<()>>,
    server_thread: Option<thread::JoinHandle<()>>,
    port: u16,
}

impl MjpegPublisher {
    pub fn init(port: u16) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(std::collections::VecDeque::with_capacity(INGRESS_QUEUE_CAPACITY)),
                queue_cv: Condvar::new(),
                latest_jpeg: Mutex::new(None),
                jpeg_cv: Condvar::new(),
                should_stop: AtomicBool::new(false),
                stats: Stats::default(),
            }),
            encoder_thread: None,
            server_thread: None,
            port,
        }
    }

    /// Starts the encoder thread and the HTTP accept loop. Bind failure is
    /// returned so the supervisor can treat it as a configuration error.
    pub fn start(&mut self) -> anyhow::Result<()> {
        let server = Server::http(("0.0.0.0", self.port))
            .map_err(|e| anyhow::anyhow!("bind 0.0.0.0:{} failed: {e}", self.port))?;

        let encoder_shared = Arc::clone(&self.shared);
        self.encoder_thread = Some(thread::spawn(move || encoder_loop(encoder_shared)));

        let server_shared = Arc::clone(&self.shared);
        let port = self.port;
        self.server_thread = Some(thread::spawn(move || accept_loop(server, server_shared, port)));

        info!("mjpeg publisher listening on port {}", self.port);
        Ok(())
    }

    /// Two-step stop: set `should_stop`, wake both condvars. The HTTP
    /// server's listen socket is dropped when `Server` goes out of scope in
    /// `accept_loop`, which unblocks `recv` there.
    pub fn stop(mut self) {
        self.shared.should_stop.store(true, Ordering::SeqCst);
        self.shared.queue_cv.notify_all();
        self.shared.jpeg_cv.notify_all();
        if let Some(h) = self.encoder_thread.take() {
            let _ = h.join();
        }
        if let Some(h) = self.server_thread.take() {
            let _ = h.join();
        }
    }

    /// Pushes a new annotated frame. Drops the oldest queued frame (and
    /// increments the drop counter) when the ingress queue is already at
    /// capacity — this is deliberate backpressure so the JPEG encoder can
    /// never block the decode loop.
    pub fn push(&self, display_bgr: Vec<u8>, width: u32, height: u32, detections: Vec<Detection>, capture_ts_ms: i64) {
        self.shared.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        let mut queue = self.shared.queue.lock().unwrap();
        if queue.len() >= INGRESS_QUEUE_CAPACITY {
            queue.pop_front();
            self.shared.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(PushedFrame {
            display_bgr,
            width,
            height,
            detections,
            capture_ts_ms,
        });
        self.shared.queue_cv.notify_one();
    }

    pub fn stats_json(&self) -> String {
        let s = &self.shared.stats;
        format!(
            "{{\"status\":\"running\",\"clients\":{},\"clients_connected\":{},\"frames_encoded\":{},\"frames_dropped\":{},\"avg_encode_time_ms\":{:.2},\"fps\":{:.2}}}",
            s.clients_connected.load(Ordering::Relaxed),
            s.clients_connected.load(Ordering::Relaxed),
            s.frames_encoded.load(Ordering::Relaxed),
            s.frames_dropped.load(Ordering::Relaxed),
            *s.avg_encode_ms.lock().unwrap(),
            *s.fps.lock().unwrap(),
        )
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn encoder_loop(shared: Arc<Shared>) {
    let encoder = JpegEncoder::new();
    let mut last_frame_at = Instant::now();

    loop {
        let frame = {
            let mut queue = shared.queue.lock().unwrap();
            while queue.is_empty() && !shared.should_stop.load(Ordering::Relaxed) {
                queue = shared.queue_cv.wait(queue).unwrap();
            }
            if shared.should_stop.load(Ordering::Relaxed) && queue.is_empty() {
                return;
            }
            queue.pop_back().unwrap()
        };
        // Only the freshest queued frame matters (latest-wins); drain any
        // stragglers left behind without re-encoding them.
        {
            let mut queue = shared.queue.lock().unwrap();
            let leftover = queue.len() as u64;
            if leftover > 0 {
                shared.stats.frames_dropped.fetch_add(leftover, Ordering::Relaxed);
            }
            queue.clear();
        }

        let start = Instant::now();
        let annotated: AnnotatedFrame = annotate(
            &frame.display_bgr,
            frame.width,
            frame.height,
            &frame.detections,
            frame.capture_ts_ms,
            fps_since(&mut last_frame_at),
        );

        match encoder.encode(&annotated.data, annotated.width, annotated.height) {
            Ok(bytes) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                update_rolling_avg(&shared.stats.avg_encode_ms, elapsed_ms);
                shared.stats.frames_encoded.fetch_add(1, Ordering::Relaxed);

                let mut latest = shared.latest_jpeg.lock().unwrap();
                *latest = Some(EncodedJpeg {
                    bytes,
                    capture_ts_ms: frame.capture_ts_ms,
                });
                drop(latest);
                shared.jpeg_cv.notify_all();
            }
            Err(e) => {
                warn!("jpeg encode failed: {e}");
            }
        }

        if shared.should_stop.load(Ordering::Relaxed) {
            return;
        }
    }
}

fn fps_since(last: &mut Instant) -> f32 {
    let now = Instant::now();
    let dt = now.duration_since(*last).as_secs_f32();
    *last = now;
    if dt > 0.0 {
        1.0 / dt
    } else {
        0.0
    }
}

fn update_rolling_avg(slot: &Mutex<f64>, sample: f64) {
    let mut avg = slot.lock().unwrap();
    *avg = if *avg == 0.0 { sample } else { *avg * 0.9 + sample * 0.1 };
}

fn accept_loop(server: Server, shared: Arc<Shared>, port: u16) {
    for request in server.incoming_requests() {
        if shared.should_stop.load(Ordering::Relaxed) {
            break;
        }
        let shared = Arc::clone(&shared);
        thread::spawn(move || handle_client(request, shared, port));
    }
}

fn handle_client(request: tiny_http::Request, shared: Arc<Shared>, port: u16) {
    let url = request.url().to_string();
    match url.as_str() {
        "/mjpeg" | "/stream" => {
            shared.stats.clients_connected.fetch_add(1, Ordering::Relaxed);
            serve_mjpeg(request, &shared);
            shared.stats.clients_connected.fetch_sub(1, Ordering::Relaxed);
        }
        "/stats" => {
            let body = stats_json_standalone(&shared);
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let _ = request.respond(Response::from_string(body).with_header(header));
        }
        "/multi" => {
            let header = Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..]).unwrap();
            let _ = request.respond(Response::from_string(crate::dashboard_html()).with_header(header));
        }
        _ => {
            let header = Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..]).unwrap();
            let _ = request.respond(
                Response::from_string(crate::index_html(port)).with_header(header),
            );
        }
    }
}

fn stats_json_standalone(shared: &Shared) -> String {
    let s = &shared.stats;
    format!(
        "{{\"status\":\"running\",\"clients\":{}}}",
        s.clients_connected.load(Ordering::Relaxed)
    )
}

/// Streams `multipart/x-mixed-replace; boundary=mjpegstream` at ~30 fps by
/// reading `latest_jpeg` on a fixed cadence. Closure is signaled by any
/// socket write returning an error.
///
/// tiny_http's high-level `respond` API is one-shot, so the multipart body
/// is framed by hand over the connection's raw writer (`into_writer`)
/// rather than through a `Response`.
fn serve_mjpeg(request: tiny_http::Request, shared: &Arc<Shared>) {
    let writer = request.into_writer();
    let mut writer = writer.lock().unwrap();

    let response_line = b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=mjpegstream\r\nConnection: close\r\n\r\n";
    if writer.write_all(response_line).is_err() {
        return;
    }

    loop {
        if shared.should_stop.load(Ordering::Relaxed) {
            return;
        }
        let jpeg_bytes = {
            let guard = shared.latest_jpeg.lock().unwrap();
            guard.as_ref().map(|j| j.bytes.clone())
        };
        if let Some(bytes) = jpeg_bytes {
            let part_header = format!(
                "--mjpegstream\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                bytes.len()
            );
            if writer.write_all(part_header.as_bytes()).is_err() {
                return;
            }
            if writer.write_all(&bytes).is_err() {
                return;
            }
            if writer.write_all(b"\r\n").is_err() {
                return;
            }
        }
        thread::sleep(Duration::from_millis(STREAM_FRAME_INTERVAL_MS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_beyond_capacity_drops_oldest_and_counts_it() {
        let publisher = MjpegPublisher::init(0);
        for i in 0..(INGRESS_QUEUE_CAPACITY as i64 + 3) {
            publisher.push(vec![0u8; 3], 1, 1, Vec::new(), i);
        }
        assert!(publisher.shared.stats.frames_dropped.load(Ordering::Relaxed) >= 3);
        assert!(publisher.shared.queue.lock().unwrap().len() <= INGRESS_QUEUE_CAPACITY);
    }

    #[test]
    fn stats_json_contains_required_minimum_fields() {
        let publisher = MjpegPublisher::init(0);
        let json = publisher.stats_json();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"clients\""));
    }
}
