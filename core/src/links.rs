use crate::metrics::Metrics;
use rand::Rng;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const BACKOFF_MIN: Duration = Duration::from_secs(1);
pub const BACKOFF_MAX: Duration = Duration::from_secs(30);
const JITTER_MAX_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Bounded FIFO of pending AT lines. Push never blocks; when full the
/// oldest entry is evicted so recent state keeps moving.
#[derive(Debug)]
pub struct OutboundQueue {
    lines: Mutex<VecDeque<String>>,
    bound: usize,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(bound: usize) -> Self {
        Self { lines: Mutex::new(VecDeque::new()), bound, notify: Notify::new() }
    }

    /// Enqueue a line, returning the evicted one when the bound forced
    /// a drop.
    pub fn push(&self, line: String) -> Option<String> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let evicted = if lines.len() >= self.bound { lines.pop_front() } else { None };
        lines.push_back(line);
        drop(lines);
        self.notify.notify_one();
        evicted
    }

    fn pop(&self) -> Option<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next line; single consumer (the sender task).
    pub async fn recv(&self) -> String {
        loop {
            if let Some(line) = self.pop() {
                return line;
            }
            self.notify.notified().await;
        }
    }
}

/// One best-effort outbound link to a configured neighbor. Created at
/// startup, never destroyed; its state oscillates with the peer.
#[derive(Debug)]
pub struct NeighborLink {
    pub peer_name: String,
    pub peer_addr: SocketAddr,
    pub queue: OutboundQueue,
    state: AtomicU8,
    last_error: Mutex<Option<String>>,
}

impl NeighborLink {
    fn new(peer_name: String, port: u16, queue_bound: usize) -> Self {
        Self {
            peer_name,
            peer_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            queue: OutboundQueue::new(queue_bound),
            state: AtomicU8::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LinkState {
        match self.state.load(Ordering::Relaxed) {
            2 => LinkState::Connected,
            1 => LinkState::Connecting,
            _ => LinkState::Disconnected,
        }
    }

    fn set_state(&self, state: LinkState) {
        let raw = match state {
            LinkState::Disconnected => 0,
            LinkState::Connecting => 1,
            LinkState::Connected => 2,
        };
        self.state.store(raw, Ordering::Relaxed);
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn note_error(&self, error: &dyn std::fmt::Display) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error.to_string());
    }
}

/// All outbound links of one member plus their sender tasks.
#[derive(Debug, Default)]
pub struct PeerLinks {
    links: Vec<Arc<NeighborLink>>,
}

impl PeerLinks {
    pub fn new(neighbors: &[(String, u16)], queue_bound: usize) -> Self {
        let links =
            neighbors.iter().map(|(name, port)| Arc::new(NeighborLink::new(name.clone(), *port, queue_bound))).collect();
        Self { links }
    }

    pub fn get(&self, peer_name: &str) -> Option<&Arc<NeighborLink>> {
        self.links.iter().find(|l| l.peer_name == peer_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NeighborLink>> {
        self.links.iter()
    }

    /// Hand a line to every neighbor except the excluded one. Never
    /// blocks; a full queue evicts its oldest entry and counts the drop.
    pub fn fan_out(&self, line: &str, exclude: Option<&str>, metrics: &Metrics) {
        for link in &self.links {
            if Some(link.peer_name.as_str()) == exclude {
                continue;
            }
            if link.queue.push(line.to_string()).is_some() {
                metrics.add_flood_dropped(&link.peer_name);
            }
            metrics.add_flood_enqueued();
        }
    }

    /// Spawn one dedicated sender task per link; each observes the
    /// shutdown channel and exits cleanly.
    pub fn spawn_senders(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.links.iter().map(|link| tokio::spawn(run_sender(Arc::clone(link), shutdown.clone()))).collect()
    }
}

/// Sender state machine: disconnected -> (backoff) -> connecting ->
/// connected, back to disconnected on dial or write failure. Backoff
/// doubles from 1s to 30s with jitter and resets on a successful
/// connect.
async fn run_sender(link: Arc<NeighborLink>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = BACKOFF_MIN;
    loop {
        if *shutdown.borrow() {
            break;
        }
        link.set_state(LinkState::Connecting);
        match TcpStream::connect(link.peer_addr).await {
            Ok(stream) => {
                debug!(peer = %link.peer_name, "peer link connected");
                link.set_state(LinkState::Connected);
                backoff = BACKOFF_MIN;
                if drain(&link, stream, &mut shutdown).await.is_none() {
                    break;
                }
                link.set_state(LinkState::Disconnected);
            }
            Err(e) => {
                info!(peer = %link.peer_name, "peer dial failed: {}", e);
                link.note_error(&e);
                link.set_state(LinkState::Disconnected);
            }
        }
        let wait = backoff + jitter();
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        backoff = (backoff * 2).min(BACKOFF_MAX);
    }
    link.set_state(LinkState::Disconnected);
}

/// Drain the queue into the stream. None means shutdown (in-flight
/// writes abandoned), Some(()) means the link failed and wants a
/// redial.
async fn drain(link: &NeighborLink, mut stream: TcpStream, shutdown: &mut watch::Receiver<bool>) -> Option<()> {
    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => return None,
            line = link.queue.recv() => line,
        };
        let mut framed = line.into_bytes();
        framed.push(b'\n');
        if let Err(e) = stream.write_all(&framed).await {
            info!(peer = %link.peer_name, "peer write failed: {}", e);
            link.note_error(&e);
            return Some(());
        }
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=JITTER_MAX_MS))
}
