//! Scripted in-process worker for wire-level assertions.
//!
//! Registers like a real worker, optionally heartbeats, and records every
//! envelope the master sends so tests can assert on the exact traffic. It
//! never acts on the messages.

use std::net::SocketAddr;
use std::time::Duration;

use darray_core::protocol::{forward_frames, Envelope, FramedReader, Payload, MASTER_ID};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct StubWorker {
    pub worker_id: String,
    received: mpsc::UnboundedReceiver<Envelope>,
    // Kept alive so the writer task (and with it the socket) stays open.
    outbound: mpsc::UnboundedSender<Envelope>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

/// Connects and registers. With `heartbeat` set, emits `HEARTBEAT` on that
/// period; without it, the worker goes silent after registration.
pub async fn spawn(addr: SocketAddr, worker_id: &str, heartbeat: Option<Duration>) -> StubWorker {
    let stream = TcpStream::connect(addr).await.expect("connect stub worker");
    let (read_half, write_half) = stream.into_split();

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let mut tasks = vec![tokio::spawn(forward_frames(write_half, out_rx))];

    out_tx
        .send(Envelope::new(
            worker_id,
            MASTER_ID,
            Payload::RegisterWorker {
                host: "127.0.0.1".into(),
                port: 0,
                cores: 4,
                memory: 1024,
            },
        ))
        .expect("send register");

    if let Some(period) = heartbeat {
        let tx = out_tx.clone();
        let id = worker_id.to_string();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if tx
                    .send(Envelope::new(&id, MASTER_ID, Payload::Heartbeat {}))
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    tasks.push(tokio::spawn(async move {
        let mut reader = FramedReader::new(read_half);
        while let Ok(Some(envelope)) = reader.next().await {
            if in_tx.send(envelope).is_err() {
                break;
            }
        }
    }));

    StubWorker {
        worker_id: worker_id.to_string(),
        received: in_rx,
        outbound: out_tx,
        tasks,
    }
}

impl StubWorker {
    /// Next envelope from the master, or `None` if `timeout` elapses first.
    pub async fn recv(&mut self, timeout: Duration) -> Option<Envelope> {
        tokio::time::timeout(timeout, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Sends an envelope to the master over the registered channel.
    #[allow(dead_code)]
    pub fn send(&self, payload: Payload) {
        let _ = self
            .outbound
            .send(Envelope::new(&self.worker_id, MASTER_ID, payload));
    }

    /// Drops the connection abruptly, as a crashed worker would.
    pub fn kill(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
