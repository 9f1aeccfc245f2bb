// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use toffee_module::{
    BulkChannel, BulkConnector, BulkIo, ModuleError, ProtocolTimings, ReportTransport, Result,
    WriteAck, PACKET_SIZE,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub type SentLog = Arc<Mutex<Vec<[u8; PACKET_SIZE]>>>;

/// Report transport answering each write from a script
pub struct FakeTransport {
    open: bool,
    fail_open: bool,
    sent: SentLog,
    responses: VecDeque<Option<Vec<u8>>>,
    stale: Vec<Vec<u8>>,
    tx: Option<mpsc::Sender<Vec<u8>>>,
    rx: Option<mpsc::Receiver<Vec<u8>>>,
}

impl FakeTransport {
    /// One entry per write; `None` leaves the write unanswered
    pub fn scripted(responses: Vec<Option<Vec<u8>>>) -> Self {
        Self {
            open: false,
            fail_open: false,
            sent: Arc::new(Mutex::new(Vec::new())),
            responses: responses.into(),
            stale: Vec::new(),
            tx: None,
            rx: None,
        }
    }

    pub fn silent() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn unavailable() -> Self {
        let mut transport = Self::silent();
        transport.fail_open = true;
        transport
    }

    /// Reports already queued when the transport opens
    pub fn with_stale(mut self, report: Vec<u8>) -> Self {
        self.stale.push(report);
        self
    }

    pub fn sent_log(&self) -> SentLog {
        Arc::clone(&self.sent)
    }
}

impl ReportTransport for FakeTransport {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(ModuleError::TransportUnavailable("no fake device".to_string()));
        }
        if self.open {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(16);
        for report in self.stale.drain(..) {
            tx.try_send(report).unwrap();
        }
        self.tx = Some(tx);
        self.rx = Some(rx);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.tx = None;
        self.rx = None;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write_report(&mut self, report: &[u8; PACKET_SIZE]) -> Result<WriteAck> {
        self.sent.lock().unwrap().push(*report);
        if let Some(Some(response)) = self.responses.pop_front() {
            if let Some(tx) = &self.tx {
                tx.try_send(response).unwrap();
            }
        }
        let (reply, ack) = oneshot::channel();
        let _ = reply.send(Ok(()));
        Ok(ack)
    }

    fn inbound(&mut self) -> Option<&mut mpsc::Receiver<Vec<u8>>> {
        self.rx.as_mut()
    }
}

/// Response report: status byte followed by the payload
pub fn response(status: u8, payload: &[u8]) -> Option<Vec<u8>> {
    let mut report = vec![status];
    report.extend_from_slice(payload);
    Some(report)
}

/// Hands out one prepared stream on the first connect
pub struct StreamConnector<S> {
    stream: Mutex<Option<S>>,
}

impl<S> StreamConnector<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Send + Unpin + 'static> BulkConnector for StreamConnector<S> {
    fn open(&self, _vendor_id: u16, _product_id: u16) -> Result<Box<dyn BulkIo>> {
        self.stream
            .lock()
            .unwrap()
            .take()
            .map(|stream| Box::new(stream) as Box<dyn BulkIo>)
            .ok_or_else(|| ModuleError::TransportUnavailable("stream already used".to_string()))
    }
}

/// Connector that never finds a port
pub struct NoPortConnector;

impl BulkConnector for NoPortConnector {
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn BulkIo>> {
        Err(ModuleError::TransportUnavailable(format!(
            "no serial port for {:04x}:{:04x}",
            vendor_id, product_id
        )))
    }
}

/// Connected bulk channel and the module's end of the stream
pub async fn connected_bulk(timings: ProtocolTimings) -> (BulkChannel, DuplexStream) {
    let (host, module) = tokio::io::duplex(64 * 1024);
    let bulk = BulkChannel::new(StreamConnector::new(host), timings);
    assert!(bulk.connect(0x1234, 0x5678).await);
    (bulk, module)
}

pub type WriteLog = Arc<Mutex<Vec<(Instant, Vec<u8>)>>>;

/// Write side recording every write call, read side that never yields data
pub struct RecordingIo {
    writes: WriteLog,
}

impl RecordingIo {
    pub fn new() -> (Self, WriteLog) {
        let writes: WriteLog = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                writes: Arc::clone(&writes),
            },
            writes,
        )
    }
}

impl AsyncWrite for RecordingIo {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.writes.lock().unwrap().push((Instant::now(), buf.to_vec()));
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for RecordingIo {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }
}

/// Write side failing every write
pub struct BrokenIo;

impl AsyncWrite for BrokenIo {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cable pulled")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for BrokenIo {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }
}
