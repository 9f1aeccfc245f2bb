// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::config::{DeviceInfo, ProtocolTimings};
use crate::constants::{HID_REPORT_ID, INBOUND_QUEUE_SIZE, PACKET_SIZE, READ_POLL_INTERVAL_MS};
use crate::error::{ModuleError, Result};
use crate::hid_commands::{CommandId, Packet, Response};
use hidapi::{HidApi, HidDevice as RawHidDevice};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;

/// Resolves once the device has taken a queued report
pub type WriteAck = oneshot::Receiver<Result<()>>;

/// A report-based connection to the module.
///
/// Implementations deliver every non-empty inbound report, in arrival order,
/// through the queue returned by [`ReportTransport::inbound`].
pub trait ReportTransport: Send {
    /// Open the connection. Calling it on an open transport is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Release the connection. Calling it on a closed transport is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Queue one packet, without report ID. Must not block.
    fn write_report(&mut self, report: &[u8; PACKET_SIZE]) -> Result<WriteAck>;

    /// Inbound report queue, `None` while closed
    fn inbound(&mut self) -> Option<&mut mpsc::Receiver<Vec<u8>>>;
}

/// Blocking report device driven by a [`ReportIo`] thread
pub trait ReportDevice: Send + 'static {
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read one report, returning 0 when nothing arrived within `timeout_ms`
    fn read_timeout(&mut self, buffer: &mut [u8], timeout_ms: i32) -> Result<usize>;
}

impl ReportDevice for RawHidDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(RawHidDevice::write(self, data)?)
    }

    fn read_timeout(&mut self, buffer: &mut [u8], timeout_ms: i32) -> Result<usize> {
        Ok(RawHidDevice::read_timeout(self, buffer, timeout_ms)?)
    }
}

struct WriteRequest {
    data: Vec<u8>,
    reply: oneshot::Sender<Result<()>>,
}

/// Dedicated I/O thread owning a report device.
///
/// Queued writes are issued between read polls, so a write waits at most one
/// poll interval and never contends with the reader for the device.
pub struct ReportIo {
    writes: mpsc::UnboundedSender<WriteRequest>,
    inbound: mpsc::Receiver<Vec<u8>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReportIo {
    pub fn spawn<D: ReportDevice>(device: D, poll_interval_ms: i32) -> Result<Self> {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("toffee-hid-io".to_string())
            .spawn(move || io_loop(device, poll_interval_ms, thread_running, write_rx, inbound_tx))
            .map_err(|e| ModuleError::TransportUnavailable(e.to_string()))?;

        Ok(Self {
            writes: write_tx,
            inbound: inbound_rx,
            running,
            thread: Some(thread),
        })
    }

    /// Queue raw bytes for the device
    pub fn submit(&self, data: Vec<u8>) -> Result<WriteAck> {
        let (reply, ack) = oneshot::channel();
        self.writes
            .send(WriteRequest { data, reply })
            .map_err(|_| ModuleError::TransportError("report I/O thread stopped".to_string()))?;
        Ok(ack)
    }

    pub fn inbound(&mut self) -> &mut mpsc::Receiver<Vec<u8>> {
        &mut self.inbound
    }

    /// Signal the thread to stop. It exits after its current poll.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if self.thread.take().is_some() {
            debug!("Report I/O thread signalled to stop");
        }
    }
}

impl Drop for ReportIo {
    fn drop(&mut self) {
        self.stop();
    }
}

fn io_loop<D: ReportDevice>(
    mut device: D,
    poll_interval_ms: i32,
    running: Arc<AtomicBool>,
    mut writes: mpsc::UnboundedReceiver<WriteRequest>,
    inbound: mpsc::Sender<Vec<u8>>,
) {
    let mut buffer = [0u8; 64];

    'outer: while running.load(Ordering::Relaxed) {
        loop {
            match writes.try_recv() {
                Ok(request) => {
                    let result = device.write(&request.data).map(|_| ());
                    if let Err(e) = &result {
                        error!("HID write failed: {}", e);
                    }
                    let _ = request.reply.send(result);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        match device.read_timeout(&mut buffer, poll_interval_ms) {
            Ok(0) => {}
            Ok(size) => match inbound.try_send(buffer[..size].to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Inbound report queue full, dropping report");
                }
                Err(TrySendError::Closed(_)) => break,
            },
            Err(e) => {
                error!("HID read failed: {}", e);
                break;
            }
        }
    }

    debug!("HID I/O thread stopped");
}

/// hidapi backed report transport
pub struct HidReportTransport {
    device_info: DeviceInfo,
    io: Option<ReportIo>,
}

impl HidReportTransport {
    pub fn new(device_info: DeviceInfo) -> Self {
        Self {
            device_info,
            io: None,
        }
    }

    /// Search for the report interface matching the identity filter
    fn search_for_device(&self) -> Result<RawHidDevice> {
        let api = HidApi::new().map_err(|e| ModuleError::TransportUnavailable(e.to_string()))?;
        let info = &self.device_info;

        let candidate = api.device_list().find(|d| {
            d.vendor_id() == info.vendor_id
                && d.product_id() == info.product_id
                && info.usage_page.map_or(true, |page| d.usage_page() == page)
        });

        match candidate {
            Some(device_info) => {
                debug!("Found module interface: {:?}", device_info.path());
                device_info
                    .open_device(&api)
                    .map_err(|e| ModuleError::TransportUnavailable(e.to_string()))
            }
            None => Err(ModuleError::TransportUnavailable(format!(
                "no device {:04x}:{:04x} with usage page {:?}",
                info.vendor_id, info.product_id, info.usage_page
            ))),
        }
    }
}

impl ReportTransport for HidReportTransport {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let device = self.search_for_device()?;
        self.io = Some(ReportIo::spawn(device, READ_POLL_INTERVAL_MS)?);

        info!(
            "Report channel opened ({:04x}:{:04x})",
            self.device_info.vendor_id, self.device_info.product_id
        );
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut io) = self.io.take() {
            io.stop();
            info!("Report channel closed");
        }
    }

    fn is_open(&self) -> bool {
        self.io.is_some()
    }

    fn write_report(&mut self, report: &[u8; PACKET_SIZE]) -> Result<WriteAck> {
        let io = self
            .io
            .as_ref()
            .ok_or_else(|| ModuleError::TransportUnavailable("report channel is not open".to_string()))?;

        let mut buffer = Vec::with_capacity(PACKET_SIZE + 1);
        buffer.push(HID_REPORT_ID);
        buffer.extend_from_slice(report);
        io.submit(buffer)
    }

    fn inbound(&mut self) -> Option<&mut mpsc::Receiver<Vec<u8>>> {
        self.io.as_mut().map(ReportIo::inbound)
    }
}

struct DriverState<T> {
    transport: T,
    sequence_id: u32,
}

/// Command/response primitive on top of one report connection.
///
/// Commands are serialized: the driver lock is held from sending a packet
/// until its response arrives or times out, so one driver never has more
/// than one command in flight.
pub struct ControlDriver<T: ReportTransport> {
    state: Mutex<DriverState<T>>,
    timeout: Duration,
}

impl ControlDriver<HidReportTransport> {
    /// Driver for the module matching `device_info`
    pub fn hid(device_info: DeviceInfo, timings: &ProtocolTimings) -> Self {
        Self::new(HidReportTransport::new(device_info), timings.command_timeout())
    }
}

impl<T: ReportTransport> ControlDriver<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            state: Mutex::new(DriverState {
                transport,
                sequence_id: 0,
            }),
            timeout,
        }
    }

    pub async fn open(&self) -> Result<()> {
        self.state.lock().await.transport.open()
    }

    pub async fn close(&self) {
        self.state.lock().await.transport.close();
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.transport.is_open()
    }

    /// Sequence id the next packet will carry
    pub async fn sequence_id(&self) -> u32 {
        self.state.lock().await.sequence_id
    }

    /// Send a packet without waiting for an answer
    pub async fn send_packet(&self, command: CommandId, payload: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::send_locked(&mut state, command, payload).await
    }

    /// Wait for the next inbound report, whatever request it answers
    pub async fn receive_packet(&self, timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        Self::receive_locked(&mut state, timeout).await
    }

    /// Send a command and wait for its response.
    ///
    /// A module that never answers is reported as [`StatusCode::InvalidCommand`]
    /// with an empty payload. Use [`ControlDriver::try_execute_command`] to see
    /// the timeout instead.
    ///
    /// [`StatusCode::InvalidCommand`]: crate::hid_commands::StatusCode::InvalidCommand
    pub async fn execute_command(&self, command: CommandId, payload: &[u8]) -> Result<Response> {
        match self.try_execute_command(command, payload).await {
            Err(ModuleError::Timeout(after)) => {
                warn!("No answer to {} within {:?}", command, after);
                Ok(Response::no_answer())
            }
            other => other,
        }
    }

    /// Send a command and wait for its response, propagating timeouts
    pub async fn try_execute_command(&self, command: CommandId, payload: &[u8]) -> Result<Response> {
        let mut state = self.state.lock().await;

        if let Some(inbound) = state.transport.inbound() {
            while let Ok(stale) = inbound.try_recv() {
                debug!("Discarding stale report: {:02x?}", stale);
            }
        }

        Self::send_locked(&mut state, command, payload).await?;
        let report = Self::receive_locked(&mut state, self.timeout).await?;
        let response = Response::from_buffer(&report)?;
        debug!("{} -> {}", command, response);
        Ok(response)
    }

    async fn send_locked(state: &mut DriverState<T>, command: CommandId, payload: &[u8]) -> Result<()> {
        if !state.transport.is_open() {
            return Err(ModuleError::TransportUnavailable(
                "report channel is not open".to_string(),
            ));
        }

        let packet = Packet::new(command, state.sequence_id, payload)?;
        let buffer = packet.to_buffer();
        debug!("HID TX: {}: {:02x?}", packet, buffer);

        let ack = state.transport.write_report(&buffer)?;
        ack.await
            .map_err(|_| ModuleError::TransportError("report write dropped".to_string()))??;
        state.sequence_id = state.sequence_id.wrapping_add(1);
        Ok(())
    }

    async fn receive_locked(state: &mut DriverState<T>, timeout: Duration) -> Result<Vec<u8>> {
        let inbound = state.transport.inbound().ok_or_else(|| {
            ModuleError::TransportUnavailable("report channel is not open".to_string())
        })?;
        let deadline = Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, inbound.recv()).await {
                Err(_) => return Err(ModuleError::Timeout(timeout)),
                Ok(None) => {
                    return Err(ModuleError::TransportError(
                        "report channel closed".to_string(),
                    ))
                }
                Ok(Some(report)) if report.is_empty() => continue,
                Ok(Some(report)) => {
                    debug!("HID RX: {:02x?}", report);
                    return Ok(report);
                }
            }
        }
    }
}
