// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::config::ProtocolTimings;
use crate::constants::{BULK_BAUD_RATE, BULK_READ_SIZE};
use crate::error::{ModuleError, Result};
use crate::records::{length_prefix, DecoderState, FileRecord, RecordDecoder};
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPortBuilderExt, SerialPortType};

/// Duplex byte stream to the module
pub trait BulkIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> BulkIo for T {}

/// Opens the byte stream of the module matching a VID/PID pair
pub trait BulkConnector: Send + Sync {
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn BulkIo>>;
}

/// Connector for the module's USB CDC serial port
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new() -> Self {
        Self {
            baud_rate: BULK_BAUD_RATE,
        }
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkConnector for SerialConnector {
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Box<dyn BulkIo>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| ModuleError::TransportUnavailable(e.to_string()))?;

        let port = ports
            .into_iter()
            .find(|port| match &port.port_type {
                SerialPortType::UsbPort(usb) => usb.vid == vendor_id && usb.pid == product_id,
                _ => false,
            })
            .ok_or_else(|| {
                ModuleError::TransportUnavailable(format!(
                    "no serial port for {:04x}:{:04x}",
                    vendor_id, product_id
                ))
            })?;

        debug!("Opening serial port {}", port.port_name);
        let stream = tokio_serial::new(port.port_name.as_str(), self.baud_rate)
            .open_native_async()
            .map_err(|e| ModuleError::TransportUnavailable(e.to_string()))?;

        Ok(Box::new(stream))
    }
}

/// What ended an inbound file stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// A record with an empty filename arrived
    EndMarker,
    /// Nothing arrived within the idle timeout
    IdleTimeout,
    /// The module closed the stream
    Closed,
    /// The channel was disconnected during the transfer
    Cancelled,
}

/// Result of one inbound transfer
#[derive(Debug, Clone)]
pub struct ReceivedFiles {
    pub files: Vec<FileRecord>,
    pub end: StreamEnd,
}

/// Bulk byte-stream channel to the module.
///
/// Holds at most one open connection. Sending and receiving can proceed
/// independently, but only one receive may be in flight at a time.
pub struct BulkChannel {
    connector: Box<dyn BulkConnector>,
    timings: ProtocolTimings,
    session: Mutex<Option<watch::Sender<bool>>>,
    reader: Mutex<Option<ReadHalf<Box<dyn BulkIo>>>>,
    writer: Mutex<Option<WriteHalf<Box<dyn BulkIo>>>>,
}

impl BulkChannel {
    pub fn new(connector: impl BulkConnector + 'static, timings: ProtocolTimings) -> Self {
        Self {
            connector: Box::new(connector),
            timings,
            session: Mutex::new(None),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Channel over the module's USB serial port
    pub fn serial(timings: ProtocolTimings) -> Self {
        Self::new(SerialConnector::new(), timings)
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Open the stream of the matching module, replacing any open one.
    ///
    /// Failures are logged and reported as `false`.
    pub async fn connect(&self, vendor_id: u16, product_id: u16) -> bool {
        if self.is_connected().await {
            self.disconnect().await;
        }

        match self.connector.open(vendor_id, product_id) {
            Ok(stream) => {
                let (reader, writer) = tokio::io::split(stream);
                *self.reader.lock().await = Some(reader);
                *self.writer.lock().await = Some(writer);
                let (cancel, _) = watch::channel(false);
                *self.session.lock().await = Some(cancel);

                info!("Bulk port opened ({:04x}:{:04x})", vendor_id, product_id);
                true
            }
            Err(e) => {
                error!("Failed to connect to bulk port: {}", e);
                false
            }
        }
    }

    /// Close the stream, ending any receive in progress
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        if let Some(cancel) = &session {
            cancel.send_replace(true);
        }

        let reader = self.reader.lock().await.take();
        let writer = self.writer.lock().await.take();

        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                warn!("Error shutting down bulk port: {}", e);
            }
        }
        drop(reader);

        if session.is_some() {
            info!("Bulk port closed");
        }
    }

    /// Push one file: NUL-terminated name, LE length, then the data in chunks.
    ///
    /// The pauses after the name and the length give the module time to
    /// prepare for the next field.
    pub async fn send_file(&self, filename: &str, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            ModuleError::TransportUnavailable("bulk port is not connected".to_string())
        })?;

        info!("Starting file transfer for {} ({} bytes)", filename, data.len());

        match self.write_file(writer, filename, data).await {
            Ok(()) => {
                info!("File transfer complete");
                Ok(())
            }
            Err(e) => {
                error!("Error during file send: {}", e);
                if let Some(mut writer) = guard.take() {
                    let _ = writer.shutdown().await;
                }
                Err(e)
            }
        }
    }

    async fn write_file(
        &self,
        writer: &mut WriteHalf<Box<dyn BulkIo>>,
        filename: &str,
        data: &[u8],
    ) -> Result<()> {
        let length = length_prefix(data.len())?;
        let settle = self.timings.send_settle();

        let mut name = Vec::with_capacity(filename.len() + 1);
        name.extend_from_slice(filename.as_bytes());
        name.push(0);
        debug!("Sending filename ({} bytes)", name.len());
        writer.write_all(&name).await?;
        writer.flush().await?;
        sleep(settle).await;

        debug!("Sending size: {} bytes", data.len());
        writer.write_all(&length).await?;
        writer.flush().await?;
        sleep(settle).await;

        for chunk in data.chunks(self.timings.bulk_chunk_size.max(1)) {
            writer.write_all(chunk).await?;
        }
        writer.flush().await?;

        Ok(())
    }

    /// Receive files until the end marker, an idle timeout or a disconnect
    pub async fn receive_files(&self) -> Result<Vec<FileRecord>> {
        Ok(self.receive_files_detailed().await?.files)
    }

    /// Like [`BulkChannel::receive_files`], also reporting what ended the stream
    pub async fn receive_files_detailed(&self) -> Result<ReceivedFiles> {
        let mut cancel = match self.session.lock().await.as_ref() {
            Some(session) => session.subscribe(),
            None => {
                return Err(ModuleError::TransportUnavailable(
                    "bulk port is not connected".to_string(),
                ))
            }
        };

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| {
            ModuleError::TransportUnavailable("bulk port is not connected".to_string())
        })?;

        let idle = self.timings.receive_idle_timeout();
        let mut decoder = RecordDecoder::new();
        let mut files = Vec::new();
        let mut chunk = vec![0u8; BULK_READ_SIZE];

        info!("Starting file reception");

        let end = loop {
            while let Some(record) = decoder.next_record() {
                info!("Received {}", record);
                files.push(record);
            }

            if decoder.is_done() {
                break StreamEnd::EndMarker;
            }

            let read = tokio::select! {
                _ = cancel.wait_for(|cancelled| *cancelled) => None,
                read = timeout(idle, reader.read(&mut chunk)) => Some(read),
            };

            match read {
                None => break StreamEnd::Cancelled,
                Some(Err(_)) => {
                    info!("No data for {:?}, assuming transfer is complete", idle);
                    break StreamEnd::IdleTimeout;
                }
                Some(Ok(Ok(0))) => break StreamEnd::Closed,
                Some(Ok(Ok(size))) => decoder.feed(&chunk[..size]),
                Some(Ok(Err(e))) => {
                    error!("Bulk read failed: {}", e);
                    return Err(e.into());
                }
            }
        };

        let incomplete = match decoder.state() {
            DecoderState::Done => false,
            DecoderState::AwaitingTerminator => decoder.buffered() > 0,
            _ => true,
        };
        if incomplete {
            warn!(
                "Dropping incomplete record ({:?}, {} bytes buffered)",
                decoder.state(),
                decoder.buffered()
            );
        }

        info!("File reception ended ({:?}), {} files", end, files.len());
        Ok(ReceivedFiles { files, end })
    }
}
