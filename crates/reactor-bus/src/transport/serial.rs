//! Serial transport for the panel controller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace, warn};

use super::{BusTransport, SerialConfig};
use crate::command::Command;
use crate::error::BusError;
use crate::event::BusEvent;

/// Serial link to the panel controller.
///
/// Writes go through a shared writer half; a background task reads the
/// port line by line and fans decoded events out over the broadcast
/// channel. A read failure marks the transport disconnected; callers may
/// then [`reconnect`](BusTransport::reconnect).
pub struct SerialBusTransport {
    config: SerialConfig,
    connected: Arc<AtomicBool>,
    incoming_tx: broadcast::Sender<BusEvent>,
    writer: tokio::sync::Mutex<Option<WriteHalf<SerialStream>>>,
    reader_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SerialBusTransport {
    /// Open the port and start the reader task
    pub async fn connect(config: &SerialConfig) -> Result<Self, BusError> {
        let (incoming_tx, _) = broadcast::channel(256);
        let transport = Self {
            config: config.clone(),
            connected: Arc::new(AtomicBool::new(false)),
            incoming_tx,
            writer: tokio::sync::Mutex::new(None),
            reader_handle: parking_lot::Mutex::new(None),
        };
        transport.open().await?;
        Ok(transport)
    }

    async fn open(&self) -> Result<(), BusError> {
        let stream = tokio_serial::new(&self.config.path, self.config.baud_rate)
            .open_native_async()
            .map_err(|e| BusError::Serial(format!("{}: {}", self.config.path, e)))?;
        let (read_half, write_half) = tokio::io::split(stream);

        *self.writer.lock().await = Some(write_half);

        if let Some(handle) = self.reader_handle.lock().take() {
            handle.abort();
        }
        let handle = tokio::spawn(read_loop(
            read_half,
            self.incoming_tx.clone(),
            self.connected.clone(),
        ));
        *self.reader_handle.lock() = Some(handle);

        self.connected.store(true, Ordering::SeqCst);
        debug!(path = %self.config.path, baud = self.config.baud_rate, "serial port opened");
        Ok(())
    }
}

async fn read_loop(
    read_half: ReadHalf<SerialStream>,
    incoming_tx: broadcast::Sender<BusEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match BusEvent::decode(line) {
                    Ok(BusEvent::Status { message }) => {
                        trace!(%message, "controller status");
                        let _ = incoming_tx.send(BusEvent::Status { message });
                    }
                    Ok(event) => {
                        debug!(?event, "bus event");
                        let _ = incoming_tx.send(event);
                    }
                    Err(e) => warn!(%e, "dropping unparseable line"),
                }
            }
            Ok(None) => {
                warn!("serial port closed");
                break;
            }
            Err(e) => {
                warn!(%e, "serial read failed");
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

#[async_trait]
impl BusTransport for SerialBusTransport {
    async fn send(&self, command: Command) -> Result<(), BusError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        let line = command.encode();
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(BusError::Disconnected)?;
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(BusError::Serial(e.to_string()));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.incoming_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.open().await
    }
}

impl Drop for SerialBusTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_handle.lock().take() {
            handle.abort();
        }
    }
}
