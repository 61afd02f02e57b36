//! Mock transport for testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{BusTransport, MockConfig};
use crate::command::Command;
use crate::error::BusError;
use crate::event::BusEvent;

/// Mock transport: records every sent command and lets tests inject
/// inbound events.
pub struct MockBusTransport {
    config: MockConfig,
    connected: AtomicBool,
    incoming_tx: broadcast::Sender<BusEvent>,
    sent: Mutex<Vec<Command>>,
}

impl MockBusTransport {
    pub fn new(config: &MockConfig) -> Self {
        let (incoming_tx, _) = broadcast::channel(256);
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            incoming_tx,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Inject an inbound event (simulates the controller reporting a
    /// switch change)
    pub fn inject_event(&self, event: BusEvent) {
        let _ = self.incoming_tx.send(event);
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Commands sent so far
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    /// Drop the recorded command history
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl BusTransport for MockBusTransport {
    async fn send(&self, command: Command) -> Result<(), BusError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        tracing::trace!(?command, "mock transport: sent");
        self.sent.lock().push(command);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.incoming_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_commands_and_injects_events() {
        let transport = MockBusTransport::new(&MockConfig::default());
        let mut rx = transport.subscribe();

        transport
            .send(Command::SetLed {
                board: 0,
                channel: 1,
                value: 128,
            })
            .await
            .unwrap();
        assert_eq!(transport.sent().len(), 1);

        transport.inject_event(BusEvent::Switch {
            bank: 0,
            index: 1,
            level: false,
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, BusEvent::Switch { index: 1, .. }));
    }

    #[tokio::test]
    async fn disconnected_send_fails() {
        let transport = MockBusTransport::new(&MockConfig::default());
        transport.set_connected(false);
        let err = transport
            .send(Command::ResetLeds { board: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Disconnected));

        transport.reconnect().await.unwrap();
        assert!(transport.is_connected().await);
    }
}
