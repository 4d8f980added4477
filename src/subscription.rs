use crate::connection::Connection;
use crate::error::{Result, YeelightError};
use crate::protocol::Notification;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiver for unsolicited state-change notifications
///
/// Backed by a single-slot channel: the bulb's reader drops any update that
/// arrives while the slot is still occupied, so at most one undelivered
/// notification is ever buffered. The receiver keeps its connection alive;
/// dropping it tears the stream down.
pub struct NotificationReceiver {
    rx: mpsc::Receiver<Notification>,
    _connection: Arc<Connection>,
}

impl NotificationReceiver {
    pub(crate) fn new(rx: mpsc::Receiver<Notification>, connection: Arc<Connection>) -> Self {
        Self {
            rx,
            _connection: connection,
        }
    }

    /// Receive the next notification
    ///
    /// Fails with [`YeelightError::ConnectionClosed`] once the connection
    /// has been cancelled or torn down.
    pub async fn recv(&mut self) -> Result<Notification> {
        self.rx.recv().await.ok_or(YeelightError::ConnectionClosed)
    }

    /// Try to receive a notification without blocking
    ///
    /// Returns `Ok(None)` when the slot is empty.
    pub fn try_recv(&mut self) -> Result<Option<Notification>> {
        match self.rx.try_recv() {
            Ok(notification) => Ok(Some(notification)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(YeelightError::ConnectionClosed),
        }
    }
}
