//! Handshake driver.
//!
//! [`HandshakeDriver`] acts on the engine's [`Action`] against a live message
//! stream. Each stream event is drained completely: a read may unlock a
//! write, which may be followed by another read from the same event, and so
//! on until the engine needs input that has not arrived yet.
//!
//! The result is delivered through a one-shot [`Completion`]; the sender is
//! consumed on the first success or failure, so later events cannot report a
//! second outcome.
//!
//! ```text
//!   start / on_message(msg)
//!          │
//!          ▼
//!   ┌─────────────┐  WriteMessage   write, queue outbound, ops += 1
//!   │ query action├───────────────► loop
//!   └──────┬──────┘  ReadMessage    consume msg (if any), ops += 1, loop
//!          │                        no msg left → yield
//!          │ Split                  split, finish(Ok(channel))
//!          │ Failed                 finish(Err(HandshakeActionFailed))
//!          ▼
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;

use crate::channel::SecureChannel;
use crate::config::Role;
use crate::engine::{Action, HandshakeEngine};
use crate::error::{ChannelError, Result};
use crate::stream::MessageStream;

/// Default ceiling on handshake write/read operations.
pub const DEFAULT_MAX_HANDSHAKE_OPERATIONS: usize = 12;

/// Options for a single handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// Maximum number of write/read operations before the attempt is aborted.
    pub max_operations: usize,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_HANDSHAKE_OPERATIONS,
        }
    }
}

impl HandshakeOptions {
    /// Sets the operation ceiling.
    pub fn max_operations(mut self, max_operations: usize) -> Self {
        self.max_operations = max_operations;
        self
    }
}

/// Resolves once with the handshake result.
#[derive(Debug)]
pub struct Completion {
    receiver: oneshot::Receiver<Result<SecureChannel>>,
}

impl Future for Completion {
    type Output = Result<SecureChannel>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChannelError::HandshakeAbandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Drives one handshake attempt to completion or failure.
pub struct HandshakeDriver<E> {
    engine: E,
    role: Role,
    associated_data: Vec<u8>,
    max_operations: usize,
    operations: usize,
    outbound: VecDeque<Vec<u8>>,
    completion: Option<oneshot::Sender<Result<SecureChannel>>>,
}

impl<E: HandshakeEngine> HandshakeDriver<E> {
    /// Creates a driver and the completion it will resolve.
    pub fn new(
        engine: E,
        role: Role,
        associated_data: Vec<u8>,
        options: HandshakeOptions,
    ) -> (Self, Completion) {
        let (sender, receiver) = oneshot::channel();
        let driver = Self {
            engine,
            role,
            associated_data,
            max_operations: options.max_operations,
            operations: 0,
            outbound: VecDeque::new(),
            completion: Some(sender),
        };
        (driver, Completion { receiver })
    }

    /// Whether a result has been delivered.
    pub fn is_finished(&self) -> bool {
        self.completion.is_none()
    }

    /// Number of write/read operations performed so far.
    pub fn operations(&self) -> usize {
        self.operations
    }

    /// Local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Takes the handshake messages waiting to be written, in order.
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        self.outbound.drain(..).collect()
    }

    /// Performs every action possible before any message arrives.
    ///
    /// For an initiator this writes the first handshake message; a
    /// responder has nothing to do until the peer speaks.
    pub fn start(&mut self) {
        if self.is_finished() {
            return;
        }
        tracing::debug!(role = %self.role, "starting handshake");
        self.prepare(None);
    }

    /// Handles one message delivered by the stream.
    pub fn on_message(&mut self, message: &[u8]) {
        if self.is_finished() {
            tracing::trace!(
                len = message.len(),
                "ignoring message delivered after handshake finished"
            );
            return;
        }
        self.prepare(Some(message));
    }

    /// Handles an error raised by the stream.
    pub fn on_stream_error(&mut self, err: std::io::Error) {
        self.finish(Err(ChannelError::Io(err)));
    }

    /// Handles the stream ending.
    pub fn on_stream_closed(&mut self) {
        self.finish(Err(ChannelError::ConnectionClosed(
            "stream ended during handshake".to_string(),
        )));
    }

    fn prepare(&mut self, mut inbound: Option<&[u8]>) {
        if let Err(err) = self.drain(&mut inbound) {
            self.finish(Err(err));
            return;
        }
        if let Some(message) = inbound {
            tracing::trace!(len = message.len(), "handshake message arrived out of turn");
        }
    }

    fn drain(&mut self, inbound: &mut Option<&[u8]>) -> Result<()> {
        loop {
            let action = self.engine.action();
            tracing::trace!(?action, operations = self.operations, "handshake step");

            match action {
                Action::Failed => {
                    return Err(ChannelError::HandshakeActionFailed(
                        "noise action failed".to_string(),
                    ));
                }
                Action::Split => {
                    let channel = self.split()?;
                    self.finish(Ok(channel));
                    return Ok(());
                }
                Action::WriteMessage => {
                    self.charge_operation()?;
                    let message = self.engine.write_message()?;
                    tracing::debug!(len = message.len(), "writing handshake message");
                    self.outbound.push_back(message);
                }
                Action::ReadMessage => {
                    let Some(message) = inbound.take() else {
                        return Ok(());
                    };
                    self.charge_operation()?;
                    tracing::debug!(len = message.len(), "reading handshake message");
                    self.engine.read_message(message)?;
                }
            }
        }
    }

    fn charge_operation(&mut self) -> Result<()> {
        if self.operations >= self.max_operations {
            return Err(ChannelError::HandshakeBudgetExceeded {
                limit: self.max_operations,
            });
        }
        self.operations += 1;
        Ok(())
    }

    fn split(&mut self) -> Result<SecureChannel> {
        let (send, receive) = self.engine.split()?;
        Ok(SecureChannel::new(
            send,
            receive,
            std::mem::take(&mut self.associated_data),
            self.engine.remote_public_key(),
            self.engine.handshake_hash(),
        ))
    }

    fn finish(&mut self, result: Result<SecureChannel>) {
        let Some(sender) = self.completion.take() else {
            if let Err(err) = result {
                tracing::trace!(error = %err, "dropping event after handshake finished");
            }
            return;
        };

        match &result {
            Ok(_) => tracing::info!(
                role = %self.role,
                operations = self.operations,
                "handshake complete"
            ),
            Err(err) => tracing::warn!(role = %self.role, error = %err, "handshake failed"),
        }

        // The receiver may already be gone; the outcome is then unobserved.
        let _ = sender.send(result);
    }
}

impl<E> std::fmt::Debug for HandshakeDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeDriver")
            .field("role", &self.role)
            .field("operations", &self.operations)
            .field("max_operations", &self.max_operations)
            .field("finished", &self.completion.is_none())
            .finish()
    }
}

/// Runs a handshake over `stream` until the driver reaches a result.
///
/// Messages are read one at a time; each is fully drained and the resulting
/// handshake messages are written before the next read.
pub async fn handshake<E, S>(
    mut driver: HandshakeDriver<E>,
    completion: Completion,
    stream: &mut S,
) -> Result<SecureChannel>
where
    E: HandshakeEngine,
    S: MessageStream,
{
    driver.start();
    flush(&mut driver, stream).await;

    while !driver.is_finished() {
        match stream.next().await {
            Some(Ok(message)) => driver.on_message(&message),
            Some(Err(err)) => driver.on_stream_error(err),
            None => driver.on_stream_closed(),
        }
        flush(&mut driver, stream).await;
    }

    completion.await
}

async fn flush<E, S>(driver: &mut HandshakeDriver<E>, stream: &mut S)
where
    E: HandshakeEngine,
    S: MessageStream,
{
    for message in driver.take_outbound() {
        if let Err(err) = stream.send(Bytes::from(message)).await {
            if driver.is_finished() {
                tracing::warn!(
                    role = %driver.role(),
                    error = %err,
                    "failed to write final handshake message"
                );
            }
            driver.on_stream_error(err);
            return;
        }
    }
}
