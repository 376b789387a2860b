//! Delimited frame transport over an async byte stream.
//!
//! Each message is one UTF-8 JSON object followed by a delimiter byte:
//! `\n` by default, or `\0` for pipe-based debugging connections.
//!
//! # I/O Loop
//!
//! The transport spawns a tokio task that handles:
//!
//! - Inbound frames, split on the delimiter and handed to the message handler
//! - Outbound frames queued by [`Transport::send`]
//! - Shutdown on local close, end of stream, or I/O error
//!
//! Reading starts when the message handler is registered; frames sent
//! earlier are queued and written as soon as the loop runs.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

use super::handler::{DisconnectHandler, Handlers, Inbound, MessageHandler};
use super::Transport;

// ============================================================================
// Delimiter
// ============================================================================

/// Byte terminating each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delimiter {
    /// `\n`
    #[default]
    Newline,
    /// `\0`
    Nul,
}

impl Delimiter {
    /// Returns the delimiter byte.
    #[inline]
    #[must_use]
    pub const fn byte(self) -> u8 {
        match self {
            Self::Newline => b'\n',
            Self::Nul => 0,
        }
    }
}

// ============================================================================
// FramingOptions
// ============================================================================

/// Framing options for stream and WebSocket transports.
///
/// The delimiter only applies to byte streams; WebSocket frames are
/// self-delimiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingOptions {
    /// Frame delimiter.
    pub delimiter: Delimiter,
    /// Inbound frames are `messageChunk` envelopes.
    pub chunked: bool,
}

impl FramingOptions {
    /// Creates default options (newline, not chunked).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delimiter: Delimiter::Newline,
            chunked: false,
        }
    }

    /// Sets the delimiter.
    #[inline]
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Enables chunk reassembly for inbound frames.
    #[inline]
    #[must_use]
    pub const fn with_chunked(mut self) -> Self {
        self.chunked = true;
        self
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Internal commands for the I/O loop.
pub(crate) enum Outbound {
    /// Write one frame.
    Frame(String),
    /// Close the writer and stop.
    Shutdown,
}

// ============================================================================
// StreamTransport
// ============================================================================

/// Transport over any `AsyncRead`/`AsyncWrite` pair.
pub struct StreamTransport {
    handlers: Arc<Handlers>,
    outbound: mpsc::UnboundedSender<Outbound>,
    start: Mutex<Option<oneshot::Sender<()>>>,
}

impl StreamTransport {
    /// Creates a transport over a duplex stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<S>(stream: S, options: FramingOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_split(reader, writer, options)
    }

    /// Creates a transport over separate read and write halves, e.g. a
    /// child process's stdout and stdin.
    ///
    /// Must be called within a tokio runtime.
    pub fn from_split<R, W>(reader: R, writer: W, options: FramingOptions) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handlers = Arc::new(Handlers::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = oneshot::channel();

        tokio::spawn(run_io_loop(
            reader,
            writer,
            outbound_rx,
            start_rx,
            Arc::clone(&handlers),
            options,
        ));

        Self {
            handlers,
            outbound,
            start: Mutex::new(Some(start_tx)),
        }
    }
}

impl Transport for StreamTransport {
    fn send(&self, frame: String) -> Result<()> {
        if self.handlers.is_closed() {
            return Err(Error::transport("stream transport is closed"));
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| Error::transport("stream I/O loop terminated"))
    }

    fn on_message(&self, handler: MessageHandler) -> Result<()> {
        self.handlers.set_message(handler)?;
        if let Some(start) = self.start.lock().take() {
            let _ = start.send(());
        }
        Ok(())
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.handlers.set_disconnect(handler);
    }

    fn close(&self) {
        self.handlers.close("closed locally");
        self.start.lock().take();
        let _ = self.outbound.send(Outbound::Shutdown);
    }

    fn is_closed(&self) -> bool {
        self.handlers.is_closed()
    }
}

// ============================================================================
// I/O Loop
// ============================================================================

/// I/O loop that handles stream reads and writes.
async fn run_io_loop<R, W>(
    reader: R,
    mut writer: W,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    start_rx: oneshot::Receiver<()>,
    handlers: Arc<Handlers>,
    options: FramingOptions,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // Closed before a handler was ever registered.
    if start_rx.await.is_err() {
        debug!("Stream transport closed before start");
        return;
    }

    let delimiter = options.delimiter.byte();
    let mut reader = BufReader::new(reader);
    let mut inbound = Inbound::new(Arc::clone(&handlers), options.chunked);
    let mut buf = Vec::new();

    let reason = loop {
        tokio::select! {
            // Incoming frames from the target
            read = reader.read_until(delimiter, &mut buf) => {
                match read {
                    Ok(0) => {
                        debug!("Stream ended");
                        break "stream closed";
                    }

                    Ok(_) => {
                        if buf.last() == Some(&delimiter) {
                            buf.pop();
                        }
                        if buf.is_empty() {
                            continue;
                        }
                        match String::from_utf8(std::mem::take(&mut buf)) {
                            Ok(frame) => {
                                trace!(len = frame.len(), "Stream frame received");
                                inbound.accept(frame);
                            }
                            Err(e) => warn!(error = %e, "Dropping non UTF-8 frame"),
                        }
                    }

                    Err(e) => {
                        error!(error = %e, "Stream read failed");
                        break "stream read failed";
                    }
                }
            }

            // Frames from the local end
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = write_frame(&mut writer, &frame, delimiter).await {
                            error!(error = %e, "Stream write failed");
                            break "stream write failed";
                        }
                        trace!(len = frame.len(), "Stream frame sent");
                    }

                    Some(Outbound::Shutdown) | None => {
                        debug!("Stream transport shutdown requested");
                        let _ = writer.shutdown().await;
                        break "closed locally";
                    }
                }
            }
        }
    };

    handlers.close(reason);
    debug!(reason, "Stream I/O loop terminated");
}

async fn write_frame<W>(writer: &mut W, frame: &str, delimiter: u8) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(&[delimiter]).await?;
    writer.flush().await
}

// ============================================================================
// Tests
// ============================================================================
