//! Outbound half of a connection.
//!
//! Replies come from the connection's own task, while room fan-out writes
//! from other members' tasks. Both go through a [`FrameSink`] so writes are
//! serialized per peer and every frame lands whole.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Boxed future returned by [`FrameSink`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Destination for complete frames.
pub trait FrameSink: Send + Sync {
    /// Writes one frame. Frames from one caller arrive in call order.
    fn send_frame<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Shuts the sink down. Later sends fail with `NotConnected`; closing
    /// twice is a no-op. A failed or timed-out send closes the sink too.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// [`FrameSink`] over the write half of a byte stream.
pub struct StreamSink<W> {
    writer: Mutex<Option<W>>,
    write_timeout: Duration,
}

impl<W> StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, write_timeout: Duration) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            write_timeout,
        }
    }

    async fn write(&self, frame: &[u8]) -> io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "sink closed"))?;

        let write = async {
            writer.write_all(frame).await?;
            writer.flush().await
        };
        let result = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        };
        if let Err(e) = &result {
            // part of the frame may be on the wire; the stream is no longer framed
            debug!(error = %e, "dropping writer after failed write");
            guard.take();
        }
        result
    }

    async fn shutdown(&self) {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "transport shutdown failed");
        }
    }
}

impl<W> FrameSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn send_frame<'a>(&'a self, frame: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(self.write(frame))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn stream_sink_writes_whole_frames_in_order() {
        let (client, server) = tokio::io::duplex(64);
        let (_read, write) = tokio::io::split(server);
        let sink = StreamSink::new(write, Duration::from_secs(1));

        sink.send_frame(&[0xA0]).await.unwrap();
        sink.send_frame(&[0xAF, 0x01, 0x07]).await.unwrap();

        let mut client = client;
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xA0, 0xAF, 0x01, 0x07]);
    }

    #[tokio::test]
    async fn closed_sink_refuses_frames() {
        let (_client, server) = tokio::io::duplex(64);
        let sink = StreamSink::new(server, Duration::from_secs(1));

        sink.close().await;
        sink.close().await;

        let err = sink.send_frame(&[0xA0]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_times_out() {
        // 1-byte pipe that nobody drains
        let (_client, server) = tokio::io::duplex(1);
        let sink = StreamSink::new(server, Duration::from_millis(50));

        let err = sink.send_frame(&[1, 2, 3, 4]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_write_closes_the_sink() {
        let (mut client, server) = tokio::io::duplex(2);
        let sink = StreamSink::new(server, Duration::from_millis(50));

        let err = sink.send_frame(&[0xAF, 0x03, 0x01, 0x02, 0x03]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // nothing may follow the torn frame
        let err = sink.send_frame(&[0xA0]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let mut got = Vec::new();
        client.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, [0xAF, 0x03]);
    }
}
