//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;

/// Read chunk size, a few maximum-length frames
const READ_CHUNK_SIZE: usize = 256;

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Read whatever bytes the port has
    ///
    /// Waits until the port is readable. An empty result means the port
    /// reported end of stream.
    async fn read_available(&mut self) -> io::Result<Bytes>;

    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
    rx: BytesMut,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self {
            port,
            rx: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn read_available(&mut self) -> io::Result<Bytes> {
        use tokio::io::AsyncReadExt;
        self.rx.reserve(READ_CHUNK_SIZE);
        self.port.read_buf(&mut self.rx).await?;
        Ok(self.rx.split().freeze())
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }
}
