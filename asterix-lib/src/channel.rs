//! Byte endpoints the formats read from and write to.
//!
//! Channels are owned by the caller. The formats only borrow them for the duration of a
//! single operation.
use std::io::{self, ErrorKind, Read, Write};

/// A caller owned byte-stream endpoint, e.g., a file, socket or serial line.
pub trait Channel {
    /// True while the channel can be used.
    fn is_open(&self) -> bool;

    /// Read up to `buf.len()` bytes. `Ok(0)` indicates end of stream.
    ///
    /// # Errors
    /// On underlying I/O failure, or if the channel does not support reading.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data`.
    ///
    /// # Errors
    /// On underlying I/O failure, or if the channel does not support writing.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush any buffered output.
    ///
    /// # Errors
    /// On underlying I/O failure.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Input channel over any [Read].
///
/// # Example
/// ```
/// use asterix::{Channel, ReadChannel};
///
/// let src = [0x30u8, 0x00, 0x03];
/// let mut ch = ReadChannel::new(&src[..]);
/// let mut buf = [0u8; 8];
/// assert_eq!(ch.read(&mut buf).unwrap(), 3);
/// assert!(ch.is_open());
/// ch.close();
/// assert!(!ch.is_open());
/// ```
#[derive(Debug)]
pub struct ReadChannel<R> {
    inner: Option<R>,
}

impl<R: Read> ReadChannel<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: Some(reader),
        }
    }

    /// Drop the underlying reader. Later reads report end of stream.
    pub fn close(&mut self) {
        self.inner = None;
    }
}

impl<R: Read> Channel for ReadChannel<R> {
    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(r) => r.read(buf),
            None => Ok(0),
        }
    }

    fn write_all(&mut self, _data: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "input channel cannot be written",
        ))
    }
}

/// Output channel over any [Write].
#[derive(Debug)]
pub struct WriteChannel<W> {
    inner: Option<W>,
}

impl<W: Write> WriteChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Some(writer),
        }
    }

    #[must_use]
    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    /// Release the writer, closing the channel.
    pub fn into_inner(self) -> Option<W> {
        self.inner
    }

    pub fn close(&mut self) {
        self.inner = None;
    }
}

impl<W: Write> Channel for WriteChannel<W> {
    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "output channel cannot be read",
        ))
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(w) => w.write_all(data),
            None => Err(io::Error::from(ErrorKind::NotConnected)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Status reported for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    Ok,
    /// The channel is not open so no data can flow.
    NoData,
}
