use std::io::{self, ErrorKind};

use crate::Channel;

/// Bytes provides buffered byte access to a [Channel] with the ability to push bytes back
/// if they are not needed, i.e., peek-and-push. The original order of the bytes is preserved
/// when pushing bytes back.
///
/// The channel is passed to each call; it is never held between calls.
#[derive(Debug, Default)]
pub(crate) struct Bytes {
    // Pending bytes, stored in reverse so the next byte is at the end
    cache: Vec<u8>,
    num_read: usize,
}

impl Bytes {
    const CHUNK: usize = 4096;

    pub fn new() -> Self {
        Self::default()
    }

    /// Next byte, or `None` at end of stream.
    pub fn next(&mut self, ch: &mut dyn Channel) -> io::Result<Option<u8>> {
        if self.cache.is_empty() && !self.load(ch)? {
            return Ok(None);
        }
        Ok(self.cache.pop())
    }

    /// Fill `buf` as far as possible, returning the number of bytes filled. Fewer than
    /// `buf.len()` bytes indicates end of stream.
    pub fn fill(&mut self, ch: &mut dyn Channel, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.cache.is_empty() && !self.load(ch)? {
                break;
            }
            let n = (buf.len() - filled).min(self.cache.len());
            for b in &mut buf[filled..filled + n] {
                // cache is non-empty for each of the n iterations
                *b = self.cache.pop().unwrap_or_default();
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Return `dat` so it is produced again, in order, by the following reads.
    pub fn push(&mut self, dat: &[u8]) {
        self.cache.extend(dat.iter().rev());
    }

    /// Number of bytes consumed from the channel, not counting bytes pushed back.
    pub fn offset(&self) -> usize {
        self.num_read - self.cache.len()
    }

    /// Drop any pending bytes.
    pub fn clear(&mut self) {
        self.num_read -= self.cache.len();
        self.cache.clear();
    }

    fn load(&mut self, ch: &mut dyn Channel) -> io::Result<bool> {
        let mut chunk = [0u8; Self::CHUNK];
        let n = loop {
            match ch.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        if n == 0 {
            return Ok(false);
        }
        self.num_read += n;
        self.cache.extend(chunk[..n].iter().rev());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadChannel;

    #[test]
    fn test() {
        let dat = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut ch = ReadChannel::new(&dat[..]);
        let mut bytes = Bytes::new();

        let b = bytes
            .next(&mut ch)
            .expect("Should have produced a byte for first call to next");
        assert_eq!(b, Some(0), "first byte has bad value");
        assert_eq!(bytes.offset(), 1);

        let b = bytes.next(&mut ch).unwrap().unwrap();
        assert_eq!(b, 1, "second byte has bad value");
        assert_eq!(bytes.offset(), 2);

        bytes.push(&[b]);
        assert_eq!(bytes.offset(), 1);

        let b = bytes.next(&mut ch).unwrap();
        assert_eq!(
            b,
            Some(1),
            "Byte should be the same as second call to next following a push"
        );
        assert_eq!(bytes.offset(), 2);

        let buf = &mut [0u8; 3][..];
        assert_eq!(bytes.fill(&mut ch, buf).unwrap(), 3);
        assert_eq!(bytes.offset(), 5);
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn push_preserves_order() {
        let src = [9u8];
        let mut ch = ReadChannel::new(&src[..]);
        let mut bytes = Bytes::new();
        bytes.push(&[1, 2, 3]);

        let buf = &mut [0u8; 4][..];
        assert_eq!(bytes.fill(&mut ch, buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 9]);
    }

    #[test]
    fn fill_reports_short_count_at_eof() {
        let src = [1u8, 2];
        let mut ch = ReadChannel::new(&src[..]);
        let mut bytes = Bytes::new();

        let buf = &mut [0u8; 3][..];
        assert_eq!(bytes.fill(&mut ch, buf).unwrap(), 2);
        assert_eq!(bytes.fill(&mut ch, buf).unwrap(), 0);
        assert_eq!(bytes.next(&mut ch).unwrap(), None);
    }

    #[test]
    fn clear_drops_pending() {
        let src = [1u8, 2, 3, 4];
        let mut ch = ReadChannel::new(&src[..]);
        let mut bytes = Bytes::new();
        assert_eq!(bytes.next(&mut ch).unwrap(), Some(1));
        bytes.clear();
        assert_eq!(bytes.offset(), 1);
        assert_eq!(bytes.next(&mut ch).unwrap(), None);
    }
}
