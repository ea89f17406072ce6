//! Byte counting on the write path

use crate::progress::RecordHandle;
use crate::session::CancelFlag;
use std::io::{self, Read, Write};

/// Writer that publishes its running byte count to a progress record
///
/// Counting cannot fail and publishing goes through the record's own lock,
/// so the only errors a write can return are the destination's.
pub struct CountingSink<W> {
    inner: W,
    written: u64,
    record: RecordHandle,
}

impl<W: Write> CountingSink<W> {
    pub fn new(inner: W, record: RecordHandle) -> Self {
        Self {
            inner,
            written: 0,
            record,
        }
    }

    /// Bytes accepted by the destination so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;

        let total = self.written;
        self.record.mutate(|record| record.record_bytes(total));

        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Copy `reader` into `writer`, checking `cancel` between reads
///
/// Returns the number of bytes copied. A tripped flag aborts the copy with
/// an error, the same way a broken stream does.
pub fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    cancel: &CancelFlag,
) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(io::Error::other("download cancelled"));
        }

        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        writer.write_all(&buffer[..n])?;
        copied += n as u64;
    }

    writer.flush()?;
    Ok(copied)
}
