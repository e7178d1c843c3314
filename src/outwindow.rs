//! Circular history buffer for the decoding side.
//!
//! Literals and back-reference copies land in a ring; the region written
//! since the last flush, `[stream_pos, pos)`, is handed to the destination
//! whenever the ring fills and when the stream is released.

use std::io::{Read, Seek, SeekFrom};

use tracing::{trace, warn};

use crate::error::{Result, WindowError};
use crate::stream::Destination;

pub struct OutputWindow<W> {
    buffer: Vec<u8>,
    pos: usize,
    stream_pos: usize,
    destination: Option<W>,
    train_size: usize,
}

impl<W> Default for OutputWindow<W> {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            pos: 0,
            stream_pos: 0,
            destination: None,
            train_size: 0,
        }
    }
}

impl<W: Destination> OutputWindow<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the ring, reallocating only if the size changes.
    pub fn create(&mut self, window_size: usize) -> Result<()> {
        if window_size == 0 {
            return Err(WindowError::WindowSize);
        }
        if self.buffer.len() != window_size {
            self.buffer = vec![0; window_size];
        }
        self.pos = 0;
        self.stream_pos = 0;
        Ok(())
    }

    /// Bind a destination and start from an empty history.
    ///
    /// A destination that was still bound receives its pending bytes and is
    /// handed back, as [`release_stream`](Self::release_stream) would.
    pub fn init(&mut self, destination: W) -> Result<Option<W>> {
        let previous = self.bind(destination)?;
        self.pos = 0;
        self.stream_pos = 0;
        self.train_size = 0;
        Ok(previous)
    }

    /// Bind a destination but keep the current history, so copies may
    /// reach back into data decoded (or trained) before. Returns the
    /// previously bound destination, flushed.
    pub fn init_solid(&mut self, destination: W) -> Result<Option<W>> {
        self.bind(destination)
    }

    fn bind(&mut self, destination: W) -> Result<Option<W>> {
        if self.buffer.is_empty() {
            return Err(WindowError::InvalidState("output window used before create"));
        }
        let previous = self.release_stream()?;
        self.destination = Some(destination);
        Ok(previous)
    }

    /// Preload the ring with the tail of `stream` as a preset dictionary.
    ///
    /// Returns `false` if the stream ended before the expected bytes arrived.
    pub fn train<S: Read + Seek>(&mut self, stream: &mut S) -> Result<bool> {
        if self.buffer.is_empty() {
            return Err(WindowError::InvalidState("output window used before create"));
        }
        let window_size = self.buffer.len();
        let len = stream.seek(SeekFrom::End(0))?;
        let mut size = len.min(window_size as u64) as usize;
        self.train_size = size;
        stream.seek(SeekFrom::Start(len - size as u64))?;
        self.pos = 0;
        self.stream_pos = 0;
        while size > 0 {
            let chunk = (window_size - self.pos).min(size);
            let read = stream.read(&mut self.buffer[self.pos..self.pos + chunk])?;
            if read == 0 {
                return Ok(false);
            }
            size -= read;
            self.pos += read;
            self.stream_pos += read;
            if self.pos == window_size {
                self.pos = 0;
                self.stream_pos = 0;
            }
        }
        Ok(true)
    }

    /// Bytes preloaded by the last [`train`](Self::train).
    pub fn train_size(&self) -> usize {
        self.train_size
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_bound(&self) -> bool {
        self.destination.is_some()
    }

    /// Bytes written since the last flush.
    pub fn pending_bytes(&self) -> usize {
        self.pos - self.stream_pos
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.buffer[self.pos] = byte;
        self.pos += 1;
        if self.pos >= self.buffer.len() {
            self.flush()?;
        }
        Ok(())
    }

    /// Append `len` bytes copied from `distance + 1` bytes back, one byte at
    /// a time so a copy may overlap the bytes it produces.
    pub fn copy_block(&mut self, distance: u32, len: u32) -> Result<u32> {
        let window_size = self.buffer.len();
        let back = distance as usize + 1;
        let mut src = if self.pos >= back {
            self.pos - back
        } else {
            self.pos + window_size - back
        };
        for _ in 0..len {
            if src >= window_size {
                src = 0;
            }
            self.buffer[self.pos] = self.buffer[src];
            self.pos += 1;
            src += 1;
            if self.pos >= window_size {
                self.flush()?;
            }
        }
        Ok(len)
    }

    /// Byte `distance + 1` positions back, without moving anything.
    pub fn read_byte(&self, distance: u32) -> u8 {
        let back = distance as usize + 1;
        let src = if self.pos >= back {
            self.pos - back
        } else {
            self.pos + self.buffer.len() - back
        };
        self.buffer[src]
    }

    fn flush(&mut self) -> Result<()> {
        let pending = self.pos - self.stream_pos;
        if pending == 0 {
            return Ok(());
        }
        let destination = self
            .destination
            .as_mut()
            .ok_or(WindowError::InvalidState("output window has no bound destination"))?;
        let size = match destination.remaining_capacity() {
            Some(remaining) => pending.min(remaining),
            None => pending,
        };
        destination.write_all(&self.buffer[self.stream_pos..self.stream_pos + size])?;
        trace!(written = size, "flushed output window");
        self.stream_pos += size;
        if self.pos >= self.buffer.len() {
            if size < pending {
                warn!(dropped = pending - size, "destination full, dropping decoded bytes");
            }
            self.pos = 0;
            self.stream_pos = 0;
        }
        Ok(())
    }

    /// Flush what is pending and hand the destination back.
    pub fn release_stream(&mut self) -> Result<Option<W>> {
        if self.destination.is_none() {
            return Ok(None);
        }
        self.flush()?;
        let mut destination = self.destination.take();
        if let Some(destination) = destination.as_mut() {
            destination.flush()?;
        }
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn window(size: usize) -> Result<OutputWindow<Vec<u8>>> {
        let mut window = OutputWindow::new();
        window.create(size)?;
        window.init(Vec::new())?;
        Ok(window)
    }

    fn finish(mut window: OutputWindow<Vec<u8>>) -> Result<Vec<u8>> {
        Ok(window.release_stream()?.unwrap_or_default())
    }

    #[test]
    fn test_copy_repeats_previous_bytes() -> Result<()> {
        let mut out = window(64)?;
        for &b in b"ABC" {
            out.write_byte(b)?;
        }
        assert_eq!(out.copy_block(2, 3)?, 3);
        assert_eq!(finish(out)?, b"ABCABC");
        Ok(())
    }

    #[test]
    fn test_overlapping_copy_is_bytewise() -> Result<()> {
        let mut out = window(64)?;
        out.write_byte(b'X')?;
        out.write_byte(b'Y')?;
        out.copy_block(1, 5)?;
        out.write_byte(b'z')?;
        out.copy_block(0, 3)?;
        assert_eq!(finish(out)?, b"XYXYXYXzzzz");
        Ok(())
    }

    #[test]
    fn test_ring_wraps_and_flushes() -> Result<()> {
        let mut out = window(4)?;
        for &b in b"abcdef" {
            out.write_byte(b)?;
        }
        // the first four bytes were flushed when the ring filled
        assert_eq!(out.pending_bytes(), 2);
        // "cdef" back across the wrap point
        out.copy_block(3, 4)?;
        assert_eq!(out.read_byte(0), b'f');
        assert_eq!(out.read_byte(3), b'c');
        assert_eq!(finish(out)?, b"abcdefcdef");
        Ok(())
    }

    #[test]
    fn test_fixed_destination_is_not_overrun() -> Result<()> {
        let mut backing = [0u8; 5];
        {
            let mut out = OutputWindow::new();
            out.create(16)?;
            out.init(Cursor::new(&mut backing[..]))?;
            for &b in b"0123456789" {
                out.write_byte(b)?;
            }
            let cursor = out.release_stream()?.expect("destination was bound");
            assert_eq!(cursor.position(), 5);
        }
        assert_eq!(&backing, b"01234");
        Ok(())
    }

    #[test]
    fn test_fixed_destination_across_wraps() -> Result<()> {
        let mut backing = [0u8; 6];
        {
            let mut out = OutputWindow::new();
            out.create(4)?;
            out.init(Cursor::new(&mut backing[..]))?;
            for &b in b"abcdefghij" {
                out.write_byte(b)?;
            }
            out.copy_block(1, 2)?;
            let cursor = out.release_stream()?.expect("destination was bound");
            assert_eq!(cursor.position(), 6);
        }
        assert_eq!(&backing, b"abcdef");
        Ok(())
    }

    #[test]
    fn test_flush_without_destination_is_invalid_state() -> Result<()> {
        let mut out: OutputWindow<Vec<u8>> = OutputWindow::new();
        assert!(matches!(out.init(Vec::new()), Err(WindowError::InvalidState(_))));
        out.create(2)?;
        out.write_byte(1)?;
        let err = out.write_byte(2).unwrap_err();
        assert!(matches!(err, WindowError::InvalidState(_)));
        Ok(())
    }

    #[test]
    fn test_zero_size_window_rejected() {
        let mut out: OutputWindow<Vec<u8>> = OutputWindow::new();
        assert!(matches!(out.create(0), Err(WindowError::WindowSize)));
    }

    #[test]
    fn test_train_then_solid_init_copies_from_dictionary() -> Result<()> {
        let mut out = OutputWindow::new();
        out.create(8)?;
        let mut dictionary = Cursor::new(b"0123456789hello".to_vec());
        assert!(out.train(&mut dictionary)?);
        assert_eq!(out.train_size(), 8);
        out.init_solid(Vec::new())?;
        // "hello" ended the dictionary five bytes back
        out.copy_block(4, 5)?;
        out.write_byte(b'!')?;
        let written = out.release_stream()?.unwrap_or_default();
        assert_eq!(written, b"hello!");
        Ok(())
    }

    #[test]
    fn test_init_resets_history_and_train_size() -> Result<()> {
        let mut out = OutputWindow::new();
        out.create(8)?;
        out.train(&mut Cursor::new(b"abc".to_vec()))?;
        assert_eq!(out.train_size(), 3);
        out.init(Vec::new())?;
        assert_eq!(out.train_size(), 0);
        assert_eq!(out.pending_bytes(), 0);
        Ok(())
    }

    #[test]
    fn test_rebinding_hands_back_previous_destination() -> Result<()> {
        let mut out = OutputWindow::new();
        out.create(32)?;
        assert!(out.init(Cursor::new(Vec::new()))?.is_none());
        out.write_byte(b'a')?;
        let first = out.init_solid(Cursor::new(Vec::new()))?.expect("first destination was bound");
        assert_eq!(first.into_inner(), b"a");
        out.copy_block(0, 2)?;

        // plain init flushes and returns the second one too
        let second = out.init(Cursor::new(Vec::new()))?.expect("second destination was bound");
        assert_eq!(second.into_inner(), b"aa");
        assert_eq!(out.pending_bytes(), 0);
        out.write_byte(b'z')?;
        let third = out.release_stream()?.expect("third destination was bound");
        assert_eq!(third.into_inner(), b"z");
        assert!(!out.is_bound());
        Ok(())
    }
}
