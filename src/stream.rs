//! Contracts between the windows and the encoder/decoder that drive them.

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Write};

use crate::error::Result;

/// Read side of a sliding input window.
///
/// `index` arguments are relative to the current position and may be
/// negative to look at bytes already consumed.
pub trait WindowStream {
    type Source: Read;

    /// Bind a fresh source and reset every position counter.
    fn init(&mut self, source: Self::Source) -> Result<()>;

    /// Detach the source, handing it back to the caller.
    fn release_stream(&mut self) -> Option<Self::Source>;

    /// Bytes staged from the source but not yet consumed.
    fn available_bytes(&self) -> u32;

    fn index_byte(&self, index: i32) -> u8;

    /// Length of the common run between `index` and `distance + 1` bytes
    /// before it, capped at `limit` and at the end of the stream.
    fn match_len(&self, index: i32, distance: u32, limit: u32) -> u32;
}

/// Match search over a [`WindowStream`].
pub trait MatchFinder: WindowStream {
    /// Size the window and search structures.
    fn create(
        &mut self,
        history_size: u32,
        keep_add_before: u32,
        match_max_len: u32,
        keep_add_after: u32,
    ) -> Result<()>;

    /// Write `(length, distance)` pairs for the current position into
    /// `distances`, lengths strictly increasing, and advance one byte.
    ///
    /// Returns the number of `u32` values written (always even).
    fn get_matches(&mut self, distances: &mut [u32]) -> Result<usize>;

    /// Advance `num` positions, indexing them without reporting matches.
    fn skip(&mut self, num: u32) -> Result<()>;
}

/// Where an output window flushes decoded bytes.
pub trait Destination: Write {
    /// Bytes the destination can still accept, or `None` if it grows on demand.
    fn remaining_capacity(&self) -> Option<usize>;
}

impl Destination for Vec<u8> {
    fn remaining_capacity(&self) -> Option<usize> {
        None
    }
}

impl Destination for Cursor<Vec<u8>> {
    fn remaining_capacity(&self) -> Option<usize> {
        None
    }
}

impl Destination for Cursor<&mut [u8]> {
    fn remaining_capacity(&self) -> Option<usize> {
        let len = self.get_ref().len() as u64;
        Some(len.saturating_sub(self.position()) as usize)
    }
}

impl Destination for File {
    fn remaining_capacity(&self) -> Option<usize> {
        None
    }
}

impl Destination for io::Sink {
    fn remaining_capacity(&self) -> Option<usize> {
        None
    }
}

impl Destination for io::Stdout {
    fn remaining_capacity(&self) -> Option<usize> {
        None
    }
}

impl<D: Destination> Destination for BufWriter<D> {
    fn remaining_capacity(&self) -> Option<usize> {
        self.get_ref()
            .remaining_capacity()
            .map(|remaining| remaining.saturating_sub(self.buffer().len()))
    }
}

impl<D: Destination + ?Sized> Destination for Box<D> {
    fn remaining_capacity(&self) -> Option<usize> {
        (**self).remaining_capacity()
    }
}
