//! Growable look-ahead buffer fed from a byte source.
//!
//! The buffer is one contiguous block of `keep_size_before + keep_size_after
//! + reserve` bytes. Logical positions grow without bound; `buffer_offset`
//! maps them to physical indices (`buffer_offset + pos`, wrapping in 32
//! bits) and is adjusted whenever the unread tail is slid back to the start
//! of the block.

use std::io::Read;

use tracing::debug;

use crate::error::{Result, WindowError};
use crate::stream::WindowStream;

pub struct InputWindow<R> {
    buffer: Vec<u8>,
    source: Option<R>,
    pos_limit: u32,
    stream_end_reached: bool,
    last_safe_position: u32,
    buffer_offset: u32,
    block_size: u32,
    pub(crate) pos: u32,
    keep_size_before: u32,
    keep_size_after: u32,
    pub(crate) stream_pos: u32,
}

impl<R> Default for InputWindow<R> {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            source: None,
            pos_limit: 0,
            stream_end_reached: false,
            last_safe_position: 0,
            buffer_offset: 0,
            block_size: 0,
            pos: 0,
            keep_size_before: 0,
            keep_size_after: 0,
            stream_pos: 0,
        }
    }
}

impl<R: Read> InputWindow<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the block. The allocation is kept when the size is unchanged,
    /// so one window can serve many passes.
    pub fn create(&mut self, keep_size_before: u32, keep_size_after: u32, keep_size_reserve: u32) {
        self.keep_size_before = keep_size_before;
        self.keep_size_after = keep_size_after;
        let block_size = keep_size_before + keep_size_after + keep_size_reserve;
        if self.buffer.is_empty() || self.block_size != block_size {
            self.block_size = block_size;
            self.buffer = vec![0; block_size as usize];
        }
        self.last_safe_position = self.block_size - keep_size_after;
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    pub(crate) fn is_created(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Physical index of logical position `pos`.
    #[inline]
    pub(crate) fn index(&self, pos: u32) -> usize {
        self.buffer_offset.wrapping_add(pos) as usize
    }

    #[inline]
    pub(crate) fn cursor(&self) -> usize {
        self.index(self.pos)
    }

    #[inline]
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Slide everything from `keep_size_before` bytes behind the cursor
    /// (plus one byte of margin) down to the start of the block.
    fn move_block(&mut self) {
        let mut offset = self.cursor() - self.keep_size_before as usize;
        if offset > 0 {
            offset -= 1;
        }
        let num_bytes = self.index(self.stream_pos) - offset;
        self.buffer.copy_within(offset..offset + num_bytes, 0);
        self.buffer_offset = self.buffer_offset.wrapping_sub(offset as u32);
        debug!(shifted = offset, kept = num_bytes, "compacted input window");
    }

    /// Fill the block from the source until it is full or the source ends.
    fn read_block(&mut self) -> Result<()> {
        if self.stream_end_reached {
            return Ok(());
        }
        let source = self
            .source
            .as_mut()
            .ok_or(WindowError::InvalidState("input window has no bound source"))?;
        loop {
            let start = self.buffer_offset.wrapping_add(self.stream_pos) as usize;
            if start == self.block_size as usize {
                return Ok(());
            }
            let read = source.read(&mut self.buffer[start..])?;
            if read == 0 {
                self.pos_limit = self.stream_pos;
                let pointer_to_position = self.buffer_offset.wrapping_add(self.pos_limit);
                if pointer_to_position > self.last_safe_position {
                    self.pos_limit = self.last_safe_position.wrapping_sub(self.buffer_offset);
                }
                self.stream_end_reached = true;
                debug!(staged = self.stream_pos.wrapping_sub(self.pos), "input source exhausted");
                return Ok(());
            }
            self.stream_pos += read as u32;
            if self.stream_pos >= self.pos + self.keep_size_after {
                self.pos_limit = self.stream_pos - self.keep_size_after;
            }
        }
    }

    /// Advance one byte, compacting and refilling once the cursor passes
    /// the refill limit.
    pub(crate) fn move_pos(&mut self) -> Result<()> {
        self.pos += 1;
        if self.pos > self.pos_limit {
            if self.cursor() > self.last_safe_position as usize {
                self.move_block();
            }
            self.read_block()?;
        }
        Ok(())
    }

    /// Shift every logical counter down by `sub_value`, keeping the
    /// physical cursor where it is. A negative value shifts them up.
    pub(crate) fn reduce_offsets(&mut self, sub_value: i32) {
        let sub = sub_value as u32;
        self.buffer_offset = self.buffer_offset.wrapping_add(sub);
        self.pos_limit = self.pos_limit.wrapping_sub(sub);
        self.pos = self.pos.wrapping_sub(sub);
        self.stream_pos = self.stream_pos.wrapping_sub(sub);
    }
}

impl<R: Read> WindowStream for InputWindow<R> {
    type Source = R;

    fn init(&mut self, source: R) -> Result<()> {
        if !self.is_created() {
            return Err(WindowError::InvalidState("input window used before create"));
        }
        self.source = Some(source);
        self.buffer_offset = 0;
        self.pos = 0;
        self.stream_pos = 0;
        self.stream_end_reached = false;
        self.read_block()
    }

    fn release_stream(&mut self) -> Option<R> {
        self.source.take()
    }

    fn available_bytes(&self) -> u32 {
        self.stream_pos - self.pos
    }

    fn index_byte(&self, index: i32) -> u8 {
        self.buffer[self.cursor().wrapping_add_signed(index as isize)]
    }

    fn match_len(&self, index: i32, distance: u32, limit: u32) -> u32 {
        let mut limit = limit;
        if self.stream_end_reached {
            let start = self.pos.wrapping_add_signed(index);
            if start.saturating_add(limit) > self.stream_pos {
                limit = self.stream_pos - start;
            }
        }
        let cur = self.cursor().wrapping_add_signed(index as isize);
        let back = cur - (distance as usize + 1);
        self.buffer[cur..]
            .iter()
            .zip(&self.buffer[back..])
            .take(limit as usize)
            .take_while(|(a, b)| a == b)
            .count() as u32
    }
}
