//! Binary-tree match finder.
//!
//! Every position is inserted into a binary search tree keyed by the bytes
//! that follow it; all positions sharing a hash bucket live in one tree whose
//! root is the bucket's most recent position. Searching for the current
//! position and inserting it happen in the same walk: nodes are re-linked
//! around the new root as the walk descends, so recently seen positions stay
//! near the top. Child links live in `son`, two per slot of a ring of
//! `history_size + 1` slots indexed by `cyclic_buffer_pos`.
//!
//! Positions stored in `son` and the hash tables are logical input positions.
//! They start at 1, so [`EMPTY`] (0) can never name a real position. When the
//! cursor approaches [`MAX_VAL_FOR_NORMALIZE`] every stored position is
//! rebased so the counters stay in 31 bits.

use std::io::Read;

use tracing::debug;

use crate::config::{MatchFinderKind, MAX_MATCH_LEN, MIN_FAST_BYTES};
use crate::crc::CRC_TABLE;
use crate::error::{Result, WindowError};
use crate::stream::{MatchFinder, WindowStream};
use crate::window::InputWindow;

/// Link value meaning "no position".
pub const EMPTY: u32 = 0;

/// Cursor value at which stored positions are rebased.
pub const MAX_VAL_FOR_NORMALIZE: u32 = (1 << 31) - 1;

/// Largest history a finder can be created with.
pub const MAX_HISTORY_SIZE: u32 = MAX_VAL_FOR_NORMALIZE - 256;

const HASH2_SIZE: u32 = 1 << 10;
const HASH3_SIZE: u32 = 1 << 16;
const BT2_HASH_SIZE: u32 = 1 << 16;
const START_MAX_LEN: u32 = 1;

/// Candidates collected while walking the tree.
struct Found<'a> {
    distances: &'a mut [u32],
    count: usize,
    max_len: u32,
}

impl Found<'_> {
    fn push(&mut self, len: u32, distance: u32) {
        self.distances[self.count] = len;
        self.distances[self.count + 1] = distance;
        self.count += 2;
        self.max_len = len;
    }
}

struct HashKeys {
    hash2: usize,
    hash3: usize,
    main: usize,
}

pub struct BinTree<R> {
    window: InputWindow<R>,
    kind: MatchFinderKind,
    cyclic_buffer_pos: u32,
    cyclic_buffer_size: u32,
    match_max_len: u32,
    son: Vec<u32>,
    hash2: Vec<u32>,
    hash3: Vec<u32>,
    hash: Vec<u32>,
    cut_value: u32,
    hash_mask: u32,
    num_hash_direct_bytes: u32,
    min_match_check: u32,
}

impl<R: Read> BinTree<R> {
    /// Finder hashing `num_hash_bytes` prefix bytes: 2 selects the direct
    /// two-byte table, 3 or 4 the CRC-hashed four-byte layout.
    pub fn new(num_hash_bytes: u32) -> Result<Self> {
        let kind = match num_hash_bytes {
            2 => MatchFinderKind::Bt2,
            3 | 4 => MatchFinderKind::Bt4,
            other => return Err(WindowError::HashBytes(other)),
        };
        Ok(Self::with_kind(kind))
    }

    pub fn with_kind(kind: MatchFinderKind) -> Self {
        let (num_hash_direct_bytes, min_match_check) = match kind {
            MatchFinderKind::Bt2 => (2, 3),
            MatchFinderKind::Bt4 => (0, 4),
        };
        Self {
            window: InputWindow::new(),
            kind,
            cyclic_buffer_pos: 0,
            cyclic_buffer_size: 0,
            match_max_len: 0,
            son: Vec::new(),
            hash2: Vec::new(),
            hash3: Vec::new(),
            hash: Vec::new(),
            cut_value: 0xFF,
            hash_mask: 0,
            num_hash_direct_bytes,
            min_match_check,
        }
    }

    pub fn kind(&self) -> MatchFinderKind {
        self.kind
    }

    /// Fewest bytes that must remain before the end of the stream for a
    /// position to be searched at all.
    pub fn min_match_check(&self) -> u32 {
        self.min_match_check
    }

    /// Maximum number of tree nodes visited per position.
    pub fn set_cut_value(&mut self, cut_value: u32) {
        self.cut_value = cut_value;
    }

    pub fn cut_value(&self) -> u32 {
        self.cut_value
    }

    /// Minimum `distances` length accepted by [`MatchFinder::get_matches`].
    pub fn distances_capacity(&self) -> usize {
        self.match_max_len as usize * 2 + 2
    }

    fn is_hashed(&self) -> bool {
        self.kind == MatchFinderKind::Bt4
    }

    fn ensure_bound(&self) -> Result<()> {
        if self.son.is_empty() {
            return Err(WindowError::InvalidState("match finder used before create"));
        }
        if !self.window.is_bound() {
            return Err(WindowError::InvalidState("match finder has no bound source"));
        }
        Ok(())
    }

    /// Longest match worth searching for at the cursor, or `None` when the
    /// stream ends too soon for any candidate.
    fn len_limit(&self) -> Option<u32> {
        let pos = self.window.pos;
        let stream_pos = self.window.stream_pos;
        if pos + self.match_max_len <= stream_pos {
            return Some(self.match_max_len);
        }
        let len_limit = stream_pos - pos;
        (len_limit >= self.min_match_check).then_some(len_limit)
    }

    fn match_min_pos(&self) -> u32 {
        self.window.pos.saturating_sub(self.cyclic_buffer_size)
    }

    fn hash_keys(&self) -> HashKeys {
        let buf = self.window.buffer();
        let cur = self.window.cursor();
        if self.is_hashed() {
            let mut temp = CRC_TABLE[buf[cur] as usize] ^ buf[cur + 1] as u32;
            let hash2 = temp & (HASH2_SIZE - 1);
            temp ^= (buf[cur + 2] as u32) << 8;
            let hash3 = temp & (HASH3_SIZE - 1);
            let main = (temp ^ (CRC_TABLE[buf[cur + 3] as usize] << 5)) & self.hash_mask;
            HashKeys {
                hash2: hash2 as usize,
                hash3: hash3 as usize,
                main: main as usize,
            }
        } else {
            let main = buf[cur] as u32 ^ ((buf[cur + 1] as u32) << 8);
            HashKeys {
                hash2: 0,
                hash3: 0,
                main: main as usize,
            }
        }
    }

    /// Insert the cursor into the tree rooted at `cur_match`, reporting
    /// improving matches into `found` when given.
    fn update_tree(&mut self, mut cur_match: u32, len_limit: u32, mut found: Option<&mut Found<'_>>) {
        let match_min_pos = self.match_min_pos();
        let pos = self.window.pos;
        let cur = self.window.cursor();
        let cyclic_buffer_pos = self.cyclic_buffer_pos;
        let cyclic_buffer_size = self.cyclic_buffer_size;
        let window = &self.window;
        let buf = window.buffer();
        let son = &mut self.son;

        let mut ptr0 = (cyclic_buffer_pos as usize) * 2 + 1;
        let mut ptr1 = (cyclic_buffer_pos as usize) * 2;
        let mut len0 = self.num_hash_direct_bytes;
        let mut len1 = self.num_hash_direct_bytes;
        let mut count = self.cut_value;

        loop {
            if cur_match <= match_min_pos || count == 0 {
                son[ptr0] = EMPTY;
                son[ptr1] = EMPTY;
                return;
            }
            count -= 1;

            let delta = pos - cur_match;
            let slot = if delta <= cyclic_buffer_pos {
                cyclic_buffer_pos - delta
            } else {
                cyclic_buffer_pos + cyclic_buffer_size - delta
            };
            let cyclic_pos = slot as usize * 2;
            let pby1 = window.index(cur_match);
            let mut len = len0.min(len1);
            if buf[pby1 + len as usize] == buf[cur + len as usize] {
                loop {
                    len += 1;
                    if len == len_limit || buf[pby1 + len as usize] != buf[cur + len as usize] {
                        break;
                    }
                }
                if let Some(found) = found.as_deref_mut() {
                    if found.max_len < len {
                        found.push(len, delta - 1);
                    }
                }
                if len == len_limit {
                    // the node is superseded by the cursor: adopt its subtrees
                    son[ptr1] = son[cyclic_pos];
                    son[ptr0] = son[cyclic_pos + 1];
                    return;
                }
            }
            if buf[pby1 + len as usize] < buf[cur + len as usize] {
                son[ptr1] = cur_match;
                ptr1 = cyclic_pos + 1;
                cur_match = son[ptr1];
                len1 = len;
            } else {
                son[ptr0] = cur_match;
                ptr0 = cyclic_pos;
                cur_match = son[ptr0];
                len0 = len;
            }
        }
    }

    fn move_pos(&mut self) -> Result<()> {
        self.cyclic_buffer_pos += 1;
        if self.cyclic_buffer_pos >= self.cyclic_buffer_size {
            self.cyclic_buffer_pos = 0;
        }
        self.window.move_pos()?;
        if self.window.pos == MAX_VAL_FOR_NORMALIZE {
            self.normalize();
        }
        Ok(())
    }

    /// Rebase every stored position so the cursor drops back to
    /// `cyclic_buffer_size`. Positions that fall out of the window become
    /// [`EMPTY`].
    fn normalize(&mut self) {
        let sub_value = self.window.pos - self.cyclic_buffer_size;
        for links in [&mut self.son, &mut self.hash2, &mut self.hash3, &mut self.hash] {
            normalize_links(links, sub_value);
        }
        self.window.reduce_offsets(sub_value as i32);
        debug!(sub_value, "normalized match finder positions");
    }

    #[cfg(test)]
    pub(crate) fn window(&self) -> &InputWindow<R> {
        &self.window
    }

    #[cfg(test)]
    pub(crate) fn window_mut(&mut self) -> &mut InputWindow<R> {
        &mut self.window
    }
}

fn normalize_links(items: &mut [u32], sub_value: u32) {
    for item in items {
        *item = if *item <= sub_value { EMPTY } else { *item - sub_value };
    }
}

impl<R: Read> WindowStream for BinTree<R> {
    type Source = R;

    fn init(&mut self, source: R) -> Result<()> {
        if self.son.is_empty() {
            return Err(WindowError::InvalidState("match finder used before create"));
        }
        self.window.init(source)?;
        for table in [&mut self.hash2, &mut self.hash3, &mut self.hash] {
            table.fill(EMPTY);
        }
        self.cyclic_buffer_pos = 0;
        // positions start at 1 so that 0 stays free for EMPTY
        self.window.reduce_offsets(-1);
        Ok(())
    }

    fn release_stream(&mut self) -> Option<R> {
        self.window.release_stream()
    }

    fn available_bytes(&self) -> u32 {
        self.window.available_bytes()
    }

    fn index_byte(&self, index: i32) -> u8 {
        self.window.index_byte(index)
    }

    fn match_len(&self, index: i32, distance: u32, limit: u32) -> u32 {
        self.window.match_len(index, distance, limit)
    }
}

impl<R: Read> MatchFinder for BinTree<R> {
    fn create(
        &mut self,
        history_size: u32,
        keep_add_before: u32,
        match_max_len: u32,
        keep_add_after: u32,
    ) -> Result<()> {
        if history_size == 0 || history_size > MAX_HISTORY_SIZE {
            return Err(WindowError::HistorySize {
                requested: history_size,
                min: 1,
                max: MAX_HISTORY_SIZE,
            });
        }
        // the tree walk only stops at len_limit once it is past the hashed prefix
        if !(MIN_FAST_BYTES..=MAX_MATCH_LEN).contains(&match_max_len) {
            return Err(WindowError::MatchLength {
                requested: match_max_len,
                min: MIN_FAST_BYTES,
                max: MAX_MATCH_LEN,
            });
        }
        self.cut_value = 16 + (match_max_len >> 1);
        let window_reserve =
            (history_size + keep_add_before + match_max_len + keep_add_after) / 2 + 256;
        self.window.create(
            history_size + keep_add_before,
            match_max_len + keep_add_after,
            window_reserve,
        );
        self.match_max_len = match_max_len;

        let cyclic_buffer_size = history_size + 1;
        if self.cyclic_buffer_size != cyclic_buffer_size || self.son.is_empty() {
            self.cyclic_buffer_size = cyclic_buffer_size;
            self.son = vec![EMPTY; cyclic_buffer_size as usize * 2];
        }

        let hash_size = if self.is_hashed() {
            let mut hs = history_size - 1;
            hs |= hs >> 1;
            hs |= hs >> 2;
            hs |= hs >> 4;
            hs |= hs >> 8;
            hs >>= 1;
            hs |= 0xFFFF;
            if hs > (1 << 24) {
                hs >>= 1;
            }
            self.hash_mask = hs;
            hs + 1
        } else {
            BT2_HASH_SIZE
        };
        if self.hash.len() != hash_size as usize {
            self.hash = vec![EMPTY; hash_size as usize];
        }
        if self.is_hashed() {
            self.hash2.resize(HASH2_SIZE as usize, EMPTY);
            self.hash3.resize(HASH3_SIZE as usize, EMPTY);
        }
        debug!(
            kind = %self.kind,
            history_size,
            match_max_len,
            hash_size,
            cut_value = self.cut_value,
            "created match finder"
        );
        Ok(())
    }

    fn get_matches(&mut self, distances: &mut [u32]) -> Result<usize> {
        self.ensure_bound()?;
        let Some(len_limit) = self.len_limit() else {
            self.move_pos()?;
            return Ok(0);
        };

        let match_min_pos = self.match_min_pos();
        let pos = self.window.pos;
        let cur = self.window.cursor();
        let keys = self.hash_keys();
        let mut found = Found {
            distances,
            count: 0,
            max_len: START_MAX_LEN,
        };

        let cur_match = self.hash[keys.main];
        if self.is_hashed() {
            let buf = self.window.buffer();
            let mut cur_match2 = self.hash2[keys.hash2];
            let cur_match3 = self.hash3[keys.hash3];
            if cur_match2 > match_min_pos && buf[self.window.index(cur_match2)] == buf[cur] {
                found.push(2, pos - cur_match2 - 1);
            }
            if cur_match3 > match_min_pos && buf[self.window.index(cur_match3)] == buf[cur] {
                if cur_match3 == cur_match2 {
                    // same position: report it once, at length 3
                    found.count -= 2;
                }
                found.push(3, pos - cur_match3 - 1);
                cur_match2 = cur_match3;
            }
            if found.count != 0 && cur_match2 == cur_match {
                // the tree walk reaches this position with its true length
                found.count -= 2;
                found.max_len = START_MAX_LEN;
            }
            self.hash2[keys.hash2] = pos;
            self.hash3[keys.hash3] = pos;
        }
        self.hash[keys.main] = pos;

        let direct = self.num_hash_direct_bytes;
        if direct != 0 && cur_match > match_min_pos {
            let buf = self.window.buffer();
            let ahead = direct as usize;
            if buf[self.window.index(cur_match) + ahead] != buf[cur + ahead] {
                found.push(direct, pos - cur_match - 1);
            }
        }

        self.update_tree(cur_match, len_limit, Some(&mut found));
        let count = found.count;
        self.move_pos()?;
        Ok(count)
    }

    fn skip(&mut self, num: u32) -> Result<()> {
        self.ensure_bound()?;
        for _ in 0..num {
            let Some(len_limit) = self.len_limit() else {
                self.move_pos()?;
                continue;
            };
            let pos = self.window.pos;
            let keys = self.hash_keys();
            if self.is_hashed() {
                self.hash2[keys.hash2] = pos;
                self.hash3[keys.hash3] = pos;
            }
            let cur_match = std::mem::replace(&mut self.hash[keys.main], pos);
            self.update_tree(cur_match, len_limit, None);
            self.move_pos()?;
        }
        Ok(())
    }
}
