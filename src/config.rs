//! Match finder presets and validation.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use crate::bintree::{BinTree, MAX_HISTORY_SIZE};
use crate::error::{Result, WindowError};
use crate::stream::MatchFinder;

/// Shortest match length an encoder may ask the finder to stop at.
pub const MIN_FAST_BYTES: u32 = 5;
/// Longest match the finder will ever report.
pub const MAX_MATCH_LEN: u32 = 273;

/// Which hashing layout the binary tree uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchFinderKind {
    /// Two-byte prefix indexes the table directly.
    Bt2,
    /// CRC hash of four bytes plus auxiliary two- and three-byte tables.
    #[default]
    Bt4,
}

impl MatchFinderKind {
    pub fn num_hash_bytes(self) -> u32 {
        match self {
            Self::Bt2 => 2,
            Self::Bt4 => 4,
        }
    }
}

impl fmt::Display for MatchFinderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bt2 => write!(f, "bt2"),
            Self::Bt4 => write!(f, "bt4"),
        }
    }
}

impl FromStr for MatchFinderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bt2" => Ok(Self::Bt2),
            "bt4" => Ok(Self::Bt4),
            other => Err(format!("unknown match finder '{other}', expected bt2 or bt4")),
        }
    }
}

/// Everything needed to create a [`BinTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchFinderConfig {
    pub kind: MatchFinderKind,
    /// Dictionary size: how far back matches may reach.
    pub history_size: u32,
    /// Extra bytes kept behind the cursor for the encoder's own look-back.
    pub keep_add_before: u32,
    /// Matches are not extended past this length.
    pub match_max_len: u32,
    /// Extra bytes kept ahead of the cursor.
    pub keep_add_after: u32,
    /// Overrides the derived search budget.
    pub cut_value: Option<u32>,
}

impl Default for MatchFinderConfig {
    fn default() -> Self {
        Self {
            kind: MatchFinderKind::Bt4,
            history_size: 1 << 22,
            keep_add_before: 1 << 12,
            match_max_len: 32,
            keep_add_after: MAX_MATCH_LEN + 1,
            cut_value: None,
        }
    }
}

impl MatchFinderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_size == 0 || self.history_size > MAX_HISTORY_SIZE {
            return Err(WindowError::HistorySize {
                requested: self.history_size,
                min: 1,
                max: MAX_HISTORY_SIZE,
            });
        }
        if !(MIN_FAST_BYTES..=MAX_MATCH_LEN).contains(&self.match_max_len) {
            return Err(WindowError::MatchLength {
                requested: self.match_max_len,
                min: MIN_FAST_BYTES,
                max: MAX_MATCH_LEN,
            });
        }
        Ok(())
    }

    /// Validate, then allocate a finder ready for `init`.
    pub fn build<R: Read>(&self) -> Result<BinTree<R>> {
        self.validate()?;
        let mut finder = BinTree::with_kind(self.kind);
        finder.create(
            self.history_size,
            self.keep_add_before,
            self.match_max_len,
            self.keep_add_after,
        )?;
        if let Some(cut_value) = self.cut_value {
            finder.set_cut_value(cut_value);
        }
        Ok(finder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_kind_parses_case_insensitively() {
        assert_eq!("BT2".parse::<MatchFinderKind>(), Ok(MatchFinderKind::Bt2));
        assert_eq!("bt4".parse::<MatchFinderKind>(), Ok(MatchFinderKind::Bt4));
        assert!("hc4".parse::<MatchFinderKind>().is_err());
        assert_eq!(MatchFinderKind::Bt2.to_string(), "bt2");
        assert_eq!(MatchFinderKind::Bt4.num_hash_bytes(), 4);
    }

    #[test]
    fn test_validate_rejects_out_of_range_fields() {
        let config = MatchFinderConfig {
            match_max_len: 4,
            ..MatchFinderConfig::default()
        };
        assert!(matches!(config.validate(), Err(WindowError::MatchLength { requested: 4, .. })));

        let config = MatchFinderConfig {
            history_size: u32::MAX,
            ..MatchFinderConfig::default()
        };
        assert!(matches!(config.validate(), Err(WindowError::HistorySize { .. })));
    }

    #[test]
    fn test_build_applies_cut_value() -> Result<()> {
        let config = MatchFinderConfig {
            history_size: 1 << 16,
            cut_value: Some(7),
            ..MatchFinderConfig::default()
        };
        let finder: BinTree<Cursor<Vec<u8>>> = config.build()?;
        assert_eq!(finder.cut_value(), 7);
        assert_eq!(finder.kind(), MatchFinderKind::Bt4);

        let derived: BinTree<Cursor<Vec<u8>>> = MatchFinderConfig {
            cut_value: None,
            ..config
        }
        .build()?;
        assert_eq!(derived.cut_value(), 32);
        Ok(())
    }
}
