//! Sliding-window engine for LZMA-style compression.
//!
//! The compression side is a [`BinTree`] match finder reading from an
//! [`InputWindow`]; the decompression side is an [`OutputWindow`] that
//! replays literals and back-references. Both are driven through the
//! contracts in [`stream`].

pub mod bintree;
pub mod config;
mod crc;
pub mod error;
pub mod outwindow;
pub mod stream;
pub mod window;

pub use bintree::BinTree;
pub use config::{MatchFinderConfig, MatchFinderKind};
pub use error::{Result, WindowError};
pub use outwindow::OutputWindow;
pub use stream::{Destination, MatchFinder, WindowStream};
pub use window::InputWindow;
