//! Low-level numeric codecs
//!
//! Three building blocks sit underneath every data series:
//!
//! * [`itf8`] - byte-oriented variable-length integers for values stored in external streams
//! * [`BitWriter`] / [`BitReader`] - MSB-first bit streams backing the core block
//! * [`GolombRice`] - statistical coding of near-geometric integers on top of the bit stream

mod bits;
mod golomb;
pub mod itf8;

pub use bits::{BitReader, BitWriter};
pub use golomb::GolombRice;
