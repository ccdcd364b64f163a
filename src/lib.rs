#![deny(trivial_casts, trivial_numeric_casts)]

//! A DEFLATE/zlib compressor that heavily prioritizes compression density over
//! speed.
//!
//! The compressor runs the LZ77 parse many times with refined statistical cost
//! models, splits the data into blocks where the symbol statistics change, and
//! picks the cheapest of the stored, fixed and dynamic block encodings for every
//! block. The generated streams are standard DEFLATE and can be decompressed
//! with any DEFLATE decompressor, at the cost of compression being
//! significantly slower than usual.

mod blocksplitter;
mod cache;
mod deflate;
mod hash;
mod iter;
mod katajainen;
mod lz77;
mod squeeze;
mod symbols;
mod tree;
mod util;
mod zlib;

use std::num::NonZeroU16;

use crate::deflate::{deflate, BlockType};
use crate::zlib::zlib_compress;

/// Options for the compression algorithm.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Maximum amount of times to rerun forward and backward pass to optimize LZ77
    /// compression cost.
    /// Good values: 10, 15 for small files, 5 for files over several MB in size or
    /// it will be too slow.
    ///
    /// Default value: 15.
    pub iteration_count: NonZeroU16,
    /// Whether to split the data into multiple deflate blocks with optimal
    /// choice of the block boundaries.
    ///
    /// Default value: true.
    pub block_splitting: bool,
    /// Maximum amount of blocks to split into (0 for unlimited, but this can give
    /// extreme results that hurt compression on some files).
    ///
    /// Default value: 15.
    pub maximum_block_splits: u16,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            iteration_count: NonZeroU16::new(15).unwrap(),
            block_splitting: true,
            maximum_block_splits: 15,
        }
    }
}

/// The output format to use to store the compressed data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// The zlib format, as defined in
    /// [RFC 1950](https://datatracker.ietf.org/doc/html/rfc1950).
    ///
    /// A two byte header and an Adler-32 checksum trailer around the DEFLATE
    /// stream, so decompressors can detect corrupted data.
    Zlib,
    /// The raw DEFLATE stream format, as defined in
    /// [RFC 1951](https://datatracker.ietf.org/doc/html/rfc1951).
    ///
    /// Raw DEFLATE streams are not meant to be stored raw because they lack
    /// error detection metadata. They usually are embedded in other file
    /// formats, such as zlib and gzip.
    Deflate,
}

/// Compresses data with the given options and returns the result in the
/// requested output format.
pub fn compress_with_options(options: &Options, output_format: Format, in_data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match output_format {
        Format::Zlib => zlib_compress(options, in_data, &mut out),
        Format::Deflate => deflate(options, BlockType::Dynamic, in_data, &mut out),
    }
    out
}

/// Compresses data to a zlib stream with default options.
///
/// `iterations` is the number of forward/backward optimization passes; pass 0
/// to use the default of 15. More iterations compress more densely but take
/// more time.
pub fn compress(in_data: &[u8], iterations: u16) -> Vec<u8> {
    let mut options = Options::default();
    if let Some(count) = NonZeroU16::new(iterations) {
        options.iteration_count = count;
    }
    compress_with_options(&options, Format::Zlib, in_data)
}
