//! End to end tests of the public compression API: every produced stream must
//! decompress back to the input with an independent DEFLATE implementation.

use denseflate::{compress, compress_with_options, Format, Options};
use miniz_oxide::inflate::{decompress_to_vec, decompress_to_vec_zlib};
use proptest::prelude::*;

/// Small deterministic byte generator for incompressible-looking input.
fn pseudo_random_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 56) as u8
        })
        .collect()
}

#[test]
fn empty_input_yields_a_valid_stream() {
    let out = compress(&[], 0);
    assert_eq!(decompress_to_vec_zlib(&out).unwrap(), Vec::<u8>::new());
    // Two header bytes, the empty fixed block, four checksum bytes.
    assert_eq!(out.len(), 7);
}

#[test]
fn single_byte_roundtrips() {
    for &byte in &[0u8, b'a', 0xff] {
        let out = compress(&[byte], 0);
        assert_eq!(decompress_to_vec_zlib(&out).unwrap(), vec![byte]);
    }
}

#[test]
fn zlib_header_is_valid() {
    let out = compress(b"header check", 0);
    assert_eq!(out[0], 120); /* CM 8, CINFO 7 */
    assert_eq!(u16::from_be_bytes([out[0], out[1]]) % 31, 0);
}

#[test]
fn long_byte_run_compresses_to_almost_nothing() {
    let data = vec![b'A'; 100_000];
    let out = compress(&data, 0);
    assert_eq!(decompress_to_vec_zlib(&out).unwrap(), data);
    assert!(out.len() < 200, "run of one byte took {} bytes", out.len());
}

#[test]
fn incompressible_data_expands_only_slightly() {
    let data = pseudo_random_bytes(100_000);
    let out = compress(&data, 3);
    assert_eq!(decompress_to_vec_zlib(&out).unwrap(), data);
    // Worst case is stored blocks: 5 bytes per 65535-byte block plus wrapper.
    assert!(out.len() < data.len() + 64);
}

#[test]
fn text_compresses_better_than_stored() {
    let data: Vec<u8> = include_str!("roundtrip.rs").as_bytes().to_vec();
    let out = compress(&data, 0);
    assert_eq!(decompress_to_vec_zlib(&out).unwrap(), data);
    assert!(out.len() < data.len());
}

#[test]
fn output_is_deterministic() {
    let data = pseudo_random_bytes(20_000);
    let a = compress(&data, 5);
    let b = compress(&data, 5);
    assert_eq!(a, b);
}

#[test]
fn raw_deflate_format_omits_the_wrapper() {
    let options = Options::default();
    let data = b"raw deflate has no header bytes";
    let raw = compress_with_options(&options, Format::Deflate, data);
    assert_eq!(decompress_to_vec(&raw).unwrap(), data);

    let wrapped = compress_with_options(&options, Format::Zlib, data);
    assert_eq!(wrapped.len(), raw.len() + 6);
}

#[test]
fn disabling_block_splitting_still_roundtrips() {
    let mut data = Vec::new();
    for i in 0..20_000u32 {
        data.push((i % 7) as u8);
    }
    data.extend(std::iter::repeat(b'q').take(20_000));

    let options = Options {
        block_splitting: false,
        ..Options::default()
    };
    let out = compress_with_options(&options, Format::Zlib, &data);
    assert_eq!(decompress_to_vec_zlib(&out).unwrap(), data);
}

#[test]
fn more_iterations_never_hurt_much() {
    let data: Vec<u8> = b"abcdefgabcdefgabcdexyzzyabcdefg"
        .iter()
        .copied()
        .cycle()
        .take(30_000)
        .collect();
    let few = compress(&data, 1);
    let many = compress(&data, 15);
    assert_eq!(decompress_to_vec_zlib(&few).unwrap(), data);
    assert_eq!(decompress_to_vec_zlib(&many).unwrap(), data);
    assert!(many.len() <= few.len());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_data_roundtrips(data in prop::collection::vec(any::<u8>(), 0..8192)) {
        let out = compress(&data, 1);
        prop_assert_eq!(decompress_to_vec_zlib(&out).unwrap(), data);
    }

    #[test]
    fn repetitive_patterns_roundtrip(
        pattern in prop::collection::vec(any::<u8>(), 1..32),
        repeats in 1..512usize,
    ) {
        let data: Vec<u8> = pattern.iter().copied().cycle().take(pattern.len() * repeats).collect();
        let out = compress(&data, 2);
        prop_assert_eq!(decompress_to_vec_zlib(&out).unwrap(), data);
    }
}
