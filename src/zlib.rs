use simd_adler32::Adler32;

use crate::deflate::{deflate, BlockType};
use crate::Options;

/// Compresses the data according to the zlib specification (RFC 1950) and
/// appends the result to the output.
pub fn zlib_compress(options: &Options, in_data: &[u8], out: &mut Vec<u8>) {
    let cmf: u16 = 120; /* CM 8, CINFO 7. See zlib spec. */
    let flevel = 3;
    let fdict = 0;
    let mut cmfflg: u16 = 256 * cmf + fdict * 32 + flevel * 64;
    let fcheck = 31 - cmfflg % 31;
    cmfflg += fcheck;

    out.extend_from_slice(&cmfflg.to_be_bytes());

    deflate(options, BlockType::Dynamic, in_data, out);

    let mut adler = Adler32::new();
    adler.write(in_data);
    out.extend_from_slice(&adler.finish().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniz_oxide::inflate::decompress_to_vec_zlib;

    #[test]
    fn header_passes_the_zlib_check() {
        let options = Options::default();
        let mut out = Vec::new();
        zlib_compress(&options, b"x", &mut out);
        let cmfflg = u16::from_be_bytes([out[0], out[1]]);
        assert_eq!(cmfflg % 31, 0);
        assert_eq!(out[0], 120);
    }

    #[test]
    fn stream_roundtrips_with_checksum_verification() {
        let options = Options::default();
        let data = b"zlib wraps a deflate stream in a header and a checksum";
        let mut out = Vec::new();
        zlib_compress(&options, data, &mut out);
        // decompress_to_vec_zlib validates the Adler-32 trailer.
        assert_eq!(decompress_to_vec_zlib(&out).unwrap(), data);
    }
}
