use std::env;
use std::fs::{self, File};
use std::io::prelude::*;

use denseflate::{compress_with_options, Format, Options};

fn main() {
    let options = Options::default();
    let output_format = Format::Zlib;

    // TODO: CLI flags for iteration count and output format
    let extension = match output_format {
        Format::Zlib => ".zlib",
        Format::Deflate => ".deflate",
    };

    for filename in env::args().skip(1) {
        let data = fs::read(&filename)
            .unwrap_or_else(|why| panic!("couldn't read {}: {}", filename, why));

        let compressed = compress_with_options(&options, output_format, &data);

        let out_filename = format!("{}{}", filename, extension);
        let mut out_file = File::create(&out_filename)
            .unwrap_or_else(|why| panic!("couldn't create output file {}: {}", out_filename, why));
        out_file.write_all(&compressed).unwrap_or_else(|why| {
            panic!("couldn't write to output file {}: {}", out_filename, why)
        });

        let percent_removed = if data.is_empty() {
            0.0
        } else {
            100.0 * (data.len().saturating_sub(compressed.len())) as f64 / data.len() as f64
        };
        println!(
            "Original Size: {}, Compressed: {}, Compression: {:.1}% Removed",
            data.len(),
            compressed.len(),
            percent_removed
        );
    }
}
