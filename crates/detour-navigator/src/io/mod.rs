mod cache_file;
mod compressor;

pub use cache_file::*;
pub use compressor::*;
