//! Built-in `gzip` and `deflate` decoders backed by `flate2`.

use std::io::{self, Write};

use bytes::Bytes;
use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};

use super::{Decompressor, DecompressorFactory};

/// Decoders for `gzip`, `x-gzip`, `deflate` and `x-deflate` bodies.
///
/// `deflate` bodies are accepted with or without the zlib wrapper; the first
/// two bytes decide which.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentDecoders;

impl DecompressorFactory for ContentDecoders {
    fn create(&self, encoding: &str) -> Option<Box<dyn Decompressor>> {
        match encoding {
            "gzip" | "x-gzip" => Some(Box::new(Gzip(GzDecoder::new(Vec::new())))),
            "deflate" | "x-deflate" => Some(Box::new(Deflate::Undecided(Vec::new()))),
            _ => None,
        }
    }
}

struct Gzip(GzDecoder<Vec<u8>>);

impl Decompressor for Gzip {
    fn decompress(&mut self, input: &[u8]) -> io::Result<Bytes> {
        self.0.write_all(input)?;
        Ok(take(self.0.get_mut()))
    }

    fn finish(&mut self) -> io::Result<Bytes> {
        self.0.try_finish()?;
        Ok(take(self.0.get_mut()))
    }
}

enum Deflate {
    Undecided(Vec<u8>),
    Zlib(ZlibDecoder<Vec<u8>>),
    Raw(DeflateDecoder<Vec<u8>>),
}

impl Decompressor for Deflate {
    fn decompress(&mut self, input: &[u8]) -> io::Result<Bytes> {
        match self {
            Self::Undecided(head) => {
                head.extend_from_slice(input);
                if head.len() < 2 {
                    return Ok(Bytes::new());
                }
                let head = std::mem::take(head);
                *self = if is_zlib_header(head[0], head[1]) {
                    Self::Zlib(ZlibDecoder::new(Vec::new()))
                } else {
                    Self::Raw(DeflateDecoder::new(Vec::new()))
                };
                self.decompress(&head)
            }
            Self::Zlib(decoder) => {
                decoder.write_all(input)?;
                Ok(take(decoder.get_mut()))
            }
            Self::Raw(decoder) => {
                decoder.write_all(input)?;
                Ok(take(decoder.get_mut()))
            }
        }
    }

    fn finish(&mut self) -> io::Result<Bytes> {
        match self {
            Self::Undecided(head) if head.is_empty() => Ok(Bytes::new()),
            Self::Undecided(_) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "deflate body ended after one byte",
            )),
            Self::Zlib(decoder) => {
                decoder.try_finish()?;
                Ok(take(decoder.get_mut()))
            }
            Self::Raw(decoder) => {
                decoder.try_finish()?;
                Ok(take(decoder.get_mut()))
            }
        }
    }
}

/// RFC 1950: compression method 8 and a header checksum divisible by 31.
fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0f == 8 && ((u16::from(cmf) << 8) | u16::from(flg)) % 31 == 0
}

fn take(buf: &mut Vec<u8>) -> Bytes { Bytes::from(std::mem::take(buf)) }
