//! Memory-image container for Amber programs.
//!
//! An [`Image`] is a flat sequence of 24-bit words. Two on-disk formats are
//! supported:
//!
//! - **bin**: each word as three little-endian bytes
//!   `[word[7:0], word[15:8], word[23:16]]`, no header or footer;
//! - **hex**: one word per line as six uppercase hex digits, each line
//!   terminated by `\n` (including the last).

use byteorder::{ByteOrder, WriteBytesExt};
use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use util::Endian;

pub const WORD_MASK: u32 = 0xFF_FFFF;
pub const WORD_BYTES: usize = 3;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Image {
    words: Vec<u32>,
}

impl Image {
    pub fn from(words: Vec<u32>) -> Image {
        Image { words }
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..]
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

pub fn write_bin<W: Write>(writer: &mut W, image: &Image) -> io::Result<()> {
    for &word in image.words() {
        writer.write_u24::<Endian>(word & WORD_MASK)?;
    }
    Ok(())
}

pub fn read_bin<R: Read>(reader: &mut R) -> io::Result<Image> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % WORD_BYTES != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "binary image length {} is not a multiple of {} bytes",
                bytes.len(),
                WORD_BYTES
            ),
        ));
    }
    let words = bytes
        .chunks_exact(WORD_BYTES)
        .map(Endian::read_u24)
        .collect();
    Ok(Image::from(words))
}

pub fn write_hex<W: Write>(writer: &mut W, image: &Image) -> io::Result<()> {
    for &word in image.words() {
        writeln!(writer, "{:06X}", word & WORD_MASK)?;
    }
    Ok(())
}

pub fn read_hex<R: Read>(reader: &mut R) -> io::Result<Image> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let mut words = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let word = u32::from_str_radix(line, 16).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad hex image line '{}': {}", line, err),
            )
        })?;
        if word > WORD_MASK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("hex image word does not fit in 24 bits: '{}'", line),
            ));
        }
        words.push(word);
    }
    Ok(Image::from(words))
}

pub trait ReadImageExt: Read + Sized {
    fn read_image_bin(&mut self) -> io::Result<Image> {
        read_bin(self)
    }

    fn read_image_hex(&mut self) -> io::Result<Image> {
        read_hex(self)
    }
}

impl<R: Read + Sized> ReadImageExt for R {}

pub trait WriteImageExt: Write + Sized {
    fn write_image_bin(&mut self, image: &Image) -> io::Result<()> {
        write_bin(self, image)
    }

    fn write_image_hex(&mut self, image: &Image) -> io::Result<()> {
        write_hex(self, image)
    }
}

impl<W: Write + Sized> WriteImageExt for W {}

pub fn read_bin_file<P: AsRef<Path>>(path: P) -> io::Result<Image> {
    BufReader::new(File::open(path)?).read_image_bin()
}

pub fn write_bin_file<P: AsRef<Path>>(path: P, image: &Image) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_image_bin(image)?;
    writer.flush()
}

pub fn read_hex_file<P: AsRef<Path>>(path: P) -> io::Result<Image> {
    BufReader::new(File::open(path)?).read_image_hex()
}

pub fn write_hex_file<P: AsRef<Path>>(path: P, image: &Image) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_image_hex(image)?;
    writer.flush()
}

#[cfg(test)]
mod test;
