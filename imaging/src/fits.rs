//! Minimal FITS reader/writer for calibration frames.
//!
//! Covers the subset the cameras here produce: single-HDU 2-D images,
//! BITPIX 8 or 16, big-endian data in 2880-byte blocks, unsigned 16-bit
//! counts via the BZERO = 32768 convention.

use crate::ImageData;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

/// Errors from FITS parsing and serialization.
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed FITS: {0}")]
    Malformed(String),

    #[error("unsupported FITS: {0}")]
    Unsupported(String),
}

/// Read a 2-D image from a FITS file.
pub fn read_image(path: &Path) -> Result<ImageData, FitsError> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader)?;

    let bitpix = header.require_int("BITPIX")?;
    let naxis = header.require_int("NAXIS")?;
    if naxis != 2 {
        return Err(FitsError::Unsupported(format!("NAXIS = {naxis}, expected 2")));
    }
    let naxis1 = header.require_int("NAXIS1")?;
    let naxis2 = header.require_int("NAXIS2")?;
    if naxis1 <= 0 || naxis2 <= 0 {
        return Err(FitsError::Malformed(format!(
            "invalid dimensions {naxis1} x {naxis2}"
        )));
    }
    let bzero = header.float("BZERO").unwrap_or(0.0);

    let width = naxis1 as u32;
    let height = naxis2 as u32;
    let npix = (naxis1 as usize) * (naxis2 as usize);

    let data = match bitpix {
        16 => {
            let mut raw = vec![0u8; npix * 2];
            reader
                .read_exact(&mut raw)
                .map_err(|_| FitsError::Malformed("truncated 16-bit data unit".to_string()))?;
            let offset = bzero.round() as i32;
            raw.chunks_exact(2)
                .map(|b| {
                    let signed = i16::from_be_bytes([b[0], b[1]]);
                    (i32::from(signed) + offset).clamp(0, i32::from(u16::MAX)) as u16
                })
                .collect()
        }
        8 => {
            let mut raw = vec![0u8; npix];
            reader
                .read_exact(&mut raw)
                .map_err(|_| FitsError::Malformed("truncated 8-bit data unit".to_string()))?;
            raw.into_iter().map(u16::from).collect()
        }
        other => {
            return Err(FitsError::Unsupported(format!("BITPIX = {other}")));
        }
    };

    tracing::debug!(
        "read {}x{} BITPIX {} image from {}",
        width,
        height,
        bitpix,
        path.display()
    );
    Ok(ImageData::new(width, height, data))
}

/// Write a 2-D image as a 16-bit FITS file.
pub fn write_image(path: &Path, image: &ImageData) -> Result<(), FitsError> {
    let mut writer = BufWriter::new(File::create(path)?);

    let mut header = Vec::with_capacity(BLOCK_SIZE);
    push_card(&mut header, "SIMPLE", "T");
    push_card(&mut header, "BITPIX", "16");
    push_card(&mut header, "NAXIS", "2");
    push_card(&mut header, "NAXIS1", &image.width.to_string());
    push_card(&mut header, "NAXIS2", &image.height.to_string());
    push_card(&mut header, "BZERO", "32768");
    push_card(&mut header, "BSCALE", "1");
    header.extend_from_slice(format!("{:<80}", "END").as_bytes());
    header.resize(header.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, b' ');
    writer.write_all(&header)?;

    let mut data = Vec::with_capacity(image.data.len() * 2);
    for &pixel in &image.data {
        let signed = (i32::from(pixel) - 32768) as i16;
        data.extend_from_slice(&signed.to_be_bytes());
    }
    data.resize(data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0);
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

struct Header {
    cards: HashMap<String, String>,
}

impl Header {
    fn require_int(&self, key: &str) -> Result<i64, FitsError> {
        let value = self
            .cards
            .get(key)
            .ok_or_else(|| FitsError::Malformed(format!("missing {key} keyword")))?;
        value
            .parse::<i64>()
            .map_err(|_| FitsError::Malformed(format!("{key} = '{value}' is not an integer")))
    }

    fn float(&self, key: &str) -> Option<f64> {
        self.cards.get(key).and_then(|v| v.parse::<f64>().ok())
    }
}

fn read_header(reader: &mut impl Read) -> Result<Header, FitsError> {
    let mut cards = HashMap::new();
    let mut first = true;
    let mut ended = false;

    while !ended {
        let mut block = [0u8; BLOCK_SIZE];
        reader
            .read_exact(&mut block)
            .map_err(|_| FitsError::Malformed("truncated header".to_string()))?;

        for raw in block.chunks_exact(CARD_SIZE) {
            let card = std::str::from_utf8(raw)
                .map_err(|_| FitsError::Malformed("non-ASCII header card".to_string()))?;
            let keyword = card[..8].trim().to_string();

            if first {
                if keyword != "SIMPLE" {
                    return Err(FitsError::Malformed(
                        "file does not start with SIMPLE".to_string(),
                    ));
                }
                first = false;
            }

            if keyword == "END" {
                ended = true;
                break;
            }
            if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
                continue;
            }
            if &card[8..10] == "= " {
                let value = card[10..]
                    .split('/')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .trim_matches('\'')
                    .trim()
                    .to_string();
                cards.insert(keyword, value);
            }
        }
    }

    Ok(Header { cards })
}

fn push_card(header: &mut Vec<u8>, key: &str, value: &str) {
    let card = format!("{key:<8}= {value:>20}");
    header.extend_from_slice(format!("{card:<80}").as_bytes());
}
