/*
    fluxsector
    https://github.com/fluxsector/fluxsector

    Copyright 2026 fluxsector contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the "Software"),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/flux/kfsf.rs

    KryoFlux stream format. Byte-tag interleaved flux cells with out-of-band
    (OOB) metadata blocks, optionally packed inside a ZIP container (one
    `track<NN>.<H>.raw` member per track).

    http://www.kryoflux.com/download/kryoflux_stream_protocol_rev1.1.pdf
*/
use std::collections::HashMap;
use std::io::Read;

use regex::Regex;

use crate::chs::DiskChs;
use crate::error::{FluxError, FluxResult};
use crate::flux::{FluxBlock, FluxImage, FluxReader};

/// Fallback sample clock when the stream carries no `sck` info field.
pub const DEFAULT_FREQUENCY_HZ: f64 = 18.432e6 * 73.0 / 56.0;

struct PendingIndex {
    sample_counter: u64,
}

struct StreamParse {
    flux_trans_abs: Vec<u64>,
    index_pos: Vec<u64>,
    info: HashMap<String, String>,
}

fn flux_change(
    cell: u64,
    flux_sample_counter: &mut u64,
    overflow: &mut u64,
    prev_flux_sample_counter: &mut u64,
    flux_trans_abs: &mut Vec<u64>,
    index_pos: &mut Vec<u64>,
    pending: &mut HashMap<usize, PendingIndex>,
    logical_pos: usize,
) {
    *flux_sample_counter += *overflow + cell;
    *overflow = 0;
    flux_trans_abs.push(*flux_sample_counter);

    if let Some(index) = pending.remove(&logical_pos) {
        index_pos.push(*prev_flux_sample_counter + index.sample_counter);
    }
    *prev_flux_sample_counter = *flux_sample_counter;
}

fn parse_stream(data: &[u8]) -> FluxResult<StreamParse> {
    let mut pos = 0usize;
    let mut logical_pos = 0usize;

    let mut flux_sample_counter: u64 = 0;
    let mut prev_flux_sample_counter: u64 = 0;
    let mut overflow: u64 = 0;
    let mut flux_trans_abs = Vec::new();
    let mut index_pos = Vec::new();
    let mut info = HashMap::new();
    let mut pending: HashMap<usize, PendingIndex> = HashMap::new();

    let mut stream_end = false;
    let mut logical_eof = false;

    while !logical_eof {
        if pos >= data.len() {
            log::warn!("KryoFlux stream ended without an explicit EOF block.");
            break;
        }
        let block_offset = logical_pos;
        let bt = data[pos];
        pos += 1;
        logical_pos += 1;

        if bt != 0x0d && stream_end {
            return Err(FluxError::TruncatedRead);
        }

        match bt {
            0x00..=0x07 => {
                if pos >= data.len() {
                    return Err(FluxError::TruncatedRead);
                }
                let lo = data[pos];
                pos += 1;
                logical_pos += 1;
                let cell = ((bt as u64) << 8) + lo as u64;
                flux_change(
                    cell,
                    &mut flux_sample_counter,
                    &mut overflow,
                    &mut prev_flux_sample_counter,
                    &mut flux_trans_abs,
                    &mut index_pos,
                    &mut pending,
                    logical_pos,
                );
            }
            0x08 => {} // Nop1
            0x09 => {
                // Nop2
                if pos + 1 > data.len() {
                    return Err(FluxError::TruncatedRead);
                }
                pos += 1;
                logical_pos += 1;
            }
            0x0a => {
                // Nop3
                if pos + 2 > data.len() {
                    return Err(FluxError::TruncatedRead);
                }
                pos += 2;
                logical_pos += 2;
            }
            0x0b => {
                // Ovl16
                overflow += 0x10000;
            }
            0x0c => {
                // Flux3: next LE u16 is the cell count.
                if pos + 2 > data.len() {
                    return Err(FluxError::TruncatedRead);
                }
                let cell = u16::from_le_bytes([data[pos], data[pos + 1]]) as u64;
                pos += 2;
                logical_pos += 2;
                flux_change(
                    cell,
                    &mut flux_sample_counter,
                    &mut overflow,
                    &mut prev_flux_sample_counter,
                    &mut flux_trans_abs,
                    &mut index_pos,
                    &mut pending,
                    logical_pos,
                );
            }
            0x0d => {
                if pos + 3 > data.len() {
                    return Err(FluxError::TruncatedRead);
                }
                let kind = data[pos];
                let length = u16::from_le_bytes([data[pos + 1], data[pos + 2]]) as usize;
                pos += 3;
                logical_pos += 3;

                match kind {
                    0x01 => {
                        // StreamInfo: stream position, transfer time (both u32 LE); informational only.
                        if pos + 8 > data.len() {
                            return Err(FluxError::TruncatedRead);
                        }
                        pos += 8;
                        logical_pos += 8;
                    }
                    0x02 => {
                        // Index: next_flux_stream_pos, sample_counter, index_counter (all u32 LE).
                        if pos + 12 > data.len() {
                            return Err(FluxError::TruncatedRead);
                        }
                        let next_flux_stream_pos =
                            u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
                        let sample_counter =
                            u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as u64;
                        pos += 12;
                        logical_pos += 12;
                        pending.insert(next_flux_stream_pos, PendingIndex { sample_counter });
                    }
                    0x03 => {
                        // StreamEnd: stream position, result code (both u32 LE).
                        if pos + 8 > data.len() {
                            return Err(FluxError::TruncatedRead);
                        }
                        pos += 8;
                        logical_pos += 8;
                        stream_end = true;
                    }
                    0x04 => {
                        // Info: `length` bytes of ASCII, NUL-terminated, comma-space `key=value` pairs.
                        if pos + length > data.len() {
                            return Err(FluxError::TruncatedRead);
                        }
                        let text_bytes = &data[pos..pos + length];
                        pos += length;
                        logical_pos += length;
                        let text = String::from_utf8_lossy(text_bytes);
                        if !text.ends_with('\0') {
                            return Err(FluxError::UnterminatedInfo);
                        }
                        let body = &text[..text.len() - 1];
                        for field in body.split(", ") {
                            if let Some((k, v)) = field.split_once('=') {
                                info.insert(k.to_string(), v.to_string());
                            }
                        }
                    }
                    0x0d => {
                        // EOF block carries no payload.
                        logical_eof = true;
                    }
                    other => return Err(FluxError::UnknownOob(other)),
                }
                // OOB bytes never count toward the logical stream position.
                logical_pos = block_offset;
            }
            _ => {
                // 0x0e..=0xff: Flux1, the byte itself is the cell count.
                flux_change(
                    bt as u64,
                    &mut flux_sample_counter,
                    &mut overflow,
                    &mut prev_flux_sample_counter,
                    &mut flux_trans_abs,
                    &mut index_pos,
                    &mut pending,
                    logical_pos,
                );
            }
        }
    }

    if !pending.is_empty() {
        log::warn!("{} unresolved index block(s) in KryoFlux stream.", pending.len());
    }

    Ok(StreamParse { flux_trans_abs, index_pos, info })
}

fn frequency_from_info(info: &HashMap<String, String>) -> f64 {
    info.get("sck")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_FREQUENCY_HZ)
}

fn single_stream_image(data: &[u8]) -> FluxResult<FluxImage> {
    let parsed = parse_stream(data)?;
    let frequency_hz = frequency_from_info(&parsed.info);
    let chs = DiskChs::new(0, 0, 1);
    let mut image = FluxImage::new();
    image.insert(
        chs,
        FluxBlock {
            chs,
            frequency_hz,
            flux_trans_abs: parsed.flux_trans_abs,
            index_pos: parsed.index_pos,
            revolutions: 1,
        },
    );
    Ok(image)
}

fn zip_image(bytes: &[u8]) -> FluxResult<Option<FluxImage>> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = match zip::ZipArchive::new(cursor) {
        Ok(a) => a,
        Err(_) => return Ok(None),
    };

    let member_re = Regex::new(r"track(\d{2})\.(\d)\.raw$").unwrap();
    let mut image = FluxImage::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|_| FluxError::UnsupportedFormat)?;
        let name = entry.name().to_string();
        let Some(caps) = member_re.captures(&name) else {
            continue;
        };
        let track: u16 = caps[1].parse().unwrap_or(0);
        let head: u8 = caps[2].parse().unwrap_or(0);
        log::trace!("Reading KryoFlux stream member: {}", name);

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        let parsed = parse_stream(&buf)?;
        let frequency_hz = frequency_from_info(&parsed.info);
        let chs = DiskChs::new(track, head, 1);
        image.insert(
            chs,
            FluxBlock {
                chs,
                frequency_hz,
                flux_trans_abs: parsed.flux_trans_abs,
                index_pos: parsed.index_pos,
                revolutions: 1,
            },
        );
    }

    Ok(Some(image))
}

pub struct KfsfReader;

impl FluxReader for KfsfReader {
    fn read(bytes: &[u8]) -> FluxResult<FluxImage> {
        match zip_image(bytes)? {
            Some(image) => Ok(image),
            None => single_stream_image(bytes),
        }
    }

    fn capabilities() -> crate::flux::FormatCaps {
        crate::flux::FormatCaps::CAP_MULTI_REVOLUTION | crate::flux::FormatCaps::CAP_INDEX_MARKS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oob_info(text: &str) -> Vec<u8> {
        let mut payload = text.as_bytes().to_vec();
        payload.push(0);
        let mut out = vec![0x0d, 0x04];
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }

    fn oob_eof() -> Vec<u8> {
        vec![0x0d, 0x0d, 0x00, 0x00]
    }

    #[test]
    fn flux1_byte_is_its_own_cell_count() {
        let mut data = vec![0x20u8]; // Flux1
        data.extend_from_slice(&oob_eof());
        let parsed = parse_stream(&data).unwrap();
        assert_eq!(parsed.flux_trans_abs, vec![0x20]);
    }

    #[test]
    fn flux2_combines_tag_and_next_byte() {
        let mut data = vec![0x03u8, 0xAB]; // (0x03 << 8) + 0xAB
        data.extend_from_slice(&oob_eof());
        let parsed = parse_stream(&data).unwrap();
        assert_eq!(parsed.flux_trans_abs, vec![0x03AB]);
    }

    #[test]
    fn info_block_parses_key_value_pairs() {
        let mut data = oob_info("sck=24027428.5714, ick=3003428.5714");
        data.extend_from_slice(&oob_eof());
        let parsed = parse_stream(&data).unwrap();
        assert_eq!(parsed.info.get("sck").unwrap(), "24027428.5714");
    }

    #[test]
    fn unterminated_info_is_an_error() {
        let mut out = vec![0x0d, 0x04, 0x03, 0x00];
        out.extend_from_slice(b"abc"); // no NUL terminator
        assert!(matches!(parse_stream(&out), Err(FluxError::UnterminatedInfo)));
    }

    #[test]
    fn unknown_oob_kind_is_an_error() {
        let out = vec![0x0d, 0xFE, 0x00, 0x00];
        assert!(matches!(parse_stream(&out), Err(FluxError::UnknownOob(0xFE))));
    }

    #[test]
    fn ovl16_adds_to_next_flux_cell() {
        let mut data = vec![0x0bu8, 0x0eu8]; // overflow, then Flux1 cell=0x0e
        data.extend_from_slice(&oob_eof());
        let parsed = parse_stream(&data).unwrap();
        assert_eq!(parsed.flux_trans_abs, vec![0x10000 + 0x0e]);
    }
}
