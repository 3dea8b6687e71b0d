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

    src/flux/dfi.rs

    DiscFerret DFI capture container. http://www.discferret.com/wiki/DFI_image_format
*/
use binrw::{binrw, BinRead};
use std::io::Cursor;

use crate::chs::DiskChs;
use crate::error::{FluxError, FluxResult};
use crate::flux::{FluxBlock, FluxImage};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DfiVersion {
    V1,
    V2,
}

#[binrw]
#[brw(big)]
#[derive(Debug)]
struct DfiBlockHeader {
    cylinder: u16,
    head: u16,
    sector: u16,
    data_len: u32,
}

/// Default sample frequency used when the caller doesn't override it via `-f`.
pub const DEFAULT_FREQUENCY_HZ: f64 = 25.0e6;

fn parse_v1(data: &[u8]) -> Vec<u64> {
    let mut time_inc: u64 = 0;
    let mut abs = Vec::new();
    for &b in data {
        if (b & 0x7f) == 0x00 {
            time_inc += 127;
        } else {
            time_inc += (b & 0x7f) as u64;
            abs.push(time_inc);
        }
    }
    abs
}

/// Returns (transition times, index-pulse times).
fn parse_v2(data: &[u8]) -> (Vec<u64>, Vec<u64>) {
    let mut time_inc: u64 = 0;
    let mut abs = Vec::new();
    let mut index_pos = Vec::new();
    for &b in data {
        if (b & 0x7f) == 0x00 {
            // Observed idle byte; carries no time information.
            continue;
        }
        if (b & 0x7f) == 0x7f {
            time_inc += 127;
        } else if (b & 0x80) != 0 {
            time_inc += (b & 0x7f) as u64;
            index_pos.push(time_inc);
        } else {
            time_inc += (b & 0x7f) as u64;
            abs.push(time_inc);
        }
    }
    (abs, index_pos)
}

/// Reads a DFI capture container. `frequency_hz` overrides the nominal 25MHz
/// sample rate (the `-f` CLI flag applies only to this format).
pub fn read(bytes: &[u8], frequency_hz: f64) -> FluxResult<FluxImage> {
    if bytes.len() < 4 {
        return Err(FluxError::TruncatedRead);
    }
    let version = match &bytes[0..4] {
        b"DFER" => DfiVersion::V1,
        b"DFE2" => DfiVersion::V2,
        _ => return Err(FluxError::BadMagic),
    };
    log::trace!("Detected DFI container, version {:?}.", version);

    let mut cursor = Cursor::new(&bytes[4..]);
    let mut image = FluxImage::new();

    loop {
        let header = match DfiBlockHeader::read(&mut cursor) {
            Ok(h) => h,
            Err(_) => break, // clean EOF between blocks
        };
        let start = cursor.position() as usize;
        let end = start
            .checked_add(header.data_len as usize)
            .ok_or(FluxError::TruncatedRead)?;
        let remaining: &[u8] = cursor.get_ref();
        if end > remaining.len() {
            return Err(FluxError::TruncatedRead);
        }
        let data = &remaining[start..end];
        cursor.set_position(end as u64);

        let (flux_trans_abs, index_pos) = match version {
            DfiVersion::V1 => (parse_v1(data), Vec::new()),
            DfiVersion::V2 => parse_v2(data),
        };

        let chs = DiskChs::new(header.cylinder, header.head as u8, header.sector as u8);
        log::trace!(
            "DFI block {} : {} transitions, {} index pulses",
            chs,
            flux_trans_abs.len(),
            index_pos.len()
        );
        image.insert(
            chs,
            FluxBlock {
                chs,
                frequency_hz,
                flux_trans_abs,
                index_pos,
                revolutions: 1,
            },
        );
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_bytes(cylinder: u16, head: u16, sector: u16, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&cylinder.to_be_bytes());
        out.extend_from_slice(&head.to_be_bytes());
        out.extend_from_slice(&sector.to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"NOPE".to_vec();
        assert!(matches!(read(&bytes, DEFAULT_FREQUENCY_HZ), Err(FluxError::BadMagic)));
    }

    #[test]
    fn v1_zero_byte_carries_127() {
        let mut bytes = b"DFER".to_vec();
        // 0x00 (+127), then 0x05 (transition at 132)
        bytes.extend_from_slice(&block_bytes(0, 0, 1, &[0x00, 0x05]));
        let image = read(&bytes, DEFAULT_FREQUENCY_HZ).unwrap();
        let block = &image[&DiskChs::new(0, 0, 1)];
        assert_eq!(block.flux_trans_abs, vec![132]);
    }

    #[test]
    fn v2_high_bit_records_index_not_transition() {
        let mut bytes = b"DFE2".to_vec();
        // 0x85 -> high bit set, low7=5: index pulse at 5, no transition recorded
        bytes.extend_from_slice(&block_bytes(1, 0, 1, &[0x85, 0x03]));
        let image = read(&bytes, DEFAULT_FREQUENCY_HZ).unwrap();
        let block = &image[&DiskChs::new(1, 0, 1)];
        assert_eq!(block.index_pos, vec![5]);
        assert_eq!(block.flux_trans_abs, vec![8]);
    }

    #[test]
    fn truncated_block_is_an_error() {
        let mut bytes = b"DFER".to_vec();
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&100u32.to_be_bytes()); // claims 100 bytes, provides none
        assert!(matches!(read(&bytes, DEFAULT_FREQUENCY_HZ), Err(FluxError::TruncatedRead)));
    }
}
