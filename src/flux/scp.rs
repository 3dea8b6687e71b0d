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

    src/flux/scp.rs

    SuperCard Pro (SCP) capture container.
*/
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::{binrw, BinRead};

use crate::chs::DiskChs;
use crate::error::{FluxError, FluxResult};
use crate::flux::{FluxBlock, FluxImage, FluxReader};

#[binrw]
#[brw(little)]
#[derive(Debug)]
struct ScpHeader {
    id: [u8; 3],
    version: u8,
    disk_type: u8,
    revolutions: u8,
    start_track: u8,
    end_track: u8,
    flags: u8,
    width: u8,
    head_cfg: i8,
    freq_divider: u8,
    checksum: u32,
}

#[binrw]
#[brw(little)]
#[derive(Debug)]
struct ScpTrackHeader {
    id: [u8; 3],
    track_number: u8,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Copy, Clone)]
struct ScpRevolution {
    duration: u32,
    length: u32,
    data_offset: u32,
}

/// `(heads, main_head)` per the `head_cfg` byte: -1 both sides, 0 side 0 only,
/// 1 side 1 only.
fn head_layout(head_cfg: i8) -> FluxResult<(u8, u8)> {
    match head_cfg {
        -1 => Ok((2, 0)),
        0 => Ok((1, 0)),
        1 => Ok((1, 1)),
        other => Err(FluxError::Parameter(format!("unsupported SCP head_cfg byte {other}"))),
    }
}

pub struct ScpReader;

impl FluxReader for ScpReader {
    fn read(bytes: &[u8]) -> FluxResult<FluxImage> {
        let mut cursor = Cursor::new(bytes);
        let header = ScpHeader::read(&mut cursor).map_err(|_| FluxError::TruncatedRead)?;
        if header.id != *b"SCP" {
            return Err(FluxError::BadMagic);
        }
        log::trace!(
            "Detected SCP container, version {:X}, tracks {}..={}",
            header.version,
            header.start_track,
            header.end_track
        );

        let (heads, main_head) = head_layout(header.head_cfg)?;
        let frequency_hz = 40.0e6 / (header.freq_divider as f64 + 1.0);
        log::trace!("SCP sample frequency: {frequency_hz}Hz");

        let mut track_ptrs: HashMap<u8, u32> = HashMap::new();
        for track in header.start_track..=header.end_track {
            let ptr: u32 = read_u32_le(&mut cursor)?;
            track_ptrs.insert(track, ptr);
            if heads == 1 {
                // Second table slot exists on disk for this head layout but is
                // not addressed by anything downstream; consume it in place.
                let _: u32 = read_u32_le(&mut cursor)?;
            }
        }

        let mut image = FluxImage::new();
        for track in header.start_track..=header.end_track {
            let cylinder = (track / heads) as u16;
            let head = main_head + (track % heads);
            let chs = DiskChs::new(cylinder, head, 1);

            let ptr = track_ptrs[&track];
            if ptr != 0 {
                let block = read_track_block(bytes, ptr, header.revolutions, frequency_hz, chs)?;
                image.insert(chs, block);
            } else if heads != 1 {
                image.insert(
                    chs,
                    FluxBlock {
                        chs,
                        frequency_hz,
                        flux_trans_abs: vec![0],
                        index_pos: vec![0],
                        revolutions: header.revolutions as u32,
                    },
                );
            }
        }

        Ok(image)
    }

    fn capabilities() -> crate::flux::FormatCaps {
        crate::flux::FormatCaps::CAP_MULTI_REVOLUTION
            | crate::flux::FormatCaps::CAP_INDEX_MARKS
            | crate::flux::FormatCaps::CAP_DUAL_SIDED
    }
}

fn read_u32_le<R: Read>(r: &mut R) -> FluxResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|_| FluxError::TruncatedRead)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_track_block(
    bytes: &[u8],
    offset: u32,
    revolutions: u8,
    frequency_hz: f64,
    chs: DiskChs,
) -> FluxResult<FluxBlock> {
    let mut cursor = Cursor::new(bytes);
    cursor
        .seek(SeekFrom::Start(offset as u64))
        .map_err(|_| FluxError::TruncatedRead)?;

    let track_header = ScpTrackHeader::read(&mut cursor).map_err(|_| FluxError::TruncatedRead)?;
    if track_header.id != *b"TRK" {
        return Err(FluxError::BadMagic);
    }

    let mut revs = Vec::with_capacity(revolutions as usize);
    for _ in 0..revolutions {
        revs.push(ScpRevolution::read(&mut cursor).map_err(|_| FluxError::TruncatedRead)?);
    }

    let mut flux_trans_abs = Vec::new();
    let mut index_pos = Vec::new();
    let mut time_inc: u64 = 0;
    for rev in &revs {
        for _ in 0..rev.length {
            let mut buf = [0u8; 2];
            cursor.read_exact(&mut buf).map_err(|_| FluxError::TruncatedRead)?;
            time_inc += u16::from_be_bytes(buf) as u64;
            flux_trans_abs.push(time_inc);
        }
        if rev.length > 0 {
            index_pos.push(time_inc);
        }
    }

    log::trace!(
        "SCP track {} at {}: {} transitions across {} revolution(s)",
        chs,
        offset,
        flux_trans_abs.len(),
        revolutions
    );

    Ok(FluxBlock {
        chs,
        frequency_hz,
        flux_trans_abs,
        index_pos,
        revolutions: revolutions as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_scp(revolutions: u8, samples: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"SCP");
        out.push(0x19); // version
        out.push(0x00); // disk_type
        out.push(revolutions);
        out.push(0); // start_track
        out.push(0); // end_track
        out.push(0); // flags
        out.push(0); // width
        out.push(0); // head_cfg: side 0 only -> heads=1
        out.push(0); // freq_divider -> 40MHz
        out.extend_from_slice(&0u32.to_le_bytes()); // checksum

        let header_len = out.len();
        let ptr_table_entries = 2usize; // heads==1 -> 2 u32 slots for the single track
        let track_offset = header_len + ptr_table_entries * 4;
        out.extend_from_slice(&(track_offset as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // unused second slot

        out.extend_from_slice(b"TRK");
        out.push(0); // track_number
        for _ in 0..revolutions {
            out.extend_from_slice(&0u32.to_le_bytes()); // duration
            out.extend_from_slice(&(samples.len() as u32).to_le_bytes()); // length
            out.extend_from_slice(&0u32.to_le_bytes()); // data_offset (unused)
        }
        for _ in 0..revolutions {
            for s in samples {
                out.extend_from_slice(&s.to_be_bytes());
            }
        }
        out
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"NOPE".to_vec();
        assert!(matches!(ScpReader::read(&bytes), Err(FluxError::TruncatedRead) | Err(FluxError::BadMagic)));
    }

    #[test]
    fn single_revolution_accumulates_absolute_times() {
        let bytes = minimal_scp(1, &[100, 200, 50]);
        let image = ScpReader::read(&bytes).unwrap();
        let block = &image[&DiskChs::new(0, 0, 1)];
        assert_eq!(block.flux_trans_abs, vec![100, 300, 350]);
        assert_eq!(block.index_pos, vec![350]);
    }

    #[test]
    fn frequency_derives_from_divider() {
        let bytes = minimal_scp(1, &[1]);
        let image = ScpReader::read(&bytes).unwrap();
        let block = &image[&DiskChs::new(0, 0, 1)];
        assert!((block.frequency_hz - 40.0e6).abs() < 1.0);
    }
}
