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

    src/imd.rs

    The ImageDisk (IMD) sector container: the pipeline's only output format
    (see imagedisk.org, "IMD.TXT" chapter 6), plus a reader used to verify
    round-trips in tests.
*/
use std::collections::BTreeMap;

use binrw::{binrw, BinRead};
use regex::Regex;

use crate::chs::DiskCh;
use crate::error::{FluxError, FluxResult};
use crate::track::Sector;

pub const IMD_HEADER_REGEX: &str =
    r"(?s)IMD (?<v_major>\d)\.(?<v_minor>\d{2}) (?<day>\d{2})/(?<month>\d{2})/(?<year>\d{4}) (?<hh>\d{2}):(?<mm>\d{2}):(?<ss>\d{2})\r(?<comment>.*)?";

const ASCII_EOF: u8 = 0x1a;

pub fn size_code_to_bytes(code: u8) -> Option<usize> {
    match code {
        0 => Some(128),
        1 => Some(256),
        2 => Some(512),
        3 => Some(1024),
        4 => Some(2048),
        5 => Some(4096),
        _ => None,
    }
}

pub fn bytes_to_size_code(size: usize) -> Option<u8> {
    match size {
        128 => Some(0),
        256 => Some(1),
        512 => Some(2),
        1024 => Some(3),
        2048 => Some(4),
        4096 => Some(5),
        _ => None,
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Copy, Clone)]
struct ImdTrackHeader {
    mode: u8,
    cylinder: u8,
    head: u8,
    sector_count: u8,
    size_code: u8,
}

/// Writes an IMD image from a per-track sector set. `BTreeMap<DiskCh, _>`
/// already iterates in the `(cylinder, head)` order §6 requires.
///
/// `timestamp` must already be formatted `DD/MM/YYYY HH:MM:SS`; producing it
/// is the caller's concern, not this container's.
pub fn write_imd(tracks: &BTreeMap<DiskCh, Vec<Sector>>, timestamp: &str, comment: Option<&str>) -> FluxResult<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("IMD 1.18 {timestamp}\r").as_bytes());
    if let Some(c) = comment {
        out.extend_from_slice(c.as_bytes());
    }
    out.push(ASCII_EOF);

    for (&ch, sectors) in tracks {
        if sectors.is_empty() {
            continue;
        }
        write_track(&mut out, ch, sectors)?;
    }

    Ok(out)
}

fn write_track(out: &mut Vec<u8>, ch: DiskCh, sectors: &[Sector]) -> FluxResult<()> {
    let mode = sectors[0].mode;
    if sectors.iter().any(|s| s.mode != mode) {
        return Err(FluxError::MixedModeTrack);
    }

    let mut seen = std::collections::HashSet::with_capacity(sectors.len());
    if !sectors.iter().all(|s| seen.insert(s.sector)) {
        return Err(FluxError::DuplicateSector);
    }

    let size_codes: Vec<u8> = sectors.iter().map(|s| s.size_code).collect();
    let first_size = size_codes[0];
    let mixed = size_codes.iter().any(|&c| c != first_size);
    let size_code_byte = if mixed { 0xFF } else { first_size };

    out.push(mode);
    out.push(ch.c() as u8);
    out.push(ch.h());
    out.push(sectors.len() as u8);
    out.push(size_code_byte);

    for s in sectors {
        out.push(s.sector);
    }
    if mixed {
        for &code in &size_codes {
            out.push(code);
        }
    }

    for s in sectors {
        let size = size_code_to_bytes(s.size_code).ok_or(FluxError::InvalidSectorSize)?;
        if s.data.len() != size {
            return Err(FluxError::InvalidSectorSize);
        }
        let compressible = s.data.iter().all(|&b| b == s.data[0]);
        let marker = match (s.deleted, compressible) {
            (false, false) => 0x01,
            (false, true) => 0x02,
            (true, false) => 0x03,
            (true, true) => 0x04,
        };
        out.push(marker);
        if compressible {
            out.push(s.data[0]);
        } else {
            out.extend_from_slice(&s.data);
        }
    }

    Ok(())
}

/// Reads an IMD image back into per-track sector sets; used to verify the
/// writer round-trips, not exercised by the orchestrator itself.
pub fn read_imd(bytes: &[u8]) -> FluxResult<BTreeMap<DiskCh, Vec<Sector>>> {
    let header_end = bytes
        .iter()
        .position(|&b| b == ASCII_EOF)
        .ok_or(FluxError::TruncatedRead)?;
    let header_text = String::from_utf8_lossy(&bytes[..header_end]);
    if !Regex::new(IMD_HEADER_REGEX).unwrap().is_match(&header_text) {
        return Err(FluxError::BadMagic);
    }

    let mut cursor = std::io::Cursor::new(&bytes[header_end + 1..]);
    let mut tracks = BTreeMap::new();

    while let Ok(header) = ImdTrackHeader::read(&mut cursor) {
        let ch = DiskCh::new(header.cylinder as u16, header.head);
        let mut sector_numbers = vec![0u8; header.sector_count as usize];
        read_exact(&mut cursor, &mut sector_numbers)?;

        let size_codes: Vec<u8> = if header.size_code == 0xFF {
            let mut codes = vec![0u8; header.sector_count as usize];
            read_exact(&mut cursor, &mut codes)?;
            codes
        } else {
            vec![header.size_code; header.sector_count as usize]
        };

        let mut sectors = Vec::with_capacity(header.sector_count as usize);
        for (sector_num, size_code) in sector_numbers.iter().zip(size_codes.iter()) {
            let size = size_code_to_bytes(*size_code).ok_or(FluxError::InvalidSectorSize)?;
            let mut marker_buf = [0u8; 1];
            read_exact(&mut cursor, &mut marker_buf)?;
            let marker = marker_buf[0];

            let (deleted, data) = match marker {
                0x01 | 0x03 => {
                    let mut data = vec![0u8; size];
                    read_exact(&mut cursor, &mut data)?;
                    (marker == 0x03, data)
                }
                0x02 | 0x04 => {
                    let mut b = [0u8; 1];
                    read_exact(&mut cursor, &mut b)?;
                    (marker == 0x04, vec![b[0]; size])
                }
                other => return Err(FluxError::Parameter(format!("unsupported IMD sector data marker {other:#04x}"))),
            };

            sectors.push(Sector {
                mode: header.mode,
                cylinder: ch.c(),
                head: ch.h(),
                sector: *sector_num,
                deleted,
                size_code: *size_code,
                data,
            });
        }

        tracks.insert(ch, sectors);
    }

    Ok(tracks)
}

fn read_exact<R: std::io::Read>(r: &mut R, buf: &mut [u8]) -> FluxResult<()> {
    r.read_exact(buf).map_err(|_| FluxError::TruncatedRead)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(cylinder: u16, head: u8, sector: u8, deleted: bool, byte: u8) -> Sector {
        Sector {
            mode: 0x00,
            cylinder,
            head,
            sector,
            deleted,
            size_code: 0,
            data: vec![byte; 128],
        }
    }

    #[test]
    fn round_trips_a_single_track() {
        let mut tracks = BTreeMap::new();
        tracks.insert(
            DiskCh::new(0, 0),
            vec![sector(0, 0, 1, false, 0xE5), sector(0, 0, 2, true, 0x55)],
        );

        let bytes = write_imd(&tracks, "29/07/2026 12:00:00", None).unwrap();
        let read_back = read_imd(&bytes).unwrap();

        assert_eq!(read_back.len(), 1);
        let sectors = &read_back[&DiskCh::new(0, 0)];
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[0].sector, 1);
        assert!(!sectors[0].deleted);
        assert_eq!(sectors[0].data, vec![0xE5; 128]);
        assert_eq!(sectors[1].sector, 2);
        assert!(sectors[1].deleted);
    }

    #[test]
    fn compressible_sector_round_trips() {
        let mut tracks = BTreeMap::new();
        tracks.insert(DiskCh::new(1, 0), vec![sector(1, 0, 1, false, 0xF6)]);
        let bytes = write_imd(&tracks, "29/07/2026 12:00:00", None).unwrap();
        // Compressed marker (0x02) plus exactly one data byte, not 128.
        assert!(bytes.len() < 100);
        let read_back = read_imd(&bytes).unwrap();
        assert_eq!(read_back[&DiskCh::new(1, 0)][0].data, vec![0xF6; 128]);
    }

    #[test]
    fn mixed_mode_track_is_rejected() {
        let mut mismatched = sector(0, 0, 2, false, 0x00);
        mismatched.mode = 0x03;
        let mut tracks = BTreeMap::new();
        tracks.insert(DiskCh::new(0, 0), vec![sector(0, 0, 1, false, 0x00), mismatched]);
        assert!(matches!(write_imd(&tracks, "29/07/2026 12:00:00", None), Err(FluxError::MixedModeTrack)));
    }

    #[test]
    fn duplicate_sector_number_is_rejected() {
        let mut tracks = BTreeMap::new();
        tracks.insert(
            DiskCh::new(0, 0),
            vec![sector(0, 0, 1, false, 0x00), sector(0, 0, 1, false, 0x11)],
        );
        assert!(matches!(write_imd(&tracks, "29/07/2026 12:00:00", None), Err(FluxError::DuplicateSector)));
    }

    #[test]
    fn bad_header_is_rejected() {
        let mut bytes = b"NOT AN IMD HEADER".to_vec();
        bytes.push(ASCII_EOF);
        assert!(matches!(read_imd(&bytes), Err(FluxError::BadMagic)));
    }
}
