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

    src/track.rs

    Track decoding: runs the ADPLL across a flux block, demodulates the
    resulting channel-bit string, and assembles a per-track sector set by
    locating and CRC-validating ID and DATA fields (spec section 4.5).
*/
use crate::bitstream::ChannelBits;
use crate::chs::DiskCh;
use crate::crc::{CrcEngine, CrcParams};
use crate::error::{FluxError, FluxResult};
use crate::flux::FluxBlock;
use crate::modulation::ModulationDescriptor;
use crate::pll::{Adpll, AdpllTuning};

/// A single decoded sector, ready to hand to the ImageDisk writer.
#[derive(Clone, Debug)]
pub struct Sector {
    pub mode: u8,
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
    pub deleted: bool,
    pub size_code: u8,
    pub data: Vec<u8>,
}

/// The sectors recovered from one track, in the order they were found.
/// A sector number only ever appears once: the first valid decode wins.
#[derive(Clone, Debug, Default)]
pub struct TrackAssembly {
    sectors: Vec<Sector>,
}

impl TrackAssembly {
    pub fn push(&mut self, sector: Sector) {
        self.sectors.push(sector);
    }

    pub fn contains(&self, sector_num: u8) -> bool {
        self.sectors.iter().any(|s| s.sector == sector_num)
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }
}

/// Runs the ADPLL across `block`'s flux deltas and decodes its sectors.
///
/// `bit_rate_kbps` is nominally `modulation.default_bit_rate_kbps`, but the
/// caller may override it (spec §6 `-b`) for media recorded off-spec.
///
/// Returns an empty assembly (not an error) when the block carries no flux
/// transitions at all; `NoIndexMark` is the only error this function itself
/// raises.
pub fn decode_track(
    block: &FluxBlock,
    modulation: &ModulationDescriptor,
    bit_rate_kbps: f64,
    expected: DiskCh,
    require_index_mark: bool,
) -> FluxResult<TrackAssembly> {
    let bit_rate_hz = bit_rate_kbps * 1000.0;
    let osc_period = 1.0 / (2.0 * bit_rate_hz);
    let Some(pll) = Adpll::new(block.delta_iter(), osc_period, AdpllTuning::default()) else {
        return Ok(TrackAssembly::default());
    };
    let bits = ChannelBits::from_bits(pll.collect::<Vec<u8>>());
    decode_bits(&bits, modulation, expected, require_index_mark)
}

/// The channel-bit-level half of track decoding, split out from [`decode_track`]
/// so it can be driven directly from a handcrafted bit stream in tests.
pub fn decode_bits(
    bits: &ChannelBits,
    modulation: &ModulationDescriptor,
    expected: DiskCh,
    require_index_mark: bool,
) -> FluxResult<TrackAssembly> {
    if require_index_mark {
        if let Some(mark) = &modulation.index_address_mark {
            if bits.find_first_from(mark, 0).is_none() {
                return Err(FluxError::NoIndexMark);
            }
        }
    }

    let crc_params = modulation.crc_params();
    let mut assembly = TrackAssembly::default();

    for p in bits.find_all(&modulation.id_address_mark) {
        if let Some(sector) = try_decode_sector(bits, p, modulation, expected, &crc_params, &assembly) {
            assembly.push(sector);
        }
    }

    Ok(assembly)
}

fn crc_ok(bytes: &[u8], mark_bytes: usize, modulation: &ModulationDescriptor, params: &CrcParams) -> bool {
    let mut engine = CrcEngine::new(*params);
    if modulation.crc_includes_address_mark {
        engine.compute_bytes(bytes);
    } else {
        engine.compute_bytes(&bytes[mark_bytes..]);
    }
    engine.get() == 0
}

/// (track, head, sector number, size code).
fn parse_id_fields(id: &[u8], modulation: &ModulationDescriptor) -> (u16, u8, u8, u8) {
    if modulation.id_field_len == 2 {
        let track = id[0] as u16;
        let byte1 = id[1];
        let sector = byte1 & 0x7f;
        let head = if byte1 & 0x80 != 0 { 1 } else { 0 };
        (track, head, sector, 1) // HP M2FM sectors are always 256 bytes (size code 1).
    } else {
        (id[0] as u16, id[1], id[2], id[3])
    }
}

fn try_decode_sector(
    bits: &ChannelBits,
    p: usize,
    modulation: &ModulationDescriptor,
    expected: DiskCh,
    crc_params: &CrcParams,
    assembly: &TrackAssembly,
) -> Option<Sector> {
    let mark_bits = modulation.id_address_mark.len();
    let mark_bytes = mark_bits / 16;
    let id_total_bits = mark_bits + 16 * (modulation.id_field_len as usize + 2);
    let id_bytes = bits.decode_range(p, id_total_bits, modulation.lsb_first)?;

    if !crc_ok(&id_bytes, mark_bytes, modulation, crc_params) {
        log::debug!("ID field at bit {p} failed CRC, discarding");
        return None;
    }

    let id_fields = &id_bytes[mark_bytes..mark_bytes + modulation.id_field_len as usize];
    let (track, head, sector_num, size_code) = parse_id_fields(id_fields, modulation);

    if head != expected.h() {
        log::debug!("ID field at bit {p}: head {head} != expected {}", expected.h());
        return None;
    }
    if track != expected.c() {
        log::debug!("ID field at bit {p}: track {track} != expected {}", expected.c());
        return None;
    }
    let size_bytes = 128usize << size_code;
    if !modulation.expected_sector_sizes.contains(&size_bytes) {
        log::debug!("ID field at bit {p}: sector size {size_bytes} not accepted by this modulation");
        return None;
    }
    if assembly.contains(sector_num) {
        log::trace!("sector {sector_num} already decoded, ignoring duplicate ID at bit {p}");
        return None;
    }

    let id_end = p + id_total_bits;
    let half_bits = modulation.id_to_data_half_bits as i64;
    let window_lo = p as i64 + half_bits - 50;
    let window_hi = p as i64 + half_bits + 50;

    let mut best: Option<(usize, bool)> = None;
    if let Some(off) = bits.find_first_from(&modulation.data_address_mark, id_end) {
        if (off as i64) >= window_lo && (off as i64) <= window_hi {
            best = Some((off, false));
        }
    }
    if let Some(deleted_mark) = &modulation.deleted_data_address_mark {
        if let Some(off) = bits.find_first_from(deleted_mark, id_end) {
            let within_window = (off as i64) >= window_lo && (off as i64) <= window_hi;
            let earlier_than_current_best = best.map_or(true, |(b, _)| off < b);
            if within_window && earlier_than_current_best {
                best = Some((off, true));
            }
        }
    }
    let Some((data_off, deleted)) = best else {
        log::debug!("ID field at bit {p}: no DATA mark within tolerance window, abandoning");
        return None;
    };

    let data_mark = if deleted {
        modulation.deleted_data_address_mark.as_ref().unwrap()
    } else {
        &modulation.data_address_mark
    };
    let data_mark_bytes = data_mark.len() / 16;
    let payload_total_bits = data_mark.len() + 16 * (size_bytes + 2);
    let payload_bytes = bits.decode_range(data_off, payload_total_bits, modulation.lsb_first)?;

    if !crc_ok(&payload_bytes, data_mark_bytes, modulation, crc_params) {
        log::debug!("DATA field at bit {data_off} failed CRC, discarding");
        return None;
    }

    Some(Sector {
        mode: modulation.imagedisk_mode,
        cylinder: track,
        head,
        sector: sector_num,
        deleted,
        size_code,
        data: payload_bytes[data_mark_bytes..data_mark_bytes + size_bytes].to_vec(),
    })
}
