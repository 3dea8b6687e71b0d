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

    src/orchestrator.rs

    Drives track decoding across every (track, side) of a disk and assembles
    the results into the per-track sector sets the ImageDisk writer expects
    (spec section 4.6).
*/
use std::collections::BTreeMap;

use crate::chs::{DiskCh, DiskChs};
use crate::error::{FluxError, FluxResult};
use crate::flux::FluxImage;
use crate::modulation::ModulationDescriptor;
use crate::track::{decode_track, Sector, TrackAssembly};

/// Bounds and options for a whole-disk recovery run; the CLI surface (spec §6)
/// maps directly onto this.
#[derive(Clone, Debug)]
pub struct RecoveryScope {
    pub tracks: u16,
    pub sides: u8,
    /// Overrides `modulation.default_bit_rate_kbps` when `Some`.
    pub bit_rate_kbps: Option<f64>,
    pub require_index_mark: bool,
}

/// Per-track progress, used to render the `-v` marker line (`.` data,
/// `D` deleted, `*` missing) without forcing the caller to re-derive it.
#[derive(Clone, Debug)]
pub struct TrackSummary {
    pub ch: DiskCh,
    pub markers: String,
}

/// Tallies across the whole run, mirroring the counters the original recovery
/// tool prints on completion.
#[derive(Clone, Debug, Default)]
pub struct RecoveryReport {
    pub data_sectors: u32,
    pub deleted_sectors: u32,
    pub bad_sectors: u32,
    pub total_sectors: u32,
    pub tracks: Vec<TrackSummary>,
}

/// Walks every (track, side) in `scope`, decodes whatever flux block is
/// present, and returns the recovered sectors keyed by (cylinder, head) ready
/// for [`crate::imd::write_imd`], alongside a tally of the run.
///
/// A (track, side) with no corresponding block in `image` is treated like one
/// whose ADPLL produced no bits: every sector in the summary range counts as
/// bad, and no entry is written for that track. `scope.tracks`/`scope.sides`
/// bound the iteration; `modulation.default_first_sector`/
/// `default_sectors_per_track` bound only the summary range, matching how a
/// track carrying extra or renumbered sectors still has every decoded sector
/// written to the image even if it falls outside the summary window.
pub fn recover_disk(
    image: &FluxImage,
    modulation: &ModulationDescriptor,
    scope: &RecoveryScope,
) -> FluxResult<(BTreeMap<DiskCh, Vec<Sector>>, RecoveryReport)> {
    let bit_rate_kbps = scope.bit_rate_kbps.unwrap_or(modulation.default_bit_rate_kbps);
    let first_sector = modulation.default_first_sector;
    let sectors_per_track = modulation.default_sectors_per_track;

    let mut written: BTreeMap<DiskCh, Vec<Sector>> = BTreeMap::new();
    let mut report = RecoveryReport::default();

    for track_num in 0..scope.tracks {
        for side_num in 0..scope.sides {
            let ch = DiskCh::new(track_num, side_num);
            let assembly = match image.get(&DiskChs::from((ch, 1))) {
                Some(block) => match decode_track(block, modulation, bit_rate_kbps, ch, scope.require_index_mark) {
                    Ok(assembly) => assembly,
                    Err(FluxError::NoIndexMark) => {
                        log::warn!("track {track_num} side {side_num} has no index address mark, skipping");
                        TrackAssembly::default()
                    }
                    Err(e) => return Err(e),
                },
                None => {
                    log::warn!("no flux block present for track {track_num} side {side_num}");
                    TrackAssembly::default()
                }
            };

            let mut markers = String::with_capacity(sectors_per_track as usize);
            for sector_num in first_sector..(first_sector + sectors_per_track) {
                report.total_sectors += 1;
                match assembly.sectors().iter().find(|s| s.sector as u32 == sector_num) {
                    None => {
                        markers.push('*');
                        report.bad_sectors += 1;
                    }
                    Some(s) if s.deleted => {
                        markers.push('D');
                        report.deleted_sectors += 1;
                    }
                    Some(_) => {
                        markers.push('.');
                        report.data_sectors += 1;
                    }
                }
            }
            report.tracks.push(TrackSummary { ch, markers });

            if !assembly.is_empty() {
                written.insert(ch, assembly.sectors().to_vec());
            }
        }
    }

    Ok((written, report))
}
