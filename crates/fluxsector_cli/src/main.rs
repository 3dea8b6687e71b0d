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
*/

mod args;

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Error};
use bpaf::Parser;

use fluxsector::chs::DiskCh;
use fluxsector::flux::dfi;
use fluxsector::flux::kfsf::KfsfReader;
use fluxsector::flux::scp::ScpReader;
use fluxsector::flux::{FluxImage, FluxReader};
use fluxsector::imd::{read_imd, write_imd};
use fluxsector::orchestrator::{recover_disk, RecoveryScope};
use fluxsector::track::Sector;

use crate::args::{app_params_parser, AppParams, FluxFormat};

fn main() -> Result<(), Error> {
    env_logger::init();

    let params = app_params_parser().run();

    match run(&params) {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("recovery failed: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("caused by: {cause}");
            }
            std::process::exit(1);
        }
    }
}

fn run(params: &AppParams) -> Result<(), Error> {
    let bytes = std::fs::read(&params.flux_image)
        .with_context(|| format!("reading flux capture {}", params.flux_image.display()))?;

    let image = read_flux_image(params, &bytes)?;

    let modulation = params.modulation.descriptor();
    if modulation.index_address_mark.is_none() && params.require_index_mark {
        log::warn!("--index ignored, as {} doesn't use an index address mark", modulation.kind);
    }
    let require_index_mark = params.require_index_mark && modulation.index_address_mark.is_some();

    let scope = RecoveryScope {
        tracks: params.tracks,
        sides: params.sides,
        bit_rate_kbps: params.bit_rate_kbps,
        require_index_mark,
    };

    let (tracks, report) = recover_disk(&image, &modulation, &scope).context("recovering sectors from flux image")?;

    if params.verbose {
        for summary in &report.tracks {
            if params.sides > 1 {
                println!("track {:2} side {}: {}", summary.ch.c(), summary.ch.h(), summary.markers);
            } else {
                println!("track {:2}: {}", summary.ch.c(), summary.markers);
            }
        }
    }

    let timestamp = format_imd_timestamp(SystemTime::now());
    let imd_bytes = write_imd(&tracks, &timestamp, None).context("assembling ImageDisk image")?;
    std::fs::write(&params.imagedisk_image, &imd_bytes)
        .with_context(|| format!("writing {}", params.imagedisk_image.display()))?;

    if params.verify {
        verify_written_image(&imd_bytes, &tracks)?;
        println!("verified: recovered sector counts match the written image");
    }

    println!(
        "{} data sectors, {} deleted data sectors, {} bad sectors, out of {}",
        report.data_sectors, report.deleted_sectors, report.bad_sectors, report.total_sectors
    );

    Ok(())
}

fn read_flux_image(params: &AppParams, bytes: &[u8]) -> Result<FluxImage, Error> {
    match params.flux_format {
        FluxFormat::Dfi => {
            let frequency_hz = params.frequency_mhz * 1.0e6;
            dfi::read(bytes, frequency_hz).map_err(Error::from)
        }
        FluxFormat::Ksf => KfsfReader::read(bytes).map_err(Error::from),
        FluxFormat::Scp => ScpReader::read(bytes).map_err(Error::from),
    }
}

/// Reads the just-written image back and confirms every track has the same
/// sector count as what was recovered, catching a writer/reader mismatch that
/// CRC validation during recovery wouldn't.
fn verify_written_image(imd_bytes: &[u8], written: &BTreeMap<DiskCh, Vec<Sector>>) -> Result<(), Error> {
    let read_back = read_imd(imd_bytes).context("re-reading the written ImageDisk image")?;
    for (ch, sectors) in written {
        let Some(reread) = read_back.get(ch) else {
            bail!("track {ch} present in recovery but missing from the written image");
        };
        if reread.len() != sectors.len() {
            bail!(
                "track {ch}: wrote {} sectors but read back {} from the image",
                sectors.len(),
                reread.len()
            );
        }
    }
    Ok(())
}

/// Formats a UNIX timestamp as `DD/MM/YYYY HH:MM:SS`, the literal format the
/// ImageDisk header requires. No crate in this workspace's dependency tree
/// does calendar arithmetic, so this converts days-since-epoch to a civil
/// date using Howard Hinnant's well-known proleptic Gregorian algorithm
/// rather than pull in a dependency for one timestamp string.
fn format_imd_timestamp(now: SystemTime) -> String {
    let secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let days = secs.div_euclid(86_400);
    let time_of_day = secs.rem_euclid(86_400);

    let (year, month, day) = civil_from_days(days);
    let hh = time_of_day / 3600;
    let mm = (time_of_day % 3600) / 60;
    let ss = time_of_day % 60;

    format!("{day:02}/{month:02}/{year:04} {hh:02}:{mm:02}:{ss:02}")
}

/// <http://howardhinnant.github.io/date_algorithms.html#civil_from_days>
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32; // [1, 31]
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32; // [1, 12]
    (if m <= 2 { y + 1 } else { y }, m, d)
}
