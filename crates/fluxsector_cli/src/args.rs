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

    src/args.rs

    Command-line surface: one flux capture in, one ImageDisk image out.
*/
use std::path::PathBuf;
use std::str::FromStr;

use bpaf::{construct, long, positional, short, Parser};
use fluxsector::ModulationKind;

#[derive(Debug, Clone, Copy)]
pub enum FluxFormat {
    Dfi,
    Ksf,
    Scp,
}

impl FromStr for FluxFormat {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "dfi" => Ok(FluxFormat::Dfi),
            "ksf" => Ok(FluxFormat::Ksf),
            "scp" => Ok(FluxFormat::Scp),
            _ => Err("Invalid flux format; expected 'dfi', 'ksf', or 'scp'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppParams {
    pub flux_image: PathBuf,
    pub imagedisk_image: PathBuf,
    pub flux_format: FluxFormat,
    pub modulation: ModulationKind,
    pub sides: u8,
    pub tracks: u16,
    pub frequency_mhz: f64,
    pub bit_rate_kbps: Option<f64>,
    pub require_index_mark: bool,
    pub verbose: bool,
    pub verify: bool,
}

fn modulation_parser() -> impl Parser<ModulationKind> {
    let fm = long("fm").help("FM modulation, IBM 3740 single density").switch();
    let mfm = long("mfm").help("MFM modulation, IBM System/34 double density").switch();
    let intel_m2fm = long("intelm2fm")
        .help("M2FM modulation, Intel MDS SBC 202 double density")
        .switch();
    let hp_m2fm = long("hpm2fm")
        .help("M2FM modulation, HP 7902/9885/9895 double density")
        .switch();

    construct!(fm, mfm, intel_m2fm, hp_m2fm).map(|(fm, mfm, intel_m2fm, hp_m2fm)| {
        // At most one of these is expected to be set; the first one set wins,
        // and an all-false selection is the documented FM default.
        if mfm {
            ModulationKind::Mfm
        } else if intel_m2fm {
            ModulationKind::IntelM2Fm
        } else if hp_m2fm {
            ModulationKind::HpM2Fm
        } else {
            let _ = fm;
            ModulationKind::Fm
        }
    })
}

fn flux_format_parser() -> impl Parser<FluxFormat> {
    short('F')
        .long("flux-format")
        .help("Flux capture container format: dfi, ksf, or scp")
        .argument::<FluxFormat>("FORMAT")
        .fallback(FluxFormat::Dfi)
}

fn sides_parser() -> impl Parser<u8> {
    short('s')
        .long("sides")
        .help("Number of sides to recover")
        .argument::<u8>("SIDES")
        .guard(|&sides| sides == 1 || sides == 2, "Sides must be either 1 or 2")
        .fallback(1)
        .display_fallback()
}

fn tracks_parser() -> impl Parser<u16> {
    short('t')
        .long("tracks")
        .help("Number of tracks to recover")
        .argument::<u16>("TRACKS")
        .fallback(77)
        .display_fallback()
}

fn frequency_parser() -> impl Parser<f64> {
    short('f')
        .long("frequency")
        .help("DiscFerret sample rate in MHz; ignored for other flux formats")
        .argument::<f64>("MHZ")
        .fallback(25.0)
        .display_fallback()
}

fn bit_rate_parser() -> impl Parser<Option<f64>> {
    short('b')
        .long("bit-rate")
        .help("Override the modulation's nominal bit rate, in Kbps")
        .argument::<f64>("KBPS")
        .optional()
}

fn index_parser() -> impl Parser<bool> {
    long("index").help("Require tracks to carry an index address mark").switch()
}

fn verbose_parser() -> impl Parser<bool> {
    short('v').long("verbose").help("Print a per-track sector recovery summary").switch()
}

fn verify_parser() -> impl Parser<bool> {
    long("verify")
        .help("Read the written ImageDisk image back and confirm its sector counts match")
        .switch()
}

pub fn app_params_parser() -> impl Parser<AppParams> {
    let flux_image = positional::<PathBuf>("FLUX_IMAGE").help("Path to the raw flux capture to recover");
    let imagedisk_image = positional::<PathBuf>("IMAGEDISK_IMAGE").help("Path to write the recovered ImageDisk image");
    let flux_format = flux_format_parser();
    let modulation = modulation_parser();
    let sides = sides_parser();
    let tracks = tracks_parser();
    let frequency_mhz = frequency_parser();
    let bit_rate_kbps = bit_rate_parser();
    let require_index_mark = index_parser();
    let verbose = verbose_parser();
    let verify = verify_parser();

    construct!(AppParams {
        flux_image,
        imagedisk_image,
        flux_format,
        modulation,
        sides,
        tracks,
        frequency_mhz,
        bit_rate_kbps,
        require_index_mark,
        verbose,
        verify,
    })
    .to_options()
    .descr("Recovers an ImageDisk (IMD) sector image from a raw flux capture.")
}
