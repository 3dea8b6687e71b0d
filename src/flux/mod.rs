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

    src/flux/mod.rs

    The common flux-block data model produced by all three capture-container
    readers, and the trait each implements.
*/
pub mod dfi;
pub mod kfsf;
pub mod scp;

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::chs::DiskChs;
use crate::error::FluxResult;

bitflags! {
    /// What a flux capture container is capable of recording, independent of
    /// what any particular capture actually used. Not consulted by the
    /// decoder itself; exposed for callers choosing between formats.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FormatCaps: u32 {
        /// Multiple revolutions of the same track were captured.
        const CAP_MULTI_REVOLUTION = 0b0000_0001;
        /// Index pulse positions are recorded alongside the flux transitions.
        const CAP_INDEX_MARKS      = 0b0000_0010;
        /// Both disk sides were captured.
        const CAP_DUAL_SIDED       = 0b0000_0100;
    }
}

/// A per-(cylinder, head) recording: the raw transition times, the sample
/// frequency used to scale them, and any index-pulse positions observed
/// during capture. Immutable once built by a reader.
#[derive(Clone, Debug)]
pub struct FluxBlock {
    pub chs: DiskChs,
    /// Sample clock in Hz; absolute transition times are integer tick counts
    /// against this clock.
    pub frequency_hz: f64,
    /// Absolute transition times, strictly increasing, in sample ticks.
    pub flux_trans_abs: Vec<u64>,
    /// Absolute tick positions of observed index pulses, if any.
    pub index_pos: Vec<u64>,
    pub revolutions: u32,
}

impl FluxBlock {
    /// The per-transition delta times in seconds, as consumed by the ADPLL.
    /// There is one fewer delta than there are absolute transitions.
    pub fn delta_iter(&self) -> impl Iterator<Item = f64> + '_ {
        let freq = self.frequency_hz;
        self.flux_trans_abs.windows(2).map(move |w| (w[1] - w[0]) as f64 / freq)
    }
}

/// Keyed by (cylinder, head, sector); for soft-sectored media (the only kind
/// this pipeline supports) the sector component of the key is always 1.
pub type FluxImage = BTreeMap<DiskChs, FluxBlock>;

/// A capture-container parser: raw file bytes in, a flux image out.
pub trait FluxReader {
    fn read(bytes: &[u8]) -> FluxResult<FluxImage>;

    /// What this container format is capable of recording, format-wide.
    fn capabilities() -> FormatCaps;
}
