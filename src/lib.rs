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

//! # fluxsector
//!
//! fluxsector recovers logical sector data from raw magnetic flux transition
//! recordings of vintage floppy disks, the kind produced by flux-level imaging
//! hardware such as the DiscFerret or KryoFlux.
//!
//! A flux capture is a per-(cylinder, head) stream of transition timestamps, not
//! bytes: the magnetic medium records *when* the flux reverses, not what those
//! reversals mean. Recovering sectors from it means walking the same pipeline a
//! floppy controller's analog front end would have walked in hardware:
//!
//! 1. An adaptive digital PLL ([`pll`]) locks onto the nominal bit-cell rate and
//!    turns transition deltas into a channel-bit stream.
//! 2. A [`modulation`] descriptor (FM, IBM MFM, Intel M2FM, or HP M2FM) defines
//!    the address-mark patterns and clock/data interleaving needed to pull data
//!    bits back out of the channel-bit stream ([`bitstream`]).
//! 3. [`track`] locates ID and DATA address marks, CRC-validates each field
//!    ([`crc`]), and assembles a per-track set of recovered sectors.
//! 4. [`imd`] writes the recovered sectors out as an ImageDisk (.IMD) container,
//!    the only output format this crate produces.
//!
//! [`flux`] holds the three supported capture-container readers (DiscFerret DFI,
//! KryoFlux stream, SuperCard Pro) behind a common [`flux::FluxReader`] trait,
//! and [`orchestrator`] drives the whole pipeline across every track and side of
//! a disk.
pub mod bitstream;
pub mod chs;
pub mod crc;
pub mod error;
pub mod flux;
pub mod imd;
pub mod modulation;
pub mod orchestrator;
pub mod pll;
pub mod track;

pub use crate::chs::{DiskCh, DiskChs};
pub use crate::error::{FluxError, FluxResult};
pub use crate::flux::{FluxBlock, FluxImage, FluxReader, FormatCaps};
pub use crate::modulation::{ModulationDescriptor, ModulationKind};
pub use crate::orchestrator::{recover_disk, RecoveryReport, RecoveryScope};
pub use crate::track::{Sector, TrackAssembly};
