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

    src/error.rs

    Error types for the flux-to-sectors recovery pipeline.
*/
use thiserror::Error;

/// Errors raised anywhere in the flux capture → sector pipeline.
///
/// Fatal variants (see spec §7) abort the whole run; the rest are recorded against
/// a single candidate ID/data field and the decoder moves on.
#[derive(Debug, Error)]
pub enum FluxError {
    #[error("an I/O error occurred reading or writing a file: {0}")]
    Io(String),

    #[error("bad magic number in capture container")]
    BadMagic,

    #[error("capture container was truncated before the expected byte count")]
    TruncatedRead,

    #[error("unknown out-of-band block kind {0:#04x} in KryoFlux stream")]
    UnknownOob(u8),

    #[error("KryoFlux Info OOB block text was not NUL-terminated")]
    UnterminatedInfo,

    #[error("capture container format is not recognized or not supported")]
    UnsupportedFormat,

    #[error("ID field CRC did not validate")]
    BadIdCrc,

    #[error("DATA field CRC did not validate")]
    BadDataCrc,

    #[error("ID field declared a track that did not match the block being decoded")]
    WrongTrack,

    #[error("ID field declared a head that did not match the block being decoded")]
    WrongHead,

    #[error("ID field declared a sector size outside the modulation's accepted set")]
    UnexpectedSize,

    #[error("no DATA or DELETED DATA address mark followed the ID field within tolerance")]
    MissingDataMark,

    #[error("required index address mark was not found on the track")]
    NoIndexMark,

    #[error("duplicate sector (same mode/coordinate) written to the image")]
    DuplicateSector,

    #[error("invalid sector size for the ImageDisk container")]
    InvalidSectorSize,

    #[error("track contains sectors with mixed ImageDisk modes")]
    MixedModeTrack,

    #[error("parameter error: {0}")]
    Parameter(String),
}

impl From<std::io::Error> for FluxError {
    fn from(err: std::io::Error) -> Self {
        FluxError::Io(err.to_string())
    }
}

impl From<binrw::Error> for FluxError {
    fn from(err: binrw::Error) -> Self {
        FluxError::Io(err.to_string())
    }
}

pub type FluxResult<T> = Result<T, FluxError>;
