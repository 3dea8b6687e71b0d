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

    src/crc.rs

    A parameterised CRC engine (Ross Williams' "Painless Guide to CRC Error
    Detection Algorithms" model: order, poly, init, xorout, refin, refout) with
    table-accelerated computation. Used both for the self-test vectors below and
    for the ID/DATA field CRC-16 validation in the track decoder (§4.5).
*/
use std::collections::HashMap;

/// Fixes the behaviour of a CRC register: bit width, polynomial, seed, final
/// XOR, and whether input/output are bit-reflected.
#[derive(Clone, Copy, Debug)]
pub struct CrcParams {
    pub name: &'static str,
    /// Register width in bits (order of the polynomial).
    pub order: u8,
    pub poly: u64,
    pub init: u64,
    pub xorout: u64,
    /// Reflect each input unit before ingesting it.
    pub refin: bool,
    /// Reflect the final register (pre-xorout) across the full width.
    pub refout: bool,
}

impl CrcParams {
    pub const CRC16_CCITT: CrcParams = CrcParams {
        name: "CRC-16-CCITT",
        order: 16,
        poly: 0x1021,
        init: 0xFFFF,
        xorout: 0x0000,
        refin: false,
        refout: false,
    };

    pub const CRC32_IEEE: CrcParams = CrcParams {
        name: "CRC-32",
        order: 32,
        poly: 0x04C1_1DB7,
        init: 0xFFFF_FFFF,
        xorout: 0xFFFF_FFFF,
        refin: true,
        refout: true,
    };

    pub const CRC32_BZIP2: CrcParams = CrcParams {
        name: "CRC-32/BZIP2",
        order: 32,
        poly: 0x04C1_1DB7,
        init: 0xFFFF_FFFF,
        xorout: 0xFFFF_FFFF,
        refin: false,
        refout: false,
    };

    /// Castagnoli polynomial.
    pub const CRC32C: CrcParams = CrcParams {
        name: "CRC-32C",
        order: 32,
        poly: 0x1EDC_6F41,
        init: 0xFFFF_FFFF,
        xorout: 0xFFFF_FFFF,
        refin: true,
        refout: true,
    };

    /// The CRC-16 used over floppy ID/DATA fields. `init` and `refin` vary by
    /// modulation (see [`crate::modulation::ModulationDescriptor::crc_params`]);
    /// the polynomial, lack of final reflection, and zero xorout do not.
    pub const fn floppy_crc16(init: u16, refin: bool) -> CrcParams {
        CrcParams {
            name: "CRC-16 (floppy)",
            order: 16,
            poly: 0x1021,
            init: init as u64,
            xorout: 0x0000,
            refin,
            refout: false,
        }
    }
}

/// A running CRC register plus a lazily-grown cache of lookup tables.
///
/// An 8-bit table is built eagerly on construction, since it is by far the most
/// common slice width; smaller widths are only built if a caller asks for them.
pub struct CrcEngine {
    params: CrcParams,
    reg: u64,
    widmask: u64,
    topbit: u64,
    tables: HashMap<u8, Vec<u64>>,
    /// For a given remaining bit count, which table width to dispatch to (0 = none).
    dispatch_cache: HashMap<u8, u8>,
}

impl CrcEngine {
    pub fn new(params: CrcParams) -> Self {
        let widmask = if params.order >= 64 {
            u64::MAX
        } else {
            (1u64 << params.order) - 1
        };
        let topbit = 1u64 << (params.order - 1);
        let mut engine = CrcEngine {
            params,
            reg: params.init & widmask,
            widmask,
            topbit,
            tables: HashMap::new(),
            dispatch_cache: HashMap::new(),
        };
        engine.make_table(8);
        engine
    }

    pub fn reset(&mut self) {
        self.reg = self.params.init & self.widmask;
    }

    fn reflect(&self, data: u64, bit_count: u8) -> u64 {
        let mut src = data;
        let mut out = 0u64;
        for _ in 0..bit_count {
            out <<= 1;
            if src & 1 != 0 {
                out |= 1;
            }
            src >>= 1;
        }
        out
    }

    /// Pick the largest already-built table whose width is <= `bit_count`, or 0
    /// if none fits; the choice is cached so it isn't recomputed per call.
    fn find_table(&mut self, bit_count: u8) -> u8 {
        if let Some(&w) = self.dispatch_cache.get(&bit_count) {
            return w;
        }
        let mut width = bit_count;
        let mut found = 0u8;
        while width > 1 {
            if self.tables.contains_key(&width) {
                found = width;
                break;
            }
            width -= 1;
        }
        self.dispatch_cache.insert(bit_count, found);
        found
    }

    fn make_table_entry(&self, d: u64, bit_count: u8) -> u64 {
        let mut v: u64 = 0;
        for bit in (0..bit_count).rev() {
            let b = (d >> bit) & 1;
            v ^= b << (self.params.order - 1);
            if v & self.topbit != 0 {
                v = (v << 1) ^ self.params.poly;
            } else {
                v <<= 1;
            }
            v &= self.widmask;
        }
        v
    }

    /// Precompute a 2^width-entry lookup table for slicing `width` bits per step.
    pub fn make_table(&mut self, width: u8) {
        assert!(width > 1, "CRC table width must be at least 2 bits");
        if self.tables.contains_key(&width) {
            return;
        }
        // Any previously-cached dispatch decision may now prefer this new, wider table.
        self.dispatch_cache.clear();
        let size = 1usize << width;
        let table = (0..size as u64).map(|i| self.make_table_entry(i, width)).collect();
        self.tables.insert(width, table);
    }

    /// Ingest `bit_count` bits (1..=64) of `data`, MSB-first (before any `refin`
    /// reflection, which is applied internally).
    pub fn compute(&mut self, data: u64, bit_count: u8) {
        let data = if self.params.refin {
            self.reflect(data, bit_count)
        } else {
            data
        };
        let mut remaining = bit_count;
        while remaining > 0 {
            let table_width = self.find_table(remaining);
            if table_width > 0 {
                let slice = (data >> (remaining - table_width)) & ((1u64 << table_width) - 1);
                let idx = ((self.reg >> (self.params.order - table_width)) ^ slice) as usize;
                self.reg = self.tables[&table_width][idx] ^ (self.reg << table_width);
                self.reg &= self.widmask;
                remaining -= table_width;
            } else {
                let bit = (data >> (remaining - 1)) & 1;
                self.reg ^= bit << (self.params.order - 1);
                if self.reg & self.topbit != 0 {
                    self.reg = (self.reg << 1) ^ self.params.poly;
                } else {
                    self.reg <<= 1;
                }
                self.reg &= self.widmask;
                remaining -= 1;
            }
        }
    }

    /// Ingest a byte sequence, each byte advanced as 8 bits, MSB-first.
    pub fn compute_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.compute(byte as u64, 8);
        }
    }

    /// Return `register XOR xorout`, reflected across the full CRC width if `refout`.
    pub fn get(&self) -> u64 {
        let value = self.reg ^ self.params.xorout;
        if self.params.refout {
            self.reflect(value, self.params.order)
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crc_of(params: CrcParams, data: &[u8]) -> u64 {
        let mut engine = CrcEngine::new(params);
        engine.compute_bytes(data);
        engine.get()
    }

    fn swap32(v: u32) -> u32 {
        v.swap_bytes()
    }

    #[test]
    fn crc16_ccitt_check_vector() {
        assert_eq!(crc_of(CrcParams::CRC16_CCITT, b"123456789"), 0x29B1);
    }

    #[test]
    fn crc32_ieee_check_vector() {
        assert_eq!(crc_of(CrcParams::CRC32_IEEE, b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn crc32_bzip2_check_vector() {
        assert_eq!(crc_of(CrcParams::CRC32_BZIP2, b"123456789"), 0xFC89_1918);
    }

    #[test]
    fn crc32c_check_vector() {
        assert_eq!(crc_of(CrcParams::CRC32C, b"123456789"), 0xE306_9283);
    }

    #[test]
    fn crc32c_rfc3720_zeros() {
        let data = [0u8; 32];
        assert_eq!(crc_of(CrcParams::CRC32C, &data) as u32, swap32(0xAA36_918A));
    }

    #[test]
    fn crc32c_rfc3720_ones() {
        let data = [0xFFu8; 32];
        assert_eq!(crc_of(CrcParams::CRC32C, &data) as u32, swap32(0x43AB_A862));
    }

    #[test]
    fn crc32c_rfc3720_ascending() {
        let data: Vec<u8> = (0..32).collect();
        assert_eq!(crc_of(CrcParams::CRC32C, &data) as u32, swap32(0x4E79_DD46));
    }

    #[test]
    fn crc32c_rfc3720_descending() {
        let data: Vec<u8> = (0..32).rev().collect();
        assert_eq!(crc_of(CrcParams::CRC32C, &data) as u32, swap32(0x5CDB_3F11));
    }

    #[test]
    fn table_width_does_not_change_result() {
        let data = b"123456789";

        let no_table = {
            let mut e = CrcEngine::new(CrcParams::CRC32_IEEE);
            e.tables.clear();
            e.dispatch_cache.clear();
            e.compute_bytes(data);
            e.get()
        };
        let table4 = {
            let mut e = CrcEngine::new(CrcParams::CRC32_IEEE);
            e.tables.clear();
            e.dispatch_cache.clear();
            e.make_table(4);
            e.compute_bytes(data);
            e.get()
        };
        let table8 = crc_of(CrcParams::CRC32_IEEE, data);
        let mixed = {
            let mut e = CrcEngine::new(CrcParams::CRC32_IEEE);
            e.tables.clear();
            e.dispatch_cache.clear();
            e.make_table(3);
            e.make_table(5);
            e.compute_bytes(data);
            e.get()
        };

        assert_eq!(no_table, table8);
        assert_eq!(table4, table8);
        assert_eq!(mixed, table8);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut e = CrcEngine::new(CrcParams::CRC16_CCITT);
        e.compute_bytes(b"123456789");
        e.reset();
        e.reset();
        assert_eq!(e.get(), CrcParams::CRC16_CCITT.init ^ CrcParams::CRC16_CCITT.xorout);
    }

    #[test]
    fn make_table_is_idempotent() {
        let mut e = CrcEngine::new(CrcParams::CRC16_CCITT);
        e.make_table(4);
        let before = e.tables.get(&4).cloned();
        e.make_table(4);
        assert_eq!(before, e.tables.get(&4).cloned());
    }

    /// A register fed a full address-mark + payload + trailing CRC-16 with
    /// matching parameters must read back to zero (§4.1, relied on by §4.5).
    #[test]
    fn self_check_crc_reads_zero() {
        let mut e = CrcEngine::new(CrcParams::floppy_crc16(0xFFFF, false));
        let payload = [0xA1, 0xFE, 0x00, 0x00, 0x01, 0x00];
        e.compute_bytes(&payload);
        let crc = e.get() as u16;
        e.reset();
        e.compute_bytes(&payload);
        e.compute(crc as u64, 16);
        assert_eq!(e.get(), 0);
    }
}
