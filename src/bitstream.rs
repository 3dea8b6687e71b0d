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

    src/bitstream.rs

    The channel-bit string produced by the ADPLL: a packed bit vector,
    address-mark search (Knuth-Morris-Pratt), and clock/data demodulation.
*/
use bit_vec::BitVec;

/// A packed channel-bit stream, two bits (clock, data) per recovered data bit.
pub struct ChannelBits(BitVec);

impl ChannelBits {
    pub fn from_bits<I: IntoIterator<Item = u8>>(bits: I) -> Self {
        let vec: BitVec = bits.into_iter().map(|b| b != 0).collect();
        ChannelBits(vec)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All offsets where `mark` occurs; overlapping matches are permitted.
    pub fn find_all(&self, mark: &[bool]) -> Vec<usize> {
        find_all_bits(&self.0, mark)
    }

    /// The first occurrence of `mark` at or after `start`, if any.
    pub fn find_first_from(&self, mark: &[bool], start: usize) -> Option<usize> {
        find_first_from_bits(&self.0, mark, start)
    }

    /// Demodulate `len_bits` channel bits starting at `start` into bytes.
    /// Returns `None` if the range runs past the end of the stream.
    pub fn decode_range(&self, start: usize, len_bits: usize, lsb_first: bool) -> Option<Vec<u8>> {
        if start.checked_add(len_bits)? > self.0.len() {
            return None;
        }
        let bits: Vec<bool> = (start..start + len_bits).map(|i| self.0.get(i).unwrap()).collect();
        Some(decode_channel_bits(&bits, lsb_first))
    }
}

fn kmp_failure(needle: &[bool]) -> Vec<usize> {
    let m = needle.len();
    let mut fail = vec![0usize; m];
    let mut k = 0usize;
    for i in 1..m {
        while k > 0 && needle[k] != needle[i] {
            k = fail[k - 1];
        }
        if needle[k] == needle[i] {
            k += 1;
        }
        fail[i] = k;
    }
    fail
}

fn find_all_bits(haystack: &BitVec, needle: &[bool]) -> Vec<usize> {
    let m = needle.len();
    if m == 0 || haystack.len() < m {
        return Vec::new();
    }
    let fail = kmp_failure(needle);
    let mut matches = Vec::new();
    let mut k = 0usize;
    for i in 0..haystack.len() {
        let h = haystack.get(i).unwrap();
        while k > 0 && needle[k] != h {
            k = fail[k - 1];
        }
        if needle[k] == h {
            k += 1;
        }
        if k == m {
            matches.push(i + 1 - m);
            k = fail[k - 1];
        }
    }
    matches
}

fn find_first_from_bits(haystack: &BitVec, needle: &[bool], start: usize) -> Option<usize> {
    let m = needle.len();
    if m == 0 || start >= haystack.len() || haystack.len() - start < m {
        return None;
    }
    let fail = kmp_failure(needle);
    let mut k = 0usize;
    for i in start..haystack.len() {
        let h = haystack.get(i).unwrap();
        while k > 0 && needle[k] != h {
            k = fail[k - 1];
        }
        if needle[k] == h {
            k += 1;
        }
        if k == m {
            return Some(i + 1 - m);
        }
    }
    None
}

/// Splits an even-length channel-bit slice into bytes by taking every other
/// (data-position, odd-index) bit, MSB-first, or LSB-first when `lsb_first`.
pub fn decode_channel_bits(bits: &[bool], lsb_first: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.len() / 16);
    let mut cur = 0u8;
    let mut pos = 0u8;
    let mut i = 1;
    while i < bits.len() {
        let d = bits[i] as u8;
        if lsb_first {
            cur |= d << pos;
        } else {
            cur = (cur << 1) | d;
        }
        pos += 1;
        if pos == 8 {
            out.push(cur);
            cur = 0;
            pos = 0;
        }
        i += 2;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::ModulationDescriptor;

    fn bits_from_str(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn decode_is_inverse_of_msb_first_encode() {
        let descriptor = ModulationDescriptor::fm();
        let mark_bits = &descriptor.id_address_mark;
        let decoded = decode_channel_bits(mark_bits, false);
        assert_eq!(decoded, vec![0xFE]);
    }

    #[test]
    fn decode_is_inverse_of_mfm_missing_clock_encode() {
        let descriptor = ModulationDescriptor::mfm();
        let decoded = decode_channel_bits(&descriptor.id_address_mark, false);
        assert_eq!(decoded, vec![0xA1, 0xFE]);
    }

    #[test]
    fn decode_is_inverse_of_lsb_first_encode() {
        let descriptor = ModulationDescriptor::hp_m2fm();
        let decoded = decode_channel_bits(&descriptor.id_address_mark, true);
        assert_eq!(decoded, vec![0x70]);
    }

    #[test]
    fn find_all_permits_overlapping_matches() {
        let bits = ChannelBits::from_bits(bits_from_str("1111").into_iter().map(|b| b as u8));
        let positions = bits.find_all(&bits_from_str("11"));
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn find_first_from_respects_start_offset() {
        let bits = ChannelBits::from_bits(bits_from_str("101101").into_iter().map(|b| b as u8));
        let mark = bits_from_str("101");
        assert_eq!(bits.find_first_from(&mark, 0), Some(0));
        assert_eq!(bits.find_first_from(&mark, 1), Some(2));
        assert_eq!(bits.find_first_from(&mark, 3), None);
    }

    #[test]
    fn decode_range_rejects_overrun() {
        let bits = ChannelBits::from_bits(vec![1u8, 0, 1, 0]);
        assert!(bits.decode_range(0, 100, false).is_none());
        assert_eq!(bits.decode_range(0, 4, false), Some(vec![]));
    }
}
