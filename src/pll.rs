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

    src/pll.rs

    The adaptive digital phase-locked loop that turns a flux-delta stream into
    a channel-bit stream, tracking speed and phase drift in the source media.
*/

/// Tuning constants for an [`Adpll`]; the defaults mirror what a faithful
/// reimplementation of this kind of data separator uses in practice.
#[derive(Copy, Clone, Debug)]
pub struct AdpllTuning {
    pub max_adj_pct: f64,
    pub window_pct: f64,
    pub freq_adj_factor: f64,
    pub phase_adj_factor: f64,
}

impl Default for AdpllTuning {
    fn default() -> Self {
        AdpllTuning {
            max_adj_pct: 3.0,
            window_pct: 50.0,
            freq_adj_factor: 0.005,
            phase_adj_factor: 0.1,
        }
    }
}

/// Converts a flux-delta stream (seconds between consecutive transitions)
/// into a channel-bit stream: one emission per half-bit-cell, `1` on a
/// transition, `0` on an empty half-cell.
///
/// The oscillator locks to the first transition on construction and then
/// self-corrects every subsequent transition; it never signals an error — a
/// transition outside the nominal window is only ever diagnostic.
pub struct Adpll<I> {
    deltas: I,
    osc_period: f64,
    min_osc_period: f64,
    max_osc_period: f64,
    window_frac: f64,
    freq_adj_factor: f64,
    phase_adj_factor: f64,
    trans_time: f64,
    osc_time: f64,
    zero_bits: i64,
}

impl<I: Iterator<Item = f64>> Adpll<I> {
    /// Returns `None` if `deltas` yields no transitions at all, since there is
    /// nothing to lock the oscillator to.
    pub fn new(mut deltas: I, osc_period: f64, tuning: AdpllTuning) -> Option<Self> {
        let first = deltas.next()?;
        Some(Adpll {
            deltas,
            osc_period,
            min_osc_period: osc_period * (100.0 - tuning.max_adj_pct) / 100.0,
            max_osc_period: osc_period * (100.0 + tuning.max_adj_pct) / 100.0,
            window_frac: tuning.window_pct / 100.0,
            freq_adj_factor: tuning.freq_adj_factor,
            phase_adj_factor: tuning.phase_adj_factor,
            trans_time: first,
            osc_time: first,
            zero_bits: 0,
        })
    }

    /// Current oscillator period, in seconds; drifts within
    /// `[min_osc_period, max_osc_period]` as transitions are consumed.
    pub fn osc_period(&self) -> f64 {
        self.osc_period
    }
}

impl<I: Iterator<Item = f64>> Iterator for Adpll<I> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.zero_bits != 0 {
            self.zero_bits -= 1;
            return Some(0);
        }

        let mut hbi: i64 = 0;
        let mut q = 0.0;
        let mut error = 0.0;
        while hbi <= 0 {
            self.trans_time += self.deltas.next()?;
            q = (self.trans_time - self.osc_time) / self.osc_period;
            hbi = (q + 0.5) as i64;
            self.osc_time += hbi as f64 * self.osc_period;
            error = self.trans_time - self.osc_time;
            // hbi <= 0 means the transition arrived before the expected
            // window (e.g. a write splice); consume another delta and retry.
        }

        if error.abs() > self.osc_period * self.window_frac {
            log::trace!(
                "ADPLL transition outside window: q={q:.3} hbi={hbi} error={error:.3e}s period={:.3e}s",
                self.osc_period
            );
        }

        if self.freq_adj_factor != 0.0 {
            self.osc_period += error * self.freq_adj_factor;
            self.osc_period = self.osc_period.clamp(self.min_osc_period, self.max_osc_period);
        }
        if self.phase_adj_factor != 0.0 {
            self.osc_time += error * self.phase_adj_factor;
        }

        self.zero_bits = hbi - 1;
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_delta_stream_yields_no_pll() {
        let deltas: Vec<f64> = vec![];
        assert!(Adpll::new(deltas.into_iter(), 2.0e-6, AdpllTuning::default()).is_none());
    }

    /// A perfectly periodic flux stream holding exactly one oscillator period
    /// per half-cell (two half-cells between transitions) locks with zero
    /// error and emits one transition bit followed by one empty half-cell,
    /// repeating: clock pulse, zero data bit, over and over.
    #[test]
    fn periodic_stream_locks_with_no_drift() {
        let period = 2.0e-6;
        let deltas = std::iter::repeat(4.0e-6);
        let tuning = AdpllTuning {
            max_adj_pct: 3.0,
            window_pct: 50.0,
            freq_adj_factor: 0.005,
            phase_adj_factor: 0.1,
        };
        let mut pll = Adpll::new(deltas, period, tuning).unwrap();
        let bits: Vec<u8> = (0..8).map(|_| pll.next().unwrap()).collect();
        assert_eq!(bits, vec![1, 0, 1, 0, 1, 0, 1, 0]);
        assert!((pll.osc_period() - period).abs() < 1e-12);
    }

    #[test]
    fn write_splice_is_absorbed_without_error() {
        // A too-early transition (well inside the current half-cell) should
        // simply be consumed and folded into the next valid half-cell count,
        // never surfacing as an error to the caller.
        let period = 2.0e-6;
        let deltas = vec![4.0e-6, 0.1e-6, 4.0e-6, 4.0e-6];
        let mut pll = Adpll::new(deltas.into_iter(), period, AdpllTuning::default()).unwrap();
        // Should still produce bits without panicking or terminating early.
        let bits: Vec<u8> = std::iter::from_fn(|| pll.next()).collect();
        assert!(!bits.is_empty());
    }

    #[test]
    fn frequency_adjustment_tracks_a_slower_drive() {
        // Media running 1% slow: every interval is 1% longer than nominal.
        let nominal_period = 2.0e-6;
        let slow_delta = 4.0e-6 * 1.01;
        let deltas = std::iter::repeat(slow_delta);
        let tuning = AdpllTuning::default();
        let mut pll = Adpll::new(deltas, nominal_period, tuning).unwrap();
        for _ in 0..200 {
            pll.next();
        }
        assert!(pll.osc_period() > nominal_period);
        assert!(pll.osc_period() <= nominal_period * 1.03 + 1e-15);
    }
}
