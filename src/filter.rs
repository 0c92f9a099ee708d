use std::f64::consts::PI;

use crate::error::{DaqError, Result};

#[derive(Clone, Copy, Debug)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

#[derive(Clone, Copy, Debug)]
struct Biquad {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl Biquad {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    fn process(&mut self, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * y + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * y;
        y
    }

    fn reset(&mut self) {
        self.state = BiquadState::default();
    }
}

/// Band-pass filter for EMG traces: an order-N Butterworth high-pass at the
/// low cutoff cascaded with an order-N Butterworth low-pass at the high
/// cutoff, with independent state per channel.
///
/// The same cascade serves both modes. `run` processes a complete trace in
/// one call (the persisted path); `push` advances one sample at a time,
/// carrying state across calls, for live display. Fed the same input they
/// produce identical output, so mode choice never changes numeric results.
/// Output length always equals input length; the settling transient at the
/// start of a batch run is left in place.
pub struct BandPass {
    chains: Vec<Vec<Biquad>>,
    low_hz: f64,
    high_hz: f64,
    order: usize,
}

impl BandPass {
    /// Fails with `InvalidFilterConfig` unless `0 < low < high < Nyquist`.
    pub fn new(
        low_hz: f64,
        high_hz: f64,
        order: usize,
        sample_rate: f64,
        channel_count: usize,
    ) -> Result<Self> {
        let nyquist = sample_rate / 2.0;
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
            return Err(DaqError::InvalidFilterConfig {
                low_hz,
                high_hz,
                sample_rate,
            });
        }
        if order == 0 || order % 2 != 0 {
            return Err(DaqError::InvalidConfig(format!(
                "filter order must be a positive even number, got {order}"
            )));
        }

        let mut sections = Vec::with_capacity(order);
        for q in butterworth_qs(order) {
            sections.push(Biquad::new(highpass(low_hz, sample_rate, q)));
        }
        for q in butterworth_qs(order) {
            sections.push(Biquad::new(lowpass(high_hz, sample_rate, q)));
        }

        Ok(Self {
            chains: vec![sections; channel_count.max(1)],
            low_hz,
            high_hz,
            order,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.chains.len()
    }

    /// Advance the given channel by one sample (causal mode).
    pub fn push(&mut self, channel: usize, sample: f64) -> f64 {
        let mut value = sample;
        for section in &mut self.chains[channel] {
            value = section.process(value);
        }
        value
    }

    /// Filter a complete single-channel trace (batch mode). State is cleared
    /// first so repeated runs are deterministic.
    pub fn run(&mut self, channel: usize, trace: &[f64]) -> Vec<f64> {
        for section in &mut self.chains[channel] {
            section.reset();
        }
        trace.iter().map(|&x| self.push(channel, x)).collect()
    }

    /// Batch-filter every channel of a recording.
    pub fn run_channels(&mut self, traces: &[Vec<f64>]) -> Vec<Vec<f64>> {
        traces
            .iter()
            .enumerate()
            .map(|(ch, trace)| self.run(ch, trace))
            .collect()
    }

    pub fn reset(&mut self) {
        for chain in &mut self.chains {
            for section in chain {
                section.reset();
            }
        }
    }

    /// Header annotation for filtered files, e.g. `BP:20-450Hz order 4`.
    pub fn annotation(&self) -> String {
        format!(
            "BP:{}-{}Hz order {}",
            trim_hz(self.low_hz),
            trim_hz(self.high_hz),
            self.order
        )
    }
}

fn trim_hz(hz: f64) -> String {
    if hz == hz.trunc() {
        format!("{}", hz as i64)
    } else {
        format!("{hz}")
    }
}

/// Q values for the pole pairs of an order-N Butterworth filter realized as
/// N/2 cascaded biquads.
fn butterworth_qs(order: usize) -> Vec<f64> {
    (0..order / 2)
        .map(|k| {
            let theta = PI * (2 * k + 1) as f64 / (2 * order) as f64;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

fn lowpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = (w0 / 2.0).sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}

fn highpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = (w0 / 2.0).sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 + cos_w0) * 0.5;
    let b1 = -(1.0 + cos_w0);
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}

fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}
