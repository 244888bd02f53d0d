//! Polyphase two-path IIR half-band decimation.
//!
//! The engine renders everything at `sample_rate × oversampling` and comes
//! back to the host rate through this filter: a half-band lowpass built from
//! two parallel allpass cascades, evaluated in polyphase form so each
//! section runs at the *decimated* rate. The same pass is the output
//! anti-aliasing filter.
//!
//! Coefficients are designed once, at `prepare()` time, from a target
//! stopband attenuation and transition bandwidth using the classic
//! elliptic-approximation recipe: derive the elliptic modulus k and nome q
//! from the transition width, pick the smallest odd order meeting the
//! attenuation, then evaluate one alternating theta-series per coefficient.

use core::f64::consts::PI;

/// Compute half-band allpass coefficients for the given stopband
/// attenuation (dB) and normalized transition bandwidth (0 < tb < 0.5).
///
/// Returned coefficients are sorted ascending in (0, 1); even indices drive
/// one polyphase branch, odd indices the other.
pub fn design_halfband_coefs(attenuation_db: f64, transition_bw: f64) -> Vec<f64> {
    let transition = transition_bw.clamp(1e-4, 0.499);
    let (k, q) = transition_params(transition);
    let order = order_from_attenuation(attenuation_db.max(1.0), q);
    let n_coefs = (order - 1) / 2;
    (0..n_coefs)
        .map(|i| coef_for_index(i, k, q, order))
        .collect()
}

/// Elliptic modulus k and nome q for a transition bandwidth.
fn transition_params(transition: f64) -> (f64, f64) {
    let mut k = libm::tan((1.0 - transition * 2.0) * PI / 4.0);
    k *= k;
    let kk_sqrt = libm::pow(1.0 - k * k, 0.25);
    let e = 0.5 * (1.0 - kk_sqrt) / (1.0 + kk_sqrt);
    let e2 = e * e;
    let e4 = e2 * e2;
    let q = e * (1.0 + e4 * (2.0 + e4 * (15.0 + 150.0 * e4)));
    (k, q)
}

/// Smallest odd filter order meeting the attenuation for nome q.
fn order_from_attenuation(attenuation_db: f64, q: f64) -> usize {
    let attn_p2 = libm::pow(10.0, -attenuation_db / 10.0);
    let a = attn_p2 / (1.0 - attn_p2);
    let order = libm::ceil(libm::log(a * a / 16.0) / libm::log(q)).max(1.0) as usize;
    let order = if order % 2 == 0 { order + 1 } else { order };
    order.max(3)
}

fn coef_for_index(index: usize, k: f64, q: f64, order: usize) -> f64 {
    let c = (index + 1) as f64;
    let num = theta_num(q, order as f64, c) * libm::pow(q, 0.25);
    let den = theta_den(q, order as f64, c) + 0.5;
    let ww = num / den;
    let wwsq = ww * ww;
    let x = libm::sqrt((1.0 - wwsq * k) * (1.0 - wwsq / k)) / (1.0 + wwsq);
    (1.0 - x) / (1.0 + x)
}

fn theta_num(q: f64, order: f64, c: f64) -> f64 {
    let mut acc = 0.0;
    let mut sign = 1.0;
    let mut i = 0_i32;
    loop {
        let term = libm::pow(q, (i * (i + 1)) as f64)
            * libm::sin((i * 2 + 1) as f64 * c * PI / order)
            * sign;
        acc += term;
        if libm::fabs(term) < 1e-100 {
            break;
        }
        sign = -sign;
        i += 1;
    }
    acc
}

fn theta_den(q: f64, order: f64, c: f64) -> f64 {
    let mut acc = 0.0;
    let mut sign = -1.0;
    let mut i = 1_i32;
    loop {
        let term = libm::pow(q, (i * i) as f64) * libm::cos((i * 2) as f64 * c * PI / order) * sign;
        acc += term;
        if libm::fabs(term) < 1e-100 {
            break;
        }
        sign = -sign;
        i += 1;
    }
    acc
}

#[derive(Clone, Copy, Debug, Default)]
struct AllpassState {
    x1: f32,
    y1: f32,
}

/// One channel of 2:1 half-band decimation.
///
/// Holds the two polyphase allpass cascades. In the decimated domain each
/// section is the one-pole allpass `y = a·(x − y₁) + x₁`.
#[derive(Debug, Default)]
pub struct HalfbandDecimator {
    coefs_even: Vec<f32>,
    coefs_odd: Vec<f32>,
    state_even: Vec<AllpassState>,
    state_odd: Vec<AllpassState>,
}

impl HalfbandDecimator {
    /// Create a decimator with no coefficients installed (passes every
    /// other sample through until [`set_coefficients`](Self::set_coefficients)
    /// is called).
    pub fn new() -> Self {
        Self::default()
    }

    /// Install designed coefficients, splitting them across the two
    /// polyphase branches, and clear state.
    pub fn set_coefficients(&mut self, coefs: &[f64]) {
        self.coefs_even = coefs.iter().step_by(2).map(|&c| c as f32).collect();
        self.coefs_odd = coefs.iter().skip(1).step_by(2).map(|&c| c as f32).collect();
        self.state_even = vec![AllpassState::default(); self.coefs_even.len()];
        self.state_odd = vec![AllpassState::default(); self.coefs_odd.len()];
    }

    /// Zero all section state.
    pub fn clear_state(&mut self) {
        self.state_even.fill(AllpassState::default());
        self.state_odd.fill(AllpassState::default());
    }

    #[inline]
    fn run_cascade(coefs: &[f32], states: &mut [AllpassState], input: f32) -> f32 {
        let mut x = input;
        for (a, st) in coefs.iter().zip(states.iter_mut()) {
            let y = a * (x - st.y1) + st.x1;
            st.x1 = x;
            st.y1 = y;
            x = y;
        }
        x
    }

    /// Decimate `input` (oversampled rate) 2:1 into `output` (host rate).
    ///
    /// Consumes `2 × output.len()` input samples; a short input block
    /// shortens the output accordingly.
    pub fn process_block(&mut self, output: &mut [f32], input: &[f32]) {
        let n_out = output.len().min(input.len() / 2);
        if self.coefs_even.is_empty() && self.coefs_odd.is_empty() {
            for (i, out) in output.iter_mut().enumerate().take(n_out) {
                *out = input[i * 2];
            }
            return;
        }
        for (i, out) in output.iter_mut().enumerate().take(n_out) {
            let first = input[i * 2];
            let second = input[i * 2 + 1];
            // The branch fed the earlier sample of the pair carries the
            // implicit half-sample delay of the polyphase decomposition.
            let a = Self::run_cascade(&self.coefs_even, &mut self.state_even, second);
            let b = Self::run_cascade(&self.coefs_odd, &mut self.state_odd, first);
            *out = 0.5 * (a + b);
        }
    }
}
