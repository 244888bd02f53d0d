//! Named-port modulation routes.
//!
//! A [`Modulation`] connects one producer output channel to one port of an
//! oscillator or of an effect nested inside an effect chain. Port names are
//! resolved to channel indices once, when the route is added; applying a
//! route per block is pure arithmetic.

use telar_core::{ChainIndex, ObjectId, SignalBuffer};

/// Where a modulation route lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModTarget {
    /// A port on a voice oscillator.
    Oscillator {
        /// Oscillator object id.
        id: ObjectId,
        /// Resolved port channel.
        port: usize,
    },
    /// A port on an effect inside a specific chain.
    ChainEffect {
        /// Chain the effect lives in (voice-level or master).
        chain: ChainIndex,
        /// Position of the effect within the chain.
        effect_index: usize,
        /// Effect object id.
        id: ObjectId,
        /// Resolved port channel.
        port: usize,
    },
}

/// One resolved modulation route.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Modulation {
    /// Producer object id.
    pub source: ObjectId,
    /// Resolved producer output channel.
    pub source_port: usize,
    /// Destination port.
    pub target: ModTarget,
    /// Scale applied to the source value.
    pub amount: f32,
    /// Treat the source as bipolar: map [0, 1] to [−1, 1] before scaling.
    pub centered: bool,
}

/// Add `amount · source` onto a destination port, converting between the
/// two channels' divisions.
///
/// Iterates destination slots: slot `k` covers audio frames
/// `[k·dd, (k+1)·dd)` and reads the source value current at its first
/// frame. Accumulation is additive onto whatever the port already holds.
pub fn apply_modulation(
    source: &SignalBuffer,
    source_port: usize,
    dest: &mut SignalBuffer,
    dest_port: usize,
    amount: f32,
    centered: bool,
    n_frames: usize,
    frame_offset: usize,
) {
    let sd = source.division(source_port);
    let dd = dest.division(dest_port);
    let Some(src) = source.channel(source_port) else {
        return;
    };
    let Some(dst) = dest.channel_mut(dest_port) else {
        return;
    };
    if src.is_empty() || dst.is_empty() {
        return;
    }

    let first_slot = frame_offset / dd;
    let n_slots = n_frames / dd;
    for k in first_slot..(first_slot + n_slots).min(dst.len()) {
        let frame = k * dd;
        let value = src[(frame / sd).min(src.len() - 1)];
        let value = if centered { value * 2.0 - 1.0 } else { value };
        dst[k] += amount * value;
    }
}
