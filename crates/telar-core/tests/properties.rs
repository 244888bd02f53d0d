//! Property-based tests for the telar-core buffer model and decimator.

use proptest::prelude::*;
use telar_core::{HalfbandDecimator, ObjectId, SignalBuffer, SignalKind, design_halfband_coefs};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Division addressing: for a control buffer with division D holding
    /// L stored values, every audio-rate index i in [0, L*D) reads the slot
    /// written at i / D, and the set of addressable slots is exactly
    /// [0, L).
    #[test]
    fn division_addressing_reads_written_slot(
        division in 1usize..16,
        slots in 1usize..64,
    ) {
        let mut buf = SignalBuffer::new(SignalKind::Control, slots, 1);
        buf.set_division(0, division);

        {
            let ch = buf.channel_mut(0).unwrap();
            for (k, v) in ch.iter_mut().enumerate() {
                *v = k as f32 * 2.0 + 1.0;
            }
        }

        let d = buf.division(0);
        prop_assert_eq!(d, division);
        let ch = buf.channel(0).unwrap();
        let mut max_slot = 0;
        for i in 0..slots * division {
            let slot = i / d;
            max_slot = max_slot.max(slot);
            prop_assert_eq!(ch[slot], slot as f32 * 2.0 + 1.0);
        }
        // Varying D never addresses outside [0, slots)
        prop_assert_eq!(max_slot, slots - 1);
    }

    /// Resizing any buffer resets every division to 1 and zeroes data.
    #[test]
    fn resize_restores_invariants(
        channels in 1usize..8,
        frames in 1usize..256,
        division in 1usize..32,
    ) {
        let mut buf = SignalBuffer::new(SignalKind::Control, 16, 2);
        buf.set_division(0, division);
        buf.set_constant(0, 7.0);

        buf.resize(channels, frames);

        prop_assert_eq!(buf.num_channels(), channels);
        for c in 0..channels {
            prop_assert_eq!(buf.division(c), 1);
            prop_assert_eq!(buf.channel_len(c), frames);
            prop_assert!(buf.channel(c).unwrap().iter().all(|&s| s == 0.0));
        }
    }

    /// set_channel touches only the addressed channel.
    #[test]
    fn set_channel_is_local(
        target in 0usize..4,
        len in 1usize..128,
        division in 1usize..8,
    ) {
        let mut buf = SignalBuffer::new(SignalKind::Control, 32, 4);
        buf.set_channel(target, len, division, ObjectId(9));

        for c in 0..4 {
            if c == target {
                prop_assert_eq!(buf.channel_len(c), len);
                prop_assert_eq!(buf.division(c), division.max(1));
                prop_assert_eq!(buf.source_id(c), ObjectId(9));
            } else {
                prop_assert_eq!(buf.channel_len(c), 32);
                prop_assert_eq!(buf.division(c), 1);
            }
        }
    }

    /// The decimator stays finite for arbitrary bounded input at every
    /// quality tier.
    #[test]
    fn decimator_is_stable(
        quality in 0usize..3,
        input in prop::collection::vec(-1.0f32..=1.0f32, 64..512),
    ) {
        let (attn, tbw) = [(60.0, 0.10), (80.0, 0.05), (96.0, 0.01)][quality];
        let mut dec = HalfbandDecimator::new();
        dec.set_coefficients(&design_halfband_coefs(attn, tbw));

        let mut output = vec![0.0f32; input.len() / 2];
        dec.process_block(&mut output, &input);
        for (i, &s) in output.iter().enumerate() {
            prop_assert!(s.is_finite(), "non-finite output {} at {}", s, i);
            prop_assert!(s.abs() < 4.0, "implausible level {} at {}", s, i);
        }
    }
}
