//! Small math helpers shared across the engine.

/// Convert a (possibly fractional) MIDI note number to frequency in Hz.
///
/// Standard tuning: A4 (note 69) = 440 Hz.
#[inline]
pub fn midi_note_to_hz(note: f32) -> f32 {
    440.0 * libm::powf(2.0, (note - 69.0) / 12.0)
}

/// Convert a frequency in Hz to a fractional MIDI note number.
#[inline]
pub fn hz_to_midi_note(hz: f32) -> f32 {
    69.0 + 12.0 * libm::log2f(hz / 440.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((midi_note_to_hz(69.0) - 440.0).abs() < 0.01);
    }

    #[test]
    fn octave_doubles() {
        let c4 = midi_note_to_hz(60.0);
        let c5 = midi_note_to_hz(72.0);
        assert!((c5 / c4 - 2.0).abs() < 1e-4);
    }

    #[test]
    fn round_trip() {
        for note in [21.0, 48.5, 60.0, 69.0, 100.25] {
            let back = hz_to_midi_note(midi_note_to_hz(note));
            assert!(
                (back - note).abs() < 1e-3,
                "note {} round-tripped to {}",
                note,
                back
            );
        }
    }
}
