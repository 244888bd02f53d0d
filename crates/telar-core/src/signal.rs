//! Multi-channel signal buffers with per-channel update rate.
//!
//! A [`SignalBuffer`] is the substrate all routing flows through: audio
//! buffers connect oscillators, effect chains, and the mixer; control
//! buffers carry modulation values between producers and the named ports of
//! oscillators and effects.
//!
//! Each channel has a *division* D ≥ 1: the channel stores one value per D
//! audio frames, and index `i` of a per-sample loop reads `data[i / D]`.
//! Division 1 is full audio rate.

use crate::object::ObjectId;

/// Whether a buffer carries audio samples or control (modulation) values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    /// Full-rate audio.
    Audio,
    /// Modulation values, possibly below audio rate (division > 1).
    Control,
}

#[derive(Clone, Debug)]
struct Channel {
    data: Vec<f32>,
    division: usize,
    source_id: ObjectId,
}

/// Multi-channel sample container with per-channel division and provenance.
///
/// Out-of-range channel indices return `None` or no-op; they are never a
/// panic on the audio path. Resizing reallocates and is only permitted
/// during `prepare()`, never inside a running block.
#[derive(Clone, Debug)]
pub struct SignalBuffer {
    kind: SignalKind,
    channels: Vec<Channel>,
    id: ObjectId,
}

impl Default for SignalBuffer {
    fn default() -> Self {
        Self::new(SignalKind::Audio, 0, 0)
    }
}

impl SignalBuffer {
    /// Create a buffer with `n_channels` zeroed channels of `n_frames`
    /// samples each, all at division 1.
    pub fn new(kind: SignalKind, n_frames: usize, n_channels: usize) -> Self {
        let channels = (0..n_channels)
            .map(|_| Channel {
                data: vec![0.0; n_frames],
                division: 1,
                source_id: ObjectId::default(),
            })
            .collect();
        Self {
            kind,
            channels,
            id: ObjectId::default(),
        }
    }

    /// The buffer's signal kind.
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// The buffer's own object id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Assign the buffer's object id.
    pub fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Read access to channel `i`, or `None` when out of range.
    #[inline]
    pub fn channel(&self, i: usize) -> Option<&[f32]> {
        self.channels.get(i).map(|c| c.data.as_slice())
    }

    /// Write access to channel `i`, or `None` when out of range.
    #[inline]
    pub fn channel_mut(&mut self, i: usize) -> Option<&mut [f32]> {
        self.channels.get_mut(i).map(|c| c.data.as_mut_slice())
    }

    /// Stored length of channel `i` (0 when out of range).
    pub fn channel_len(&self, i: usize) -> usize {
        self.channels.get(i).map_or(0, |c| c.data.len())
    }

    /// Division of channel `i` (1 when out of range).
    #[inline]
    pub fn division(&self, i: usize) -> usize {
        self.channels.get(i).map_or(1, |c| c.division)
    }

    /// Set the division of channel `i`. Zero is coerced to 1.
    pub fn set_division(&mut self, i: usize, division: usize) {
        if let Some(c) = self.channels.get_mut(i) {
            c.division = division.max(1);
        }
    }

    /// Provenance id of channel `i` (default id when out of range).
    pub fn source_id(&self, i: usize) -> ObjectId {
        self.channels.get(i).map_or(ObjectId::default(), |c| c.source_id)
    }

    /// Record which object writes channel `i`.
    pub fn set_source_id(&mut self, i: usize, id: ObjectId) {
        if let Some(c) = self.channels.get_mut(i) {
            c.source_id = id;
        }
    }

    /// Reallocate a single channel with a new length, division, and source.
    pub fn set_channel(&mut self, i: usize, len: usize, division: usize, source_id: ObjectId) {
        if let Some(c) = self.channels.get_mut(i) {
            c.data.clear();
            c.data.resize(len, 0.0);
            c.division = division.max(1);
            c.source_id = source_id;
        }
    }

    /// Reallocate every channel to `n_frames` samples, resetting all
    /// divisions to 1. Channel count changes to `n_channels`.
    pub fn resize(&mut self, n_channels: usize, n_frames: usize) {
        self.channels.resize_with(n_channels, || Channel {
            data: Vec::new(),
            division: 1,
            source_id: ObjectId::default(),
        });
        for c in &mut self.channels {
            c.data.clear();
            c.data.resize(n_frames, 0.0);
            c.division = 1;
        }
    }

    /// Fill channel `i` with a constant value.
    pub fn set_constant(&mut self, i: usize, value: f32) {
        if let Some(c) = self.channels.get_mut(i) {
            c.data.fill(value);
        }
    }

    /// Fill channel `i` with a constant value from `start` (in stored
    /// samples, i.e. already divided) onward.
    pub fn set_constant_from(&mut self, i: usize, value: f32, start: usize) {
        if let Some(c) = self.channels.get_mut(i) {
            let len = c.data.len();
            if start < len {
                c.data[start..].fill(value);
            }
        }
    }

    /// Zero all channel data.
    pub fn zero(&mut self) {
        for c in &mut self.channels {
            c.data.fill(0.0);
        }
    }

    /// Copy another buffer's contents channel-by-channel, sample-by-sample.
    ///
    /// Channels or samples missing on either side are skipped.
    pub fn copy_from(&mut self, other: &SignalBuffer) {
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            for (d, s) in dst.data.iter_mut().zip(src.data.iter()) {
                *d = *s;
            }
        }
    }

    /// Add another buffer's contents channel-by-channel, sample-by-sample.
    ///
    /// Channels or samples missing on either side are skipped.
    pub fn accumulate_from(&mut self, other: &SignalBuffer) {
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            for (d, s) in dst.data.iter_mut().zip(src.data.iter()) {
                *d += *s;
            }
        }
    }

    /// Peak absolute value across all channels.
    pub fn peak(&self) -> f32 {
        let mut peak = 0.0_f32;
        for c in &self.channels {
            for &s in &c.data {
                peak = peak.max(s.abs());
            }
        }
        peak
    }
}
