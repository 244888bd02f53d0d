//! Waveform resources shared by the engine's oscillators.
//!
//! The resource manager owns single-cycle waveform buffers; waveform
//! oscillators keep a band-limited playback copy and refer back to the
//! source by [`ResourceId`] when re-band-limiting.

use core::fmt;

/// Length in samples of a stored single-cycle waveform.
pub const WAVEFORM_LENGTH: usize = 2048;

/// Handle to a stored waveform resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

/// Owner of waveform assets, addressed by [`ResourceId`].
#[derive(Debug, Default)]
pub struct ResourceManager {
    waveforms: Vec<(ResourceId, Vec<f32>)>,
    next_id: u32,
}

impl ResourceManager {
    /// Create an empty resource manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Store a waveform, padding or truncating to [`WAVEFORM_LENGTH`].
    pub fn add_waveform(&mut self, mut data: Vec<f32>) -> ResourceId {
        data.resize(WAVEFORM_LENGTH, 0.0);
        let id = self.next_id();
        self.waveforms.push((id, data));
        id
    }

    /// Create a single-cycle sawtooth ramp from −1 to just below +1.
    pub fn create_sawtooth(&mut self) -> ResourceId {
        let data = (0..WAVEFORM_LENGTH)
            .map(|i| i as f32 / WAVEFORM_LENGTH as f32 * 2.0 - 1.0)
            .collect();
        self.add_waveform(data)
    }

    /// Look up a stored waveform.
    pub fn waveform(&self, id: ResourceId) -> Option<&[f32]> {
        self.waveforms
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, data)| data.as_slice())
    }
}
