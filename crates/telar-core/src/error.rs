//! Build-time error taxonomy for the graph construction path.
//!
//! Builder operations return `Result<_, BuildError>`; nothing on the
//! per-block audio path returns errors (missing buffers are skipped
//! defensively instead).

use crate::object::{ChainIndex, ObjectId};
use crate::resource::ResourceId;

/// Errors raised while a scripted routine assembles the voice graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// Referenced audio buffer id is not registered.
    #[error("audio buffer {0} not found")]
    AudioBufferNotFound(ObjectId),

    /// Modulation source id does not resolve to a producer.
    #[error("modulation source {0} not found")]
    ModulationSourceNotFound(ObjectId),

    /// Modulation destination id does not resolve to an oscillator or effect.
    #[error("modulation destination {0} not found")]
    ModulationDestinationNotFound(ObjectId),

    /// The producer has no output port with this name.
    #[error("modulation source has no output port named `{0}`")]
    ModulationSourceParamNotFound(String),

    /// The destination declares no port with this name.
    #[error("modulation destination has no port named `{0}`")]
    ModulationDestinationParamNotFound(String),

    /// Oscillator amplitude must lie in [0, 1].
    #[error("oscillator amplitude {0} outside [0, 1]")]
    AmplitudeOutOfRange(f32),

    /// Referenced effect chain does not exist.
    #[error("effect {0} not found")]
    EffectChainNotFound(ChainIndex),

    /// Referenced oscillator id is not registered.
    #[error("oscillator {0} not found")]
    OscillatorNotFound(ObjectId),

    /// Referenced waveform resource does not exist.
    #[error("waveform resource {0} not found")]
    WaveformNotFound(ResourceId),

    /// Effect parameter payload failed to parse or validate.
    #[error("invalid effect parameters: {0}")]
    InvalidParams(String),
}
