//! Telar Script - the graph-builder contract.
//!
//! A scripted routine assembles one template voice through the
//! [`VoiceBuilder`] operation surface; the [`Program`] driver runs that
//! routine once per pool slot, and [`ScriptSynth`] wraps the result behind
//! the host-facing lifecycle API (`from_script_*`, `prepare`,
//! `process_midi_event`, `process_block`).
//!
//! # Core Abstractions
//!
//! - [`VoiceScript`] - the call contract the engine requires of any
//!   construction routine (pool size + per-voice build)
//! - [`VoiceBuilder`] - the fixed operation set a routine builds through;
//!   an explicit per-build context, re-entrant across engine instances
//! - [`PatchScript`] - a small line-oriented patch text implementing
//!   [`VoiceScript`]; the scripting language proper stays an external
//!   collaborator
//! - [`Program`] / [`ScriptSynth`] - the build driver and engine facade
//!
//! Builder calls allocate and must finish before the first
//! `process_block`. A failed parse or build leaves the engine with zero
//! voices and a logged diagnostic — never a partially applied graph.

pub mod builder;
pub mod engine;
pub mod error;
pub mod patch;
pub mod program;
pub mod script;

pub use builder::VoiceBuilder;
pub use engine::ScriptSynth;
pub use error::ScriptError;
pub use patch::PatchScript;
pub use program::Program;
pub use script::VoiceScript;
