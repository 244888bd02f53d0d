//! A minimal line-oriented patch text implementing [`VoiceScript`].
//!
//! The scripting language proper is an external collaborator; this format
//! exists so the whole construction path can be driven from plain text.
//! One statement per line:
//!
//! ```text
//! # two detuned saws through a master filter
//! voices 4
//!
//! let saw   = sawtooth
//! let buf   = voice_buffer channels=2
//! let osc   = waveform_osc channels=2 waveform=saw amplitude=0.8 buffer=buf
//! let env   = envelope attack=0.01 release=0.3
//! env.output -> osc.amplitude amount=1.0
//!
//! let mix   = buffer channels=2
//! let fx    = chain channels=2 input=mix output=mix
//! let lp    = filter chain=fx type=lowpass cutoff=2500 resonance=0.4
//! output buffer=buf master=mix
//! to_master buffer=mix
//! portamento time=0.05
//! rand_detune spread=0.08
//! ```
//!
//! `voices N` sizes the pool. `let` binds the id an operation returns to a
//! name; later arguments refer to bound names. `src.port -> dst.port`
//! registers a modulation route. `params={...}` passes a JSON payload
//! through to the effect untouched. `#` starts a comment. Unknown
//! operations, unbound names, and kind mismatches fail the parse; port
//! names are resolved later, when the graph is built.

use std::collections::HashMap;

use telar_core::{BuildError, ChainIndex, ObjectId, ResourceId};

use crate::builder::VoiceBuilder;
use crate::error::ScriptError;
use crate::script::VoiceScript;

/// What kind of thing a `let` name is bound to; checked while parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NameKind {
    Oscillator,
    VoiceBuffer,
    MasterBuffer,
    Chain,
    Producer,
    Resource,
    Effect,
}

impl NameKind {
    fn describe(self) -> &'static str {
        match self {
            NameKind::Oscillator => "oscillator",
            NameKind::VoiceBuffer => "voice buffer",
            NameKind::MasterBuffer => "master buffer",
            NameKind::Chain => "effect chain",
            NameKind::Producer => "modulation producer",
            NameKind::Resource => "waveform resource",
            NameKind::Effect => "effect",
        }
    }
}

/// A parsed argument value.
#[derive(Clone, Debug)]
enum RawValue {
    Number(f32),
    Ident(String),
    Bool(bool),
    Json(String),
}

/// One executable statement.
#[derive(Clone, Debug)]
enum Stmt {
    Op { binding: Option<String>, op: Op },
    Route {
        source: String,
        source_port: String,
        target: String,
        target_port: String,
        amount: f32,
        centered: bool,
    },
}

/// Operations of the builder surface reachable from patch text.
#[derive(Clone, Debug)]
enum Op {
    SineOsc {
        channels: usize,
        amplitude: f32,
        buffer: Option<String>,
    },
    WaveformOsc {
        channels: usize,
        waveform: String,
        amplitude: f32,
        buffer: Option<String>,
    },
    Sawtooth,
    Envelope { adsr: Option<[f32; 4]> },
    VoiceBuffer { channels: usize },
    MasterBuffer { channels: usize },
    AssignBuffer { osc: String, buffer: String },
    VoiceChain {
        channels: usize,
        input: String,
        output: String,
    },
    MasterChain {
        channels: usize,
        input: String,
        output: String,
    },
    FilterTyped {
        chain: String,
        kind: String,
        cutoff: f32,
        resonance: f32,
    },
    FilterJson { chain: String, json: String },
    Distortion { chain: String, json: String },
    Diffusion { chain: String, json: String },
    Output {
        buffer: String,
        master: Option<String>,
    },
    ToMaster { buffer: String },
    Portamento { time: f32, always: bool },
    RandDetune { spread: f32 },
    FreqOffset { osc: String, semitones: f32 },
}

/// What a name resolves to while a build executes.
#[derive(Clone, Copy, Debug)]
enum Bound {
    Object(ObjectId),
    Chain(ChainIndex),
    Resource(ResourceId),
}

/// A parsed patch, ready to drive voice builds.
#[derive(Clone, Debug)]
pub struct PatchScript {
    n_voices: usize,
    stmts: Vec<Stmt>,
}

impl PatchScript {
    /// Parse patch text. Every statement is validated here — operations,
    /// argument forms, name binding and kinds — so that executing the
    /// patch can only fail inside the engine.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut n_voices = 0usize;
        let mut stmts = Vec::new();
        let mut names: HashMap<String, NameKind> = HashMap::new();

        for (i, raw_line) in text.lines().enumerate() {
            let line = i + 1;
            let text = strip_comment(raw_line).trim();
            if text.is_empty() {
                continue;
            }
            let fields = split_fields(text);

            if fields[0] == "voices" {
                let count = fields
                    .get(1)
                    .and_then(|f| f.parse::<usize>().ok())
                    .ok_or_else(|| ScriptError::MalformedLine {
                        line,
                        text: text.to_owned(),
                    })?;
                n_voices = count;
                continue;
            }

            if fields.len() >= 3 && fields[1] == "->" {
                stmts.push(parse_route(line, &fields, &names)?);
                continue;
            }

            stmts.push(parse_op(line, text, &fields, &mut names)?);
        }

        Ok(Self { n_voices, stmts })
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Split on whitespace, except inside `{...}` payloads.
fn split_fields(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut cur = String::new();
    for ch in s.chars() {
        match ch {
            '{' => {
                depth += 1;
                cur.push(ch);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                cur.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !cur.is_empty() {
                    out.push(core::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn parse_value(v: &str) -> RawValue {
    if v.starts_with('{') {
        return RawValue::Json(v.to_owned());
    }
    match v {
        "true" => return RawValue::Bool(true),
        "false" => return RawValue::Bool(false),
        _ => {}
    }
    if let Ok(n) = v.parse::<f32>() {
        return RawValue::Number(n);
    }
    RawValue::Ident(v.to_owned())
}

/// Key/value arguments of one operation, with op-aware error reporting.
struct Args {
    line: usize,
    op: &'static str,
    items: Vec<(String, RawValue)>,
}

impl Args {
    fn collect(line: usize, op: &'static str, fields: &[String]) -> Result<Self, ScriptError> {
        let mut items = Vec::new();
        for field in fields {
            let Some((key, value)) = field.split_once('=') else {
                return Err(ScriptError::MalformedLine {
                    line,
                    text: field.clone(),
                });
            };
            items.push((key.to_owned(), parse_value(value)));
        }
        Ok(Self { line, op, items })
    }

    fn get(&self, key: &str) -> Option<&RawValue> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn bad(&self, key: &str, expected: &'static str, got: &RawValue) -> ScriptError {
        ScriptError::BadArg {
            line: self.line,
            key: key.to_owned(),
            expected,
            got: format!("{got:?}"),
        }
    }

    fn missing(&self, key: &'static str) -> ScriptError {
        ScriptError::MissingArg {
            line: self.line,
            op: self.op,
            key,
        }
    }

    fn number(&self, key: &str) -> Result<Option<f32>, ScriptError> {
        match self.get(key) {
            None => Ok(None),
            Some(RawValue::Number(n)) => Ok(Some(*n)),
            Some(v) => Err(self.bad(key, "a number", v)),
        }
    }

    fn number_or(&self, key: &str, default: f32) -> Result<f32, ScriptError> {
        Ok(self.number(key)?.unwrap_or(default))
    }

    fn require_number(&self, key: &'static str) -> Result<f32, ScriptError> {
        self.number(key)?.ok_or_else(|| self.missing(key))
    }

    fn channels(&self) -> Result<usize, ScriptError> {
        let n = self.number_or("channels", 2.0)?;
        if n < 1.0 || n.fract() != 0.0 {
            return Err(ScriptError::BadArg {
                line: self.line,
                key: "channels".to_owned(),
                expected: "a positive integer",
                got: n.to_string(),
            });
        }
        Ok(n as usize)
    }

    fn ident(&self, key: &str) -> Result<Option<&str>, ScriptError> {
        match self.get(key) {
            None => Ok(None),
            Some(RawValue::Ident(s)) => Ok(Some(s)),
            Some(v) => Err(self.bad(key, "a name", v)),
        }
    }

    fn require_ident(&self, key: &'static str) -> Result<&str, ScriptError> {
        self.ident(key)?.ok_or_else(|| self.missing(key))
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ScriptError> {
        match self.get(key) {
            None => Ok(default),
            Some(RawValue::Bool(b)) => Ok(*b),
            Some(v) => Err(self.bad(key, "true or false", v)),
        }
    }

    fn json(&self, key: &str) -> Result<Option<&str>, ScriptError> {
        match self.get(key) {
            None => Ok(None),
            Some(RawValue::Json(s)) => Ok(Some(s)),
            Some(v) => Err(self.bad(key, "a {...} payload", v)),
        }
    }
}

fn expect_kind(
    names: &HashMap<String, NameKind>,
    name: &str,
    allowed: &[NameKind],
    expected: &'static str,
    line: usize,
) -> Result<(), ScriptError> {
    let kind = names
        .get(name)
        .copied()
        .ok_or_else(|| ScriptError::UnboundName {
            line,
            name: name.to_owned(),
        })?;
    if !allowed.contains(&kind) {
        return Err(ScriptError::WrongKind {
            line,
            name: name.to_owned(),
            expected,
            actual: kind.describe(),
        });
    }
    Ok(())
}

fn split_port_ref(field: &str, line: usize) -> Result<(String, String), ScriptError> {
    field
        .split_once('.')
        .filter(|(n, p)| !n.is_empty() && !p.is_empty())
        .map(|(n, p)| (n.to_owned(), p.to_owned()))
        .ok_or_else(|| ScriptError::MalformedLine {
            line,
            text: field.to_owned(),
        })
}

fn parse_route(
    line: usize,
    fields: &[String],
    names: &HashMap<String, NameKind>,
) -> Result<Stmt, ScriptError> {
    let (source, source_port) = split_port_ref(&fields[0], line)?;
    let (target, target_port) = split_port_ref(&fields[2], line)?;
    expect_kind(
        names,
        &source,
        &[NameKind::Producer],
        "modulation producer",
        line,
    )?;
    expect_kind(
        names,
        &target,
        &[NameKind::Oscillator, NameKind::Effect],
        "oscillator or effect",
        line,
    )?;

    let mut amount = 1.0;
    let mut centered = false;
    for field in &fields[3..] {
        if field == "centered" {
            centered = true;
            continue;
        }
        match field.split_once('=') {
            Some(("amount", v)) => {
                amount = v.parse::<f32>().map_err(|_| ScriptError::BadArg {
                    line,
                    key: "amount".to_owned(),
                    expected: "a number",
                    got: v.to_owned(),
                })?;
            }
            _ => {
                return Err(ScriptError::MalformedLine {
                    line,
                    text: field.clone(),
                });
            }
        }
    }

    Ok(Stmt::Route {
        source,
        source_port,
        target,
        target_port,
        amount,
        centered,
    })
}

fn parse_op(
    line: usize,
    text: &str,
    fields: &[String],
    names: &mut HashMap<String, NameKind>,
) -> Result<Stmt, ScriptError> {
    let (binding, rest) = if fields[0] == "let" {
        let malformed = || ScriptError::MalformedLine {
            line,
            text: text.to_owned(),
        };
        if fields.len() < 4 || fields[2] != "=" {
            return Err(malformed());
        }
        (Some(fields[1].clone()), &fields[3..])
    } else {
        (None, fields)
    };

    let op_name = rest[0].as_str();
    let args = |op| Args::collect(line, op, &rest[1..]);

    // Each arm validates argument names and kinds; the names map is only
    // extended after the whole statement checks out.
    let (op, bound_kind) = match op_name {
        "sine_osc" => {
            let a = args("sine_osc")?;
            let buffer = a.ident("buffer")?.map(str::to_owned);
            if let Some(b) = &buffer {
                expect_kind(names, b, &[NameKind::VoiceBuffer], "voice buffer", line)?;
            }
            (
                Op::SineOsc {
                    channels: a.channels()?,
                    amplitude: a.number_or("amplitude", 1.0)?,
                    buffer,
                },
                Some(NameKind::Oscillator),
            )
        }
        "waveform_osc" => {
            let a = args("waveform_osc")?;
            let waveform = a.require_ident("waveform")?.to_owned();
            expect_kind(
                names,
                &waveform,
                &[NameKind::Resource],
                "waveform resource",
                line,
            )?;
            let buffer = a.ident("buffer")?.map(str::to_owned);
            if let Some(b) = &buffer {
                expect_kind(names, b, &[NameKind::VoiceBuffer], "voice buffer", line)?;
            }
            (
                Op::WaveformOsc {
                    channels: a.channels()?,
                    waveform,
                    amplitude: a.number_or("amplitude", 1.0)?,
                    buffer,
                },
                Some(NameKind::Oscillator),
            )
        }
        "sawtooth" => (Op::Sawtooth, Some(NameKind::Resource)),
        "envelope" => {
            let a = args("envelope")?;
            let given = ["attack", "decay", "sustain", "release"]
                .iter()
                .any(|k| a.get(k).is_some());
            let adsr = if given {
                Some([
                    a.number_or("attack", 0.01)?,
                    a.number_or("decay", 0.1)?,
                    a.number_or("sustain", 0.4)?,
                    a.number_or("release", 0.2)?,
                ])
            } else {
                None
            };
            (Op::Envelope { adsr }, Some(NameKind::Producer))
        }
        "voice_buffer" => {
            let a = args("voice_buffer")?;
            (
                Op::VoiceBuffer {
                    channels: a.channels()?,
                },
                Some(NameKind::VoiceBuffer),
            )
        }
        "buffer" => {
            let a = args("buffer")?;
            (
                Op::MasterBuffer {
                    channels: a.channels()?,
                },
                Some(NameKind::MasterBuffer),
            )
        }
        "assign_buffer" => {
            let a = args("assign_buffer")?;
            let osc = a.require_ident("osc")?.to_owned();
            let buffer = a.require_ident("buffer")?.to_owned();
            expect_kind(names, &osc, &[NameKind::Oscillator], "oscillator", line)?;
            expect_kind(names, &buffer, &[NameKind::VoiceBuffer], "voice buffer", line)?;
            (Op::AssignBuffer { osc, buffer }, None)
        }
        "voice_chain" | "chain" => {
            let master = op_name == "chain";
            let a = args(if master { "chain" } else { "voice_chain" })?;
            let input = a.require_ident("input")?.to_owned();
            let output = a.require_ident("output")?.to_owned();
            let buffer_kind = if master {
                NameKind::MasterBuffer
            } else {
                NameKind::VoiceBuffer
            };
            for name in [&input, &output] {
                expect_kind(names, name, &[buffer_kind], buffer_kind.describe(), line)?;
            }
            let channels = a.channels()?;
            let op = if master {
                Op::MasterChain {
                    channels,
                    input,
                    output,
                }
            } else {
                Op::VoiceChain {
                    channels,
                    input,
                    output,
                }
            };
            (op, Some(NameKind::Chain))
        }
        "filter" => {
            let a = args("filter")?;
            let chain = a.require_ident("chain")?.to_owned();
            expect_kind(names, &chain, &[NameKind::Chain], "effect chain", line)?;
            let op = if let Some(json) = a.json("params")? {
                Op::FilterJson {
                    chain,
                    json: json.to_owned(),
                }
            } else {
                Op::FilterTyped {
                    chain,
                    kind: a.ident("type")?.unwrap_or("lowpass").to_owned(),
                    cutoff: a.number_or("cutoff", 1_000.0)?,
                    resonance: a.number_or("resonance", 0.5)?,
                }
            };
            (op, Some(NameKind::Effect))
        }
        "distortion" | "diffusion" => {
            let a = args(if op_name == "distortion" {
                "distortion"
            } else {
                "diffusion"
            })?;
            let chain = a.require_ident("chain")?.to_owned();
            expect_kind(names, &chain, &[NameKind::Chain], "effect chain", line)?;
            let json = a.json("params")?.unwrap_or("{}").to_owned();
            let op = if op_name == "distortion" {
                Op::Distortion { chain, json }
            } else {
                Op::Diffusion { chain, json }
            };
            (op, Some(NameKind::Effect))
        }
        "output" => {
            let a = args("output")?;
            let buffer = a.require_ident("buffer")?.to_owned();
            expect_kind(names, &buffer, &[NameKind::VoiceBuffer], "voice buffer", line)?;
            let master = a.ident("master")?.map(str::to_owned);
            if let Some(m) = &master {
                expect_kind(names, m, &[NameKind::MasterBuffer], "master buffer", line)?;
            }
            (Op::Output { buffer, master }, None)
        }
        "to_master" => {
            let a = args("to_master")?;
            let buffer = a.require_ident("buffer")?.to_owned();
            expect_kind(names, &buffer, &[NameKind::MasterBuffer], "master buffer", line)?;
            (Op::ToMaster { buffer }, None)
        }
        "portamento" => {
            let a = args("portamento")?;
            (
                Op::Portamento {
                    time: a.require_number("time")?,
                    always: a.bool_or("always", false)?,
                },
                None,
            )
        }
        "rand_detune" => {
            let a = args("rand_detune")?;
            (
                Op::RandDetune {
                    spread: a.require_number("spread")?,
                },
                None,
            )
        }
        "freq_offset" => {
            let a = args("freq_offset")?;
            let osc = a.require_ident("osc")?.to_owned();
            expect_kind(names, &osc, &[NameKind::Oscillator], "oscillator", line)?;
            (
                Op::FreqOffset {
                    osc,
                    semitones: a.require_number("semitones")?,
                },
                None,
            )
        }
        other => {
            return Err(ScriptError::UnknownOp {
                line,
                op: other.to_owned(),
            });
        }
    };

    match (&binding, bound_kind) {
        (Some(name), Some(kind)) => {
            names.insert(name.clone(), kind);
        }
        (Some(_), None) => {
            return Err(ScriptError::MalformedLine {
                line,
                text: text.to_owned(),
            });
        }
        (None, _) => {}
    }

    Ok(Stmt::Op { binding, op })
}

// ----------------------------------------------------------------------
// Execution
// ----------------------------------------------------------------------

/// The parser guarantees kinds, so lookups here only defend against the
/// impossible: a fallback id the engine reports as not-found.
fn object(env: &HashMap<String, Bound>, name: &str) -> ObjectId {
    match env.get(name) {
        Some(Bound::Object(id)) => *id,
        _ => ObjectId(0),
    }
}

fn chain(env: &HashMap<String, Bound>, name: &str) -> ChainIndex {
    match env.get(name) {
        Some(Bound::Chain(idx)) => *idx,
        _ => ChainIndex(i32::MAX),
    }
}

fn resource(env: &HashMap<String, Bound>, name: &str) -> ResourceId {
    match env.get(name) {
        Some(Bound::Resource(id)) => *id,
        _ => ResourceId(u32::MAX),
    }
}

impl VoiceScript for PatchScript {
    fn num_voices(&self) -> usize {
        self.n_voices
    }

    fn build_voice(&self, builder: &mut VoiceBuilder<'_>) -> Result<(), BuildError> {
        let mut env: HashMap<String, Bound> = HashMap::new();
        for stmt in &self.stmts {
            match stmt {
                Stmt::Route {
                    source,
                    source_port,
                    target,
                    target_port,
                    amount,
                    centered,
                } => {
                    builder.add_modulation(
                        object(&env, source),
                        source_port,
                        object(&env, target),
                        target_port,
                        *amount,
                        *centered,
                    )?;
                }
                Stmt::Op { binding, op } => {
                    let bound = self.execute(builder, &env, op)?;
                    if let (Some(name), Some(value)) = (binding, bound) {
                        env.insert(name.clone(), value);
                    }
                }
            }
        }
        Ok(())
    }
}

impl PatchScript {
    fn execute(
        &self,
        b: &mut VoiceBuilder<'_>,
        env: &HashMap<String, Bound>,
        op: &Op,
    ) -> Result<Option<Bound>, BuildError> {
        let bound = match op {
            Op::SineOsc {
                channels,
                amplitude,
                buffer,
            } => {
                let buffer = buffer.as_deref().map(|n| object(env, n));
                Some(Bound::Object(b.add_sine_osc(*channels, *amplitude, buffer)?))
            }
            Op::WaveformOsc {
                channels,
                waveform,
                amplitude,
                buffer,
            } => {
                let buffer = buffer.as_deref().map(|n| object(env, n));
                Some(Bound::Object(b.add_waveform_osc(
                    *channels,
                    resource(env, waveform),
                    *amplitude,
                    buffer,
                )?))
            }
            Op::Sawtooth => Some(Bound::Resource(b.create_sawtooth_waveform())),
            Op::Envelope { adsr } => Some(Bound::Object(b.add_basic_envelope(*adsr))),
            Op::VoiceBuffer { channels } => {
                Some(Bound::Object(b.add_voice_audio_buffer(*channels)))
            }
            Op::MasterBuffer { channels } => Some(Bound::Object(b.add_audio_buffer(*channels))),
            Op::AssignBuffer { osc, buffer } => {
                b.assign_oscillator_audio_buffer(object(env, osc), object(env, buffer))?;
                None
            }
            Op::VoiceChain {
                channels,
                input,
                output,
            } => Some(Bound::Chain(b.add_voice_effect_chain(
                *channels,
                object(env, input),
                object(env, output),
            )?)),
            Op::MasterChain {
                channels,
                input,
                output,
            } => Some(Bound::Chain(b.add_effect_chain(
                *channels,
                object(env, input),
                object(env, output),
            )?)),
            Op::FilterTyped {
                chain: c,
                kind,
                cutoff,
                resonance,
            } => Some(Bound::Object(b.add_filter_effect(
                chain(env, c),
                kind,
                *cutoff,
                *resonance,
            )?)),
            Op::FilterJson { chain: c, json } => {
                Some(Bound::Object(b.add_filter_effect_json(chain(env, c), json)?))
            }
            Op::Distortion { chain: c, json } => Some(Bound::Object(
                b.add_distortion_effect_json(chain(env, c), json)?,
            )),
            Op::Diffusion { chain: c, json } => Some(Bound::Object(
                b.add_diffusion_effect_json(chain(env, c), json)?,
            )),
            Op::Output { buffer, master } => {
                let master = master.as_deref().map(|n| object(env, n));
                b.add_voice_output(object(env, buffer), master)?;
                None
            }
            Op::ToMaster { buffer } => {
                b.add_buffer_to_master(object(env, buffer))?;
                None
            }
            Op::Portamento { time, always } => {
                b.set_portamento(*time, *always);
                None
            }
            Op::RandDetune { spread } => {
                b.set_voice_rand_detune(*spread);
                None
            }
            Op::FreqOffset { osc, semitones } => {
                b.set_oscillator_frequency_offset(object(env, osc), *semitones)?;
                None
            }
        };
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voices_header_sizes_the_pool() {
        let patch = PatchScript::parse("voices 6\n").unwrap();
        assert_eq!(patch.num_voices(), 6);
    }

    #[test]
    fn missing_header_means_zero_voices() {
        let patch = PatchScript::parse("let b = voice_buffer channels=2\n").unwrap();
        assert_eq!(patch.num_voices(), 0);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let patch = PatchScript::parse(
            "# a comment\n\nvoices 2  # trailing comment\n   \n",
        )
        .unwrap();
        assert_eq!(patch.num_voices(), 2);
        assert!(patch.stmts.is_empty());
    }

    #[test]
    fn unknown_op_fails_the_parse() {
        let err = PatchScript::parse("let x = ring_mod channels=2\n").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::UnknownOp { line: 1, ref op } if op == "ring_mod"
        ));
    }

    #[test]
    fn unbound_name_fails_the_parse() {
        let err =
            PatchScript::parse("let o = sine_osc buffer=nowhere\n").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::UnboundName { line: 1, ref name } if name == "nowhere"
        ));
    }

    #[test]
    fn kind_mismatch_fails_the_parse() {
        let text = "let env = envelope\nlet o = sine_osc buffer=env\n";
        let err = PatchScript::parse(text).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::WrongKind { line: 2, ref name, expected: "voice buffer", .. }
                if name == "env"
        ));
    }

    #[test]
    fn route_requires_producer_source() {
        let text = "let b = voice_buffer\nlet o = sine_osc buffer=b\n\
                    o.pitch -> o.amplitude amount=1\n";
        let err = PatchScript::parse(text).unwrap_err();
        assert!(matches!(err, ScriptError::WrongKind { line: 3, .. }));
    }

    #[test]
    fn missing_required_arg_is_reported() {
        let err = PatchScript::parse("freq_offset semitones=-12\n").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::MissingArg { op: "freq_offset", key: "osc", .. }
        ));
    }

    #[test]
    fn binding_a_non_binding_op_is_malformed() {
        let err = PatchScript::parse("let x = portamento time=0.1\n").unwrap_err();
        assert!(matches!(err, ScriptError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn json_payloads_survive_spaces() {
        let text = "voices 1\nlet m = buffer\nlet c = chain input=m output=m\n\
                    let d = distortion chain=c params={\"drive\": 4.0, \"mix\": 0.5}\n";
        let patch = PatchScript::parse(text).unwrap();
        let Stmt::Op { op: Op::Distortion { json, .. }, .. } = &patch.stmts[2] else {
            panic!("expected a distortion op, got {:?}", patch.stmts[2]);
        };
        assert_eq!(json, "{\"drive\": 4.0, \"mix\": 0.5}");
    }

    #[test]
    fn route_amount_and_centered_parse() {
        let text = "let e = envelope\nlet b = voice_buffer\nlet o = sine_osc buffer=b\n\
                    e.output -> o.pitch amount=0.5 centered\n";
        let patch = PatchScript::parse(text).unwrap();
        let Stmt::Route { amount, centered, .. } = &patch.stmts[3] else {
            panic!("expected a route, got {:?}", patch.stmts[3]);
        };
        assert_eq!(*amount, 0.5);
        assert!(*centered);
    }

    #[test]
    fn envelope_defaults_fill_missing_fields() {
        let patch = PatchScript::parse("let e = envelope attack=0.5\n").unwrap();
        let Stmt::Op { op: Op::Envelope { adsr: Some(adsr) }, .. } = &patch.stmts[0] else {
            panic!("expected an envelope with adsr, got {:?}", patch.stmts[0]);
        };
        assert_eq!(*adsr, [0.5, 0.1, 0.4, 0.2]);
    }

    #[test]
    fn bad_channel_count_is_rejected() {
        let err = PatchScript::parse("let b = voice_buffer channels=0\n").unwrap_err();
        assert!(matches!(err, ScriptError::BadArg { .. }));
        let err = PatchScript::parse("let b = voice_buffer channels=1.5\n").unwrap_err();
        assert!(matches!(err, ScriptError::BadArg { .. }));
    }
}
