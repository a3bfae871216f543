//! Multi-part score representation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VoxmergeError;
use crate::time::Time;

/// Default tempo (120 bpm) in microseconds per quarter note
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Default codec resolution in pulses per quarter note
pub const DEFAULT_PPQ: u16 = 480;

/// A single timed note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pitch: u8,
    start: Time,
    duration: Time,
    velocity: u8,
}

impl Event {
    /// Pitch and velocity are clamped to the MIDI range 0-127.
    pub fn new(pitch: u8, start: Time, duration: Time, velocity: u8) -> Self {
        Self {
            pitch: pitch.min(127),
            start,
            duration,
            velocity: velocity.min(127),
        }
    }

    /// MIDI note number (0-127, 60 = middle C)
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn start(&self) -> Time {
        self.start
    }

    pub fn duration(&self) -> Time {
        self.duration
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// End time (start + duration)
    pub fn end(&self) -> Time {
        self.start + self.duration
    }

    /// Copy with a different pitch
    pub fn with_pitch(&self, pitch: u8) -> Self {
        Self::new(pitch, self.start, self.duration, self.velocity)
    }

    /// Copy with different timing
    pub fn with_timing(&self, start: Time, duration: Time) -> Self {
        Self::new(self.pitch, start, duration, self.velocity)
    }
}

/// Staff clef tag. Carried as metadata only, it never affects timing or pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    #[default]
    Treble,
    Bass,
    Alto,
    Tenor,
    Soprano,
    Percussion,
}

impl Clef {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Treble => "treble",
            Self::Bass => "bass",
            Self::Alto => "alto",
            Self::Tenor => "tenor",
            Self::Soprano => "soprano",
            Self::Percussion => "percussion",
        }
    }
}

impl FromStr for Clef {
    type Err = VoxmergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "treble" | "g" | "g2" => Ok(Self::Treble),
            "bass" | "f" | "f4" => Ok(Self::Bass),
            "alto" | "c3" => Ok(Self::Alto),
            "tenor" | "c4" => Ok(Self::Tenor),
            "soprano" | "c1" => Ok(Self::Soprano),
            "percussion" => Ok(Self::Percussion),
            other => Err(VoxmergeError::Configuration(format!("unknown clef '{other}'"))),
        }
    }
}

impl fmt::Display for Clef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// General MIDI instruments recognised by name
const GM_NAMES: &[(&str, u8)] = &[
    ("piano", 0),
    ("acoustic grand piano", 0),
    ("bright piano", 1),
    ("electric piano", 4),
    ("harpsichord", 6),
    ("celesta", 8),
    ("glockenspiel", 9),
    ("vibraphone", 11),
    ("marimba", 12),
    ("xylophone", 13),
    ("organ", 19),
    ("church organ", 19),
    ("accordion", 21),
    ("harmonica", 22),
    ("guitar", 24),
    ("acoustic guitar", 24),
    ("electric guitar", 27),
    ("bass", 32),
    ("acoustic bass", 32),
    ("electric bass", 33),
    ("violin", 40),
    ("viola", 41),
    ("cello", 42),
    ("violoncello", 42),
    ("contrabass", 43),
    ("harp", 46),
    ("timpani", 47),
    ("strings", 48),
    ("string ensemble", 48),
    ("choir", 52),
    ("voice", 53),
    ("trumpet", 56),
    ("trombone", 57),
    ("tuba", 58),
    ("horn", 60),
    ("french horn", 60),
    ("saxophone", 65),
    ("alto saxophone", 65),
    ("tenor saxophone", 66),
    ("oboe", 68),
    ("english horn", 69),
    ("bassoon", 70),
    ("clarinet", 71),
    ("piccolo", 72),
    ("flute", 73),
    ("recorder", 74),
];

/// Instrument tag: a display name plus its General MIDI program
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    /// General MIDI program (0-127)
    pub program: u8,
}

impl Instrument {
    pub fn new(name: impl Into<String>, program: u8) -> Self {
        Self {
            name: name.into(),
            program: program.min(127),
        }
    }

    /// Look up a General MIDI program by its common name
    pub fn from_name(name: &str) -> Option<Self> {
        let key = name.trim().to_lowercase();
        GM_NAMES
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(n, p)| Self::new(*n, *p))
    }

    /// Name of a program in the lookup table, if it has one
    pub fn from_program(program: u8) -> Self {
        GM_NAMES
            .iter()
            .find(|(_, p)| *p == program)
            .map(|(n, p)| Self::new(*n, *p))
            .unwrap_or_else(|| Self::new(format!("program {program}"), program))
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::new("piano", 0)
    }
}

impl FromStr for Instrument {
    type Err = VoxmergeError;

    /// Accepts a GM name ("violin") or a raw program number ("40")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(instrument) = Self::from_name(s) {
            return Ok(instrument);
        }
        match s.trim().parse::<u8>() {
            Ok(program) if program <= 127 => Ok(Self::from_program(program)),
            _ => Err(VoxmergeError::Configuration(format!("unknown instrument '{s}'"))),
        }
    }
}

/// Meter, e.g. 4/4 or 6/8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature { numerator: 4, denominator: 4 };

    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self { numerator, denominator }
    }

    /// Bar length in quarter notes
    pub fn bar_length(&self) -> Time {
        Time::new(self.numerator as u64 * 4, self.denominator as u64)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl FromStr for TimeSignature {
    type Err = VoxmergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VoxmergeError::Configuration(format!("invalid time signature '{s}'"));
        let (num, den) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator: u8 = num.trim().parse().map_err(|_| invalid())?;
        let denominator: u8 = den.trim().parse().map_err(|_| invalid())?;
        if !(1..=32).contains(&numerator) || !denominator.is_power_of_two() || denominator > 32 {
            return Err(invalid());
        }
        Ok(Self { numerator, denominator })
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// One instrumental line. Events are kept ordered by start time and may overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub instrument: Instrument,
    pub clef: Clef,
    events: Vec<Event>,
}

impl Part {
    pub fn new(name: impl Into<String>, instrument: Instrument, clef: Clef) -> Self {
        Self {
            name: name.into(),
            instrument,
            clef,
            events: Vec::new(),
        }
    }

    /// Replace the events, stably sorting them by start time
    pub fn with_events(mut self, mut events: Vec<Event>) -> Self {
        events.sort_by_key(|e| e.start());
        self.events = events;
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn note_count(&self) -> usize {
        self.events.len()
    }

    /// Latest event end, zero for an empty part
    pub fn end(&self) -> Time {
        self.events.iter().map(Event::end).max().unwrap_or(Time::ZERO)
    }

    /// Copy of this part's tags with a new event list
    pub fn map_events<F>(&self, f: F) -> Part
    where
        F: FnMut(&Event) -> Option<Event>,
    {
        let events = self.events.iter().filter_map(f).collect();
        Part::new(self.name.clone(), self.instrument.clone(), self.clef).with_events(events)
    }
}

/// A complete score: the unit read from and written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub parts: Vec<Part>,
    pub time_signature: TimeSignature,
    /// Microseconds per quarter note
    pub tempo: u32,
    /// Source resolution, preserved so writing does not lose timing detail
    pub ppq: u16,
    pub title: Option<String>,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            time_signature: TimeSignature::COMMON,
            tempo: DEFAULT_TEMPO,
            ppq: DEFAULT_PPQ,
            title: None,
        }
    }
}

impl Score {
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            parts,
            ..Default::default()
        }
    }

    /// Copy of the metadata with a fresh set of parts
    pub fn with_parts(&self, parts: Vec<Part>) -> Score {
        Score {
            parts,
            time_signature: self.time_signature,
            tempo: self.tempo,
            ppq: self.ppq,
            title: self.title.clone(),
        }
    }

    /// Apply the same per-event rewrite to every part
    pub fn map_events<F>(&self, mut f: F) -> Score
    where
        F: FnMut(&Event) -> Option<Event>,
    {
        let parts = self.parts.iter().map(|p| p.map_events(&mut f)).collect();
        self.with_parts(parts)
    }

    pub fn event_count(&self) -> usize {
        self.parts.iter().map(Part::note_count).sum()
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.parts.iter().flat_map(|p| p.events().iter())
    }

    /// Latest event end across all parts
    pub fn end(&self) -> Time {
        self.parts.iter().map(Part::end).max().unwrap_or(Time::ZERO)
    }

    /// Number of bars needed to hold every event
    pub fn measure_count(&self) -> u64 {
        let bar = self.time_signature.bar_length();
        let end = self.end();
        let full = end.div_floor(bar);
        if end.is_multiple_of(bar) { full } else { full + 1 }
    }
}
