//! Standard MIDI File codec
//!
//! Reads any metrical SMF (format 0, 1 or 2) into a [`Score`], one part per
//! track and channel pair, and writes scores back as format 1 files: a
//! conductor track carrying tempo and meter, then one track per part.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use thiserror::Error;
use tracing::debug;
use voxmerge_core::{Clef, Event, Instrument, Part, Score, Time, TimeSignature, DEFAULT_PPQ};

const PERCUSSION_CHANNEL: u8 = 9;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed MIDI data: {0}")]
    Malformed(String),
    #[error("Unsupported timing: {0}")]
    UnsupportedTiming(String),
}

/// Read and decode a MIDI file
pub fn read_score(path: &Path) -> Result<Score, CodecError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

/// Encode and write a score as a MIDI file
pub fn write_score(score: &Score, path: &Path) -> Result<(), CodecError> {
    let bytes = encode(score)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Default)]
struct PartBuilder {
    program: Option<u8>,
    events: Vec<Event>,
    /// Sounding notes per key: (start tick, velocity). Overlapping notes on
    /// one key are closed oldest first.
    open: HashMap<u8, VecDeque<(u64, u8)>>,
}

impl PartBuilder {
    fn note_on(&mut self, key: u8, vel: u8, tick: u64) {
        self.open.entry(key).or_default().push_back((tick, vel));
    }

    fn note_off(&mut self, key: u8, tick: u64, ppq: u16) {
        if let Some((start, vel)) = self.open.get_mut(&key).and_then(VecDeque::pop_front) {
            self.close(key, start, vel, tick, ppq);
        }
    }

    fn close(&mut self, key: u8, start: u64, vel: u8, end: u64, ppq: u16) {
        // Zero-length notes carry nothing playable
        if end > start {
            self.events.push(Event::new(
                key,
                Time::from_ticks(start, ppq),
                Time::from_ticks(end - start, ppq),
                vel,
            ));
        }
    }

    /// Close notes still sounding when their track ends
    fn finish(&mut self, end: u64, ppq: u16) {
        let mut dangling: Vec<(u8, u64, u8)> = self.open
            .drain()
            .flat_map(|(key, notes)| notes.into_iter().map(move |(start, vel)| (key, start, vel)))
            .collect();
        dangling.sort_unstable();
        for (key, start, vel) in dangling {
            self.close(key, start, vel, end, ppq);
        }
    }
}

/// Decode SMF bytes into a score
pub fn decode(bytes: &[u8]) -> Result<Score, CodecError> {
    let smf = Smf::parse(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let ppq = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(fps, sub) => {
            return Err(CodecError::UnsupportedTiming(format!(
                "SMPTE timecode ({} fps, {} subframes)",
                fps.as_f32(),
                sub
            )));
        }
    };
    if ppq == 0 {
        return Err(CodecError::Malformed("zero ticks per quarter note".into()));
    }

    let mut score = Score {
        ppq,
        ..Default::default()
    };
    let mut tempo = None;
    let mut meter = None;
    let mut builders: BTreeMap<(usize, u8), PartBuilder> = BTreeMap::new();
    let mut track_names: Vec<Option<String>> = Vec::with_capacity(smf.tracks.len());

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        let mut name = None;
        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let builder = builders.entry((track_index, channel.as_int())).or_default();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            builder.note_on(key.as_int(), vel.as_int(), tick);
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            builder.note_off(key.as_int(), tick, ppq);
                        }
                        MidiMessage::ProgramChange { program } => {
                            builder.program.get_or_insert(program.as_int());
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
                    tempo.get_or_insert(micros.as_int());
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow, _, _)) => {
                    if den_pow <= 5 && num > 0 {
                        meter.get_or_insert(TimeSignature::new(num, 1 << den_pow));
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    name.get_or_insert_with(|| String::from_utf8_lossy(raw).trim().to_string());
                }
                _ => {}
            }
        }
        for ((t, _), builder) in builders.range_mut((track_index, 0)..=(track_index, u8::MAX)) {
            debug_assert_eq!(*t, track_index);
            builder.finish(tick, ppq);
        }
        track_names.push(name.filter(|n| !n.is_empty()));
    }

    if let Some(tempo) = tempo {
        score.tempo = tempo;
    }
    if let Some(meter) = meter {
        score.time_signature = meter;
    }

    // A leading track without notes is the conductor track; its name titles the score
    let first_has_notes = builders.iter().any(|((t, _), b)| *t == 0 && !b.events.is_empty());
    if !first_has_notes {
        score.title = track_names.first().cloned().flatten();
    }

    let channels_per_track = builders.keys().fold(HashMap::new(), |mut acc: HashMap<usize, usize>, (t, _)| {
        *acc.entry(*t).or_default() += 1;
        acc
    });

    for ((track_index, channel), builder) in builders {
        if builder.events.is_empty() {
            continue;
        }
        let instrument = Instrument::from_program(builder.program.unwrap_or(0));
        let base = track_names[track_index]
            .clone()
            .unwrap_or_else(|| format!("Track {}", track_index + 1));
        let name = if channels_per_track.get(&track_index).copied().unwrap_or(1) > 1 {
            format!("{base} ch{}", channel + 1)
        } else {
            base
        };
        let clef = if channel == PERCUSSION_CHANNEL { Clef::Percussion } else { Clef::Treble };
        score.parts.push(Part::new(name, instrument, clef).with_events(builder.events));
    }

    debug!(
        "Decoded {} part(s), {} note(s), ppq {}",
        score.parts.len(),
        score.event_count(),
        ppq
    );
    Ok(score)
}

// ============================================================================
// Encoding
// ============================================================================

/// Channel for the n-th melodic part, skipping the percussion channel
fn melodic_channel(index: usize) -> u8 {
    let slot = (index % 15) as u8;
    if slot >= PERCUSSION_CHANNEL { slot + 1 } else { slot }
}

/// Encode a score as SMF format 1 bytes
pub fn encode(score: &Score) -> Result<Vec<u8>, CodecError> {
    let ppq = if score.ppq == 0 { DEFAULT_PPQ } else { score.ppq };
    if ppq > 0x7FFF {
        return Err(CodecError::UnsupportedTiming(format!("{ppq} ticks per quarter note")));
    }

    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(ppq))));
    smf.tracks.push(conductor_track(score));

    let mut melodic = 0;
    for part in &score.parts {
        let channel = if part.clef == Clef::Percussion {
            PERCUSSION_CHANNEL
        } else {
            let c = melodic_channel(melodic);
            melodic += 1;
            c
        };
        smf.tracks.push(part_track(part, channel, ppq));
    }

    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

fn conductor_track(score: &Score) -> Track<'_> {
    let mut track: Track<'_> = Vec::new();
    if let Some(title) = &score.title {
        track.push(meta(MetaMessage::TrackName(title.as_bytes())));
    }
    track.push(meta(MetaMessage::Tempo(u24::new(score.tempo.min(0xFF_FFFF)))));
    let signature = score.time_signature;
    track.push(meta(MetaMessage::TimeSignature(
        signature.numerator,
        signature.denominator.max(1).trailing_zeros() as u8,
        24,
        8,
    )));
    track.push(meta(MetaMessage::EndOfTrack));
    track
}

fn part_track(part: &Part, channel: u8, ppq: u16) -> Track<'_> {
    let channel = u4::new(channel);
    let mut track: Track<'_> = Vec::new();
    track.push(meta(MetaMessage::TrackName(part.name.as_bytes())));
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(part.instrument.program),
            },
        },
    });

    // (tick, 0 = off before 1 = on, key, velocity)
    let mut timeline: Vec<(u64, u8, u8, u8)> = Vec::with_capacity(part.note_count() * 2);
    for event in part.events() {
        let start = event.start().to_ticks(ppq);
        let end = event.end().to_ticks(ppq).max(start + 1);
        timeline.push((start, 1, event.pitch(), event.velocity().max(1)));
        timeline.push((end, 0, event.pitch(), 0));
    }
    timeline.sort_unstable();

    let mut last = 0u64;
    for (tick, kind, key, vel) in timeline {
        let delta = (tick - last).min(0x0FFF_FFFF) as u32;
        last = tick;
        let message = if kind == 1 {
            MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) }
        } else {
            MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(0) }
        };
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi { channel, message },
        });
    }
    track.push(meta(MetaMessage::EndOfTrack));
    track
}

fn meta(message: MetaMessage<'_>) -> TrackEvent<'_> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(num: u64, den: u64) -> Time {
        Time::new(num, den)
    }

    fn sample_score() -> Score {
        let lead = Part::new("Lead", Instrument::from_program(73), Clef::Treble).with_events(vec![
            Event::new(72, t(0, 1), t(1, 2), 100),
            Event::new(74, t(1, 2), t(1, 2), 90),
            Event::new(76, t(1, 1), t(3, 2), 80),
        ]);
        let keys = Part::new("Keys", Instrument::from_program(0), Clef::Treble).with_events(vec![
            Event::new(48, t(0, 1), t(2, 1), 70),
            Event::new(52, t(0, 1), t(2, 1), 70),
            Event::new(55, t(1, 1), t(1, 3), 60),
        ]);
        Score {
            parts: vec![lead, keys],
            time_signature: TimeSignature::new(3, 4),
            tempo: 600_000,
            ppq: 480,
            title: Some("Sample".into()),
        }
    }

    fn notes(part: &Part) -> Vec<(u8, Time, Time, u8)> {
        let mut v: Vec<_> = part
            .events()
            .iter()
            .map(|e| (e.pitch(), e.start(), e.duration(), e.velocity()))
            .collect();
        v.sort();
        v
    }

    #[test]
    fn test_round_trip() {
        let score = sample_score();
        let decoded = decode(&encode(&score).unwrap()).unwrap();

        assert_eq!(decoded.tempo, 600_000);
        assert_eq!(decoded.time_signature, TimeSignature::new(3, 4));
        assert_eq!(decoded.ppq, 480);
        assert_eq!(decoded.title.as_deref(), Some("Sample"));
        assert_eq!(decoded.parts.len(), 2);
        for (before, after) in score.parts.iter().zip(&decoded.parts) {
            assert_eq!(after.name, before.name);
            assert_eq!(after.instrument.program, before.instrument.program);
            assert_eq!(notes(after), notes(before));
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let score = sample_score();
        assert_eq!(encode(&score).unwrap(), encode(&score).unwrap());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(decode(b"definitely not midi"), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_channels_skip_percussion() {
        let channels: Vec<u8> = (0..16).map(melodic_channel).collect();
        assert!(!channels[..15].contains(&PERCUSSION_CHANNEL));
        assert_eq!(channels[9], 10);
        assert_eq!(channels[15], 0);
    }
}
