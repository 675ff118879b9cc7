//! Note Identifiers
//!
//! Notes arrive as pitch-name+octave strings (`"C4"`, `"F#3"`, `"Bb-1"`).
//! They are parsed once at the engine boundary into a [`Note`] which keeps the
//! original spelling as its identity and caches the MIDI number and frequency.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference pitch: A4 = MIDI 69
const A4_FREQUENCY: f64 = 440.0;
const A4_MIDI: i32 = 69;

/// Opaque scheduling hint attached to note events
///
/// The engine never interprets or reorders by this value; it is forwarded
/// verbatim to the nodes that receive the event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTime(pub f64);

/// A parsed note identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Note {
    name: String,
    midi: i32,
}

impl Note {
    /// Parse a pitch-name+octave string
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidNote(text.to_string());
        let trimmed = text.trim();
        let mut chars = trimmed.chars();

        let letter = chars.next().ok_or_else(invalid)?;
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = chars.as_str();
        let (accidental, octave_text) = if let Some(stripped) = rest.strip_prefix("##") {
            (2, stripped)
        } else if let Some(stripped) = rest.strip_prefix('#') {
            (1, stripped)
        } else if let Some(stripped) = rest.strip_prefix("bb") {
            (-2, stripped)
        } else if let Some(stripped) = rest.strip_prefix('b') {
            (-1, stripped)
        } else {
            (0, rest)
        };

        let (negative, digits) = match octave_text.strip_prefix('-') {
            Some(digits) => (true, digits),
            None => (false, octave_text),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let magnitude: i32 = digits.parse().map_err(|_| invalid())?;
        let octave = if negative { -magnitude } else { magnitude };
        if !(-1..=9).contains(&octave) || (negative && magnitude == 0) {
            return Err(invalid());
        }

        Ok(Self {
            name: trimmed.to_string(),
            midi: (octave + 1) * 12 + base + accidental,
        })
    }

    /// The note as it was spelled by the caller
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIDI note number (C4 = 60)
    pub fn midi(&self) -> i32 {
        self.midi
    }

    /// Equal-tempered frequency in Hz
    pub fn frequency(&self) -> f64 {
        A4_FREQUENCY * libm::pow(2.0, (self.midi - A4_MIDI) as f64 / 12.0)
    }
}

impl FromStr for Note {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Note::parse(s)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_naturals() {
        assert_eq!(Note::parse("C4").unwrap().midi(), 60);
        assert_eq!(Note::parse("A4").unwrap().midi(), 69);
        assert_eq!(Note::parse("B3").unwrap().midi(), 59);
        assert_eq!(Note::parse("C-1").unwrap().midi(), 0);
    }

    #[test]
    fn test_parse_accidentals() {
        assert_eq!(Note::parse("C#4").unwrap().midi(), 61);
        assert_eq!(Note::parse("Db4").unwrap().midi(), 61);
        assert_eq!(Note::parse("Cb4").unwrap().midi(), 59);
        assert_eq!(Note::parse("F##2").unwrap().midi(), 43);
    }

    #[test]
    fn test_frequency() {
        assert_relative_eq!(Note::parse("A4").unwrap().frequency(), 440.0);
        assert_relative_eq!(
            Note::parse("C4").unwrap().frequency(),
            261.625_565,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_identity_keeps_spelling() {
        let sharp = Note::parse("C#4").unwrap();
        let flat = Note::parse("Db4").unwrap();
        assert_eq!(sharp.midi(), flat.midi());
        assert_ne!(sharp, flat);
        assert_eq!(sharp.to_string(), "C#4");
    }

    #[test]
    fn test_invalid_notes() {
        for text in [
            "", "H4", "C", "C#", "C10", "4C", "Cx4", "C+4", "C-0", "C#+1", "C-",
        ] {
            assert!(
                matches!(Note::parse(text), Err(EngineError::InvalidNote(_))),
                "{text:?} should be rejected"
            );
        }
    }
}
