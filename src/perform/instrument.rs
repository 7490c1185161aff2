use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownInstrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    Harp,
    Piano,
    Lute,
    Fiddle,
    Flute,
    Oboe,
    Clarinet,
    Fife,
    Panpipes,
    Timpani,
    Bongo,
    BassDrum,
    SnareDrum,
    Cymbal,
    Trumpet,
    Trombone,
    Tuba,
    Horn,
    Saxophone,
    Violin,
    Viola,
    Cello,
    DoubleBass,
    ElectricGuitarOverdriven,
    ElectricGuitarClean,
    ElectricGuitarMuted,
    ElectricGuitarPowerChords,
    ElectricGuitarSpecial,
}

impl Instrument {
    pub const ALL: [Instrument; 28] = [
        Instrument::Harp,
        Instrument::Piano,
        Instrument::Lute,
        Instrument::Fiddle,
        Instrument::Flute,
        Instrument::Oboe,
        Instrument::Clarinet,
        Instrument::Fife,
        Instrument::Panpipes,
        Instrument::Timpani,
        Instrument::Bongo,
        Instrument::BassDrum,
        Instrument::SnareDrum,
        Instrument::Cymbal,
        Instrument::Trumpet,
        Instrument::Trombone,
        Instrument::Tuba,
        Instrument::Horn,
        Instrument::Saxophone,
        Instrument::Violin,
        Instrument::Viola,
        Instrument::Cello,
        Instrument::DoubleBass,
        Instrument::ElectricGuitarOverdriven,
        Instrument::ElectricGuitarClean,
        Instrument::ElectricGuitarMuted,
        Instrument::ElectricGuitarPowerChords,
        Instrument::ElectricGuitarSpecial,
    ];

    /// General MIDI program this instrument answers to.
    pub fn gm_program(self) -> u8 {
        match self {
            Instrument::Harp => 46,
            Instrument::Piano => 0,
            Instrument::Lute => 25,
            Instrument::Fiddle => 45,
            Instrument::Flute => 73,
            Instrument::Oboe => 68,
            Instrument::Clarinet => 71,
            Instrument::Fife => 72,
            Instrument::Panpipes => 75,
            Instrument::Timpani => 47,
            Instrument::Bongo => 116,
            Instrument::BassDrum => 117,
            Instrument::SnareDrum => 115,
            Instrument::Cymbal => 119,
            Instrument::Trumpet => 56,
            Instrument::Trombone => 57,
            Instrument::Tuba => 58,
            Instrument::Horn => 60,
            Instrument::Saxophone => 65,
            Instrument::Violin => 40,
            Instrument::Viola => 41,
            Instrument::Cello => 42,
            Instrument::DoubleBass => 43,
            Instrument::ElectricGuitarOverdriven => 29,
            Instrument::ElectricGuitarClean => 27,
            Instrument::ElectricGuitarMuted => 28,
            Instrument::ElectricGuitarPowerChords => 30,
            Instrument::ElectricGuitarSpecial => 31,
        }
    }

    /// Instrument mapped to a program number, if any.
    pub fn from_program(program: u8) -> Option<Instrument> {
        Instrument::ALL
            .iter()
            .copied()
            .find(|i| i.gm_program() == program)
    }

    pub fn is_guitar(self) -> bool {
        self.guitar_tone().is_some()
    }

    pub fn guitar_tone(self) -> Option<u8> {
        match self {
            Instrument::ElectricGuitarOverdriven => Some(0),
            Instrument::ElectricGuitarClean => Some(1),
            Instrument::ElectricGuitarMuted => Some(2),
            Instrument::ElectricGuitarPowerChords => Some(3),
            Instrument::ElectricGuitarSpecial => Some(4),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Instrument::ElectricGuitarOverdriven => "Guitar (Overdriven)",
            Instrument::ElectricGuitarClean => "Guitar (Clean)",
            Instrument::ElectricGuitarMuted => "Guitar (Muted)",
            Instrument::ElectricGuitarPowerChords => "Guitar (Distorted)",
            Instrument::ElectricGuitarSpecial => "Guitar (Special)",
            other => other.variant_name(),
        }
    }

    fn variant_name(self) -> &'static str {
        match self {
            Instrument::Harp => "Harp",
            Instrument::Piano => "Piano",
            Instrument::Lute => "Lute",
            Instrument::Fiddle => "Fiddle",
            Instrument::Flute => "Flute",
            Instrument::Oboe => "Oboe",
            Instrument::Clarinet => "Clarinet",
            Instrument::Fife => "Fife",
            Instrument::Panpipes => "Panpipes",
            Instrument::Timpani => "Timpani",
            Instrument::Bongo => "Bongo",
            Instrument::BassDrum => "BassDrum",
            Instrument::SnareDrum => "SnareDrum",
            Instrument::Cymbal => "Cymbal",
            Instrument::Trumpet => "Trumpet",
            Instrument::Trombone => "Trombone",
            Instrument::Tuba => "Tuba",
            Instrument::Horn => "Horn",
            Instrument::Saxophone => "Saxophone",
            Instrument::Violin => "Violin",
            Instrument::Viola => "Viola",
            Instrument::Cello => "Cello",
            Instrument::DoubleBass => "DoubleBass",
            Instrument::ElectricGuitarOverdriven => "ElectricGuitarOverdriven",
            Instrument::ElectricGuitarClean => "ElectricGuitarClean",
            Instrument::ElectricGuitarMuted => "ElectricGuitarMuted",
            Instrument::ElectricGuitarPowerChords => "ElectricGuitarPowerChords",
            Instrument::ElectricGuitarSpecial => "ElectricGuitarSpecial",
        }
    }

    /// Parses an ensemble playlist instrument name. `""` and `"None"` mean
    /// no instrument.
    pub fn from_name(name: &str) -> Result<Option<Instrument>, UnknownInstrument> {
        if name.is_empty() || name == "None" {
            return Ok(None);
        }
        name.parse().map(Some)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Instrument {
    type Err = UnknownInstrument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instrument::ALL
            .iter()
            .copied()
            .find(|i| i.display_name() == s || i.variant_name() == s)
            .ok_or_else(|| UnknownInstrument(s.to_string()))
    }
}

const GM_PROGRAM_NAMES: [&str; 128] = [
    "Acoustic Grand Piano",
    "Bright Acoustic Piano",
    "Electric Grand Piano",
    "Honky-tonk Piano",
    "Electric Piano 1",
    "Electric Piano 2",
    "Harpsichord",
    "Clavi",
    "Celesta",
    "Glockenspiel",
    "Music Box",
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Tubular Bells",
    "Dulcimer",
    "Drawbar Organ",
    "Percussive Organ",
    "Rock Organ",
    "Church Organ",
    "Reed Organ",
    "Accordion",
    "Harmonica",
    "Tango Accordion",
    "Acoustic Guitar (nylon)",
    "Acoustic Guitar (steel)",
    "Electric Guitar (jazz)",
    "Electric Guitar (clean)",
    "Electric Guitar (muted)",
    "Overdriven Guitar",
    "Distortion Guitar",
    "Guitar harmonics",
    "Acoustic Bass",
    "Electric Bass (finger)",
    "Electric Bass (pick)",
    "Fretless Bass",
    "Slap Bass 1",
    "Slap Bass 2",
    "Synth Bass 1",
    "Synth Bass 2",
    "Violin",
    "Viola",
    "Cello",
    "Contrabass",
    "Tremolo Strings",
    "Pizzicato Strings",
    "Orchestral Harp",
    "Timpani",
    "String Ensemble 1",
    "String Ensemble 2",
    "SynthStrings 1",
    "SynthStrings 2",
    "Choir Aahs",
    "Voice Oohs",
    "Synth Voice",
    "Orchestra Hit",
    "Trumpet",
    "Trombone",
    "Tuba",
    "Muted Trumpet",
    "French Horn",
    "Brass Section",
    "SynthBrass 1",
    "SynthBrass 2",
    "Soprano Sax",
    "Alto Sax",
    "Tenor Sax",
    "Baritone Sax",
    "Oboe",
    "English Horn",
    "Bassoon",
    "Clarinet",
    "Piccolo",
    "Flute",
    "Recorder",
    "Pan Flute",
    "Blown Bottle",
    "Shakuhachi",
    "Whistle",
    "Ocarina",
    "Lead 1 (square)",
    "Lead 2 (sawtooth)",
    "Lead 3 (calliope)",
    "Lead 4 (chiff)",
    "Lead 5 (charang)",
    "Lead 6 (voice)",
    "Lead 7 (fifths)",
    "Lead 8 (bass + lead)",
    "Pad 1 (new age)",
    "Pad 2 (warm)",
    "Pad 3 (polysynth)",
    "Pad 4 (choir)",
    "Pad 5 (bowed)",
    "Pad 6 (metallic)",
    "Pad 7 (halo)",
    "Pad 8 (sweep)",
    "FX 1 (rain)",
    "FX 2 (soundtrack)",
    "FX 3 (crystal)",
    "FX 4 (atmosphere)",
    "FX 5 (brightness)",
    "FX 6 (goblins)",
    "FX 7 (echoes)",
    "FX 8 (sci-fi)",
    "Sitar",
    "Banjo",
    "Shamisen",
    "Koto",
    "Kalimba",
    "Bag pipe",
    "Fiddle",
    "Shanai",
    "Tinkle Bell",
    "Agogo",
    "Steel Drums",
    "Woodblock",
    "Taiko Drum",
    "Melodic Tom",
    "Synth Drum",
    "Reverse Cymbal",
    "Guitar Fret Noise",
    "Breath Noise",
    "Seashore",
    "Bird Tweet",
    "Telephone Ring",
    "Helicopter",
    "Applause",
    "Gunshot",
];

pub fn gm_program_name(program: u8) -> &'static str {
    GM_PROGRAM_NAMES
        .get(program as usize)
        .copied()
        .unwrap_or("Unknown Program")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guitar_programs_map_to_tones() {
        let tones: Vec<(u8, Option<u8>)> = (27..=31)
            .map(|p| (p, Instrument::from_program(p).and_then(Instrument::guitar_tone)))
            .collect();
        assert_eq!(
            tones,
            vec![(27, Some(1)), (28, Some(2)), (29, Some(0)), (30, Some(3)), (31, Some(4))]
        );
        assert!(!Instrument::Harp.is_guitar());
        assert_eq!(Instrument::from_program(26), None);
    }

    #[test]
    fn ensemble_names_parse() {
        assert_eq!(
            Instrument::from_name("Guitar (Overdriven)"),
            Ok(Some(Instrument::ElectricGuitarOverdriven))
        );
        assert_eq!(
            Instrument::from_name("Guitar (Distorted)"),
            Ok(Some(Instrument::ElectricGuitarPowerChords))
        );
        assert_eq!(Instrument::from_name("Flute"), Ok(Some(Instrument::Flute)));
        assert_eq!(Instrument::from_name("None"), Ok(None));
        assert_eq!(Instrument::from_name(""), Ok(None));
        let err = Instrument::from_name("Kazoo").unwrap_err();
        assert_eq!(err, UnknownInstrument("Kazoo".into()));
        assert_eq!(err.to_string(), "unknown instrument 'Kazoo'");
    }

    #[test]
    fn program_names_cover_the_gm_table() {
        assert_eq!(gm_program_name(0), "Acoustic Grand Piano");
        assert_eq!(gm_program_name(29), "Overdriven Guitar");
        assert_eq!(gm_program_name(127), "Gunshot");
        assert_eq!(gm_program_name(128), "Unknown Program");
    }
}
