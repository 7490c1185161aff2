mod file;

pub use file::{MidiFile, load_midi_file, parse_midi};
