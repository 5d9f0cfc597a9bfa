//! Command line configuration file.
use std::{collections::HashMap, fs::File};

use chip8::{prelude::*, Hz, KeyCode};
use serde::Deserialize;

use crate::error::AppError;

/// Instructions per second when the configuration doesn't specify a clock.
pub const DEFAULT_CLOCK_FREQUENCY: Hz = Hz(500);

/// Left-hand side of a QWERTY keyboard, laid out like the COSMAC VIP keypad.
///
/// ```text
/// 1 2 3 4        1 2 3 C
/// q w e r   ->   4 5 6 D
/// a s d f        7 8 9 E
/// z x c v        A 0 B F
/// ```
const CONVENTIONAL_KEYMAP: [(char, KeyCode); 16] = [
    ('x', KeyCode::Key0),
    ('1', KeyCode::Key1),
    ('2', KeyCode::Key2),
    ('3', KeyCode::Key3),
    ('q', KeyCode::Key4),
    ('w', KeyCode::Key5),
    ('e', KeyCode::Key6),
    ('a', KeyCode::Key7),
    ('s', KeyCode::Key8),
    ('d', KeyCode::Key9),
    ('z', KeyCode::KeyA),
    ('c', KeyCode::KeyB),
    ('4', KeyCode::KeyC),
    ('r', KeyCode::KeyD),
    ('f', KeyCode::KeyE),
    ('v', KeyCode::KeyF),
];

/// Settings loaded from a YAML file.
///
/// ```yaml
/// vm:
///   clock_frequency: 700
///   seed: 42
/// keymap:
///   'x': 0
///   '1': 1
/// ```
///
/// Keymap characters must be quoted, otherwise YAML reads digits as integers.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConf {
    pub vm: Chip8Conf,
    pub keymap: Option<HashMap<char, KeyCode>>,
}

impl CliConf {
    pub fn from_file(filepath: &str) -> Result<Self, AppError> {
        let file = File::open(filepath)?;
        let conf: CliConf = serde_yaml::from_reader(file)?;
        log::debug!("loaded config: {:#?}", conf);
        Ok(conf)
    }

    /// Mapping of host keyboard characters to Chip8 keys.
    pub fn keymap(&self) -> HashMap<char, KeyCode> {
        match &self.keymap {
            Some(keymap) => keymap.clone(),
            None => HashMap::from(CONVENTIONAL_KEYMAP),
        }
    }
}

/// Cycle rate for the scheduler, falling back to [`DEFAULT_CLOCK_FREQUENCY`].
///
/// A configured rate of zero is passed through and runs unthrottled.
pub fn clock_frequency(conf: &Chip8Conf) -> Hz {
    conf.clock_frequency.unwrap_or(DEFAULT_CLOCK_FREQUENCY)
}
