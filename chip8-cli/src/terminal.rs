//! Terminal host devices.
use std::{
    collections::HashMap,
    io::{self, Stdout, Write},
    time::{Duration, Instant},
};

use chip8::{
    constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH, KEY_COUNT, PIXEL_ON},
    Devices, DisplayBuffer, KeyCode, Keypad,
};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode as TermKey, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal,
};

/// Terminals only report key presses and their auto-repeat, never releases.
///
/// A key counts as held down for this long after its last reported press.
const KEY_HOLD: Duration = Duration::from_millis(150);

/// Raw mode terminal acting as the display and keyboard of the machine.
///
/// Two rows of pixels are packed into each line of text using half-block
/// characters. `Esc` or `Ctrl+C` requests to quit.
pub struct TerminalDevices {
    stdout: Stdout,
    keymap: HashMap<char, KeyCode>,
    /// Time each key was last reported pressed.
    pressed_at: [Option<Instant>; KEY_COUNT as usize],
}

impl TerminalDevices {
    pub fn new(keymap: HashMap<char, KeyCode>) -> io::Result<Self> {
        let mut stdout = io::stdout();

        terminal::enable_raw_mode()?;
        crossterm::execute!(
            stdout,
            terminal::EnterAlternateScreen,
            terminal::Clear(terminal::ClearType::All),
            cursor::Hide
        )?;

        Ok(Self {
            stdout,
            keymap,
            pressed_at: [None; KEY_COUNT as usize],
        })
    }

    fn press(&mut self, ch: char, kind: KeyEventKind) {
        match self.keymap.get(&ch.to_ascii_lowercase()) {
            Some(key) => {
                let slot = &mut self.pressed_at[key.as_u8() as usize];
                *slot = match kind {
                    KeyEventKind::Release => None,
                    KeyEventKind::Press | KeyEventKind::Repeat => Some(Instant::now()),
                };
            }
            None => log::trace!("no input mapping for {ch:?}"),
        }
    }
}

impl Drop for TerminalDevices {
    fn drop(&mut self) {
        let _ = crossterm::execute!(self.stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Devices for TerminalDevices {
    fn poll_input(&mut self) -> io::Result<Option<Keypad>> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            {
                match code {
                    TermKey::Esc => return Ok(None),
                    TermKey::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(None)
                    }
                    TermKey::Char(ch) => self.press(ch, kind),
                    _ => {}
                }
            }
        }

        let mut keypad = [false; KEY_COUNT as usize];
        for (pressed, at) in keypad.iter_mut().zip(self.pressed_at.iter()) {
            *pressed = at.map(|at| at.elapsed() < KEY_HOLD).unwrap_or(false);
        }

        Ok(Some(keypad))
    }

    fn draw(&mut self, display: &DisplayBuffer) -> io::Result<()> {
        let mut line = String::with_capacity(DISPLAY_WIDTH * 3);

        for row in 0..DISPLAY_HEIGHT / 2 {
            line.clear();

            let top = &display[row * 2 * DISPLAY_WIDTH..][..DISPLAY_WIDTH];
            let bottom = &display[(row * 2 + 1) * DISPLAY_WIDTH..][..DISPLAY_WIDTH];
            line.extend(top.iter().zip(bottom).map(|(t, b)| half_block(*t, *b)));

            queue!(self.stdout, cursor::MoveTo(0, row as u16), Print(&line))?;
        }

        self.stdout.flush()
    }
}

/// Character showing two vertically stacked pixels.
fn half_block(top: u32, bottom: u32) -> char {
    match (top == PIXEL_ON, bottom == PIXEL_ON) {
        (true, true) => '█',
        (true, false) => '▀',
        (false, true) => '▄',
        (false, false) => ' ',
    }
}
