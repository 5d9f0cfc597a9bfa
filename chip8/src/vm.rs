//! Virtual machine.
use std::{
    fmt::{self, Write},
    fs,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::{
    bytecode::Opcode,
    constants::*,
    cpu::Chip8Cpu,
    devices::{DisplayBuffer, KeyCode, Keypad},
    error::{Chip8Error, Chip8Result},
    ops,
};

/// Chip8 interpreter, owning the state of one emulated machine.
///
/// The random number source is injected, so seeded generators
/// make `RND` deterministic.
pub struct Chip8Vm<R = StdRng> {
    cpu: Chip8Cpu,
    rng: R,
    conf: Chip8Conf,
}

impl Chip8Vm<StdRng> {
    /// Create a VM with a random source seeded from the configuration,
    /// or from the system clock when no seed is configured.
    pub fn new(conf: Chip8Conf) -> Self {
        let seed = conf.seed.unwrap_or_else(time_seed);
        Self::with_rng(conf, StdRng::seed_from_u64(seed))
    }
}

impl<R: RngCore> Chip8Vm<R> {
    pub fn with_rng(conf: Chip8Conf, rng: R) -> Self {
        Chip8Vm {
            cpu: Chip8Cpu::new(),
            rng,
            conf,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Replace the builtin font with custom font data.
    pub fn load_font(&mut self, fontset: &[u8]) -> Chip8Result<()> {
        let fontset: &[u8; FONTSET_DATA_LENGTH] = fontset.try_into().map_err(|_| {
            Chip8Error::Font(format!(
                "fontset data must be {FONTSET_DATA_LENGTH} bytes, got {}",
                fontset.len()
            ))
        })?;

        self.cpu.load_font(fontset);

        Ok(())
    }

    /// Copy a program into memory at the load address.
    ///
    /// Nothing else about the machine state is touched. Programs larger than
    /// [`MAX_PROGRAM_SIZE`] are truncated to fit.
    ///
    /// Returns the number of bytes loaded.
    pub fn load_rom(&mut self, bytecode: &[u8]) -> usize {
        let loaded = self.cpu.load_program(bytecode);

        if loaded < bytecode.len() {
            log::warn!(
                "program is {} bytes, truncated to {} bytes to fit in memory",
                bytecode.len(),
                loaded
            );
        }

        loaded
    }

    /// Read a ROM file from disk and load it at the load address.
    ///
    /// Returns the number of bytes loaded.
    pub fn load_rom_file(&mut self, filepath: impl AsRef<Path>) -> Chip8Result<usize> {
        let bytecode = fs::read(filepath)?;
        Ok(self.load_rom(&bytecode))
    }

    /// Restore the machine to its power-on state.
    ///
    /// The loaded program is discarded, and the random source keeps its state.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    pub fn display_buffer(&self) -> &DisplayBuffer {
        &self.cpu.display
    }

    /// Whether the pixel at the given coordinate is lit.
    ///
    /// Coordinates wrap around the display edges.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        let index = (x & DISPLAY_WIDTH_MASK) + (y & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;
        self.cpu.display[index] == PIXEL_ON
    }
}

/// Signal from a single interpreter cycle to the scheduler driving it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// Display buffer was changed.
    Draw,
    /// Sound timer was set.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct Chip8Conf {
    /// Number of instructions per second the scheduler should run.
    ///
    /// Zero runs unthrottled. When absent the scheduler picks its own default.
    pub clock_frequency: Option<Hz>,
    /// Seed for the random number source.
    pub seed: Option<u64>,
}

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(transparent))]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

/// Interpreter
impl<R: RngCore> Chip8Vm<R> {
    /// Sets the keyboard key input state.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
    }

    /// Replace the state of the whole keyboard.
    pub fn set_keys(&mut self, keypad: &Keypad) {
        self.cpu.set_keypad(keypad);
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// Whether the last cycle stalled on `LD Vx, K` waiting for a key.
    pub fn is_key_waiting(&self) -> bool {
        self.cpu.key_wait
    }

    /// Advance the machine by exactly one instruction.
    ///
    /// The instruction at the program counter is fetched, the program
    /// counter moves past it, and the instruction executes. Afterwards both
    /// timers count down once.
    pub fn cycle(&mut self) -> Flow {
        let code = self.cpu.fetch();

        // Each instruction is two bytes. Instructions that change
        // the program counter overwrite this default.
        self.cpu.pc = self.cpu.pc.wrapping_add(2);

        let flow = ops::execute(&mut self.cpu, &mut self.rng, code);

        self.cpu.tick_delay();
        self.cpu.tick_sound();

        flow
    }

    /// Run the given number of cycles, returning the flow signal of the last one.
    pub fn run_steps(&mut self, step_count: usize) -> Flow {
        let mut control_flow = Flow::Ok;

        for _ in 0..step_count {
            control_flow = self.cycle();
        }

        control_flow
    }
}

/// State inspection
impl<R> Chip8Vm<R> {
    pub fn pc(&self) -> Address {
        self.cpu.pc
    }

    pub fn sp(&self) -> usize {
        self.cpu.sp
    }

    pub fn index(&self) -> Address {
        self.cpu.index
    }

    /// Value of the general purpose register `Vn`. Panics when `n` is not below 16.
    pub fn register(&self, n: usize) -> u8 {
        self.cpu.registers[n]
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    /// The most recently fetched instruction.
    pub fn opcode(&self) -> Opcode {
        self.cpu.opcode
    }

    pub fn memory(&self) -> &[u8; MEM_SIZE] {
        &self.cpu.ram
    }

    pub fn keys(&self) -> Keypad {
        self.cpu.keypad()
    }
}

/// Troubleshooting
impl<R> Chip8Vm<R> {
    /// Returns the contents of the program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let iter = self
            .cpu
            .ram
            .iter()
            .enumerate()
            .skip(MEM_START)
            .take(count)
            .step_by(2);
        let mut buf = String::new();

        for (i, op) in iter {
            writeln!(buf, "{:04X}: {:02X}{:02X}", i, op, self.cpu.read(i + 1))?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] == PIXEL_ON {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        if self.cpu.any_key() {
            write!(buf, "keys: ")?;
            for i in 0..KEY_COUNT {
                if self.cpu.key_state(i) {
                    write!(buf, "k{i:x}")?;
                }
            }
        }

        Ok(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vm() -> Chip8Vm {
        Chip8Vm::new(Chip8Conf {
            seed: Some(1),
            ..Default::default()
        })
    }

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);

        let interval: Duration = Hz(0).into();
        assert_eq!(interval, Duration::ZERO);
    }

    /// Fx0A (LD Vx, K)
    ///
    /// Wait for a keypress, then store the key value in Vx.
    /// The VM must stall while waiting, and signal the state to the outer executer.
    #[test]
    #[rustfmt::skip]
    fn test_key_wait() {
        let mut vm = vm();
        vm.load_rom(&[
            0xF1, 0x0A, // LD v1, K
            0x62, 0x42  // LD v2, 0x42  ; sentinal
        ]);

        // machine must stall
        for _ in 0..6 {
            assert_eq!(vm.cycle(), Flow::KeyWait);
            assert_eq!(vm.pc() as usize, MEM_START);
            assert!(vm.is_key_waiting());
        }

        // machine has yielded, waiting for any key to be pressed.
        vm.set_key(KeyCode::Key9, true);
        vm.set_key(KeyCode::Key5, true);

        // machine will now advance, taking the lowest key
        assert_eq!(vm.cycle(), Flow::Ok);
        assert_eq!(vm.pc() as usize, MEM_START + 2);
        assert_eq!(vm.register(1), 0x05);
        assert!(!vm.is_key_waiting());

        // Ensure the machine is continuing
        vm.cycle();
        assert_eq!(vm.pc() as usize, MEM_START + 4);
        assert_eq!(vm.register(2), 0x42); // sentinal
    }

    #[test]
    #[rustfmt::skip]
    fn test_draw_collision() {
        let mut vm = vm();

        // Draw two pixels next to each other.
        // The zero bits of the second draw must not erase
        // the pixels of the first draw
        //
        // draw sprite 1
        // ____####, vf == 0
        //
        // draw sprite 2
        // ########, vf == 0
        vm.load_rom(&[
            0xA2, 0x0C, // LD I, .sprite
            0x60, 0x04, // LD v0, 4
            0x61, 0x00, // LD v1, 0
            0xD0, 0x11, // DRW v0, v1, 1
            0x60, 0x00, // LD v0, 0
            0xD0, 0x11, // DRW v0, v1, 1
            // .sprite
            0b11110000,
            0b00000000,
        ]);

        vm.run_steps(6);

        assert!(vm.pixel(0, 0)); // sprite 2
        assert!(vm.pixel(4, 0)); // sprite 1
        assert_eq!(vm.register(0xF), 0);
    }

    #[test]
    fn test_timers_count_down_per_cycle() {
        let mut vm = vm();
        vm.load_rom(&[
            0x60, 0x03, // LD v0, 3
            0xF0, 0x15, // LD DT, v0
            0xF0, 0x18, // LD ST, v0
            0x00, 0x00, // no-op
            0x00, 0x00, // no-op
            0x00, 0x00, // no-op
        ]);

        vm.run_steps(2);
        // Loaded and counted down in the same cycle.
        assert_eq!(vm.delay_timer(), 2);

        assert_eq!(vm.cycle(), Flow::Sound);
        assert_eq!(vm.delay_timer(), 1);
        assert_eq!(vm.sound_timer(), 2);

        vm.run_steps(3);
        assert_eq!(vm.delay_timer(), 0);
        assert_eq!(vm.sound_timer(), 0);
    }

    #[test]
    fn test_load_font() {
        let mut vm = vm();
        assert!(vm.load_font(&[0; 79]).is_err());

        vm.load_font(&[0xFF; FONTSET_DATA_LENGTH]).unwrap();
        let start = FONTSET_START as usize;
        assert!(vm.memory()[start..start + FONTSET_DATA_LENGTH]
            .iter()
            .all(|b| *b == 0xFF));
    }

    #[test]
    fn test_reset() {
        let mut vm = vm();
        vm.load_rom(&[0x61, 0x42, 0x00, 0xE0]);
        vm.set_key(KeyCode::Key1, true);
        vm.cycle();
        assert_eq!(vm.register(1), 0x42);

        vm.reset();
        assert_eq!(vm.register(1), 0);
        assert_eq!(vm.pc() as usize, MEM_START);
        assert_eq!(vm.memory()[MEM_START], 0);
        assert_eq!(vm.keys(), [false; 16]);
    }

    #[test]
    fn test_load_rom_file() {
        let filepath = std::env::temp_dir().join(format!("chip8-{}.rom", std::process::id()));
        std::fs::write(&filepath, [0x60, 0x07]).unwrap();

        let mut vm = vm();
        let loaded = vm.load_rom_file(&filepath);
        std::fs::remove_file(&filepath).unwrap();
        assert_eq!(loaded.unwrap(), 2);

        vm.cycle();
        assert_eq!(vm.register(0), 0x07);

        let missing = vm.load_rom_file("does/not/exist.rom");
        assert!(matches!(missing, Err(Chip8Error::Io(_))));
    }

    #[test]
    fn test_config() {
        let vm = Chip8Vm::new(Chip8Conf {
            clock_frequency: Some(Hz(700)),
            seed: Some(3),
        });
        assert_eq!(vm.config().clock_frequency, Some(Hz(700)));
        assert_eq!(vm.config().seed, Some(3));
    }

    #[test]
    fn test_dumps() {
        let mut vm = vm();
        vm.load_rom(&[0x12, 0x34, 0xAB, 0xCD]);
        assert_eq!(vm.dump_ram(4).unwrap(), "0200: 1234\n0202: ABCD\n");

        let display = vm.dump_display().unwrap();
        assert_eq!(display.lines().count(), DISPLAY_HEIGHT);
        assert!(display.lines().all(|line| line.len() == DISPLAY_WIDTH));

        assert_eq!(vm.dump_keys().unwrap(), "");
        vm.set_key(KeyCode::KeyA, true);
        assert_eq!(vm.dump_keys().unwrap(), "keys: ka");
    }
}
