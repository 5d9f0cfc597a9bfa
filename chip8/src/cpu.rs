//! CPU and memory state.
use crate::{bytecode::Opcode, constants::*, devices::Keypad};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the next instruction to fetch.
    pub(crate) pc: Address,
    /// Stack pointer, indexing the next free slot of the call stack.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// (I) Pointer register used for temporarily storing an address.
    pub(crate) index: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Indicates that the machine is waiting for a keypress.
    pub(crate) key_wait: bool,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,
    /// The most recently fetched instruction.
    pub(crate) opcode: Opcode,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn to, one word per pixel.
    pub(crate) display: Box<[u32; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Chip8Cpu {
    /// Create a machine in its power-on state.
    ///
    /// Memory is zeroed except for the builtin font, and the program
    /// counter points to the program load address.
    pub fn new() -> Self {
        let mut cpu = Self {
            pc: MEM_START as Address,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            index: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_wait: false,
            key_state: 0,
            opcode: Opcode::default(),

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([PIXEL_OFF; DISPLAY_BUFFER_SIZE]),
        };
        cpu.load_font(&FONTSET);
        cpu
    }

    /// Restore the power-on state, discarding any loaded program.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Copy a font table into the reserved font area.
    pub(crate) fn load_font(&mut self, fontset: &[u8; FONTSET_DATA_LENGTH]) {
        let start = FONTSET_START as usize;
        self.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(fontset);
    }

    /// Copy program bytes to the load address, truncating whatever
    /// doesn't fit in memory.
    ///
    /// Returns the number of bytes copied.
    pub(crate) fn load_program(&mut self, bytecode: &[u8]) -> usize {
        let len = bytecode.len().min(MAX_PROGRAM_SIZE);
        self.ram[MEM_START..MEM_START + len].copy_from_slice(&bytecode[..len]);
        len
    }

    pub fn clear_display(&mut self) {
        self.display.fill(PIXEL_OFF);
    }

    // ------------------------------------------------------------------------
    // Memory access
    //
    // All addresses wrap around the 4K address space.

    #[inline(always)]
    pub(crate) fn read(&self, address: usize) -> u8 {
        self.ram[address & MEM_MASK]
    }

    #[inline(always)]
    pub(crate) fn write(&mut self, address: usize, value: u8) {
        self.ram[address & MEM_MASK] = value;
    }

    /// Extract the instruction at the current program counter.
    #[inline(always)]
    pub fn instr(&self) -> [u8; 2] {
        let pc = self.pc as usize;
        [self.read(pc), self.read(pc + 1)]
    }

    /// Fetch the instruction at the current program counter and
    /// remember it as the current opcode.
    #[inline]
    pub(crate) fn fetch(&mut self) -> Opcode {
        self.opcode = Opcode::from_bytes(self.instr());
        self.opcode
    }

    // ------------------------------------------------------------------------
    // Call stack

    /// Push a return address.
    ///
    /// Nesting deeper than [`STACK_SIZE`] wraps the stack pointer back
    /// to the bottom of the stack, overwriting the oldest return address.
    pub(crate) fn push_stack(&mut self, address: Address) {
        if self.sp >= STACK_SIZE {
            log::warn!("call stack overflow at {:04X}, stack pointer wraps", self.pc);
            self.sp = 0;
        }
        self.stack[self.sp] = address;
        self.sp += 1;
    }

    /// Pop a return address.
    ///
    /// Returning with an empty stack wraps the stack pointer to the top of the stack.
    pub(crate) fn pop_stack(&mut self) -> Address {
        if self.sp == 0 {
            log::warn!("call stack underflow at {:04X}, stack pointer wraps", self.pc);
            self.sp = STACK_SIZE;
        }
        self.sp -= 1;
        self.stack[self.sp]
    }

    // ------------------------------------------------------------------------
    // Keyboard

    pub fn set_key_state(&mut self, key_id: u8, state: bool) {
        if key_id < KEY_COUNT {
            if state {
                self.key_state |= 1 << key_id;
            } else {
                self.key_state &= !(1 << key_id);
            }
        }
    }

    pub fn key_state(&self, key_id: u8) -> bool {
        if key_id < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Replace the state of all 16 keys at once.
    pub fn set_keypad(&mut self, keypad: &Keypad) {
        self.key_state = keypad
            .iter()
            .enumerate()
            .filter(|(_, pressed)| **pressed)
            .fold(0, |state, (k, _)| state | (1u16 << k));
    }

    /// Snapshot of the state of all 16 keys.
    pub fn keypad(&self) -> Keypad {
        let mut keypad = [false; KEY_COUNT as usize];
        for (k, pressed) in keypad.iter_mut().enumerate() {
            *pressed = self.key_state(k as u8);
        }
        keypad
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Retrieve the value of the first key that is pressed down.
    #[inline]
    pub fn first_key(&self) -> Option<u8> {
        if self.any_key() {
            // Lowest set bit is the lowest key.
            Some(self.key_state.trailing_zeros() as u8)
        } else {
            None
        }
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.key_state = 0;
    }

    // ------------------------------------------------------------------------
    // Timers

    /// Count down the delay timer.
    #[inline]
    pub fn tick_delay(&mut self) {
        // The checked_sub implementation uses `unlikely!()` which degrades performance.
        let (val, underflow) = self.delay_timer.overflowing_sub(1);
        if !underflow {
            self.delay_timer = val;
        }
    }

    #[inline]
    pub fn tick_sound(&mut self) {
        let (val, underflow) = self.sound_timer.overflowing_sub(1);
        if !underflow {
            self.sound_timer = val;
        }
    }
}
