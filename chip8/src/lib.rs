//! Chip-8 virtual machine.
//!
//! The [`Chip8Vm`](prelude::Chip8Vm) interpreter owns the complete state of
//! one emulated machine, and advances it one instruction per call to
//! [`cycle`](prelude::Chip8Vm::cycle). Loading ROM files, throttling the
//! cycle rate, polling the keyboard and presenting the display are left to
//! the program driving the interpreter, through the [`Devices`] interface.
mod bytecode;
pub mod constants;
mod cpu;
mod devices;
mod error;
mod ops;
mod vm;

pub use self::{
    bytecode::Opcode,
    devices::{Devices, DisplayBuffer, InvalidKeyCode, KeyCode, Keypad},
    error::{Chip8Error, Chip8Result},
    vm::Hz,
};

pub mod prelude {
    pub use super::{
        cpu::Chip8Cpu,
        error::{Chip8Error, Chip8Result},
        vm::{Chip8Conf, Chip8Vm, Flow},
    };
}
