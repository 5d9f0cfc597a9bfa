//! Instruction dispatch tables and opcode handlers.
//!
//! The upper nibble of an instruction selects one of 16 top level handlers.
//! Four of those are prefixes that dispatch again through a second table:
//!
//! - `0___`, `8___` and `E___` are keyed by the lowest nibble.
//! - `F___` is keyed by the lowest byte.
//!
//! Any bit pattern without a defined instruction is executed as a no-op.
use rand::{Rng, RngCore};

use crate::{bytecode::Opcode, constants::*, cpu::Chip8Cpu, vm::Flow};

/// Signature shared by every entry in the dispatch tables.
pub(crate) type OpHandler = fn(&mut Chip8Cpu, &mut dyn RngCore, Opcode) -> Flow;

/// Top level handlers, indexed by the upper nibble.
#[rustfmt::skip]
static OPS: [OpHandler; 16] = [
    exec_sys,    // 0___
    op_jp,       // 1nnn
    op_call,     // 2nnn
    op_se_byte,  // 3xkk
    op_sne_byte, // 4xkk
    op_se_reg,   // 5xy0
    op_ld_byte,  // 6xkk
    op_add_byte, // 7xkk
    exec_math,   // 8xy_
    op_sne_reg,  // 9xy0
    op_ld_i,     // Annn
    op_jp_v0,    // Bnnn
    op_rnd,      // Cxkk
    op_drw,      // Dxyn
    exec_key,    // Ex__
    exec_misc,   // Fx__
];

/// `00E_` instructions, indexed by the lowest nibble.
#[rustfmt::skip]
static SYS_OPS: [OpHandler; 16] = [
    op_cls, op_nop, op_nop, op_nop, op_nop, op_nop, op_nop, op_nop,
    op_nop, op_nop, op_nop, op_nop, op_nop, op_nop, op_ret, op_nop,
];

/// Arithmetic instructions `8xy_`, indexed by the lowest nibble.
#[rustfmt::skip]
static MATH_OPS: [OpHandler; 16] = [
    op_ld_reg, op_or,  op_and, op_xor,  op_add_reg, op_sub, op_shr, op_subn,
    op_nop,    op_nop, op_nop, op_nop,  op_nop,     op_nop, op_shl, op_nop,
];

/// Keyboard instructions `Ex__`, indexed by the lowest nibble.
#[rustfmt::skip]
static KEY_OPS: [OpHandler; 16] = [
    op_nop, op_sknp, op_nop, op_nop, op_nop, op_nop, op_nop, op_nop,
    op_nop, op_nop,  op_nop, op_nop, op_nop, op_nop, op_skp, op_nop,
];

/// Miscellaneous instructions `Fx__`, indexed by the lowest byte.
static MISC_OPS: [OpHandler; 256] = {
    let mut table: [OpHandler; 256] = [op_nop as OpHandler; 256];
    table[0x07] = op_ld_vx_dt;
    table[0x0A] = op_ld_vx_k;
    table[0x15] = op_ld_dt_vx;
    table[0x18] = op_ld_st_vx;
    table[0x1E] = op_add_i_vx;
    table[0x29] = op_ld_f_vx;
    table[0x33] = op_ld_b_vx;
    table[0x55] = op_ld_mem_vx;
    table[0x65] = op_ld_vx_mem;
    table
};

/// Execute a single decoded instruction against the machine state.
#[inline]
pub(crate) fn execute(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    OPS[code.op() as usize](cpu, rng, code)
}

// ----------------------------------------------------------------------------
// Prefix handlers

fn exec_sys(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    // Only 00E0 and 00EE exist. Native 0nnn routines are ignored.
    if code.0 & 0xFFF0 != 0x00E0 {
        return op_nop(cpu, rng, code);
    }
    SYS_OPS[code.n() as usize](cpu, rng, code)
}

fn exec_math(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    MATH_OPS[code.n() as usize](cpu, rng, code)
}

fn exec_key(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    if !matches!(code.kk(), 0x9E | 0xA1) {
        return op_nop(cpu, rng, code);
    }
    KEY_OPS[code.n() as usize](cpu, rng, code)
}

fn exec_misc(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    MISC_OPS[code.kk() as usize](cpu, rng, code)
}

/// Undefined instruction.
fn op_nop(_cpu: &mut Chip8Cpu, _rng: &mut dyn RngCore, code: Opcode) -> Flow {
    log::debug!("undefined opcode {code}, skipping");
    Flow::Ok
}

// ----------------------------------------------------------------------------
// Flow control

/// 00E0 (CLS)
///
/// Clear display
fn op_cls(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace("CLS", cpu, code);

    cpu.clear_display();
    Flow::Draw
}

/// 00EE (RET)
///
/// Return from a subroutine.
/// Subtract 1 from the stack pointer, then set the program counter
/// to the value at the top of the stack.
fn op_ret(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace("RET", cpu, code);

    cpu.pc = cpu.pop_stack();
    Flow::Jump
}

/// 1nnn (JP addr)
fn op_jp(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_nnn("JP", cpu, code);

    cpu.pc = code.nnn();
    Flow::Jump
}

/// 2nnn (CALL addr)
///
/// Call subroutine at NNN. The program counter has already advanced
/// past the call, so the return address is the next instruction.
fn op_call(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_nnn("CALL", cpu, code);

    cpu.push_stack(cpu.pc);
    cpu.pc = code.nnn();
    Flow::Jump
}

/// 3xkk (SE Vx, byte)
///
/// Skip the next instruction if register VX equals value KK.
fn op_se_byte(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xkk("SE", cpu, code);

    if cpu.registers[code.x()] == code.kk() {
        skip(cpu);
    }
    Flow::Ok
}

/// 4xkk (SNE Vx, byte)
///
/// Skip the next instruction if register VX does not equal value KK.
fn op_sne_byte(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xkk("SNE", cpu, code);

    if cpu.registers[code.x()] != code.kk() {
        skip(cpu);
    }
    Flow::Ok
}

/// 5xy0 (SE Vx, Vy)
///
/// Skip the next instruction if register VX equals register VY.
fn op_se_reg(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    if code.n() != 0 {
        return op_nop(cpu, rng, code);
    }
    op_trace_xy("SE", cpu, code);

    if cpu.registers[code.x()] == cpu.registers[code.y()] {
        skip(cpu);
    }
    Flow::Ok
}

/// 9xy0 (SNE Vx, Vy)
///
/// Skip next instruction if Vx != Vy.
fn op_sne_reg(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    if code.n() != 0 {
        return op_nop(cpu, rng, code);
    }
    op_trace_xy("SNE", cpu, code);

    if cpu.registers[code.x()] != cpu.registers[code.y()] {
        skip(cpu);
    }
    Flow::Ok
}

/// Bnnn (JP V0, addr)
///
/// Jump to address NNN offset by register V0.
fn op_jp_v0(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_nnn("JP V0", cpu, code);

    cpu.pc = cpu.registers[0] as Address + code.nnn();
    Flow::Jump
}

#[inline(always)]
fn skip(cpu: &mut Chip8Cpu) {
    cpu.pc = cpu.pc.wrapping_add(2);
}

// ----------------------------------------------------------------------------
// Registers

/// 6xkk (LD Vx, byte)
fn op_ld_byte(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xkk("LD", cpu, code);

    cpu.registers[code.x()] = code.kk();
    Flow::Ok
}

/// 7xkk (ADD Vx, byte)
///
/// Add value KK to register VX. Carry flag is not set.
fn op_add_byte(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xkk("ADD", cpu, code);

    let x = cpu.registers[code.x()];
    cpu.registers[code.x()] = x.wrapping_add(code.kk());
    Flow::Ok
}

/// 8xy0 (LD Vx, Vy)
fn op_ld_reg(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("LD", cpu, code);

    cpu.registers[code.x()] = cpu.registers[code.y()];
    Flow::Ok
}

/// 8xy1 (OR Vx, Vy)
fn op_or(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("OR", cpu, code);

    cpu.registers[code.x()] |= cpu.registers[code.y()];
    Flow::Ok
}

/// 8xy2 (AND Vx, Vy)
fn op_and(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("AND", cpu, code);

    cpu.registers[code.x()] &= cpu.registers[code.y()];
    Flow::Ok
}

/// 8xy3 (XOR Vx, Vy)
fn op_xor(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("XOR", cpu, code);

    cpu.registers[code.x()] ^= cpu.registers[code.y()];
    Flow::Ok
}

/// 8xy4 (ADD Vx, Vy)
///
/// Adds VY to VX, and stores the result in VX.
/// Overflow is wrapped. If overflow, set VF to 1, else 0.
fn op_add_reg(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("ADD", cpu, code);

    let (x, y) = (cpu.registers[code.x()], cpu.registers[code.y()]);
    let (result, carry) = x.overflowing_add(y);
    // Flag is written first, so the result wins when X is VF.
    cpu.registers[FLAG_REGISTER] = carry as u8;
    cpu.registers[code.x()] = result;
    Flow::Ok
}

/// 8xy5 (SUB Vx, Vy)
///
/// Subtracts VY from VX, and stores the result in VX.
/// VF is set to 0 when there is a borrow, set to 1 when there isn't.
fn op_sub(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("SUB", cpu, code);

    let (x, y) = (cpu.registers[code.x()], cpu.registers[code.y()]);
    cpu.registers[FLAG_REGISTER] = (x >= y) as u8;
    cpu.registers[code.x()] = x.wrapping_sub(y);
    Flow::Ok
}

/// 8xy6 (SHR Vx)
///
/// VF receives the least-significant bit of Vx, then Vx is shifted right by 1.
/// VY is unused.
fn op_shr(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("SHR", cpu, code);

    let x = cpu.registers[code.x()];
    cpu.registers[FLAG_REGISTER] = x & 1;
    cpu.registers[code.x()] = x >> 1;
    Flow::Ok
}

/// 8xy7 (SUBN Vx, Vy)
///
/// Subtracts VX from VY, and stores the result in VX.
/// VF is set to 0 when there is a borrow, set to 1 when there isn't.
fn op_subn(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("SUBN", cpu, code);

    let (x, y) = (cpu.registers[code.x()], cpu.registers[code.y()]);
    cpu.registers[FLAG_REGISTER] = (y >= x) as u8;
    cpu.registers[code.x()] = y.wrapping_sub(x);
    Flow::Ok
}

/// 8xyE (SHL Vx)
///
/// VF receives the most-significant bit of Vx, then Vx is shifted left by 1.
/// VY is unused.
fn op_shl(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xy("SHL", cpu, code);

    let x = cpu.registers[code.x()];
    cpu.registers[FLAG_REGISTER] = x >> 7;
    cpu.registers[code.x()] = x << 1;
    Flow::Ok
}

/// Cxkk (RND Vx, byte)
///
/// Set register VX to the result of bitwise AND between a random number and KK.
fn op_rnd(cpu: &mut Chip8Cpu, rng: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xkk("RND", cpu, code);

    cpu.registers[code.x()] = rng.gen::<u8>() & code.kk();
    Flow::Ok
}

// ----------------------------------------------------------------------------
// Memory

/// Annn (LD I, addr)
fn op_ld_i(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_nnn("LD I", cpu, code);

    cpu.index = code.nnn();
    Flow::Ok
}

/// Fx1E (ADD I, Vx)
///
/// Add Vx to I. The carry is not reported in VF, and I wraps at 16 bits.
fn op_add_i_vx(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("ADD", cpu, code, "I");

    let x = cpu.registers[code.x()] as Address;
    cpu.index = cpu.index.wrapping_add(x);
    Flow::Ok
}

/// Fx29 (LD F, Vx)
///
/// Set I = location of sprite for digit Vx.
fn op_ld_f_vx(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("LD", cpu, code, "F");

    let x = cpu.registers[code.x()] as Address;
    cpu.index = FONTSET_START + x * FONTSET_HEIGHT as Address;
    Flow::Ok
}

/// Fx33 (LD B, Vx)
///
/// Store the binary-coded decimal representation of Vx
/// in the memory locations I, I+1, and I+2.
#[rustfmt::skip]
fn op_ld_b_vx(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("LD", cpu, code, "B");

    let addr = cpu.index as usize;
    let x = cpu.registers[code.x()];
    cpu.write(addr,     x / 100);
    cpu.write(addr + 1, x / 10  % 10);
    cpu.write(addr + 2, x       % 10);
    Flow::Ok
}

/// Fx55 (LD [I], Vx)
///
/// Store registers V0 through Vx in memory starting at location I.
/// I is left unchanged.
fn op_ld_mem_vx(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("LD", cpu, code, "[I]");

    let addr = cpu.index as usize;
    for v in 0..=code.x() {
        cpu.write(addr + v, cpu.registers[v]);
    }
    Flow::Ok
}

/// Fx65 (LD Vx, [I])
///
/// Read registers V0 through Vx from memory starting at location I.
/// I is left unchanged.
fn op_ld_vx_mem(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xk("LD", cpu, code, "[I]");

    let addr = cpu.index as usize;
    for v in 0..=code.x() {
        cpu.registers[v] = cpu.read(addr + v);
    }
    Flow::Ok
}

// ----------------------------------------------------------------------------
// Display

/// Dxyn (DRW Vx, Vy, nibble)
///
/// Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
/// Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
/// memory pointed to by address register I.
///
/// Pixels drawn outside of the display area wrap around to the other side,
/// on each axis independently.
///
/// If the drawing operation erases existing pixels in the display buffer, register VF is set to
/// 1, and set to 0 if no display bits are unset. This is used for collision detection.
fn op_drw(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xyn("DRW", cpu, code);

    let (x, y) = (
        cpu.registers[code.x()] as usize,
        cpu.registers[code.y()] as usize,
    );
    let mut is_erased = false;

    for r in 0..code.n() as usize {
        // Each row is 8 bits representing the 8 pixels of the sprite.
        let row = cpu.read(cpu.index as usize + r);
        let py = (y + r) & DISPLAY_HEIGHT_MASK;

        for c in 0..8 {
            if row & (0x80 >> c) == 0 {
                continue;
            }

            let px = (x + c) & DISPLAY_WIDTH_MASK;
            let pixel = &mut cpu.display[px + py * DISPLAY_WIDTH];

            // XOR erases a pixel when both the old and new values are both 1.
            is_erased |= *pixel == PIXEL_ON;
            *pixel ^= PIXEL_ON;
        }
    }

    // If a pixel was erased, then a collision occurred.
    cpu.registers[FLAG_REGISTER] = is_erased as u8;
    Flow::Draw
}

// ----------------------------------------------------------------------------
// Keyboard

/// Ex9E (SKP Vx)
///
/// Skip the next instruction if the key with the value of Vx is pressed.
fn op_skp(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("SKP", cpu, code, "");

    if cpu.key_state(cpu.registers[code.x()] & 0xF) {
        skip(cpu);
    }
    Flow::Ok
}

/// ExA1 (SKNP Vx)
///
/// Skip the next instruction if the key with the value of Vx is not pressed.
fn op_sknp(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("SKNP", cpu, code, "");

    if !cpu.key_state(cpu.registers[code.x()] & 0xF) {
        skip(cpu);
    }
    Flow::Ok
}

/// Fx0A (LD Vx, K)
///
/// Wait for a key press, store the value of the key in Vx.
///
/// When no key is down the program counter is rewound, so the same
/// instruction executes again on the next cycle.
fn op_ld_vx_k(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xk("LD", cpu, code, "K");

    match cpu.first_key() {
        Some(k) => {
            cpu.registers[code.x()] = k;
            cpu.key_wait = false;
            Flow::Ok
        }
        None => {
            // rewind the program counter to stall the machine
            cpu.pc = cpu.pc.wrapping_sub(2);
            cpu.key_wait = true;
            Flow::KeyWait
        }
    }
}

// ----------------------------------------------------------------------------
// Timers

/// Fx07 (LD Vx, DT)
fn op_ld_vx_dt(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_xk("LD", cpu, code, "DT");

    cpu.registers[code.x()] = cpu.delay_timer;
    Flow::Ok
}

/// Fx15 (LD DT, Vx)
fn op_ld_dt_vx(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("LD", cpu, code, "DT");

    cpu.delay_timer = cpu.registers[code.x()];
    Flow::Ok
}

/// Fx18 (LD ST, Vx)
fn op_ld_st_vx(cpu: &mut Chip8Cpu, _: &mut dyn RngCore, code: Opcode) -> Flow {
    op_trace_kx("LD", cpu, code, "ST");

    cpu.sound_timer = cpu.registers[code.x()];
    Flow::Sound
}

// ----------------------------------------------------------------------------
// Tracing
//
// The program counter has already moved past the instruction being traced.

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(name: &str, cpu: &Chip8Cpu, _: Opcode) {
    log::trace!("{:04X}: {:4}", cpu.pc.wrapping_sub(2), name);
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_nnn(name: &str, cpu: &Chip8Cpu, code: Opcode) {
    log::trace!("{:04X}: {:4} {:03X}", cpu.pc.wrapping_sub(2), name, code.nnn());
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_xkk(name: &str, cpu: &Chip8Cpu, code: Opcode) {
    log::trace!(
        "{:04X}: {:4} V{:X} {:02X}",
        cpu.pc.wrapping_sub(2),
        name,
        code.x(),
        code.kk()
    );
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_xyn(name: &str, cpu: &Chip8Cpu, code: Opcode) {
    log::trace!(
        "{:04X}: {:4} V{:X} V{:X} {:01X}",
        cpu.pc.wrapping_sub(2),
        name,
        code.x(),
        code.y(),
        code.n()
    );
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_xy(name: &str, cpu: &Chip8Cpu, code: Opcode) {
    log::trace!(
        "{:04X}: {:4} V{:X} V{:X}",
        cpu.pc.wrapping_sub(2),
        name,
        code.x(),
        code.y()
    );
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_xk(name: &str, cpu: &Chip8Cpu, code: Opcode, k: &str) {
    log::trace!("{:04X}: {:4} V{:X} {}", cpu.pc.wrapping_sub(2), name, code.x(), k);
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace_kx(name: &str, cpu: &Chip8Cpu, code: Opcode, k: &str) {
    log::trace!("{:04X}: {:4} {} V{:X}", cpu.pc.wrapping_sub(2), name, k, code.x());
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: &str, _: &Chip8Cpu, _: Opcode) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_nnn(_: &str, _: &Chip8Cpu, _: Opcode) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_xkk(_: &str, _: &Chip8Cpu, _: Opcode) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_xyn(_: &str, _: &Chip8Cpu, _: Opcode) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_xy(_: &str, _: &Chip8Cpu, _: Opcode) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_xk(_: &str, _: &Chip8Cpu, _: Opcode, _: &str) {}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace_kx(_: &str, _: &Chip8Cpu, _: Opcode, _: &str) {}
