use chip8::{constants::*, prelude::*, KeyCode};
use rand::{rngs::StdRng, SeedableRng};

fn vm_with(rom: &[u8]) -> Chip8Vm {
    let mut vm = Chip8Vm::new(Chip8Conf {
        seed: Some(0xC8),
        ..Default::default()
    });
    assert_eq!(vm.load_rom(rom), rom.len());
    vm
}

#[test]
fn test_end_to_end_add() {
    let mut vm = vm_with(&[
        0x60, 0x05, // LD V0, 0x05
        0x70, 0x03, // ADD V0, 0x03
    ]);

    vm.run_steps(2);

    assert_eq!(vm.register(0), 8);
    assert_eq!(vm.pc() as usize, MEM_START + 4);
    assert_eq!(vm.opcode().0, 0x7003);
}

#[test]
#[rustfmt::skip]
fn test_arithmetic_flags() {
    let mut vm = vm_with(&[
        0x60, 250,  // LD V0, 250
        0x61, 10,   // LD V1, 10
        0x80, 0x14, // ADD V0, V1
        0x62, 10,   // LD V2, 10
        0x63, 250,  // LD V3, 250
        0x82, 0x35, // SUB V2, V3
        0x64, 0x81, // LD V4, 0b10000001
        0x84, 0x06, // SHR V4
    ]);

    vm.run_steps(3);
    assert_eq!(vm.register(0), 4);
    assert_eq!(vm.register(0xF), 1);

    vm.run_steps(3);
    assert_eq!(vm.register(2), 16);
    assert_eq!(vm.register(0xF), 0);

    vm.run_steps(2);
    assert_eq!(vm.register(4), 0b0100_0000);
    assert_eq!(vm.register(0xF), 1);
}

#[test]
#[rustfmt::skip]
fn test_draw_twice_erases() {
    let mut vm = vm_with(&[
        0xA2, 0x0A, // LD I, .sprite
        0xD0, 0x12, // DRW V0, V1, 2
        0xD0, 0x12, // DRW V0, V1, 2
        0x12, 0x06, // JP self
        0x00, 0x00,
        // .sprite
        0b10100101,
        0b01011010,
    ]);

    vm.run_steps(2);
    assert_eq!(vm.register(0xF), 0);
    assert!(vm.pixel(0, 0));
    assert!(!vm.pixel(1, 0));
    assert!(vm.pixel(1, 1));
    assert_eq!(
        vm.display_buffer().iter().filter(|px| **px == PIXEL_ON).count(),
        8
    );

    assert_eq!(vm.cycle(), Flow::Draw);
    assert_eq!(vm.register(0xF), 1);
    assert!(vm.display_buffer().iter().all(|px| *px == PIXEL_OFF));
}

#[test]
#[rustfmt::skip]
fn test_draw_wraps_at_right_edge() {
    let mut vm = vm_with(&[
        0xA2, 0x08, // LD I, .sprite
        0x60, 63,   // LD V0, 63
        0xD0, 0x11, // DRW V0, V1, 1
        0x00, 0x00,
        // .sprite
        0b11000000,
    ]);

    vm.run_steps(3);
    assert!(vm.pixel(63, 0));
    assert!(vm.pixel(0, 0));
    assert!(!vm.pixel(1, 0));
}

#[test]
#[rustfmt::skip]
fn test_call_return() {
    let mut vm = vm_with(&[
        0x22, 0x06, // CALL .sub
        0x61, 0x01, // LD V1, 1
        0x12, 0x04, // JP self
        // .sub
        0x60, 0x07, // LD V0, 7
        0x00, 0xEE, // RET
    ]);

    assert_eq!(vm.cycle(), Flow::Jump);
    assert_eq!(vm.pc(), 0x206);
    assert_eq!(vm.sp(), 1);

    vm.cycle();
    assert_eq!(vm.cycle(), Flow::Jump);
    assert_eq!(vm.pc() as usize, MEM_START + 2);
    assert_eq!(vm.sp(), 0);

    vm.cycle();
    assert_eq!(vm.register(0), 7);
    assert_eq!(vm.register(1), 1);
}

#[test]
fn test_return_with_empty_stack_wraps() {
    let mut vm = vm_with(&[0x00, 0xEE]);

    assert_eq!(vm.cycle(), Flow::Jump);
    assert_eq!(vm.sp(), STACK_SIZE - 1);
    // Stack memory starts zeroed.
    assert_eq!(vm.pc(), 0);
}

#[test]
fn test_deep_recursion_wraps() {
    // CALL 0x200, forever.
    let mut vm = vm_with(&[0x22, 0x00]);

    vm.run_steps(STACK_SIZE);
    assert_eq!(vm.sp(), STACK_SIZE);

    vm.cycle();
    assert_eq!(vm.sp(), 1);
    assert_eq!(vm.pc() as usize, MEM_START);
}

#[test]
#[rustfmt::skip]
fn test_wait_for_key() {
    let mut vm = vm_with(&[
        0xF3, 0x0A, // LD V3, K
        0x00, 0xE0, // CLS
    ]);

    assert_eq!(vm.cycle(), Flow::KeyWait);
    assert_eq!(vm.pc() as usize, MEM_START);
    assert_eq!(vm.cycle(), Flow::KeyWait);
    assert_eq!(vm.pc() as usize, MEM_START);

    let mut keys = [false; 16];
    keys[0xB] = true;
    keys[0x7] = true;
    vm.set_keys(&keys);

    assert_eq!(vm.cycle(), Flow::Ok);
    assert_eq!(vm.pc() as usize, MEM_START + 2);
    assert_eq!(vm.register(3), 0x7);
}

#[test]
#[rustfmt::skip]
fn test_skip_if_key() {
    let mut vm = vm_with(&[
        0x60, 0x0C, // LD V0, 0xC
        0xE0, 0x9E, // SKP V0
        0x61, 0x01, // LD V1, 1
        0xE0, 0xA1, // SKNP V0
        0xE0, 0xA1, // SKNP V0
        0x62, 0x01, // LD V2, 1
    ]);
    vm.set_key(KeyCode::KeyC, true);

    // SKP skips, first SKNP doesn't.
    vm.run_steps(3);
    assert_eq!(vm.pc() as usize, MEM_START + 8);
    assert_eq!(vm.register(1), 0);

    vm.clear_keys();
    vm.run_steps(1);
    assert_eq!(vm.pc() as usize, MEM_START + 12);
    assert_eq!(vm.register(2), 0);
}

#[test]
#[rustfmt::skip]
fn test_bcd_and_font() {
    let mut vm = vm_with(&[
        0x60, 156,  // LD V0, 156
        0xA3, 0x00, // LD I, 0x300
        0xF0, 0x33, // LD B, V0
        0x61, 0x0A, // LD V1, 0xA
        0xF1, 0x29, // LD F, V1
    ]);

    vm.run_steps(3);
    assert_eq!(&vm.memory()[0x300..0x303], &[1, 5, 6]);

    vm.run_steps(2);
    assert_eq!(vm.index(), FONTSET_START + 50);
    let glyph = vm.index() as usize;
    assert_eq!(&vm.memory()[glyph..glyph + 5], &FONTSET[50..55]);
}

#[test]
#[rustfmt::skip]
fn test_register_block_round_trip() {
    let mut vm = vm_with(&[
        0x60, 0x11, // LD V0, 0x11
        0x61, 0x22, // LD V1, 0x22
        0x62, 0x33, // LD V2, 0x33
        0xA4, 0x00, // LD I, 0x400
        0xF2, 0x55, // LD [I], V2
        0x60, 0x00, // LD V0, 0
        0x61, 0x00, // LD V1, 0
        0x62, 0x00, // LD V2, 0
        0xF1, 0x65, // LD V1, [I]
    ]);

    vm.run_steps(5);
    assert_eq!(&vm.memory()[0x400..0x404], &[0x11, 0x22, 0x33, 0x00]);

    vm.run_steps(4);
    assert_eq!(vm.register(0), 0x11);
    assert_eq!(vm.register(1), 0x22);
    assert_eq!(vm.register(2), 0x00);
}

#[test]
fn test_random_with_injected_rng() {
    let rom = [0xC0, 0xFF, 0xC1, 0xFF, 0xC2, 0xFF];

    let mut a = Chip8Vm::with_rng(Chip8Conf::default(), StdRng::seed_from_u64(7));
    let mut b = Chip8Vm::with_rng(Chip8Conf::default(), StdRng::seed_from_u64(7));
    a.load_rom(&rom);
    b.load_rom(&rom);
    a.run_steps(3);
    b.run_steps(3);

    assert_eq!(a.registers(), b.registers());
}

#[test]
fn test_unknown_opcodes_do_not_halt() {
    let mut vm = vm_with(&[
        0x01, 0x23, // SYS 0x123, ignored
        0x5A, 0xB1, // undefined
        0xE0, 0x00, // undefined
        0xF0, 0xFF, // undefined
        0x8A, 0xBF, // undefined
        0x60, 0x2A, // LD V0, 42
    ]);

    for _ in 0..5 {
        assert_eq!(vm.cycle(), Flow::Ok);
    }
    vm.cycle();
    assert_eq!(vm.register(0), 42);
}

#[test]
fn test_oversized_rom_is_truncated() {
    let mut vm = Chip8Vm::new(Chip8Conf::default());
    let rom = vec![0x12; MEM_SIZE];

    assert_eq!(vm.load_rom(&rom), MAX_PROGRAM_SIZE);
    assert_eq!(vm.memory()[MEM_SIZE - 1], 0x12);
    // Font area is untouched.
    assert_eq!(vm.memory()[FONTSET_START as usize], FONTSET[0]);
}

#[test]
fn test_fetch_wraps_past_end_of_memory() {
    let mut vm = vm_with(&[0x1F, 0xFE]); // JP 0xFFE

    vm.cycle();
    assert_eq!(vm.pc(), 0xFFE);

    // 0xFFE holds 0x00 and 0xFFF too, the program counter keeps counting.
    vm.cycle();
    assert_eq!(vm.pc(), 0x1000);

    // Fetch wraps to address 0x000, holding 0x0000.
    assert_eq!(vm.cycle(), Flow::Ok);
    assert_eq!(vm.opcode().0, 0x0000);
}

#[test]
#[rustfmt::skip]
fn test_index_addressing_wraps_past_end_of_memory() {
    let mut vm = vm_with(&[
        0xAF, 0xFF, // LD I, 0xFFF
        0x60, 156,  // LD V0, 156
        0xF0, 0x33, // LD B, V0
        0xF2, 0x65, // LD V2, [I]
        0xD3, 0x42, // DRW V3, V4, 2
    ]);

    // BCD digits continue at the bottom of memory.
    vm.run_steps(3);
    assert_eq!(vm.memory()[0xFFF], 1);
    assert_eq!(vm.memory()[0x000], 5);
    assert_eq!(vm.memory()[0x001], 6);

    // Block load reads them back across the same boundary.
    vm.cycle();
    assert_eq!(&vm.registers()[..3], &[1, 5, 6]);
    assert_eq!(vm.index(), 0xFFF);

    // Sprite rows come from 0xFFF then 0x000.
    // row 0: 00000001
    // row 1: 00000101
    assert_eq!(vm.cycle(), Flow::Draw);
    assert_eq!(vm.register(0xF), 0);
    assert!(vm.pixel(7, 0));
    assert!(!vm.pixel(6, 0));
    assert!(vm.pixel(5, 1));
    assert!(!vm.pixel(6, 1));
    assert!(vm.pixel(7, 1));
    assert_eq!(vm.display_buffer().iter().filter(|px| **px == PIXEL_ON).count(), 3);
}
