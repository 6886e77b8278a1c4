use std::sync::Arc;
use std::time::Duration;

use mica16::cpu::Trap;
use mica16::memory::{Access, BufferDevice, Bus, MemResult, MemoryDevice};
use mica16::{Computer, Screen};

/// The default memory map: boot ROM, main RAM, screen cells at the top.
fn default_machine() -> (Computer, Arc<dyn MemoryDevice>, Screen) {
    let screen = Screen::new(80, 50);
    let screen_size = screen.memory().size();

    let mut bus = Bus::new(Access::READ_WRITE);
    bus.map(0x0000, Arc::new(BufferDevice::new(0x0100, Access::READ)));
    bus.map(
        0x0100,
        Arc::new(BufferDevice::new(0xFF00 - screen_size, Access::READ_WRITE)),
    );
    bus.map(0x10000 - screen_size, screen.memory());

    let memory: Arc<dyn MemoryDevice> = Arc::new(bus);
    let computer = Computer::new(Arc::clone(&memory));
    (computer, memory, screen)
}

/// mov ge.l, 0x00; mov ge.h, 0x03; jmp ge
const BOOT: [u16; 3] = [0x7080, 0x7093, 0xD070];

#[test]
fn boot_program_writes_to_the_screen() {
    let (mut computer, memory, screen) = default_machine();
    computer.debug_init();

    memory.debug_load_words(0x0000, &BOOT);
    memory.debug_load_words(
        0x0300,
        &[
            0x7080, // mov ge.l, 0x00
            0x7290, // mov ge.h, 0xE0
            0x7041, // mov ga, 0x41 (low six bits)
            0x7441, // mvh ga, 1
            0xB040, // st ga, ge
            0xCB7F, // rjmp . (spin)
        ],
    );

    computer.reset();
    computer.step_sync(10_000).unwrap();

    assert_eq!(memory.read(0x10000 - 8192), MemResult::Success(0x41));
    assert_eq!(screen.memory().read(0), MemResult::Success(0x41));
}

#[test]
fn screen_is_power_of_two_sized() {
    let screen = Screen::new(80, 50);
    assert_eq!(screen.memory().size(), 8192);
}

#[test]
fn screen_debug_print_writes_cells() {
    let screen = Screen::new(80, 50);
    screen.debug_print(2, 1, "HI");

    let cell = (80 + 2) * 2;
    assert_eq!(screen.memory().read(cell), MemResult::Success(b'H'));
    assert_eq!(screen.memory().read(cell + 2), MemResult::Success(b'I'));
}

#[test]
fn debug_init_zeroes_state_and_memory() {
    let (computer, memory, _screen) = default_machine();
    memory.debug_write(0x0150, 0xAB);
    computer.debug_init();
    assert_eq!(memory.read(0x0150), MemResult::Success(0));
    assert!(computer.debug_state().contains("cycle: 0"));
}

#[test]
fn step_runs_exactly_the_requested_cycles() {
    let (mut computer, memory, _screen) = default_machine();
    computer.debug_init();
    memory.debug_load_words(0x0000, &[0xCB7F]); // spin in place
    computer.reset();

    computer.step_sync(25).unwrap();
    assert!(computer.debug_state().contains("cycle: 25"));
}

#[test]
fn inspectors_can_snapshot_a_running_machine() {
    let (mut computer, memory, _screen) = default_machine();
    computer.debug_init();
    memory.debug_load_words(0x0000, &[0xCB7F]);
    computer.reset();

    computer.run(None);
    std::thread::sleep(Duration::from_millis(50));
    let first = computer.debug_state();
    let second = computer.debug_state();
    computer.stop();

    assert!(first.contains("pc:"));
    assert!(second.contains("pc:"));
    assert!(computer.fault().is_none());
}

#[test]
fn worker_fault_is_surfaced() {
    let (mut computer, memory, _screen) = default_machine();
    computer.debug_init();
    memory.debug_load_words(0x0000, &[0x2C00]); // reserved ALU op
    computer.reset();

    computer.step(100);
    for _ in 0..200 {
        if computer.fault().is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    computer.stop();
    assert_eq!(
        computer.fault(),
        Some(Trap::IllegalInstruction { word: 0x2C00 })
    );
}

#[test]
fn paced_run_makes_progress() {
    let (mut computer, memory, _screen) = default_machine();
    computer.debug_init();
    memory.debug_load_words(0x0000, &[0xCB7F]);
    computer.reset();

    computer.run(Some(50_000.0));
    std::thread::sleep(Duration::from_millis(200));
    computer.stop();
    assert!(!computer.debug_state().contains("cycle: 0"));
}
