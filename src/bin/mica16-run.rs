use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mica16::{Access, BufferDevice, Bus, Computer, MemoryDevice, Screen};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run a Mica-16 binary on the headless emulator"
)]
struct Opts {
    /// Program image, loaded big-endian at 0x0300
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,
    /// Number of pipeline cycles to run
    #[arg(long, default_value_t = 10_000)]
    step_limit: u64,
    /// Boot ROM image loaded at 0x0000; a built-in jump to 0x0300 when absent
    #[arg(long)]
    boot: Option<PathBuf>,
}

/// mov ge.l, 0x00; mov ge.h, 0x03; jmp ge
const DEFAULT_BOOT: [u16; 3] = [0x7080, 0x7093, 0xD070];

const SCREEN_WIDTH: usize = 80;
const SCREEN_HEIGHT: usize = 50;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let screen = Screen::new(SCREEN_WIDTH, SCREEN_HEIGHT);
    let screen_size = screen.memory().size();

    let mut bus = Bus::new(Access::READ_WRITE);
    // bootloader rom
    bus.map(0x0000, Arc::new(BufferDevice::new(0x0100, Access::READ)));
    // main memory, up to the start of the screen cells
    bus.map(
        0x0100,
        Arc::new(BufferDevice::new(0xFF00 - screen_size, Access::READ_WRITE)),
    );
    // screen cells at the end of the address space
    bus.map(0x10000 - screen_size, screen.memory());
    let memory: Arc<dyn MemoryDevice> = Arc::new(bus);

    let mut computer = Computer::new(Arc::clone(&memory));
    computer.debug_init();

    match &opts.boot {
        Some(path) => {
            let boot = std::fs::read(path)
                .with_context(|| format!("reading boot image {}", path.display()))?;
            memory.debug_load(0x0000, &boot);
        }
        None => memory.debug_load_words(0x0000, &DEFAULT_BOOT),
    }
    let program = std::fs::read(&opts.program)
        .with_context(|| format!("reading program {}", opts.program.display()))?;
    memory.debug_load(0x0300, &program);

    computer.reset();
    computer.step_sync(opts.step_limit)?;

    print_screen(&screen);
    Ok(())
}

const TERM_FG: [&str; 16] = [
    "30", "97", "91", "93", "92", "94", "96", "95", "31", "33", "32", "34", "36", "35", "37", "90",
];
const TERM_BG: [&str; 16] = [
    "40", "107", "101", "103", "102", "104", "106", "105", "41", "43", "42", "44", "46", "45",
    "47", "100",
];

fn color_escape(attr: u8) -> String {
    format!(
        "\x1b[{};{}m",
        TERM_FG[usize::from(attr >> 4)],
        TERM_BG[usize::from(attr & 0x0F)]
    )
}

fn print_screen(screen: &Screen) {
    let memory = screen.memory();
    let mut last_attr = memory.read(1).value();
    print!("{}", color_escape(last_attr));

    for y in 0..screen.height {
        for x in 0..screen.width {
            let cell = (y * screen.width + x) * 2;
            let charcode = memory.read(cell).value();
            if charcode == 0 {
                continue;
            }
            let attr = memory.read(cell + 1).value();
            if attr != last_attr {
                print!("{}", color_escape(attr));
                last_attr = attr;
            }
            print!("{}", charcode as char);
        }
    }

    println!("\x1b[0m");
}
