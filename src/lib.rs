pub mod computer;
pub mod cpu;
pub mod isa;
pub mod memory;
pub mod screen;
pub mod spinlock;

pub use computer::Computer;
pub use cpu::{CpuState, Trap};
pub use memory::{Access, BufferDevice, Bus, MemResult, MemoryDevice};
pub use screen::Screen;
pub use spinlock::{MsLock, Role};
