//! The execution shell: a CPU state behind a master/slave lock, an attached
//! memory tree, and the executor/inspector thread protocol.
//!
//! The executor owns the state as SLAVE for bursts of up to `MAX_BURST`
//! micro-steps, releasing the lock between bursts so inspectors (MASTER)
//! can take consistent snapshots without stopping the machine.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cpu::{CpuState, Stage, Trap};
use crate::memory::MemoryDevice;
use crate::spinlock::{MsLock, Role};

const MAX_BURST: u64 = 1_000_000;

struct Core {
    state: MsLock<CpuState>,
    memory: Arc<dyn MemoryDevice>,
    run: AtomicBool,
    fault: MsLock<Option<Trap>>,
}

impl Core {
    fn fail(&self, trap: Trap) {
        tracing::error!("cpu fault: {trap}");
        *self.fault.lock(Role::Master) = Some(trap);
        self.run.store(false, Ordering::Relaxed);
    }

    fn step_worker(&self, mut count: u64) -> Result<(), Trap> {
        while self.run.load(Ordering::Relaxed) {
            let mut state = self.state.lock(Role::Slave);
            for _ in 0..MAX_BURST {
                if count == 0 {
                    return Ok(());
                }
                count -= 1;
                state.micro_step(self.memory.as_ref())?;
            }
        }
        Ok(())
    }

    fn freerun_worker(&self) -> Result<(), Trap> {
        while self.run.load(Ordering::Relaxed) {
            let mut state = self.state.lock(Role::Slave);
            for _ in 0..MAX_BURST {
                state.micro_step(self.memory.as_ref())?;
            }
        }
        Ok(())
    }

    fn paced_worker(&self, period: Duration) -> Result<(), Trap> {
        let mut then = Instant::now();
        while self.run.load(Ordering::Relaxed) {
            let mut next = then + period;
            let mut state = self.state.lock(Role::Slave);
            let mut burst = 0;
            let now = Instant::now();
            while next <= now && burst != MAX_BURST {
                then = next;
                state.micro_step(self.memory.as_ref())?;
                next = then + period;
                burst += 1;
            }
            drop(state);
            if burst < MAX_BURST {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }
}

struct FreqProbe {
    at: Instant,
    cycle: u64,
    freq: f64,
}

pub struct Computer {
    core: Arc<Core>,
    worker: Option<JoinHandle<()>>,
    probe: MsLock<FreqProbe>,
}

impl Computer {
    pub fn new(memory: Arc<dyn MemoryDevice>) -> Self {
        Self {
            core: Arc::new(Core {
                state: MsLock::new(CpuState::new()),
                memory,
                run: AtomicBool::new(false),
                fault: MsLock::new(None),
            }),
            worker: None,
            probe: MsLock::new(FreqProbe {
                at: Instant::now(),
                cycle: 0,
                freq: 0.0,
            }),
        }
    }

    /// Reset the machine to its starting state.
    pub fn reset(&self) {
        self.core.state.lock(Role::Slave).reset();
    }

    /// Pause execution after the current burst and join the executor.
    pub fn stop(&mut self) {
        self.core.run.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Run `count` cycles on an executor thread.
    pub fn step(&mut self, count: u64) {
        self.stop();
        self.core.run.store(true, Ordering::Relaxed);
        let core = Arc::clone(&self.core);
        self.worker = Some(std::thread::spawn(move || {
            if let Err(trap) = core.step_worker(count) {
                core.fail(trap);
            }
        }));
    }

    /// Run `count` cycles on the calling thread.
    pub fn step_sync(&mut self, count: u64) -> Result<(), Trap> {
        self.stop();
        self.core.run.store(true, Ordering::Relaxed);
        let result = self.core.step_worker(count);
        self.core.run.store(false, Ordering::Relaxed);
        result
    }

    /// Run continuously at `freq` cycles per second, or flat out when
    /// `None`.
    pub fn run(&mut self, freq: Option<f64>) {
        self.stop();
        self.core.run.store(true, Ordering::Relaxed);
        let core = Arc::clone(&self.core);
        self.worker = Some(std::thread::spawn(move || {
            let result = match freq {
                Some(freq) if freq.is_finite() => {
                    core.paced_worker(Duration::from_secs_f64(1.0 / freq))
                }
                _ => core.freerun_worker(),
            };
            if let Err(trap) = result {
                core.fail(trap);
            }
        }));
    }

    /// The trap that stopped the last asynchronous run, if any.
    pub fn fault(&self) -> Option<Trap> {
        self.core.fault.lock(Role::Master).clone()
    }

    /// Zero the CPU state and all attached memory.
    pub fn debug_init(&self) {
        let mut state = self.core.state.lock(Role::Master);
        *state = CpuState::new();
        self.core.memory.debug_fill(0);
    }

    /// A human-readable snapshot of the machine state.
    pub fn debug_state(&self) -> String {
        let state = self.core.state.lock(Role::Master).clone();
        let now = Instant::now();

        let mut probe = self.probe.lock(Role::Master);
        let dt = now.duration_since(probe.at).as_secs_f64();
        let diff = state.cycle.saturating_sub(probe.cycle);
        if dt >= 0.5 && (diff >= 10 || dt >= 1.0) {
            probe.freq = diff as f64 / dt;
            probe.at = now;
            probe.cycle = state.cycle;
        }
        let freq = probe.freq;
        drop(probe);

        let stage_index = match state.stage {
            Stage::Fetch => 0,
            Stage::Decode => 1,
            Stage::Execute => 2,
            Stage::Memory => 3,
            Stage::Writeback => 4,
        };
        let mut stage_str = String::from(" F  D  X  M  W ");
        stage_str.replace_range(3 * stage_index..3 * stage_index + 1, "[");
        stage_str.replace_range(3 * stage_index + 2..3 * stage_index + 3, "]");

        let pair = |low: usize| {
            u16::from(state.registers[low]) | u16::from(state.registers[low + 1]) << 8
        };

        let mut s = String::new();
        let _ = writeln!(s, "freq:  {}", hr_freq(freq));
        let _ = writeln!(s, "cycle: {}", state.cycle);
        let _ = writeln!(s, "stage: {stage_str}");
        let _ = writeln!(s, "pc:    {}", hr_word(state.pc));
        let _ = writeln!(s, "inst:  x{0:04x} b{0:016b}", state.instruction);
        let _ = writeln!(s, "op1:   {}", hr_word(state.alu_op1));
        let _ = writeln!(s, "op2:   {}", hr_byte(state.alu_op2));
        let _ = writeln!(s, "res:   {}", hr_word(state.result));
        let _ = writeln!(s, "jump:  {}", state.take_jump);
        let _ = writeln!(s, "sret:  {}", state.save_ret);
        let _ = writeln!(s, "sres:  {}", state.alu_write);
        let _ = writeln!(s, "setf:  {}", state.alu_set_flags);
        let _ = writeln!(s, "store: {}", hr_byte(state.store_val));
        let _ = writeln!(s);
        let _ = writeln!(s, "ra:    {}", hr_word(pair(0)));
        let _ = writeln!(s, "sr:    x{0:02x} b{0:08b}", state.registers[2]);
        let _ = writeln!(s, "sp:    {}", hr_byte(state.registers[3]));
        let _ = writeln!(s, "fp/ga: {}", hr_byte(state.registers[4]));
        let _ = writeln!(s, "gb:    {}", hr_byte(state.registers[5]));
        let _ = writeln!(s, "gc:    {}", hr_byte(state.registers[6]));
        let _ = writeln!(s, "gd:    {}", hr_byte(state.registers[7]));
        let _ = writeln!(s, "ge:    {}", hr_word(pair(8)));
        let _ = writeln!(s, "gf:    {}", hr_word(pair(10)));
        let _ = writeln!(s, "gg:    {}", hr_word(pair(12)));
        let _ = writeln!(s, "gh:    {}", hr_word(pair(14)));
        s
    }
}

impl Drop for Computer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn hr_byte(x: u8) -> String {
    format!("x{x:02x} b{x:08b} {x} {:+}", x as i8)
}

fn hr_word(x: u16) -> String {
    format!("x{x:04x} b{x:016b} {x} {:+}", x as i16)
}

fn hr_freq(freq: f64) -> String {
    if freq >= 1e9 {
        format!("{:.2} GHz", freq / 1e9)
    } else if freq >= 1e6 {
        format!("{:.2} MHz", freq / 1e6)
    } else if freq >= 1e3 {
        format!("{:.2} kHz", freq / 1e3)
    } else {
        format!("{freq:.2} Hz")
    }
}
