//! The memory subsystem: an address-interval tree of byte-wide devices.

use std::sync::Arc;

use bitflags::bitflags;

use crate::spinlock::{MsLock, Role};

/// Outcome of a single device access. `value()` yields the carried byte, or
/// zero when the access produced a signal instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemResult {
    Success(u8),
    Wait,
    OutOfRange,
    CannotRead,
    CannotWrite,
}

impl MemResult {
    pub fn value(self) -> u8 {
        match self {
            MemResult::Success(value) => value,
            _ => 0,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, MemResult::Success(_))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A byte-addressed memory-mapped device.
///
/// `debug_write` bypasses the access mask so inspectors can seed read-only
/// devices; the bulk helpers build on it.
pub trait MemoryDevice: Send + Sync {
    fn size(&self) -> usize;
    fn read(&self, address: usize) -> MemResult;
    fn write(&self, address: usize, value: u8) -> MemResult;
    fn debug_write(&self, address: usize, value: u8);

    fn debug_fill(&self, value: u8) {
        for address in 0..self.size() {
            self.debug_write(address, value);
        }
    }

    /// Copy a raw byte image into the device, truncating at the end of
    /// memory.
    fn debug_load(&self, address: usize, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            if address + i >= self.size() {
                tracing::warn!("debug_load: data truncated past end of memory");
                return;
            }
            self.debug_write(address + i, byte);
        }
    }

    /// Write 16-bit words in the machine's big-endian instruction order.
    fn debug_load_words(&self, address: usize, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            let [high, low] = word.to_be_bytes();
            self.debug_write(address + 2 * i, high);
            self.debug_write(address + 2 * i + 1, low);
        }
    }
}

/// Fixed-size byte array guarded by a master/slave spinlock.
pub struct BufferDevice {
    size: usize,
    access: Access,
    cells: MsLock<Box<[u8]>>,
}

impl BufferDevice {
    pub fn new(size: usize, access: Access) -> Self {
        Self {
            size,
            access,
            cells: MsLock::new(vec![0u8; size].into_boxed_slice()),
        }
    }
}

impl MemoryDevice for BufferDevice {
    fn size(&self) -> usize {
        self.size
    }

    fn read(&self, address: usize) -> MemResult {
        if !self.access.contains(Access::READ) {
            return MemResult::CannotRead;
        }
        if address >= self.size {
            return MemResult::OutOfRange;
        }
        MemResult::Success(self.cells.lock(Role::Slave)[address])
    }

    fn write(&self, address: usize, value: u8) -> MemResult {
        if !self.access.contains(Access::WRITE) {
            return MemResult::CannotWrite;
        }
        if address >= self.size {
            return MemResult::OutOfRange;
        }
        self.cells.lock(Role::Slave)[address] = value;
        MemResult::Success(value)
    }

    fn debug_write(&self, address: usize, value: u8) {
        if address >= self.size {
            return;
        }
        self.cells.lock(Role::Slave)[address] = value;
    }
}

/// Maps address intervals to child devices. Children are looked up by the
/// greatest mapped base at or below the address and see addresses relative
/// to that base. Gaps between children are unmapped and read as
/// `OutOfRange`.
pub struct Bus {
    access: Access,
    table: Vec<(usize, Arc<dyn MemoryDevice>)>,
}

impl Bus {
    pub fn new(access: Access) -> Self {
        Self {
            access,
            table: Vec::new(),
        }
    }

    /// Map a device at `base`.
    ///
    /// Panics if the base is already mapped; overlapping children are not
    /// detected.
    pub fn map(&mut self, base: usize, device: Arc<dyn MemoryDevice>) {
        match self.table.binary_search_by_key(&base, |entry| entry.0) {
            Ok(_) => panic!("bus: address {base:#06x} is already mapped"),
            Err(position) => self.table.insert(position, (base, device)),
        }
    }

    fn resolve(&self, address: usize) -> Option<&(usize, Arc<dyn MemoryDevice>)> {
        let index = match self.table.binary_search_by_key(&address, |entry| entry.0) {
            Ok(index) => index,
            Err(0) => return None,
            Err(index) => index - 1,
        };
        self.table.get(index)
    }
}

impl MemoryDevice for Bus {
    fn size(&self) -> usize {
        self.table
            .last()
            .map_or(0, |(base, device)| base + device.size())
    }

    fn read(&self, address: usize) -> MemResult {
        if !self.access.contains(Access::READ) {
            return MemResult::CannotRead;
        }
        match self.resolve(address) {
            Some((base, device)) => device.read(address - base),
            None => MemResult::OutOfRange,
        }
    }

    fn write(&self, address: usize, value: u8) -> MemResult {
        if !self.access.contains(Access::WRITE) {
            return MemResult::CannotWrite;
        }
        match self.resolve(address) {
            Some((base, device)) => device.write(address - base, value),
            None => MemResult::OutOfRange,
        }
    }

    fn debug_write(&self, address: usize, value: u8) {
        if let Some((base, device)) = self.resolve(address) {
            device.debug_write(address - base, value);
        }
    }
}
