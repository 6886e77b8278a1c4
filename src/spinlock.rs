//! Master/slave spinlock.
//!
//! `MsLock` is a data-holding spinlock that is acquired in one of two roles.
//! Any number of MASTER claims may be outstanding at once; while at least one
//! is, no SLAVE can get past the gate. Past the gate both roles contend for a
//! plain mutual-exclusion flag, so there is exactly one holder at a time.
//! The executor acquires its locks as SLAVE in long bursts; inspectors
//! acquire as MASTER and are therefore guaranteed to cut in between bursts
//! without being starved by a free-running executor.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

pub struct MsLock<T: ?Sized> {
    masters: AtomicU64,
    flag: AtomicBool,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for MsLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for MsLock<T> {}

impl<T> MsLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            masters: AtomicU64::new(0),
            flag: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized> MsLock<T> {
    pub fn lock(&self, role: Role) -> MsLockGuard<'_, T> {
        match role {
            Role::Master => {
                self.masters.fetch_add(1, Ordering::Relaxed);
            }
            Role::Slave => {
                while self.masters.load(Ordering::Relaxed) != 0 {
                    std::hint::spin_loop();
                    std::thread::yield_now();
                }
            }
        }

        while self.flag.swap(true, Ordering::Acquire) {
            while self.flag.load(Ordering::Relaxed) {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
        }

        MsLockGuard { lock: self, role }
    }
}

pub struct MsLockGuard<'a, T: ?Sized> {
    lock: &'a MsLock<T>,
    role: Role,
}

impl<T: ?Sized> Deref for MsLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for MsLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for MsLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.flag.store(false, Ordering::Release);
        if self.role == Role::Master {
            self.lock.masters.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
