//! Device handle shared between a control thread writing registers and an audio thread pulling
//! samples

use crate::opna::Opna;
use crate::register::RegisterWrite;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub struct SharedOpna {
    opna: Arc<Mutex<Opna>>,
}

impl SharedOpna {
    #[must_use]
    pub fn new(opna: Opna) -> Self {
        Self { opna: Arc::new(Mutex::new(opna)) }
    }

    // Device state is valid after any operation, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, Opna> {
        self.opna.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self, register: u16, value: u8) {
        self.lock().write(register, value);
    }

    /// Apply a batch of writes without any samples being generated in between.
    pub fn write_all(&self, writes: impl IntoIterator<Item = RegisterWrite>) {
        let mut opna = self.lock();
        for RegisterWrite { register, value } in writes {
            opna.write(register, value);
        }
    }

    pub fn with_lock<T>(&self, f: impl FnOnce(&mut Opna) -> T) -> T {
        f(&mut self.lock())
    }

    /// # Panics
    ///
    /// Panics if the buffers have different lengths.
    pub fn generate_stereo(&self, l_buffer: &mut [i32], r_buffer: &mut [i32]) {
        self.lock().generate_stereo(l_buffer, r_buffer);
    }

    pub fn generate_interleaved(&self, buffer: &mut [i32]) {
        self.lock().generate_interleaved(buffer);
    }
}
