//! Caller-owned response buffer
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embedded_services::GlobalRawMutex;
use heapless::Vec;

/// Maximum response payload length
pub const MAX_DATA_LEN: usize = 64;

/// Response payload storage
///
/// The caller keeps ownership; a port only writes to it while the request that carries it is outstanding.
pub struct OutputBuffer {
    data: Mutex<GlobalRawMutex, RefCell<Vec<u8, MAX_DATA_LEN>>>,
}

impl OutputBuffer {
    pub const fn new() -> Self {
        Self {
            data: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Replace the contents, data beyond [`MAX_DATA_LEN`] is dropped
    pub fn write(&self, data: &[u8]) {
        self.data.lock(|buffer| {
            let mut buffer = buffer.borrow_mut();
            buffer.clear();
            let len = data.len().min(MAX_DATA_LEN);
            if let Some(data) = data.get(..len) {
                // Cannot fail, length is bounded by the capacity
                let _ = buffer.extend_from_slice(data);
            }
        });
    }

    pub fn clear(&self) {
        self.data.lock(|buffer| buffer.borrow_mut().clear());
    }

    /// Copy of the current contents
    pub fn data(&self) -> Vec<u8, MAX_DATA_LEN> {
        self.data.lock(|buffer| buffer.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.data.lock(|buffer| buffer.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.data.lock(|buffer| buffer.borrow().get(offset).copied())
    }

    /// Little endian u16 at `offset`
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        self.data.lock(|buffer| {
            let buffer = buffer.borrow();
            let bytes = buffer.get(offset..offset + 2)?;
            Some(u16::from_le_bytes(bytes.try_into().ok()?))
        })
    }

    /// Little endian u32 at `offset`
    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        self.data.lock(|buffer| {
            let buffer = buffer.borrow();
            let bytes = buffer.get(offset..offset + 4)?;
            Some(u32::from_le_bytes(bytes.try_into().ok()?))
        })
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
