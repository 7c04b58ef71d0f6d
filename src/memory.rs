//! Device and host memory shared between command queues.
//!
//! Elements are stored in atomic cells. Lanes touching disjoint regions of
//! one buffer never contend, and kernels get atomic read-modify-write for
//! free (the histogram kernel relies on it). Ordering between producer and
//! consumer commands comes from the events, so cell accesses are relaxed.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

pub trait Scalar: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Cell: Send + Sync;

    const NAME: &'static str;

    fn new_cell(value: Self) -> Self::Cell;
    fn load(cell: &Self::Cell) -> Self;
    fn store(cell: &Self::Cell, value: Self);
    fn fetch_add(cell: &Self::Cell, value: Self) -> Self;

    fn wrap(buffer: DeviceBuffer<Self>) -> AnyBuffer;
    fn unwrap(buffer: &AnyBuffer) -> Option<&DeviceBuffer<Self>>;
}

impl Scalar for i32 {
    type Cell = AtomicI32;
    const NAME: &'static str = "int";

    fn new_cell(value: Self) -> Self::Cell {
        AtomicI32::new(value)
    }
    fn load(cell: &Self::Cell) -> Self {
        cell.load(Ordering::Relaxed)
    }
    fn store(cell: &Self::Cell, value: Self) {
        cell.store(value, Ordering::Relaxed)
    }
    fn fetch_add(cell: &Self::Cell, value: Self) -> Self {
        cell.fetch_add(value, Ordering::Relaxed)
    }
    fn wrap(buffer: DeviceBuffer<Self>) -> AnyBuffer {
        AnyBuffer::I32(buffer)
    }
    fn unwrap(buffer: &AnyBuffer) -> Option<&DeviceBuffer<Self>> {
        match buffer {
            AnyBuffer::I32(b) => Some(b),
            _ => None,
        }
    }
}

impl Scalar for u32 {
    type Cell = AtomicU32;
    const NAME: &'static str = "uint";

    fn new_cell(value: Self) -> Self::Cell {
        AtomicU32::new(value)
    }
    fn load(cell: &Self::Cell) -> Self {
        cell.load(Ordering::Relaxed)
    }
    fn store(cell: &Self::Cell, value: Self) {
        cell.store(value, Ordering::Relaxed)
    }
    fn fetch_add(cell: &Self::Cell, value: Self) -> Self {
        cell.fetch_add(value, Ordering::Relaxed)
    }
    fn wrap(buffer: DeviceBuffer<Self>) -> AnyBuffer {
        AnyBuffer::U32(buffer)
    }
    fn unwrap(buffer: &AnyBuffer) -> Option<&DeviceBuffer<Self>> {
        match buffer {
            AnyBuffer::U32(b) => Some(b),
            _ => None,
        }
    }
}

impl Scalar for f32 {
    // f32 has no native atomic; store the bit pattern
    type Cell = AtomicU32;
    const NAME: &'static str = "float";

    fn new_cell(value: Self) -> Self::Cell {
        AtomicU32::new(value.to_bits())
    }
    fn load(cell: &Self::Cell) -> Self {
        f32::from_bits(cell.load(Ordering::Relaxed))
    }
    fn store(cell: &Self::Cell, value: Self) {
        cell.store(value.to_bits(), Ordering::Relaxed)
    }
    fn fetch_add(cell: &Self::Cell, value: Self) -> Self {
        let prev = cell
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f32::from_bits(bits) + value).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f32::from_bits(prev)
    }
    fn wrap(buffer: DeviceBuffer<Self>) -> AnyBuffer {
        AnyBuffer::F32(buffer)
    }
    fn unwrap(buffer: &AnyBuffer) -> Option<&DeviceBuffer<Self>> {
        match buffer {
            AnyBuffer::F32(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFlags {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

struct Cells<T: Scalar> {
    cells: Arc<[T::Cell]>,
}

impl<T: Scalar> Clone for Cells<T> {
    fn clone(&self) -> Self {
        Self {
            cells: Arc::clone(&self.cells),
        }
    }
}

impl<T: Scalar> Cells<T> {
    fn filled(len: usize, value: T) -> Self {
        Self {
            cells: (0..len).map(|_| T::new_cell(value)).collect(),
        }
    }

    fn from_slice(data: &[T]) -> Self {
        Self {
            cells: data.iter().map(|&v| T::new_cell(v)).collect(),
        }
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn check_region(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(Error::out_of_bounds(offset, len, self.len())),
        }
    }

    fn write_from(&self, offset: usize, data: &[T]) -> Result<()> {
        self.check_region(offset, data.len())?;
        for (cell, &v) in self.cells[offset..offset + data.len()].iter().zip(data) {
            T::store(cell, v);
        }
        Ok(())
    }

    fn fill(&self, offset: usize, len: usize, value: T) -> Result<()> {
        self.check_region(offset, len)?;
        for cell in &self.cells[offset..offset + len] {
            T::store(cell, value);
        }
        Ok(())
    }

    fn read(&self, offset: usize, len: usize) -> Result<Vec<T>> {
        self.check_region(offset, len)?;
        Ok(self.cells[offset..offset + len].iter().map(T::load).collect())
    }
}

/// A fixed-size block of device memory. Clones share the same memory.
pub struct DeviceBuffer<T: Scalar> {
    mem: Cells<T>,
    flags: MemFlags,
}

impl<T: Scalar> Clone for DeviceBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            mem: self.mem.clone(),
            flags: self.flags,
        }
    }
}

impl<T: Scalar> DeviceBuffer<T> {
    pub fn new(len: usize, flags: MemFlags) -> Self {
        Self {
            mem: Cells::filled(len, T::default()),
            flags,
        }
    }

    /// Allocate and initialise from host memory (`CL_MEM_COPY_HOST_PTR`).
    pub fn from_slice(data: &[T], flags: MemFlags) -> Self {
        Self {
            mem: Cells::from_slice(data),
            flags,
        }
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.len() == 0
    }

    pub fn flags(&self) -> MemFlags {
        self.flags
    }

    pub fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }

    pub fn same_memory(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mem.cells, &other.mem.cells)
    }

    /// Read one element. Panics when `index` is out of range, like a slice.
    pub fn get(&self, index: usize) -> T {
        T::load(&self.mem.cells[index])
    }

    pub fn set(&self, index: usize, value: T) {
        T::store(&self.mem.cells[index], value)
    }

    /// Atomic add, returning the previous value.
    pub fn atomic_add(&self, index: usize, value: T) -> T {
        T::fetch_add(&self.mem.cells[index], value)
    }

    pub fn check_region(&self, offset: usize, len: usize) -> Result<()> {
        self.mem.check_region(offset, len)
    }

    pub(crate) fn write_from(&self, offset: usize, data: &[T]) -> Result<()> {
        self.mem.write_from(offset, data)
    }

    pub(crate) fn fill(&self, offset: usize, len: usize, value: T) -> Result<()> {
        self.mem.fill(offset, len, value)
    }

    pub(crate) fn read(&self, offset: usize, len: usize) -> Result<Vec<T>> {
        self.mem.read(offset, len)
    }

    /// Snapshot of the whole buffer. Only meaningful once the commands that
    /// write it have completed.
    pub fn to_vec(&self) -> Vec<T> {
        self.mem.cells.iter().map(T::load).collect()
    }
}

impl<T: Scalar> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("type", &T::NAME)
            .field("len", &self.len())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Host memory a non-blocking read can land in while the caller keeps going.
pub struct HostBuffer<T: Scalar> {
    mem: Cells<T>,
}

impl<T: Scalar> Clone for HostBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            mem: self.mem.clone(),
        }
    }
}

impl<T: Scalar> HostBuffer<T> {
    pub fn new(len: usize) -> Self {
        Self {
            mem: Cells::filled(len, T::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.len() == 0
    }

    pub fn check_region(&self, offset: usize, len: usize) -> Result<()> {
        self.mem.check_region(offset, len)
    }

    pub(crate) fn write_from(&self, offset: usize, data: &[T]) -> Result<()> {
        self.mem.write_from(offset, data)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.mem.cells.iter().map(T::load).collect()
    }
}

impl<T: Scalar> fmt::Debug for HostBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("type", &T::NAME)
            .field("len", &self.len())
            .finish()
    }
}

/// A device buffer of any supported element type, as bound to a kernel.
#[derive(Debug, Clone)]
pub enum AnyBuffer {
    I32(DeviceBuffer<i32>),
    U32(DeviceBuffer<u32>),
    F32(DeviceBuffer<f32>),
}

impl AnyBuffer {
    pub fn len(&self) -> usize {
        match self {
            AnyBuffer::I32(b) => b.len(),
            AnyBuffer::U32(b) => b.len(),
            AnyBuffer::F32(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AnyBuffer::I32(_) => i32::NAME,
            AnyBuffer::U32(_) => u32::NAME,
            AnyBuffer::F32(_) => f32::NAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_roundtrip_region() {
        let buf = DeviceBuffer::<i32>::new(8, MemFlags::ReadWrite);
        buf.write_from(2, &[5, 6, 7]).unwrap();
        assert_eq!(buf.read(2, 3).unwrap(), vec![5, 6, 7]);
        assert_eq!(buf.get(0), 0);
    }

    #[test]
    fn test_out_of_bounds_region() {
        let buf = DeviceBuffer::<f32>::new(4, MemFlags::ReadOnly);
        let err = buf.write_from(3, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                offset: 3,
                len: 2,
                size: 4
            }
        ));
        assert!(buf.check_region(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_clones_share_memory() {
        let a = DeviceBuffer::<u32>::new(4, MemFlags::ReadWrite);
        let b = a.clone();
        b.set(1, 9);
        assert_eq!(a.get(1), 9);
        assert!(a.same_memory(&b));
    }

    #[test]
    fn test_float_atomic_add() {
        let buf = DeviceBuffer::<f32>::from_slice(&[1.5], MemFlags::ReadWrite);
        let prev = buf.atomic_add(0, 2.0);
        assert_eq!(prev, 1.5);
        assert_eq!(buf.get(0), 3.5);
    }

    #[test]
    fn test_concurrent_atomic_add() {
        let buf = DeviceBuffer::<i32>::new(1, MemFlags::ReadWrite);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        buf.atomic_add(0, 1);
                    }
                });
            }
        });
        assert_eq!(buf.get(0), 4000);
    }

    #[test]
    fn test_any_buffer_unwrap() {
        let any = i32::wrap(DeviceBuffer::new(3, MemFlags::ReadOnly));
        assert_eq!(any.len(), 3);
        assert_eq!(any.type_name(), "int");
        assert!(i32::unwrap(&any).is_some());
        assert!(f32::unwrap(&any).is_none());
    }

    #[test]
    fn test_host_buffer_fill_and_read() {
        let host = HostBuffer::<i32>::new(4);
        host.write_from(1, &[1, 2]).unwrap();
        assert_eq!(host.to_vec(), vec![0, 1, 2, 0]);
        assert!(host.write_from(3, &[1, 2]).is_err());
    }
}
