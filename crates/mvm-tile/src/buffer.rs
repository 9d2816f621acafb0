//! Host and device buffer ownership.

use mvm_common::{DeviceView, DeviceViewMut, Element, MvmError, Result, try_zeroed};

/// Host-side storage of a tensor handle.
///
/// Owned buffers are allocated (zeroed) by the handle and freed when it is
/// dropped; borrowed buffers belong to the caller.
#[derive(Debug)]
pub enum HostBuffer<'a, T> {
    Owned(Vec<T>),
    Borrowed(&'a [T]),
    BorrowedMut(&'a mut [T]),
}

impl<T: Element> HostBuffer<'_, T> {
    /// Allocate a zeroed owned buffer.
    pub fn zeroed(len: usize) -> Result<Self> {
        Ok(Self::Owned(try_zeroed(len, "host buffer")?))
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Owned(v) => v,
            Self::Borrowed(s) => s,
            Self::BorrowedMut(s) => s,
        }
    }

    /// Mutable access, refused for read-only borrows.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        match self {
            Self::Owned(v) => Ok(v),
            Self::BorrowedMut(s) => Ok(s),
            Self::Borrowed(_) => Err(MvmError::invalid_state(
                "host buffer is borrowed read-only and cannot be written",
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Whether the handle allocated this buffer.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::Borrowed(_))
    }
}

/// Device-side storage, shaped by the tile geometry rather than the host
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer<Q> {
    data: Vec<Q>,
}

impl<Q: Element> DeviceBuffer<Q> {
    /// Allocate a zeroed buffer of `len` elements.
    pub fn zeroed(len: usize) -> Result<Self> {
        Ok(Self { data: try_zeroed(len, "device buffer")? })
    }

    /// Make `slot` hold a zeroed buffer of exactly `len` elements, reusing
    /// the existing allocation when the length already matches.
    pub fn prepare(slot: &mut Option<Self>, len: usize) -> Result<&mut Self> {
        match slot {
            Some(buf) if buf.len() == len => buf.data.fill(Q::default()),
            _ => *slot = Some(Self::zeroed(len)?),
        }
        slot.as_mut().ok_or_else(|| MvmError::invalid_state("device buffer allocation vanished"))
    }

    pub fn as_slice(&self) -> &[Q] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Q] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Typed view handed to the device trigger.
    pub fn view(&self) -> DeviceView<'_> {
        Q::view(&self.data)
    }

    pub fn view_mut(&mut self) -> DeviceViewMut<'_> {
        Q::view_mut(&mut self.data)
    }
}
