use crate::remote_code_ptr::RemoteCodePtr;
use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result},
    marker::PhantomData,
    ops::{Add, Sub},
};

/// Useful alias.
pub type Void = u8;

/// An address in a tracee's address space, always held at the tracer's
/// native width. Never dereferenced locally.
#[derive(Hash, Debug)]
pub struct RemotePtr<T> {
    ptr: usize,
    /// This struct does not "own" a `T` so we use a `PhantomData<*const T>`.
    phantom: PhantomData<*const T>,
}

// Manually derive Copy, Clone due to quirks with PhantomData
impl<T> Clone for RemotePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RemotePtr<T> {}

impl<T> Default for RemotePtr<T> {
    fn default() -> Self {
        RemotePtr::null()
    }
}

impl<T> RemotePtr<T> {
    pub fn null() -> RemotePtr<T> {
        RemotePtr {
            ptr: 0,
            phantom: PhantomData,
        }
    }

    pub fn new_from_val(val: usize) -> RemotePtr<T> {
        RemotePtr {
            ptr: val,
            phantom: PhantomData,
        }
    }

    pub fn as_usize(&self) -> usize {
        self.ptr
    }

    pub fn as_u64(&self) -> u64 {
        self.ptr as u64
    }

    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }

    pub fn referent_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    pub fn cast<U>(r: RemotePtr<U>) -> RemotePtr<T> {
        RemotePtr::<T>::new_from_val(r.ptr)
    }

    pub fn to_code_ptr(self) -> RemoteCodePtr {
        RemoteCodePtr::from_val(self.ptr)
    }

    pub fn as_rptr_u8(self) -> RemotePtr<u8> {
        RemotePtr::<u8>::new_from_val(self.ptr)
    }
}

impl<T> Display for RemotePtr<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#x}", self.ptr)
    }
}

impl<T> Add<usize> for RemotePtr<T> {
    type Output = Self;

    fn add(self, delta: usize) -> Self::Output {
        // Will automatically deal with overflow in debug mode.
        Self::new_from_val(self.as_usize() + delta * std::mem::size_of::<T>())
    }
}

impl<T> Sub<usize> for RemotePtr<T> {
    type Output = Self;

    fn sub(self, delta: usize) -> Self::Output {
        // Will automatically deal with underflow in debug mode.
        Self::new_from_val(self.as_usize() - delta * std::mem::size_of::<T>())
    }
}

/// Note that the other RemotePtr must have SAME referent type.
impl<T> Sub<RemotePtr<T>> for RemotePtr<T> {
    type Output = usize;

    fn sub(self, rhs: RemotePtr<T>) -> Self::Output {
        let delta: usize = self.as_usize() - rhs.as_usize();
        delta / std::mem::size_of::<T>()
    }
}

impl<T> PartialOrd for RemotePtr<T> {
    fn partial_cmp(&self, other: &RemotePtr<T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for RemotePtr<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ptr.cmp(&other.ptr)
    }
}

impl<T> PartialEq for RemotePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for RemotePtr<T> {}

impl<T> From<usize> for RemotePtr<T> {
    fn from(addr: usize) -> Self {
        RemotePtr::<T>::new_from_val(addr)
    }
}
