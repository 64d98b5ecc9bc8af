//! Memory-mapped backing vectors (§6, §9).
//!
//! Every large immutable structure the engine publishes at the end of a
//! phase (read store, k-mer table, marker table, marker graph) is written
//! to a memory-mapped file named by the `<prefix>/<entity>` convention and
//! is read-only to every subsequent phase. This module provides the one
//! primitive the rest of the crate builds on: a growable, then-frozen,
//! `Vec<T>`-shaped region backed by a real file so the "re-open in place"
//! part of §6 is satisfiable without this crate owning a process model —
//! `MappedVec::open` re-attaches to a file written by a previous run.
//!
//! `T` must be `Copy` and have no padding-sensitive invariants; this mirrors
//! the "struct-of-arrays with dense integer indices" design note (§9) where
//! every on-disk structure is an array of fixed-width plain values.

use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::EngineError;

/// Minimal fixed header so a mapped file can be reopened and its logical
/// length recovered without a side-channel. `magic` catches accidental
/// cross-entity reopens; `len` is the element count (not byte count).
#[repr(C)]
#[derive(Clone, Copy)]
struct Header {
    magic: u64,
    len: u64,
}

const HEADER_BYTES: usize = size_of::<Header>();
const MAGIC: u64 = 0x5348_4153_5441_3030; // "SHASTA00" in hex-ish form

/// A write-once, append-then-freeze vector of `T`, persisted via mmap.
///
/// During a phase, per-thread output vectors are built in ordinary memory
/// and merged sequentially (§5); `MappedVec::write_new` is the single
/// publication point at the end of the phase. Nothing else in this crate
/// mutates a `MappedVec` after that call returns.
pub struct MappedVec<T: Copy> {
    path: PathBuf,
    mmap: Mmap,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Copy> MappedVec<T> {
    /// Persist `data` to `path` and map it back in read-only.
    pub fn write_new(path: impl AsRef<Path>, data: &[T]) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let elem_size = size_of::<T>();
        let byte_len = HEADER_BYTES + data.len() * elem_size;
        let file = create_sized(&path, byte_len)?;
        {
            let mut mmap = unsafe { MmapMut::map_mut(&file) }
                .map_err(|source| EngineError::Mmap { path: path.clone(), source })?;
            let header = Header { magic: MAGIC, len: data.len() as u64 };
            mmap[..HEADER_BYTES].copy_from_slice(as_bytes(&header));
            if !data.is_empty() {
                let body = &mut mmap[HEADER_BYTES..];
                let src = unsafe {
                    std::slice::from_raw_parts(data.as_ptr() as *const u8, data.len() * elem_size)
                };
                body[..src.len()].copy_from_slice(src);
            }
            mmap.flush()
                .map_err(|source| EngineError::Mmap { path: path.clone(), source })?;
        }
        Self::open(&path)
    }

    /// Re-attach to a file written by a previous `write_new` call.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .map_err(|source| EngineError::Mmap { path: path.clone(), source })?;
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|source| EngineError::Mmap { path: path.clone(), source })?;
        let header: Header = unsafe { std::ptr::read_unaligned(mmap.as_ptr() as *const Header) };
        debug_assert_eq!(header.magic, MAGIC, "mmap file header magic mismatch");
        Ok(MappedVec {
            path,
            mmap,
            len: header.len as usize,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        if self.len == 0 {
            return &[];
        }
        let body = &self.mmap[HEADER_BYTES..];
        unsafe { std::slice::from_raw_parts(body.as_ptr() as *const T, self.len) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Copy> std::ops::Index<usize> for MappedVec<T> {
    type Output = T;
    fn index(&self, idx: usize) -> &T {
        &self.as_slice()[idx]
    }
}

fn create_sized(path: &Path, byte_len: usize) -> Result<File, EngineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|source| EngineError::Mmap { path: path.to_path_buf(), source })?;
        }
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|source| EngineError::Mmap { path: path.to_path_buf(), source })?;
    file.set_len(byte_len.max(HEADER_BYTES) as u64)
        .map_err(|source| EngineError::Mmap { path: path.to_path_buf(), source })?;
    Ok(file)
}

fn as_bytes<U: Copy>(v: &U) -> &[u8] {
    unsafe { std::slice::from_raw_parts(v as *const U as *const u8, size_of::<U>()) }
}

/// Builds the stable `<prefix>/<entity>` path convention named in §6.
pub fn entity_path(prefix: &Path, entity: &str) -> PathBuf {
    prefix.join(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = entity_path(dir.path(), "TestVector");
        let data: Vec<u32> = (0..1000).collect();
        let written = MappedVec::write_new(&path, &data).unwrap();
        assert_eq!(written.len(), 1000);
        assert_eq!(written.as_slice(), data.as_slice());

        let reopened = MappedVec::<u32>::open(&path).unwrap();
        assert_eq!(reopened.as_slice(), data.as_slice());
    }

    #[test]
    fn empty_vector_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = entity_path(dir.path(), "Empty");
        let written = MappedVec::<u64>::write_new(&path, &[]).unwrap();
        assert!(written.is_empty());
    }
}
