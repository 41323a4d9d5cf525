// Open File Table
//
// Maps integer descriptors onto archive file nodes with a sequential-read
// cursor. Descriptors start above the three reserved standard-stream
// numbers and are monotonically increasing; a number is never reused within
// a boot session (there is no close; the archive outlives every reader).
//
// The table is an owned object like the frame allocator: constructed where
// it is needed and passed by reference, never a global.

use alloc::vec::Vec;

use super::archive::Vnode;
use super::FsError;

/// First descriptor handed out; 0..=2 stay reserved for standard streams.
pub const FIRST_DESCRIPTOR: u32 = 3;

pub const O_RDONLY: u32 = 0;

struct OpenFile<'a> {
    descriptor: u32,
    data: &'a [u8],
    offset: usize,
    #[allow(dead_code)]
    flags: u32,
}

pub struct OpenFileTable<'a> {
    next_descriptor: u32,
    entries: Vec<OpenFile<'a>>,
}

impl<'a> OpenFileTable<'a> {
    pub fn new() -> Self {
        OpenFileTable {
            next_descriptor: FIRST_DESCRIPTOR,
            entries: Vec::new(),
        }
    }

    /// Opens a file node with the cursor at zero. Directories cannot be
    /// opened for byte I/O.
    pub fn open(&mut self, node: &Vnode<'a>, flags: u32) -> Result<u32, FsError> {
        match node {
            Vnode::Directory { .. } => Err(FsError::IsDirectory),
            Vnode::File { data } => {
                let descriptor = self.next_descriptor;
                self.next_descriptor += 1;
                self.entries.push(OpenFile {
                    descriptor,
                    data: *data,
                    offset: 0,
                    flags,
                });
                Ok(descriptor)
            }
        }
    }

    /// Sequential read: copies up to `buf.len()` bytes from the cursor and
    /// advances it by exactly the bytes transferred. Zero at end of file.
    pub fn read(&mut self, descriptor: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let file = self.entry_mut(descriptor)?;

        if file.offset >= file.data.len() {
            return Ok(0);
        }

        let count = buf.len().min(file.data.len() - file.offset);
        buf[..count].copy_from_slice(&file.data[file.offset..file.offset + count]);
        file.offset += count;
        Ok(count)
    }

    /// The archive is a read-only medium.
    pub fn write(&mut self, descriptor: u32, _buf: &[u8]) -> Result<usize, FsError> {
        self.entry_mut(descriptor)?;
        Err(FsError::ReadOnly)
    }

    pub fn offset(&self, descriptor: u32) -> Option<usize> {
        self.entries
            .iter()
            .find(|file| file.descriptor == descriptor)
            .map(|file| file.offset)
    }

    fn entry_mut(&mut self, descriptor: u32) -> Result<&mut OpenFile<'a>, FsError> {
        self.entries
            .iter_mut()
            .find(|file| file.descriptor == descriptor)
            .ok_or(FsError::BadDescriptor)
    }
}

impl<'a> Default for OpenFileTable<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::archive::{tests::build_archive, Archive};

    #[test]
    fn descriptors_start_above_standard_streams_and_increase() {
        let bytes = build_archive(&[("a", b"1"), ("b", b"2")]);
        let archive = Archive::parse(&bytes);
        let mut files = OpenFileTable::new();

        let a = files.open(archive.root().lookup("a").unwrap(), O_RDONLY).unwrap();
        let b = files.open(archive.root().lookup("b").unwrap(), O_RDONLY).unwrap();
        let a_again = files.open(archive.root().lookup("a").unwrap(), O_RDONLY).unwrap();

        assert_eq!(a, FIRST_DESCRIPTOR);
        assert_eq!(b, FIRST_DESCRIPTOR + 1);
        assert_eq!(a_again, FIRST_DESCRIPTOR + 2);
    }

    #[test]
    fn sequential_reads_advance_the_cursor_by_bytes_transferred() {
        let bytes = build_archive(&[("data", b"abcdefgh")]);
        let archive = Archive::parse(&bytes);
        let mut files = OpenFileTable::new();
        let fd = files.open(archive.root().lookup("data").unwrap(), O_RDONLY).unwrap();

        let mut buf = [0u8; 3];
        assert_eq!(files.read(fd, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(files.offset(fd), Some(3));

        assert_eq!(files.read(fd, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"def");

        // Short final read, then end of file.
        assert_eq!(files.read(fd, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"gh");
        assert_eq!(files.offset(fd), Some(8));
        assert_eq!(files.read(fd, &mut buf).unwrap(), 0);
    }

    #[test]
    fn directories_cannot_be_opened() {
        let bytes = build_archive(&[("x", b"1")]);
        let archive = Archive::parse(&bytes);
        let mut files = OpenFileTable::new();

        assert_eq!(
            files.open(archive.root(), O_RDONLY),
            Err(FsError::IsDirectory)
        );
    }

    #[test]
    fn writes_fail_and_unknown_descriptors_are_rejected() {
        let bytes = build_archive(&[("x", b"1")]);
        let archive = Archive::parse(&bytes);
        let mut files = OpenFileTable::new();
        let fd = files.open(archive.root().lookup("x").unwrap(), O_RDONLY).unwrap();

        assert_eq!(files.write(fd, b"data"), Err(FsError::ReadOnly));
        assert_eq!(files.write(99, b"data"), Err(FsError::BadDescriptor));

        let mut buf = [0u8; 1];
        assert_eq!(files.read(99, &mut buf), Err(FsError::BadDescriptor));
    }
}
