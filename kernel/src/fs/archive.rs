// Boot Archive Parser
//
// Parses the header-prefixed archive format the boot loader hands over as a
// module: a sequence of fixed 110-byte ASCII-hex headers, each followed by a
// NUL-terminated entry name (padded to a 4-byte boundary) and the entry's
// raw bytes (also padded to 4 bytes), terminated by an entry named with the
// `TRAILER!!!` sentinel.
//
// Header layout after the 6-byte `070701` magic: thirteen 8-hex-digit
// fields (inode, mode, uid, gid, link count, mtime, file size, device
// major/minor, rdevice major/minor, name size, checksum). Only mode, file
// size, and name size are consulted.
//
// Parsing is deliberately lenient: a short header, bad magic, zero name
// length, undecodable hex, or truncated data stops the parse early with
// every previously registered entry intact. Malformed input is never an
// error to the caller.
//
// Only entries whose mode's file-type field is "regular" are registered, and
// every registered file becomes a direct child of the flat archive root:
// path separators embedded in recorded names are kept verbatim, not split
// into nested directories. That flattening mirrors the entries the boot
// image actually contains today; real subdirectory support would need the
// names re-split and threaded through nested directory nodes.
//
// Node data borrows straight from the module's byte range (no copy); the
// module region is loader-owned and never unmapped, so the borrow is good
// for the kernel's entire run.

use alloc::vec::Vec;

use super::FsError;
use crate::log_debug;

const LOG_ORIGIN: &str = "archive";

const HEADER_LEN: usize = 110;
const MAGIC: &[u8; 6] = b"070701";
const TRAILER: &str = "TRAILER!!!";

const FIELD_MODE: usize = 1;
const FIELD_FILESIZE: usize = 6;
const FIELD_NAMESIZE: usize = 11;

/// File-type field of the mode (the high octal digits). Symlinks
/// (0o120000) and sockets (0o140000) carry the regular-file bit, so the
/// whole field is compared, not the bit alone.
const MODE_TYPE_MASK: u32 = 0o170000;
/// Type value of a regular file.
const MODE_REGULAR_FILE: u32 = 0o100000;

/// One node of the parsed tree. The set is closed: a single `match` in each
/// operation covers every case.
pub enum Vnode<'a> {
    File { data: &'a [u8] },
    Directory { children: Vec<(&'a str, Vnode<'a>)> },
}

impl<'a> Vnode<'a> {
    pub fn is_file(&self) -> bool {
        matches!(self, Vnode::File { .. })
    }

    /// File byte length, or the number of direct children for a directory.
    pub fn size(&self) -> usize {
        match self {
            Vnode::File { data } => data.len(),
            Vnode::Directory { children } => children.len(),
        }
    }

    /// Exact, case-sensitive match over direct children only. Files have
    /// no children.
    pub fn lookup(&self, name: &str) -> Option<&Vnode<'a>> {
        match self {
            Vnode::File { .. } => None,
            Vnode::Directory { children } => children
                .iter()
                .find(|(child_name, _)| *child_name == name)
                .map(|(_, child)| child),
        }
    }

    /// Copies `min(buf.len(), size - offset)` bytes starting at `offset`
    /// into `buf` and returns the count; zero once `offset >= size`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        match self {
            Vnode::Directory { .. } => Err(FsError::IsDirectory),
            Vnode::File { data } => {
                if offset >= data.len() {
                    return Ok(0);
                }

                let count = buf.len().min(data.len() - offset);
                buf[..count].copy_from_slice(&data[offset..offset + count]);
                Ok(count)
            }
        }
    }

    pub fn write(&self, _offset: usize, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::ReadOnly)
    }
}

pub struct Archive<'a> {
    root: Vnode<'a>,
}

impl<'a> Archive<'a> {
    /// Parses the whole byte range up front. Infallible by design; see the
    /// module comment for the lenient early-stop rules.
    pub fn parse(data: &'a [u8]) -> Self {
        let mut children: Vec<(&'a str, Vnode<'a>)> = Vec::new();
        let mut pos = 0usize;

        loop {
            if pos + HEADER_LEN > data.len() {
                break;
            }

            let header = &data[pos..pos + HEADER_LEN];
            if &header[..MAGIC.len()] != MAGIC {
                break;
            }

            let (mode, filesize, namesize) = match (
                hex_field(header, FIELD_MODE),
                hex_field(header, FIELD_FILESIZE),
                hex_field(header, FIELD_NAMESIZE),
            ) {
                (Some(m), Some(f), Some(n)) => (m, f as usize, n as usize),
                _ => break,
            };

            if namesize == 0 {
                break;
            }

            let name_start = pos + HEADER_LEN;
            let name_end = match name_start.checked_add(namesize) {
                Some(end) if end <= data.len() => end,
                _ => break,
            };

            // The recorded name size includes the trailing NUL.
            let name = match core::str::from_utf8(&data[name_start..name_end - 1]) {
                Ok(name) => name,
                Err(_) => break,
            };

            if name == TRAILER {
                break;
            }

            let data_start = pos + align4(HEADER_LEN + namesize);
            let data_end = match data_start.checked_add(filesize) {
                Some(end) if end <= data.len() => end,
                _ => break,
            };

            if mode & MODE_TYPE_MASK == MODE_REGULAR_FILE {
                children.push((
                    name,
                    Vnode::File {
                        data: &data[data_start..data_end],
                    },
                ));
            } else {
                log_debug!(LOG_ORIGIN, "Skipping non-regular entry '{}'", name);
            }

            pos = data_start + align4(filesize);
        }

        log_debug!(LOG_ORIGIN, "Parsed {} file entries", children.len());

        Archive {
            root: Vnode::Directory { children },
        }
    }

    pub fn root(&self) -> &Vnode<'a> {
        &self.root
    }
}

/// Decodes the `index`-th 8-digit ASCII-hex field following the magic.
fn hex_field(header: &[u8], index: usize) -> Option<u32> {
    let start = MAGIC.len() + index * 8;
    let mut value: u32 = 0;

    for &byte in &header[start..start + 8] {
        let digit = (byte as char).to_digit(16)?;
        value = value.checked_mul(16)?.checked_add(digit)?;
    }

    Some(value)
}

const fn align4(value: usize) -> usize {
    (value + 3) & !3
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Appends one archive entry in the on-disk format.
    pub(crate) fn push_entry(out: &mut Vec<u8>, name: &str, data: &[u8], mode: u32) {
        out.extend_from_slice(MAGIC);
        let fields = [
            1,                  // inode
            mode,
            0,                  // uid
            0,                  // gid
            1,                  // link count
            0,                  // mtime
            data.len() as u32,  // file size
            0, 0, 0, 0,         // device / rdevice major and minor
            (name.len() + 1) as u32, // name size incl. NUL
            0,                  // checksum (unused by the format)
        ];
        for field in fields {
            out.extend_from_slice(format!("{:08X}", field).as_bytes());
        }

        out.extend_from_slice(name.as_bytes());
        out.push(0);
        while (out.len() % 4) != 0 {
            out.push(0);
        }

        out.extend_from_slice(data);
        while (out.len() % 4) != 0 {
            out.push(0);
        }
    }

    pub(crate) fn push_trailer(out: &mut Vec<u8>) {
        push_entry(out, TRAILER, &[], 0);
    }

    pub(crate) fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, data) in entries {
            push_entry(&mut out, name, data, MODE_REGULAR_FILE);
        }
        push_trailer(&mut out);
        out
    }

    #[test]
    fn single_file_parses_and_reads() {
        let bytes = build_archive(&[("hello", b"hi")]);
        let archive = Archive::parse(&bytes);

        let node = archive.root().lookup("hello").unwrap();
        assert!(node.is_file());
        assert_eq!(node.size(), 2);

        let mut buf = [0u8; 2];
        assert_eq!(node.read(0, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");

        let mut past = [0u8; 10];
        assert_eq!(node.read(2, &mut past).unwrap(), 0);
    }

    #[test]
    fn partial_and_offset_reads() {
        let bytes = build_archive(&[("data", b"abcdef")]);
        let archive = Archive::parse(&bytes);
        let node = archive.root().lookup("data").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(node.read(2, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"cdef");

        let mut small = [0u8; 3];
        assert_eq!(node.read(0, &mut small).unwrap(), 3);
        assert_eq!(&small, b"abc");
    }

    #[test]
    fn invalid_magic_yields_empty_root() {
        let mut bytes = build_archive(&[("hello", b"hi")]);
        bytes[0] = b'X';

        let archive = Archive::parse(&bytes);
        assert_eq!(archive.root().size(), 0);
        assert!(archive.root().lookup("hello").is_none());
    }

    #[test]
    fn parse_stops_at_first_bad_header_keeping_prior_entries() {
        let mut bytes = Vec::new();
        push_entry(&mut bytes, "good", b"1234", MODE_REGULAR_FILE);
        bytes.extend_from_slice(b"garbage that is not a header");

        let archive = Archive::parse(&bytes);
        assert_eq!(archive.root().size(), 1);
        assert!(archive.root().lookup("good").is_some());
    }

    #[test]
    fn truncated_data_drops_the_entry() {
        let mut bytes = Vec::new();
        push_entry(&mut bytes, "cut", b"full content here", MODE_REGULAR_FILE);
        bytes.truncate(bytes.len() - 8);

        let archive = Archive::parse(&bytes);
        assert!(archive.root().lookup("cut").is_none());
    }

    #[test]
    fn non_regular_entries_are_dropped() {
        let mut bytes = Vec::new();
        push_entry(&mut bytes, "somedir", &[], 0o040755);
        push_entry(&mut bytes, "file", b"x", MODE_REGULAR_FILE | 0o644);
        push_trailer(&mut bytes);

        let archive = Archive::parse(&bytes);
        assert_eq!(archive.root().size(), 1);
        assert!(archive.root().lookup("somedir").is_none());
        assert!(archive.root().lookup("file").is_some());
    }

    #[test]
    fn symlink_and_socket_modes_are_not_regular_files() {
        // Both type values carry the 0o100000 bit; neither may register.
        let mut bytes = Vec::new();
        push_entry(&mut bytes, "link", b"target", 0o120777);
        push_entry(&mut bytes, "sock", &[], 0o140755);
        push_entry(&mut bytes, "plain", b"x", 0o100644);
        push_trailer(&mut bytes);

        let archive = Archive::parse(&bytes);
        assert_eq!(archive.root().size(), 1);
        assert!(archive.root().lookup("link").is_none());
        assert!(archive.root().lookup("sock").is_none());
        assert!(archive.root().lookup("plain").is_some());
    }

    #[test]
    fn names_with_separators_stay_flat() {
        let bytes = build_archive(&[("bin/init", b"elf?"), ("init", b"real")]);
        let archive = Archive::parse(&bytes);

        assert_eq!(archive.root().size(), 2);
        assert!(archive.root().lookup("bin/init").is_some());
        assert!(archive.root().lookup("bin").is_none());

        let mut buf = [0u8; 4];
        let node = archive.root().lookup("init").unwrap();
        node.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"real");
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let bytes = build_archive(&[("Init", b"x")]);
        let archive = Archive::parse(&bytes);
        assert!(archive.root().lookup("init").is_none());
        assert!(archive.root().lookup("Init").is_some());
    }

    #[test]
    fn writes_always_fail() {
        let bytes = build_archive(&[("hello", b"hi")]);
        let archive = Archive::parse(&bytes);
        let node = archive.root().lookup("hello").unwrap();

        assert_eq!(node.write(0, b"nope"), Err(FsError::ReadOnly));
    }

    #[test]
    fn empty_input_parses_to_empty_root() {
        let archive = Archive::parse(&[]);
        assert_eq!(archive.root().size(), 0);
    }
}
