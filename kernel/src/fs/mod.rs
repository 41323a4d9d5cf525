// Archive-backed boot file system.
//
// Read-only, built once from the first boot module's byte range. `archive`
// parses the on-disk format into a flat in-memory tree; `fd` layers the
// descriptor table with sequential-read cursors on top of it.

pub mod archive;
pub mod fd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The archive is a read-only medium; every write fails with this.
    ReadOnly,
    IsDirectory,
    BadDescriptor,
}
