use jcarve_core::{BlockSource, CoreError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Carving source that maps the whole file and copies chunks out of the
/// mapping.
///
/// Only regular files with content can be mapped. [`crate::Reader`] falls
/// back to [`crate::DiskReader`] for empty files and device nodes.
pub struct MmapReader {
    mmap: Mmap,
}

impl MmapReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        if file.metadata()?.len() == 0 {
            return Err(CoreError::InvalidFormat(format!(
                "{} has no content to map",
                path.display()
            )));
        }

        // The source is opened read-only and is not expected to change
        // while it is scanned.
        let mmap =
            unsafe { Mmap::map(&file) }.map_err(|e| CoreError::Io(std::io::Error::other(e)))?;

        if mmap.is_empty() {
            return Err(CoreError::InvalidFormat(format!(
                "{} mapped to zero bytes",
                path.display()
            )));
        }

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
        }

        Ok(Self { mmap })
    }

    /// Bytes `[offset, offset + len)`, cut short at the end of the file.
    /// `None` once `offset` is past the end.
    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        let rest = self.mmap.get(start..).filter(|rest| !rest.is_empty())?;
        Some(&rest[..len.min(rest.len())])
    }
}

impl BlockSource for MmapReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let Some(bytes) = self.slice(offset, buffer.len()) else {
            return Ok(0);
        };
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image_file(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_slices_map_file_offsets() {
        let file = image_file(&[0x00, 0x00, 0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
        let reader = MmapReader::new(file.path()).unwrap();

        assert_eq!(reader.size(), 8);
        assert_eq!(reader.slice(2, 2).unwrap(), [0xFF, 0xD8]);
        assert_eq!(reader.slice(6, 64).unwrap(), [0x00, 0x10]);
        assert!(reader.slice(8, 1).is_none());
        assert!(reader.slice(u64::MAX, 1).is_none());
    }

    #[test]
    fn test_chunks_stop_at_end_of_file() {
        let file = image_file(&[0xAB; 5]);
        let mut reader = MmapReader::new(file.path()).unwrap();

        let mut buffer = [0u8; 8];
        assert_eq!(reader.read_chunk(3, &mut buffer).unwrap(), 2);
        assert_eq!(buffer[..2], [0xAB, 0xAB]);
        assert_eq!(reader.read_chunk(5, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_empty_file_is_not_mapped() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            MmapReader::new(file.path()),
            Err(CoreError::InvalidFormat(_))
        ));
    }
}
