//! Plain seek-and-read source for device nodes and anything that cannot be
//! memory mapped.

use jcarve_core::{BlockSource, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Carving source that reads each chunk with a seek and a read loop.
///
/// The size is taken by seeking to the end, which reports the real capacity
/// of block devices whose metadata length is zero.
///
/// ```ignore
/// use jcarve_core::{NoProgress, ScanOptions, Scanner};
/// use jcarve_io::{BufferedCopySink, DiskReader};
///
/// let mut source = DiskReader::new("/dev/sdb")?;
/// let mut sink = BufferedCopySink::new("jpeg-files")?;
/// let summary = Scanner::new(ScanOptions::default()).run(&mut source, &mut sink, &mut NoProgress)?;
/// ```
pub struct DiskReader {
    file: File,
    size: u64,
}

impl DiskReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
            let _ = fadvise(&file, 0, None, Advice::NoReuse);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self { file, size })
    }
}

impl BlockSource for DiskReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;

        // Devices may return short reads before the end.
        let mut filled = 0;
        while filled < buffer.len() {
            match self.file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
