use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use tracing::{debug, info};

use crate::codec::Codec;
use crate::error::{PcbinError, Result};
use crate::format::{decode_length_prefix, RecordPtr, LENGTH_PREFIX_SIZE};
use crate::metadata::{Metadata, MetadataDoc};
use crate::outcodes::OutcodeRange;
use crate::record::Postcode;
use crate::symbols::split_postcode;

/// Default number of recently read records kept by a reader.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Records kept in the position cache; 0 disables it.
    pub cache_capacity: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

fn truncated(what: &str) -> impl FnOnce(std::io::Error) -> PcbinError + '_ {
    move |e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            PcbinError::Malformed(format!("file ends inside the {what}"))
        } else {
            PcbinError::Io(e)
        }
    }
}

/// Random-access reader for postcode binfiles.
///
/// # Open sequence
/// 1. Read the 4-byte metadata length prefix.
/// 2. Read and decompress exactly that many bytes, and parse the metadata
///    document (record layout, outcode ranges, code tables, locations).
/// 3. Records start right after the blob; their count is the remaining file
///    length divided by the record size, and must match the outcode ranges.
///
/// # Access pattern
/// Every record read is one seek plus one fixed-size read. Recently read
/// records are kept in a bounded cache because exact-match probes revisit
/// nearby slots.
///
/// Seek-then-read is not atomic: a reader serves one caller at a time.
pub struct PostcodeFile {
    file: Option<File>,
    metadata: Arc<Metadata>,
    record_start: u64,
    record_count: u64,
    cache: Option<LruCache<u64, RecordPtr>>,
}

impl PostcodeFile {
    /// Open a binfile written with `codec`, using default options.
    pub fn open(path: impl AsRef<Path>, codec: Arc<dyn Codec>) -> Result<Self> {
        Self::open_with(path, codec, &ReaderOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, codec: Arc<dyn Codec>, options: &ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        // ── Metadata ────────────────────────────────────────────────────────
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE as usize];
        file.read_exact(&mut prefix).map_err(truncated("metadata length prefix"))?;
        let blob_len = decode_length_prefix(prefix) as u64;

        let mut blob = vec![0u8; blob_len as usize];
        file.read_exact(&mut blob).map_err(truncated("metadata blob"))?;
        let metadata = Metadata::from_document(MetadataDoc::decode(&blob, codec.as_ref())?)?;

        // ── Record span ─────────────────────────────────────────────────────
        let record_start = LENGTH_PREFIX_SIZE + blob_len;
        let file_len = file.metadata()?.len();
        let record_bytes = file_len - record_start;
        let record_size = metadata.layout.byte_length() as u64;
        if record_bytes % record_size != 0 {
            return Err(PcbinError::Malformed(format!(
                "{record_bytes} record bytes is not a multiple of the {record_size} byte record size"
            )));
        }
        let record_count = record_bytes / record_size;
        if record_count != metadata.outcodes.total() {
            return Err(PcbinError::Malformed(format!(
                "outcode ranges cover {} records but the file holds {record_count}",
                metadata.outcodes.total()
            )));
        }

        info!(
            path = %path.display(),
            records = record_count,
            outcodes = metadata.outcodes.len(),
            incodes = metadata.incodes.len(),
            "opened postcode binfile"
        );

        Ok(Self {
            file: Some(file),
            metadata: Arc::new(metadata),
            record_start,
            record_count,
            cache: NonZeroUsize::new(options.cache_capacity).map(LruCache::new),
        })
    }

    /// Number of records in the file.
    #[inline]
    pub fn len(&self) -> u64 {
        self.record_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Byte offset of record 0.
    pub fn record_start(&self) -> u64 {
        self.record_start
    }

    /// Release the file handle. Every later read fails with
    /// [`PcbinError::Closed`].
    pub fn close(&mut self) {
        self.file = None;
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    pub fn outcode(&self, code: &str) -> Option<&OutcodeRange> {
        self.metadata.outcodes.get(code)
    }

    pub fn outcode_for_position(&self, pos: u64) -> Option<&OutcodeRange> {
        self.metadata.outcodes.find(pos)
    }

    fn read_ptr(&mut self, pos: u64) -> Result<RecordPtr> {
        let file = self.file.as_mut().ok_or(PcbinError::Closed)?;
        if pos >= self.record_count {
            return Err(PcbinError::NotFound(format!(
                "record {pos} is past the last record ({})",
                self.record_count
            )));
        }
        if let Some(ptr) = self.cache.as_mut().and_then(|c| c.get(&pos)) {
            debug!(pos, "cache hit");
            return Ok(*ptr);
        }

        let layout = &self.metadata.layout;
        let mut buf = vec![0u8; layout.byte_length()];
        file.seek(SeekFrom::Start(self.record_start + pos * buf.len() as u64))?;
        file.read_exact(&mut buf).map_err(truncated("record span"))?;
        let ptr = layout.unpack(&buf)?;

        if let Some(cache) = self.cache.as_mut() {
            cache.put(pos, ptr);
        }
        Ok(ptr)
    }

    /// The record in slot `pos` (0-based, in records rather than bytes).
    pub fn read_postcode(&mut self, pos: u64) -> Result<Postcode> {
        let ptr = self.read_ptr(pos)?;
        Ok(Postcode::new(Arc::clone(&self.metadata), pos, ptr))
    }

    /// All records in on-disk order. Each call starts from record 0.
    pub fn iter(&mut self) -> Records<'_> {
        let end = self.record_count;
        Records {
            file: self,
            next: 0,
            end,
        }
    }

    /// The records of one outcode.
    pub fn iter_outcode(&mut self, code: &str) -> Result<Records<'_>> {
        let range = self
            .outcode(code)
            .ok_or_else(|| PcbinError::NotFound(format!("outcode {code}")))?;
        let (next, end) = (range.start, range.end + 1);
        Ok(Records { file: self, next, end })
    }

    /// Exact-match lookup of `"OUTCODE INCODE"`.
    pub fn exact(&mut self, postcode: &str) -> Result<Postcode> {
        let (outcode, incode) = split_postcode(postcode)?;
        self.find(outcode, incode)
    }

    /// Interpolation search for `incode` within the span of `outcode`.
    ///
    /// Records of an outcode are sorted by incode id, and ids are distinct
    /// within an outcode, so the id difference between target and probe
    /// bounds the slot distance. Each probe removes the probed slot from the
    /// window. When the offset jump would leave the window, or the previous
    /// jump failed to halve it, the next probe bisects instead.
    pub fn find(&mut self, outcode: &str, incode: &str) -> Result<Postcode> {
        let not_found = || PcbinError::NotFound(format!("postcode {outcode} {incode}"));

        let target = self.metadata.incodes.get_id(incode).ok_or_else(not_found)?;
        let total = self.metadata.incodes.len() as u64;
        let range = self.outcode(outcode).ok_or_else(not_found)?;
        let (mut lo, mut hi) = (range.start, range.end);

        // Incode ids are globally sorted, so the id's rank approximates its
        // place within this outcode.
        let mut pos = lo + (hi - lo) * target as u64 / total;
        let mut interpolated = true;
        let mut probes = 0u32;

        loop {
            probes += 1;
            let found = self.read_ptr(pos)?.incode_key;
            debug!(outcode, incode, pos, lo, hi, target, found, "probe");

            let window = hi - lo + 1;
            if found == target {
                debug!(outcode, incode, probes, "found");
                return self.read_postcode(pos);
            } else if found > target {
                if pos == lo {
                    break;
                }
                hi = pos - 1;
            } else {
                if pos == hi {
                    break;
                }
                lo = pos + 1;
            }

            let halved = (hi - lo + 1) * 2 <= window;
            let jump = pos as i64 + (target as i64 - found as i64);
            let bisect = (interpolated && !halved) || jump < lo as i64 || jump > hi as i64;
            pos = if bisect { lo + (hi - lo) / 2 } else { jump as u64 };
            interpolated = !bisect;
        }

        debug!(outcode, incode, probes, "not found");
        Err(not_found())
    }
}

/// Sequential record iterator; see [`PostcodeFile::iter`].
pub struct Records<'a> {
    file: &'a mut PostcodeFile,
    next: u64,
    end: u64,
}

impl Iterator for Records<'_> {
    type Item = Result<Postcode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let pos = self.next;
        self.next += 1;
        Some(self.file.read_postcode(pos))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.end - self.next) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Records<'_> {}
