/// Compression applied to the metadata document.
///
/// The file carries no codec marker, so a file must be opened with the
/// codec it was written with. Records are never compressed; only the
/// metadata blob passes through the codec, once on build and once on open.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    fn decompress(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>>;
}
