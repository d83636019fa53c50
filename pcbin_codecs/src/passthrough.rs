use pcbin_core::Codec;

/// Stores the metadata document uncompressed.
///
/// Useful for inspecting the JSON directly with a hex viewer, and for
/// tests that exercise the format independently of any codec.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
