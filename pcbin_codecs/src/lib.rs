mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use pcbin_core::Codec;

/// Names accepted by [`codec_by_name`].
pub const CODEC_NAMES: &[&str] = &["zstd", "lz4", "passthrough"];

/// Resolve a metadata codec from its CLI name.
///
/// The binfile does not record which codec compressed its metadata, so the
/// same name must be given when building and when reading a file.
pub fn codec_by_name(name: &str, zstd_level: i32) -> anyhow::Result<Box<dyn Codec>> {
    match name {
        "zstd" | "z" => Ok(Box::new(ZstdCodec::new(zstd_level))),
        "lz4" | "l" => Ok(Box::new(Lz4Codec)),
        "passthrough" | "pass" | "none" => Ok(Box::new(PassThroughCodec)),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: {}",
            other,
            CODEC_NAMES.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codecs_roundtrip_metadata() {
        let doc = br#"{"data_spec":{"byte_length":6,"fields":[]},"incodes":{"0":{"id":0,"code":"0AA"}}}"#.repeat(20);
        for name in CODEC_NAMES {
            let codec = codec_by_name(name, 3).unwrap();
            let packed = codec.compress(&doc).unwrap();
            assert_eq!(codec.decompress(&packed).unwrap(), doc, "{name} round-trip");
            if *name != "passthrough" {
                assert!(packed.len() < doc.len(), "{name} should shrink repetitive JSON");
            }
        }
    }

    #[test]
    fn test_unknown_codec() {
        let err = codec_by_name("bz2", 3).err().unwrap().to_string();
        assert!(err.contains("unknown codec 'bz2'"), "got: {err}");
    }
}
