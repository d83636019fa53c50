pub mod bits;
pub mod codec;
pub mod codes;
pub mod error;
pub mod format;
pub mod metadata;
pub mod outcodes;
pub mod reader;
pub mod record;
pub mod source;
pub mod spatial;
pub mod symbols;
pub mod writer;

pub use bits::BitContainer;
pub use codec::Codec;
pub use codes::{CodeEntry, CodeTable};
pub use error::{PcbinError, Result};
pub use format::{DataSpec, RecordLayout, RecordPtr, RECORD_SIZE};
pub use metadata::{Location, Metadata};
pub use outcodes::{OutcodeRange, OutcodeTable};
pub use reader::{PostcodeFile, ReaderOptions, Records};
pub use record::Postcode;
pub use source::{Domain, JsonDirSource, MemorySource, PostcodeRow, PostcodeSource, ReferenceTables};
pub use writer::{create_binfile, BuildOptions, BuildPlan, BuildSummary, Writer};
