pub mod command_parser;
pub mod common;
pub mod text_filter;

pub use command_parser::{ParsedCommand, parse_prefixed_command};
pub use common::{HandleError, MessageUtils, canonical_handle, canonical_handles};
pub use text_filter::{ArabicMode, TextNormalizer};
