mod common;
mod imports;

pub use common::{ParseResult, Parser, SpecifierKind};
pub use imports::ImportParser;
