pub mod lexer;
pub mod locate;
pub mod shrink;
pub mod xref;

pub use crate::lexer::{Item, ItemKind, Lexer};
pub use crate::shrink::{shrink_streams, ShrinkError, ShrinkOptions};
pub use crate::xref::{FixupParser, Subsection, XrefRow};
