//! Lowers the stack-based VM intermediate language to Hack assembly.
//!
//! - `parser` turns source lines into [`Command`]s.
//! - `segment` maps memory segments onto Hack addressing.
//! - `translator` emits [`hack::Instruction`]s for each command, including
//!   the call/return frame protocol.
//! - `driver` handles files, output naming and the bootstrap.

pub mod ast;
pub mod driver;
pub mod error;
pub mod hack;
pub mod parser;
pub mod segment;
pub mod translator;

pub use ast::{ArithmeticOp, Command, CommandType, Segment};
pub use error::{Result, TranslateError};
pub use translator::{Translator, TranslatorOptions};

/// Translates a single source held in memory, without bootstrap.
pub fn translate_source(file_name: &str, source: &str) -> Result<String> {
    let instructions = Translator::new(file_name).translate_file(file_name, source)?;
    Ok(driver::render(&instructions))
}
