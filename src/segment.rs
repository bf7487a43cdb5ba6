//! Maps `(segment, index)` pairs onto Hack addressing.

use crate::ast::Segment;
use crate::error::{Result, TranslateError};
use crate::hack::{Register, Target};

/// RAM address of `temp 0`.
pub const TEMP_BASE: u16 = 5;
pub const TEMP_SLOTS: u16 = 8;
/// Largest value an A-instruction can load.
pub const MAX_CONSTANT: u16 = 0x7fff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Not memory at all: the index is the value.
    Constant(u16),
    /// A fixed RAM word: a static symbol, a temp slot, or THIS/THAT itself.
    Direct(Target),
    /// `RAM[base] + index`, one indirection through the segment base.
    Indirect { base: Register, index: u16 },
}

impl Location {
    /// `file` scopes static symbols to the source file being translated.
    pub fn resolve(segment: Segment, index: u16, file: &str) -> Result<Location> {
        let invalid = |reason| TranslateError::invalid_operand(segment, i64::from(index), reason);
        let location = match segment {
            Segment::Constant if index > MAX_CONSTANT => {
                return Err(invalid("constant exceeds 32767"));
            }
            Segment::Constant => Location::Constant(index),
            Segment::Static => Location::Direct(Target::Symbol(static_symbol(file, index))),
            Segment::Pointer => match index {
                0 => Location::Direct(Target::Reg(Register::This)),
                1 => Location::Direct(Target::Reg(Register::That)),
                _ => return Err(invalid("pointer index must be 0 or 1")),
            },
            Segment::Temp if index >= TEMP_SLOTS => {
                return Err(invalid("temp index must be in 0..=7"));
            }
            Segment::Temp => Location::Direct(Target::Reg(Register::R((TEMP_BASE + index) as u8))),
            Segment::Local | Segment::Argument | Segment::This | Segment::That
                if index > MAX_CONSTANT =>
            {
                return Err(invalid("index exceeds 32767"));
            }
            Segment::Local => Location::Indirect { base: Register::Lcl, index },
            Segment::Argument => Location::Indirect { base: Register::Arg, index },
            Segment::This => Location::Indirect { base: Register::This, index },
            Segment::That => Location::Indirect { base: Register::That, index },
        };
        Ok(location)
    }
}

/// The leading `$` keeps statics out of the VM label namespace.
pub fn static_symbol(file: &str, index: u16) -> String {
    format!("$STATIC:{}.{}", file, index)
}
