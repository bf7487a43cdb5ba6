//! Hack assembly instruction model.
//!
//! Generators build these values and the driver renders them one per line
//! through `Display`.

use std::fmt;

/// Predefined Hack registers and RAM aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Sp,
    Lcl,
    Arg,
    This,
    That,
    /// `R0`..`R15`
    R(u8),
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Sp => write!(f, "SP"),
            Register::Lcl => write!(f, "LCL"),
            Register::Arg => write!(f, "ARG"),
            Register::This => write!(f, "THIS"),
            Register::That => write!(f, "THAT"),
            Register::R(n) => write!(f, "R{}", n),
        }
    }
}

/// Operand of an A-instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Const(u16),
    Reg(Register),
    Symbol(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Const(n) => write!(f, "{}", n),
            Target::Reg(reg) => write!(f, "{}", reg),
            Target::Symbol(sym) => f.write_str(sym),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jump {
    Jgt,
    Jeq,
    Jlt,
    Jne,
    Jmp,
}

impl fmt::Display for Jump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = match self {
            Jump::Jgt => "JGT",
            Jump::Jeq => "JEQ",
            Jump::Jlt => "JLT",
            Jump::Jne => "JNE",
            Jump::Jmp => "JMP",
        };
        f.write_str(mnemonic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Comment(String),
    /// Label pseudo-instruction, `(NAME)`.
    Label(String),
    /// `@target`
    At(Target),
    /// `dest=comp;jump`
    Compute {
        dest: Option<&'static str>,
        comp: &'static str,
        jump: Option<Jump>,
    },
}

impl Instruction {
    /// True for lines that occupy a ROM word.
    pub fn is_executable(&self) -> bool {
        matches!(self, Instruction::At(_) | Instruction::Compute { .. })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Comment(text) => write!(f, "// {}", text),
            Instruction::Label(name) => write!(f, "({})", name),
            Instruction::At(target) => write!(f, "@{}", target),
            Instruction::Compute { dest, comp, jump } => {
                if let Some(dest) = dest {
                    write!(f, "{}=", dest)?;
                }
                f.write_str(comp)?;
                if let Some(jump) = jump {
                    write!(f, ";{}", jump)?;
                }
                Ok(())
            }
        }
    }
}

pub fn at(value: u16) -> Instruction {
    Instruction::At(Target::Const(value))
}

pub fn at_reg(reg: Register) -> Instruction {
    Instruction::At(Target::Reg(reg))
}

pub fn at_sym(sym: impl Into<String>) -> Instruction {
    Instruction::At(Target::Symbol(sym.into()))
}

/// `dest=comp`
pub fn assign(dest: &'static str, comp: &'static str) -> Instruction {
    Instruction::Compute {
        dest: Some(dest),
        comp,
        jump: None,
    }
}

/// `comp;jump`
pub fn branch(comp: &'static str, jump: Jump) -> Instruction {
    Instruction::Compute {
        dest: None,
        comp,
        jump: Some(jump),
    }
}

pub fn label(name: impl Into<String>) -> Instruction {
    Instruction::Label(name.into())
}

pub fn comment(text: impl Into<String>) -> Instruction {
    Instruction::Comment(text.into())
}
