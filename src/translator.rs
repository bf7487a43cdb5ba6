use std::collections::{BTreeSet, HashMap};

use log::trace;

use crate::ast::{ArithmeticOp, Command, Segment};
use crate::error::{Result, TranslateError};
use crate::hack::{
    assign, at, at_reg, at_sym, branch, comment, label, Instruction, Jump, Register, Target,
};
use crate::parser::Parser;
use crate::segment::{Location, MAX_CONSTANT};

/// Address the stack pointer is seeded with by the bootstrap.
pub const STACK_BASE: u16 = 256;
/// Function the bootstrap calls.
pub const ENTRY_POINT: &str = "Sys.init";

/// Words saved below the callee's LCL: return address, LCL, ARG, THIS, THAT.
const FRAME_SIZE: u16 = 5;
const SAVED_BASES: [Register; 4] = [Register::Lcl, Register::Arg, Register::This, Register::That];

// Scratch words. Only live within a single command's block.
const POP_ADDRESS: Register = Register::R(13);
const FRAME: Register = Register::R(13);
const RETURN_ADDRESS: Register = Register::R(14);

/// D -> stack
fn push_d() -> [Instruction; 4] {
    [
        at_reg(Register::Sp),
        assign("M", "M+1"),
        assign("A", "M-1"), // Don't need to refetch SP; this is safe
        assign("M", "D"),
    ]
}

/// stack -> D
fn pop_d() -> [Instruction; 3] {
    [
        at_reg(Register::Sp),
        assign("AM", "M-1"), // SP--, A <- new SP (val to be popped)
        assign("D", "M"),
    ]
}

fn simple_un_op(comp: &'static str) -> Vec<Instruction> {
    vec![at_reg(Register::Sp), assign("A", "M-1"), assign("M", comp)]
}

// i.e. no conditions or jumps, just pop and run
fn simple_bin_op(comp: &'static str) -> Vec<Instruction> {
    vec![
        at_reg(Register::Sp),
        assign("AM", "M-1"), // SP--, looking at top of stack now
        assign("D", "M"),    // Right arg in D
        assign("A", "A-1"),  // Looking at second arg of stack, will overwrite
        assign("M", comp),
    ]
}

/// Per-run translation options.
#[derive(Debug, Clone, Copy)]
pub struct TranslatorOptions {
    /// Echo each source command as a comment above its block.
    pub comments: bool,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        TranslatorOptions { comments: true }
    }
}

/// Lowers VM commands to Hack assembly.
///
/// One instance serves a whole translation unit: the comparison label
/// counter, the per-callee return-address counters and the set of static
/// symbols all live here and are never reset between files.
pub struct Translator {
    file_name: String,
    options: TranslatorOptions,
    gen_sym: usize,
    call_sites: HashMap<String, usize>,
    statics: BTreeSet<String>,
}

impl Translator {
    pub fn new(file_name: &str) -> Self {
        Translator::with_options(file_name, TranslatorOptions::default())
    }

    pub fn with_options(file_name: &str, options: TranslatorOptions) -> Self {
        Translator {
            file_name: file_name.to_string(),
            options,
            gen_sym: 0,
            call_sites: HashMap::new(),
            statics: BTreeSet::new(),
        }
    }

    /// Switches the scope used for `static` symbols to a new source file.
    pub fn set_file_name(&mut self, file_name: &str) {
        self.file_name = file_name.to_string();
    }

    /// Every static symbol referenced so far, across all files.
    pub fn static_symbols(&self) -> impl Iterator<Item = &str> {
        self.statics.iter().map(String::as_str)
    }

    fn next_gen_sym(&mut self) -> usize {
        let tmp = self.gen_sym;
        self.gen_sym += 1;
        tmp
    }

    fn next_return_label(&mut self, callee: &str) -> String {
        let count = self.call_sites.entry(callee.to_string()).or_insert(0);
        let label = format!("$RET:{}.{}", callee, count);
        *count += 1;
        label
    }

    fn locate(&mut self, location: Location) -> Location {
        if let Location::Direct(Target::Symbol(sym)) = &location {
            self.statics.insert(sym.clone());
        }
        location
    }

    fn push(&mut self, segment: Segment, index: u16) -> Result<Vec<Instruction>> {
        let location = Location::resolve(segment, index, &self.file_name)?;
        let mut out = match self.locate(location) {
            Location::Constant(value) => vec![at(value), assign("D", "A")],
            Location::Direct(target) => vec![Instruction::At(target), assign("D", "M")],
            Location::Indirect { base, index } => vec![
                at_reg(base),
                assign("D", "M"),
                at(index),
                assign("A", "D+A"), // A = SEG+arg
                assign("D", "M"),   // D = value to push
            ],
        };
        out.extend(push_d());
        Ok(out)
    }

    fn pop(&mut self, segment: Segment, index: u16) -> Result<Vec<Instruction>> {
        let location = Location::resolve(segment, index, &self.file_name)?;
        let out = match self.locate(location) {
            Location::Constant(_) => {
                return Err(TranslateError::invalid_operand(
                    segment,
                    i64::from(index),
                    "cannot pop into the constant segment",
                ));
            }
            Location::Direct(target) => {
                let mut out = pop_d().to_vec();
                out.extend([Instruction::At(target), assign("M", "D")]);
                out
            }
            Location::Indirect { base, index } => {
                let mut out = vec![
                    at_reg(base),
                    assign("D", "M"),
                    at(index),
                    assign("D", "D+A"), // D = SEG+arg
                    at_reg(POP_ADDRESS),
                    assign("M", "D"),
                ];
                out.extend(pop_d());
                out.extend([
                    at_reg(POP_ADDRESS),
                    assign("A", "M"), // At the segment slot...
                    assign("M", "D"), // ... store the popped val
                ]);
                out
            }
        };
        Ok(out)
    }

    fn compare(&mut self, jump: Jump) -> Vec<Instruction> {
        let sym = self.next_gen_sym();
        let cmp_sym = format!("$CMP.{}", sym);
        let end_sym = format!("$CMP_END.{}", sym);
        vec![
            at_reg(Register::Sp),
            assign("AM", "M-1"), // SP--, looking at top of stack now
            assign("D", "M"),    // Right arg in D
            assign("A", "A-1"),  // Looking at second arg of stack, will overwrite
            assign("D", "M-D"),
            at_sym(cmp_sym.clone()),
            branch("D", jump),
            assign("D", "0"),
            at_sym(end_sym.clone()),
            branch("0", Jump::Jmp),
            label(cmp_sym),
            assign("D", "-1"),
            label(end_sym),
            at_reg(Register::Sp),
            assign("A", "M-1"),
            assign("M", "D"),
        ]
    }

    fn arithmetic(&mut self, op: ArithmeticOp) -> Vec<Instruction> {
        let out = match op {
            ArithmeticOp::Not => simple_un_op("!M"),
            ArithmeticOp::Neg => simple_un_op("-M"),
            ArithmeticOp::Add => simple_bin_op("D+M"),
            ArithmeticOp::Sub => simple_bin_op("M-D"),
            ArithmeticOp::And => simple_bin_op("D&M"),
            ArithmeticOp::Or => simple_bin_op("D|M"),
            ArithmeticOp::Eq => return self.compare(Jump::Jeq),
            ArithmeticOp::Gt => return self.compare(Jump::Jgt),
            ArithmeticOp::Lt => return self.compare(Jump::Jlt),
        };
        // every arithmetic command consumes one allocator value
        self.next_gen_sym();
        out
    }

    fn label(&self, name: &str) -> Vec<Instruction> {
        vec![label(name)]
    }

    fn goto(&self, name: &str) -> Vec<Instruction> {
        vec![at_sym(name), branch("0", Jump::Jmp)]
    }

    fn if_goto(&self, name: &str) -> Vec<Instruction> {
        let mut out = pop_d().to_vec();
        out.extend([at_sym(name), branch("D", Jump::Jne)]); // False is 0
        out
    }

    fn function(&self, name: &str, locals: u16) -> Vec<Instruction> {
        let mut out = vec![
            label(name),
            at_reg(Register::Sp),
            assign("D", "M"),
            at_reg(Register::Lcl),
            assign("M", "D"),
        ];
        for _ in 0..locals {
            out.extend([
                at_reg(Register::Sp),
                assign("M", "M+1"),
                assign("A", "M-1"),
                assign("M", "0"),
            ]);
        }
        out
    }

    fn call(&mut self, name: &str, args: u16) -> Result<Vec<Instruction>> {
        let rewind = args
            .checked_add(FRAME_SIZE)
            .filter(|n| *n <= MAX_CONSTANT)
            .ok_or_else(|| TranslateError::invalid_count("call", name, args, "too many arguments"))?;
        Ok(self.call_frame(name, rewind))
    }

    /// `rewind` is `nArgs + 5`, the distance from SP back to the new ARG.
    fn call_frame(&mut self, name: &str, rewind: u16) -> Vec<Instruction> {
        let return_label = self.next_return_label(name);

        let mut out = vec![at_sym(return_label.clone()), assign("D", "A")];
        out.extend(push_d());
        for base in SAVED_BASES {
            out.extend([at_reg(base), assign("D", "M")]);
            out.extend(push_d());
        }
        out.extend([
            // ARG = SP - 5 - nArgs
            at_reg(Register::Sp),
            assign("D", "M"),
            at(rewind),
            assign("D", "D-A"),
            at_reg(Register::Arg),
            assign("M", "D"),
            // LCL = SP
            at_reg(Register::Sp),
            assign("D", "M"),
            at_reg(Register::Lcl),
            assign("M", "D"),
            at_sym(name),
            branch("0", Jump::Jmp),
            label(return_label),
        ]);
        out
    }

    fn ret(&self) -> Vec<Instruction> {
        let mut out = vec![
            // FRAME = LCL
            at_reg(Register::Lcl),
            assign("D", "M"),
            at_reg(FRAME),
            assign("M", "D"),
            // RET = *(FRAME - 5), saved before the return value can overwrite it
            at(FRAME_SIZE),
            assign("A", "D-A"),
            assign("D", "M"),
            at_reg(RETURN_ADDRESS),
            assign("M", "D"),
            // *ARG = pop()
            at_reg(Register::Sp),
            assign("A", "M-1"),
            assign("D", "M"),
            at_reg(Register::Arg),
            assign("A", "M"),
            assign("M", "D"),
            // SP = ARG + 1
            assign("D", "A+1"),
            at_reg(Register::Sp),
            assign("M", "D"),
        ];
        for base in SAVED_BASES.iter().rev() {
            out.extend([
                at_reg(FRAME),
                assign("AM", "M-1"),
                assign("D", "M"),
                at_reg(*base),
                assign("M", "D"),
            ]);
        }
        out.extend([at_reg(RETURN_ADDRESS), assign("A", "M"), branch("0", Jump::Jmp)]);
        out
    }

    /// Seeds SP and calls the entry point. Emitted once, ahead of every file.
    pub fn bootstrap(&mut self) -> Vec<Instruction> {
        let mut out = vec![];
        if self.options.comments {
            out.push(comment("bootstrap"));
        }
        out.extend([at(STACK_BASE), assign("D", "A"), at_reg(Register::Sp), assign("M", "D")]);
        let entry = Command::Call(ENTRY_POINT.to_string(), 0);
        if self.options.comments {
            out.push(comment(entry.to_string()));
        }
        out.extend(self.call_frame(ENTRY_POINT, FRAME_SIZE));
        out
    }

    pub fn translate_command(&mut self, command: &Command) -> Result<Vec<Instruction>> {
        trace!("{}: {}", self.file_name, command);
        let translated = match command {
            Command::Arithmetic(op) => self.arithmetic(*op),
            Command::Push(seg, idx) => self.push(*seg, *idx)?,
            Command::Pop(seg, idx) => self.pop(*seg, *idx)?,
            Command::Label(sym) => self.label(sym),
            Command::Goto(sym) => self.goto(sym),
            Command::IfGoto(sym) => self.if_goto(sym),
            Command::Function(name, locals) => self.function(name, *locals),
            Command::Call(name, args) => self.call(name, *args)?,
            Command::Return => self.ret(),
        };

        if !self.options.comments {
            return Ok(translated);
        }
        let mut instructions = Vec::with_capacity(translated.len() + 1);
        instructions.push(comment(command.to_string()));
        instructions.extend(translated);
        Ok(instructions)
    }

    pub fn translate(&mut self, commands: &[Command]) -> Result<Vec<Instruction>> {
        let mut instructions: Vec<Instruction> = vec![];

        for command in commands {
            instructions.extend(self.translate_command(command)?);
        }

        Ok(instructions)
    }

    /// Parses and translates one source file, scoping statics to `file_name`.
    pub fn translate_file(&mut self, file_name: &str, source: &str) -> Result<Vec<Instruction>> {
        self.set_file_name(file_name);
        let mut parser = Parser::new(file_name, source);
        let mut instructions = vec![];

        while parser.advance() {
            let command = parser.command()?;
            let translated = self
                .translate_command(&command)
                .map_err(|e| e.at_line(file_name, parser.line()))?;
            instructions.extend(translated);
        }

        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn render(instructions: &[Instruction]) -> Vec<String> {
        instructions.iter().map(ToString::to_string).collect()
    }

    fn labels(instructions: &[Instruction]) -> Vec<String> {
        instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Label(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn translate(source: &str) -> Vec<Instruction> {
        let commands = parse("Test", source).unwrap();
        Translator::new("Test").translate(&commands).unwrap()
    }

    #[test]
    fn push_constant_listing() {
        assert_eq!(
            render(&translate("push constant 7")),
            ["// push constant 7", "@7", "D=A", "@SP", "M=M+1", "A=M-1", "M=D"]
        );
    }

    #[test]
    fn pop_local_goes_through_scratch_register() {
        assert_eq!(
            render(&translate("pop local 2")),
            [
                "// pop local 2",
                "@LCL",
                "D=M",
                "@2",
                "D=D+A",
                "@R13",
                "M=D",
                "@SP",
                "AM=M-1",
                "D=M",
                "@R13",
                "A=M",
                "M=D",
            ]
        );
    }

    #[test]
    fn comparisons_get_disjoint_labels() {
        let out = translate("eq\neq");
        let found = labels(&out);
        assert_eq!(found, ["$CMP.0", "$CMP_END.0", "$CMP.1", "$CMP_END.1"]);
    }

    #[test]
    fn every_arithmetic_command_advances_the_allocator() {
        let out = translate("add\nnot\ngt");
        assert_eq!(labels(&out), ["$CMP.2", "$CMP_END.2"]);
    }

    #[test]
    fn return_labels_count_per_callee() {
        let out = translate("call Foo 2\ncall Bar 0\ncall Foo 2");
        assert_eq!(labels(&out), ["$RET:Foo.0", "$RET:Bar.0", "$RET:Foo.1"]);
    }

    #[test]
    fn call_rewinds_arg_past_frame_and_arguments() {
        let rendered = render(&translate("call Foo 2"));
        let rewind = rendered.iter().position(|l| l == "@7").expect("ARG rewind");
        assert_eq!(rendered[rewind + 1], "D=D-A");
        assert_eq!(rendered[rewind + 2], "@ARG");
        assert_eq!(rendered.last().unwrap(), "($RET:Foo.0)");
    }

    #[test]
    fn function_zeroes_its_locals() {
        let rendered = render(&translate("function Main.f 2"));
        assert_eq!(rendered[1], "(Main.f)");
        assert_eq!(rendered.iter().filter(|l| *l == "M=0").count(), 2);
    }

    #[test]
    fn return_restores_bases_in_reverse_order() {
        let rendered = render(&translate("return"));
        let restored: Vec<&str> = rendered
            .windows(2)
            .filter(|w| w[1] == "M=D" && ["@THAT", "@THIS", "@ARG", "@LCL"].contains(&w[0].as_str()))
            .map(|w| w[0].as_str())
            .collect();
        assert_eq!(restored, ["@THAT", "@THIS", "@ARG", "@LCL"]);
        assert_eq!(&rendered[rendered.len() - 3..], ["@R14", "A=M", "0;JMP"]);
    }

    #[test]
    fn bootstrap_seeds_stack_and_calls_entry() {
        let mut translator = Translator::new("Sys");
        let rendered = render(&translator.bootstrap());
        assert_eq!(&rendered[..5], ["// bootstrap", "@256", "D=A", "@SP", "M=D"]);
        assert!(rendered.contains(&"@Sys.init".to_string()));
        assert_eq!(rendered.last().unwrap(), "($RET:Sys.init.0)");

        // a later user call to the entry point gets a fresh label
        let later = translator.translate(&[Command::Call("Sys.init".into(), 0)]).unwrap();
        assert_eq!(labels(&later), ["$RET:Sys.init.1"]);
    }

    #[test]
    fn statics_follow_the_current_file() {
        let mut translator = Translator::new("A");
        translator.translate_file("A", "push static 3").unwrap();
        let out = translator.translate_file("B", "pop static 3\npush static 3").unwrap();
        assert!(render(&out).contains(&"@$STATIC:B.3".to_string()));
        assert_eq!(translator.static_symbols().collect::<Vec<_>>(), ["$STATIC:A.3", "$STATIC:B.3"]);
    }

    #[test]
    fn comments_can_be_disabled() {
        let mut translator = Translator::with_options("T", TranslatorOptions { comments: false });
        let out = translator.translate_file("T", "push constant 1\nneg").unwrap();
        assert!(out.iter().all(|i| !matches!(i, Instruction::Comment(_))));
    }

    #[test]
    fn invalid_operands_carry_their_line() {
        let err = Translator::new("T")
            .translate_file("T", "push constant 1\npop pointer 2")
            .unwrap_err();
        assert_eq!(err.to_string(), "T:2: invalid operand 'pointer 2': pointer index must be 0 or 1");
        let err = Translator::new("T").translate_file("T", "pop constant 0").unwrap_err();
        assert!(err.to_string().contains("cannot pop into the constant segment"));
        let err = Translator::new("T").translate_file("T", "push local 40000").unwrap_err();
        assert_eq!(err.to_string(), "T:1: invalid operand 'local 40000': index exceeds 32767");
    }

    #[test]
    fn call_rejects_argument_counts_past_the_rewind_limit() {
        let mut translator = Translator::new("T");
        assert!(translator.translate_file("T", "call Foo 32762").is_ok());
        let err = translator.translate_file("T", "push constant 1\ncall Foo 32763").unwrap_err();
        assert_eq!(err.to_string(), "T:2: invalid operand 'call Foo 32763': too many arguments");
    }

    #[test]
    fn generated_symbols_stay_clear_of_user_labels() {
        let out = translate("label Foo.0\ncall Foo 0\nlabel Test.3\npush static 3\neq");
        let found = labels(&out);
        assert_eq!(found, ["Foo.0", "$RET:Foo.0", "Test.3", "$CMP.0", "$CMP_END.0"]);
        assert!(render(&out).contains(&"@$STATIC:Test.3".to_string()));
    }
}
