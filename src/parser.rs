use nom::{
    branch::alt,
    bytes::complete::{is_a, tag},
    character::{
        complete::{char, digit1, space1},
        is_digit,
    },
    combinator::{map, map_res, opt, recognize, value, verify},
    sequence::{pair, tuple},
    IResult,
};

use crate::ast::{ArithmeticOp, Command, CommandType, Segment};
use crate::error::{Result, TranslateError};

const ARITHMETIC: [&str; 9] = ["add", "sub", "neg", "eq", "gt", "lt", "and", "or", "not"];

fn count(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |c: &str| c.parse())(input)
}

// Signed so that a negative index reaches the operand check instead of
// failing as a syntax error.
fn index(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |c: &str| c.parse())(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Segment::Constant, tag("constant")),
        value(Segment::Local, tag("local")),
        value(Segment::Static, tag("static")),
        value(Segment::Argument, tag("argument")),
        value(Segment::This, tag("this")),
        value(Segment::That, tag("that")),
        value(Segment::Pointer, tag("pointer")),
        value(Segment::Temp, tag("temp")),
    ))(input)
}

fn access(input: &str) -> IResult<&str, (Segment, i64)> {
    map(
        tuple((alt((tag("push"), tag("pop"))), space1, segment, space1, index)),
        |(_, _, segment, _, idx)| (segment, idx),
    )(input)
}

#[test]
fn test_access() {
    assert_eq!(access("push  pointer  32"), Ok(("", (Segment::Pointer, 32))));
    assert_eq!(access("pop local -1"), Ok(("", (Segment::Local, -1))));
}

fn prim(input: &str) -> IResult<&str, Command> {
    map(
        alt((
            value(ArithmeticOp::Add, tag("add")),
            value(ArithmeticOp::Sub, tag("sub")),
            value(ArithmeticOp::Neg, tag("neg")),
            value(ArithmeticOp::Eq, tag("eq")),
            value(ArithmeticOp::Gt, tag("gt")),
            value(ArithmeticOp::Lt, tag("lt")),
            value(ArithmeticOp::And, tag("and")),
            value(ArithmeticOp::Or, tag("or")),
            value(ArithmeticOp::Not, tag("not")),
        )),
        Command::Arithmetic,
    )(input)
}

#[test]
fn test_prim() {
    assert_eq!(prim("neg"), Ok(("", Command::Arithmetic(ArithmeticOp::Neg))));
}

fn symbol(input: &str) -> IResult<&str, String> {
    map(
        verify(
            is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_.$:0123456789"),
            // `$` leads only translator-generated labels
            |c: &str| !is_digit(c.as_bytes()[0]) && !c.starts_with('$'),
        ),
        |sym: &str| sym.to_string(),
    )(input)
}

#[test]
fn test_symbol() {
    assert_eq!(symbol("Main.fib$ret:2"), Ok(("", "Main.fib$ret:2".to_string())));
    assert!(symbol("9lives").is_err());
    assert!(symbol("$CMP.0").is_err());
    assert!(symbol("$RET:Foo.0").is_err());
    assert!(symbol("$STATIC:Main.3").is_err());
}

fn branching(input: &str) -> IResult<&str, Command> {
    alt((
        map(tuple((tag("label"), space1, symbol)), |(_, _, sym)| Command::Label(sym)),
        map(tuple((tag("goto"), space1, symbol)), |(_, _, sym)| Command::Goto(sym)),
        map(tuple((tag("if-goto"), space1, symbol)), |(_, _, sym)| Command::IfGoto(sym)),
    ))(input)
}

fn function(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("function"), space1, symbol, space1, count)),
        |(_, _, name, _, locals)| Command::Function(name, locals),
    )(input)
}

fn call(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("call"), space1, symbol, space1, count)),
        |(_, _, name, _, args)| Command::Call(name, args),
    )(input)
}

fn ret(input: &str) -> IResult<&str, Command> {
    value(Command::Return, tag("return"))(input)
}

#[test]
fn test_function_and_call() {
    assert_eq!(
        function("function Main.fib 2"),
        Ok(("", Command::Function("Main.fib".to_string(), 2)))
    );
    assert_eq!(
        call("call Math.multiply\t2"),
        Ok(("", Command::Call("Math.multiply".to_string(), 2)))
    );
}

/// Why a cleaned line failed to become a command. Locations are attached by
/// the [`Parser`], which knows the file and line.
#[derive(Debug)]
enum Problem {
    Unknown,
    Malformed(String),
    Operand(TranslateError),
}

fn complete<'a, T>(
    text: &'a str,
    mut parser: impl FnMut(&'a str) -> IResult<&'a str, T>,
    usage: &str,
) -> std::result::Result<T, Problem> {
    match parser(text) {
        Ok(("", parsed)) => Ok(parsed),
        Ok((rest, _)) => Err(Problem::Malformed(format!("unexpected trailing '{}'", rest.trim()))),
        Err(_) => Err(Problem::Malformed(format!("expected '{}'", usage))),
    }
}

/// Classifies a cleaned line by its keyword, without reading operands.
pub fn classify(text: &str) -> Option<CommandType> {
    if ARITHMETIC.contains(&text) {
        return Some(CommandType::Arithmetic);
    }
    let keyword = text.split_whitespace().next()?;
    let kind = match keyword {
        "push" => CommandType::Push,
        "pop" => CommandType::Pop,
        "label" => CommandType::Label,
        "goto" => CommandType::Goto,
        "if-goto" => CommandType::IfGoto,
        "function" => CommandType::Function,
        "call" => CommandType::Call,
        "return" => CommandType::Return,
        kw if ARITHMETIC.contains(&kw) => CommandType::Arithmetic,
        _ => return None,
    };
    Some(kind)
}

fn parse_command(text: &str) -> std::result::Result<Command, Problem> {
    let kind = classify(text).ok_or(Problem::Unknown)?;
    match kind {
        CommandType::Push | CommandType::Pop => {
            let (segment, idx) = complete(text, access, "push|pop <segment> <index>")?;
            let idx = u16::try_from(idx).map_err(|_| {
                let reason = if idx < 0 {
                    "index must not be negative"
                } else {
                    "index out of range"
                };
                Problem::Operand(TranslateError::invalid_operand(segment, idx, reason))
            })?;
            Ok(if kind == CommandType::Push {
                Command::Push(segment, idx)
            } else {
                Command::Pop(segment, idx)
            })
        }
        CommandType::Arithmetic => complete(text, prim, "<operator>"),
        CommandType::Label | CommandType::Goto | CommandType::IfGoto => {
            complete(text, branching, "label|goto|if-goto <symbol>")
        }
        CommandType::Function => complete(text, function, "function <name> <nLocals>"),
        CommandType::Call => complete(text, call, "call <name> <nArgs>"),
        CommandType::Return => complete(text, ret, "return"),
    }
}

/// Line cursor over one VM source file.
///
/// `advance` moves to the next line carrying a command, with comments and
/// surrounding whitespace already stripped; the accessors then inspect that
/// buffered text.
pub struct Parser<'a> {
    file: &'a str,
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    current: &'a str,
    line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(file: &'a str, source: &'a str) -> Self {
        Parser {
            file,
            lines: source.lines().enumerate(),
            current: "",
            line: 0,
        }
    }

    /// Returns false once the source is exhausted.
    pub fn advance(&mut self) -> bool {
        for (number, raw) in self.lines.by_ref() {
            let text = raw.split_once("//").map(|(s, _)| s).unwrap_or(raw).trim();
            if !text.is_empty() {
                self.current = text;
                self.line = number + 1;
                return true;
            }
        }
        self.current = "";
        false
    }

    pub fn current(&self) -> &'a str {
        self.current
    }

    /// 1-based line number of the current command.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn command_type(&self) -> Option<CommandType> {
        classify(self.current)
    }

    /// The operator for arithmetic commands, otherwise the second field.
    pub fn arg1(&self) -> Option<&'a str> {
        match self.command_type() {
            Some(CommandType::Arithmetic) => Some(self.current),
            _ => self.current.split_whitespace().nth(1),
        }
    }

    pub fn arg2(&self) -> Option<&'a str> {
        self.current.split_whitespace().nth(2)
    }

    /// Decodes the current line into a typed command.
    pub fn command(&self) -> Result<Command> {
        parse_command(self.current).map_err(|problem| match problem {
            Problem::Unknown => TranslateError::UnknownCommand {
                file: self.file.to_string(),
                line: self.line,
                text: self.current.to_string(),
            },
            Problem::Malformed(reason) => TranslateError::Malformed {
                file: self.file.to_string(),
                line: self.line,
                text: self.current.to_string(),
                reason,
            },
            Problem::Operand(err) => err.at_line(self.file, self.line),
        })
    }
}

pub fn parse(file: &str, input: &str) -> Result<Vec<Command>> {
    let mut parser = Parser::new(file, input);
    let mut commands = vec![];
    while parser.advance() {
        commands.push(parser.command()?);
    }
    Ok(commands)
}
