//! Minimal Hack assembler and CPU for running generated code in tests.

#![allow(dead_code)]

use std::collections::HashMap;

pub const SP: usize = 0;
pub const LCL: usize = 1;
pub const ARG: usize = 2;
pub const THIS: usize = 3;
pub const THAT: usize = 4;

const RAM_SIZE: usize = 0x8000;

#[derive(Debug, Clone, Copy)]
enum Operand {
    A,
    D,
    M,
    Lit(i16),
}

#[derive(Debug, Clone, Copy)]
enum Comp {
    Value(Operand),
    Unary(char, Operand),
    Binary(Operand, char, Operand),
}

#[derive(Debug, Clone)]
enum Op {
    Load(i16),
    Compute {
        dest_a: bool,
        dest_d: bool,
        dest_m: bool,
        comp: Comp,
        jump: Option<String>,
    },
}

fn operand(text: &str) -> Operand {
    match text {
        "A" => Operand::A,
        "D" => Operand::D,
        "M" => Operand::M,
        "0" => Operand::Lit(0),
        "1" => Operand::Lit(1),
        other => panic!("unsupported operand '{other}'"),
    }
}

fn parse_comp(text: &str) -> Comp {
    if text == "-1" {
        return Comp::Value(Operand::Lit(-1));
    }
    if let Some(rest) = text.strip_prefix('-').or_else(|| text.strip_prefix('!')) {
        return Comp::Unary(text.chars().next().unwrap(), operand(rest));
    }
    match text.char_indices().skip(1).find(|(_, c)| "+-&|".contains(*c)) {
        Some((i, op)) => Comp::Binary(operand(&text[..i]), op, operand(&text[i + 1..])),
        None => Comp::Value(operand(text)),
    }
}

fn predefined(symbol: &str) -> Option<i16> {
    let value = match symbol {
        "SP" => 0,
        "LCL" => 1,
        "ARG" => 2,
        "THIS" => 3,
        "THAT" => 4,
        "SCREEN" => 16384,
        "KBD" => 24576,
        _ => {
            let n: i16 = symbol.strip_prefix('R')?.parse().ok()?;
            return (0..16).contains(&n).then_some(n);
        }
    };
    Some(value)
}

pub struct Cpu {
    pub ram: Vec<i16>,
    rom: Vec<Op>,
    pub labels: HashMap<String, usize>,
    pub variables: HashMap<String, usize>,
    pub pc: usize,
    a: i16,
    d: i16,
}

impl Cpu {
    /// Assembles `source`, allocating variables from RAM[16] upwards.
    pub fn load(source: &str) -> Self {
        let mut labels = HashMap::new();
        let mut lines = vec![];
        for raw in source.lines() {
            let line = raw.split("//").next().unwrap().trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
                assert!(
                    labels.insert(name.to_string(), lines.len()).is_none(),
                    "duplicate label {name}"
                );
            } else {
                lines.push(line);
            }
        }

        let mut variables = HashMap::new();
        let mut rom = Vec::with_capacity(lines.len());
        for line in lines {
            let op = if let Some(target) = line.strip_prefix('@') {
                let value = if let Ok(n) = target.parse::<i16>() {
                    n
                } else if let Some(n) = predefined(target) {
                    n
                } else if let Some(&addr) = labels.get(target) {
                    addr as i16
                } else {
                    let next = 16 + variables.len();
                    *variables.entry(target.to_string()).or_insert(next) as i16
                };
                Op::Load(value)
            } else {
                let (rest, jump) = match line.split_once(';') {
                    Some((rest, jump)) => (rest, Some(jump.to_string())),
                    None => (line, None),
                };
                let (dest, comp) = match rest.split_once('=') {
                    Some((dest, comp)) => (dest, comp),
                    None => ("", rest),
                };
                Op::Compute {
                    dest_a: dest.contains('A'),
                    dest_d: dest.contains('D'),
                    dest_m: dest.contains('M'),
                    comp: parse_comp(comp),
                    jump,
                }
            };
            rom.push(op);
        }

        Cpu {
            ram: vec![0; RAM_SIZE],
            rom,
            labels,
            variables,
            pc: 0,
            a: 0,
            d: 0,
        }
    }

    fn address(&self) -> usize {
        let addr = self.a as u16 as usize;
        assert!(addr < RAM_SIZE, "address {addr} out of range at pc {}", self.pc);
        addr
    }

    fn value(&self, operand: Operand) -> i16 {
        match operand {
            Operand::A => self.a,
            Operand::D => self.d,
            Operand::M => self.ram[self.address()],
            Operand::Lit(n) => n,
        }
    }

    fn step(&mut self) {
        match self.rom[self.pc].clone() {
            Op::Load(n) => {
                self.a = n;
                self.pc += 1;
            }
            Op::Compute {
                dest_a,
                dest_d,
                dest_m,
                comp,
                jump,
            } => {
                let out = match comp {
                    Comp::Value(x) => self.value(x),
                    Comp::Unary('-', x) => self.value(x).wrapping_neg(),
                    Comp::Unary(_, x) => !self.value(x),
                    Comp::Binary(x, op, y) => {
                        let (x, y) = (self.value(x), self.value(y));
                        match op {
                            '+' => x.wrapping_add(y),
                            '-' => x.wrapping_sub(y),
                            '&' => x & y,
                            _ => x | y,
                        }
                    }
                };
                // M is addressed by A as it was before this instruction
                if dest_m {
                    let addr = self.address();
                    self.ram[addr] = out;
                }
                let target = self.a as u16 as usize;
                if dest_a {
                    self.a = out;
                }
                if dest_d {
                    self.d = out;
                }
                let taken = match jump.as_deref() {
                    None => false,
                    Some("JGT") => out > 0,
                    Some("JEQ") => out == 0,
                    Some("JGE") => out >= 0,
                    Some("JLT") => out < 0,
                    Some("JNE") => out != 0,
                    Some("JLE") => out <= 0,
                    Some("JMP") => true,
                    Some(other) => panic!("unknown jump {other}"),
                };
                self.pc = if taken { target } else { self.pc + 1 };
            }
        }
    }

    /// Runs until execution falls off the end of ROM.
    pub fn run(&mut self, max_steps: usize) {
        for _ in 0..max_steps {
            if self.pc >= self.rom.len() {
                return;
            }
            self.step();
        }
        panic!("program did not finish within {max_steps} steps");
    }

    /// Runs until the program counter reaches `label`.
    pub fn run_until(&mut self, label: &str, max_steps: usize) {
        let stop = self.labels[label];
        for _ in 0..max_steps {
            if self.pc == stop {
                return;
            }
            assert!(self.pc < self.rom.len(), "fell off ROM before reaching {label}");
            self.step();
        }
        panic!("{label} not reached within {max_steps} steps");
    }

    pub fn sp(&self) -> usize {
        self.ram[SP] as usize
    }

    pub fn top(&self) -> i16 {
        self.ram[self.sp() - 1]
    }

    pub fn variable(&self, name: &str) -> i16 {
        self.ram[self.variables[name]]
    }
}
