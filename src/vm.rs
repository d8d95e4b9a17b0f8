use crate::ir::{ArithmeticOp, Instruction, Operand, Place, Program, Register};
use crate::parser::{compile, ParseError};
use log::{debug, trace};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::io::{stdout, Stdout, Write};
use std::rc::Rc;

/// Runaway-loop guard: maximum number of instructions executed per run
pub const DEFAULT_STEP_LIMIT: usize = 400;

/// Label execution starts at
pub const ENTRY_LABEL: &str = "start";

/// Configuration options for the virtual machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    source: String,
    step_limit: usize,
    debug: bool,
    suppress_output: bool,
}

impl VmConfig {
    /// Creates a new virtual machine config with the given arguments
    ///
    /// - `source` the program source text
    /// - `step_limit` the maximum number of instructions executed by a single run
    /// - `debug` log the machine state before every executed instruction
    /// - `suppress_output` discard everything the program prints
    pub fn new(source: &str, step_limit: usize, debug: bool, suppress_output: bool) -> VmConfig {
        VmConfig {
            source: source.to_string(),
            step_limit,
            debug,
            suppress_output,
        }
    }

    /// Returns a default configuration with the default step limit
    ///
    /// - `source` the program source text
    pub fn default(source: &str) -> VmConfig {
        VmConfig::new(source, DEFAULT_STEP_LIMIT, false, false)
    }

    /// Returns a default configuration with the default step limit, suppressing output
    ///
    /// - `source` the program source text
    pub fn suppressed(source: &str) -> VmConfig {
        VmConfig::new(source, DEFAULT_STEP_LIMIT, false, true)
    }

    /// Returns a default debug configuration with the default step limit
    ///
    /// - `source` the program source text
    pub fn debug(source: &str) -> VmConfig {
        VmConfig::new(source, DEFAULT_STEP_LIMIT, true, false)
    }

    pub fn with_step_limit(mut self, step_limit: usize) -> VmConfig {
        self.step_limit = step_limit;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }
}

/// Why a run stopped without an error
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Halt {
    /// the program counter ran past the last instruction
    Completed,
    /// the step limit was reached first
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmErrorKind {
    ParseError(ParseError),
    MissingEntryLabel,
    UnresolvedLabel(usize, Instruction),
    CallStackUnderflow(usize, Instruction),
    DivisionByZero(usize, Instruction),
    InvalidCharacter(usize, Instruction, u64),
    IOError(usize, Instruction, String),
}

impl Display for VmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl VmErrorKind {
    fn throw<T>(self) -> Result<T, VmError> {
        let msg = match &self {
            VmErrorKind::ParseError(err) => format!("parse error occurred: {}", err),
            VmErrorKind::MissingEntryLabel => {
                format!("no label named {} to start execution at", ENTRY_LABEL)
            }
            VmErrorKind::UnresolvedLabel(ip, instr) => {
                format!("label is never declared - failed executing {:04}: {}", ip, instr)
            }
            VmErrorKind::CallStackUnderflow(ip, instr) => format!(
                "call stack is empty, nothing to return to - failed executing {:04}: {}",
                ip, instr
            ),
            VmErrorKind::DivisionByZero(ip, instr) => {
                format!("division by zero - failed executing {:04}: {}", ip, instr)
            }
            VmErrorKind::InvalidCharacter(ip, instr, value) => format!(
                "{} is not a valid character code - failed executing {:04}: {}",
                value, ip, instr
            ),
            VmErrorKind::IOError(ip, instr, err) => format!(
                "output error when executing {:04}: {}, details: {}",
                ip, instr, err
            ),
        };
        Err(VmError { msg, kind: self })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmError {
    msg: String,
    kind: VmErrorKind,
}

impl VmError {
    pub fn kind(&self) -> &VmErrorKind {
        &self.kind
    }
}

impl Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl Error for VmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            VmErrorKind::ParseError(err) => Some(err),
            _ => None,
        }
    }
}

/// The parameter and return registers. There is a single register file shared by every
/// instruction, calls do not save or restore it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    pub param1: u64,
    pub param2: u64,
    pub param3: u64,
    pub param4: u64,
    pub return1: u64,
    pub return2: u64,
}

impl Registers {
    pub fn get(&self, register: Register) -> u64 {
        match register {
            Register::Param1 => self.param1,
            Register::Param2 => self.param2,
            Register::Param3 => self.param3,
            Register::Param4 => self.param4,
            Register::Return1 => self.return1,
            Register::Return2 => self.return2,
        }
    }

    fn get_mut(&mut self, register: Register) -> &mut u64 {
        match register {
            Register::Param1 => &mut self.param1,
            Register::Param2 => &mut self.param2,
            Register::Param3 => &mut self.param3,
            Register::Param4 => &mut self.param4,
            Register::Return1 => &mut self.return1,
            Register::Return2 => &mut self.return2,
        }
    }
}

/// Where the program counter goes after an instruction
enum Flow {
    Next,
    Skip,
    Goto(usize),
}

/// The root component for the virtual machine. Owns every piece of mutable program state.
pub struct Vm<W: Write = Stdout> {
    config: VmConfig,
    program: Program,
    registers: Registers,
    variables: HashMap<Rc<str>, u64>,
    call_stack: Vec<usize>,
    program_counter: usize,
    steps: usize,
    started: bool,
    output: W,
}

impl Vm<Stdout> {
    /// Compiles the configured source, printing to stdout
    ///
    /// - `config` the configuration of the virtual machine
    pub fn new(config: VmConfig) -> Result<Vm<Stdout>, VmError> {
        Vm::with_output(config, stdout())
    }
}

impl<W: Write> Vm<W> {
    /// Compiles the configured source, printing to `output`
    pub fn with_output(config: VmConfig, output: W) -> Result<Vm<W>, VmError> {
        let program = match compile(&config.source) {
            Ok(program) => program,
            Err(err) => return VmErrorKind::ParseError(err).throw(),
        };

        Ok(Vm {
            config,
            program,
            registers: Registers::default(),
            variables: HashMap::new(),
            call_stack: vec![],
            program_counter: 0,
            steps: 0,
            started: false,
            output,
        })
    }

    /// Replaces the program with a freshly compiled `source` and resets all state. On a compile
    /// error the machine is left holding an empty program.
    pub fn load(&mut self, source: &str) -> Result<(), VmError> {
        self.reset();
        self.config.source = source.to_string();
        match compile(source) {
            Ok(program) => {
                self.program = program;
                Ok(())
            }
            Err(err) => {
                self.program = Program::default();
                VmErrorKind::ParseError(err).throw()
            }
        }
    }

    /// Resets registers, variables, call stack and counters without recompiling
    pub fn reset(&mut self) {
        self.registers = Registers::default();
        self.variables.clear();
        self.call_stack.clear();
        self.program_counter = 0;
        self.steps = 0;
        self.started = false;
    }

    /// Runs the program from the entry label on a freshly reset machine
    pub fn run(&mut self) -> Result<Halt, VmError> {
        self.reset();
        while self.step()? {}
        let halt = self.halt();
        debug!("halted after {} steps: {:?}", self.steps, halt);

        Ok(halt)
    }

    /// Executes a single instruction. Returns false once the machine has halted.
    pub fn step(&mut self) -> Result<bool, VmError> {
        if !self.started {
            self.enter()?;
        }
        let ip = match self.next_instruction() {
            Some(ip) => ip,
            None => return Ok(false),
        };
        match self.program.get(ip).cloned() {
            Some(instr) => {
                self.exec(ip, instr)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the address of the next instruction to be executed in a `Some` variant. None if
    /// the program ran off its end or the step limit is exhausted.
    pub fn next_instruction(&self) -> Option<usize> {
        if self.program_counter < self.program.len() && self.steps < self.config.step_limit {
            Some(self.program_counter)
        } else {
            None
        }
    }

    fn enter(&mut self) -> Result<(), VmError> {
        match self.program.label(ENTRY_LABEL) {
            Some(entry) => {
                self.program_counter = entry;
                self.started = true;
                Ok(())
            }
            None => VmErrorKind::MissingEntryLabel.throw(),
        }
    }

    fn halt(&self) -> Halt {
        if self.program_counter >= self.program.len() {
            Halt::Completed
        } else {
            Halt::StepLimit
        }
    }

    fn slot(&mut self, place: &Place) -> &mut u64 {
        match place {
            Place::Register(register) => self.registers.get_mut(*register),
            Place::Variable(name) => self.variables.entry(name.clone()).or_insert(0),
        }
    }

    fn resolve(&self, ip: usize, instr: &Instruction, label: &str) -> Result<usize, VmError> {
        match self.program.label(label) {
            Some(addr) => Ok(addr),
            None => VmErrorKind::UnresolvedLabel(ip, instr.clone()).throw(),
        }
    }

    fn arithmetic(&self, ip: usize, instr: &Instruction, op: ArithmeticOp) -> Result<u64, VmError> {
        let left = self.registers.param1;
        let right = self.registers.param2;
        match op {
            ArithmeticOp::Add => Ok(left.wrapping_add(right)),
            ArithmeticOp::Subtract => Ok(left.wrapping_sub(right)),
            ArithmeticOp::Multiply => Ok(left.wrapping_mul(right)),
            ArithmeticOp::Divide => match left.checked_div(right) {
                Some(quotient) => Ok(quotient),
                None => VmErrorKind::DivisionByZero(ip, instr.clone()).throw(),
            },
        }
    }

    fn write(&mut self, ip: usize, instr: &Instruction, value: impl Display) -> Result<(), VmError> {
        if self.config.suppress_output {
            return Ok(());
        }
        match write!(self.output, "{}", value).and_then(|_| self.output.flush()) {
            Ok(()) => Ok(()),
            Err(err) => VmErrorKind::IOError(ip, instr.clone(), err.to_string()).throw(),
        }
    }

    /// Executes the instruction at `ip` and moves the program counter on
    ///
    /// `ip` - the address of the instruction to execute
    /// `instr` - the instruction stored at `ip`
    fn exec(&mut self, ip: usize, instr: Instruction) -> Result<(), VmError> {
        if self.config.debug {
            trace!(
                "{:04} {:<24} {:?} call stack: {:?}",
                ip,
                instr.to_string(),
                self.registers,
                self.call_stack
            );
        }
        let flow = match &instr {
            Instruction::Assign { dest, source } => {
                let value = match source {
                    Operand::Literal(value) => *value,
                    Operand::Place(place) => *self.slot(place),
                };
                *self.slot(dest) = value;
                Flow::Next
            }
            Instruction::Arithmetic(op) => {
                self.registers.return1 = self.arithmetic(ip, &instr, *op)?;
                Flow::Next
            }
            Instruction::Compare(op) => {
                if op.holds(self.registers.param1, self.registers.param2) {
                    Flow::Next
                } else {
                    Flow::Skip
                }
            }
            Instruction::Print => {
                let value = self.registers.param1;
                self.write(ip, &instr, value)?;
                Flow::Next
            }
            Instruction::PrintChar => {
                let value = self.registers.param1;
                let character = match u32::try_from(value).ok().and_then(char::from_u32) {
                    Some(character) => character,
                    None => {
                        return VmErrorKind::InvalidCharacter(ip, instr.clone(), value).throw()
                    }
                };
                self.write(ip, &instr, character)?;
                Flow::Next
            }
            Instruction::Call(label) => {
                let target = self.resolve(ip, &instr, label)?;
                self.call_stack.push(ip + 1);
                Flow::Goto(target)
            }
            Instruction::Jump(label) => Flow::Goto(self.resolve(ip, &instr, label)?),
            Instruction::Return => match self.call_stack.pop() {
                Some(addr) => Flow::Goto(addr),
                None => return VmErrorKind::CallStackUnderflow(ip, instr.clone()).throw(),
            },
        };

        self.program_counter = match flow {
            Flow::Next => ip + 1,
            Flow::Skip => ip + 2,
            Flow::Goto(addr) => addr,
        };
        self.steps += 1;

        Ok(())
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn register(&self, register: Register) -> u64 {
        self.registers.get(register)
    }

    /// Current value of a global variable, None if the program never touched it
    pub fn variable(&self, name: &str) -> Option<u64> {
        self.variables.get(name).copied()
    }

    pub fn program_counter(&self) -> usize {
        self.program_counter
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}
