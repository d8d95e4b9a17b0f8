use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

/// One of the six always-existing registers shared by every instruction
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Register {
    Param1,
    Param2,
    Param3,
    Param4,
    Return1,
    Return2,
}

impl Register {
    pub const ALL: [Register; 6] = [
        Register::Param1,
        Register::Param2,
        Register::Param3,
        Register::Param4,
        Register::Return1,
        Register::Return2,
    ];

    /// Register names are reserved keywords, so this never matches a variable
    pub fn from_name(name: &str) -> Option<Register> {
        match name {
            "param1" => Some(Register::Param1),
            "param2" => Some(Register::Param2),
            "param3" => Some(Register::Param3),
            "param4" => Some(Register::Param4),
            "return1" => Some(Register::Return1),
            "return2" => Some(Register::Return2),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Register::Param1 => "param1",
            Register::Param2 => "param2",
            Register::Param3 => "param3",
            Register::Param4 => "param4",
            Register::Return1 => "return1",
            Register::Return2 => "return2",
        }
    }
}

/// A storage location named by an identifier
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum Place {
    Register(Register),
    Variable(Rc<str>),
}

impl Place {
    pub fn from_name(name: &str) -> Place {
        match Register::from_name(name) {
            Some(register) => Place::Register(register),
            None => Place::Variable(name.into()),
        }
    }
}

impl Display for Place {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Place::Register(register) => write!(f, "{}", register.name()),
            Place::Variable(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Operand {
    Literal(u64),
    Place(Place),
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{}", value),
            Operand::Place(place) => write!(f, "{}", place),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompareOp {
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
        }
    }

    /// Whether the instruction after the comparison gets to run
    pub fn holds(&self, left: u64, right: u64) -> bool {
        match self {
            CompareOp::Equal => left == right,
            CompareOp::NotEqual => left != right,
        }
    }
}

/// Intermediate representation of a single executable line. Arithmetic and comparisons read
/// `param1` and `param2` implicitly, print instructions read `param1`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Instruction {
    Assign { dest: Place, source: Operand },
    Arithmetic(ArithmeticOp),
    Compare(CompareOp),
    Print,
    PrintChar,
    Call(Rc<str>),
    Jump(Rc<str>),
    Return,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Assign { dest, source } => write!(f, "= {} {}", dest, source),
            Instruction::Arithmetic(op) => write!(f, "{}", op.symbol()),
            Instruction::Compare(op) => write!(f, "{}", op.symbol()),
            Instruction::Print => write!(f, "#"),
            Instruction::PrintChar => write!(f, "##"),
            Instruction::Call(label) => write!(f, "() {}", label),
            Instruction::Jump(label) => write!(f, "-> {}", label),
            Instruction::Return => write!(f, "@"),
        }
    }
}

/// A compiled program: the instruction sequence, indexed by program counter, and the label table
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Program {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) positions: Vec<usize>,
    pub(crate) labels: HashMap<Rc<str>, usize>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Address a label was declared at, i.e. the index of the instruction emitted after it
    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn labels(&self) -> &HashMap<Rc<str>, usize> {
        &self.labels
    }

    /// Index of the token the instruction at `pc` was compiled from
    pub fn position(&self, pc: usize) -> Option<usize> {
        self.positions.get(pc).copied()
    }

    pub(crate) fn push(&mut self, instruction: Instruction, position: usize) {
        self.instructions.push(instruction);
        self.positions.push(position);
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut labels = self.labels.iter().collect::<Vec<_>>();
        labels.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        let mut pending = labels.into_iter().peekable();
        for (pc, instr) in self.instructions.iter().enumerate() {
            while let Some((name, _)) = pending.next_if(|(_, addr)| **addr == pc) {
                writeln!(f, ": {}", name)?;
            }
            writeln!(f, "{:04}    {}", pc, instr)?;
        }
        for (name, _) in pending {
            writeln!(f, ": {}", name)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ArithmeticOp, CompareOp, Instruction, Operand, Place, Program, Register};

    #[test]
    fn register_names_round_trip() {
        for register in Register::ALL {
            assert_eq!(Register::from_name(register.name()), Some(register));
        }
        assert_eq!(Register::from_name("param5"), None);
        assert_eq!(Register::from_name("Param1"), None);
    }

    #[test]
    fn place_classification() {
        assert_eq!(Place::from_name("return2"), Place::Register(Register::Return2));
        assert_eq!(Place::from_name("loops"), Place::Variable("loops".into()));
    }

    #[test]
    fn compare_holds() {
        assert!(CompareOp::Equal.holds(4, 4));
        assert!(!CompareOp::Equal.holds(4, 5));
        assert!(CompareOp::NotEqual.holds(4, 5));
        assert!(!CompareOp::NotEqual.holds(0, 0));
    }

    #[test]
    fn display_listing() {
        let mut program = Program::default();
        program.labels.insert("start".into(), 0);
        program.labels.insert("end".into(), 3);
        program.push(
            Instruction::Assign {
                dest: Place::from_name("param1"),
                source: Operand::Literal(42),
            },
            1,
        );
        program.push(Instruction::Arithmetic(ArithmeticOp::Divide), 4);
        program.push(Instruction::Compare(CompareOp::NotEqual), 5);

        assert_eq!(
            program.to_string(),
            ": start\n0000    = param1 42\n0001    /\n0002    !=\n: end\n"
        );
        assert_eq!(program.position(1), Some(4));
        assert_eq!(program.label("end"), Some(3));
        assert_eq!(program.label("missing"), None);
    }
}
