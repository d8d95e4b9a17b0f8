use crate::ir::{ArithmeticOp, CompareOp, Instruction, Operand, Place, Program};
use crate::lexer::{lex, Token, TokenKind};
use log::{debug, warn};
use std::error::Error;
use std::fmt::Display;
use std::rc::Rc;

pub const LABEL: &str = ":";
pub const ASSIGN: &str = "=";
pub const PRINT: &str = "#";
pub const PRINT_CHAR: &str = "##";
pub const ADD: &str = "+";
pub const SUBTRACT: &str = "-";
pub const MULTIPLY: &str = "*";
pub const DIVIDE: &str = "/";
pub const EQUAL: &str = "==";
pub const NOT_EQUAL: &str = "!=";
pub const JUMP: &str = "->";
pub const CALL: &str = "()";
pub const RETURN: &str = "@";
pub const COMMENT_OPEN: &str = "/*";
pub const COMMENT_CLOSE: &str = "*/";

/// Grammar rule a compilation failed on. The first field is always the index of the offending
/// token (or the stream length when input ran out).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseErrorKind {
    LabelName(usize, Rc<str>),
    AssignDestination(usize, Rc<str>),
    AssignSource(usize, Rc<str>),
    JumpTarget(usize, Rc<str>),
    CallTarget(usize, Rc<str>),
    InvalidNumber(usize, Rc<str>),
    UnknownOperator(usize, Rc<str>),
    NotAnOperator(usize, Rc<str>),
    UnexpectedEnd(usize, &'static str),
}

impl ParseErrorKind {
    pub fn token_index(&self) -> usize {
        match self {
            ParseErrorKind::LabelName(pos, _)
            | ParseErrorKind::AssignDestination(pos, _)
            | ParseErrorKind::AssignSource(pos, _)
            | ParseErrorKind::JumpTarget(pos, _)
            | ParseErrorKind::CallTarget(pos, _)
            | ParseErrorKind::InvalidNumber(pos, _)
            | ParseErrorKind::UnknownOperator(pos, _)
            | ParseErrorKind::NotAnOperator(pos, _)
            | ParseErrorKind::UnexpectedEnd(pos, _) => *pos,
        }
    }

    fn throw<T>(self, offset: usize) -> Result<T, ParseError> {
        let detail = match &self {
            ParseErrorKind::LabelName(pos, token) => format!(
                "label declaration at token {} expects an identifier, but got {}",
                pos, token
            ),
            ParseErrorKind::AssignDestination(pos, token) => format!(
                "assignment destination at token {} must be an identifier, but got {}",
                pos, token
            ),
            ParseErrorKind::AssignSource(pos, token) => format!(
                "assignment source at token {} must be an identifier or a number, but got {}",
                pos, token
            ),
            ParseErrorKind::JumpTarget(pos, token) => format!(
                "jump at token {} expects a label identifier, but got {}",
                pos, token
            ),
            ParseErrorKind::CallTarget(pos, token) => format!(
                "call at token {} expects a label identifier, but got {}",
                pos, token
            ),
            ParseErrorKind::InvalidNumber(pos, token) => format!(
                "number at token {} is not an unsigned 64 bit integer: {}",
                pos, token
            ),
            ParseErrorKind::UnknownOperator(pos, token) => {
                format!("unknown operator at token {}: {}", pos, token)
            }
            ParseErrorKind::NotAnOperator(pos, token) => format!(
                "line should start with an operator, but token {} is {}",
                pos, token
            ),
            ParseErrorKind::UnexpectedEnd(pos, expected) => format!(
                "unexpected end of source at token {}, expected {}",
                pos, expected
            ),
        };
        let msg = format!("{} (source byte {})", detail, offset);
        Err(ParseError { msg, kind: self, offset })
    }
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub(crate) msg: String,
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
}

impl ParseError {
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Byte offset into the source of the offending token, or the end of the source
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl Error for ParseError {}

/// Single forward pass over the token stream. Emits instructions and records label addresses as a
/// side effect; labels are only looked up at execution time, so forward references are fine.
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    token_index: usize,
    program: Program,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser {
            tokens,
            token_index: 0,
            program: Program::default(),
        }
    }

    /// Consumes the parser. Nothing of a failed parse survives.
    pub fn parse(mut self) -> Result<Program, ParseError> {
        while self.token_index < self.tokens.len() {
            self.statement()?;
        }
        debug!(
            "compiled {} tokens into {} instructions and {} labels",
            self.tokens.len(),
            self.program.len(),
            self.program.labels.len()
        );

        Ok(self.program)
    }

    fn next(&mut self, expected: &'static str) -> Result<(usize, Token), ParseError> {
        let index = self.token_index;
        match self.tokens.get(index) {
            Some(token) => {
                self.token_index += 1;
                Ok((index, token.clone()))
            }
            None => self.fail(ParseErrorKind::UnexpectedEnd(index, expected)),
        }
    }

    fn fail<T>(&self, kind: ParseErrorKind) -> Result<T, ParseError> {
        let offset = match self.tokens.get(kind.token_index()) {
            Some(token) => token.offset,
            None => self
                .tokens
                .last()
                .map_or(0, |token| token.offset + token.text.len()),
        };
        kind.throw(offset)
    }

    fn emit(&mut self, instr: Instruction, start_index: usize) {
        self.program.push(instr, start_index);
    }

    fn statement(&mut self) -> Result<(), ParseError> {
        let (start_index, token) = self.next("an operator")?;
        if !token.is(TokenKind::Operator) {
            return self.fail(ParseErrorKind::NotAnOperator(start_index, token.text));
        }
        match &*token.text {
            LABEL => self.label(),
            ASSIGN => {
                let instr = self.assign()?;
                self.emit(instr, start_index);
                Ok(())
            }
            COMMENT_OPEN => {
                self.comment(start_index);
                Ok(())
            }
            JUMP => {
                let (index, target) = self.next("a jump target")?;
                if !target.is(TokenKind::Identifier) {
                    return self.fail(ParseErrorKind::JumpTarget(index, target.text));
                }
                self.emit(Instruction::Jump(target.text), start_index);
                Ok(())
            }
            CALL => {
                let (index, target) = self.next("a call target")?;
                if !target.is(TokenKind::Identifier) {
                    return self.fail(ParseErrorKind::CallTarget(index, target.text));
                }
                self.emit(Instruction::Call(target.text), start_index);
                Ok(())
            }
            other => {
                let instr = match other {
                    PRINT => Instruction::Print,
                    PRINT_CHAR => Instruction::PrintChar,
                    ADD => Instruction::Arithmetic(ArithmeticOp::Add),
                    SUBTRACT => Instruction::Arithmetic(ArithmeticOp::Subtract),
                    MULTIPLY => Instruction::Arithmetic(ArithmeticOp::Multiply),
                    DIVIDE => Instruction::Arithmetic(ArithmeticOp::Divide),
                    EQUAL => Instruction::Compare(CompareOp::Equal),
                    NOT_EQUAL => Instruction::Compare(CompareOp::NotEqual),
                    RETURN => Instruction::Return,
                    _ => {
                        return self.fail(ParseErrorKind::UnknownOperator(
                            start_index,
                            token.text.clone(),
                        ))
                    }
                };
                self.emit(instr, start_index);
                Ok(())
            }
        }
    }

    fn label(&mut self) -> Result<(), ParseError> {
        let (index, name) = self.next("a label name")?;
        if !name.is(TokenKind::Identifier) {
            return self.fail(ParseErrorKind::LabelName(index, name.text));
        }
        // redeclaring a label moves it
        self.program.labels.insert(name.text, self.program.len());

        Ok(())
    }

    fn assign(&mut self) -> Result<Instruction, ParseError> {
        let (dest_index, dest) = self.next("an assignment destination")?;
        let (source_index, source) = self.next("an assignment source")?;
        if !dest.is(TokenKind::Identifier) {
            return self.fail(ParseErrorKind::AssignDestination(dest_index, dest.text));
        }
        let source = match source.kind {
            TokenKind::Identifier => Operand::Place(Place::from_name(&source.text)),
            TokenKind::Number => match leading_digits(&source.text).parse::<u64>() {
                Ok(value) => Operand::Literal(value),
                Err(_) => {
                    return self.fail(ParseErrorKind::InvalidNumber(source_index, source.text))
                }
            },
            TokenKind::Operator => {
                return self.fail(ParseErrorKind::AssignSource(source_index, source.text))
            }
        };

        Ok(Instruction::Assign {
            dest: Place::from_name(&dest.text),
            source,
        })
    }

    /// Blind scan for the closing token, no nesting
    fn comment(&mut self, start_index: usize) {
        while let Some(token) = self.tokens.get(self.token_index) {
            self.token_index += 1;
            if &*token.text == COMMENT_CLOSE {
                return;
            }
        }
        warn!(
            "comment opened at token {} is never closed, ignoring the rest of the source",
            start_index
        );
    }
}

/// Number tokens are read up to the first non-digit, so `3x` is 3
fn leading_digits(text: &str) -> &str {
    let end = text
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(text.len());
    &text[..end]
}

/// Lexes and parses `source` in one go
pub fn compile(source: &str) -> Result<Program, ParseError> {
    Parser::new(lex(source)).parse()
}

#[cfg(test)]
mod tests {
    use super::{compile, ParseError, ParseErrorKind};
    use crate::ir::{ArithmeticOp, CompareOp, Instruction, Operand, Place, Register};
    use crate::samples;

    fn assign(dest: &str, source: Operand) -> Instruction {
        Instruction::Assign {
            dest: Place::from_name(dest),
            source,
        }
    }

    #[test]
    fn parse_every_operator() -> Result<(), ParseError> {
        let program = compile("= a 1 = b a # ## + - * / == != -> a () a @")?;
        assert_eq!(
            program.instructions(),
            &[
                assign("a", Operand::Literal(1)),
                assign("b", Operand::Place(Place::Variable("a".into()))),
                Instruction::Print,
                Instruction::PrintChar,
                Instruction::Arithmetic(ArithmeticOp::Add),
                Instruction::Arithmetic(ArithmeticOp::Subtract),
                Instruction::Arithmetic(ArithmeticOp::Multiply),
                Instruction::Arithmetic(ArithmeticOp::Divide),
                Instruction::Compare(CompareOp::Equal),
                Instruction::Compare(CompareOp::NotEqual),
                Instruction::Jump("a".into()),
                Instruction::Call("a".into()),
                Instruction::Return,
            ]
        );
        assert_eq!(program.position(0), Some(0));
        assert_eq!(program.position(1), Some(3));
        assert_eq!(program.position(2), Some(6));

        Ok(())
    }

    #[test]
    fn parse_registers_are_classified() -> Result<(), ParseError> {
        let program = compile("= param1 return2")?;
        assert_eq!(
            program.get(0),
            Some(&Instruction::Assign {
                dest: Place::Register(Register::Param1),
                source: Operand::Place(Place::Register(Register::Return2)),
            })
        );

        Ok(())
    }

    #[test]
    fn parse_labels_take_next_address() -> Result<(), ParseError> {
        let program = compile(": first : second # : third @ : last")?;
        assert_eq!(program.len(), 2);
        assert_eq!(program.label("first"), Some(0));
        assert_eq!(program.label("second"), Some(0));
        assert_eq!(program.label("third"), Some(1));
        assert_eq!(program.label("last"), Some(2));

        Ok(())
    }

    #[test]
    fn parse_forward_references() -> Result<(), ParseError> {
        let program = compile(": start -> later # : later @")?;
        assert_eq!(program.get(0), Some(&Instruction::Jump("later".into())));
        assert_eq!(program.label("later"), Some(2));

        Ok(())
    }

    #[test]
    fn parse_comments_emit_nothing() -> Result<(), ParseError> {
        let program = compile("/* = a 1 # : nope */ # /* @ */")?;
        assert_eq!(program.instructions(), &[Instruction::Print]);
        assert_eq!(program.label("nope"), None);

        Ok(())
    }

    #[test]
    fn parse_comments_do_not_nest() {
        let err = compile("/* /* inner */ outer */").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::NotAnOperator(4, "outer".into()));
    }

    #[test]
    fn parse_unterminated_comment_runs_to_end() -> Result<(), ParseError> {
        let program = compile("# /* = a 1 @")?;
        assert_eq!(program.instructions(), &[Instruction::Print]);

        Ok(())
    }

    #[test]
    fn parse_empty_source() -> Result<(), ParseError> {
        let program = compile("")?;
        assert!(program.is_empty());
        assert!(program.labels().is_empty());

        Ok(())
    }

    #[test]
    fn parse_line_must_start_with_operator() {
        let err = compile("# loops = 3").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::NotAnOperator(1, "loops".into()));
        let err = compile("42").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::NotAnOperator(0, "42".into()));
    }

    #[test]
    fn parse_unknown_operator() {
        let err = compile("# % @").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::UnknownOperator(1, "%".into()));
        let err = compile("*/").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::UnknownOperator(0, "*/".into()));
    }

    #[test]
    fn parse_assignment_shapes() {
        let err = compile("= 3 loops").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::AssignDestination(1, "3".into()));
        let err = compile("= # loops").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::AssignDestination(1, "#".into()));
        let err = compile("= loops +").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::AssignSource(2, "+".into()));
        let err = compile("= loops 18446744073709551616").unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::InvalidNumber(2, _)));
        let err = compile("= loops").unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnexpectedEnd(2, _)));
    }

    #[test]
    fn parse_targets_must_be_identifiers() {
        let err = compile(": 1").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::LabelName(1, "1".into()));
        let err = compile("-> @").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::JumpTarget(1, "@".into()));
        let err = compile("() 7").unwrap_err();
        assert_eq!(err.kind(), &ParseErrorKind::CallTarget(1, "7".into()));
        let err = compile("# ()").unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnexpectedEnd(2, _)));
        let err = compile(":").unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnexpectedEnd(1, _)));
    }

    #[test]
    fn parse_number_reads_leading_digits() -> Result<(), ParseError> {
        let program = compile("= a 3x = b 42abc7")?;
        assert_eq!(
            program.instructions(),
            &[assign("a", Operand::Literal(3)), assign("b", Operand::Literal(42))]
        );

        Ok(())
    }

    #[test]
    fn parse_redeclared_label_last_wins() -> Result<(), ParseError> {
        let program = compile(": start # : start @")?;
        assert_eq!(program.label("start"), Some(1));
        assert_eq!(program.len(), 2);

        Ok(())
    }

    #[test]
    fn parse_error_reports_byte_offset() {
        let err = compile("= loops +").unwrap_err();
        assert_eq!(err.kind().token_index(), 2);
        assert_eq!(err.offset(), 8);
        assert!(err.to_string().ends_with("(source byte 8)"));
        let err = compile("#\n  oops").unwrap_err();
        assert_eq!(err.offset(), 4);
        let err = compile("= loops").unwrap_err();
        assert_eq!(err.offset(), 7);
        let err = compile(":").unwrap_err();
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn parse_print_num_three_times() -> Result<(), ParseError> {
        let program = compile(samples::PRINT_NUM_THREE_TIMES)?;
        assert_eq!(program.len(), 16);
        assert_eq!(program.label("printnum3times"), Some(1));
        assert_eq!(program.label("loop"), Some(2));
        assert_eq!(program.label("start"), Some(15));
        assert_eq!(program.label("end"), Some(16));
        assert_eq!(program.get(13), Some(&Instruction::Jump("loop".into())));
        assert_eq!(program.get(15), Some(&Instruction::Call("printnum3times".into())));

        Ok(())
    }

    #[test]
    fn parse_fibonacci() -> Result<(), ParseError> {
        let program = compile(samples::FIBONACCI)?;
        assert_eq!(program.len(), 25);
        assert_eq!(program.label("fib"), Some(1));
        assert_eq!(program.label("loop"), Some(5));
        assert_eq!(program.label("start"), Some(24));

        Ok(())
    }
}
