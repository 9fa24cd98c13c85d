//! Expression engine: tokenizer, parser, compiler and bytecode VM.
//!
//! Expressions are compiled once into a flat opcode sequence and evaluated
//! many times per tick against cells addressed by slot index. Binding a
//! name therefore means resolving it to a [`CellRef`] at compile time;
//! the cell addresses stay valid until the owning store is reset.

use crate::traits::Scalar;
use std::collections::HashMap;
use thiserror::Error;

/// Step size for the five-point-stencil derivative probe.
const DERIVATIVE_STEP: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected character `{0}` in expression")]
    UnexpectedChar(char),
    #[error("malformed number literal `{0}`")]
    BadNumber(String),
    #[error("expression is empty")]
    Empty,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected an operand")]
    ExpectedOperand,
    #[error("expected `)` to close `(`")]
    UnbalancedParen,
    #[error("unexpected trailing input after expression")]
    TrailingInput,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("unknown symbol `{0}` in expression")]
    UnknownSymbol(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("function `{name}` expects {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Storage cell a symbol resolves to at compile time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellRef {
    /// Input slot (pushed or named variable) at a fixed index.
    Input(usize),
    /// Pulled cell at a fixed index.
    Pulled(usize),
    /// The shared time cell.
    Time,
    /// A constant, folded into the bytecode as a literal.
    Const(f64),
}

/// OpCodes for the stack-based expression VM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a literal (or folded constant) onto the stack.
    LoadConst(f64),
    /// Pushes the value of an input slot (by index).
    LoadInput(usize),
    /// Pushes the value of a pulled cell (by index).
    LoadPulled(usize),
    /// Pushes the current time.
    LoadTime,
    Add,
    Sub,
    Mul,
    Div,
    /// Pops (b, a), pushes a ^ b.
    Pow,
    /// Pops (b, a), pushes floating-point a mod b.
    Rem,
    Neg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Sqrt,
    Exp,
    Ln,
    Log2,
    Log10,
    Abs,
    /// Pops a, pushes -1, 0 or 1 by sign.
    Sign,
    /// Pops n values, pushes their minimum.
    MinN(usize),
    /// Pops n values, pushes their maximum.
    MaxN(usize),
    /// Pops n values, pushes their sum.
    SumN(usize),
    /// Pops n values, pushes their mean.
    AvgN(usize),
}

/// A compiled sequence of operations. Only the [`Compiler`] constructs
/// these, which keeps the stack discipline of `ops` well-formed by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Stack-based VM for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `code`: instructions to run.
/// - `inputs`: input slot values (read-only).
/// - `pulled`: pulled cell values (read-only).
/// - `time`: the time cell.
/// - `stack`: a mutable buffer for intermediate computations, reused
///   across calls to avoid allocation.
pub struct Vm;

impl Vm {
    pub fn execute<T: Scalar>(
        code: &Bytecode,
        inputs: &[T],
        pulled: &[T],
        time: T,
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &code.ops {
            match op {
                OpCode::LoadConst(value) => {
                    stack.push(T::from_f64(*value).unwrap());
                }
                OpCode::LoadInput(index) => {
                    stack.push(inputs[*index]);
                }
                OpCode::LoadPulled(index) => {
                    stack.push(pulled[*index]);
                }
                OpCode::LoadTime => {
                    stack.push(time);
                }
                OpCode::Add => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a.powf(b));
                }
                OpCode::Rem => {
                    let b = stack.pop().unwrap();
                    let a = stack.pop().unwrap();
                    stack.push(a % b);
                }
                OpCode::Neg => {
                    let a = stack.pop().unwrap();
                    stack.push(-a);
                }
                OpCode::Sin => Self::apply_unary(stack, T::sin),
                OpCode::Cos => Self::apply_unary(stack, T::cos),
                OpCode::Tan => Self::apply_unary(stack, T::tan),
                OpCode::Asin => Self::apply_unary(stack, T::asin),
                OpCode::Acos => Self::apply_unary(stack, T::acos),
                OpCode::Atan => Self::apply_unary(stack, T::atan),
                OpCode::Sinh => Self::apply_unary(stack, T::sinh),
                OpCode::Cosh => Self::apply_unary(stack, T::cosh),
                OpCode::Tanh => Self::apply_unary(stack, T::tanh),
                OpCode::Sqrt => Self::apply_unary(stack, T::sqrt),
                OpCode::Exp => Self::apply_unary(stack, T::exp),
                OpCode::Ln => Self::apply_unary(stack, T::ln),
                OpCode::Log2 => Self::apply_unary(stack, T::log2),
                OpCode::Log10 => Self::apply_unary(stack, T::log10),
                OpCode::Abs => Self::apply_unary(stack, T::abs),
                OpCode::Sign => {
                    let a = stack.pop().unwrap();
                    let sign = if a > T::zero() {
                        T::one()
                    } else if a < T::zero() {
                        -T::one()
                    } else {
                        T::zero()
                    };
                    stack.push(sign);
                }
                OpCode::MinN(n) => Self::fold(stack, *n, T::min),
                OpCode::MaxN(n) => Self::fold(stack, *n, T::max),
                OpCode::SumN(n) => Self::fold(stack, *n, |a, b| a + b),
                OpCode::AvgN(n) => {
                    let count = T::from_usize(*n).unwrap();
                    Self::fold(stack, *n, |a, b| a + b);
                    let sum = stack.pop().unwrap();
                    stack.push(sum / count);
                }
            }
        }

        stack.pop().unwrap_or_else(T::zero)
    }

    fn apply_unary<T: Scalar>(stack: &mut Vec<T>, op: impl Fn(T) -> T) {
        let a = stack.pop().unwrap();
        stack.push(op(a));
    }

    fn fold<T: Scalar>(stack: &mut Vec<T>, n: usize, op: impl Fn(T, T) -> T) {
        let mut acc = stack.pop().unwrap();
        for _ in 1..n {
            let value = stack.pop().unwrap();
            acc = op(acc, value);
        }
        stack.push(acc);
    }
}

/// Five-point-stencil numerical derivative of a compiled expression with
/// respect to one cell:
///
/// `(-f(x+2h) + 8 f(x+h) - 8 f(x-h) + f(x-2h)) / (12 h)`
///
/// The probed cell is restored afterward; no other cell is touched.
/// Probing a folded constant (or an out-of-range cell) yields 0.0.
pub fn differentiate(
    code: &Bytecode,
    inputs: &mut [f64],
    pulled: &mut [f64],
    time: &mut f64,
    cell: CellRef,
    stack: &mut Vec<f64>,
) -> f64 {
    let origin = match cell {
        CellRef::Input(index) => inputs.get(index).copied(),
        CellRef::Pulled(index) => pulled.get(index).copied(),
        CellRef::Time => Some(*time),
        CellRef::Const(_) => None,
    };
    let Some(origin) = origin else {
        return 0.0;
    };

    let h = DERIVATIVE_STEP;
    let offsets = [2.0, 1.0, -1.0, -2.0];
    let mut samples = [0.0; 4];
    for (sample, offset) in samples.iter_mut().zip(offsets) {
        set_cell(inputs, pulled, time, cell, origin + offset * h);
        *sample = Vm::execute(code, inputs, pulled, *time, stack);
    }
    set_cell(inputs, pulled, time, cell, origin);

    (-samples[0] + 8.0 * samples[1] - 8.0 * samples[2] + samples[3]) / (12.0 * h)
}

fn set_cell(inputs: &mut [f64], pulled: &mut [f64], time: &mut f64, cell: CellRef, value: f64) {
    match cell {
        CellRef::Input(index) => inputs[index] = value,
        CellRef::Pulled(index) => pulled[index] = value,
        CellRef::Time => *time = value,
        CellRef::Const(_) => {}
    }
}

// --- AST & Parser ---

/// Binary operators, in increasing precedence: `+ -`, `* / %`, `^`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

/// Abstract syntax tree for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Symbol(String),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Negate(Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Comma,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent suffix, only when followed by digits: `6.022e23`,
            // `1e-4`. A bare trailing `e` stays an identifier so the
            // predefined constant still works.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ParseError::BadNumber(text))?;
            tokens.push(Token::Number(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '%' => Token::Percent,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(ParseError::UnexpectedChar(other)),
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(ParseError::TrailingInput);
    }
    Ok(expr)
}

/// Scans an expression for every symbol it references, in first-appearance
/// order. Function-call names are excluded; only operand names are
/// reported, so callers can allocate slots before the final compile.
pub fn scan_symbols(input: &str) -> Result<Vec<String>, ParseError> {
    let tokens = tokenize(input)?;
    let mut symbols: Vec<String> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if let Token::Ident(name) = token {
            let is_call = matches!(tokens.get(i + 1), Some(Token::LParen));
            if !is_call && !symbols.iter().any(|seen| seen == name) {
                symbols.push(name.clone());
            }
        }
    }
    Ok(symbols)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.power()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.power()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // `^` is right-associative: 2^3^2 == 2^(3^2).
    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.unary()?;
        if let Some(Token::Caret) = self.peek() {
            self.advance();
            let exponent = self.power()?;
            return Ok(Expr::Binary(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.advance();
                    let args = self.call_args()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(ParseError::UnbalancedParen),
                }
            }
            Some(_) => Err(ParseError::ExpectedOperand),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.advance() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => return Ok(args),
                Some(_) => return Err(ParseError::UnbalancedParen),
                None => return Err(ParseError::UnexpectedEnd),
            }
        }
    }
}

// --- Compiler ---

/// Compiles an AST into [`Bytecode`], resolving symbols through a binding
/// map built by the caller. Constants are folded into literals here, so
/// re-defining a constant only takes effect at the next compile.
pub struct Compiler<'a> {
    bindings: &'a HashMap<String, CellRef>,
}

impl<'a> Compiler<'a> {
    pub fn new(bindings: &'a HashMap<String, CellRef>) -> Self {
        Self { bindings }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, CompileError> {
        let mut ops = Vec::new();
        self.emit(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn emit(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), CompileError> {
        match expr {
            Expr::Number(value) => ops.push(OpCode::LoadConst(*value)),
            Expr::Symbol(name) => match self.bindings.get(name) {
                Some(CellRef::Input(index)) => ops.push(OpCode::LoadInput(*index)),
                Some(CellRef::Pulled(index)) => ops.push(OpCode::LoadPulled(*index)),
                Some(CellRef::Time) => ops.push(OpCode::LoadTime),
                Some(CellRef::Const(value)) => ops.push(OpCode::LoadConst(*value)),
                None => return Err(CompileError::UnknownSymbol(name.clone())),
            },
            Expr::Negate(inner) => {
                self.emit(inner, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Binary(left, op, right) => {
                self.emit(left, ops)?;
                self.emit(right, ops)?;
                ops.push(match op {
                    BinOp::Add => OpCode::Add,
                    BinOp::Sub => OpCode::Sub,
                    BinOp::Mul => OpCode::Mul,
                    BinOp::Div => OpCode::Div,
                    BinOp::Rem => OpCode::Rem,
                    BinOp::Pow => OpCode::Pow,
                });
            }
            Expr::Call(name, args) => {
                for arg in args {
                    self.emit(arg, ops)?;
                }
                ops.push(Self::function_opcode(name, args.len())?);
            }
        }
        Ok(())
    }

    fn function_opcode(name: &str, argc: usize) -> Result<OpCode, CompileError> {
        let unary = |op: OpCode| {
            if argc == 1 {
                Ok(op)
            } else {
                Err(CompileError::WrongArity {
                    name: name.to_string(),
                    expected: 1,
                    got: argc,
                })
            }
        };
        match name {
            "sin" => unary(OpCode::Sin),
            "cos" => unary(OpCode::Cos),
            "tan" => unary(OpCode::Tan),
            "asin" => unary(OpCode::Asin),
            "acos" => unary(OpCode::Acos),
            "atan" => unary(OpCode::Atan),
            "sinh" => unary(OpCode::Sinh),
            "cosh" => unary(OpCode::Cosh),
            "tanh" => unary(OpCode::Tanh),
            "sqrt" => unary(OpCode::Sqrt),
            "exp" => unary(OpCode::Exp),
            "ln" => unary(OpCode::Ln),
            "log2" => unary(OpCode::Log2),
            // `log` means base 10, matching the documented function table.
            "log" | "log10" => unary(OpCode::Log10),
            "abs" => unary(OpCode::Abs),
            "sign" => unary(OpCode::Sign),
            "pow" => {
                if argc == 2 {
                    Ok(OpCode::Pow)
                } else {
                    Err(CompileError::WrongArity {
                        name: name.to_string(),
                        expected: 2,
                        got: argc,
                    })
                }
            }
            "min" | "max" | "sum" | "avg" => {
                if argc == 0 {
                    return Err(CompileError::WrongArity {
                        name: name.to_string(),
                        expected: 1,
                        got: 0,
                    });
                }
                Ok(match name {
                    "min" => OpCode::MinN(argc),
                    "max" => OpCode::MaxN(argc),
                    "sum" => OpCode::SumN(argc),
                    _ => OpCode::AvgN(argc),
                })
            }
            _ => Err(CompileError::UnknownFunction(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(entries: &[(&str, CellRef)]) -> HashMap<String, CellRef> {
        entries
            .iter()
            .map(|(name, cell)| (name.to_string(), *cell))
            .collect()
    }

    fn eval(
        text: &str,
        bindings: &HashMap<String, CellRef>,
        inputs: &[f64],
        pulled: &[f64],
        time: f64,
    ) -> f64 {
        let expr = parse(text).expect("parse");
        let code = Compiler::new(bindings).compile(&expr).expect("compile");
        let mut stack = Vec::new();
        Vm::execute(&code, inputs, pulled, time, &mut stack)
    }

    #[test]
    fn arithmetic_precedence() {
        let bindings = bind(&[]);
        assert_eq!(eval("2 + 3 * 4", &bindings, &[], &[], 0.0), 14.0);
        assert_eq!(eval("(2 + 3) * 4", &bindings, &[], &[], 0.0), 20.0);
        assert_eq!(eval("2 * 3 ^ 2", &bindings, &[], &[], 0.0), 18.0);
        assert_eq!(eval("7 % 4", &bindings, &[], &[], 0.0), 3.0);
        assert_eq!(eval("10 - 2 - 3", &bindings, &[], &[], 0.0), 5.0);
    }

    #[test]
    fn power_is_right_associative() {
        let bindings = bind(&[]);
        assert_eq!(eval("2 ^ 3 ^ 2", &bindings, &[], &[], 0.0), 512.0);
    }

    #[test]
    fn scientific_notation_literals() {
        let bindings = bind(&[("e", CellRef::Const(std::f64::consts::E))]);
        assert_eq!(eval("2e3", &bindings, &[], &[], 0.0), 2000.0);
        assert!((eval("1e-4", &bindings, &[], &[], 0.0) - 1e-4).abs() < 1e-18);
        // A bare `e` is still the constant, not a dangling exponent.
        assert!((eval("2 * e", &bindings, &[], &[], 0.0) - 2.0 * std::f64::consts::E).abs() < 1e-12);
    }

    #[test]
    fn symbols_resolve_to_cells() {
        let bindings = bind(&[
            ("x0", CellRef::Input(0)),
            ("x1", CellRef::Input(1)),
            ("y0", CellRef::Pulled(0)),
            ("k", CellRef::Const(10.0)),
        ]);
        let value = eval("x0 + x1 * y0 + k + t", &bindings, &[2.0, 3.0], &[4.0], 1.5);
        assert_eq!(value, 2.0 + 3.0 * 4.0 + 10.0 + 1.5);
    }

    #[test]
    fn unary_functions_evaluate() {
        let bindings = bind(&[("x0", CellRef::Input(0))]);
        assert!((eval("sin(x0)", &bindings, &[1.0], &[], 0.0) - 1.0_f64.sin()).abs() < 1e-15);
        assert!((eval("exp(x0)", &bindings, &[2.0], &[], 0.0) - 2.0_f64.exp()).abs() < 1e-12);
        assert!((eval("sqrt(x0)", &bindings, &[9.0], &[], 0.0) - 3.0).abs() < 1e-15);
        assert!((eval("tanh(x0)", &bindings, &[0.5], &[], 0.0) - 0.5_f64.tanh()).abs() < 1e-15);
        assert_eq!(eval("abs(-x0)", &bindings, &[3.0], &[], 0.0), 3.0);
    }

    #[test]
    fn sign_is_three_valued() {
        let bindings = bind(&[("x0", CellRef::Input(0))]);
        assert_eq!(eval("sign(x0)", &bindings, &[-7.0], &[], 0.0), -1.0);
        assert_eq!(eval("sign(x0)", &bindings, &[0.0], &[], 0.0), 0.0);
        assert_eq!(eval("sign(x0)", &bindings, &[0.3], &[], 0.0), 1.0);
    }

    #[test]
    fn variadic_functions_evaluate() {
        let bindings = bind(&[("x0", CellRef::Input(0))]);
        assert_eq!(eval("min(3, x0, 2)", &bindings, &[5.0], &[], 0.0), 2.0);
        assert_eq!(eval("max(3, x0, 2)", &bindings, &[5.0], &[], 0.0), 5.0);
        assert_eq!(eval("sum(1, 2, 3, 4)", &bindings, &[], &[], 0.0), 10.0);
        assert_eq!(eval("avg(1, 2, 3, 4)", &bindings, &[], &[], 0.0), 2.5);
        assert_eq!(eval("pow(2, 10)", &bindings, &[], &[], 0.0), 1024.0);
    }

    #[test]
    fn parse_errors_are_reported() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("1 +"), Err(ParseError::UnexpectedEnd));
        assert_eq!(parse("(1 + 2"), Err(ParseError::UnbalancedParen));
        assert_eq!(parse("* 3"), Err(ParseError::ExpectedOperand));
        assert_eq!(parse("1 2"), Err(ParseError::TrailingInput));
        assert_eq!(parse("x0 # 1"), Err(ParseError::UnexpectedChar('#')));
    }

    #[test]
    fn compile_errors_are_reported() {
        let bindings = bind(&[]);
        let compiler = Compiler::new(&bindings);

        let unknown = parse("nope").unwrap();
        assert_eq!(
            compiler.compile(&unknown),
            Err(CompileError::UnknownSymbol("nope".to_string()))
        );

        let unknown_fn = parse("frob(1)").unwrap();
        assert_eq!(
            compiler.compile(&unknown_fn),
            Err(CompileError::UnknownFunction("frob".to_string()))
        );

        let arity = parse("sin(1, 2)").unwrap();
        assert_eq!(
            compiler.compile(&arity),
            Err(CompileError::WrongArity {
                name: "sin".to_string(),
                expected: 1,
                got: 2,
            })
        );
    }

    #[test]
    fn scan_reports_operand_symbols_in_order() {
        let symbols = scan_symbols("sin(x0) + y1 * foo + x0 - t").unwrap();
        assert_eq!(symbols, vec!["x0", "y1", "foo", "t"]);
    }

    #[test]
    fn stencil_derivative_of_square() {
        let bindings = bind(&[("x0", CellRef::Input(0))]);
        let expr = parse("x0 * x0").unwrap();
        let code = Compiler::new(&bindings).compile(&expr).unwrap();

        let mut inputs = [3.0];
        let mut pulled: [f64; 0] = [];
        let mut time = 0.0;
        let mut stack = Vec::new();
        let d = differentiate(
            &code,
            &mut inputs,
            &mut pulled,
            &mut time,
            CellRef::Input(0),
            &mut stack,
        );
        assert!((d - 6.0).abs() < 1e-6);
        // The probed cell is restored.
        assert_eq!(inputs[0], 3.0);
    }

    #[test]
    fn stencil_derivative_with_respect_to_time() {
        let bindings = bind(&[("t", CellRef::Time)]);
        let expr = parse("3 * t").unwrap();
        let code = Compiler::new(&bindings).compile(&expr).unwrap();

        let mut inputs: [f64; 0] = [];
        let mut pulled: [f64; 0] = [];
        let mut time = 2.0;
        let mut stack = Vec::new();
        let d = differentiate(
            &code,
            &mut inputs,
            &mut pulled,
            &mut time,
            CellRef::Time,
            &mut stack,
        );
        assert!((d - 3.0).abs() < 1e-8);
        assert_eq!(time, 2.0);
    }

    #[test]
    fn derivative_of_constant_cell_is_zero() {
        let bindings = bind(&[("k", CellRef::Const(5.0))]);
        let expr = parse("k * k").unwrap();
        let code = Compiler::new(&bindings).compile(&expr).unwrap();
        let mut stack = Vec::new();
        let d = differentiate(
            &code,
            &mut [],
            &mut [],
            &mut 0.0,
            CellRef::Const(5.0),
            &mut stack,
        );
        assert_eq!(d, 0.0);
    }
}
