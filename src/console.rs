//! The embedded console entered with `:` or the `console` command.
//!
//! The shell only relies on the [`Console`] capability; [`Calculator`] is the
//! implementation shipped with the crate, a small numeric language with
//! variables, functions and multi-line statements.

use pest::Parser;
use pest::error::LineColLocation;
use pest_derive::Parser;
use std::collections::BTreeMap;
use std::io::Write;

/// An interpreter session fed one line at a time.
pub trait Console {
    /// Feed one line of input, writing any result to `out`.
    ///
    /// Returns `true` while the statement is incomplete and more lines are
    /// needed. Evaluation errors are reported to `out`; only I/O failures are
    /// returned as errors.
    fn push(&mut self, line: &str, out: &mut dyn Write) -> anyhow::Result<bool>;

    /// Throw away a partially entered statement.
    fn reset(&mut self);

    /// Names in the console namespace starting with `fragment`.
    fn complete(&self, _fragment: &str) -> Vec<String> {
        Vec::new()
    }
}

const FUNCTIONS: &[&str] = &[
    "abs", "ceil", "cos", "exp", "floor", "ln", "log10", "max", "min", "round", "sin", "sqrt",
    "tan",
];

const CONSTANTS: &[&str] = &["e", "pi"];

#[derive(Parser)]
#[grammar = "calculator.pest"]
struct StatementParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;
type Pairs<'i> = pest::iterators::Pairs<'i, Rule>;

/// Errors raised while evaluating a statement.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("name {0:?} is not defined")]
    UndefinedName(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("cannot assign to {0:?}")]
    ReadOnly(String),
    #[error("malformed {0}")]
    Malformed(&'static str),
}

fn syntax_error(err: &pest::error::Error<Rule>) -> EvalError {
    let column = match err.line_col {
        LineColLocation::Pos((_, column)) | LineColLocation::Span((_, column), _) => column,
    };
    let err = err.clone().renamed_rules(|rule| {
        match rule {
            Rule::EOI => "end of input",
            Rule::add_op => "'+' or '-'",
            Rule::mul_op => "'*', '/' or '%'",
            Rule::number => "number",
            Rule::ident => "name",
            _ => "expression",
        }
        .to_string()
    });
    EvalError::Syntax {
        column,
        message: err.variant.message().into_owned(),
    }
}

fn next<'i>(pairs: &mut Pairs<'i>, what: &'static str) -> Result<Pair<'i>, EvalError> {
    pairs.next().ok_or(EvalError::Malformed(what))
}

fn evaluate(pair: Pair<'_>, vars: &BTreeMap<String, f64>) -> Result<f64, EvalError> {
    match pair.as_rule() {
        Rule::expression | Rule::term => {
            let mut inner = pair.into_inner();
            let mut value = evaluate(next(&mut inner, "operand")?, vars)?;
            while let Some(op) = inner.next() {
                let rhs = evaluate(next(&mut inner, "operand")?, vars)?;
                value = match op.as_str() {
                    "+" => value + rhs,
                    "-" => value - rhs,
                    "*" => value * rhs,
                    "/" => value / rhs,
                    _ => value % rhs,
                };
            }
            Ok(value)
        }
        Rule::unary => {
            let mut inner = pair.into_inner();
            let first = next(&mut inner, "unary expression")?;
            if first.as_rule() != Rule::sign {
                return evaluate(first, vars);
            }
            let value = evaluate(next(&mut inner, "operand")?, vars)?;
            Ok(if first.as_str() == "-" { -value } else { value })
        }
        Rule::power => {
            let mut inner = pair.into_inner();
            let base = evaluate(next(&mut inner, "operand")?, vars)?;
            match inner.next() {
                Some(exponent) => Ok(base.powf(evaluate(exponent, vars)?)),
                None => Ok(base),
            }
        }
        Rule::number => pair
            .as_str()
            .parse()
            .map_err(|_| EvalError::InvalidNumber(pair.as_str().to_string())),
        Rule::ident => lookup(vars, pair.as_str()),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = next(&mut inner, "call")?.as_str();
            let args = inner
                .map(|arg| evaluate(arg, vars))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &args)
        }
        _ => Err(EvalError::Malformed("expression")),
    }
}

fn lookup(vars: &BTreeMap<String, f64>, name: &str) -> Result<f64, EvalError> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        _ => vars
            .get(name)
            .copied()
            .ok_or_else(|| EvalError::UndefinedName(name.to_string())),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let unary = |f: fn(f64) -> f64| match args {
        [x] => Ok(f(*x)),
        _ => Err(EvalError::Arity {
            name: name.to_string(),
            expected: "1",
            got: args.len(),
        }),
    };
    match name {
        "abs" => unary(f64::abs),
        "ceil" => unary(f64::ceil),
        "cos" => unary(f64::cos),
        "exp" => unary(f64::exp),
        "floor" => unary(f64::floor),
        "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "round" => unary(f64::round),
        "sin" => unary(f64::sin),
        "sqrt" => unary(f64::sqrt),
        "tan" => unary(f64::tan),
        "min" | "max" => {
            let pick: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
            args.iter()
                .copied()
                .reduce(pick)
                .ok_or_else(|| EvalError::Arity {
                    name: name.to_string(),
                    expected: "at least 1",
                    got: 0,
                })
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

/// Numeric console with persistent variables.
///
/// A statement is `name = expression` or a bare expression, whose value is
/// printed and kept in `_`. A statement continues on the next line while
/// parentheses are open or the line ends with `\`; an empty line evaluates
/// whatever has been entered so far.
#[derive(Debug, Default)]
pub struct Calculator {
    vars: BTreeMap<String, f64>,
    pending: String,
}

impl Calculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value in the console namespace.
    pub fn define(&mut self, name: impl Into<String>, value: f64) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }

    /// Run one complete statement, returning the value to print, if any.
    pub fn eval(&mut self, statement: &str) -> Result<Option<f64>, EvalError> {
        let mut pairs =
            StatementParser::parse(Rule::statement, statement).map_err(|err| syntax_error(&err))?;
        let statement = next(&mut pairs, "statement")?;
        let Some(body) = statement.into_inner().find(|pair| pair.as_rule() != Rule::EOI) else {
            return Ok(None);
        };

        if body.as_rule() == Rule::assignment {
            let mut inner = body.into_inner();
            let name = next(&mut inner, "assignment")?.as_str();
            if CONSTANTS.contains(&name) || FUNCTIONS.contains(&name) {
                return Err(EvalError::ReadOnly(name.to_string()));
            }
            let value = evaluate(next(&mut inner, "assignment")?, &self.vars)?;
            self.vars.insert(name.to_string(), value);
            return Ok(None);
        }
        let value = evaluate(body, &self.vars)?;
        self.vars.insert("_".to_string(), value);
        Ok(Some(value))
    }

    fn open_parens(text: &str) -> i64 {
        text.chars().fold(0, |depth, c| match c {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        })
    }
}

impl Console for Calculator {
    fn push(&mut self, line: &str, out: &mut dyn Write) -> anyhow::Result<bool> {
        let forced = !self.pending.is_empty() && line.trim().is_empty();
        if !forced {
            if let Some(head) = line.trim_end().strip_suffix('\\') {
                self.pending.push_str(head);
                self.pending.push(' ');
                return Ok(true);
            }
            self.pending.push_str(line);
            if Self::open_parens(&self.pending) > 0 {
                self.pending.push(' ');
                return Ok(true);
            }
        }

        let statement = std::mem::take(&mut self.pending);
        match self.eval(&statement) {
            Ok(Some(value)) => writeln!(out, "{value}")?,
            Ok(None) => {}
            Err(err) => writeln!(out, "Error: {err}")?,
        }
        Ok(false)
    }

    fn reset(&mut self) {
        self.pending.clear();
    }

    /// Completes the name at the end of `fragment`, keeping whatever
    /// expression text precedes it: `sqrt(en` offers `sqrt(energy`.
    fn complete(&self, fragment: &str) -> Vec<String> {
        let start = fragment
            .char_indices()
            .rev()
            .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let (head, partial) = fragment.split_at(start);

        let mut names: Vec<String> = self
            .vars
            .keys()
            .map(String::as_str)
            .chain(CONSTANTS.iter().copied())
            .filter(|name| name.starts_with(partial))
            .map(|name| format!("{head}{name}"))
            .collect();
        names.sort();
        names.extend(
            FUNCTIONS
                .iter()
                .filter(|name| name.starts_with(partial))
                .map(|name| format!("{head}{name}(")),
        );
        names
    }
}
