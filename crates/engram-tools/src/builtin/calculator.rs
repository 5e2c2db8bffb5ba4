//! Calculator built-in
//!
//! TigerStyle: Non-throwing evaluation; every failure becomes text the
//! model can react to.
//!
//! Evaluates arithmetic expressions with `+ - * / % ^` (also `**`), unary
//! minus, parentheses, the functions `sqrt`, `abs`, `pow`, and the constants
//! `pi` and `e`. Purely synchronous under the async trait.

use crate::error::ToolResult;
use crate::traits::{Tool, ToolParameter};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Math expression tool
///
/// Single parameter `input`; `expression` is accepted as an alias so the
/// legacy text protocol's free-string binding works unchanged.
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluates math expressions with + - * / % ^, parentheses, sqrt/abs/pow, pi and e"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::string(
            "input",
            "The math expression to evaluate, e.g. \"(15+25)*3\"",
        )]
    }

    async fn run(&self, args: &Map<String, Value>) -> ToolResult<String> {
        let expression = args
            .get("input")
            .or_else(|| args.get("expression"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        if expression.trim().is_empty() {
            return Ok("计算失败: empty expression".to_string());
        }

        match evaluate(expression) {
            Ok(value) => Ok(format_number(value)),
            Err(reason) => Ok(format!("计算失败: {}", reason)),
        }
    }
}

/// Render integers without a trailing ".0"
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Evaluate an expression, returning a reason string on failure
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut parser = Parser::new(expression);
    let value = parser.parse_expression()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(format!(
            "unexpected character '{}' at position {}",
            parser.peek().unwrap_or(' '),
            parser.position
        ));
    }
    if value.is_nan() {
        return Err("result is not a number".to_string());
    }
    if value.is_infinite() {
        return Err("division by zero".to_string());
    }
    Ok(value)
}

/// Recursive-descent parser over the expression grammar:
///
/// ```text
/// expression := term (('+' | '-') term)*
/// term       := power (('*' | '/' | '%') power)*
/// power      := unary (('^' | '**') power)?      -- right associative
/// unary      := '-' unary | atom
/// atom       := number | name | name '(' args ')' | '(' expression ')'
/// ```
struct Parser<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            position: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).map(|&b| b as char)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_expression(&mut self) -> Result<f64, String> {
        let mut value = self.parse_term()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('+') => {
                    self.advance();
                    value += self.parse_term()?;
                }
                Some('-') => {
                    self.advance();
                    value -= self.parse_term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_term(&mut self) -> Result<f64, String> {
        let mut value = self.parse_power()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                // '**' is power, not multiplication
                Some('*') if self.input.get(self.position + 1) != Some(&b'*') => {
                    self.advance();
                    value *= self.parse_power()?;
                }
                Some('/') => {
                    self.advance();
                    let divisor = self.parse_power()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                Some('%') => {
                    self.advance();
                    let divisor = self.parse_power()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value %= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_unary()?;
        self.skip_whitespace();

        let is_power = if self.peek() == Some('^') {
            self.advance();
            true
        } else if self.peek() == Some('*') && self.input.get(self.position + 1) == Some(&b'*') {
            self.advance();
            self.advance();
            true
        } else {
            false
        };

        if is_power {
            let exponent = self.parse_power()?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        if self.peek() == Some('-') {
            self.advance();
            return Ok(-self.parse_unary()?);
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.advance();
                let value = self.parse_expression()?;
                if !self.eat(')') {
                    return Err("missing closing parenthesis".to_string());
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() => self.parse_name(),
            Some(c) => Err(format!(
                "unexpected character '{}' at position {}",
                c, self.position
            )),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_number(&mut self) -> Result<f64, String> {
        let start = self.position;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.advance();
        }
        let text = std::str::from_utf8(&self.input[start..self.position])
            .expect("digits are valid UTF-8");
        text.parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", text))
    }

    fn parse_name(&mut self) -> Result<f64, String> {
        let start = self.position;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        let name = std::str::from_utf8(&self.input[start..self.position])
            .expect("identifier is valid UTF-8");

        match name {
            "pi" => return Ok(std::f64::consts::PI),
            "e" => return Ok(std::f64::consts::E),
            _ => {}
        }

        if !self.eat('(') {
            return Err(format!("unknown constant '{}'", name));
        }

        let mut args = vec![self.parse_expression()?];
        while self.eat(',') {
            args.push(self.parse_expression()?);
        }
        if !self.eat(')') {
            return Err(format!("missing closing parenthesis in call to '{}'", name));
        }

        match (name, args.as_slice()) {
            ("sqrt", [x]) => {
                if *x < 0.0 {
                    Err("square root of a negative number".to_string())
                } else {
                    Ok(x.sqrt())
                }
            }
            ("abs", [x]) => Ok(x.abs()),
            ("pow", [base, exponent]) => Ok(base.powf(*exponent)),
            ("sqrt" | "abs", _) => Err(format!("'{}' takes exactly one argument", name)),
            ("pow", _) => Err("'pow' takes exactly two arguments".to_string()),
            _ => Err(format!("unknown function '{}'", name)),
        }
    }
}
