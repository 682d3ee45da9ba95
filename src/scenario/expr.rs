//! 条件步骤的守卫表达式
//!
//! 语法：
//!
//! ```text
//! expr     := or
//! or       := and ("||" and)*
//! and      := unary ("&&" unary)*
//! unary    := "!" unary | compare
//! compare  := operand (("==" | "!=") operand)?
//! operand  := "(" expr ")" | "${name}" | string | number | true | false | null
//! ```
//!
//! 引号字符串中的 `${...}` 在求值时渲染，例如 `"${id}" == "NOT_FOUND"`。

use crate::variable::{Value, VariableStore};
use crate::{Result, RuloadError};
use std::fmt;

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Eq => write!(f, "=="),
            CmpOp::Ne => write!(f, "!="),
        }
    }
}

/// 表达式语法树
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `${name}`，取变量的类型化值
    Variable(String),
    /// 含占位符的字符串，求值时渲染为字符串
    Template(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        left: Box<Expr>,
        op: CmpOp,
        right: Box<Expr>,
    },
}

impl Expr {
    /// 求值为变量值
    pub fn eval(&self, store: &VariableStore) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => store.get(name).cloned().map_err(|_| {
                RuloadError::Expression(format!("variable '{}' is not defined", name))
            }),
            Expr::Template(template) => store.render(template).map(Value::String),
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(store)?.is_truthy())),
            Expr::And(left, right) => Ok(Value::Bool(
                left.eval(store)?.is_truthy() && right.eval(store)?.is_truthy(),
            )),
            Expr::Or(left, right) => Ok(Value::Bool(
                left.eval(store)?.is_truthy() || right.eval(store)?.is_truthy(),
            )),
            Expr::Compare { left, op, right } => {
                let equal = left.eval(store)?.loosely_eq(&right.eval(store)?);
                Ok(Value::Bool(match op {
                    CmpOp::Eq => equal,
                    CmpOp::Ne => !equal,
                }))
            }
        }
    }
}

/// 编译后的守卫
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    raw: String,
    expr: Expr,
}

impl Guard {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(RuloadError::Expression(format!(
                "unexpected {:?} in '{}'",
                token, input
            )));
        }

        Ok(Self {
            raw: input.trim().to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// 按真值规则求值
    pub fn evaluate(&self, store: &VariableStore) -> Result<bool> {
        Ok(self.expr.eval(store)?.is_truthy())
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Op(CmpOp),
    Variable(String),
    Str(String),
    Number(f64),
    Ident(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |msg: String| RuloadError::Expression(format!("{} in '{}'", msg, input));

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|offset| i + offset)
                    .ok_or_else(|| error("unclosed '${'".to_string()))?;
                let name: String = chars[i + 2..close].iter().collect();
                let name = name.trim();
                if name.is_empty() {
                    return Err(error("empty variable reference".to_string()));
                }
                if name.starts_with("__") {
                    tokens.push(Token::Str(format!("${{{}}}", name)));
                } else {
                    tokens.push(Token::Variable(name.to_string()));
                }
                i = close + 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(error("unterminated string".to_string())),
                        Some('\\') if chars.get(i + 1).is_some() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| error(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(error(format!("unexpected character '{}'", other))),
        }
    }

    if tokens.is_empty() {
        return Err(RuloadError::Expression("empty expression".to_string()));
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let left = self.parse_operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(RuloadError::Expression("expected ')'".to_string())),
                }
            }
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Str(text)) if text.contains("${") => Ok(Expr::Template(text)),
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                other => Err(RuloadError::Expression(format!(
                    "unknown identifier '{}', use ${{{}}} for variables",
                    other, other
                ))),
            },
            Some(token) => Err(RuloadError::Expression(format!(
                "unexpected {:?}",
                token
            ))),
            None => Err(RuloadError::Expression(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{FunctionRegistry, Globals, NOT_FOUND};
    use std::sync::Arc;

    fn store_with(vars: &[(&str, Value)]) -> VariableStore {
        let mut store = VariableStore::new(
            Arc::new(Globals::new()),
            Arc::new(FunctionRegistry::builtin()),
        );
        for (name, value) in vars {
            store.set(*name, value.clone());
        }
        store
    }

    #[test]
    fn test_not_found_guard_true_and_false() {
        let guard = Guard::parse("${created_order_id} == \"NOT_FOUND\"").unwrap();

        let missing = store_with(&[("created_order_id", Value::from(NOT_FOUND))]);
        assert!(guard.evaluate(&missing).unwrap());

        let present = store_with(&[("created_order_id", Value::Number(1234.0))]);
        assert!(!guard.evaluate(&present).unwrap());
    }

    #[test]
    fn test_quoted_template_operand() {
        let guard = Guard::parse(r#""${id}" == "NOT_FOUND""#).unwrap();
        assert!(matches!(
            guard.expr(),
            Expr::Compare { left, .. } if matches!(**left, Expr::Template(_))
        ));
        let store = store_with(&[("id", Value::from(NOT_FOUND))]);
        assert!(guard.evaluate(&store).unwrap());
    }

    #[test]
    fn test_number_compares_with_string() {
        let guard = Guard::parse("${status} != 200").unwrap();
        assert!(!guard.evaluate(&store_with(&[("status", Value::from("200"))])).unwrap());
        assert!(guard.evaluate(&store_with(&[("status", Value::from("404"))])).unwrap());
    }

    #[test]
    fn test_logical_operators_and_precedence() {
        let store = store_with(&[
            ("a", Value::Bool(true)),
            ("b", Value::Bool(false)),
            ("c", Value::Bool(true)),
        ]);
        // && 优先于 ||
        assert!(Guard::parse("${b} && ${a} || ${c}").unwrap().evaluate(&store).unwrap());
        assert!(!Guard::parse("${b} && (${a} || ${c})").unwrap().evaluate(&store).unwrap());
        assert!(Guard::parse("!${b}").unwrap().evaluate(&store).unwrap());
        assert!(Guard::parse("!(${a} == ${b})").unwrap().evaluate(&store).unwrap());
    }

    #[test]
    fn test_truthiness() {
        let store = store_with(&[("empty", Value::from("")), ("name", Value::from("x"))]);
        assert!(!Guard::parse("${empty}").unwrap().evaluate(&store).unwrap());
        assert!(Guard::parse("${name}").unwrap().evaluate(&store).unwrap());
        assert!(!Guard::parse("null").unwrap().evaluate(&store).unwrap());
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let guard = Guard::parse("${missing} == 1").unwrap();
        let err = guard.evaluate(&store_with(&[])).unwrap_err();
        assert!(matches!(err, RuloadError::Expression(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Guard::parse("").is_err());
        assert!(Guard::parse("${a} ==").is_err());
        assert!(Guard::parse("(${a} == 1").is_err());
        assert!(Guard::parse("\"open").is_err());
        assert!(Guard::parse("id == 1").is_err());
        assert!(Guard::parse("${a} = 1").is_err());
        assert!(Guard::parse("${a} == 1 2").is_err());
    }

    #[test]
    fn test_display_keeps_source() {
        let guard = Guard::parse("  ${a} == 1 ").unwrap();
        assert_eq!(guard.to_string(), "${a} == 1");
    }
}
