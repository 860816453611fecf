//! The `if` expression language (spec §4.3, §9): "a small side-effect-free
//! expression language returning a boolean (arithmetic, member access,
//! comparisons; no I/O)." A non-boolean result is an error, never coerced
//! to truthy (spec §9's Open Question, resolved: reject).
//!
//! This is a conservative reimplementation over `serde_json::Value`, as
//! spec §9 explicitly sanctions ("A conservative reimplementation is an
//! expression evaluator over the unstructured document tree"); no crate in
//! the surrounding corpus offers a CEL-like evaluator, so this is hand
//! rolled rather than borrowed.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExprError {
    #[error("syntax error at position {0}: {1}")]
    Syntax(usize, String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("expression did not evaluate to a boolean")]
    NotBoolean,
    #[error("type error: {0}")]
    Type(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Dot,
    LParen,
    RParen,
    Op(&'static str),
    Eof,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    fn tokens(mut self) -> Result<Vec<(usize, Token)>, ExprError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            let start = self.pos;
            if self.pos >= self.src.len() {
                out.push((start, Token::Eof));
                break;
            }
            let rest = &self.src[self.pos..];
            let c = rest.chars().next().unwrap();
            if c == '(' {
                self.pos += 1;
                out.push((start, Token::LParen));
            } else if c == ')' {
                self.pos += 1;
                out.push((start, Token::RParen));
            } else if c == '.' {
                self.pos += 1;
                out.push((start, Token::Dot));
            } else if c == '"' || c == '\'' {
                out.push((start, self.lex_string(c)?));
            } else if c.is_ascii_digit() {
                out.push((start, self.lex_number()));
            } else if c.is_alphabetic() || c == '_' {
                out.push((start, self.lex_ident()));
            } else if let Some(op) = self.lex_op() {
                out.push((start, op));
            } else {
                return Err(ExprError::Syntax(start, format!("unexpected character '{c}'")));
            }
        }
        Ok(out)
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos..].starts_with(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, ExprError> {
        let start = self.pos;
        self.pos += 1;
        let rest = &self.src[self.pos..];
        match rest.find(quote) {
            Some(end) => {
                let s = rest[..end].to_string();
                self.pos += end + 1;
                Ok(Token::Str(s))
            }
            None => Err(ExprError::Syntax(start, "unterminated string".into())),
        }
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        while self.pos < self.src.len()
            && self.src[self.pos..].starts_with(|c: char| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        Token::Number(self.src[start..self.pos].parse().unwrap_or(0.0))
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while self.pos < self.src.len()
            && self.src[self.pos..].starts_with(|c: char| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        Token::Ident(self.src[start..self.pos].to_string())
    }

    fn lex_op(&mut self) -> Option<Token> {
        let two: [(&str, &str); 6] = [
            ("==", "=="),
            ("!=", "!="),
            ("<=", "<="),
            (">=", ">="),
            ("&&", "&&"),
            ("||", "||"),
        ];
        let rest = &self.src[self.pos..];
        for (pat, tok) in two {
            if rest.starts_with(pat) {
                self.pos += pat.len();
                return Some(Token::Op(tok));
            }
        }
        let one: [(char, &str); 7] = [
            ('<', "<"),
            ('>', ">"),
            ('!', "!"),
            ('+', "+"),
            ('-', "-"),
            ('*', "*"),
            ('/', "/"),
        ];
        let c = rest.chars().next()?;
        for (pat, tok) in one {
            if c == pat {
                self.pos += 1;
                return Some(Token::Op(tok));
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Var(String),
    Field(Box<Expr>, String),
    Num(f64),
    Str(String),
    Bin(&'static str, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

struct Parser {
    toks: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.toks[self.pos].1
    }

    fn pos_at(&self) -> usize {
        self.toks[self.pos].0
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].1.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_op(&mut self, op: &'static str) -> Result<(), ExprError> {
        if self.peek() == &Token::Op(op) {
            self.bump();
            Ok(())
        } else {
            Err(ExprError::Syntax(self.pos_at(), format!("expected '{op}'")))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == &Token::Op("||") {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Bin("||", Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_cmp()?;
        while self.peek() == &Token::Op("&&") {
            self.bump();
            let rhs = self.parse_cmp()?;
            lhs = Expr::Bin("&&", Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_additive()?;
        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if self.peek() == &Token::Op(op) {
                self.bump();
                let rhs = self.parse_additive()?;
                return Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)));
            }
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => "+",
                Token::Op("-") => "-",
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Op("*") => "*",
                Token::Op("/") => "/",
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == &Token::Op("!") {
            self.bump();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut base = self.parse_primary()?;
        loop {
            if self.peek() == &Token::Dot {
                self.bump();
                match self.bump() {
                    Token::Ident(name) => base = Expr::Field(Box::new(base), name),
                    _ => return Err(ExprError::Syntax(self.pos_at(), "expected field name after '.'".into())),
                }
            } else {
                break;
            }
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.bump() {
            Token::Ident(name) => Ok(Expr::Var(name)),
            Token::Number(n) => Ok(Expr::Num(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::LParen => {
                let inner = self.parse_or()?;
                if self.peek() == &Token::RParen {
                    self.bump();
                    Ok(inner)
                } else {
                    Err(ExprError::Syntax(self.pos_at(), "expected ')'".into()))
                }
            }
            other => Err(ExprError::Syntax(self.pos_at(), format!("unexpected token {other:?}"))),
        }
    }
}

fn parse(src: &str) -> Result<Expr, ExprError> {
    let toks = Lexer::new(src).tokens()?;
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.peek() != &Token::Eof {
        return Err(ExprError::Syntax(parser.pos_at(), "trailing tokens".into()));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Val {
    Bool(bool),
    Num(f64),
    Str(String),
    Json(Value),
    Null,
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Bool(b) => write!(f, "{b}"),
            Val::Num(n) => write!(f, "{n}"),
            Val::Str(s) => write!(f, "{s}"),
            Val::Json(v) => write!(f, "{v}"),
            Val::Null => write!(f, "null"),
        }
    }
}

fn eval(expr: &Expr, vars: &HashMap<String, Value>) -> Result<Val, ExprError> {
    match expr {
        Expr::Var(name) => vars
            .get(name)
            .cloned()
            .map(Val::Json)
            .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
        Expr::Num(n) => Ok(Val::Num(*n)),
        Expr::Str(s) => Ok(Val::Str(s.clone())),
        Expr::Field(base, field) => {
            let base = eval(base, vars)?;
            match base {
                Val::Json(Value::Object(map)) => Ok(map.get(field).cloned().map(Val::Json).unwrap_or(Val::Null)),
                _ => Err(ExprError::Type(format!("cannot access field '{field}' on {base}"))),
            }
        }
        Expr::Not(inner) => Ok(Val::Bool(!as_bool(&eval(inner, vars)?)?)),
        Expr::Bin("&&", l, r) => Ok(Val::Bool(as_bool(&eval(l, vars)?)? && as_bool(&eval(r, vars)?)?)),
        Expr::Bin("||", l, r) => Ok(Val::Bool(as_bool(&eval(l, vars)?)? || as_bool(&eval(r, vars)?)?)),
        Expr::Bin(op @ ("+" | "-" | "*" | "/"), l, r) => {
            let lv = as_num(&eval(l, vars)?)?;
            let rv = as_num(&eval(r, vars)?)?;
            let result = match *op {
                "+" => lv + rv,
                "-" => lv - rv,
                "*" => lv * rv,
                "/" => lv / rv,
                _ => unreachable!(),
            };
            Ok(Val::Num(result))
        }
        Expr::Bin(op, l, r) => {
            let lv = eval(l, vars)?;
            let rv = eval(r, vars)?;
            compare(*op, &lv, &rv)
        }
    }
}

fn as_bool(v: &Val) -> Result<bool, ExprError> {
    match v {
        Val::Bool(b) => Ok(*b),
        other => Err(ExprError::Type(format!("expected boolean, found {other}"))),
    }
}

fn as_num(v: &Val) -> Result<f64, ExprError> {
    match v {
        Val::Num(n) => Ok(*n),
        Val::Json(Value::Number(n)) => n.as_f64().ok_or_else(|| ExprError::Type("not a number".into())),
        other => Err(ExprError::Type(format!("expected number, found {other}"))),
    }
}

fn as_str(v: &Val) -> Option<&str> {
    match v {
        Val::Str(s) => Some(s),
        Val::Json(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn compare(op: &str, l: &Val, r: &Val) -> Result<Val, ExprError> {
    if let (Some(ls), Some(rs)) = (as_str(l), as_str(r)) {
        let ordering = match op {
            "==" => ls == rs,
            "!=" => ls != rs,
            _ => return Err(ExprError::Type(format!("operator '{op}' is not defined for strings"))),
        };
        return Ok(Val::Bool(ordering));
    }
    let ln = as_num(l)?;
    let rn = as_num(r)?;
    let result = match op {
        "==" => ln == rn,
        "!=" => ln != rn,
        "<" => ln < rn,
        "<=" => ln <= rn,
        ">" => ln > rn,
        ">=" => ln >= rn,
        _ => unreachable!(),
    };
    Ok(Val::Bool(result))
}

/// Evaluates `source` against `vars`, returning `Ok(bool)` only when the
/// expression is well-formed and evaluates to a boolean. Any other outcome
/// — syntax error, unknown variable, non-boolean result — is an `Err`, per
/// spec §4.3 step 1: "A non-boolean result is a resolver error (log and
/// skip)."
pub fn eval_bool(source: &str, vars: &HashMap<String, Value>) -> Result<bool, ExprError> {
    let expr = parse(source)?;
    match eval(&expr, vars)? {
        Val::Bool(b) => Ok(b),
        _ => Err(ExprError::NotBoolean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("application".to_string(), json!({"name": "frontend", "env": "prod"}));
        m.insert("project".to_string(), json!({"name": "p1"}));
        m
    }

    #[test]
    fn member_access_and_equality() {
        assert!(eval_bool("application.env == \"prod\"", &vars()).unwrap());
        assert!(!eval_bool("application.env == \"staging\"", &vars()).unwrap());
    }

    #[test]
    fn boolean_connectives() {
        assert!(eval_bool("application.env == \"prod\" && project.name == \"p1\"", &vars()).unwrap());
        assert!(!eval_bool("application.env == \"prod\" && project.name == \"p2\"", &vars()).unwrap());
        assert!(eval_bool("application.env == \"dev\" || project.name == \"p1\"", &vars()).unwrap());
    }

    #[test]
    fn negation() {
        assert!(eval_bool("!(application.env == \"staging\")", &vars()).unwrap());
    }

    #[test]
    fn arithmetic_and_comparison() {
        let mut v = vars();
        v.insert("n".to_string(), json!(3));
        assert!(eval_bool("n + 1 == 4", &v).unwrap());
        assert!(eval_bool("n * 2 >= 6", &v).unwrap());
    }

    #[test]
    fn non_boolean_result_is_an_error_not_a_truthy_coercion() {
        assert_eq!(eval_bool("application.name", &vars()), Err(ExprError::NotBoolean));
        assert_eq!(eval_bool("1 + 1", &vars()), Err(ExprError::NotBoolean));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        assert_eq!(
            eval_bool("missing.field == \"x\"", &vars()),
            Err(ExprError::UnknownVariable("missing".into()))
        );
    }

    #[test]
    fn syntax_error_is_reported() {
        assert!(matches!(eval_bool("application ==", &vars()), Err(ExprError::Syntax(_, _))));
    }
}
