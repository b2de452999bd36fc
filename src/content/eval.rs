//! Expression evaluator for the content context.
//!
//! Supports a JavaScript-flavoured expression subset: literals, arithmetic,
//! comparison, logical and conditional operators, member/index access on page
//! globals, and the `document.getElementById` / `document.querySelector`
//! lookups. Errors carry the JS error class as a message prefix.

use serde_json::{Map, Number, Value};

use super::dom::{Document, NodeId};
use crate::error::{BridgeError, Result};

/// A runtime value produced by evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Map<String, Value>),
    Element(NodeId),
    Document,
    Window,
    Builtin(Builtin),
}

/// Native functions reachable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    GetElementById,
    QuerySelector,
}

impl Builtin {
    fn name(&self) -> &'static str {
        match self {
            Builtin::GetElementById => "getElementById",
            Builtin::QuerySelector => "querySelector",
        }
    }
}

/// Evaluate `code` against `document`.
pub fn evaluate(code: &str, document: &Document) -> Result<JsValue> {
    let tokens = tokenize(code)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_program()?;
    match expr {
        Some(expr) => Interpreter { document }.eval(&expr),
        None => Ok(JsValue::Undefined),
    }
}

/// Evaluate `code` and convert the value for transport.
pub fn evaluate_to_json(code: &str, document: &Document) -> Result<Value> {
    let value = evaluate(code, document)?;
    Ok(value.to_json(document))
}

fn syntax_error(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Evaluation(format!("SyntaxError: {}", message))
}

fn range_error(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Evaluation(format!("RangeError: {}", message))
}

fn type_error(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Evaluation(format!("TypeError: {}", message))
}

impl JsValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => JsValue::Null,
            Value::Bool(b) => JsValue::Bool(*b),
            Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => JsValue::String(s.clone()),
            Value::Array(a) => JsValue::Array(a.clone()),
            Value::Object(o) => JsValue::Object(o.clone()),
        }
    }

    pub fn to_json(&self, document: &Document) -> Value {
        match self {
            JsValue::Undefined | JsValue::Null | JsValue::Builtin(_) => Value::Null,
            JsValue::Bool(b) => Value::Bool(*b),
            JsValue::Number(n) => number_to_json(*n),
            JsValue::String(s) => Value::String(s.clone()),
            JsValue::Array(a) => Value::Array(a.clone()),
            JsValue::Object(o) => Value::Object(o.clone()),
            JsValue::Element(node) => {
                let element = document.element(*node);
                serde_json::json!({
                    "nodeName": element.map(|e| e.tag_name()),
                    "id": element.and_then(|e| e.id.clone()),
                })
            }
            JsValue::Document => serde_json::json!({
                "nodeName": "#document",
                "title": document.title,
                "URL": document.url,
            }),
            JsValue::Window => Value::Object(document.globals.clone()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Bool(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    fn is_primitive(&self) -> bool {
        matches!(
            self,
            JsValue::Undefined
                | JsValue::Null
                | JsValue::Bool(_)
                | JsValue::Number(_)
                | JsValue::String(_)
        )
    }

    pub fn to_number(&self) -> f64 {
        match self {
            JsValue::Undefined => f64::NAN,
            JsValue::Null => 0.0,
            JsValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            JsValue::Number(n) => *n,
            JsValue::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn to_js_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Number(n) => format_number(*n),
            JsValue::String(s) => s.clone(),
            JsValue::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Null => String::new(),
                    other => JsValue::from_json(other).to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            JsValue::Object(_) => "[object Object]".to_string(),
            JsValue::Element(_) => "[object HTMLElement]".to_string(),
            JsValue::Document => "[object HTMLDocument]".to_string(),
            JsValue::Window => "[object Window]".to_string(),
            JsValue::Builtin(b) => format!("function {}() {{ [native code] }}", b.name()),
        }
    }

    fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Bool(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Builtin(_) => "function",
            _ => "object",
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn strict_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Number(x), JsValue::Number(y)) => x == y,
        _ => a == b,
    }
}

fn loose_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Undefined | JsValue::Null, JsValue::Undefined | JsValue::Null) => true,
        (JsValue::Undefined | JsValue::Null, _) | (_, JsValue::Undefined | JsValue::Null) => false,
        (JsValue::Number(_), JsValue::String(_))
        | (JsValue::String(_), JsValue::Number(_))
        | (JsValue::Bool(_), _)
        | (_, JsValue::Bool(_)) => a.to_number() == b.to_number(),
        _ => strict_equals(a, b),
    }
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!",
    "(", ")", "[", "]", ".", ",", "?", ":", ";",
];

fn tokenize(code: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mark = i;
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                if i < chars.len() && chars[i].is_ascii_digit() {
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                } else {
                    i = mark;
                }
            }
            if i < chars.len() && is_ident_start(chars[i]) {
                return Err(syntax_error("Invalid or unexpected token"));
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse()
                .map_err(|_| syntax_error(format!("Invalid number '{}'", text)))?;
            tokens.push(Token::Number(n));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(syntax_error("Invalid or unexpected token"));
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch == '\n' {
                    return Err(syntax_error("Invalid or unexpected token"));
                }
                if ch == '\\' {
                    let Some(&esc) = chars.get(i) else {
                        return Err(syntax_error("Invalid or unexpected token"));
                    };
                    i += 1;
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            tokens.push(Token::Str(s));
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            while i < chars.len() && (is_ident_start(chars[i]) || chars[i].is_ascii_digit()) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        match PUNCTUATORS.iter().find(|p| rest.starts_with(**p)) {
            Some(p) => {
                tokens.push(Token::Punct(*p));
                i += p.len();
            }
            None => return Err(syntax_error("Invalid or unexpected token")),
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

// ---------------------------------------------------------------------------
// Parser

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(JsValue),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Nesting limit for parsed expressions. Bounds both parser recursion and
/// the height of the tree the interpreter walks.
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(range_error("Maximum call stack size exceeded"));
        }
        Ok(())
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> BridgeError {
        match self.peek() {
            None => syntax_error("Unexpected end of input"),
            Some(Token::Number(n)) => syntax_error(format!("Unexpected number {}", format_number(*n))),
            Some(Token::Str(_)) => syntax_error("Unexpected string"),
            Some(Token::Ident(name)) => syntax_error(format!("Unexpected identifier '{}'", name)),
            Some(Token::Punct(p)) => syntax_error(format!("Unexpected token '{}'", p)),
        }
    }

    /// An optional expression followed by optional semicolons.
    fn parse_program(&mut self) -> Result<Option<Expr>> {
        while self.eat(";") {}
        if self.peek().is_none() {
            return Ok(None);
        }
        let expr = self.parse_conditional()?;
        while self.eat(";") {}
        if self.peek().is_some() {
            return Err(self.unexpected());
        }
        Ok(Some(expr))
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        self.descend()?;
        let test = self.parse_or()?;
        let expr = if self.eat("?") {
            let consequent = self.parse_conditional()?;
            self.expect(":")?;
            let alternate = self.parse_conditional()?;
            Expr::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate))
        } else {
            test
        };
        self.depth -= 1;
        Ok(expr)
    }

    // Each link of a left-associative chain adds a level to the tree, so
    // chains count against the depth limit too.

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        let mut chained = 0;
        while self.eat("||") {
            self.descend()?;
            chained += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        let mut chained = 0;
        while self.eat("&&") {
            self.descend()?;
            chained += 1;
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        let mut chained = 0;
        'outer: loop {
            for (punct, op) in ops {
                if self.eat(punct) {
                    self.descend()?;
                    chained += 1;
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            self.depth -= chained;
            return Ok(left);
        }
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = if self.eat("!") {
            Some(UnaryOp::Not)
        } else if self.eat("-") {
            Some(UnaryOp::Neg)
        } else if self.eat("+") {
            Some(UnaryOp::Plus)
        } else if matches!(self.peek(), Some(Token::Ident(name)) if name == "typeof") {
            self.pos += 1;
            Some(UnaryOp::TypeOf)
        } else {
            None
        };

        match op {
            Some(op) => {
                self.descend()?;
                let operand = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::Unary(op, Box::new(operand)))
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;
        loop {
            if matches!(self.peek(), Some(Token::Punct("." | "[" | "("))) {
                self.descend()?;
                chained += 1;
            }
            if self.eat(".") {
                match self.next() {
                    Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name),
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                }
            } else if self.eat("[") {
                let index = self.parse_conditional()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat("(") {
                let mut args = Vec::new();
                if !self.eat(")") {
                    loop {
                        args.push(self.parse_conditional()?);
                        if self.eat(")") {
                            break;
                        }
                        self.expect(",")?;
                    }
                }
                expr = Expr::Call(Box::new(expr), args);
            } else {
                self.depth -= chained;
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(JsValue::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(JsValue::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(JsValue::Bool(true)),
                "false" => Expr::Literal(JsValue::Bool(false)),
                "null" => Expr::Literal(JsValue::Null),
                "undefined" => Expr::Literal(JsValue::Undefined),
                _ => Expr::Ident(name),
            }),
            Some(Token::Punct("(")) => {
                let expr = self.parse_conditional()?;
                self.expect(")")?;
                Ok(expr)
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Interpreter

struct Interpreter<'a> {
    document: &'a Document,
}

impl Interpreter<'_> {
    fn eval(&self, expr: &Expr) -> Result<JsValue> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => self.resolve(name),
            Expr::Member(object, name) => {
                let object = self.eval(object)?;
                self.member(&object, name)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.index(&object, &index)
            }
            Expr::Call(callee, args) => {
                let callee_value = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>>>()?;
                self.call(&callee_value, callee, &args)
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => JsValue::Bool(!v.truthy()),
                    UnaryOp::Neg => JsValue::Number(-v.to_number()),
                    UnaryOp::Plus => JsValue::Number(v.to_number()),
                    UnaryOp::TypeOf => JsValue::String(v.type_of().to_string()),
                })
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(binary(*op, &l, &r))
            }
            Expr::And(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() {
                    self.eval(right)
                } else {
                    Ok(l)
                }
            }
            Expr::Or(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<JsValue> {
        match name {
            "document" => Ok(JsValue::Document),
            "window" | "globalThis" | "self" => Ok(JsValue::Window),
            "NaN" => Ok(JsValue::Number(f64::NAN)),
            "Infinity" => Ok(JsValue::Number(f64::INFINITY)),
            "location" => Ok(self.location()),
            _ => match self.document.globals.get(name) {
                Some(v) => Ok(JsValue::from_json(v)),
                None => Err(BridgeError::Evaluation(format!(
                    "ReferenceError: {} is not defined",
                    name
                ))),
            },
        }
    }

    fn location(&self) -> JsValue {
        let mut map = Map::new();
        map.insert("href".to_string(), Value::String(self.document.url.clone()));
        JsValue::Object(map)
    }

    fn member(&self, object: &JsValue, name: &str) -> Result<JsValue> {
        match object {
            JsValue::Undefined | JsValue::Null => Err(type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                object.to_js_string(),
                name
            ))),
            JsValue::Document => Ok(match name {
                "title" => JsValue::String(self.document.title.clone()),
                "URL" | "documentURI" => JsValue::String(self.document.url.clone()),
                "location" => self.location(),
                "getElementById" => JsValue::Builtin(Builtin::GetElementById),
                "querySelector" => JsValue::Builtin(Builtin::QuerySelector),
                _ => JsValue::Undefined,
            }),
            JsValue::Window => match name {
                "document" | "window" | "location" | "NaN" | "Infinity" => self.resolve(name),
                _ => Ok(self
                    .document
                    .globals
                    .get(name)
                    .map(JsValue::from_json)
                    .unwrap_or(JsValue::Undefined)),
            },
            JsValue::Element(node) => {
                let Some(element) = self.document.element(*node) else {
                    return Ok(JsValue::Undefined);
                };
                Ok(match name {
                    "id" => JsValue::String(element.id.clone().unwrap_or_default()),
                    "tagName" | "nodeName" => JsValue::String(element.tag_name()),
                    "className" => JsValue::String(element.classes.join(" ")),
                    "textContent" | "innerText" => JsValue::String(element.text.clone()),
                    _ => JsValue::Undefined,
                })
            }
            JsValue::String(s) => Ok(match name {
                "length" => JsValue::Number(s.encode_utf16().count() as f64),
                _ => JsValue::Undefined,
            }),
            JsValue::Array(items) => Ok(match name {
                "length" => JsValue::Number(items.len() as f64),
                _ => JsValue::Undefined,
            }),
            JsValue::Object(map) => Ok(map
                .get(name)
                .map(JsValue::from_json)
                .unwrap_or(JsValue::Undefined)),
            _ => Ok(JsValue::Undefined),
        }
    }

    fn index(&self, object: &JsValue, index: &JsValue) -> Result<JsValue> {
        match (object, index) {
            (JsValue::Array(items), JsValue::Number(n)) => {
                if *n >= 0.0 && n.fract() == 0.0 {
                    Ok(items
                        .get(*n as usize)
                        .map(JsValue::from_json)
                        .unwrap_or(JsValue::Undefined))
                } else {
                    Ok(JsValue::Undefined)
                }
            }
            (JsValue::String(s), JsValue::Number(n)) => {
                if *n >= 0.0 && n.fract() == 0.0 {
                    // Code units, matching `length`.
                    Ok(s.encode_utf16()
                        .nth(*n as usize)
                        .map(|unit| JsValue::String(String::from_utf16_lossy(&[unit])))
                        .unwrap_or(JsValue::Undefined))
                } else {
                    Ok(JsValue::Undefined)
                }
            }
            _ => self.member(object, &index.to_js_string()),
        }
    }

    fn call(&self, callee: &JsValue, callee_expr: &Expr, args: &[JsValue]) -> Result<JsValue> {
        let JsValue::Builtin(builtin) = callee else {
            return Err(type_error(format!(
                "{} is not a function",
                describe(callee_expr)
            )));
        };
        let arg = args
            .first()
            .cloned()
            .unwrap_or(JsValue::Undefined)
            .to_js_string();
        let found = match builtin {
            Builtin::GetElementById => self.document.get_element_by_id(&arg),
            Builtin::QuerySelector => self.document.query_selector(&arg)?,
        };
        Ok(found.map(JsValue::Element).unwrap_or(JsValue::Null))
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member(object, name) => format!("{}.{}", describe(object), name),
        _ => "expression".to_string(),
    }
}

fn binary(op: BinaryOp, l: &JsValue, r: &JsValue) -> JsValue {
    match op {
        BinaryOp::Add => {
            if matches!(l, JsValue::String(_))
                || matches!(r, JsValue::String(_))
                || !l.is_primitive()
                || !r.is_primitive()
            {
                JsValue::String(format!("{}{}", l.to_js_string(), r.to_js_string()))
            } else {
                JsValue::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOp::Sub => JsValue::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => JsValue::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => JsValue::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => JsValue::Number(l.to_number() % r.to_number()),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (l, r) {
                (JsValue::String(a), JsValue::String(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            JsValue::Bool(match ordering {
                None => false,
                Some(o) => match op {
                    BinaryOp::Lt => o.is_lt(),
                    BinaryOp::Le => o.is_le(),
                    BinaryOp::Gt => o.is_gt(),
                    _ => o.is_ge(),
                },
            })
        }
        BinaryOp::Eq => JsValue::Bool(loose_equals(l, r)),
        BinaryOp::Ne => JsValue::Bool(!loose_equals(l, r)),
        BinaryOp::StrictEq => JsValue::Bool(strict_equals(l, r)),
        BinaryOp::StrictNe => JsValue::Bool(!strict_equals(l, r)),
    }
}
