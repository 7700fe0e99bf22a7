//! Edge predicate compilation, evaluation, and caching
//!
//! Edge conditions are small boolean expressions evaluated against the
//! environment `{ "output": <source node output> }`:
//!
//! ```text
//! output.status == "ok" && output.score >= 0.8
//! output.retries < 3 || output.force
//! !(output.result == null)
//! ```
//!
//! The grammar supports `||`, `&&`, `!`, the comparison operators
//! `== != > >= < <=`, parentheses, dot-path identifiers, and
//! string/number/boolean/null literals. A compiled program must evaluate
//! to a boolean; any other result is a usage error.
//!
//! Compilation is cached in a bounded, mutex-guarded LRU keyed by the raw
//! expression string ([`ExpressionCache`]). The key scheme is safe because
//! the environment shape is fixed; an environment-schema change would
//! require invalidation.

use crate::error::{Result, WorkflowError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default capacity of the compiled-expression cache
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// Expression AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    /// Dot path into the environment, e.g. `output.user.age`
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// A parsed edge predicate, ready for repeated evaluation
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    source: String,
    expr: Expr,
}

impl CompiledCondition {
    /// Parse an expression string into a compiled program
    pub fn compile(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            source,
        };
        let expr = parser.parse_or()?;
        if parser.position != parser.tokens.len() {
            return Err(WorkflowError::Condition(format!(
                "unexpected trailing input in condition '{source}'"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The raw expression this program was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against an environment; the result must be boolean
    pub fn evaluate(&self, env: &Value) -> Result<bool> {
        match eval(&self.expr, env)? {
            Value::Bool(b) => Ok(b),
            other => Err(WorkflowError::Condition(format!(
                "condition '{}' produced non-boolean value {other}",
                self.source
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    And,
    Or,
    Not,
    Compare(CompareOp),
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(unexpected(source, c));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(unexpected(source, c));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Compare(CompareOp::Eq));
                    i += 2;
                } else {
                    return Err(unexpected(source, c));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Compare(CompareOp::Ne));
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Compare(CompareOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Compare(CompareOp::Gt));
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Compare(CompareOp::Le));
                    i += 2;
                } else {
                    tokens.push(Token::Compare(CompareOp::Lt));
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            literal.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(WorkflowError::Condition(format!(
                                "unterminated string literal in condition '{source}'"
                            )));
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    WorkflowError::Condition(format!("invalid number '{text}' in condition '{source}'"))
                })?;
                tokens.push(Token::Num(number));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            _ => return Err(unexpected(source, c)),
        }
    }

    Ok(tokens)
}

fn unexpected(source: &str, c: char) -> WorkflowError {
    WorkflowError::Condition(format!("unexpected character '{c}' in condition '{source}'"))
}

// ---------------------------------------------------------------------------
// Parser (recursive descent: or -> and -> unary -> comparison -> term)
// ---------------------------------------------------------------------------

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_term()?;
        if let Some(Token::Compare(op)) = self.peek().cloned() {
            self.advance();
            let right = self.parse_term()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => {
                let number = serde_json::Number::from_f64(n).ok_or_else(|| {
                    WorkflowError::Condition(format!(
                        "non-finite number in condition '{}'",
                        self.source
                    ))
                })?;
                Ok(Expr::Literal(Value::Number(number)))
            }
            Some(Token::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(path)) => Ok(Expr::Path(
                path.split('.').map(|s| s.to_string()).collect(),
            )),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(WorkflowError::Condition(format!(
                        "missing closing parenthesis in condition '{}'",
                        self.source
                    ))),
                }
            }
            other => Err(WorkflowError::Condition(format!(
                "unexpected token {:?} in condition '{}'",
                other, self.source
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, env: &Value) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => {
            let mut current = env;
            for segment in segments {
                current = match current.get(segment) {
                    Some(value) => value,
                    None => return Ok(Value::Null),
                };
            }
            Ok(current.clone())
        }
        Expr::Not(inner) => match eval(inner, env)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(WorkflowError::Condition(format!(
                "'!' applied to non-boolean value {other}"
            ))),
        },
        Expr::And(left, right) => {
            if !expect_bool(eval(left, env)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(eval(right, env)?, "&&")?))
        }
        Expr::Or(left, right) => {
            if expect_bool(eval(left, env)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(eval(right, env)?, "||")?))
        }
        Expr::Compare(op, left, right) => {
            let l = eval(left, env)?;
            let r = eval(right, env)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
    }
}

fn expect_bool(value: Value, op: &str) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(WorkflowError::Condition(format!(
            "'{op}' applied to non-boolean value {other}"
        ))),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    match op {
        CompareOp::Eq => Ok(loose_eq(left, right)),
        CompareOp::Ne => Ok(!loose_eq(left, right)),
        _ => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                    a.partial_cmp(&b).ok_or_else(|| {
                        WorkflowError::Condition("cannot order non-finite numbers".to_string())
                    })?
                }
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    return Err(WorkflowError::Condition(format!(
                        "'{}' requires two numbers or two strings, got {left} and {right}",
                        op.as_str()
                    )));
                }
            };
            Ok(match op {
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            })
        }
    }
}

/// Equality across JSON types; numbers compare by value
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().unwrap_or(f64::NAN) == b.as_f64().unwrap_or(f64::NAN)
        }
        _ => left == right,
    }
}

// ---------------------------------------------------------------------------
// LRU cache of compiled programs
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CacheInner {
    capacity: usize,
    entries: HashMap<String, Arc<CompiledCondition>>,
    /// Access order, least recent at the front
    order: VecDeque<String>,
}

/// Bounded LRU of compiled conditions keyed by the expression string
///
/// All operations take the single mutex; `get` does too, because a hit
/// promotes the entry to most-recently-used.
#[derive(Debug)]
pub struct ExpressionCache {
    inner: Mutex<CacheInner>,
}

impl ExpressionCache {
    /// Create a cache; a capacity of zero resets to
    /// [`DEFAULT_CACHE_CAPACITY`]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CACHE_CAPACITY
        } else {
            capacity
        };
        Self {
            inner: Mutex::new(CacheInner {
                capacity,
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Fetch a compiled program, promoting it on hit
    pub fn get(&self, key: &str) -> Option<Arc<CompiledCondition>> {
        let mut inner = self.inner.lock();
        let program = inner.entries.get(key).cloned()?;
        promote(&mut inner.order, key);
        Some(program)
    }

    /// Insert or refresh a program, evicting the least-recent tail on
    /// overflow
    pub fn put(&self, key: impl Into<String>, program: Arc<CompiledCondition>) {
        let key = key.into();
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), program).is_some() {
            promote(&mut inner.order, &key);
            return;
        }
        inner.order.push_back(key);
        while inner.entries.len() > inner.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            } else {
                break;
            }
        }
    }

    /// Drop every cached program
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently cached, least recent first
    #[cfg(test)]
    fn keys_in_order(&self) -> Vec<String> {
        self.inner.lock().order.iter().cloned().collect()
    }
}

fn promote(order: &mut VecDeque<String>, key: &str) {
    if let Some(position) = order.iter().position(|k| k == key) {
        order.remove(position);
    }
    order.push_back(key.to_string());
}

// ---------------------------------------------------------------------------
// Evaluator facade
// ---------------------------------------------------------------------------

/// Compiles, caches, and evaluates edge predicates
#[derive(Debug)]
pub struct ConditionEvaluator {
    cache: ExpressionCache,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: ExpressionCache::new(capacity),
        }
    }

    /// Return the cached program for an expression, compiling on miss
    ///
    /// Compilation errors surface to the caller; failed expressions are not
    /// cached.
    pub fn compile_and_cache(&self, condition: &str) -> Result<Arc<CompiledCondition>> {
        if let Some(program) = self.cache.get(condition) {
            return Ok(program);
        }
        let program = Arc::new(CompiledCondition::compile(condition)?);
        self.cache.put(condition, program.clone());
        Ok(program)
    }

    /// Evaluate a condition against an environment
    ///
    /// An empty condition yields `true`.
    pub fn evaluate(&self, condition: &str, env: &Value) -> Result<bool> {
        if condition.trim().is_empty() {
            return Ok(true);
        }
        self.compile_and_cache(condition)?.evaluate(env)
    }

    /// Evaluate an edge condition against `{ "output": <source output> }`
    pub fn evaluate_edge(&self, condition: &str, source_output: Option<&Value>) -> Result<bool> {
        let env = serde_json::json!({
            "output": source_output.cloned().unwrap_or(Value::Null),
        });
        self.evaluate(condition, &env)
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Literal-matching fallback for contexts without the expression engine
///
/// `"true"`/`"false"` match literally; any other non-empty condition is
/// truthy iff the source produced a non-null output.
#[derive(Debug, Default)]
pub struct FallbackConditionEvaluator;

impl FallbackConditionEvaluator {
    pub fn evaluate(&self, condition: &str, source_output: Option<&Value>) -> bool {
        match condition.trim() {
            "" | "true" => true,
            "false" => false,
            _ => source_output.is_some_and(|v| !v.is_null()),
        }
    }
}
