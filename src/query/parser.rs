//! Rule expressions.
//!
//! Expressions use SQL expression syntax and are parsed with `sqlparser`,
//! then lowered into a small tree evaluated against one record at a time.
//! Identifiers resolve to record fields (dotted names to nested fields) and
//! missing fields read as NULL. Comparisons involving NULL yield NULL, which
//! counts as "not satisfied" at the top level.

use regex::Regex;
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value as SqlValue};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;

use crate::data::{QueryResult, Value};

/// Compiled boolean expression
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Field(Vec<String>),
    Literal(Value),
    Not(Box<Node>),
    Negate(Box<Node>),
    Binary {
        left: Box<Node>,
        op: BinaryOp,
        right: Box<Node>,
    },
    IsNull {
        expr: Box<Node>,
        negated: bool,
    },
    InList {
        expr: Box<Node>,
        list: Vec<Node>,
        negated: bool,
    },
    Between {
        expr: Box<Node>,
        low: Box<Node>,
        high: Box<Node>,
        negated: bool,
    },
    Like {
        expr: Box<Node>,
        pattern: Regex,
        negated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl Expression {
    /// Parse an expression; fails with a syntax error on malformed input
    pub fn compile(source: &str) -> Result<Self, EvalError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(EvalError::Syntax("empty expression".into()));
        }

        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect).try_with_sql(source)?;
        let expr = parser.parse_expr()?;

        let next = parser.peek_token();
        if next.token != Token::EOF {
            return Err(EvalError::Syntax(format!(
                "unexpected '{}' after expression",
                next.token
            )));
        }

        Ok(Self {
            source: source.to_string(),
            root: lower(&expr)?,
        })
    }

    /// Evaluate against a record; the result must be boolean (NULL is false)
    pub fn evaluate(&self, record: &QueryResult) -> Result<bool, EvalError> {
        match eval(&self.root, record)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(EvalError::NotBoolean(format!(
                "'{}' evaluated to {} {}",
                self.source,
                other.type_name(),
                other
            ))),
        }
    }
}

fn lower(expr: &Expr) -> Result<Node, EvalError> {
    match expr {
        Expr::Identifier(ident) => Ok(Node::Field(vec![ident.value.clone()])),
        Expr::CompoundIdentifier(idents) => Ok(Node::Field(
            idents.iter().map(|i| i.value.clone()).collect(),
        )),
        Expr::Value(value) => lower_literal(value).map(Node::Literal),
        Expr::Nested(inner) => lower(inner),
        Expr::UnaryOp { op, expr } => {
            let inner = Box::new(lower(expr)?);
            match op {
                UnaryOperator::Not => Ok(Node::Not(inner)),
                UnaryOperator::Minus => Ok(Node::Negate(inner)),
                UnaryOperator::Plus => Ok(*inner),
                other => Err(EvalError::Unsupported(format!("operator {}", other))),
            }
        }
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::And => BinaryOp::And,
                BinaryOperator::Or => BinaryOp::Or,
                BinaryOperator::Eq => BinaryOp::Eq,
                BinaryOperator::NotEq => BinaryOp::NotEq,
                BinaryOperator::Lt => BinaryOp::Lt,
                BinaryOperator::LtEq => BinaryOp::LtEq,
                BinaryOperator::Gt => BinaryOp::Gt,
                BinaryOperator::GtEq => BinaryOp::GtEq,
                BinaryOperator::Plus => BinaryOp::Plus,
                BinaryOperator::Minus => BinaryOp::Minus,
                BinaryOperator::Multiply => BinaryOp::Multiply,
                BinaryOperator::Divide => BinaryOp::Divide,
                BinaryOperator::Modulo => BinaryOp::Modulo,
                other => return Err(EvalError::Unsupported(format!("operator {}", other))),
            };
            Ok(Node::Binary {
                left: Box::new(lower(left)?),
                op,
                right: Box::new(lower(right)?),
            })
        }
        Expr::IsNull(inner) => Ok(Node::IsNull {
            expr: Box::new(lower(inner)?),
            negated: false,
        }),
        Expr::IsNotNull(inner) => Ok(Node::IsNull {
            expr: Box::new(lower(inner)?),
            negated: true,
        }),
        Expr::InList {
            expr,
            list,
            negated,
        } => Ok(Node::InList {
            expr: Box::new(lower(expr)?),
            list: list.iter().map(lower).collect::<Result<_, _>>()?,
            negated: *negated,
        }),
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Node::Between {
            expr: Box::new(lower(expr)?),
            low: Box::new(lower(low)?),
            high: Box::new(lower(high)?),
            negated: *negated,
        }),
        Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => {
            let pattern = match pattern.as_ref() {
                Expr::Value(SqlValue::SingleQuotedString(p)) => like_regex(p)?,
                other => {
                    return Err(EvalError::Unsupported(format!(
                        "LIKE pattern must be a string literal, got {}",
                        other
                    )))
                }
            };
            Ok(Node::Like {
                expr: Box::new(lower(expr)?),
                pattern,
                negated: *negated,
            })
        }
        other => Err(EvalError::Unsupported(other.to_string())),
    }
}

fn lower_literal(value: &SqlValue) -> Result<Value, EvalError> {
    match value {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Int64(i))
            } else {
                n.parse::<f64>()
                    .map(Value::Float64)
                    .map_err(|_| EvalError::Syntax(format!("invalid number: {}", n)))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::String(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(EvalError::Unsupported(format!("literal {}", other))),
    }
}

fn like_regex(pattern: &str) -> Result<Regex, EvalError> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| EvalError::Pattern(e.to_string()))
}

fn eval(node: &Node, record: &QueryResult) -> Result<Value, EvalError> {
    match node {
        Node::Field(path) => {
            let segments: Vec<&str> = path.iter().map(String::as_str).collect();
            Ok(record.value(&segments))
        }
        Node::Literal(value) => Ok(value.clone()),
        Node::Not(inner) => Ok(match truth(eval(inner, record)?)? {
            Some(b) => Value::Bool(!b),
            None => Value::Null,
        }),
        Node::Negate(inner) => match eval(inner, record)? {
            Value::Null => Ok(Value::Null),
            Value::Int64(i) => Ok(i
                .checked_neg()
                .map(Value::Int64)
                .unwrap_or(Value::Float64(-(i as f64)))),
            Value::Float64(f) => Ok(Value::Float64(-f)),
            other => Err(EvalError::TypeMismatch(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        Node::Binary { left, op, right } => match op {
            BinaryOp::And => {
                let l = truth(eval(left, record)?)?;
                if l == Some(false) {
                    return Ok(Value::Bool(false));
                }
                let r = truth(eval(right, record)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                })
            }
            BinaryOp::Or => {
                let l = truth(eval(left, record)?)?;
                if l == Some(true) {
                    return Ok(Value::Bool(true));
                }
                let r = truth(eval(right, record)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                })
            }
            _ => {
                let l = eval(left, record)?;
                let r = eval(right, record)?;
                binary(*op, l, r)
            }
        },
        Node::IsNull { expr, negated } => {
            let value = eval(expr, record)?;
            Ok(Value::Bool(value.is_null() != *negated))
        }
        Node::InList {
            expr,
            list,
            negated,
        } => {
            let value = eval(expr, record)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            for item in list {
                if eval(item, record)? == value {
                    return Ok(Value::Bool(!negated));
                }
            }
            Ok(Value::Bool(*negated))
        }
        Node::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let value = eval(expr, record)?;
            let low = eval(low, record)?;
            let high = eval(high, record)?;
            if value.is_null() || low.is_null() || high.is_null() {
                return Ok(Value::Null);
            }
            let above = ordered(&value, &low)?.is_ge();
            let below = ordered(&value, &high)?.is_le();
            Ok(Value::Bool((above && below) != *negated))
        }
        Node::Like {
            expr,
            pattern,
            negated,
        } => match eval(expr, record)? {
            Value::Null => Ok(Value::Null),
            value => Ok(Value::Bool(pattern.is_match(&value.to_string()) != *negated)),
        },
    }
}

fn truth(value: Value) -> Result<Option<bool>, EvalError> {
    match value {
        Value::Bool(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(EvalError::TypeMismatch(format!(
            "expected bool, got {} {}",
            other.type_name(),
            other
        ))),
    }
}

fn ordered(a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
    a.compare(b).ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))
    })
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::NotEq => Ok(Value::Bool(l != r)),
        BinaryOp::Lt => Ok(Value::Bool(ordered(&l, &r)?.is_lt())),
        BinaryOp::LtEq => Ok(Value::Bool(ordered(&l, &r)?.is_le())),
        BinaryOp::Gt => Ok(Value::Bool(ordered(&l, &r)?.is_gt())),
        BinaryOp::GtEq => Ok(Value::Bool(ordered(&l, &r)?.is_ge())),
        BinaryOp::Plus => {
            if let (Value::String(a), Value::String(b)) = (&l, &r) {
                return Ok(Value::String(format!("{}{}", a, b)));
            }
            arithmetic(op, &l, &r)
        }
        BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            arithmetic(op, &l, &r)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators are short-circuited"),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if !l.is_numeric() || !r.is_numeric() {
        return Err(EvalError::TypeMismatch(format!(
            "arithmetic on {} and {}",
            l.type_name(),
            r.type_name()
        )));
    }

    if let (Value::Int64(a), Value::Int64(b)) = (l, r) {
        let exact = match op {
            BinaryOp::Plus => a.checked_add(*b),
            BinaryOp::Minus => a.checked_sub(*b),
            BinaryOp::Multiply => a.checked_mul(*b),
            BinaryOp::Divide => {
                if *b == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                // checked_rem also guards i64::MIN / -1
                if a.checked_rem(*b) == Some(0) {
                    a.checked_div(*b)
                } else {
                    None
                }
            }
            BinaryOp::Modulo => {
                if *b == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                a.checked_rem(*b)
            }
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int64(v));
        }
    }

    // Both sides are numeric here
    let a = l.as_f64().unwrap_or_default();
    let b = r.as_f64().unwrap_or_default();
    let result = match op {
        BinaryOp::Plus => a + b,
        BinaryOp::Minus => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Modulo => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a % b
        }
        _ => unreachable!("non-arithmetic operator"),
    };
    Ok(Value::Float64(result))
}

/// Expression errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unsupported expression: {0}")]
    Unsupported(String),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Expression is not boolean: {0}")]
    NotBoolean(String),

    #[error("Division by zero")]
    DivisionByZero,
}

impl EvalError {
    /// Errors detected while compiling, as opposed to while evaluating a record
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            EvalError::Syntax(_) | EvalError::Unsupported(_) | EvalError::Pattern(_)
        )
    }
}

impl From<ParserError> for EvalError {
    fn from(e: ParserError) -> Self {
        EvalError::Syntax(e.to_string())
    }
}
