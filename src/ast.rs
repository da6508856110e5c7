//! This module defines the value model shared by the reader, the evaluator and the
//! primitive library. The main enum, [`Value`], is a closed tagged union covering atoms,
//! proper and dotted lists, numbers, strings, booleans, native callables, closures and
//! ports. Program text and runtime data use the same type: the reader produces `Value`
//! trees and `eval` consumes them.
//!
//! Helper functions such as [`val`], [`sym`], [`nil`] and [`dotted`] make it easy to
//! build values in code and tests, and `From` conversions exist for common Rust literals.
//! Display implements the printer, which the reader accepts back for every data variant.
//! Equality is structural for data and by identity for native callables and ports.

use std::cell::RefCell;
use std::fmt;

use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;
use crate::io::Port;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Allowed non-alphanumeric characters in atom names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "!#$%&|*+-/:<=>?@^_~";

/// Check if a character may start an atom
pub(crate) fn is_symbol_start(c: char) -> bool {
    c.is_alphabetic() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Check if a character may continue an atom
pub(crate) fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Core value type in interpreter
///
/// To build values, use the helper functions:
/// - `val(42)` for values, `sym("name")` for atoms, `nil()` for the empty list
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
/// - `dotted([1, 2], 3)` for improper lists
#[derive(Clone)]
pub enum Value {
    /// Identifiers and other symbolic tokens
    Atom(String),
    /// Proper lists; the empty list is nil
    List(Vec<Value>),
    /// Improper lists: at least one head element and a non-list tail
    DottedList(Vec<Value>, Box<Value>),
    /// Numbers (64-bit integers only)
    Number(NumberType),
    /// String literals
    String(String),
    /// Boolean values
    Bool(bool),
    /// Native functions from the primitive registry, compared by registry address
    Primitive(&'static BuiltinOp),
    /// Native functions that perform I/O; same calling contract as `Primitive`
    IoPrimitive(&'static BuiltinOp),
    /// User-defined functions
    Closure {
        params: Vec<String>,
        vararg: Option<String>,
        body: Vec<Value>,
        env: Environment,
    },
    /// Handle to an open file owned by the I/O layer
    Port(Port),
}

/// Pairs of cells currently being compared, used to stop on cyclic environments
pub(crate) type CellPairs = Vec<(*const RefCell<Value>, *const RefCell<Value>)>;

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Atom(s) => write!(f, "Atom({s})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::DottedList(heads, tail) => {
                write!(f, "DottedList(")?;
                for v in heads {
                    write!(f, "{v:?}, ")?;
                }
                write!(f, ". {tail:?})")
            }
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Primitive(op) => write!(f, "Primitive({})", op.name),
            Value::IoPrimitive(op) => write!(f, "IoPrimitive({})", op.name),
            // The captured environment may contain this closure, so it is not printed
            Value::Closure {
                params,
                vararg,
                body,
                ..
            } => write!(
                f,
                "Closure(params={params:?}, vararg={vararg:?}, body={body:?})"
            ),
            Value::Port(_) => write!(f, "Port"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper function for creating atoms - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Atom(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// The empty list
pub fn nil() -> Value {
    Value::List(vec![])
}

/// Helper function for creating improper lists
pub fn dotted<H: Into<Value>, T: Into<Value>>(heads: impl IntoIterator<Item = H>, tail: T) -> Value {
    Value::DottedList(heads.into_iter().map(Into::into).collect(), Box::new(tail.into()))
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

fn write_spaced(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, elem) in values.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{elem}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Atom(s) => write!(f, "{s}"),
            Value::List(elements) => {
                write!(f, "(")?;
                write_spaced(f, elements)?;
                write!(f, ")")
            }
            Value::DottedList(heads, tail) => {
                write!(f, "(")?;
                write_spaced(f, heads)?;
                write!(f, " . {tail})")
            }
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write_string_literal(f, s),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Primitive(_) => write!(f, "<primitive>"),
            Value::IoPrimitive(_) => write!(f, "<IO primitive>"),
            Value::Closure { params, vararg, .. } => match (params.is_empty(), vararg) {
                (true, Some(rest)) => write!(f, "(lambda {rest} ...)"),
                (_, Some(rest)) => write!(f, "(lambda ({} . {rest}) ...)", params.join(" ")),
                (_, None) => write!(f, "(lambda ({}) ...)", params.join(" ")),
            },
            Value::Port(_) => write!(f, "<IO port>"),
        }
    }
}

impl Value {
    /// Check if a value represents nil (empty list)
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(list) if list.is_empty())
    }

    /// Scheme truthiness: everything except `#f` is true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Structural equality that tolerates cycles through environment cells.
    ///
    /// A pair of cells already under comparison is assumed equal; any difference is
    /// still found on the path that first reached it.
    pub(crate) fn eq_tracked(&self, other: &Value, seen: &mut CellPairs) -> bool {
        match (self, other) {
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => all_eq_tracked(a, b, seen),
            (Value::DottedList(a, tail_a), Value::DottedList(b, tail_b)) => {
                all_eq_tracked(a, b, seen) && tail_a.eq_tracked(tail_b, seen)
            }
            (Value::Primitive(a), Value::Primitive(b))
            | (Value::IoPrimitive(a), Value::IoPrimitive(b)) => std::ptr::eq(*a, *b),
            (
                Value::Closure {
                    params: p1,
                    vararg: v1,
                    body: b1,
                    env: e1,
                },
                Value::Closure {
                    params: p2,
                    vararg: v2,
                    body: b2,
                    env: e2,
                },
            ) => p1 == p2 && v1 == v2 && all_eq_tracked(b1, b2, seen) && e1.eq_tracked(e2, seen),
            (Value::Port(a), Value::Port(b)) => a == b,
            _ => false, // Different variants are never equal
        }
    }
}

fn all_eq_tracked(a: &[Value], b: &[Value], seen: &mut CellPairs) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_tracked(y, seen))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_tracked(other, &mut Vec::new())
    }
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;
    use crate::builtinops::find_primitive;

    #[test]
    fn test_helper_functions_data_driven() {
        // (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Value::Number(42)),
            (val(-17), Value::Number(-17)),
            (val(255u8), Value::Number(255)),
            (val(-32768i16), Value::Number(-32768)),
            (val(NumberType::MAX), Value::Number(NumberType::MAX)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::String("hello".to_owned())),
            (sym("foo-bar?"), Value::Atom("foo-bar?".to_owned())),
            (sym(String::from("test")), Value::Atom("test".to_owned())),
            (nil(), Value::List(vec![])),
            (
                val([1, 2, 3]),
                Value::List(vec![Value::Number(1), Value::Number(2), Value::Number(3)]),
            ),
            (
                val(vec![sym("operation"), val(42), val("result")]),
                Value::List(vec![
                    Value::Atom("operation".to_owned()),
                    Value::Number(42),
                    Value::String("result".to_owned()),
                ]),
            ),
            (
                dotted([1, 2], 3),
                Value::DottedList(
                    vec![Value::Number(1), Value::Number(2)],
                    Box::new(Value::Number(3)),
                ),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Helper case #{}", i + 1);
        }
    }

    #[test]
    fn test_printer() {
        let test_cases = vec![
            (sym("foo"), "foo"),
            (val("text"), "\"text\""),
            (val("say \"hi\"\n"), r#""say \"hi\"\n""#),
            (val(-42), "-42"),
            (val(true), "#t"),
            (val(false), "#f"),
            (nil(), "()"),
            (val(vec![val(1), val("two"), sym("three")]), "(1 \"two\" three)"),
            (val(vec![val([1, 2]), nil()]), "((1 2) ())"),
            (dotted([sym("a"), sym("b")], sym("c")), "(a b . c)"),
            (dotted([1], val([2, 3])), "(1 . (2 3))"),
        ];

        for (i, (value, expected)) in test_cases.iter().enumerate() {
            assert_eq!(value.to_string(), *expected, "Printer case #{}", i + 1);
        }
    }

    #[test]
    fn test_closure_printer() {
        let env = Environment::new();
        let closure = |params: &[&str], vararg: Option<&str>| Value::Closure {
            params: params.iter().map(|p| p.to_string()).collect(),
            vararg: vararg.map(str::to_owned),
            body: vec![sym("x")],
            env: env.clone(),
        };

        assert_eq!(closure(&["x", "y"], None).to_string(), "(lambda (x y) ...)");
        assert_eq!(
            closure(&["x"], Some("rest")).to_string(),
            "(lambda (x . rest) ...)"
        );
        assert_eq!(closure(&[], Some("args")).to_string(), "(lambda args ...)");
        assert_eq!(closure(&[], None).to_string(), "(lambda () ...)");
    }

    #[test]
    fn test_equality_rules() {
        // Different variants never compare equal, even with the same printed text
        assert_ne!(val(2), val("2"));
        assert_ne!(sym("x"), val("x"));
        assert_ne!(nil(), val(false));
        assert_ne!(val([1, 2]), dotted([1], 2));
        assert_eq!(dotted([1, 2], 3), dotted([1, 2], 3));
        assert_ne!(dotted([1, 2], 3), dotted([1, 2], 4));

        // Native callables compare by identity
        let plus = find_primitive("+").map(Value::Primitive);
        let minus = find_primitive("-").map(Value::Primitive);
        assert!(plus.is_some());
        assert_eq!(plus, find_primitive("+").map(Value::Primitive));
        assert_ne!(plus, minus);
    }

    #[test]
    fn test_closure_equality_compares_environment() {
        let mut env_a = Environment::new();
        env_a.define("n", val(1));
        let mut env_b = Environment::new();
        env_b.define("n", val(1));
        let mut env_c = Environment::new();
        env_c.define("n", val(2));

        let closure = |env: &Environment| Value::Closure {
            params: vec!["x".into()],
            vararg: None,
            body: vec![sym("n")],
            env: env.clone(),
        };

        assert_eq!(closure(&env_a), closure(&env_b));
        assert_ne!(closure(&env_a), closure(&env_c));
    }

    #[test]
    fn test_self_referential_closure_equality_terminates() {
        let build = || {
            let mut env = Environment::new();
            env.define("loop", val(false));
            let closure = Value::Closure {
                params: vec![],
                vararg: None,
                body: vec![val(vec![sym("loop")])],
                env: env.clone(),
            };
            env.define("loop", closure.clone());
            closure
        };

        let first = build();
        let second = build();
        assert_eq!(first, second);
        assert_eq!(first, first.clone());
    }
}
