//! Built-in primitive registry.
//!
//! Every primitive shares one calling convention, `fn(&[Value]) -> Result<Value, Error>`,
//! and checks its own arity. Primitives live in a single static table so that the value
//! stored in an environment is a `&'static BuiltinOp`, whose address is its identity.
//!
//! ```scheme
//! (+ 1 2 3)            ; 6
//! (- 10 "4")           ; 6, strings holding integers are numbers
//! (string=? 42 "42")   ; #t, numbers print to their decimal text
//! (cons 1 2)           ; (1 . 2)
//! (equal? '(1 "2") '("1" 2))  ; #t
//! ```
//!
//! ## Weak Typing
//!
//! Coercion happens in exactly three places, [`unpack_number`], [`unpack_string`] and
//! [`unpack_bool`], and every primitive that needs a number, a string or a boolean goes
//! through them. A value that cannot be coerced produces `TypeMismatch`.
//!
//! ## Error Handling
//!
//! - Arity is checked before any argument is looked at
//! - Arguments are unpacked left to right and the first failure is returned
//! - Division by zero and 64-bit overflow are reported, never wrapped or panicked on
//!
//! ## Adding New Operations
//!
//! 1. Implement `fn(args: &[Value]) -> Result<Value, Error>`
//! 2. Add an entry to `BUILTIN_OPS`
//! 3. Add cases to `test_builtin_function_implementations`

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{NumberType, Value};

/// Canonical signature shared by primitives and I/O primitives
pub type PrimitiveFn = fn(&[Value]) -> Result<Value, Error>;

/// Definition of a built-in operation
#[derive(Debug)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub name: &'static str,
    /// The implementation
    pub func: PrimitiveFn,
}

impl BuiltinOp {
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        (self.func)(args)
    }
}

//
// Weak-typing unpackers
//

/// Coerce to an integer: numbers as-is, strings by parsing, one-element lists by
/// unpacking their element
pub fn unpack_number(value: &Value) -> Result<NumberType, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::String(s) => s
            .parse::<NumberType>()
            .map_err(|_| Error::type_mismatch("number", value)),
        Value::List(items) => match items.as_slice() {
            [only] => unpack_number(only),
            _ => Err(Error::type_mismatch("number", value)),
        },
        _ => Err(Error::type_mismatch("number", value)),
    }
}

/// Coerce to text: strings as-is, numbers in decimal, booleans as `true`/`false`
pub fn unpack_string(value: &Value) -> Result<String, Error> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::type_mismatch("string", value)),
    }
}

pub fn unpack_bool(value: &Value) -> Result<bool, Error> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(Error::type_mismatch("boolean", value)),
    }
}

//
// Builtin Function Implementations
//

fn overflow(operation: &str) -> Error {
    Error::DefaultError(format!("Integer overflow in {operation}"))
}

fn division_by_zero() -> Error {
    Error::DefaultError("Division by zero".into())
}

/// Unpack every argument, then fold left to right. Needs at least two arguments.
fn numeric_fold(
    args: &[Value],
    op: fn(NumberType, NumberType) -> Result<NumberType, Error>,
) -> Result<Value, Error> {
    if args.len() < 2 {
        return Err(Error::num_args(2, args));
    }
    let numbers = args
        .iter()
        .map(unpack_number)
        .collect::<Result<Vec<_>, _>>()?;

    let (first, rest) = numbers
        .split_first()
        .ok_or_else(|| Error::num_args(2, args))?;
    rest.iter()
        .try_fold(*first, |acc, &n| op(acc, n))
        .map(Value::Number)
}

fn checked_add(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_add(b).ok_or_else(|| overflow("addition"))
}

fn checked_sub(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_sub(b).ok_or_else(|| overflow("subtraction"))
}

fn checked_mul(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    a.checked_mul(b).ok_or_else(|| overflow("multiplication"))
}

/// Division rounding toward negative infinity
fn floor_div(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(division_by_zero());
    }
    let quotient = a.checked_div(b).ok_or_else(|| overflow("division"))?;
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Modulo taking the sign of the divisor
fn floor_mod(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(division_by_zero());
    }
    let remainder = a.wrapping_rem(b);
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

/// Division rounding toward zero
fn truncate_div(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(division_by_zero());
    }
    a.checked_div(b).ok_or_else(|| overflow("division"))
}

/// Remainder taking the sign of the dividend
fn truncate_rem(a: NumberType, b: NumberType) -> Result<NumberType, Error> {
    if b == 0 {
        return Err(division_by_zero());
    }
    Ok(a.wrapping_rem(b))
}

macro_rules! numeric_op {
    ($name:ident, $op:ident) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            numeric_fold(args, $op)
        }
    };
}

numeric_op!(builtin_add, checked_add);
numeric_op!(builtin_sub, checked_sub);
numeric_op!(builtin_mul, checked_mul);
numeric_op!(builtin_div, floor_div);
numeric_op!(builtin_mod, floor_mod);
numeric_op!(builtin_quotient, truncate_div);
numeric_op!(builtin_remainder, truncate_rem);

// Macro to generate binary comparisons over one of the unpackers.
// Both sides are unpacked before the operator runs, so `(&& #f 1)` is a type error.
macro_rules! bool_binop {
    ($name:ident, $unpack:ident, $op:tt) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            match args {
                [left, right] => {
                    let left = $unpack(left)?;
                    let right = $unpack(right)?;
                    Ok(Value::Bool(left $op right))
                }
                _ => Err(Error::num_args(2, args)),
            }
        }
    };
}

bool_binop!(builtin_num_eq, unpack_number, ==);
bool_binop!(builtin_lt, unpack_number, <);
bool_binop!(builtin_gt, unpack_number, >);
bool_binop!(builtin_ne, unpack_number, !=);
bool_binop!(builtin_ge, unpack_number, >=);
bool_binop!(builtin_le, unpack_number, <=);
bool_binop!(builtin_and, unpack_bool, &&);
bool_binop!(builtin_or, unpack_bool, ||);
bool_binop!(builtin_string_eq, unpack_string, ==);
bool_binop!(builtin_string_lt, unpack_string, <);
bool_binop!(builtin_string_gt, unpack_string, >);
bool_binop!(builtin_string_le, unpack_string, <=);
bool_binop!(builtin_string_ge, unpack_string, >=);

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::List(items)] | [Value::DottedList(items, _)] => match items.first() {
            Some(first) => Ok(first.clone()),
            None => Err(Error::type_mismatch("pair", &args[0])),
        },
        [other] => Err(Error::type_mismatch("pair", other)),
        _ => Err(Error::num_args(1, args)),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::List(items)] => match items.split_first() {
            Some((_, rest)) => Ok(Value::List(rest.to_vec())),
            None => Err(Error::type_mismatch("pair", &args[0])),
        },
        [Value::DottedList(heads, tail)] => match heads.as_slice() {
            [_] => Ok((**tail).clone()),
            [_, rest @ ..] => Ok(Value::DottedList(rest.to_vec(), tail.clone())),
            [] => Err(Error::type_mismatch("pair", &args[0])),
        },
        [other] => Err(Error::type_mismatch("pair", other)),
        _ => Err(Error::num_args(1, args)),
    }
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    match args {
        [head, Value::List(tail)] => {
            let mut items = Vec::with_capacity(tail.len() + 1);
            items.push(head.clone());
            items.extend_from_slice(tail);
            Ok(Value::List(items))
        }
        [head, Value::DottedList(heads, tail)] => {
            let mut items = Vec::with_capacity(heads.len() + 1);
            items.push(head.clone());
            items.extend_from_slice(heads);
            Ok(Value::DottedList(items, tail.clone()))
        }
        [head, tail] => Ok(Value::DottedList(vec![head.clone()], Box::new(tail.clone()))),
        _ => Err(Error::num_args(2, args)),
    }
}

fn builtin_eqv(args: &[Value]) -> Result<Value, Error> {
    match args {
        [left, right] => Ok(Value::Bool(left == right)),
        _ => Err(Error::num_args(2, args)),
    }
}

fn unpacks_equal<T: PartialEq>(
    left: &Value,
    right: &Value,
    unpack: fn(&Value) -> Result<T, Error>,
) -> bool {
    matches!((unpack(left), unpack(right)), (Ok(a), Ok(b)) if a == b)
}

fn all_equal(left: &[Value], right: &[Value]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(a, b)| values_equal(a, b))
}

/// `equal?` semantics: element-wise on lists, otherwise equal after any common coercion,
/// otherwise `eqv?`
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(a), Value::List(b)) => all_equal(a, b),
        (Value::DottedList(a, tail_a), Value::DottedList(b, tail_b)) => {
            all_equal(a, b) && values_equal(tail_a, tail_b)
        }
        _ => {
            unpacks_equal(left, right, unpack_number)
                || unpacks_equal(left, right, unpack_string)
                || unpacks_equal(left, right, unpack_bool)
                || left == right
        }
    }
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    match args {
        [left, right] => Ok(Value::Bool(values_equal(left, right))),
        _ => Err(Error::num_args(2, args)),
    }
}

// Macro to generate one-argument type predicates
macro_rules! type_predicate {
    ($name:ident, $pattern:pat $(if $guard:expr)?) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            match args {
                [value] => Ok(Value::Bool(matches!(value, $pattern $(if $guard)?))),
                _ => Err(Error::num_args(1, args)),
            }
        }
    };
}

type_predicate!(builtin_is_symbol, Value::Atom(_));
type_predicate!(builtin_is_string, Value::String(_));
type_predicate!(builtin_is_number, Value::Number(_));
type_predicate!(builtin_is_boolean, Value::Bool(_));
type_predicate!(builtin_is_list, Value::List(_));
type_predicate!(
    builtin_is_pair,
    Value::List(items) | Value::DottedList(items, _) if !items.is_empty()
);
type_predicate!(builtin_is_null, value if value.is_nil());
type_predicate!(
    builtin_is_procedure,
    Value::Primitive(_) | Value::IoPrimitive(_) | Value::Closure { .. }
);

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => Ok(Value::Bool(!value.is_truthy())),
        _ => Err(Error::num_args(1, args)),
    }
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args.to_vec()))
}

fn builtin_length(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::List(items)] => NumberType::try_from(items.len())
            .map(Value::Number)
            .map_err(|_| overflow("length")),
        [other] => Err(Error::type_mismatch("list", other)),
        _ => Err(Error::num_args(1, args)),
    }
}

fn builtin_symbol_to_string(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Atom(name)] => Ok(Value::String(name.clone())),
        [other] => Err(Error::type_mismatch("symbol", other)),
        _ => Err(Error::num_args(1, args)),
    }
}

fn builtin_string_to_symbol(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => unpack_string(value).map(Value::Atom),
        _ => Err(Error::num_args(1, args)),
    }
}

fn builtin_string_length(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => {
            let text = unpack_string(value)?;
            NumberType::try_from(text.chars().count())
                .map(Value::Number)
                .map_err(|_| overflow("string-length"))
        }
        _ => Err(Error::num_args(1, args)),
    }
}

fn builtin_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        result.push_str(&unpack_string(arg)?);
    }
    Ok(Value::String(result))
}

/// Global registry of all built-in operations.
#[rustfmt::skip]
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp { name: "+", func: builtin_add },
    BuiltinOp { name: "-", func: builtin_sub },
    BuiltinOp { name: "*", func: builtin_mul },
    BuiltinOp { name: "/", func: builtin_div },
    BuiltinOp { name: "mod", func: builtin_mod },
    BuiltinOp { name: "quotient", func: builtin_quotient },
    BuiltinOp { name: "remainder", func: builtin_remainder },
    // Comparison operations
    BuiltinOp { name: "=", func: builtin_num_eq },
    BuiltinOp { name: "<", func: builtin_lt },
    BuiltinOp { name: ">", func: builtin_gt },
    BuiltinOp { name: "/=", func: builtin_ne },
    BuiltinOp { name: ">=", func: builtin_ge },
    BuiltinOp { name: "<=", func: builtin_le },
    // Logical operations
    BuiltinOp { name: "&&", func: builtin_and },
    BuiltinOp { name: "||", func: builtin_or },
    BuiltinOp { name: "not", func: builtin_not },
    // String comparisons
    BuiltinOp { name: "string=?", func: builtin_string_eq },
    BuiltinOp { name: "string<?", func: builtin_string_lt },
    BuiltinOp { name: "string>?", func: builtin_string_gt },
    BuiltinOp { name: "string<=?", func: builtin_string_le },
    BuiltinOp { name: "string>=?", func: builtin_string_ge },
    // List operations
    BuiltinOp { name: "car", func: builtin_car },
    BuiltinOp { name: "cdr", func: builtin_cdr },
    BuiltinOp { name: "cons", func: builtin_cons },
    BuiltinOp { name: "list", func: builtin_list },
    BuiltinOp { name: "length", func: builtin_length },
    // Equivalence
    BuiltinOp { name: "eq?", func: builtin_eqv },
    BuiltinOp { name: "eqv?", func: builtin_eqv },
    BuiltinOp { name: "equal?", func: builtin_equal },
    // Type predicates
    BuiltinOp { name: "symbol?", func: builtin_is_symbol },
    BuiltinOp { name: "string?", func: builtin_is_string },
    BuiltinOp { name: "number?", func: builtin_is_number },
    BuiltinOp { name: "boolean?", func: builtin_is_boolean },
    BuiltinOp { name: "list?", func: builtin_is_list },
    BuiltinOp { name: "pair?", func: builtin_is_pair },
    BuiltinOp { name: "null?", func: builtin_is_null },
    BuiltinOp { name: "procedure?", func: builtin_is_procedure },
    // Strings and symbols
    BuiltinOp { name: "symbol->string", func: builtin_symbol_to_string },
    BuiltinOp { name: "string->symbol", func: builtin_string_to_symbol },
    BuiltinOp { name: "string-length", func: builtin_string_length },
    BuiltinOp { name: "string-append", func: builtin_string_append },
];

/// Lazy static map from name to BuiltinOp
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.name, op)).collect());

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a primitive by its Scheme identifier
pub fn find_primitive(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(name).copied()
}
