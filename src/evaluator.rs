//! Expression evaluation: special forms, function application and the root environment.
//!
//! `eval` and `apply` are mutually recursive and follow the host stack directly. A list
//! whose head is one of the special-form keywords is dispatched by shape; every other list
//! is an application. Keywords are recognized by name, not by lookup, so rebinding `if`
//! or `define` does not change how those forms evaluate.

mod environment;

pub use environment::Environment;

use crate::Error;
use crate::ast::Value;
use crate::builtinops::get_builtin_ops;
use crate::io;

/// Signature of a special form: unevaluated arguments, the whole form for error
/// reporting, and the caller's environment
type SpecialForm = fn(&[Value], &Value, &mut Environment) -> Result<Value, Error>;

fn find_special_form(keyword: &str) -> Option<SpecialForm> {
    let special_form: SpecialForm = match keyword {
        "quote" => eval_quote,
        "if" => eval_if,
        "set!" => eval_set,
        "define" => eval_define,
        "lambda" => eval_lambda,
        "load" => eval_load,
        "begin" => eval_begin,
        "cond" => eval_cond,
        "case" => eval_case,
        _ => return None,
    };
    Some(special_form)
}

/// Evaluate an S-expression
pub fn eval(expr: &Value, env: &mut Environment) -> Result<Value, Error> {
    log::trace!("eval {expr}");
    match expr {
        // Self-evaluating forms (the empty list is not one of them)
        Value::Number(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::Primitive(_)
        | Value::IoPrimitive(_)
        | Value::Closure { .. }
        | Value::Port(_) => Ok(expr.clone()),

        // Variable lookup
        Value::Atom(name) => env.lookup(name),

        Value::List(elements) => eval_list(elements, expr, env),

        Value::DottedList(..) => Err(Error::bad_form("Unrecognized special form", expr)),
    }
}

/// Evaluate a list expression: a special form, or a function application
fn eval_list(elements: &[Value], form: &Value, env: &mut Environment) -> Result<Value, Error> {
    let Some((head, arg_exprs)) = elements.split_first() else {
        return Err(Error::bad_form("Unrecognized special form", form));
    };

    if let Value::Atom(keyword) = head
        && let Some(special_form) = find_special_form(keyword)
    {
        return special_form(arg_exprs, form, env);
    }

    let func = match head {
        Value::Atom(name) if !env.is_bound(name) => {
            return Err(Error::not_function(
                "Unrecognized primitive function args",
                name.as_str(),
            ));
        }
        _ => eval(head, env)?,
    };
    let args = eval_args(arg_exprs, env)?;
    apply(&func, &args)
}

/// Evaluate argument expressions left to right, stopping at the first error
fn eval_args(args: &[Value], env: &mut Environment) -> Result<Vec<Value>, Error> {
    args.iter().map(|arg| eval(arg, env)).collect()
}

/// Evaluate a body in order and return the value of its last form
fn eval_body(body: &[Value], env: &mut Environment, empty_message: &str) -> Result<Value, Error> {
    let mut result = None;
    for expr in body {
        result = Some(eval(expr, env)?);
    }
    result.ok_or_else(|| Error::UnspecifiedReturn(empty_message.to_owned()))
}

/// Apply a callable to already-evaluated arguments
pub fn apply(func: &Value, args: &[Value]) -> Result<Value, Error> {
    match func {
        Value::Primitive(op) | Value::IoPrimitive(op) => {
            log::trace!("apply {} to {} args", op.name, args.len());
            op.call(args)
        }
        Value::Closure {
            params,
            vararg,
            body,
            env,
        } => {
            let arity_ok = match vararg {
                None => args.len() == params.len(),
                Some(_) => args.len() >= params.len(),
            };
            if !arity_ok {
                return Err(Error::num_args(params.len(), args));
            }
            log::trace!("apply {func} to {} args", args.len());

            let (positional, rest) = args.split_at(params.len());
            let mut bindings: Vec<(String, Value)> = params
                .iter()
                .cloned()
                .zip(positional.iter().cloned())
                .collect();
            if let Some(name) = vararg {
                bindings.push((name.clone(), Value::List(rest.to_vec())));
            }

            let mut call_env = env.extend(bindings);
            eval_body(body, &mut call_env, "Function body is empty")
        }
        other => Err(Error::not_function("Not a function", other.to_string())),
    }
}

/// Evaluate quote special form
fn eval_quote(args: &[Value], form: &Value, _env: &mut Environment) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::bad_form("Unrecognized special form", form)),
    }
}

/// Evaluate if special form. Only `#f` selects the alternative.
fn eval_if(args: &[Value], form: &Value, env: &mut Environment) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            if eval(condition_expr, env)?.is_truthy() {
                eval(then_expr, env)
            } else {
                eval(else_expr, env)
            }
        }
        _ => Err(Error::bad_form("Unrecognized special form", form)),
    }
}

/// Evaluate set! special form
fn eval_set(args: &[Value], form: &Value, env: &mut Environment) -> Result<Value, Error> {
    match args {
        [Value::Atom(name), expr] => {
            let value = eval(expr, env)?;
            env.set(name, value)
        }
        _ => Err(Error::bad_form("Unrecognized special form", form)),
    }
}

/// Evaluate define special form, in its variable, function and variadic function shapes
fn eval_define(args: &[Value], form: &Value, env: &mut Environment) -> Result<Value, Error> {
    match args {
        [Value::Atom(name), expr] => {
            let value = eval(expr, env)?;
            Ok(env.define(name, value))
        }
        [Value::List(signature), body @ ..] => match signature.split_first() {
            Some((Value::Atom(name), params)) => {
                let closure = make_closure(params, None, body, env, form)?;
                Ok(env.define(name, closure))
            }
            _ => Err(Error::bad_form("Unrecognized special form", form)),
        },
        [Value::DottedList(signature, vararg), body @ ..] => match signature.split_first() {
            Some((Value::Atom(name), params)) => {
                let closure = make_closure(params, Some(vararg.as_ref()), body, env, form)?;
                Ok(env.define(name, closure))
            }
            _ => Err(Error::bad_form("Unrecognized special form", form)),
        },
        _ => Err(Error::bad_form("Unrecognized special form", form)),
    }
}

/// Evaluate lambda special form
fn eval_lambda(args: &[Value], form: &Value, env: &mut Environment) -> Result<Value, Error> {
    match args {
        [Value::List(params), body @ ..] => make_closure(params, None, body, env, form),
        [Value::DottedList(params, vararg), body @ ..] => {
            make_closure(params, Some(vararg.as_ref()), body, env, form)
        }
        [vararg @ Value::Atom(_), body @ ..] => make_closure(&[], Some(vararg), body, env, form),
        _ => Err(Error::bad_form("Unrecognized special form", form)),
    }
}

/// Build a closure capturing `env` as it is now
fn make_closure(
    params: &[Value],
    vararg: Option<&Value>,
    body: &[Value],
    env: &Environment,
    form: &Value,
) -> Result<Value, Error> {
    let param_name = |param: &Value| match param {
        Value::Atom(name) => Ok(name.clone()),
        _ => Err(Error::bad_form("Parameters must be symbols", form)),
    };

    let params = params.iter().map(param_name).collect::<Result<Vec<_>, _>>()?;
    let vararg = vararg.map(param_name).transpose()?;

    Ok(Value::Closure {
        params,
        vararg,
        body: body.to_vec(),
        env: env.clone(),
    })
}

/// Evaluate load special form: every form in the file runs in the caller's environment
fn eval_load(args: &[Value], form: &Value, env: &mut Environment) -> Result<Value, Error> {
    match args {
        [Value::String(filename)] => {
            let program = io::load(filename)?;
            eval_body(&program, env, &format!("{filename} contains no expressions"))
        }
        _ => Err(Error::bad_form("Unrecognized special form", form)),
    }
}

fn eval_begin(args: &[Value], _form: &Value, env: &mut Environment) -> Result<Value, Error> {
    eval_body(args, env, "Empty begin")
}

fn is_else(value: &Value) -> bool {
    matches!(value, Value::Atom(name) if name == "else")
}

/// Evaluate cond special form. A clause without expressions yields its test value.
fn eval_cond(args: &[Value], _form: &Value, env: &mut Environment) -> Result<Value, Error> {
    for clause in args {
        let Value::List(parts) = clause else {
            return Err(Error::bad_form("Malformed cond clause", clause));
        };
        match parts.split_first() {
            Some((test, body)) if is_else(test) => {
                return eval_body(body, env, "Empty else clause");
            }
            Some((test, body)) => {
                let value = eval(test, env)?;
                if value.is_truthy() {
                    return if body.is_empty() {
                        Ok(value)
                    } else {
                        eval_body(body, env, "Empty cond clause")
                    };
                }
            }
            None => return Err(Error::bad_form("Malformed cond clause", clause)),
        }
    }
    Err(Error::UnspecifiedReturn("No cond clause matched".into()))
}

/// Evaluate case special form. Datums are compared to the key with `eqv?`.
fn eval_case(args: &[Value], form: &Value, env: &mut Environment) -> Result<Value, Error> {
    let Some((key_expr, clauses)) = args.split_first() else {
        return Err(Error::bad_form("Unrecognized special form", form));
    };
    let key = eval(key_expr, env)?;

    for clause in clauses {
        let Value::List(parts) = clause else {
            return Err(Error::bad_form("Malformed case clause", clause));
        };
        match parts.split_first() {
            Some((datums, body)) if is_else(datums) => {
                return eval_body(body, env, "Empty else clause");
            }
            Some((Value::List(datums), body)) => {
                if datums.contains(&key) {
                    return eval_body(body, env, "Empty case clause");
                }
            }
            _ => return Err(Error::bad_form("Malformed case clause", clause)),
        }
    }
    Err(Error::UnspecifiedReturn("No case clause matched".into()))
}

/// Create a root environment bound with every primitive and I/O primitive
pub fn create_global_env() -> Environment {
    let mut env = Environment::new();

    for builtin_op in get_builtin_ops() {
        env.define(builtin_op.name, Value::Primitive(builtin_op));
    }
    for io_op in io::get_io_ops() {
        env.define(io_op.name, Value::IoPrimitive(io_op));
    }

    log::debug!("created global environment");
    env
}
