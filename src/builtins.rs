use crate::value::{Builtin, Value};
use anyhow::{bail, Result};
use std::rc::Rc;

/// Builtin functions in registration order; compiled programs refer to
/// entries by index, so the order is part of the bytecode contract.
pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        function: builtin_len,
    },
    Builtin {
        name: "puts",
        function: builtin_puts,
    },
    Builtin {
        name: "first",
        function: builtin_first,
    },
    Builtin {
        name: "last",
        function: builtin_last,
    },
    Builtin {
        name: "rest",
        function: builtin_rest,
    },
    Builtin {
        name: "push",
        function: builtin_push,
    },
];

fn builtin_len(args: &[Value]) -> Result<Option<Value>> {
    if args.len() != 1 {
        bail!("wrong number of arguments. got={}, want=1", args.len());
    }
    match &args[0] {
        Value::Str(value) => Ok(Some(Value::Integer(value.len() as i64))),
        Value::Array(elements) => Ok(Some(Value::Integer(elements.len() as i64))),
        other => bail!("argument to `len` not supported, got {}", other.type_name()),
    }
}

fn builtin_puts(args: &[Value]) -> Result<Option<Value>> {
    for arg in args {
        println!("{}", arg);
    }
    Ok(None)
}

fn builtin_first(args: &[Value]) -> Result<Option<Value>> {
    if args.len() != 1 {
        bail!("wrong number of arguments. got={}, want=1", args.len());
    }
    match &args[0] {
        Value::Array(elements) => Ok(elements.first().cloned()),
        other => bail!("argument to `first` must be ARRAY, got {}", other.type_name()),
    }
}

fn builtin_last(args: &[Value]) -> Result<Option<Value>> {
    if args.len() != 1 {
        bail!("wrong number of arguments. got={}, want=1", args.len());
    }
    match &args[0] {
        Value::Array(elements) => Ok(elements.last().cloned()),
        other => bail!("argument to `last` must be ARRAY, got {}", other.type_name()),
    }
}

fn builtin_rest(args: &[Value]) -> Result<Option<Value>> {
    if args.len() != 1 {
        bail!("wrong number of arguments. got={}, want=1", args.len());
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Ok(None);
            }
            let rest = elements[1..].to_vec();
            Ok(Some(Value::Array(Rc::new(rest))))
        }
        other => bail!("argument to `rest` must be ARRAY, got {}", other.type_name()),
    }
}

fn builtin_push(args: &[Value]) -> Result<Option<Value>> {
    if args.len() != 2 {
        bail!("wrong number of arguments. got={}, want=2", args.len());
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut pushed = elements.as_ref().clone();
            pushed.push(args[1].clone());
            Ok(Some(Value::Array(Rc::new(pushed))))
        }
        other => bail!("argument to `push` must be ARRAY, got {}", other.type_name()),
    }
}
