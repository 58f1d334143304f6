//! Native functions visible from every program.

use crate::core::error::CobraError;
use crate::core::interpreter::value::{dict_get, values_equal, Builtin, RangeValue, Value, VARIADIC};
use crate::core::interpreter::{Interpreter, RuntimeError};

const TABLE: &[Builtin] = &[
    Builtin { name: "imprimir", arity: VARIADIC, f: builtin_print },
    Builtin { name: "longitud", arity: 1, f: builtin_len },
    Builtin { name: "rango", arity: VARIADIC, f: builtin_range },
    Builtin { name: "texto", arity: 1, f: builtin_str },
    Builtin { name: "entero", arity: 1, f: builtin_int },
    Builtin { name: "flotante", arity: 1, f: builtin_float },
    Builtin { name: "tipo", arity: 1, f: builtin_type },
    Builtin { name: "siguiente", arity: 1, f: builtin_next },
    Builtin { name: "lista", arity: 1, f: builtin_list },
    Builtin { name: "contiene", arity: 2, f: builtin_contains },
];

pub fn lookup(name: &str) -> Option<Builtin> {
    TABLE.iter().find(|b| b.name == name).copied()
}

pub fn names() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|b| b.name)
}

fn type_error(msg: String) -> CobraError {
    RuntimeError::Type(msg).into()
}

// One line per argument.
fn builtin_print(i: &mut Interpreter, args: Vec<Value>) -> Result<Value, CobraError> {
    for arg in &args {
        let text = i.to_display(arg)?;
        i.write_line(&text)?;
    }
    Ok(Value::Null)
}

fn builtin_len(i: &mut Interpreter, mut args: Vec<Value>) -> Result<Value, CobraError> {
    let n = match args.remove(0) {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Dict(entries) => entries.len(),
        Value::Holobit(h) => h.len(),
        Value::Enum(e) => e.members.len(),
        Value::Range(r) => return i64::try_from(r.len()).map(Value::Int).map_err(|_| RuntimeError::Overflow.into()),
        Value::Instance(inst) => match i.find_special(&inst, "__len__") {
            Some(m) => return i.call_method(inst, m, Vec::new()),
            None => return Err(type_error(format!("'{}' has no length", inst.lock().class.name))),
        },
        other => return Err(type_error(format!("'{}' has no length", other.type_name()))),
    };
    Ok(Value::Int(n as i64))
}

fn builtin_range(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, CobraError> {
    let mut bounds = Vec::with_capacity(args.len());
    for a in &args {
        match a {
            Value::Int(n) => bounds.push(*n),
            other => return Err(type_error(format!("rango expects integers, got {}", other.type_name()))),
        }
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(RuntimeError::Arity { callee: "rango".into(), expected: 3, got: args.len() }.into());
        }
    };
    if step == 0 {
        return Err(RuntimeError::Type("rango step cannot be zero".into()).into());
    }
    Ok(Value::Range(RangeValue::new(start, stop, step)))
}

fn builtin_str(i: &mut Interpreter, args: Vec<Value>) -> Result<Value, CobraError> {
    let text = i.to_display(&args[0])?;
    Ok(Value::Str(text))
}

fn builtin_int(_i: &mut Interpreter, mut args: Vec<Value>) -> Result<Value, CobraError> {
    match args.remove(0) {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(_) => Err(RuntimeError::Overflow.into()),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| type_error(format!("cannot convert '{}' to entero", s))),
        other => Err(type_error(format!("cannot convert {} to entero", other.type_name()))),
    }
}

fn builtin_float(_i: &mut Interpreter, mut args: Vec<Value>) -> Result<Value, CobraError> {
    match args.remove(0) {
        Value::Float(f) => Ok(Value::Float(f)),
        Value::Int(n) => Ok(Value::Float(n as f64)),
        Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| type_error(format!("cannot convert '{}' to flotante", s))),
        other => Err(type_error(format!("cannot convert {} to flotante", other.type_name()))),
    }
}

fn builtin_type(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, CobraError> {
    Ok(Value::Str(args[0].type_name()))
}

/// Next value of a generator, or `nulo` once it is exhausted.
fn builtin_next(i: &mut Interpreter, mut args: Vec<Value>) -> Result<Value, CobraError> {
    match args.remove(0) {
        Value::Generator(g) => Ok(i.resume(&g)?.unwrap_or(Value::Null)),
        other => Err(type_error(format!("siguiente expects a generator, got {}", other.type_name()))),
    }
}

fn builtin_list(i: &mut Interpreter, mut args: Vec<Value>) -> Result<Value, CobraError> {
    let items = i.collect_items(args.remove(0))?;
    Ok(Value::list(items))
}

fn builtin_contains(i: &mut Interpreter, mut args: Vec<Value>) -> Result<Value, CobraError> {
    let item = args.pop().unwrap_or(Value::Null);
    let container = args.pop().unwrap_or(Value::Null);
    let found = match &container {
        Value::List(items) => items.iter().any(|v| values_equal(v, &item)),
        Value::Dict(entries) => dict_get(entries, &item).is_some(),
        Value::Str(s) => match &item {
            Value::Str(needle) => s.contains(needle.as_str()),
            other => return Err(type_error(format!("cannot search a texto for {}", other.type_name()))),
        },
        Value::Range(r) => matches!(item, Value::Int(n) if r.contains(n)),
        Value::Holobit(h) => match item {
            Value::Int(n) => h.iter().any(|x| *x == n as f64),
            Value::Float(f) => h.contains(&f),
            _ => false,
        },
        Value::Instance(inst) => match i.find_special(inst, "__contains__") {
            Some(m) => {
                let out = i.call_method(inst.clone(), m, vec![item])?;
                return Ok(Value::Bool(i.truthy(&out)?));
            }
            None => return Err(type_error(format!("'{}' does not support contiene", inst.lock().class.name))),
        },
        other => return Err(type_error(format!("'{}' does not support contiene", other.type_name()))),
    };
    Ok(Value::Bool(found))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, CobraError> {
        let mut interp = Interpreter::new();
        let b = lookup(name).expect("builtin exists");
        interp.call_value(Value::Builtin(b), args)
    }

    #[test]
    fn range_forms() {
        let v = call("rango", vec![Value::Int(3)]).unwrap();
        assert_eq!(call("lista", vec![v]).unwrap().to_string(), "[0, 1, 2]");
        let v = call("rango", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap();
        assert_eq!(call("lista", vec![v]).unwrap().to_string(), "[5, 3, 1]");
        let huge = call("rango", vec![Value::Int(3_000_000_000)]).unwrap();
        assert!(matches!(call("longitud", vec![huge.clone()]).unwrap(), Value::Int(3_000_000_000)));
        assert!(matches!(call("contiene", vec![huge, Value::Int(7)]).unwrap(), Value::Bool(true)));
        assert!(call("rango", vec![Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
        assert!(call("rango", vec![]).is_err());
    }

    #[test]
    fn conversions() {
        assert!(matches!(call("entero", vec![Value::str(" 42 ")]).unwrap(), Value::Int(42)));
        assert!(matches!(call("entero", vec![Value::Float(-2.9)]).unwrap(), Value::Int(-2)));
        assert!(matches!(call("flotante", vec![Value::Int(2)]).unwrap(), Value::Float(f) if f == 2.0));
        assert!(call("entero", vec![Value::str("dos")]).is_err());
    }

    #[test]
    fn length_and_membership() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(call("longitud", vec![list.clone()]).unwrap(), Value::Int(2)));
        assert!(matches!(call("longitud", vec![Value::str("año")]).unwrap(), Value::Int(3)));
        assert!(matches!(call("contiene", vec![list, Value::Int(2)]).unwrap(), Value::Bool(true)));
        assert!(matches!(
            call("contiene", vec![Value::str("cobra"), Value::str("obr")]).unwrap(),
            Value::Bool(true)
        ));
    }

    #[test]
    fn every_builtin_is_known_to_the_analyzer() {
        for name in names() {
            assert!(crate::core::semantic_analyzer::BUILTINS.contains(&name), "{}", name);
        }
    }
}
