//! Runtime values and the pure operators shared with the optimizer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::ast::{AbstractMethod, BinaryOp, Block, FunctionDef, Literal, MethodDef, Node, UnaryOp};
use crate::core::error::CobraError;
use crate::core::interpreter::generator::GeneratorRef;
use crate::core::interpreter::{Interpreter, RuntimeError};

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Lists are immutable; operations build new ones.
    List(Arc<Vec<Value>>),
    /// Insertion-ordered pairs.
    Dict(Arc<Vec<(Value, Value)>>),
    Option(Option<Box<Value>>),
    Function(Arc<FunctionDef>),
    Lambda(Arc<LambdaValue>),
    Builtin(Builtin),
    Class(Arc<ClassValue>),
    Instance(InstanceRef),
    BoundMethod(Arc<BoundMethod>),
    Generator(GeneratorRef),
    Thread(ThreadHandle),
    Enum(Arc<EnumType>),
    EnumMember(Arc<EnumType>, usize),
    Interface(Arc<InterfaceType>),
    Holobit(Arc<Vec<f64>>),
    Macro(Arc<MacroDef>),
    Range(RangeValue),
}

pub type InstanceRef = Arc<Mutex<Instance>>;

#[derive(Debug)]
pub struct LambdaValue {
    pub params: Vec<String>,
    pub body: Node,
}

#[derive(Debug)]
pub struct ClassValue {
    pub name: String,
    pub bases: Vec<Arc<ClassValue>>,
    pub methods: HashMap<String, Arc<MethodDef>>,
}

impl ClassValue {
    /// Depth-first search through the class and its resolved bases.
    pub fn find_method(&self, name: &str) -> Option<Arc<MethodDef>> {
        if let Some(m) = self.methods.get(name) {
            return Some(m.clone());
        }
        self.bases.iter().find_map(|b| b.find_method(name))
    }

    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.name == name || self.bases.iter().any(|b| b.is_subclass_of(name))
    }
}

#[derive(Debug)]
pub struct Instance {
    pub class: Arc<ClassValue>,
    pub attributes: HashMap<String, Value>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: InstanceRef,
    pub method: Arc<MethodDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHandle {
    pub id: usize,
}

/// `rango(start, stop, step)`. Items are produced on demand, so a range is
/// the same size whatever its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    /// `step` must not be zero.
    pub fn new(start: i64, stop: i64, step: i64) -> Self {
        RangeValue { start, stop, step }
    }

    pub fn len(&self) -> u64 {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let n = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / -step + 1
        } else {
            0
        };
        n as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`, if it is in range.
    pub fn get(&self, index: u64) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        i64::try_from(self.start as i128 + index as i128 * self.step as i128).ok()
    }

    pub fn contains(&self, n: i64) -> bool {
        let offset = n as i128 - self.start as i128;
        let step = self.step as i128;
        if offset % step != 0 {
            return false;
        }
        let index = offset / step;
        index >= 0 && (index as u128) < self.len() as u128
    }
}

#[derive(Debug)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug)]
pub struct InterfaceType {
    pub name: String,
    pub methods: Vec<AbstractMethod>,
}

#[derive(Debug)]
pub struct MacroDef {
    pub name: String,
    pub body: Block,
}

pub type BuiltinFn = fn(&mut Interpreter, Vec<Value>) -> Result<Value, CobraError>;

/// Arity value for builtins taking any number of arguments.
pub const VARIADIC: usize = usize::MAX;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub f: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

impl Value {
    pub fn from_literal(lit: &Literal) -> Value {
        match lit {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }

    /// Back to a literal; only scalar values have one.
    pub fn to_literal(&self) -> Option<Literal> {
        Some(match self {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(*b),
            Value::Int(i) => Literal::Int(*i),
            Value::Float(x) if x.is_finite() => Literal::Float(*x),
            Value::Str(s) => Literal::Str(s.clone()),
            _ => return None,
        })
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(items))
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "nulo".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "entero".into(),
            Value::Float(_) => "flotante".into(),
            Value::Str(_) => "cadena".into(),
            Value::List(_) => "lista".into(),
            Value::Dict(_) => "diccionario".into(),
            Value::Option(_) => "opcion".into(),
            Value::Function(_) | Value::Lambda(_) => "funcion".into(),
            Value::Builtin(_) => "builtin".into(),
            Value::Class(_) => "clase".into(),
            Value::Instance(i) => i.lock().class.name.clone(),
            Value::BoundMethod(_) => "metodo".into(),
            Value::Generator(_) => "generador".into(),
            Value::Thread(_) => "hilo".into(),
            Value::Enum(_) => "enum".into(),
            Value::EnumMember(e, _) => e.name.clone(),
            Value::Interface(_) => "interfaz".into(),
            Value::Holobit(_) => "holobit".into(),
            Value::Macro(_) => "macro".into(),
            Value::Range(_) => "rango".into(),
        }
    }

    /// Truthiness without special-method dispatch; instances are always true
    /// here. The interpreter consults `__bool__` / `__len__` first.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Option(o) => o.is_some(),
            Value::Holobit(h) => !h.is_empty(),
            Value::Range(r) => !r.is_empty(),
            _ => true,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Text shown inside containers: strings are quoted.
    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nulo"),
            Value::Bool(b) => write!(f, "{}", if *b { "verdadero" } else { "falso" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Dict(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{}: {}", k.repr(), v.repr())).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Option(Some(v)) => write!(f, "Some({})", v.repr()),
            Value::Option(None) => write!(f, "None"),
            Value::Function(d) => write!(f, "<funcion {}>", d.name),
            Value::Lambda(_) => write!(f, "<lambda>"),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Class(c) => write!(f, "<clase {}>", c.name),
            Value::Instance(i) => write!(f, "<objeto {}>", i.lock().class.name),
            Value::BoundMethod(m) => write!(f, "<metodo {}>", m.method.name),
            Value::Generator(_) => write!(f, "<generador>"),
            Value::Thread(t) => write!(f, "<hilo {}>", t.id),
            Value::Enum(e) => write!(f, "<enum {}>", e.name),
            Value::EnumMember(e, i) => write!(f, "{}.{}", e.name, e.members.get(*i).map(String::as_str).unwrap_or("?")),
            Value::Interface(i) => write!(f, "<interfaz {}>", i.name),
            Value::Holobit(h) => {
                let parts: Vec<String> = h.iter().map(|x| format!("{:?}", x)).collect();
                write!(f, "holobit[{}]", parts.join(", "))
            }
            Value::Macro(m) => write!(f, "<macro {}>", m.name),
            Value::Range(r) if r.step == 1 => write!(f, "rango({}, {})", r.start, r.stop),
            Value::Range(r) => write!(f, "rango({}, {}, {})", r.start, r.stop, r.step),
        }
    }
}

/// Structural equality; numbers compare across int/float, reference types
/// by identity.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    use Value::*;
    match (a, b) {
        (Null, Null) => true,
        (Bool(x), Bool(y)) => x == y,
        (Int(x), Int(y)) => x == y,
        (Int(_) | Float(_), Int(_) | Float(_)) => a.as_f64() == b.as_f64(),
        (Str(x), Str(y)) => x == y,
        (List(x), List(y)) => x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r)),
        (Dict(x), Dict(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| dict_get(y, k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        (Option(x), Option(y)) => match (x, y) {
            (Some(l), Some(r)) => values_equal(l, r),
            (None, None) => true,
            _ => false,
        },
        (Function(x), Function(y)) => Arc::ptr_eq(x, y),
        (Lambda(x), Lambda(y)) => Arc::ptr_eq(x, y),
        (Builtin(x), Builtin(y)) => x.name == y.name,
        (Class(x), Class(y)) => Arc::ptr_eq(x, y),
        (Instance(x), Instance(y)) => Arc::ptr_eq(x, y),
        (Generator(x), Generator(y)) => Arc::ptr_eq(x, y),
        (Thread(x), Thread(y)) => x == y,
        (Enum(x), Enum(y)) => Arc::ptr_eq(x, y),
        (EnumMember(x, i), EnumMember(y, j)) => Arc::ptr_eq(x, y) && i == j,
        (Holobit(x), Holobit(y)) => x == y,
        (Range(x), Range(y)) => x == y,
        _ => false,
    }
}

pub fn dict_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| values_equal(k, key)).map(|(_, v)| v)
}

fn type_error(op: BinaryOp, l: &Value, r: &Value) -> RuntimeError {
    RuntimeError::Type(format!("unsupported operands for '{}': {} and {}", op, l.type_name(), r.type_name()))
}

fn not_arithmetic(op: BinaryOp) -> RuntimeError {
    RuntimeError::Type(format!("operator '{}' is not arithmetic", op))
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            // floored: the result takes the divisor's sign
            a.checked_rem(b).map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        _ => return Err(not_arithmetic(op)),
    };
    out.map(Value::Int).ok_or(RuntimeError::Overflow)
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        _ => return Err(not_arithmetic(op)),
    }))
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering;
    let ord = match (l, r) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ if l.is_number() && r.is_number() => {
            let (a, b) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            match a.partial_cmp(&b) {
                Some(o) => o,
                // NaN compares false with everything
                None => return Ok(Value::Bool(false)),
            }
        }
        _ => return Err(type_error(op, l, r)),
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    }))
}

/// Evaluates `l op r` for plain values. `&&` and `||` are evaluated on
/// truthiness; the interpreter short-circuits before getting here.
pub fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    match op {
        Add => match (l, r) {
            (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => Ok(Value::list(a.iter().chain(b.iter()).cloned().collect())),
            _ if l.is_number() && r.is_number() => float_op(op, l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0)),
            _ => Err(type_error(op, l, r)),
        },
        Sub | Mul | Mod => match (l, r) {
            (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
            _ if l.is_number() && r.is_number() => float_op(op, l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0)),
            _ => Err(type_error(op, l, r)),
        },
        Div => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => float_op(op, a, b),
            _ => Err(type_error(op, l, r)),
        },
        Eq => Ok(Value::Bool(values_equal(l, r))),
        Ne => Ok(Value::Bool(!values_equal(l, r))),
        Lt | Le | Gt | Ge => compare(op, l, r),
        And => Ok(Value::Bool(l.is_truthy() && r.is_truthy())),
        Or => Ok(Value::Bool(l.is_truthy() || r.is_truthy())),
    }
}

pub fn apply_unary(op: UnaryOp, v: &Value) -> Result<Value, RuntimeError> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or(RuntimeError::Overflow),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Neg, other) => Err(RuntimeError::Type(format!("bad operand for unary '-': {}", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_yields_float() {
        let v = apply_binary(BinaryOp::Div, &Value::Int(7), &Value::Int(2)).unwrap();
        assert!(matches!(v, Value::Float(x) if x == 3.5));
    }

    #[test]
    fn modulo_is_floored() {
        let v = apply_binary(BinaryOp::Mod, &Value::Int(-7), &Value::Int(3)).unwrap();
        assert!(matches!(v, Value::Int(2)));
        let v = apply_binary(BinaryOp::Mod, &Value::Int(7), &Value::Int(-3)).unwrap();
        assert!(matches!(v, Value::Int(-2)));
    }

    #[test]
    fn zero_division_and_overflow_are_errors() {
        assert!(matches!(apply_binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)), Err(RuntimeError::DivisionByZero)));
        assert!(matches!(apply_binary(BinaryOp::Mod, &Value::Float(1.0), &Value::Float(0.0)), Err(RuntimeError::DivisionByZero)));
        assert!(matches!(apply_binary(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)), Err(RuntimeError::Overflow)));
        assert!(matches!(apply_unary(UnaryOp::Neg, &Value::Int(i64::MIN)), Err(RuntimeError::Overflow)));
    }

    #[test]
    fn mixed_types() {
        assert!(matches!(apply_binary(BinaryOp::Add, &Value::str("a"), &Value::Int(1)), Err(RuntimeError::Type(_))));
        let s = apply_binary(BinaryOp::Add, &Value::str("co"), &Value::str("bra")).unwrap();
        assert_eq!(s.to_string(), "cobra");
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
    }

    #[test]
    fn ranges_are_computed_not_stored() {
        let r = RangeValue::new(0, 3_000_000_000, 1);
        assert_eq!(r.len(), 3_000_000_000);
        assert_eq!(r.get(2_999_999_999), Some(2_999_999_999));
        assert_eq!(r.get(3_000_000_000), None);
        let down = RangeValue::new(5, 0, -2);
        assert_eq!(down.len(), 3);
        assert!(down.contains(1) && !down.contains(2) && !down.contains(-1));
        assert!(RangeValue::new(3, 3, 1).is_empty());
        assert_eq!(RangeValue::new(i64::MIN, i64::MAX, 1).len(), u64::MAX);
        assert_eq!(Value::Range(down).to_string(), "rango(5, 0, -2)");
    }

    #[test]
    fn display_forms() {
        let l = Value::list(vec![Value::Int(1), Value::str("x"), Value::Bool(true)]);
        assert_eq!(l.to_string(), "[1, \"x\", verdadero]");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Null.to_string(), "nulo");
    }
}
