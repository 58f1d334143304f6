//! Expression evaluation, calls and special-method dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::ast::{body_contains_yield, BinaryOp, FunctionDef, MethodDef, Node, UnaryOp};
use crate::core::error::CobraError;
use crate::core::interpreter::context::ContextKind;
use crate::core::interpreter::exec::method_as_function;
use crate::core::interpreter::generator::{self, GeneratorIter, GeneratorRef};
use crate::core::interpreter::value::{
    apply_binary, apply_unary, dict_get, values_equal, BoundMethod, ClassValue, Instance, InstanceRef, LambdaValue,
    RangeValue, Value, VARIADIC,
};
use crate::core::interpreter::{Flow, Interpreter, RuntimeError, MAX_CALL_DEPTH};

/// Something a `para` loop or comprehension can step through.
pub(crate) enum IterSource {
    Items(Vec<Value>, usize),
    Range(RangeValue, u64),
    Generator(GeneratorRef),
}

impl IterSource {
    /// Advances the source, resuming generators as needed.
    pub(crate) fn next(&mut self, interp: &mut Interpreter) -> Result<Option<Value>, CobraError> {
        match self {
            IterSource::Items(items, pos) => {
                let item = items.get(*pos).cloned();
                *pos += 1;
                Ok(item)
            }
            IterSource::Range(range, pos) => {
                let item = range.get(*pos).map(Value::Int);
                *pos += 1;
                Ok(item)
            }
            IterSource::Generator(g) => interp.resume(g),
        }
    }
}

impl Interpreter {
    pub(crate) fn eval(&mut self, node: &Node) -> Result<Value, CobraError> {
        self.validate(node)?;
        match node {
            Node::Value(lit) => Ok(Value::from_literal(lit)),
            Node::Identifier(name) => self.lookup(name),
            Node::Binary { left, op, right } => self.eval_binary(left, *op, right),
            Node::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!self.truthy(&v)?)),
                    UnaryOp::Neg => Ok(apply_unary(*op, &v)?),
                }
            }
            // awaiting is synchronous
            Node::Await(inner) => self.eval(inner),
            Node::Call { callee, args } => {
                let f = self.lookup(callee)?;
                let args = self.eval_args(args)?;
                self.call_value(f, args)
            }
            Node::MethodCall { object, method, args } => {
                let obj = self.eval(object)?;
                let args = self.eval_args(args)?;
                self.call_method_on(obj, method, args)
            }
            Node::Attribute { object, name } => {
                let obj = self.eval(object)?;
                self.get_attribute(obj, name)
            }
            Node::Instance { class_name, args } => {
                let class = match self.lookup(class_name)? {
                    Value::Class(c) => c,
                    other => {
                        return Err(RuntimeError::Type(format!("'{}' is a {}, not a class", class_name, other.type_name())).into())
                    }
                };
                let args = self.eval_args(args)?;
                self.instantiate(class, args)
            }
            Node::Lambda { params, body } => {
                let l = self.intern(node, || LambdaValue { params: params.clone(), body: (**body).clone() });
                Ok(Value::Lambda(l))
            }
            Node::Option(inner) => match inner {
                Some(e) => Ok(Value::Option(Some(Box::new(self.eval(e)?)))),
                None => Ok(Value::Option(None)),
            },
            Node::List(items) => Ok(Value::list(self.eval_args(items)?)),
            Node::Dict(entries) => {
                let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let k = self.eval(k)?;
                    let v = self.eval(v)?;
                    match out.iter_mut().find(|(existing, _)| values_equal(existing, &k)) {
                        Some(slot) => slot.1 = v,
                        None => out.push((k, v)),
                    }
                }
                Ok(Value::Dict(Arc::new(out)))
            }
            Node::ListComprehension { expr, var, iterable, cond } => {
                let mut out = Vec::new();
                self.comprehension(var, iterable, cond.as_deref(), |me| {
                    out.push(me.eval(expr)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            Node::DictComprehension { key, value, var, iterable, cond } => {
                let mut out: Vec<(Value, Value)> = Vec::new();
                self.comprehension(var, iterable, cond.as_deref(), |me| {
                    let k = me.eval(key)?;
                    let v = me.eval(value)?;
                    out.retain(|(existing, _)| !values_equal(existing, &k));
                    out.push((k, v));
                    Ok(())
                })?;
                Ok(Value::Dict(Arc::new(out)))
            }
            Node::Holobit { values, .. } => {
                let mut out = Vec::with_capacity(values.len());
                for v in values {
                    match self.eval(v)? {
                        Value::Int(i) => out.push(i as f64),
                        Value::Float(x) => out.push(x),
                        other => {
                            return Err(RuntimeError::Type(format!("holobit components must be numbers, got {}", other.type_name())).into())
                        }
                    }
                }
                Ok(Value::Holobit(Arc::new(out)))
            }
            Node::Thread(call) => self.eval_thread(call),
            other => Err(RuntimeError::Unsupported(format!("'{}' is not an expression", other.kind_name())).into()),
        }
    }

    fn eval_args(&mut self, args: &[Node]) -> Result<Vec<Value>, CobraError> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn eval_binary(&mut self, left: &Node, op: BinaryOp, right: &Node) -> Result<Value, CobraError> {
        let l = self.eval(left)?;
        match op {
            BinaryOp::And => {
                if !self.truthy(&l)? {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval(right)?;
                return Ok(Value::Bool(self.truthy(&r)?));
            }
            BinaryOp::Or => {
                if self.truthy(&l)? {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval(right)?;
                return Ok(Value::Bool(self.truthy(&r)?));
            }
            _ => {}
        }
        let r = self.eval(right)?;
        if let Some(v) = self.dispatch_comparison(op, &l, &r)? {
            return Ok(v);
        }
        Ok(apply_binary(op, &l, &r)?)
    }

    /// `__eq__` and `__lt__` on instances.
    fn dispatch_comparison(&mut self, op: BinaryOp, l: &Value, r: &Value) -> Result<Option<Value>, CobraError> {
        let (receiver, other, special, negate) = match (op, l, r) {
            (BinaryOp::Eq, Value::Instance(i), _) => (i, r, "__eq__", false),
            (BinaryOp::Ne, Value::Instance(i), _) => (i, r, "__eq__", true),
            (BinaryOp::Lt, Value::Instance(i), _) => (i, r, "__lt__", false),
            (BinaryOp::Gt, _, Value::Instance(i)) => (i, l, "__lt__", false),
            (BinaryOp::Ge, Value::Instance(i), _) => (i, r, "__lt__", true),
            (BinaryOp::Le, _, Value::Instance(i)) => (i, l, "__lt__", true),
            _ => return Ok(None),
        };
        let Some(method) = self.find_special(receiver, special) else {
            return Ok(None);
        };
        let out = self.call_method(receiver.clone(), method, vec![other.clone()])?;
        let b = self.truthy(&out)?;
        Ok(Some(Value::Bool(b != negate)))
    }

    fn comprehension(
        &mut self,
        var: &str,
        iterable: &Node,
        cond: Option<&Node>,
        mut body: impl FnMut(&mut Self) -> Result<(), CobraError>,
    ) -> Result<(), CobraError> {
        let it = self.eval(iterable)?;
        let mut source = self.iter_source(it)?;
        let ctx = self.new_context(ContextKind::Block);
        self.with_context(ctx, |me| {
            while let Some(item) = source.next(me)? {
                me.current().set(var, item)?;
                if let Some(c) = cond {
                    let keep = me.eval(c)?;
                    if !me.truthy(&keep)? {
                        continue;
                    }
                }
                body(me)?;
            }
            Ok(())
        })
    }

    pub(crate) fn eval_thread(&mut self, call: &Node) -> Result<Value, CobraError> {
        self.validate(call)?;
        match call {
            Node::Call { callee, args } => {
                let f = self.lookup(callee)?;
                let args = self.eval_args(args)?;
                self.spawn(f, args)
            }
            Node::MethodCall { object, method, args } => {
                let obj = self.eval(object)?;
                let f = self.get_attribute(obj, method)?;
                let args = self.eval_args(args)?;
                self.spawn(f, args)
            }
            other => Err(RuntimeError::Unsupported(format!("'hilo' needs a call, got {}", other.kind_name())).into()),
        }
    }

    // -- truthiness, display, iteration -------------------------------------

    pub(crate) fn truthy(&mut self, v: &Value) -> Result<bool, CobraError> {
        if let Value::Instance(inst) = v {
            if let Some(m) = self.find_special(inst, "__bool__") {
                let out = self.call_method(inst.clone(), m, Vec::new())?;
                return Ok(out.is_truthy());
            }
            if let Some(m) = self.find_special(inst, "__len__") {
                let out = self.call_method(inst.clone(), m, Vec::new())?;
                return Ok(out.is_truthy());
            }
        }
        Ok(v.is_truthy())
    }

    /// Text written by `imprimir`; instances go through `__str__`.
    pub(crate) fn to_display(&mut self, v: &Value) -> Result<String, CobraError> {
        if let Value::Instance(inst) = v {
            if let Some(m) = self.find_special(inst, "__str__") {
                let out = self.call_method(inst.clone(), m, Vec::new())?;
                return Ok(out.to_string());
            }
        }
        Ok(v.to_string())
    }

    pub(crate) fn iter_source(&mut self, v: Value) -> Result<IterSource, CobraError> {
        Ok(match v {
            Value::Generator(g) => IterSource::Generator(g),
            Value::Range(r) => IterSource::Range(r, 0),
            Value::List(items) => IterSource::Items(items.as_ref().clone(), 0),
            Value::Str(s) => IterSource::Items(s.chars().map(|c| Value::Str(c.to_string())).collect(), 0),
            Value::Dict(entries) => IterSource::Items(entries.iter().map(|(k, _)| k.clone()).collect(), 0),
            Value::Holobit(h) => IterSource::Items(h.iter().map(|x| Value::Float(*x)).collect(), 0),
            Value::Enum(e) => {
                IterSource::Items((0..e.members.len()).map(|i| Value::EnumMember(e.clone(), i)).collect(), 0)
            }
            Value::Instance(inst) => match self.find_special(&inst, "__iter__") {
                Some(m) => {
                    let out = self.call_method(inst.clone(), m, Vec::new())?;
                    if matches!(out, Value::Instance(_)) {
                        return Err(RuntimeError::Type("__iter__ must return a list or generator".into()).into());
                    }
                    return self.iter_source(out);
                }
                None => return Err(RuntimeError::Type(format!("'{}' is not iterable", inst.lock().class.name)).into()),
            },
            other => return Err(RuntimeError::Type(format!("'{}' is not iterable", other.type_name())).into()),
        })
    }

    /// Every item of an iterable; generators are drained.
    pub fn collect_items(&mut self, v: Value) -> Result<Vec<Value>, CobraError> {
        match self.iter_source(v)? {
            IterSource::Items(items, _) => Ok(items),
            IterSource::Range(r, _) => Ok((0..r.len()).filter_map(|i| r.get(i)).map(Value::Int).collect()),
            IterSource::Generator(g) => GeneratorIter::new(self, g).collect(),
        }
    }

    // -- calls -------------------------------------------------------------

    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, CobraError> {
        match callee {
            Value::Builtin(b) => {
                if b.arity != VARIADIC && b.arity != args.len() {
                    return Err(arity(b.name, b.arity, args.len()));
                }
                (b.f)(self, args)
            }
            Value::Function(def) => {
                if def.params.len() != args.len() {
                    return Err(arity(&def.name, def.params.len(), args.len()));
                }
                if body_contains_yield(&def.body) {
                    return self.make_generator(def, args);
                }
                self.invoke(&def.params, args, &def.body)
            }
            Value::Lambda(l) => {
                if l.params.len() != args.len() {
                    return Err(arity("lambda", l.params.len(), args.len()));
                }
                self.enter_call()?;
                let mut ctx = self.new_context(ContextKind::Function);
                for (p, v) in l.params.iter().zip(args) {
                    ctx.set(p, v)?;
                }
                let out = self.with_context(ctx, |me| me.eval(&l.body));
                self.depth -= 1;
                out
            }
            Value::Class(c) => self.instantiate(c, args),
            Value::BoundMethod(bm) => self.call_method(bm.receiver.clone(), bm.method.clone(), args),
            Value::Instance(inst) => match self.find_special(&inst, "__call__") {
                Some(m) => self.call_method(inst, m, args),
                None => Err(RuntimeError::NotCallable(inst.lock().class.name.clone()).into()),
            },
            Value::Macro(m) => {
                if !args.is_empty() {
                    return Err(arity(&m.name, 0, args.len()));
                }
                // expands in place: no new context
                match self.exec_block(&m.body)? {
                    Flow::Return(v) => Ok(v),
                    _ => Ok(Value::Null),
                }
            }
            other => Err(RuntimeError::NotCallable(other.to_string()).into()),
        }
    }

    pub(crate) fn enter_call(&mut self) -> Result<(), CobraError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::RecursionLimit(MAX_CALL_DEPTH).into());
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `body` in a fresh function context with `params` bound.
    fn invoke(&mut self, params: &[String], args: Vec<Value>, body: &[Node]) -> Result<Value, CobraError> {
        self.enter_call()?;
        let mut ctx = self.new_context(ContextKind::Function);
        let bound = params.iter().zip(args).try_for_each(|(p, v)| ctx.set(p, v));
        let out = match bound {
            Ok(()) => self.with_context(ctx, |me| {
                me.defer_frames.push(Vec::new());
                let flow = me.exec_block(body);
                let deferred = me.run_deferred();
                let flow = flow?;
                deferred?;
                Ok(match flow {
                    Flow::Return(v) => v,
                    _ => Value::Null,
                })
            }),
            Err(e) => Err(e.into()),
        };
        self.depth -= 1;
        out
    }

    fn make_generator(&mut self, def: Arc<FunctionDef>, args: Vec<Value>) -> Result<Value, CobraError> {
        let mut ctx = self.new_context(ContextKind::Function);
        for (p, v) in def.params.iter().zip(args) {
            ctx.set(p, v)?;
        }
        Ok(Value::Generator(generator::new_generator(def, ctx)))
    }

    /// Calls `method` with the instance bound to its first parameter.
    pub(crate) fn call_method(&mut self, receiver: InstanceRef, method: Arc<MethodDef>, args: Vec<Value>) -> Result<Value, CobraError> {
        let (self_name, rest) = match method.params.split_first() {
            Some((first, rest)) => (first.clone(), rest),
            None => ("self".to_string(), &[][..]),
        };
        if rest.len() != args.len() {
            return Err(arity(&method.name, rest.len(), args.len()));
        }
        let mut values = Vec::with_capacity(args.len() + 1);
        values.push(Value::Instance(receiver));
        values.extend(args);
        let mut params = Vec::with_capacity(rest.len() + 1);
        params.push(self_name);
        params.extend(rest.iter().cloned());
        if body_contains_yield(&method.body) {
            let def = self.intern(&*method, || {
                let mut def = method_as_function(&method);
                def.params = params;
                def
            });
            return self.make_generator(def, values);
        }
        self.invoke(&params, values, &method.body)
    }

    /// `obj.method(args)`: methods first, then callable attributes.
    fn call_method_on(&mut self, obj: Value, method: &str, args: Vec<Value>) -> Result<Value, CobraError> {
        if let Value::Instance(inst) = &obj {
            let found = inst.lock().class.find_method(method);
            if let Some(m) = found {
                return self.call_method(inst.clone(), m, args);
            }
        }
        let f = self.get_attribute(obj, method)?;
        self.call_value(f, args)
    }

    pub(crate) fn instantiate(&mut self, class: Arc<ClassValue>, args: Vec<Value>) -> Result<Value, CobraError> {
        let init = class.find_method("__init__");
        let inst: InstanceRef = Arc::new(Mutex::new(Instance { class: class.clone(), attributes: HashMap::new() }));
        match init {
            Some(m) => {
                self.call_method(inst.clone(), m, args)?;
            }
            None if !args.is_empty() => return Err(arity(&class.name, 0, args.len())),
            None => {}
        }
        tracing::trace!(class = class.name.as_str(), "instance created");
        Ok(Value::Instance(inst))
    }

    pub(crate) fn find_special(&self, inst: &InstanceRef, name: &str) -> Option<Arc<MethodDef>> {
        let class = inst.lock().class.clone();
        class.find_method(name)
    }

    // -- attributes --------------------------------------------------------

    pub(crate) fn get_attribute(&mut self, obj: Value, name: &str) -> Result<Value, CobraError> {
        match &obj {
            Value::Instance(inst) => {
                let (attr, class) = {
                    let guard = inst.lock();
                    (guard.attributes.get(name).cloned(), guard.class.clone())
                };
                if let Some(v) = attr {
                    return Ok(v);
                }
                if let Some(m) = class.find_method(name) {
                    return Ok(Value::BoundMethod(Arc::new(BoundMethod { receiver: inst.clone(), method: m })));
                }
                if let Some(getattr) = class.find_method("__getattr__") {
                    return self.call_method(inst.clone(), getattr, vec![Value::str(name)]);
                }
                Err(RuntimeError::Attribute { owner: class.name.clone(), name: name.to_string() }.into())
            }
            Value::Enum(e) => match e.members.iter().position(|m| m == name) {
                Some(i) => Ok(Value::EnumMember(e.clone(), i)),
                None => Err(RuntimeError::Attribute { owner: e.name.clone(), name: name.to_string() }.into()),
            },
            Value::Dict(entries) => dict_get(entries, &Value::str(name))
                .cloned()
                .ok_or_else(|| RuntimeError::Attribute { owner: "diccionario".into(), name: name.to_string() }.into()),
            other => Err(RuntimeError::Attribute { owner: other.type_name(), name: name.to_string() }.into()),
        }
    }

    pub(crate) fn set_attribute(&mut self, obj: Value, name: &str, value: Value) -> Result<(), CobraError> {
        let Value::Instance(inst) = obj else {
            return Err(RuntimeError::Type(format!("cannot set attribute '{}' on {}", name, obj.type_name())).into());
        };
        if let Some(setattr) = self.find_special(&inst, "__setattr__") {
            self.call_method(inst, setattr, vec![Value::str(name), value])?;
            return Ok(());
        }
        inst.lock().attributes.insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn delete_attribute(&mut self, obj: Value, name: &str) -> Result<(), CobraError> {
        let Value::Instance(inst) = obj else {
            return Err(RuntimeError::Type(format!("cannot delete attribute '{}' on {}", name, obj.type_name())).into());
        };
        if let Some(delattr) = self.find_special(&inst, "__delattr__") {
            self.call_method(inst, delattr, vec![Value::str(name)])?;
            return Ok(());
        }
        let removed = inst.lock().attributes.remove(name);
        match removed {
            Some(_) => Ok(()),
            None => Err(RuntimeError::Attribute { owner: inst.lock().class.name.clone(), name: name.to_string() }.into()),
        }
    }
}

fn arity(callee: &str, expected: usize, got: usize) -> CobraError {
    RuntimeError::Arity { callee: callee.to_string(), expected, got }.into()
}
