//! Statement execution.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::ast::{count_nodes, Case, ClassDef, FunctionDef, MethodDef, Node, Pattern, Target};
use crate::core::error::CobraError;
use crate::core::interpreter::context::{Binding, Context, ContextKind};
use crate::core::interpreter::value::{values_equal, ClassValue, EnumType, InterfaceType, MacroDef, Value};
use crate::core::interpreter::{Flow, Interpreter, RuntimeError};
use crate::core::limits::ResourceError;

impl Interpreter {
    pub(crate) fn exec_block(&mut self, block: &[Node]) -> Result<Flow, CobraError> {
        for stmt in block {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    pub(crate) fn exec_stmt(&mut self, node: &Node) -> Result<Flow, CobraError> {
        self.validate(node)?;
        match node {
            Node::Assignment { target, value, .. } => {
                let v = self.eval(value)?;
                match target {
                    Target::Name(name) => self.assign(name, v)?,
                    Target::Attribute { object, name } => {
                        let obj = self.eval(object)?;
                        self.set_attribute(obj, name, v)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Node::Conditional { cond, then_block, else_block } => {
                let c = self.eval(cond)?;
                if self.truthy(&c)? {
                    self.exec_block(then_block)
                } else {
                    self.exec_block(else_block)
                }
            }
            Node::Guard { cond, body, escape } => {
                let c = self.eval(cond)?;
                if self.truthy(&c)? {
                    self.exec_block(body)
                } else {
                    self.exec_block(escape)
                }
            }
            Node::While { cond, body } => {
                loop {
                    let c = self.eval(cond)?;
                    if !self.truthy(&c)? {
                        break;
                    }
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Node::For { var, iterable, body, .. } => {
                let it = self.eval(iterable)?;
                let mut source = self.iter_source(it)?;
                while let Some(item) = source.next(self)? {
                    self.assign(var, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Node::Function(def) => {
                self.define_function(def)?;
                Ok(Flow::Normal)
            }
            Node::Method(m) => {
                let def = method_as_function(m);
                self.define_function(&def)?;
                Ok(Flow::Normal)
            }
            Node::Class(class) => {
                self.define_class(class)?;
                Ok(Flow::Normal)
            }
            Node::Enum { name, members } => {
                let ty = Arc::new(EnumType { name: name.clone(), members: members.clone() });
                self.assign(name, Value::Enum(ty))?;
                Ok(Flow::Normal)
            }
            Node::Interface { name, methods } => {
                let ty = Arc::new(InterfaceType { name: name.clone(), methods: methods.clone() });
                self.assign(name, Value::Interface(ty))?;
                Ok(Flow::Normal)
            }
            Node::Return(value) => {
                let v = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(v))
            }
            Node::Yield(_) => Err(RuntimeError::Unsupported("'yield' outside a generator".into()).into()),
            Node::Throw(e) => {
                let v = self.eval(e)?;
                tracing::debug!(value = %v, "exception raised");
                Err(RuntimeError::Exception(v).into())
            }
            Node::TryCatch { body, catch_name, catch_block, finally_block } => {
                self.exec_try(body, catch_name.as_deref(), catch_block, finally_block)
            }
            Node::Import { path } => {
                self.import_module(path)?;
                Ok(Flow::Normal)
            }
            Node::Use { module } => {
                self.import_module(module)?;
                Ok(Flow::Normal)
            }
            Node::ImportFrom { module, name, alias } => {
                self.import_module(module)?;
                if let Some(alias) = alias {
                    self.bind(alias, Binding::Alias(name.clone()))?;
                }
                Ok(Flow::Normal)
            }
            Node::Export { name } => {
                tracing::debug!(name = name.as_str(), "export");
                Ok(Flow::Normal)
            }
            Node::Print(args) => {
                for arg in args {
                    let v = self.eval(arg)?;
                    let text = self.to_display(&v)?;
                    self.write_line(&text)?;
                }
                Ok(Flow::Normal)
            }
            Node::Thread(call) => {
                self.eval_thread(call)?;
                Ok(Flow::Normal)
            }
            Node::Break => Ok(Flow::Break),
            Node::Continue => Ok(Flow::Continue),
            Node::Pass | Node::Decorator(_) => Ok(Flow::Normal),
            Node::Assert { cond, message } => {
                let c = self.eval(cond)?;
                if self.truthy(&c)? {
                    return Ok(Flow::Normal);
                }
                let text = match message {
                    Some(m) => {
                        let v = self.eval(m)?;
                        self.to_display(&v)?
                    }
                    None => "Assertion failed".to_string(),
                };
                Err(RuntimeError::AssertionFailed(text).into())
            }
            Node::Del(target) => {
                match target.as_ref() {
                    Node::Identifier(name) => self.unbind(name)?,
                    Node::Attribute { object, name } => {
                        let obj = self.eval(object)?;
                        self.delete_attribute(obj, name)?;
                    }
                    other => {
                        return Err(RuntimeError::Unsupported(format!("cannot delete a {}", other.kind_name())).into())
                    }
                }
                Ok(Flow::Normal)
            }
            Node::Global(names) => {
                for n in names {
                    self.current().declare_global(n);
                }
                Ok(Flow::Normal)
            }
            Node::NonLocal(names) => {
                for n in names {
                    self.current().declare_nonlocal(n);
                }
                Ok(Flow::Normal)
            }
            Node::With { context, alias, body } => self.exec_with(context, alias.as_deref(), body),
            Node::Defer(action) => {
                let action = self.intern(&**action, || (**action).clone());
                match self.defer_frames.last_mut() {
                    Some(frame) => frame.push(action),
                    None => tracing::warn!("'defer' with no enclosing body; ignored"),
                }
                Ok(Flow::Normal)
            }
            Node::Switch { subject, cases, default } => self.exec_switch(subject, cases, default),
            Node::Macro { name, body } => {
                let m = self.intern(node, || MacroDef { name: name.clone(), body: body.clone() });
                self.assign(name, Value::Macro(m))?;
                Ok(Flow::Normal)
            }
            Node::TypedList { name, elem_type, elements } => {
                let mut items = Vec::with_capacity(elements.len());
                for e in elements {
                    let v = self.eval(e)?;
                    check_type(name, elem_type, &v)?;
                    items.push(v);
                }
                self.assign(name, Value::list(items))?;
                Ok(Flow::Normal)
            }
            Node::TypedDict { name, key_type, value_type, entries } => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let k = self.eval(k)?;
                    check_type(name, key_type, &k)?;
                    let v = self.eval(v)?;
                    check_type(name, value_type, &v)?;
                    out.push((k, v));
                }
                self.assign(name, Value::Dict(Arc::new(out)))?;
                Ok(Flow::Normal)
            }
            expr => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_try(
        &mut self,
        body: &[Node],
        catch_name: Option<&str>,
        catch_block: &[Node],
        finally_block: &[Node],
    ) -> Result<Flow, CobraError> {
        let handles = catch_name.is_some() || !catch_block.is_empty();
        let result = match self.exec_block(body) {
            // security, resource and import errors are never catchable
            Err(CobraError::Runtime(err)) if handles => {
                let payload = match err {
                    RuntimeError::Exception(v) => v,
                    other => Value::Str(other.to_string()),
                };
                tracing::debug!(exception = %payload, "caught");
                match catch_name {
                    Some(name) => self.assign(name, payload).and_then(|_| self.exec_block(catch_block)),
                    None => self.exec_block(catch_block),
                }
            }
            other => other,
        };
        if finally_block.is_empty() {
            return result;
        }
        match self.exec_block(finally_block)? {
            Flow::Normal => result,
            // control flow out of `finally` replaces whatever was pending
            other => Ok(other),
        }
    }

    fn exec_with(&mut self, context: &Node, alias: Option<&str>, body: &[Node]) -> Result<Flow, CobraError> {
        let manager = self.eval(context)?;
        let ctx = self.enter_manager(&manager, alias)?;
        let result = self.with_context(ctx, |me| {
            me.defer_frames.push(Vec::new());
            let flow = me.exec_block(body);
            let deferred = me.run_deferred();
            let flow = flow?;
            deferred?;
            Ok(flow)
        });
        self.exit_manager(&manager, result.as_ref().err())?;
        result
    }

    /// Calls `__enter__` on instances that define it and returns the block
    /// context holding the alias.
    pub(crate) fn enter_manager(&mut self, manager: &Value, alias: Option<&str>) -> Result<Context, CobraError> {
        let entered = match manager {
            Value::Instance(inst) => match self.find_special(inst, "__enter__") {
                Some(m) => self.call_method(inst.clone(), m, Vec::new())?,
                None => manager.clone(),
            },
            _ => manager.clone(),
        };
        let mut ctx = self.new_context(ContextKind::Block);
        if let Some(alias) = alias {
            ctx.set(alias, entered)?;
        }
        Ok(ctx)
    }

    /// Calls `__exit__`, passing the pending error text when it takes an
    /// argument.
    pub(crate) fn exit_manager(&mut self, manager: &Value, error: Option<&CobraError>) -> Result<(), CobraError> {
        let Value::Instance(inst) = manager else {
            return Ok(());
        };
        if let Some(exit) = self.find_special(inst, "__exit__") {
            let mut args = Vec::new();
            if exit.params.len() > 1 {
                args.push(error.map_or(Value::Null, |e| Value::Str(e.to_string())));
            }
            self.call_method(inst.clone(), exit, args)?;
        }
        Ok(())
    }

    fn exec_switch(&mut self, subject: &Node, cases: &[Case], default: &[Node]) -> Result<Flow, CobraError> {
        let v = self.eval(subject)?;
        for case in cases {
            let Some(bindings) = match_pattern(&case.pattern, &v) else {
                continue;
            };
            for (name, value) in bindings {
                self.assign(&name, value)?;
            }
            if let Some(guard) = &case.guard {
                let g = self.eval(guard)?;
                if !self.truthy(&g)? {
                    continue;
                }
            }
            return self.exec_block(&case.body);
        }
        self.exec_block(default)
    }

    fn define_function(&mut self, def: &FunctionDef) -> Result<(), CobraError> {
        let func = self.intern(def, || def.clone());
        let mut value = Value::Function(func);
        // the decorator closest to the definition applies first
        for dec in def.decorators.iter().rev() {
            let expr = match dec {
                Node::Decorator(e) => e.as_ref(),
                other => other,
            };
            let decorator = self.eval(expr)?;
            value = self.call_value(decorator, vec![value])?;
        }
        self.assign(&def.name, value)
    }

    fn define_class(&mut self, class: &ClassDef) -> Result<(), CobraError> {
        let mut bases = Vec::with_capacity(class.bases.len());
        for base in &class.bases {
            match self.lookup(base)? {
                Value::Class(c) => bases.push(c),
                other => {
                    return Err(RuntimeError::Type(format!(
                        "base '{}' of class '{}' is a {}, not a class",
                        base,
                        class.name,
                        other.type_name()
                    ))
                    .into())
                }
            }
        }
        let mut methods = HashMap::with_capacity(class.methods.len());
        for m in &class.methods {
            let m = self.intern(m, || m.clone());
            methods.insert(m.name.clone(), m);
        }
        let value = Arc::new(ClassValue { name: class.name.clone(), bases, methods });
        tracing::debug!(class = class.name.as_str(), "class defined");
        self.assign(&class.name, Value::Class(value))
    }

    /// Loads `path` through the resolver and runs it in the current context.
    pub(crate) fn import_module(&mut self, path: &str) -> Result<(), CobraError> {
        let resolver = self
            .resolver
            .clone()
            .ok_or_else(|| RuntimeError::Import(format!("no module resolver configured for '{}'", path)))?;
        let key = resolver.resolve(path)?;
        if self.run.importing.contains(&key) {
            tracing::warn!(module = path, "circular import skipped");
            return Ok(());
        }
        let program = match self.run.modules.get(&key) {
            Some(program) => program.clone(),
            None => {
                let program = Arc::new(resolver.load(path)?);
                let count = count_nodes(&program);
                if count > self.run.node_limit {
                    return Err(ResourceError::NodeLimit { count, limit: self.run.node_limit }.into());
                }
                self.run.modules.insert(key.clone(), program.clone());
                program
            }
        };
        let count = count_nodes(&program);
        tracing::debug!(module = path, nodes = count, "importing");
        self.run.importing.insert(key.clone());
        let result = self.exec_block(&program);
        self.run.importing.remove(&key);
        result.map(|_| ())
    }
}

pub(crate) fn method_as_function(m: &MethodDef) -> FunctionDef {
    FunctionDef {
        name: m.name.clone(),
        params: m.params.clone(),
        body: m.body.clone(),
        decorators: Vec::new(),
        is_async: m.is_async,
        type_params: m.type_params.clone(),
    }
}

/// Bindings produced when `pattern` matches `value`.
pub(crate) fn match_pattern(pattern: &Pattern, value: &Value) -> Option<Vec<(String, Value)>> {
    match pattern {
        Pattern::Wildcard => Some(Vec::new()),
        Pattern::Binding(name) => Some(vec![(name.clone(), value.clone())]),
        Pattern::Literal(lit) => values_equal(&Value::from_literal(lit), value).then(Vec::new),
        Pattern::Tuple(parts) => {
            let Value::List(items) = value else {
                return None;
            };
            if items.len() != parts.len() {
                return None;
            }
            let mut out = Vec::new();
            for (p, v) in parts.iter().zip(items.iter()) {
                out.extend(match_pattern(p, v)?);
            }
            Some(out)
        }
    }
}

fn check_type(name: &str, expected: &str, v: &Value) -> Result<(), CobraError> {
    let ok = match expected {
        "int" | "entero" => matches!(v, Value::Int(_)),
        "float" | "flotante" => matches!(v, Value::Int(_) | Value::Float(_)),
        "str" | "cadena" | "texto" => matches!(v, Value::Str(_)),
        "bool" | "booleano" => matches!(v, Value::Bool(_)),
        "lista" | "list" => matches!(v, Value::List(_)),
        "dict" | "diccionario" => matches!(v, Value::Dict(_)),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(RuntimeError::Type(format!("'{}' expects {} values, got {}", name, expected, v.type_name())).into())
    }
}
