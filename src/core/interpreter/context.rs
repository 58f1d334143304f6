//! Execution contexts: one per call, `with` block or thread snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::interpreter::value::Value;
use crate::core::limits::ResourceError;
use crate::core::memory::MemoryManager;

pub type SharedMemory = Arc<Mutex<MemoryManager>>;

/// What a name is bound to. An alias is resolved lazily by name each time
/// it is read.
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Alias(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Global,
    Function,
    Block,
}

/// Bindings plus the memory slots they hold. Every binding owns one slot of
/// size 1 when the arena has room; all of them go back to the manager when
/// the context is dropped. A binding the arena cannot back still works.
#[derive(Debug)]
pub struct Context {
    pub kind: ContextKind,
    bindings: HashMap<String, Binding>,
    slots: HashMap<String, usize>,
    /// Names declared `global` in this context.
    globals: HashSet<String>,
    /// Names declared `nolocal` in this context.
    nonlocals: HashSet<String>,
    memory: SharedMemory,
}

impl Context {
    pub fn new(kind: ContextKind, memory: SharedMemory) -> Self {
        Context {
            kind,
            bindings: HashMap::new(),
            slots: HashMap::new(),
            globals: HashSet::new(),
            nonlocals: HashSet::new(),
            memory,
        }
    }

    /// Binds `name`, taking a fresh slot only when the name is new here.
    pub fn define(&mut self, name: &str, binding: Binding) -> Result<(), ResourceError> {
        if !self.slots.contains_key(name) {
            match self.memory.lock().request_slot(1) {
                Ok(index) => {
                    self.slots.insert(name.to_string(), index);
                }
                Err(e) => tracing::debug!(name, error = %e, "binding has no memory slot"),
            }
        }
        self.bindings.insert(name.to_string(), binding);
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ResourceError> {
        self.define(name, Binding::Value(value))
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Removes a binding and returns its slot.
    pub fn remove(&mut self, name: &str) -> bool {
        if let Some(index) = self.slots.remove(name) {
            self.memory.lock().release_slot(index, 1);
        }
        self.bindings.remove(name).is_some()
    }

    pub fn declare_global(&mut self, name: &str) {
        self.globals.insert(name.to_string());
    }

    pub fn declare_nonlocal(&mut self, name: &str) {
        self.nonlocals.insert(name.to_string());
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn is_nonlocal(&self, name: &str) -> bool {
        self.nonlocals.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Copy of this context with its own slots. Values are shared: instances
    /// stay behind their mutex, everything else is immutable.
    pub fn snapshot(&self) -> Result<Context, ResourceError> {
        let mut copy = Context::new(self.kind, self.memory.clone());
        for (name, binding) in &self.bindings {
            copy.define(name, binding.clone())?;
        }
        copy.globals = self.globals.clone();
        copy.nonlocals = self.nonlocals.clone();
        Ok(copy)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        let mut memory = self.memory.lock();
        for (_, index) in self.slots.drain() {
            memory.release_slot(index, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::FreeListPolicy;

    fn memory() -> SharedMemory {
        Arc::new(Mutex::new(MemoryManager::default()))
    }

    #[test]
    fn slots_follow_bindings() {
        let mem = memory();
        {
            let mut ctx = Context::new(ContextKind::Function, mem.clone());
            ctx.set("a", Value::Int(1)).unwrap();
            ctx.set("a", Value::Int(2)).unwrap();
            ctx.set("b", Value::Null).unwrap();
            assert_eq!(mem.lock().live_slots(), 2);
            assert!(ctx.remove("b"));
            assert_eq!(mem.lock().live_slots(), 1);
        }
        assert_eq!(mem.lock().live_slots(), 0);
    }

    #[test]
    fn full_arena_leaves_bindings_unbacked() {
        let mem: SharedMemory = Arc::new(Mutex::new(MemoryManager::new(Box::new(FreeListPolicy::new(2)))));
        let mut ctx = Context::new(ContextKind::Global, mem.clone());
        for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            ctx.set(name, Value::Int(i as i64)).unwrap();
        }
        assert_eq!(ctx.len(), 4);
        assert!(matches!(ctx.get("d"), Some(Binding::Value(Value::Int(3)))));
        assert_eq!(mem.lock().live_slots(), 2);
        assert_eq!(mem.lock().failed(), 2);
        assert!(ctx.remove("d"));
        assert!(ctx.remove("a"));
        assert_eq!(mem.lock().live_slots(), 1);
    }

    #[test]
    fn snapshot_takes_its_own_slots() {
        let mem = memory();
        let mut ctx = Context::new(ContextKind::Global, mem.clone());
        ctx.set("x", Value::Int(3)).unwrap();
        let copy = ctx.snapshot().unwrap();
        assert_eq!(mem.lock().live_slots(), 2);
        drop(ctx);
        assert!(matches!(copy.get("x"), Some(Binding::Value(Value::Int(3)))));
        drop(copy);
        assert_eq!(mem.lock().live_slots(), 0);
    }
}
