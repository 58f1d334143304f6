//! Tree-walking interpreter.
//!
//! `execute` runs the whole pipeline on an already parsed program: node
//! limit, resource ceilings, optimization, IR lowering, semantic analysis and
//! finally evaluation. Statements live in `exec`, expressions and calls in
//! `eval`, resumable generators in `generator`.

pub mod builtins;
pub mod context;
pub mod eval;
pub mod exec;
pub mod generator;
pub mod value;

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;

use crate::core::ast::{count_nodes, Node};
use crate::core::error::CobraError;
use crate::core::ir;
use crate::core::limits::{ProcessLimiter, Resource, ResourceError, ResourceLimiter};
use crate::core::lowering;
use crate::core::memory::{MemoryManager, MemoryPolicy};
use crate::core::optimizer;
use crate::core::resolver::ModuleResolver;
use crate::core::security::{RuleValidator, SecurityValidator, ValidatedSet, ValidatorChain};
use crate::core::semantic_analyzer::SemanticAnalyzer;

pub use context::{Binding, Context, ContextKind, SharedMemory};
pub use generator::{GeneratorIter, GeneratorRef};
pub use value::Value;

pub const DEFAULT_NODE_LIMIT: usize = 10_000;
/// Nested user calls allowed before the run is aborted.
pub const MAX_CALL_DEPTH: usize = 64;
/// Stack for the thread a run executes on, and for every `hilo` worker.
/// Room for [`MAX_CALL_DEPTH`] nested calls with deep expressions in each.
const STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("name '{0}' is not defined")]
    Undefined(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("'{callee}' expects {expected} argument(s), got {got}")]
    Arity { callee: String, expected: usize, got: usize },
    #[error("'{0}' is not callable")]
    NotCallable(String),
    #[error("'{owner}' has no attribute '{name}'")]
    Attribute { owner: String, name: String },
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("uncaught exception: {0}")]
    Exception(Value),
    #[error("maximum call depth of {0} exceeded")]
    RecursionLimit(usize),
    #[error("generator is already running")]
    GeneratorRunning,
    #[error("import failed: {0}")]
    Import(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("output error: {0}")]
    Io(String),
}

impl From<io::Error> for RuntimeError {
    fn from(e: io::Error) -> Self {
        RuntimeError::Io(e.to_string())
    }
}

/// Per-call execution settings. Deserializable from the `[execute]` table of
/// the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    /// Run the default validator chain on every node.
    pub safe_mode: bool,
    /// Log every validated node.
    pub audit: bool,
    pub memory_limit_mb: Option<u64>,
    pub cpu_limit_s: Option<u64>,
    pub node_limit: usize,
    /// Optimize the program before analysis. Output and errors are the same
    /// either way.
    pub optimize: bool,
    /// TOML deny-rule file appended to the chain.
    pub validators_file: Option<PathBuf>,
    #[serde(skip)]
    pub extra_validators: Vec<Arc<dyn SecurityValidator>>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            safe_mode: true,
            audit: false,
            memory_limit_mb: None,
            cpu_limit_s: None,
            node_limit: DEFAULT_NODE_LIMIT,
            optimize: true,
            validators_file: None,
            extra_validators: Vec::new(),
        }
    }
}

/// Control flow out of a statement.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// State that lives for one `execute` call.
#[derive(Default)]
pub(crate) struct RunState {
    pub validated: ValidatedSet,
    /// Runtime objects built from AST nodes, one per source address and
    /// type. They own every node reachable through runtime values; validation
    /// is memoized by node address, so no such node may be freed mid-run.
    pub interned: HashMap<(usize, TypeId), Arc<dyn Any + Send + Sync>>,
    /// Parsed modules by resolved path.
    pub modules: HashMap<PathBuf, Arc<Vec<Node>>>,
    pub node_limit: usize,
    pub importing: HashSet<PathBuf>,
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("validated", &self.validated.len())
            .field("interned", &self.interned.len())
            .field("modules", &self.modules.len())
            .field("node_limit", &self.node_limit)
            .finish()
    }
}

pub type Output = Arc<Mutex<dyn Write + Send>>;

/// In-memory output sink, handy for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct InterpreterBuilder {
    output: Output,
    memory: MemoryManager,
    validators: Vec<Arc<dyn SecurityValidator>>,
    resolver: Option<Arc<dyn ModuleResolver>>,
    limiter: Arc<dyn ResourceLimiter>,
}

impl Default for InterpreterBuilder {
    fn default() -> Self {
        InterpreterBuilder {
            output: Arc::new(Mutex::new(io::stdout())),
            memory: MemoryManager::default(),
            validators: Vec::new(),
            resolver: None,
            limiter: Arc::new(ProcessLimiter),
        }
    }
}

impl InterpreterBuilder {
    pub fn output<W: Write + Send + 'static>(mut self, w: W) -> Self {
        self.output = Arc::new(Mutex::new(w));
        self
    }

    pub fn memory_policy(mut self, policy: Box<dyn MemoryPolicy>) -> Self {
        self.memory = MemoryManager::new(policy);
        self
    }

    pub fn memory_manager(mut self, manager: MemoryManager) -> Self {
        self.memory = manager;
        self
    }

    /// Validators applied on every run, on top of the per-run options.
    pub fn validator(mut self, v: Arc<dyn SecurityValidator>) -> Self {
        self.validators.push(v);
        self
    }

    pub fn resolver(mut self, r: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(r);
        self
    }

    pub fn limiter(mut self, l: Arc<dyn ResourceLimiter>) -> Self {
        self.limiter = l;
        self
    }

    pub fn build(self) -> Interpreter {
        let memory: SharedMemory = Arc::new(Mutex::new(self.memory));
        let global = Context::new(ContextKind::Global, memory.clone());
        Interpreter {
            output: self.output,
            memory,
            resolver: self.resolver,
            limiter: self.limiter,
            base_validators: self.validators,
            chain: Arc::new(ValidatorChain::empty()),
            contexts: vec![global],
            run: RunState { node_limit: DEFAULT_NODE_LIMIT, ..RunState::default() },
            defer_frames: Vec::new(),
            last_ir: None,
            threads: Vec::new(),
            next_thread_id: Arc::new(AtomicUsize::new(1)),
            depth: 0,
        }
    }
}

pub struct Interpreter {
    output: Output,
    memory: SharedMemory,
    resolver: Option<Arc<dyn ModuleResolver>>,
    limiter: Arc<dyn ResourceLimiter>,
    base_validators: Vec<Arc<dyn SecurityValidator>>,
    chain: Arc<ValidatorChain>,
    pub(crate) contexts: Vec<Context>,
    pub(crate) run: RunState,
    /// Pending `defer` actions, one frame per function or `with` body.
    pub(crate) defer_frames: Vec<Vec<Arc<Node>>>,
    last_ir: Option<ir::Module>,
    threads: Vec<JoinHandle<()>>,
    next_thread_id: Arc<AtomicUsize>,
    pub(crate) depth: usize,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("contexts", &self.contexts.len())
            .field("validators", &self.chain.names())
            .field("threads", &self.threads.len())
            .field("run", &self.run)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        InterpreterBuilder::default().build()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::default()
    }

    /// IR lowered from the last program run.
    pub fn last_ir(&self) -> Option<&ir::Module> {
        self.last_ir.as_ref()
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Value bound to `name` in the global context, if any.
    pub fn global(&self, name: &str) -> Option<Value> {
        match self.contexts.first()?.get(name)? {
            Binding::Value(v) => Some(v.clone()),
            Binding::Alias(target) => self.lookup(target).ok(),
        }
    }

    /// Runs `program`; returns the first non-null top-level result. The run
    /// happens on a scoped thread with a [`STACK_SIZE`] stack, whatever the
    /// caller's own stack is.
    pub fn execute(&mut self, program: Vec<Node>, options: &ExecuteOptions) -> Result<Option<Value>, CobraError> {
        thread::scope(|scope| -> Result<Option<Value>, CobraError> {
            let handle = thread::Builder::new()
                .name("cobra-run".into())
                .stack_size(STACK_SIZE)
                .spawn_scoped(scope, move || self.execute_here(program, options))
                .map_err(|e| RuntimeError::Unsupported(format!("cannot start the interpreter thread: {}", e)))?;
            handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    }

    fn execute_here(&mut self, program: Vec<Node>, options: &ExecuteOptions) -> Result<Option<Value>, CobraError> {
        self.run = RunState { node_limit: options.node_limit, ..RunState::default() };
        self.chain = Arc::new(self.build_chain(options)?);

        let count = count_nodes(&program);
        if count > options.node_limit {
            return Err(ResourceError::NodeLimit { count, limit: options.node_limit }.into());
        }
        self.apply_limits(options)?;

        let program = if options.optimize {
            let program = optimizer::optimize(program);
            tracing::debug!(nodes = count_nodes(&program), "program optimized");
            program
        } else {
            program
        };
        self.last_ir = Some(lowering::lower(&program));

        let mut analyzer = SemanticAnalyzer::new();
        if let Some(r) = &self.resolver {
            analyzer = analyzer.with_resolver(Arc::clone(r));
        }
        analyzer.analyze(&program)?;
        tracing::debug!(validators = ?self.chain.names(), "executing");

        self.defer_frames.push(Vec::new());
        let result = self.run_top_level(&program);
        let deferred = self.run_deferred();
        let result = result?;
        deferred?;
        Ok(result)
    }

    fn run_top_level(&mut self, program: &[Node]) -> Result<Option<Value>, CobraError> {
        for node in program {
            let value = if node.is_expression() {
                self.eval(node)?
            } else {
                match self.exec_stmt(node)? {
                    Flow::Return(v) => v,
                    _ => Value::Null,
                }
            };
            if !matches!(value, Value::Null) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn build_chain(&self, options: &ExecuteOptions) -> Result<ValidatorChain, CobraError> {
        let mut chain = if options.safe_mode { ValidatorChain::default_chain(options.audit) } else { ValidatorChain::empty() };
        chain.extend(self.base_validators.iter().cloned());
        chain.extend(options.extra_validators.iter().cloned());
        if let Some(path) = &options.validators_file {
            let rules = RuleValidator::load(path).map_err(|e| CobraError::Config(format!("{:#}", e)))?;
            chain.push(Arc::new(rules));
        }
        Ok(chain)
    }

    fn apply_limits(&self, options: &ExecuteOptions) -> Result<(), CobraError> {
        if let Some(mb) = options.memory_limit_mb {
            self.limiter.set_limit(Resource::MemoryMb, mb)?;
        }
        if let Some(secs) = options.cpu_limit_s {
            self.limiter.set_limit(Resource::CpuSeconds, secs)?;
        }
        Ok(())
    }

    /// Runs the validator chain on `node` once per run.
    pub(crate) fn validate(&mut self, node: &Node) -> Result<(), CobraError> {
        if self.chain.is_empty() {
            return Ok(());
        }
        self.run.validated.check(&self.chain, node)?;
        Ok(())
    }

    /// The runtime object built from `source`, made on first use and
    /// reused for the rest of the run.
    pub(crate) fn intern<S, T: Any + Send + Sync>(&mut self, source: &S, make: impl FnOnce() -> T) -> Arc<T> {
        let key = (source as *const S as usize, TypeId::of::<T>());
        if let Some(existing) = self.run.interned.get(&key) {
            if let Ok(found) = Arc::clone(existing).downcast::<T>() {
                return found;
            }
        }
        let fresh = Arc::new(make());
        self.run.interned.insert(key, fresh.clone());
        fresh
    }

    /// Objects interned during the current run.
    pub fn interned_len(&self) -> usize {
        self.run.interned.len()
    }

    pub(crate) fn write_line(&self, text: &str) -> Result<(), CobraError> {
        let mut out = self.output.lock();
        writeln!(out, "{}", text).map_err(RuntimeError::from)?;
        Ok(())
    }

    // -- variables ---------------------------------------------------------

    /// Innermost binding of `name`, following aliases.
    pub fn lookup(&self, name: &str) -> Result<Value, CobraError> {
        let mut visited = HashSet::new();
        self.lookup_guarded(name, &mut visited)
    }

    fn lookup_guarded(&self, name: &str, visited: &mut HashSet<String>) -> Result<Value, CobraError> {
        if !visited.insert(name.to_string()) {
            return Err(ResourceError::CircularReference { name: name.to_string() }.into());
        }
        for ctx in self.contexts.iter().rev() {
            match ctx.get(name) {
                Some(Binding::Value(v)) => return Ok(v.clone()),
                Some(Binding::Alias(target)) => return self.lookup_guarded(target, visited),
                None => {}
            }
        }
        builtins::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| RuntimeError::Undefined(name.to_string()).into())
    }

    fn current(&mut self) -> &mut Context {
        let last = self.contexts.len() - 1;
        &mut self.contexts[last]
    }

    /// Assigns in the current context unless `name` was declared `global` or
    /// `nolocal` there.
    pub(crate) fn assign(&mut self, name: &str, value: Value) -> Result<(), CobraError> {
        self.bind(name, Binding::Value(value))
    }

    pub(crate) fn bind(&mut self, name: &str, binding: Binding) -> Result<(), CobraError> {
        let last = self.contexts.len() - 1;
        let target = if self.contexts[last].is_global(name) {
            0
        } else if self.contexts[last].is_nonlocal(name) {
            (0..last).rev().find(|i| self.contexts[*i].contains(name)).unwrap_or(last)
        } else {
            last
        };
        self.contexts[target].define(name, binding)?;
        Ok(())
    }

    /// Removes the innermost binding of `name`.
    pub(crate) fn unbind(&mut self, name: &str) -> Result<(), CobraError> {
        for ctx in self.contexts.iter_mut().rev() {
            if ctx.remove(name) {
                return Ok(());
            }
        }
        Err(RuntimeError::Undefined(name.to_string()).into())
    }

    pub(crate) fn new_context(&self, kind: ContextKind) -> Context {
        Context::new(kind, self.memory.clone())
    }

    /// Runs `f` with `ctx` pushed on top of the context stack. The context is
    /// popped (and its slots released) on every exit path.
    pub(crate) fn with_context<T>(
        &mut self,
        ctx: Context,
        f: impl FnOnce(&mut Self) -> Result<T, CobraError>,
    ) -> Result<T, CobraError> {
        self.contexts.push(ctx);
        let out = f(self);
        self.contexts.pop();
        out
    }

    /// Pops the innermost defer frame and runs it in LIFO order. Every action
    /// runs even if an earlier one fails; the first error is returned.
    pub(crate) fn run_deferred(&mut self) -> Result<(), CobraError> {
        let frame = self.defer_frames.pop().unwrap_or_default();
        let mut first_err = None;
        for action in frame.into_iter().rev() {
            if let Err(e) = self.exec_stmt(&action) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // -- threads -----------------------------------------------------------

    /// Calls `callee` on a worker thread over a snapshot of the contexts.
    pub(crate) fn spawn(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, CobraError> {
        let contexts = self.contexts.iter().map(Context::snapshot).collect::<Result<Vec<_>, _>>()?;
        let mut worker = Interpreter {
            output: self.output.clone(),
            memory: self.memory.clone(),
            resolver: self.resolver.clone(),
            limiter: self.limiter.clone(),
            base_validators: self.base_validators.clone(),
            chain: self.chain.clone(),
            contexts,
            run: RunState { node_limit: self.run.node_limit, ..RunState::default() },
            defer_frames: Vec::new(),
            last_ir: None,
            threads: Vec::new(),
            next_thread_id: self.next_thread_id.clone(),
            depth: 0,
        };
        let id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let handle = thread::Builder::new()
            .name(format!("cobra-hilo-{}", id))
            .stack_size(STACK_SIZE)
            .spawn(move || {
                if let Err(e) = worker.call_value(callee, args) {
                    tracing::warn!(thread = id, error = %e, "thread failed");
                }
                worker.join_threads();
            })
            .map_err(|e| RuntimeError::Unsupported(format!("cannot spawn thread: {}", e)))?;
        tracing::debug!(thread = id, "thread spawned");
        self.threads.push(handle);
        Ok(Value::Thread(value::ThreadHandle { id }))
    }

    /// Waits for every thread spawned by this interpreter.
    pub fn join_threads(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("thread panicked");
            }
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.join_threads();
    }
}

#[cfg(test)]
mod tests;
