//! Resumable generators.
//!
//! A generator keeps its own context plus a stack of frames. Each frame
//! names a statement list by the path taken from the function body (which
//! branch of which enclosing statement) and the index of the next statement
//! to run, so suspended state never borrows from the AST. Statements that
//! contain no `yield` run through the ordinary executor.
//!
//! `intentar` and `con` frames survive suspension: errors and control flow
//! leaving them are unwound frame by frame, running `capturar`, `finalmente`
//! and `__exit__` on the way. `defer` inside a generator belongs to the
//! generator and runs when it finishes.
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::ast::{FunctionDef, Node};
use crate::core::error::CobraError;
use crate::core::interpreter::context::Context;
use crate::core::interpreter::eval::IterSource;
use crate::core::interpreter::exec::match_pattern;
use crate::core::interpreter::value::Value;
use crate::core::interpreter::{Flow, Interpreter, RuntimeError};

pub type GeneratorRef = Arc<Mutex<GeneratorState>>;

pub enum GeneratorState {
    Suspended(Box<Suspended>),
    /// Taken out of the mutex while a resume is in progress.
    Running,
    Done,
}

pub struct Suspended {
    def: Arc<FunctionDef>,
    context: Context,
    frames: Vec<Frame>,
    /// The generator's own defer frames: the function body's, then one per
    /// open `con`.
    defers: Vec<Vec<Arc<Node>>>,
}

impl fmt::Debug for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorState::Suspended(s) => f
                .debug_struct("Suspended")
                .field("function", &s.def.name)
                .field("frames", &s.frames.len())
                .finish(),
            GeneratorState::Running => write!(f, "Running"),
            GeneratorState::Done => write!(f, "Done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Root,
    Then,
    Else,
    Body,
    Catch,
    Finally,
    Case(usize),
    Default,
}

enum FrameKind {
    Block,
    /// Body of the `mientras` that owns this frame.
    Loop,
    For { var: String, source: IterSource },
    /// `intentar`; the branch says which of its blocks is running. `pending`
    /// is what resumes unwinding once `finalmente` completes.
    Try { pending: Option<Pending> },
    /// `con`; `scope` holds the alias context while the generator is
    /// suspended and is `None` while it sits on the context stack.
    With { manager: Value, scope: Option<Context> },
}

/// Why frames are being unwound.
enum Pending {
    Error(CobraError),
    Return,
    Break,
    Continue,
}

struct Frame {
    branch: Branch,
    index: usize,
    kind: FrameKind,
}

impl Frame {
    fn block(branch: Branch) -> Self {
        Frame { branch, index: 0, kind: FrameKind::Block }
    }

    /// Loop frames start exhausted so the first iteration goes through the
    /// same check as every later one.
    fn looping(kind: FrameKind) -> Self {
        Frame { branch: Branch::Body, index: usize::MAX, kind }
    }
}

enum Advance {
    Next,
    Yield(Value),
    Unwind(Pending),
    Done,
}

pub(crate) fn new_generator(def: Arc<FunctionDef>, context: Context) -> GeneratorRef {
    let frames = vec![Frame::block(Branch::Root)];
    let defers = vec![Vec::new()];
    Arc::new(Mutex::new(GeneratorState::Suspended(Box::new(Suspended { def, context, frames, defers }))))
}

fn out_of_sync() -> CobraError {
    RuntimeError::Unsupported("generator state does not match its body".into()).into()
}

fn child_block(stmt: &Node, branch: Branch) -> Option<&[Node]> {
    Some(match (stmt, branch) {
        (Node::Conditional { then_block, .. }, Branch::Then) => then_block,
        (Node::Conditional { else_block, .. }, Branch::Else) => else_block,
        (Node::Guard { body, .. }, Branch::Then) => body,
        (Node::Guard { escape, .. }, Branch::Else) => escape,
        (Node::While { body, .. }, Branch::Body) | (Node::For { body, .. }, Branch::Body) => body,
        (Node::TryCatch { body, .. }, Branch::Body) => body,
        (Node::TryCatch { catch_block, .. }, Branch::Catch) => catch_block,
        (Node::TryCatch { finally_block, .. }, Branch::Finally) => finally_block,
        (Node::With { body, .. }, Branch::Body) => body,
        (Node::Switch { cases, .. }, Branch::Case(i)) => &cases.get(i)?.body,
        (Node::Switch { default, .. }, Branch::Default) => default,
        _ => return None,
    })
}

/// Statement list addressed by `frames[..=depth]`.
fn block_of<'a>(body: &'a [Node], frames: &[Frame], depth: usize) -> Result<&'a [Node], CobraError> {
    let mut block = body;
    for level in 1..=depth {
        let stmt = block.get(frames[level - 1].index).ok_or_else(out_of_sync)?;
        block = child_block(stmt, frames[level].branch).ok_or_else(out_of_sync)?;
    }
    Ok(block)
}

/// Statement that owns the frame at `depth`.
fn owner_of<'a>(body: &'a [Node], frames: &[Frame], depth: usize) -> Result<&'a Node, CobraError> {
    let parent = depth.checked_sub(1).ok_or_else(out_of_sync)?;
    block_of(body, frames, parent)?.get(frames[parent].index).ok_or_else(out_of_sync)
}

/// Pops the finished frame and moves its parent past the owning statement.
fn leave(frames: &mut Vec<Frame>) {
    frames.pop();
    if let Some(parent) = frames.last_mut() {
        parent.index += 1;
    }
}

impl Interpreter {
    /// Runs the generator to its next `yield`. `None` once it is finished.
    pub fn resume(&mut self, generator: &GeneratorRef) -> Result<Option<Value>, CobraError> {
        let state = std::mem::replace(&mut *generator.lock(), GeneratorState::Running);
        let suspended = match state {
            GeneratorState::Suspended(s) => s,
            GeneratorState::Running => return Err(RuntimeError::GeneratorRunning.into()),
            GeneratorState::Done => {
                *generator.lock() = GeneratorState::Done;
                return Ok(None);
            }
        };
        let Suspended { def, context, mut frames, defers } = *suspended;
        if let Err(e) = self.enter_call() {
            *generator.lock() = GeneratorState::Done;
            return Err(e);
        }
        let contexts_base = self.contexts.len();
        let defers_base = self.defer_frames.len();
        self.contexts.push(context);
        self.attach_scopes(&mut frames);
        self.defer_frames.extend(defers);

        let mut outcome = self.step(&def.body, &mut frames);
        if !matches!(outcome, Ok(Some(_))) {
            // finished: whatever is still deferred runs now
            while self.defer_frames.len() > defers_base {
                if let Err(e) = self.run_deferred() {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
            frames.clear();
        }
        let defers = self.defer_frames.split_off(defers_base);
        self.detach_scopes(&mut frames);
        self.contexts.truncate(contexts_base + 1);
        let context = self.contexts.pop();
        self.depth -= 1;
        match (outcome, context) {
            (Ok(Some(v)), Some(context)) => {
                *generator.lock() = GeneratorState::Suspended(Box::new(Suspended { def, context, frames, defers }));
                Ok(Some(v))
            }
            (Ok(_), _) => {
                *generator.lock() = GeneratorState::Done;
                Ok(None)
            }
            (Err(e), _) => {
                *generator.lock() = GeneratorState::Done;
                Err(e)
            }
        }
    }

    /// Puts the `con` scopes of a suspended generator back on the context
    /// stack, outermost first.
    fn attach_scopes(&mut self, frames: &mut [Frame]) {
        for frame in frames.iter_mut() {
            if let FrameKind::With { scope, .. } = &mut frame.kind {
                if let Some(ctx) = scope.take() {
                    self.contexts.push(ctx);
                }
            }
        }
    }

    fn detach_scopes(&mut self, frames: &mut [Frame]) {
        for frame in frames.iter_mut().rev() {
            if let FrameKind::With { scope, .. } = &mut frame.kind {
                *scope = self.contexts.pop();
            }
        }
    }

    fn step(&mut self, body: &[Node], frames: &mut Vec<Frame>) -> Result<Option<Value>, CobraError> {
        loop {
            let pending = match self.advance(body, frames) {
                Ok(Advance::Next) => continue,
                Ok(Advance::Yield(v)) => return Ok(Some(v)),
                Ok(Advance::Done) => return Ok(None),
                Ok(Advance::Unwind(p)) => p,
                Err(e) => Pending::Error(e),
            };
            if !self.unwind(body, frames, pending)? {
                return Ok(None);
            }
        }
    }

    fn advance(&mut self, body: &[Node], frames: &mut Vec<Frame>) -> Result<Advance, CobraError> {
        let Some(depth) = frames.len().checked_sub(1) else {
            return Ok(Advance::Done);
        };
        let block = block_of(body, frames, depth)?;
        let Some(stmt) = block.get(frames[depth].index) else {
            return Ok(match self.finish_block(body, frames)? {
                Some(p) => Advance::Unwind(p),
                None => Advance::Next,
            });
        };
        if !stmt.contains_yield() {
            return Ok(match self.exec_stmt(stmt)? {
                Flow::Normal => {
                    frames[depth].index += 1;
                    Advance::Next
                }
                Flow::Return(_) => Advance::Unwind(Pending::Return),
                Flow::Break => Advance::Unwind(Pending::Break),
                Flow::Continue => Advance::Unwind(Pending::Continue),
            });
        }
        self.validate(stmt)?;
        match stmt {
            Node::Yield(value) => {
                let v = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::Null,
                };
                frames[depth].index += 1;
                return Ok(Advance::Yield(v));
            }
            Node::Conditional { cond, .. } | Node::Guard { cond, .. } => {
                let c = self.eval(cond)?;
                let branch = if self.truthy(&c)? { Branch::Then } else { Branch::Else };
                frames.push(Frame::block(branch));
            }
            Node::While { .. } => frames.push(Frame::looping(FrameKind::Loop)),
            Node::For { var, iterable, .. } => {
                let it = self.eval(iterable)?;
                let source = self.iter_source(it)?;
                frames.push(Frame::looping(FrameKind::For { var: var.clone(), source }));
            }
            Node::Switch { subject, cases, .. } => {
                let v = self.eval(subject)?;
                let mut branch = Branch::Default;
                for (i, case) in cases.iter().enumerate() {
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
                    branch = Branch::Case(i);
                    break;
                }
                frames.push(Frame::block(branch));
            }
            Node::TryCatch { .. } => {
                frames.push(Frame { branch: Branch::Body, index: 0, kind: FrameKind::Try { pending: None } });
            }
            Node::With { context, alias, .. } => {
                let manager = self.eval(context)?;
                let scope = self.enter_manager(&manager, alias.as_deref())?;
                self.contexts.push(scope);
                self.defer_frames.push(Vec::new());
                frames.push(Frame { branch: Branch::Body, index: 0, kind: FrameKind::With { manager, scope: None } });
            }
            other => {
                return Err(RuntimeError::Unsupported(format!(
                    "'yield' inside '{}' is not supported in generators",
                    other.kind_name()
                ))
                .into())
            }
        }
        Ok(Advance::Next)
    }

    /// The innermost frame ran past its last statement.
    fn finish_block(&mut self, body: &[Node], frames: &mut Vec<Frame>) -> Result<Option<Pending>, CobraError> {
        let depth = frames.len() - 1;
        let again = match frames[depth].kind {
            FrameKind::Block => false,
            FrameKind::Loop => {
                let Node::While { cond, .. } = owner_of(body, frames, depth)? else {
                    return Err(out_of_sync());
                };
                let c = self.eval(cond)?;
                self.truthy(&c)?
            }
            FrameKind::For { .. } => {
                let FrameKind::For { var, source } = &mut frames[depth].kind else {
                    return Err(out_of_sync());
                };
                match source.next(self)? {
                    Some(item) => {
                        self.assign(var, item)?;
                        true
                    }
                    None => false,
                }
            }
            FrameKind::Try { .. } => return self.finish_try(body, frames),
            FrameKind::With { .. } => return Ok(self.leave_with(frames, None)),
        };
        if again {
            frames[depth].index = 0;
        } else {
            leave(frames);
        }
        Ok(None)
    }

    /// `intentar` or `capturar` completed: on to `finalmente`, if any. A
    /// completed `finalmente` resumes whatever was pending before it.
    fn finish_try(&mut self, body: &[Node], frames: &mut Vec<Frame>) -> Result<Option<Pending>, CobraError> {
        let depth = frames.len() - 1;
        let Node::TryCatch { finally_block, .. } = owner_of(body, frames, depth)? else {
            return Err(out_of_sync());
        };
        if frames[depth].branch != Branch::Finally && !finally_block.is_empty() {
            frames[depth].branch = Branch::Finally;
            frames[depth].index = 0;
            return Ok(None);
        }
        let pending = match &mut frames[depth].kind {
            FrameKind::Try { pending } => pending.take(),
            _ => None,
        };
        leave(frames);
        Ok(pending)
    }

    /// Closes the innermost `con` frame: its defers, its scope, then
    /// `__exit__`. Returns what unwinding continues with.
    fn leave_with(&mut self, frames: &mut Vec<Frame>, pending: Option<Pending>) -> Option<Pending> {
        let Some(Frame { kind: FrameKind::With { manager, .. }, .. }) = frames.pop() else {
            return pending;
        };
        let deferred = self.run_deferred();
        self.contexts.pop();
        let pending = match (pending, deferred) {
            (Some(Pending::Error(e)), _) => Some(Pending::Error(e)),
            (_, Err(e)) => Some(Pending::Error(e)),
            (other, Ok(())) => other,
        };
        let error = match &pending {
            Some(Pending::Error(e)) => Some(e),
            _ => None,
        };
        let pending = match self.exit_manager(&manager, error) {
            Ok(()) => pending,
            Err(e) => Some(Pending::Error(e)),
        };
        if pending.is_none() {
            if let Some(parent) = frames.last_mut() {
                parent.index += 1;
            }
        }
        pending
    }

    /// Pops frames until something handles `pending`. `Ok(true)` when a
    /// frame took over and the generator keeps running; `Ok(false)` when it
    /// returned.
    fn unwind(&mut self, body: &[Node], frames: &mut Vec<Frame>, mut pending: Pending) -> Result<bool, CobraError> {
        while let Some(depth) = frames.len().checked_sub(1) {
            match frames[depth].kind {
                FrameKind::Block => {
                    frames.pop();
                }
                FrameKind::Loop | FrameKind::For { .. } => match pending {
                    Pending::Break => {
                        leave(frames);
                        return Ok(true);
                    }
                    Pending::Continue => {
                        frames[depth].index = usize::MAX;
                        return Ok(true);
                    }
                    _ => {
                        frames.pop();
                    }
                },
                FrameKind::Try { .. } => match self.unwind_try(body, frames, pending)? {
                    Some(next) => pending = next,
                    None => return Ok(true),
                },
                FrameKind::With { .. } => match self.leave_with(frames, Some(pending)) {
                    Some(next) => pending = next,
                    None => return Ok(true),
                },
            }
        }
        match pending {
            Pending::Error(e) => Err(e),
            _ => Ok(false),
        }
    }

    /// `pending` reached an `intentar` frame. Runtime errors from its body
    /// go to `capturar`; anything else goes through `finalmente` first.
    /// `None` when the frame keeps running.
    fn unwind_try(&mut self, body: &[Node], frames: &mut Vec<Frame>, pending: Pending) -> Result<Option<Pending>, CobraError> {
        let depth = frames.len() - 1;
        let Node::TryCatch { catch_name, catch_block, finally_block, .. } = owner_of(body, frames, depth)? else {
            return Err(out_of_sync());
        };
        let branch = frames[depth].branch;
        let handles = catch_name.is_some() || !catch_block.is_empty();
        let pending = match pending {
            // security, resource and import errors are never catchable
            Pending::Error(CobraError::Runtime(err)) if branch == Branch::Body && handles => {
                let payload = match err {
                    RuntimeError::Exception(v) => v,
                    other => Value::Str(other.to_string()),
                };
                tracing::debug!(exception = %payload, "caught in generator");
                let bound = match catch_name {
                    Some(name) => self.assign(name, payload),
                    None => Ok(()),
                };
                match bound {
                    Ok(()) => {
                        frames[depth].branch = Branch::Catch;
                        frames[depth].index = 0;
                        return Ok(None);
                    }
                    Err(e) => Pending::Error(e),
                }
            }
            other => other,
        };
        if branch != Branch::Finally && !finally_block.is_empty() {
            frames[depth] = Frame { branch: Branch::Finally, index: 0, kind: FrameKind::Try { pending: Some(pending) } };
            return Ok(None);
        }
        // control flow out of `finalmente` replaces whatever was pending
        frames.pop();
        Ok(Some(pending))
    }
}

/// Drives a generator through Rust's `Iterator` protocol.
pub struct GeneratorIter<'a> {
    interp: &'a mut Interpreter,
    generator: GeneratorRef,
    finished: bool,
}

impl<'a> GeneratorIter<'a> {
    pub fn new(interp: &'a mut Interpreter, generator: GeneratorRef) -> Self {
        GeneratorIter { interp, generator, finished: false }
    }
}

impl Iterator for GeneratorIter<'_> {
    type Item = Result<Value, CobraError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.interp.resume(&self.generator) {
            Ok(Some(v)) => Some(Ok(v)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
