// src/core/pipeline.rs
//! Cobra pipeline driver
//! Lexing, parsing (optionally through an AST cache), semantic analysis and
//! execution, with per-stage timings when profiling is on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{
    ast::{count_nodes, Node},
    cache::{content_hash, AstCache},
    error::CobraError,
    interpreter::{value::Value, ExecuteOptions, Interpreter},
    lexer::Lexer,
    optimizer::{self, OptimizationStats},
    parser::{self, ParseOutput},
    resolver::ModuleResolver,
    semantic_analyzer::SemanticAnalyzer,
    token::Token,
};

/// Parses `source`, consulting `cache` by content hash first. A cache hit
/// carries no advisories since those are only produced while parsing.
pub fn parse_cached(source: &str, cache: &dyn AstCache) -> Result<ParseOutput, CobraError> {
    let hash = content_hash(source);
    if let Some(program) = cache.get(&hash) {
        tracing::debug!(hash = %&hash[..12], nodes = count_nodes(&program), "ast cache hit");
        return Ok(ParseOutput { program, advisories: Vec::new() });
    }
    let out = parser::parse_source(source)?;
    cache.put(&hash, source, &out.program);
    tracing::debug!(hash = %&hash[..12], "ast cache miss");
    Ok(out)
}

/// Wall-clock time spent per stage, in the order the stages ran.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    stages: Vec<(&'static str, Duration)>,
}

impl Profile {
    pub fn stages(&self) -> &[(&'static str, Duration)] {
        &self.stages
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }

    fn record(&mut self, stage: &'static str, elapsed: Duration) {
        tracing::info!(stage, micros = elapsed.as_micros() as u64, "stage finished");
        self.stages.push((stage, elapsed));
    }
}

#[derive(Default)]
pub struct Pipeline {
    cache: Option<Arc<dyn AstCache>>,
    resolver: Option<Arc<dyn ModuleResolver>>,
    profile: Option<Profile>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: Arc<dyn AstCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolver used by `check` to verify `desde ... import` names.
    pub fn with_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn profiling(mut self, enabled: bool) -> Self {
        self.profile = enabled.then(Profile::default);
        self
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    fn timed<T>(&mut self, stage: &'static str, f: impl FnOnce(&mut Self) -> T) -> T {
        let start = Instant::now();
        let out = f(self);
        if let Some(p) = self.profile.as_mut() {
            p.record(stage, start.elapsed());
        }
        out
    }

    pub fn tokenize(&mut self, source: &str) -> Result<Vec<Token>, CobraError> {
        let profiling = self.profile.is_some();
        self.timed("lex", |_| -> Result<Vec<Token>, CobraError> {
            let mut lexer = Lexer::new(source).with_profiling(profiling);
            let tokens = lexer.tokenize()?;
            tracing::debug!(tokens = tokens.len(), "lexed");
            Ok(tokens)
        })
    }

    pub fn parse(&mut self, source: &str) -> Result<ParseOutput, CobraError> {
        let out = self.timed("parse", |p| match &p.cache {
            Some(cache) => parse_cached(source, cache.as_ref()),
            None => parser::parse_source(source),
        })?;
        for a in &out.advisories {
            tracing::warn!(line = a.line, column = a.column, kind = ?a.kind, "{}", a.message);
        }
        tracing::debug!(statements = out.program.len(), nodes = count_nodes(&out.program), "parsed");
        Ok(out)
    }

    /// Parses and analyzes without running anything.
    pub fn check(&mut self, source: &str) -> Result<ParseOutput, CobraError> {
        let out = self.parse(source)?;
        self.analyze(&out.program)?;
        Ok(out)
    }

    pub fn analyze(&mut self, program: &[Node]) -> Result<(), CobraError> {
        self.timed("analyze", |p| -> Result<(), CobraError> {
            let mut analyzer = SemanticAnalyzer::new();
            if let Some(r) = &p.resolver {
                analyzer = analyzer.with_resolver(Arc::clone(r));
            }
            analyzer.analyze(program)?;
            tracing::debug!("analysis passed");
            Ok(())
        })
    }

    pub fn optimize(&mut self, program: Vec<Node>) -> (Vec<Node>, OptimizationStats) {
        self.timed("optimize", |_| optimizer::optimize_with_stats(program))
    }

    /// Parses `source` and executes it on `interp`.
    pub fn run(
        &mut self,
        interp: &mut Interpreter,
        source: &str,
        options: &ExecuteOptions,
    ) -> Result<Option<Value>, CobraError> {
        let out = self.parse(source)?;
        let result = self.timed("execute", |_| interp.execute(out.program, options));
        interp.join_threads();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::InMemoryAstCache;
    use crate::core::interpreter::SharedBuffer;
    use crate::core::limits::NoopLimiter;

    #[test]
    fn cached_parse_returns_same_program() {
        let cache = InMemoryAstCache::new();
        let first = parse_cached("var x = 1\nimprimir(x)", &cache).unwrap();
        assert_eq!(cache.stats().0, 1);
        let second = parse_cached("var x = 1\nimprimir(x)", &cache).unwrap();
        assert_eq!(first.program, second.program);
        assert_eq!(cache.stats().0, 1);
    }

    #[test]
    fn parse_errors_are_not_cached() {
        let cache = InMemoryAstCache::new();
        assert!(parse_cached("si :", &cache).is_err());
        assert_eq!(cache.stats().0, 0);
    }

    #[test]
    fn run_records_every_stage() {
        let buf = SharedBuffer::new();
        let mut interp = Interpreter::builder().output(buf.clone()).limiter(Arc::new(NoopLimiter)).build();
        let mut pipeline = Pipeline::new().with_cache(Arc::new(InMemoryAstCache::new())).profiling(true);
        pipeline.run(&mut interp, "var x = 3\nimprimir(x)", &ExecuteOptions::default()).unwrap();
        assert_eq!(buf.contents(), "3\n");
        let stages: Vec<&str> = pipeline.profile().unwrap().stages().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, vec!["parse", "execute"]);
    }

    #[test]
    fn check_reports_semantic_errors() {
        let err = Pipeline::new().check("imprimir(nadie)").unwrap_err();
        assert_eq!(err.kind(), "semantic error");
    }
}
