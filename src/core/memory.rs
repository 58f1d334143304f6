//! Logical memory accounting for the interpreter.
//!
//! Every live variable binding holds a slot in a fixed arena of
//! [`ARENA_BLOCKS`] blocks. The arena is bookkeeping only; values themselves
//! live on the Rust heap. How slots are placed is decided by a swappable
//! [`MemoryPolicy`].

use std::collections::HashMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::core::limits::ResourceError;

pub const ARENA_BLOCKS: usize = 1024;
pub const DEFAULT_EVOLVE_EVERY: u64 = 1000;

pub trait MemoryPolicy: Send + fmt::Debug {
    /// Start index of `size` consecutive free blocks, if any.
    fn allocate(&mut self, size: usize) -> Option<usize>;
    fn free(&mut self, index: usize, size: usize);
    /// Gives the policy a chance to adapt. Called periodically and after a
    /// failed allocation.
    fn evolve(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategy {
    #[default]
    FreeList,
    Genetic,
}

impl MemoryStrategy {
    pub fn build(self) -> Box<dyn MemoryPolicy> {
        match self {
            MemoryStrategy::FreeList => Box::new(FreeListPolicy::new(ARENA_BLOCKS)),
            MemoryStrategy::Genetic => Box::new(GeneticPolicy::new(ARENA_BLOCKS, 10)),
        }
    }
}

/// Marks `size` blocks starting at the first run of free blocks found
/// scanning from `start` (wrapping once).
fn first_fit(blocks: &mut [bool], size: usize, start: usize) -> Option<usize> {
    if size == 0 || size > blocks.len() {
        return None;
    }
    let last = blocks.len() - size;
    let start = start.min(last);
    let order = (start..=last).chain(0..start);
    for i in order {
        if blocks[i..i + size].iter().all(|used| !used) {
            blocks[i..i + size].iter_mut().for_each(|b| *b = true);
            return Some(i);
        }
    }
    None
}

fn release(blocks: &mut [bool], index: usize, size: usize) {
    let end = (index + size).min(blocks.len());
    if index < end {
        blocks[index..end].iter_mut().for_each(|b| *b = false);
    }
}

/// Deterministic first-fit allocator.
#[derive(Debug, Clone)]
pub struct FreeListPolicy {
    blocks: Vec<bool>,
}

impl FreeListPolicy {
    pub fn new(capacity: usize) -> Self {
        FreeListPolicy { blocks: vec![false; capacity] }
    }

    pub fn used(&self) -> usize {
        self.blocks.iter().filter(|b| **b).count()
    }
}

impl MemoryPolicy for FreeListPolicy {
    fn allocate(&mut self, size: usize) -> Option<usize> {
        first_fit(&mut self.blocks, size, 0)
    }

    fn free(&mut self, index: usize, size: usize) {
        release(&mut self.blocks, index, size);
    }

    fn evolve(&mut self) {}
}

/// Allocation strategy candidate evolved by [`GeneticPolicy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strategy {
    /// Largest request tried during fitness simulation.
    pub block_size: usize,
    /// Probability of compacting the scratch arena after each simulated op.
    /// Strategies with a low value place live slots next-fit instead of
    /// first-fit.
    pub gc_frequency: f64,
}

impl Strategy {
    fn random(rng: &mut StdRng) -> Self {
        Strategy { block_size: rng.gen_range(1..=128), gc_frequency: rng.gen_range(0.0..1.0) }
    }

    /// Total blocks successfully placed over 100 simulated operations.
    fn fitness(&self, capacity: usize, rng: &mut StdRng) -> usize {
        let mut scratch = vec![false; capacity];
        let mut total = 0;
        for _ in 0..100 {
            let size = rng.gen_range(1..=self.block_size);
            if let Some(index) = first_fit(&mut scratch, size, 0) {
                total += size;
                if rng.gen_bool(0.5) {
                    release(&mut scratch, index, size);
                }
            }
            if rng.gen::<f64>() < self.gc_frequency {
                let used = scratch.iter().filter(|b| **b).count();
                scratch.iter_mut().enumerate().for_each(|(i, b)| *b = i < used);
            }
        }
        total
    }
}

/// Population of strategies refined by selection, crossover and mutation.
/// The fittest strategy decides where live slots go; the live arena is never
/// moved, so handed-out indices stay valid across generations.
#[derive(Debug)]
pub struct GeneticPolicy {
    blocks: Vec<bool>,
    population: Vec<Strategy>,
    generation: u32,
    cursor: usize,
    rng: StdRng,
}

impl GeneticPolicy {
    pub fn new(capacity: usize, population: usize) -> Self {
        Self::with_rng(capacity, population, StdRng::from_entropy())
    }

    /// Reproducible variant for tests.
    pub fn seeded(capacity: usize, population: usize, seed: u64) -> Self {
        Self::with_rng(capacity, population, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, population: usize, mut rng: StdRng) -> Self {
        let population = (0..population.max(2)).map(|_| Strategy::random(&mut rng)).collect();
        GeneticPolicy { blocks: vec![false; capacity], population, generation: 0, cursor: 0, rng }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn population(&self) -> &[Strategy] {
        &self.population
    }

    fn best(&self) -> Strategy {
        self.population[0]
    }

    fn select(&mut self) {
        let capacity = self.blocks.len();
        let mut scored: Vec<(usize, Strategy)> = Vec::with_capacity(self.population.len());
        for s in &self.population {
            scored.push((s.fitness(capacity, &mut self.rng), *s));
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let keep = (scored.len() / 2).max(2);
        self.population = scored.into_iter().take(keep).map(|(_, s)| s).collect();
    }

    fn crossover(&mut self) {
        let mut children = Vec::with_capacity(self.population.len());
        for _ in 0..self.population.len() {
            let parents: Vec<Strategy> = self.population.choose_multiple(&mut self.rng, 2).copied().collect();
            let (a, b) = (parents[0], parents[1]);
            children.push(Strategy {
                block_size: if self.rng.gen_bool(0.5) { a.block_size } else { b.block_size },
                gc_frequency: if self.rng.gen_bool(0.5) { a.gc_frequency } else { b.gc_frequency },
            });
        }
        self.population.extend(children);
    }

    fn mutate(&mut self) {
        // the current best is kept as is
        for s in self.population.iter_mut().skip(1) {
            if self.rng.gen_bool(0.1) {
                s.block_size = self.rng.gen_range(1..=128);
            }
            if self.rng.gen_bool(0.1) {
                s.gc_frequency = self.rng.gen_range(0.0..1.0);
            }
        }
    }
}

impl MemoryPolicy for GeneticPolicy {
    fn allocate(&mut self, size: usize) -> Option<usize> {
        let start = if self.best().gc_frequency < 0.5 { self.cursor } else { 0 };
        let index = first_fit(&mut self.blocks, size, start)?;
        self.cursor = index + size;
        Some(index)
    }

    fn free(&mut self, index: usize, size: usize) {
        release(&mut self.blocks, index, size);
    }

    fn evolve(&mut self) {
        self.select();
        self.crossover();
        self.mutate();
        self.generation += 1;
        tracing::debug!(generation = self.generation, strategies = self.population.len(), "memory strategies evolved");
    }
}

/// Front end the interpreter talks to.
#[derive(Debug)]
pub struct MemoryManager {
    policy: Box<dyn MemoryPolicy>,
    evolve_every: u64,
    ops: u64,
    live: HashMap<usize, usize>,
    failed: u64,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(Box::new(FreeListPolicy::new(ARENA_BLOCKS)))
    }
}

impl MemoryManager {
    pub fn new(policy: Box<dyn MemoryPolicy>) -> Self {
        MemoryManager { policy, evolve_every: DEFAULT_EVOLVE_EVERY, ops: 0, live: HashMap::new(), failed: 0 }
    }

    pub fn with_evolve_every(mut self, every: u64) -> Self {
        self.evolve_every = every;
        self
    }

    /// Allocates `size` blocks, evolving the policy and retrying once when
    /// the first attempt fails. Failures are counted in [`Self::failed`].
    pub fn request_slot(&mut self, size: usize) -> Result<usize, ResourceError> {
        self.ops += 1;
        if self.evolve_every > 0 && self.ops % self.evolve_every == 0 {
            self.policy.evolve();
        }
        let index = match self.policy.allocate(size) {
            Some(i) => i,
            None => {
                self.policy.evolve();
                match self.policy.allocate(size) {
                    Some(i) => i,
                    None => {
                        self.failed += 1;
                        if self.failed == 1 {
                            tracing::warn!(size, live = self.live.len(), "memory arena exhausted");
                        }
                        return Err(ResourceError::MemoryExhausted { requested: size });
                    }
                }
            }
        };
        self.live.insert(index, size);
        Ok(index)
    }

    pub fn release_slot(&mut self, index: usize, size: usize) {
        if self.live.remove(&index).is_some() {
            self.policy.free(index, size);
        }
    }

    /// Number of slots currently held.
    pub fn live_slots(&self) -> usize {
        self.live.len()
    }

    pub fn operations(&self) -> u64 {
        self.ops
    }

    /// Requests the arena could not serve.
    pub fn failed(&self) -> u64 {
        self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_reuses_freed_blocks() {
        let mut p = FreeListPolicy::new(8);
        assert_eq!(p.allocate(3), Some(0));
        assert_eq!(p.allocate(3), Some(3));
        p.free(0, 3);
        assert_eq!(p.allocate(2), Some(0));
        assert_eq!(p.allocate(3), None);
        assert_eq!(p.used(), 5);
    }

    #[test]
    fn last_block_is_usable() {
        let mut p = FreeListPolicy::new(4);
        assert_eq!(p.allocate(4), Some(0));
        p.free(0, 4);
        assert_eq!(p.allocate(1), Some(0));
        assert_eq!(p.allocate(3), Some(1));
    }

    #[test]
    fn manager_reports_exhaustion() {
        let mut m = MemoryManager::new(Box::new(FreeListPolicy::new(2)));
        let a = m.request_slot(1).unwrap();
        m.request_slot(1).unwrap();
        assert!(matches!(m.request_slot(1), Err(ResourceError::MemoryExhausted { requested: 1 })));
        assert_eq!(m.failed(), 1);
        m.release_slot(a, 1);
        assert_eq!(m.live_slots(), 1);
        assert!(m.request_slot(1).is_ok());
    }

    #[derive(Debug, Default)]
    struct Counting {
        inner: Option<FreeListPolicy>,
        evolutions: usize,
    }

    impl MemoryPolicy for Counting {
        fn allocate(&mut self, size: usize) -> Option<usize> {
            self.inner.get_or_insert_with(|| FreeListPolicy::new(16)).allocate(size)
        }
        fn free(&mut self, index: usize, size: usize) {
            if let Some(p) = &mut self.inner {
                p.free(index, size);
            }
        }
        fn evolve(&mut self) {
            self.evolutions += 1;
        }
    }

    #[test]
    fn evolves_on_schedule() {
        let mut m = MemoryManager::new(Box::new(Counting::default())).with_evolve_every(3);
        for _ in 0..6 {
            let i = m.request_slot(1).unwrap();
            m.release_slot(i, 1);
        }
        assert_eq!(m.operations(), 6);
        let dbg = format!("{:?}", m);
        assert!(dbg.contains("evolutions: 2"), "{}", dbg);
    }

    #[test]
    fn genetic_policy_keeps_live_slots_across_generations() {
        let mut p = GeneticPolicy::seeded(64, 10, 7);
        let a = p.allocate(4).unwrap();
        p.evolve();
        p.evolve();
        assert_eq!(p.generation(), 2);
        assert!(p.population().len() >= 2);
        let b = p.allocate(4).unwrap();
        assert!(b >= a + 4 || b + 4 <= a);
    }
}
