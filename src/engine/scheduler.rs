use std::time::Instant;

use tracing::Level;

use crate::core::{Key, KeySet, Order, format_keys};
use crate::engine::diagnostics::{Diagnostics, Round};
use crate::engine::resolver::Resolver;
use crate::error::EngineError;
use crate::registry::{Context, Registry};
use crate::store::{AnnotationStore, Model};
use crate::tree::{Node, Visit};

/// Lifecycle of a single scheduler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Validating the request and computing its closure.
    Expanding,
    /// Running frontier rounds.
    Executing,
    Done,
    /// No key was ready while some remained open.
    Blocked,
    Failed,
}

/// Incremental driver computing and removing annotations on a model.
///
/// Requests are expanded into their requirement closure, keys already
/// computed for the model are skipped, and the rest is computed in rounds.
/// Each round takes the keys whose prerequisites are all computed and runs
/// them in a single traversal of the tree.
pub struct Scheduler<'r, N> {
    registry: &'r Registry<N>,
    phase: Phase,
}

impl<'r, N> Scheduler<'r, N>
where
    N: Node,
{
    pub fn new(registry: &'r Registry<N>) -> Self {
        Self {
            registry,
            phase: Phase::Idle,
        }
    }

    /// State reached by the last call.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Computes `requested` and everything it requires on `model`.
    ///
    /// Rounds completed before a failure stay computed, each of them is
    /// valid on its own.
    pub fn annotate<S>(
        &mut self,
        model: &mut Model<N, S>,
        requested: &KeySet,
    ) -> Result<Diagnostics, EngineError>
    where
        S: AnnotationStore,
    {
        let span = tracing::span!(Level::INFO, "annotate", keys = %format_keys(requested));
        let _enter = span.enter();

        self.phase = Phase::Expanding;
        let result = self.run_annotate(model, requested);

        self.phase = match &result {
            Ok(_) => Phase::Done,
            Err(EngineError::Unsatisfiable(_)) => Phase::Blocked,
            Err(_) => Phase::Failed,
        };

        result
    }

    fn run_annotate<S>(
        &mut self,
        model: &mut Model<N, S>,
        requested: &KeySet,
    ) -> Result<Diagnostics, EngineError>
    where
        S: AnnotationStore,
    {
        if let Some(unknown) = requested.iter().find(|key| !self.registry.contains(key)) {
            return Err(EngineError::UnknownKey(unknown.clone()));
        }

        let resolver = Resolver::new(self.registry.requirements());
        let closure = resolver.closure(requested)?;

        let mut open: KeySet = closure
            .difference(model.store.computed_keys_mut())
            .cloned()
            .collect();

        let mut diagnostics = Diagnostics::default();

        if open.is_empty() {
            tracing::debug!("all requested keys already computed");
            return Ok(diagnostics);
        }

        self.phase = Phase::Executing;

        while !open.is_empty() {
            let ready = resolver.ready_frontier(&open, model.store.computed_keys_mut());

            if ready.is_empty() {
                tracing::warn!(open = %format_keys(&open), "no key is ready, giving up");
                return Err(EngineError::Unsatisfiable(open));
            }

            let round = self.execute_round(model, ready, diagnostics.rounds.len());

            open.retain(|key| !round.keys.contains(key));
            model
                .store
                .computed_keys_mut()
                .extend(round.keys.iter().cloned());

            diagnostics.rounds.push(round);
        }

        Ok(diagnostics)
    }

    /// Runs one traversal computing every key of `ready` on every node that
    /// has a strategy for it.
    fn execute_round<S>(&self, model: &mut Model<N, S>, ready: KeySet, number: usize) -> Round
    where
        S: AnnotationStore,
    {
        let span = tracing::span!(Level::INFO, "round", number, keys = %format_keys(&ready));
        let _enter = span.enter();

        let start = Instant::now();
        let tree = &model.tree;
        let store = &mut model.store;

        let mut visited = 0;
        let mut stored = 0;

        tree.walk(tree.root(), |visit| {
            let (index, order) = match visit {
                Visit::Pre(index) => {
                    visited += 1;
                    (index, Order::Pre)
                }
                Visit::Post(index) => (index, Order::Post),
            };

            let kind = tree[index].kind();

            for key in &ready {
                let Some(entry) = self.registry.dispatch(key, kind) else {
                    continue;
                };

                if entry.order != order {
                    continue;
                }

                let value = {
                    let ctx = Context::new(tree, &*store);
                    entry.compute(&ctx, index)
                };

                if let Some(value) = value {
                    store.set(index, key.clone(), value);
                    stored += 1;
                }
            }
        });

        tracing::debug!(visited, stored, "round complete");

        Round {
            keys: ready,
            visited,
            stored,
            duration: start.elapsed(),
        }
    }

    /// Removes the values of `requested` from every node of `model`.
    ///
    /// Keys that were never computed are ignored. If any key that would stay
    /// computed requires a key that would not, nothing is touched and the
    /// stranded keys are reported. Returns the number of values removed.
    pub fn remove_annotations<S>(
        &mut self,
        model: &mut Model<N, S>,
        requested: &KeySet,
    ) -> Result<usize, EngineError>
    where
        S: AnnotationStore,
    {
        let span = tracing::span!(Level::INFO, "remove", keys = %format_keys(requested));
        let _enter = span.enter();

        self.phase = Phase::Expanding;
        let result = self.run_remove(model, requested);

        self.phase = match &result {
            Ok(_) => Phase::Done,
            Err(_) => Phase::Failed,
        };

        result
    }

    fn run_remove<S>(
        &mut self,
        model: &mut Model<N, S>,
        requested: &KeySet,
    ) -> Result<usize, EngineError>
    where
        S: AnnotationStore,
    {
        let computed = executed_keys(model);

        let to_remove: KeySet = requested.intersection(&computed).cloned().collect();
        if to_remove.is_empty() {
            return Ok(0);
        }

        let remaining: KeySet = computed.difference(&to_remove).cloned().collect();

        // keys left over from a previous configuration have no requirements
        let known: KeySet = remaining
            .iter()
            .filter(|key| self.registry.contains(key))
            .cloned()
            .collect();

        let resolver = Resolver::new(self.registry.requirements());
        let stranded = resolver.unsatisfied(&known, &remaining)?;

        if !stranded.is_empty() {
            tracing::warn!(stranded = %format_keys(&stranded), "removal refused");
            return Err(EngineError::DependencyViolation(stranded));
        }

        self.phase = Phase::Executing;

        let tree = &model.tree;
        let store = &mut model.store;
        let mut removed = 0;

        tree.walk(tree.root(), |visit| {
            if let Visit::Pre(index) = visit {
                for key in &to_remove {
                    if store.remove(index, key).is_some() {
                        removed += 1;
                    }
                }
            }
        });

        store
            .computed_keys_mut()
            .retain(|key: &Key| !to_remove.contains(key));

        tracing::debug!(removed, "annotations removed");
        Ok(removed)
    }
}

/// Keys fully computed for `model`, without creating the record.
pub fn executed_keys<N, S>(model: &Model<N, S>) -> KeySet
where
    S: AnnotationStore,
{
    model.store.computed_keys().cloned().unwrap_or_default()
}
