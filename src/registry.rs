//! Advice registry snapshots.
//!
//! Readers pin an `Arc<Snapshot>` and match against that immutable view;
//! a reweave compiles a replacement and publishes it in one swap. Each
//! published snapshot carries a generation so cached analyses can tell
//! which rule set they were built from.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use tracing::info;

use crate::advice::{Advice, AdviceError};
use crate::compose::{MixinType, ShimType};
use crate::config::RuleSet;
use crate::conflict::Conflict;

/// Immutable compiled rule set.
#[derive(Debug, Default)]
pub struct Snapshot {
    generation: u64,
    advisors: Vec<Arc<Advice>>,
    mixins: Vec<Arc<MixinType>>,
    shims: Vec<Arc<ShimType>>,
    rejected: Vec<Conflict>,
}

impl Snapshot {
    /// Compile every rule; rejected rules are reported and left out.
    pub fn compile(rules: RuleSet) -> Self {
        let mut advisors = Vec::with_capacity(rules.advice.len());
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for (registration, rule) in rules.advice.into_iter().enumerate() {
            let compiled = if seen.insert(rule.id.clone()) {
                Advice::compile(rule.id, rule.pointcut, rule.handles, registration)
            } else {
                Err(AdviceError::DuplicateId { advice: rule.id })
            };
            match compiled {
                Ok(advice) => advisors.push(Arc::new(advice)),
                Err(error) => rejected.push(rejected_advice(error).report()),
            }
        }

        let mut mixin_ids = HashSet::new();
        let mut mixins = Vec::with_capacity(rules.mixins.len());
        for mixin in rules.mixins {
            if mixin_ids.insert(mixin.id.clone()) {
                mixins.push(Arc::new(mixin));
            } else {
                rejected.push(Conflict::DuplicateMixin { mixin: mixin.id }.report());
            }
        }

        Self {
            generation: 0,
            advisors,
            mixins,
            shims: rules.shims.into_iter().map(Arc::new).collect(),
            rejected,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Compiled advice in registration order.
    pub fn advisors(&self) -> &[Arc<Advice>] {
        &self.advisors
    }

    pub fn mixins(&self) -> &[Arc<MixinType>] {
        &self.mixins
    }

    pub fn shims(&self) -> &[Arc<ShimType>] {
        &self.shims
    }

    pub fn rejected(&self) -> &[Conflict] {
        &self.rejected
    }
}

fn rejected_advice(error: AdviceError) -> Conflict {
    let advice = match &error {
        AdviceError::InvalidPointcut { advice, .. }
        | AdviceError::NoHandles { advice }
        | AdviceError::IllegalBinding { advice, .. }
        | AdviceError::MissingTraveler { advice, .. }
        | AdviceError::MisplacedTraveler { advice, .. }
        | AdviceError::MissingMetaType { advice, .. }
        | AdviceError::DuplicateId { advice } => advice.clone(),
    };
    Conflict::RejectedAdvice {
        advice,
        reason: error.to_string(),
    }
}

/// Process-wide holder of the current snapshot.
pub struct AdviceRegistry {
    current: ArcSwap<Snapshot>,
    last_generation: AtomicU64,
}

impl AdviceRegistry {
    pub fn new(mut snapshot: Snapshot) -> Self {
        snapshot.generation = 1;
        Self {
            current: ArcSwap::from_pointee(snapshot),
            last_generation: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Stamp `snapshot` with the next generation and make it current.
    pub fn publish(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        snapshot.generation = self.last_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(snapshot);
        self.current.store(Arc::clone(&snapshot));
        info!(
            generation = snapshot.generation,
            advice = snapshot.advisors.len(),
            "published advice snapshot"
        );
        snapshot
    }
}
