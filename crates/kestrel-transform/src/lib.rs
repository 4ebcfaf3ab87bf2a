//! Closure conversion for Kestrel
//!
//! Replaces every lambda and method reference in a [`CompilationUnit`] with
//! the construction of a synthesized adapter type that implements the target
//! functional interface:
//!
//! - **Capturing** sites become `NewClosure`, allocating a fresh adapter per
//!   evaluation whose fields hold captured locals (by value), enclosing
//!   instances (by reference) and bound receivers.
//! - **Non-capturing** sites become `ClosureSingleton`, so every evaluation of
//!   the site yields the same object.
//!
//! Each top-level type and everything nested in it forms one partition.
//! Partitions share no naming or numbering state, so they are lowered in
//! parallel on the rayon pool and produce the same tree as a sequential run.
//! A failure anywhere leaves the unit untouched.

pub mod bridge;
pub mod capture;
pub mod descriptor;
pub mod emit;
pub mod error;
pub mod identity;
pub mod method_ref;
pub mod options;
pub mod rewrite;
pub mod sam;
pub mod scope;

pub use descriptor::{
    BoundReceiver, CapturedBinding, ClosureDescriptor, ConstructorTarget, FunctionalInterfaceDescriptor,
    ReferenceForm, Slot,
};
pub use error::{ClosureError, ErrorKind, Result};
pub use options::{LoweringOptions, SingletonPolicy};

use kestrel_hir::{CompilationUnit, Instantiation};
use kestrel_types::ClassId;
use log::{debug, info};
use rayon::prelude::*;
use rewrite::{count_sites, Lowerer, PartitionOutput};
use serde::Serialize;

/// Outcome of a successful conversion
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoweringSummary {
    /// Lambda and method-reference sites replaced
    pub sites: usize,
    pub capturing: usize,
    pub singletons: usize,
    /// Synthesized adapters in id order
    pub adapters: Vec<(ClassId, String)>,
}

struct Job {
    top: ClassId,
    first_adapter: u32,
    sites: usize,
}

/// Lower every closure site of `unit`.
///
/// Adapters are appended to the type arena. Ids are assigned per partition
/// from contiguous ranges in partition order, so the result does not depend
/// on `options.parallel`.
pub fn convert_closures(unit: &mut CompilationUnit, options: &LoweringOptions) -> Result<LoweringSummary> {
    let jobs = plan(unit);
    let total: usize = jobs.iter().map(|j| j.sites).sum();
    if total == 0 {
        debug!("{}: no closure sites", unit.name);
        return Ok(LoweringSummary::default());
    }
    let first_local = unit.max_local_id().map_or(1, |max| max + 1);

    let snapshot: &CompilationUnit = unit;
    let lower = |job: &Job| {
        debug!(
            "lowering partition {} ({} site(s), adapters from #{})",
            snapshot.class_name(job.top),
            job.sites,
            job.first_adapter
        );
        Lowerer::new(snapshot, options, job.first_adapter, first_local).lower_partition(job.top)
    };
    let results: Vec<Result<PartitionOutput>> = if options.parallel {
        jobs.par_iter().map(lower).collect()
    } else {
        jobs.iter().map(lower).collect()
    };

    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        outputs.push(result?);
    }

    let mut summary = LoweringSummary {
        sites: total,
        ..LoweringSummary::default()
    };
    let mut adapters = Vec::with_capacity(total);
    for output in outputs {
        for decl in output.types {
            let index = decl.id.index();
            unit.types[index] = decl;
        }
        adapters.extend(output.adapters);
    }
    adapters.sort_by_key(|a| a.id);
    for adapter in adapters {
        debug_assert_eq!(adapter.id.index(), unit.types.len());
        match adapter.adapter.as_ref().map(|a| a.instantiation) {
            Some(Instantiation::PerEvaluation) => summary.capturing += 1,
            _ => summary.singletons += 1,
        }
        summary.adapters.push((adapter.id, adapter.name.clone()));
        unit.types.push(adapter);
    }

    info!(
        "{}: lowered {} closure site(s), {} capturing, {} singleton",
        unit.name, summary.sites, summary.capturing, summary.singletons
    );
    Ok(summary)
}

/// Partitions in order of their top-level type, with their adapter id ranges.
fn plan(unit: &CompilationUnit) -> Vec<Job> {
    let mut jobs: Vec<Job> = Vec::new();
    for decl in &unit.types {
        if decl.kind == kestrel_hir::TypeKind::Adapter {
            continue;
        }
        let top = unit.top_level(decl.id);
        let sites = count_sites(decl);
        match jobs.iter_mut().find(|j| j.top == top) {
            Some(job) => job.sites += sites,
            None => jobs.push(Job {
                top,
                first_adapter: 0,
                sites,
            }),
        }
    }
    jobs.sort_by_key(|j| j.top);
    let mut next = unit.types.len() as u32;
    for job in &mut jobs {
        job.first_adapter = next;
        next += job.sites as u32;
    }
    jobs.retain(|j| j.sites > 0);
    jobs
}
