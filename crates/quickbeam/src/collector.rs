//! Mark-and-sweep collection of unreachable containers

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, trace};

use crate::lifetime::dispose;
use crate::object::Object;
use crate::registry::Handle;
use crate::runtime::Runtime;

impl Runtime {
    /// Destroy every container that is not reachable from a root, returning
    /// how many were destroyed.
    ///
    /// Roots are the database root and every object with a script retain.
    /// Pool members are reachable through the database root. Claims held only
    /// by the autorelease queue do not keep an object alive here.
    ///
    /// Other threads may keep mutating while a pass runs. Any object that
    /// gains a claim during the pass is treated as reachable, and so is
    /// everything it links to. The final decision is taken while new claims
    /// are held off, so a container never ends up linking to an object this
    /// pass destroyed.
    ///
    /// Passes are serialized; calling this twice in a row returns 0 the
    /// second time unless something changed in between.
    pub fn collect_garbage(&self) -> usize {
        let _pass = self.shared.collecting.lock();
        let objects = self.shared.registry.snapshot();
        for obj in &objects {
            obj.counts.clear_touched();
        }
        let known: HashSet<*const Object> = objects.iter().map(Arc::as_ptr).collect();
        let database = self.database_handle();

        // Objects registered since the first snapshot may link to ones
        // whose flags were just cleared, so they count as roots.
        let roots: Vec<Arc<Object>> = self
            .shared
            .registry
            .snapshot()
            .into_iter()
            .filter(|obj| {
                !known.contains(&Arc::as_ptr(obj))
                    || obj.external_count() > 0
                    || Some(obj.handle()) == database
            })
            .collect();
        let mut marked = HashSet::new();
        mark(roots, &mut marked);

        let mut candidates: Vec<Arc<Object>> = objects
            .into_iter()
            .filter(|obj| !marked.contains(&obj.handle()))
            .collect();
        let killed = loop {
            candidates.retain(|obj| obj.is_alive() && !marked.contains(&obj.handle()));
            let late: Vec<Arc<Object>> = candidates
                .iter()
                .filter(|obj| obj.counts.is_touched())
                .cloned()
                .collect();
            if !late.is_empty() {
                trace!("{} objects claimed during the pass", late.len());
                mark(late, &mut marked);
                continue;
            }

            let _gate = self.shared.claim_gate.write();
            if candidates.iter().any(|obj| obj.counts.is_touched()) {
                continue;
            }
            break candidates
                .iter()
                .filter(|obj| obj.counts.mark_dead())
                .count();
        };

        for obj in &candidates {
            self.shared.registry.remove(obj);
        }
        for obj in &candidates {
            dispose(obj.take_contents());
        }
        debug!(
            "collection pass: {} unreachable, {} destroyed",
            candidates.len(),
            killed
        );
        killed
    }
}

/// Iterative depth-first walk over container edges, adding to `marked`.
fn mark(roots: Vec<Arc<Object>>, marked: &mut HashSet<Handle>) {
    let mut stack = roots;
    while let Some(obj) = stack.pop() {
        if !marked.insert(obj.handle()) {
            continue;
        }
        stack.extend(
            obj.child_objects()
                .into_iter()
                .filter(|child| !marked.contains(&child.handle())),
        );
    }
}
