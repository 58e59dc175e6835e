//! Object lifetime: retain/release, the autorelease queue and teardown
//!
//! An object dies the moment both of its counts reach zero, or when the
//! collector finds it unreachable. Destruction only empties the object and
//! unregisters it; the memory goes away with the last `Arc`.
//!
//! Tearing down a long chain of containers would recurse once per link if
//! every dropped edge destroyed its target in place. Instead, contents of a
//! dying object are parked on a per-thread worklist and the outermost
//! `dispose` call drains it in a loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::object::{Contents, Key, Object, Release};
use crate::runtime::Runtime;
use crate::value::ObjRef;

/// Key in the database root under which named pools live
pub(crate) const POOLS_KEY: &str = "__tempPools";

// ═══════════════════════════════════════════════════════════════════
// Teardown
// ═══════════════════════════════════════════════════════════════════

thread_local! {
    static DOOMED: RefCell<Option<Vec<Contents>>> = const { RefCell::new(None) };
}

/// Drop the contents of a dead object without recursing into the objects
/// they point at.
pub(crate) fn dispose(contents: Contents) {
    let first = DOOMED.with(|doomed| match doomed.borrow_mut().as_mut() {
        Some(list) => {
            list.push(contents);
            None
        }
        None => Some(contents),
    });
    let Some(first) = first else {
        return;
    };

    DOOMED.with(|doomed| *doomed.borrow_mut() = Some(Vec::new()));
    let mut current = Some(first);
    while let Some(contents) = current {
        // Dropping may destroy more objects, which park their contents here
        drop(contents);
        current = DOOMED.with(|doomed| doomed.borrow_mut().as_mut().and_then(Vec::pop));
    }
    DOOMED.with(|doomed| *doomed.borrow_mut() = None);
}

/// Kill a batch of already-unregistered objects. Every object is marked dead
/// before any contents are dropped, so edges between them never trigger a
/// second destruction. Returns how many were still alive.
pub(crate) fn teardown(objects: Vec<Arc<Object>>) -> usize {
    let killed = objects.iter().filter(|obj| obj.counts.mark_dead()).count();
    for obj in &objects {
        dispose(obj.take_contents());
    }
    killed
}

impl Object {
    pub(crate) fn retain_internal(&self) -> bool {
        let shared = self.runtime.upgrade();
        let _gate = shared.as_ref().map(|shared| shared.claim_gate.read());
        self.counts.retain_internal()
    }

    pub(crate) fn release_internal(&self) {
        if self.counts.release_internal() == Release::Unclaimed {
            self.destroy();
        }
    }

    pub(crate) fn retain(&self) -> bool {
        let ok = {
            let shared = self.runtime.upgrade();
            let _gate = shared.as_ref().map(|shared| shared.claim_gate.read());
            self.counts.retain_external()
        };
        trace!("retain #{} -> {}", self.handle(), self.external_count());
        ok
    }

    pub(crate) fn release(&self) {
        let outcome = self.counts.release_external();
        trace!("release #{} -> {:?}", self.handle(), outcome);
        if outcome == Release::Unclaimed {
            self.destroy();
        }
    }

    /// Called exactly once, by whoever made the counts hit zero.
    fn destroy(&self) {
        debug!("destroying {:?} #{}", self.kind(), self.handle());
        if let Some(shared) = self.runtime.upgrade() {
            shared.registry.remove(self);
        }
        dispose(self.take_contents());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Autorelease queue
// ═══════════════════════════════════════════════════════════════════

/// What happens when a queue entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClaimKind {
    /// The claim a new object is born with; expiry just drops it
    Grace,
    /// A deferred `release`: expiry releases one script retain, then drops the claim
    Release,
}

struct Pending {
    due: Instant,
    claim: ObjRef,
    kind: ClaimKind,
}

impl Pending {
    fn expire(self) {
        if self.kind == ClaimKind::Release {
            if let Some(obj) = self.claim.upgrade() {
                obj.release();
            }
        }
        trace!("autorelease expired for #{}", self.claim.handle());
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    stopped: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    wake: Condvar,
}

/// Timer-driven queue of internal claims, drained by one worker thread.
///
/// The queue lock is never held while an object is locked or destroyed.
pub(crate) struct AutoreleaseQueue {
    inner: Arc<QueueInner>,
    delay: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AutoreleaseQueue {
    pub(crate) fn start(delay: Duration) -> Self {
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
        });
        let spawned = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("quickbeam-autorelease".into())
                .spawn(move || run(&inner))
        };
        let worker = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("autorelease worker failed to start: {}", err);
                None
            }
        };
        Self {
            inner,
            delay,
            worker: Mutex::new(worker),
        }
    }

    /// Take a claim on `obj` that expires after the configured delay.
    pub(crate) fn enqueue(&self, obj: &Arc<Object>, kind: ClaimKind) -> bool {
        let Some(claim) = ObjRef::try_claim(obj) else {
            return false;
        };
        let entry = Pending {
            due: Instant::now() + self.delay,
            claim,
            kind,
        };
        let rejected = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                Some(entry)
            } else {
                state.pending.push_back(entry);
                None
            }
        };
        if rejected.is_some() {
            return false;
        }
        self.inner.wake.notify_one();
        true
    }

    /// Drop every grace claim on `obj` now instead of at expiry.
    pub(crate) fn cancel_grace(&self, obj: &Object) -> usize {
        let cancelled: Vec<Pending> = {
            let mut state = self.inner.state.lock();
            let all = std::mem::take(&mut state.pending);
            let (cancelled, kept): (Vec<Pending>, Vec<Pending>) = all
                .into_iter()
                .partition(|p| p.kind == ClaimKind::Grace && p.claim.points_to(obj));
            state.pending = kept.into();
            cancelled
        };
        cancelled.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Drop every pending claim without waiting for expiry.
    pub(crate) fn clear(&self) {
        let pending = std::mem::take(&mut self.inner.state.lock().pending);
        drop(pending);
    }

    /// Stop the worker and drop what is still pending.
    ///
    /// Safe to call from the worker itself, in which case it is not joined.
    pub(crate) fn shutdown(&self) {
        self.inner.state.lock().stopped = true;
        self.inner.wake.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("autorelease worker panicked");
            }
        }
        self.clear();
    }
}

fn run(inner: &QueueInner) {
    let mut state = inner.state.lock();
    while !state.stopped {
        match state.pending.front().map(|p| p.due) {
            Some(due) if due <= Instant::now() => {
                if let Some(entry) = state.pending.pop_front() {
                    MutexGuard::unlocked(&mut state, || entry.expire());
                }
            }
            Some(due) => {
                inner.wake.wait_until(&mut state, due);
            }
            None => inner.wake.wait(&mut state),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Script-facing lifetime operations
// ═══════════════════════════════════════════════════════════════════

impl Runtime {
    /// Add a script retain and, if given, record `tag` as the owner.
    pub fn retain(&self, obj: &Arc<Object>, tag: Option<&str>) -> Arc<Object> {
        obj.retain();
        if tag.is_some() {
            obj.set_tag(tag);
        }
        Arc::clone(obj)
    }

    /// Drop a script retain. Extra releases are ignored.
    ///
    /// Always returns `None`, so a caller can release and forget in one step:
    /// `slot = rt.release(&obj);`
    pub fn release(&self, obj: &Arc<Object>) -> Option<Arc<Object>> {
        obj.release();
        None
    }

    /// Release `obj` once, after the autorelease delay.
    pub fn autorelease(&self, obj: &Arc<Object>) -> Arc<Object> {
        self.shared.queue.enqueue(obj, ClaimKind::Release);
        Arc::clone(obj)
    }

    /// Release `previous`, then retain and return `new`. Nothing happens when
    /// both are the same object.
    pub fn release_and_retain(
        &self,
        previous: Option<&Arc<Object>>,
        new: Option<&Arc<Object>>,
        tag: Option<&str>,
    ) -> Option<Arc<Object>> {
        let same = match (previous, new) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            if let Some(previous) = previous {
                previous.release();
            }
            if let Some(new) = new {
                self.retain(new, tag);
            }
        }
        new.cloned()
    }

    /// Release every object tagged `tag` as many times as it was retained.
    /// Returns the number of tagged objects found.
    pub fn release_objects_with_tag(&self, tag: &str) -> usize {
        if tag.is_empty() {
            return 0;
        }
        let tagged = self.objects_matching(|obj| obj.has_tag(tag));
        for obj in &tagged {
            while obj.is_alive() && obj.external_count() != 0 {
                obj.release();
            }
        }
        debug!("released {} objects tagged {:?}", tagged.len(), tag);
        tagged.len()
    }

    /// Give up the claim `obj` was born with right away instead of at expiry.
    ///
    /// Has no visible effect while the object is retained or referenced.
    pub fn zero_lifetime(&self, obj: &Arc<Object>) -> Arc<Object> {
        self.shared.queue.cancel_grace(obj);
        Arc::clone(obj)
    }

    /// Keep `obj` alive in the named pool until [`Runtime::clean_pool`].
    ///
    /// Pools are arrays stored at `.__tempPools.<pool>` in the database root.
    pub fn add_to_pool(&self, obj: &Arc<Object>, pool: &str) -> bool {
        let db = self.database();
        let members = db
            .child_or_insert(Key::Str(POOLS_KEY), || Some(self.new_map()))
            .and_then(|pools| pools.child_or_insert(Key::Str(pool), || Some(self.new_array())))
            .filter(|members| members.is_array());
        match members {
            Some(members) => members.push(obj),
            None => {
                warn!("pool {:?} is occupied by a non-array value", pool);
                false
            }
        }
    }

    /// Drop a named pool and everything only it kept alive.
    pub fn clean_pool(&self, pool: &str) {
        if let Some(pools) = self.database().get_obj(POOLS_KEY) {
            pools.remove(pool);
        }
    }

    /// Number of claims waiting in the autorelease queue
    pub fn pending_autoreleases(&self) -> usize {
        self.shared.queue.len()
    }
}
