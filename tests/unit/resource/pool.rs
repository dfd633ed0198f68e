use std::cell::Cell;

use super::*;

#[derive(Default)]
struct HandleLog {
    valid: Cell<bool>,
    disposed: Cell<u32>,
    frozen: Cell<u32>,
}

struct MockHandle {
    label: &'static str,
    log: Rc<HandleLog>,
    refuse_freeze: bool,
}

impl MockHandle {
    fn new(label: &'static str, log: &Rc<HandleLog>) -> Self {
        log.valid.set(true);
        Self {
            label,
            log: log.clone(),
            refuse_freeze: false,
        }
    }
}

impl Poolable for MockHandle {
    fn freeze(&mut self) -> bool {
        self.log.frozen.set(self.log.frozen.get() + 1);
        !self.refuse_freeze && self.log.valid.get()
    }

    fn defrost(&mut self) -> bool {
        self.log.valid.get()
    }

    fn dispose(&mut self) {
        self.log.disposed.set(self.log.disposed.get() + 1);
    }
}

fn ok(label: &'static str, log: &Rc<HandleLog>) -> impl FnMut() -> EngineResult<MockHandle> {
    let mut h = Some(MockHandle::new(label, log));
    move || Ok(h.take().expect("factory runs at most once"))
}

#[test]
fn same_key_without_release_returns_same_resource() {
    let log = Rc::new(HandleLog::default());
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);

    let a = pool.get_or_create("GPU", ok("first", &log)).unwrap();
    let b = pool
        .get_or_create("GPU", || panic!("factory must not run for an active key"))
        .unwrap();
    assert!(a.same_resource(&b));
    assert_eq!(a.id(), b.id());
    assert_eq!(pool.state("GPU"), Some(ResourceState::Active));

    pool.release(a);
    assert_eq!(pool.state("GPU"), Some(ResourceState::Active));
    pool.release(b);
    assert_eq!(pool.state("GPU"), Some(ResourceState::Frozen));
    assert_eq!(log.frozen.get(), 1);
}

#[test]
fn release_then_defrost_reuses_resource() {
    let log = Rc::new(HandleLog::default());
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);

    let a = pool.get_or_create("2D", ok("first", &log)).unwrap();
    let first_id = a.id();
    pool.release(a);

    let b = pool
        .get_or_create("2D", || panic!("frozen resource should be reused"))
        .unwrap();
    assert_eq!(b.id(), first_id);
    assert_eq!(b.borrow().label, "first");
    let st = pool.stats();
    assert_eq!(st.created, 1);
    assert_eq!(st.reused, 1);
    pool.release(b);
}

#[test]
fn defrost_failure_recreates_transparently() {
    let old_log = Rc::new(HandleLog::default());
    let new_log = Rc::new(HandleLog::default());
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);

    let a = pool.get_or_create("GPU", ok("old", &old_log)).unwrap();
    let old_id = a.id();
    pool.release(a);

    // Platform revokes the handle while it sits idle.
    old_log.valid.set(false);

    let b = pool.get_or_create("GPU", ok("new", &new_log)).unwrap();
    assert_ne!(b.id(), old_id);
    assert_eq!(b.borrow().label, "new");
    assert_eq!(old_log.disposed.get(), 1);
    assert_eq!(pool.state_of(old_id), Some(ResourceState::Disposed));
    assert_eq!(pool.stats().defrost_failures, 1);
    pool.release(b);
}

#[test]
fn defrost_failure_with_failing_retry_surfaces_context_invalidated() {
    let log = Rc::new(HandleLog::default());
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);
    let a = pool.get_or_create("GPU", ok("old", &log)).unwrap();
    pool.release(a);
    log.valid.set(false);

    let err = pool
        .get_or_create("GPU", || Err(EngineError::exhausted("no contexts left")))
        .unwrap_err();
    assert!(matches!(err, EngineError::ContextInvalidated(_)));
    assert!(pool.is_empty());
}

#[test]
fn factory_failure_is_surfaced_as_is() {
    let mut pool: ResourcePool<MockHandle> =
        ResourcePool::new("test", RetentionPolicy::KeepMaximum);
    let err = pool
        .get_or_create("GPU", || Err(EngineError::exhausted("ceiling reached")))
        .unwrap_err();
    assert!(matches!(err, EngineError::ResourceExhausted(_)));
    assert_eq!(pool.stats().created, 0);
}

#[test]
fn freeze_failure_disposes_instead_of_recycling() {
    let log = Rc::new(HandleLog::default());
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);
    let mut handle = MockHandle::new("brittle", &log);
    handle.refuse_freeze = true;

    let mut handle = Some(handle);
    let a = pool
        .get_or_create("GPU", move || Ok(handle.take().unwrap()))
        .unwrap();
    pool.release(a);
    assert_eq!(pool.state("GPU"), None);
    assert_eq!(log.disposed.get(), 1);
    assert_eq!(pool.stats().freeze_failures, 1);
}

#[test]
fn bounded_lru_never_retains_more_than_capacity() {
    let logs: Vec<Rc<HandleLog>> = (0..5).map(|_| Rc::new(HandleLog::default())).collect();
    let keys = ["k0", "k1", "k2", "k3", "k4"];
    let mut pool = ResourcePool::new("test", RetentionPolicy::BoundedLru { capacity: 3 });

    for (key, log) in keys.iter().zip(&logs) {
        let lease = pool.get_or_create(key, ok("x", log)).unwrap();
        pool.release(lease);
        assert!(pool.stats().idle <= 3);
    }

    assert_eq!(pool.len(), 3);
    assert_eq!(logs[0].disposed.get(), 1);
    assert_eq!(logs[1].disposed.get(), 1);
    assert_eq!(pool.lru_keys(), vec!["k2", "k3", "k4"]);
    assert_eq!(pool.stats().evicted, 2);
}

#[test]
fn bounded_lru_evicts_least_recently_used_after_touch() {
    let logs: Vec<Rc<HandleLog>> = (0..3).map(|_| Rc::new(HandleLog::default())).collect();
    let mut pool = ResourcePool::new("test", RetentionPolicy::BoundedLru { capacity: 2 });

    let a = pool.get_or_create("a", ok("a", &logs[0])).unwrap();
    pool.release(a);
    let b = pool.get_or_create("b", ok("b", &logs[1])).unwrap();
    pool.release(b);

    // Touch "a" so "b" becomes least recently used.
    let a = pool.get_or_create("a", || panic!("a is pooled")).unwrap();
    pool.release(a);

    let c = pool.get_or_create("c", ok("c", &logs[2])).unwrap();
    pool.release(c);

    assert_eq!(logs[1].disposed.get(), 1);
    assert_eq!(logs[0].disposed.get(), 0);
    assert_eq!(pool.state("b"), None);
    assert_eq!(pool.lru_keys(), vec!["a", "c"]);
}

#[test]
fn bounded_lru_never_evicts_active_resources() {
    let logs: Vec<Rc<HandleLog>> = (0..2).map(|_| Rc::new(HandleLog::default())).collect();
    let mut pool = ResourcePool::new("test", RetentionPolicy::BoundedLru { capacity: 1 });

    let a = pool.get_or_create("a", ok("a", &logs[0])).unwrap();
    let b = pool.get_or_create("b", ok("b", &logs[1])).unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(logs[0].disposed.get(), 0);

    pool.release(a);
    assert_eq!(pool.len(), 1);
    assert_eq!(logs[0].disposed.get(), 1);
    pool.release(b);
    assert_eq!(pool.state("b"), Some(ResourceState::Frozen));
}

#[test]
fn discard_makes_outstanding_leases_stale() {
    let log = Rc::new(HandleLog::default());
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);
    let a = pool.get_or_create("GPU", ok("a", &log)).unwrap();
    let b = pool.get_or_create("GPU", || panic!("active")).unwrap();

    pool.discard(a);
    assert_eq!(log.disposed.get(), 1);
    pool.release(b);
    assert_eq!(log.disposed.get(), 1);
    assert!(pool.is_empty());
}

#[test]
fn clear_only_disposes_idle_resources() {
    let logs: Vec<Rc<HandleLog>> = (0..2).map(|_| Rc::new(HandleLog::default())).collect();
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);
    let idle = pool.get_or_create("idle", ok("i", &logs[0])).unwrap();
    pool.release(idle);
    let busy = pool.get_or_create("busy", ok("b", &logs[1])).unwrap();

    pool.clear();
    assert_eq!(logs[0].disposed.get(), 1);
    assert_eq!(logs[1].disposed.get(), 0);
    assert_eq!(pool.len(), 1);
    pool.release(busy);

    drop(pool);
    assert_eq!(logs[1].disposed.get(), 1);
}

#[test]
fn only_idle_resources_are_tracked_for_recycling() {
    let logs: Vec<Rc<HandleLog>> = (0..2).map(|_| Rc::new(HandleLog::default())).collect();
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);

    let a = pool.get_or_create("a", ok("a", &logs[0])).unwrap();
    let b = pool.get_or_create("b", ok("b", &logs[1])).unwrap();
    assert!(pool.lru_keys().is_empty());

    pool.release(b);
    pool.release(a);
    assert_eq!(pool.lru_keys(), vec!["b", "a"]);

    let b = pool.get_or_create("b", || panic!("b is pooled")).unwrap();
    assert_eq!(pool.lru_keys(), vec!["a"]);
    pool.release(b);
    assert_eq!(pool.lru_keys(), vec!["a", "b"]);
}

/// Factory allowing at most two undisposed handles at once, like a platform context ceiling.
fn capped_factory<'a>(
    logs: &'a [Rc<HandleLog>],
    label: &'static str,
    i: usize,
) -> impl FnMut() -> EngineResult<MockHandle> + 'a {
    move || {
        let live = logs
            .iter()
            .filter(|p| p.valid.get() && p.disposed.get() == 0)
            .count();
        if live >= 2 {
            return Err(EngineError::exhausted("ceiling reached"));
        }
        Ok(MockHandle::new(label, &logs[i]))
    }
}

#[test]
fn exhausted_factory_recycles_least_recently_used_idle_resource() {
    let logs: Vec<Rc<HandleLog>> = (0..4).map(|_| Rc::new(HandleLog::default())).collect();
    let mut pool = ResourcePool::new("test", RetentionPolicy::KeepMaximum);

    let a = pool.get_or_create("a", capped_factory(&logs, "a", 0)).unwrap();
    pool.release(a);
    let b = pool.get_or_create("b", capped_factory(&logs, "b", 1)).unwrap();
    pool.release(b);

    let c = pool.get_or_create("c", capped_factory(&logs, "c", 2)).unwrap();
    assert_eq!(c.borrow().label, "c");
    assert_eq!(logs[0].disposed.get(), 1);
    assert_eq!(logs[1].disposed.get(), 0);
    assert_eq!(pool.state("a"), None);
    assert_eq!(pool.stats().evicted, 1);

    let d = pool.get_or_create("d", capped_factory(&logs, "d", 3)).unwrap();
    assert_eq!(logs[1].disposed.get(), 1);

    // Both live handles are leased; nothing is left to recycle.
    let err = pool.get_or_create("e", capped_factory(&logs, "e", 0)).err();
    assert!(matches!(err, Some(EngineError::ResourceExhausted(_))));
    assert_eq!(pool.len(), 2);
    pool.release(c);
    pool.release(d);
}
