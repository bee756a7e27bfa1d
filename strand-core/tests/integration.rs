//! Integration Tests for the Reactive Engine
//!
//! These tests drive signals, memos, effects, schedulers and scopes through
//! the public API only.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use strand_core::{
    watch, DriverKind, Effect, EffectOptions, NodeKind, PullErrorPolicy, ReactiveError,
    ReactiveMap, ReactiveVec, Runtime, RuntimeConfig, SchedulerKey,
};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn bump(calls: &Cell<usize>) {
    calls.set(calls.get() + 1);
}

/// A reader never sees a mix of old and new ancestor values, and every
/// derived node runs at most once per write.
#[test]
fn writes_are_glitch_free() {
    let rt = Runtime::new();
    let a = rt.signal(1);

    let b_calls = counter();
    let b = {
        let (a, calls) = (a.clone(), b_calls.clone());
        rt.memo(move || {
            bump(&calls);
            a.get() * 2
        })
    };
    let c = {
        let (a, b) = (a.clone(), b.clone());
        rt.memo(move || a.get() + b.get())
    };

    let observed = Rc::new(RefCell::new(Vec::new()));
    let _effect = {
        let (a, b, c, observed) = (a.clone(), b.clone(), c.clone(), observed.clone());
        rt.effect(move || observed.borrow_mut().push((a.get(), b.get(), c.get())))
    };

    a.set(2);
    a.set(3);

    assert_eq!(*observed.borrow(), vec![(1, 2, 3), (2, 4, 6), (3, 6, 9)]);
    assert_eq!(b_calls.get(), 3);
}

/// A recomputation that produces the same value does not wake dependents.
#[test]
fn equal_recomputation_stops_propagation() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let parity = {
        let a = a.clone();
        rt.memo(move || a.get() % 2)
    };
    let calls = counter();
    let c = {
        let (parity, calls) = (parity.clone(), calls.clone());
        rt.memo(move || {
            bump(&calls);
            parity.get()
        })
    };

    assert_eq!(c.get(), 1);
    assert_eq!(calls.get(), 1);

    a.set(3);
    assert_eq!(c.get(), 1);
    assert_eq!(calls.get(), 1);

    a.set(4);
    assert_eq!(c.get(), 0);
    assert_eq!(calls.get(), 2);
}

/// A branch that is no longer read drops its edge.
#[test]
fn unread_branch_is_pruned() {
    let rt = Runtime::new();
    let flag = rt.signal(true);
    let x = rt.signal(1);
    let y = rt.signal(2);

    let calls = counter();
    let c = {
        let (flag, x, y, calls) = (flag.clone(), x.clone(), y.clone(), calls.clone());
        rt.memo(move || {
            bump(&calls);
            if flag.get() {
                x.get()
            } else {
                y.get()
            }
        })
    };

    assert_eq!(c.get(), 1);
    flag.set(false);
    assert_eq!(c.get(), 2);
    assert_eq!(calls.get(), 2);
    assert!(x.dependents().is_empty());
    assert_eq!(c.dependencies(), vec![flag.id(), y.id()]);

    x.set(99);
    assert_eq!(c.get(), 2);
    assert_eq!(calls.get(), 2);
}

/// Two paths from one source to one sink: the sink sees both new values
/// and each middle node runs exactly once.
#[test]
fn diamond_recomputes_each_node_once() {
    let rt = Runtime::new();
    let a = rt.signal(1);

    let (b_calls, d_calls, e_calls) = (counter(), counter(), counter());
    let b = {
        let (a, calls) = (a.clone(), b_calls.clone());
        rt.memo(move || {
            bump(&calls);
            a.get() + 1
        })
    };
    let d = {
        let (a, calls) = (a.clone(), d_calls.clone());
        rt.memo(move || {
            bump(&calls);
            a.get() + 2
        })
    };
    let e = {
        let (b, d, calls) = (b.clone(), d.clone(), e_calls.clone());
        rt.memo(move || {
            bump(&calls);
            b.get() + d.get()
        })
    };

    assert_eq!(e.get(), 5);
    a.set(5);
    assert_eq!(e.get(), 13);
    assert_eq!((b_calls.get(), d_calls.get(), e_calls.get()), (2, 2, 2));
}

/// Several writes in one turn flush a deferred effect once, with the final
/// value.
#[test]
fn deferred_effect_coalesces_writes() {
    let rt = Runtime::new();
    let count = rt.signal(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = {
        let (count, seen) = (count.clone(), seen.clone());
        Effect::with_options(
            &rt,
            EffectOptions {
                scheduler: SchedulerKey::MICRO,
            },
            move || seen.borrow_mut().push(count.get()),
        )
    };
    assert_eq!(*seen.borrow(), vec![0]);

    for n in 1..=5 {
        count.set(n);
    }
    assert_eq!(*seen.borrow(), vec![0]);

    assert_eq!(rt.event_loop().run_microtasks(), 1);
    assert_eq!(*seen.borrow(), vec![0, 5]);
    assert_eq!(effect.run_count(), 2);
    assert!(rt.event_loop().is_idle());
}

/// Layout effects wait for a frame; macro effects for a macrotask.
#[test]
fn deferred_schedulers_use_their_time_domain() {
    let rt = Runtime::new();
    let count = rt.signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    for (name, key) in [("layout", SchedulerKey::LAYOUT), ("macro", SchedulerKey::MACRO)] {
        let (count, log) = (count.clone(), log.clone());
        Effect::with_options(&rt, EffectOptions { scheduler: key }, move || {
            let value = count.get();
            if value > 0 {
                log.borrow_mut().push(name);
            }
        });
    }

    count.set(1);
    assert!(log.borrow().is_empty());

    assert!(rt.event_loop().run_macrotask());
    assert_eq!(*log.borrow(), vec!["macro"]);
    assert_eq!(rt.event_loop().run_frame(), 1);
    assert_eq!(*log.borrow(), vec!["macro", "layout"]);
}

/// An effect disposed between a write and the deferred flush never runs
/// for that write, whether disposed directly or through its scope.
#[test]
fn disposal_before_flush_cancels_the_run() {
    let rt = Runtime::new();
    let count = rt.signal(0);
    let scope = rt.create_scope();

    let make = |seen: Rc<RefCell<Vec<i32>>>| {
        let count = count.clone();
        Effect::with_options(
            &rt,
            EffectOptions {
                scheduler: SchedulerKey::MACRO,
            },
            move || seen.borrow_mut().push(count.get()),
        )
    };
    let direct_seen = Rc::new(RefCell::new(Vec::new()));
    let direct = make(direct_seen.clone());
    let scoped_seen = Rc::new(RefCell::new(Vec::new()));
    let scoped = scope.run(|| make(scoped_seen.clone()));

    count.set(1);
    assert_eq!(rt.event_loop().pending(), 1);
    direct.dispose();
    assert_eq!(scope.release(), 1);

    rt.event_loop().run_until_idle();
    assert_eq!(direct.run_count(), 1);
    assert_eq!(scoped.run_count(), 1);
    assert_eq!(*direct_seen.borrow(), vec![0]);
    assert_eq!(*scoped_seen.borrow(), vec![0]);
    assert!(scoped.is_disposed());
    assert!(count.dependents().is_empty());
}

/// Reruns of an outer effect dispose the inner effects the previous run
/// created, leaving no edges into them.
#[test]
fn rerun_disposes_inner_effects() {
    let rt = Runtime::new();
    let toggle = rt.signal(0);
    let leaf = rt.signal(0);
    let inner_runs = counter();
    let inners = Rc::new(RefCell::new(Vec::<Effect>::new()));

    let outer = {
        let (rt2, toggle, leaf) = (rt.clone(), toggle.clone(), leaf.clone());
        let (inner_runs, inners) = (inner_runs.clone(), inners.clone());
        rt.effect(move || {
            toggle.get();
            let (leaf, runs) = (leaf.clone(), inner_runs.clone());
            let inner = rt2.effect(move || {
                leaf.get();
                bump(&runs);
            });
            inners.borrow_mut().push(inner);
        })
    };

    toggle.set(1);
    toggle.set(2);

    let inners = inners.borrow();
    assert_eq!(inners.len(), 3);
    assert!(inners[..2].iter().all(Effect::is_disposed));
    assert_eq!(leaf.dependents(), vec![inners[2].id()]);

    inner_runs.set(0);
    leaf.set(1);
    assert_eq!(inner_runs.get(), 1);

    outer.dispose();
    assert!(inners[2].is_disposed());
    assert!(leaf.dependents().is_empty());
    assert_eq!(rt.edge_count(), 0);
}

/// Writing the value a signal already holds is invisible.
#[test]
fn no_op_write_changes_nothing() {
    let rt = Runtime::new();
    let count = rt.signal(7);
    let effect = {
        let count = count.clone();
        Effect::with_options(
            &rt,
            EffectOptions {
                scheduler: SchedulerKey::MICRO,
            },
            move || {
                count.get();
            },
        )
    };
    let version = rt.version();

    count.set(7);
    assert_eq!(rt.version(), version);
    assert!(rt.event_loop().is_idle());
    assert_eq!(rt.event_loop().run_until_idle(), 0);
    assert_eq!(effect.run_count(), 1);
}

/// A batch turns many writes into one flush per effect.
#[test]
fn batch_flushes_once() {
    let rt = Runtime::new();
    let first = rt.signal("Ada");
    let last = rt.signal("Lovelace");
    let names = Rc::new(RefCell::new(Vec::new()));

    let _effect = {
        let (first, last, names) = (first.clone(), last.clone(), names.clone());
        rt.effect(move || names.borrow_mut().push(format!("{} {}", first.get(), last.get())))
    };

    rt.batch(|| {
        first.set("Grace");
        last.set("Hopper");
    });
    assert_eq!(*names.borrow(), vec!["Ada Lovelace", "Grace Hopper"]);
}

/// Watchers report old and new values for every dependency.
#[test]
fn watch_reports_diffs() {
    let rt = Runtime::new();
    let x = rt.signal(1);
    let y = rt.signal(10);
    let log = Rc::new(RefCell::new(Vec::new()));

    let handle = {
        let (x2, y2, log) = (x.clone(), y.clone(), log.clone());
        let deps: Vec<Box<dyn Fn() -> i32>> = vec![Box::new(move || x2.get()), Box::new(move || y2.get())];
        watch(&rt, deps, move |diffs| {
            let pairs: Vec<_> = diffs.iter().map(|d| (d.old, d.new)).collect();
            log.borrow_mut().push(pairs);
        })
    };
    assert!(log.borrow().is_empty());

    x.set(2);
    assert_eq!(*log.borrow(), vec![vec![(Some(1), 2), (Some(10), 10)]]);

    handle.dispose();
    y.set(11);
    assert_eq!(log.borrow().len(), 1);
}

/// A failing memo keeps its last value by default and can surface the
/// failure instead.
#[test]
fn failed_pull_follows_policy() {
    for policy in [PullErrorPolicy::KeepStale, PullErrorPolicy::Surface] {
        let rt = Runtime::with_config(RuntimeConfig {
            pull_errors: policy,
            ..RuntimeConfig::default()
        });
        let input = rt.signal(4);
        let root = {
            let input = input.clone();
            strand_core::Memo::try_new(&rt, move || {
                let n = input.get();
                if n < 0 {
                    return Err(format!("negative input {n}").into());
                }
                Ok((n as f64).sqrt())
            })
        };
        assert_eq!(root.try_get().unwrap(), 2.0);

        input.set(-1);
        match policy {
            PullErrorPolicy::KeepStale => assert_eq!(root.try_get().unwrap(), 2.0),
            PullErrorPolicy::Surface => assert!(matches!(
                root.try_get(),
                Err(ReactiveError::PullFailed { message, .. }) if message.contains("negative")
            )),
        }

        input.set(9);
        assert_eq!(root.try_get().unwrap(), 3.0);
    }
}

/// Releasing a scope disposes everything created inside it.
#[test]
fn scope_release_cascades() {
    let rt = Runtime::new();
    let source = rt.signal(1);
    let scope = rt.create_scope();

    let (memo, effect) = scope.run(|| {
        let memo = {
            let source = source.clone();
            rt.memo(move || source.get() + 1)
        };
        let effect = {
            let memo = memo.clone();
            rt.effect(move || {
                memo.get();
            })
        };
        (memo, effect)
    });
    assert_eq!(source.dependents(), vec![memo.id()]);

    assert_eq!(scope.release(), 2);
    assert!(memo.is_disposed());
    assert!(effect.is_disposed());
    assert!(source.dependents().is_empty());
    assert_eq!(rt.node_count(), 1);
}

/// Collection entries are reactive one by one.
#[test]
fn collections_track_entries() {
    let rt = Runtime::new();
    let todos = ReactiveVec::new(&rt, vec!["write", "test"]);
    let owners: ReactiveMap<&str, &str> = ReactiveMap::new(&rt);

    let summary = {
        let (todos, owners) = (todos.clone(), owners.clone());
        rt.memo(move || {
            let first = todos.get(0).unwrap_or("-");
            let owner = owners.get(&first).unwrap_or("nobody");
            format!("{first}: {owner}")
        })
    };
    assert_eq!(summary.get(), "write: nobody");

    owners.insert("write", "ada");
    assert_eq!(summary.get(), "write: ada");

    todos.remove(0).unwrap();
    assert_eq!(summary.get(), "test: nobody");
    assert_eq!(todos.raw(), vec!["test"]);
}

/// The snapshot describes nodes, edges and the global version as JSON.
#[test]
fn snapshot_exports_json() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let double = {
        let a = a.clone();
        rt.memo(move || a.get() * 2)
    };
    assert_eq!(double.get(), 2);
    a.set(2);

    let snapshot = rt.snapshot();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.edge_count, 1);
    let node = snapshot.node(double.id()).unwrap();
    assert_eq!(node.kind, NodeKind::Derived);
    assert_eq!(node.dependencies, vec![a.id()]);
    assert_eq!(node.dirty, vec!["dirty"]);

    let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
    assert_eq!(json["nodes"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["nodes"][1]["kind"], "derived");
}

/// With the tokio driver, deferred flushes run on the current `LocalSet`.
#[tokio::test]
async fn tokio_driver_flushes_on_local_set() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let rt = Runtime::with_config(RuntimeConfig {
                driver: DriverKind::Tokio,
                frame_interval_ms: 1,
                ..RuntimeConfig::default()
            });
            let count = rt.signal(0);
            let seen = Rc::new(RefCell::new(Vec::new()));

            let _effect = {
                let (count, seen) = (count.clone(), seen.clone());
                Effect::with_options(
                    &rt,
                    EffectOptions {
                        scheduler: SchedulerKey::MICRO,
                    },
                    move || seen.borrow_mut().push(count.get()),
                )
            };

            count.set(1);
            count.set(2);
            assert_eq!(*seen.borrow(), vec![0]);

            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(*seen.borrow(), vec![0, 2]);
            assert!(rt.event_loop().is_idle());
        })
        .await;
}
