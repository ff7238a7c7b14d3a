use crate::config::{
    BoundManagedObjectConfig, EscalationConfig, FloorConfig, FunctionConfig,
    ManagedObjectSourceConfig, TeamConfig, WorkConfig,
};
use crate::error::FloorError;
use crate::floor::{EscalationHandler, Floor};
use crate::source::managed_object::{
    AsynchronousListener, AsynchronousManagedObject, ManagedObject, ManagedObjectPool,
    ManagedObjectSource, ManagedObjectSourceMetaData, ManagedObjectUser,
};
use crate::source::team::{Job, Team, TeamSource, TeamSourceContext};
use crate::teams::{FixedTeamSource, PassiveTeamSource};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn passive_floor() -> FloorConfig {
    let mut config = FloorConfig::new("office");
    config.add_team(TeamConfig::new("main", Arc::new(PassiveTeamSource)));
    config
}

struct ValueObject(Arc<AtomicUsize>);

impl ManagedObject for ValueObject {
    fn object(&self) -> Arc<dyn Any + Send + Sync> {
        self.0.clone()
    }
}

struct CountingSource {
    instantiated: Arc<AtomicUsize>,
}

impl ManagedObjectSource for CountingSource {
    fn meta_data(&self) -> ManagedObjectSourceMetaData {
        ManagedObjectSourceMetaData::default()
    }

    fn source_managed_object(&self, user: ManagedObjectUser) {
        self.instantiated.fetch_add(1, Ordering::SeqCst);
        user.set_managed_object(Box::new(ValueObject(Arc::new(AtomicUsize::new(7)))));
    }
}

#[test]
fn invoke_work_runs_initial_function_to_completion() {
    let ran = Arc::new(AtomicUsize::new(0));
    let mut config = passive_floor();
    let ran2 = ran.clone();
    config.add_work(WorkConfig::new("job").with_function(FunctionConfig::from_fn(
        "run",
        move |_ctx| {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )));

    let floor = Floor::open(&config).unwrap();
    let handle = floor.invoke_work("job", None).unwrap();
    handle.wait().unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    floor.close();
}

#[test]
fn unknown_work_is_an_error() {
    let mut config = passive_floor();
    config.add_work(WorkConfig::new("job").with_function(FunctionConfig::from_fn(
        "run",
        |_ctx| Ok(()),
    )));
    let floor = Floor::open(&config).unwrap();

    match floor.invoke_work("nope", None) {
        Err(FloorError::UnknownWork(name)) => assert_eq!(name, "nope"),
        other => panic!("expected UnknownWork, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn argument_reaches_the_initial_function() {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut config = passive_floor();
    let seen2 = seen.clone();
    config.add_work(WorkConfig::new("job").with_function(FunctionConfig::from_fn(
        "run",
        move |ctx| {
            let value = *ctx.argument_as::<usize>().unwrap_or(&0);
            seen2.store(value, Ordering::SeqCst);
            Ok(())
        },
    )));

    let floor = Floor::open(&config).unwrap();
    floor
        .invoke_work("job", Some(Box::new(41usize)))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 41);
}

#[test]
fn next_continuation_runs_after_the_body() {
    let order = log();
    let mut config = passive_floor();
    let o1 = order.clone();
    let o2 = order.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(
                FunctionConfig::from_fn("first", move |_ctx| {
                    o1.lock().push("first".to_string());
                    Ok(())
                })
                .then("second"),
            )
            .with_function(FunctionConfig::from_fn("second", move |_ctx| {
                o2.lock().push("second".to_string());
                Ok(())
            })),
    );

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[test]
fn sequential_flow_completes_before_invoker_continues() {
    let order = log();
    let mut config = passive_floor();
    let o1 = order.clone();
    let o2 = order.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(
                FunctionConfig::from_fn("caller", move |ctx| {
                    ctx.do_flow(0, None)?;
                    o1.lock().push("after-flow".to_string());
                    Ok(())
                })
                .with_sequential_flow("callee"),
            )
            .with_function(FunctionConfig::from_fn("callee", move |_ctx| {
                o2.lock().push("in-flow".to_string());
                Ok(())
            })),
    );

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(*order.lock(), vec!["in-flow", "after-flow"]);
}

#[test]
fn sequential_flow_across_teams_blocks_the_invoker() {
    let order = log();
    let flow_thread = Arc::new(Mutex::new(None::<String>));
    let mut config = FloorConfig::new("office");
    config.add_team(TeamConfig::new("a", Arc::new(PassiveTeamSource)));
    config.add_team(TeamConfig::new("b", Arc::new(FixedTeamSource)).with_size(1));

    let o1 = order.clone();
    let o2 = order.clone();
    let ft = flow_thread.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(
                FunctionConfig::from_fn("caller", move |ctx| {
                    ctx.do_flow(0, None)?;
                    o1.lock().push("after-flow".to_string());
                    Ok(())
                })
                .on_team("a")
                .with_sequential_flow("callee"),
            )
            .with_function(
                FunctionConfig::from_fn("callee", move |_ctx| {
                    o2.lock().push("in-flow".to_string());
                    *ft.lock() = std::thread::current().name().map(str::to_string);
                    Ok(())
                })
                .on_team("b"),
            ),
    );

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(*order.lock(), vec!["in-flow", "after-flow"]);
    let name = flow_thread.lock().clone().unwrap_or_default();
    assert!(name.starts_with("b-worker"), "flow ran on {}", name);
    floor.close();
}

#[test]
fn parallel_flow_runs_on_the_target_teams_worker() {
    let flow_thread = Arc::new(Mutex::new(None::<String>));
    let mut config = FloorConfig::new("office");
    config.add_team(TeamConfig::new("a", Arc::new(PassiveTeamSource)));
    config.add_team(TeamConfig::new("b", Arc::new(FixedTeamSource)).with_size(1));

    let ft = flow_thread.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(
                FunctionConfig::from_fn("caller", move |ctx| {
                    ctx.do_flow(0, None)?;
                    Ok(())
                })
                .on_team("a")
                .with_parallel_flow("branch"),
            )
            .with_function(
                FunctionConfig::from_fn("branch", move |_ctx| {
                    *ft.lock() = std::thread::current().name().map(str::to_string);
                    Ok(())
                })
                .on_team("b"),
            ),
    );

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    let name = flow_thread.lock().clone().unwrap_or_default();
    assert!(name.starts_with("b-worker"), "flow ran on {}", name);
    floor.close();
}

#[derive(Debug, thiserror::Error)]
#[error("boom: {0}")]
struct Boom(String);

#[derive(Debug, thiserror::Error)]
#[error("other")]
struct Other;

#[test]
fn typed_escalation_handler_wins_over_catch_all_and_receives_the_error() {
    let order = log();
    let mut config = passive_floor();
    let o_any = order.clone();
    let o_typed = order.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(
                FunctionConfig::from_fn("fail", |_ctx| Err(anyhow::Error::new(Boom("db".into()))))
                    .with_escalation(EscalationConfig::any("rescue-any"))
                    .with_escalation(EscalationConfig::typed::<Boom>("rescue-typed")),
            )
            .with_function(FunctionConfig::from_fn("rescue-any", move |_ctx| {
                o_any.lock().push("any".to_string());
                Ok(())
            }))
            .with_function(FunctionConfig::from_fn("rescue-typed", move |ctx| {
                let escalation = ctx
                    .argument_as::<anyhow::Error>()
                    .ok_or_else(|| anyhow::anyhow!("handler got no escalation"))?;
                let boom = escalation
                    .downcast_ref::<Boom>()
                    .ok_or_else(|| anyhow::anyhow!("wrong escalation type"))?;
                o_typed.lock().push(format!("typed:{}", boom.0));
                Ok(())
            })),
    );

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(*order.lock(), vec!["typed:db"]);
}

#[test]
fn escalation_walks_function_then_work_then_office() {
    let order = log();
    let mut config = passive_floor();
    let o_work = order.clone();
    let o_office = order.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(FunctionConfig::from_fn("fail-boom", |_ctx| {
                Err(anyhow::Error::new(Boom("w".into())))
            }))
            .with_function(
                FunctionConfig::from_fn("fail-other", |_ctx| Err(anyhow::Error::new(Other)))
                    .then("noop"),
            )
            .with_function(FunctionConfig::from_fn("noop", |_ctx| Ok(())))
            .with_function(FunctionConfig::from_fn("work-rescue", move |_ctx| {
                o_work.lock().push("work".to_string());
                Ok(())
            }))
            .with_function(FunctionConfig::from_fn("office-rescue", move |_ctx| {
                o_office.lock().push("office".to_string());
                Ok(())
            }))
            .with_escalation(EscalationConfig::typed::<Boom>("work-rescue"))
            .initially("fail-boom"),
    );
    config.add_escalation(EscalationConfig::any("job.office-rescue"));

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();
    assert_eq!(*order.lock(), vec!["work"]);

    // Other does not match the work-level typed entry and falls through
    // to the office catch-all. The handler aborts the next continuation.
    order.lock().clear();
    let mut config2 = config.clone();
    config2.works[0].initial_function = Some("fail-other".to_string());
    let floor2 = Floor::open(&config2).unwrap();
    floor2.invoke_work("job", None).unwrap().wait().unwrap();
    assert_eq!(*order.lock(), vec!["office"]);
    floor2.close();
    floor.close();
}

struct RecordingHandler(Log);

impl EscalationHandler for RecordingHandler {
    fn handle_escalation(&self, escalation: &anyhow::Error) {
        self.0.lock().push(format!("floor:{}", escalation));
    }
}

#[test]
fn unhandled_escalation_fails_the_process_and_reaches_the_floor_handler() {
    let seen = log();
    let mut config = passive_floor();
    config.add_work(WorkConfig::new("job").with_function(FunctionConfig::from_fn(
        "fail",
        |_ctx| Err(anyhow::Error::new(Boom("fatal".into()))),
    )));

    let floor = Floor::open_with(&config, Arc::new(RecordingHandler(seen.clone()))).unwrap();
    let result = floor.invoke_work("job", None).unwrap().wait();

    match result {
        Err(FloorError::ProcessFailure(message)) => assert!(message.contains("boom: fatal")),
        other => panic!("expected ProcessFailure, got {:?}", other),
    }
    assert_eq!(*seen.lock(), vec!["floor:boom: fatal"]);
}

#[test]
fn repeat_reinvokes_a_million_times_on_one_sourced_instance() {
    let instantiated = Arc::new(AtomicUsize::new(0));
    let count = Arc::new(AtomicUsize::new(0));
    let mut config = passive_floor();
    let inst = instantiated.clone();
    config.add_managed_object_source(ManagedObjectSourceConfig::from_fn("counter", move || {
        CountingSource {
            instantiated: inst.clone(),
        }
    }));
    config.bind_process_object(BoundManagedObjectConfig::new("counter", "counter"));

    let c = count.clone();
    config.add_work(WorkConfig::new("spin").with_function(
        FunctionConfig::from_fn("loop", move |ctx| {
            ctx.object_as::<AtomicUsize>(0)?;
            if c.fetch_add(1, Ordering::Relaxed) + 1 < 1_000_000 {
                ctx.repeat();
            }
            Ok(())
        })
        .using_object("counter"),
    ));

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("spin", None).unwrap().wait().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1_000_000);
    assert_eq!(instantiated.load(Ordering::SeqCst), 1);
}

struct DelayedSource;

impl ManagedObjectSource for DelayedSource {
    fn meta_data(&self) -> ManagedObjectSourceMetaData {
        ManagedObjectSourceMetaData::default()
    }

    fn source_managed_object(&self, user: ManagedObjectUser) {
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            user.set_managed_object(Box::new(ValueObject(Arc::new(AtomicUsize::new(9)))));
        });
    }
}

#[test]
fn function_parks_until_delayed_sourcing_delivers() {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut config = passive_floor();
    config.add_managed_object_source(ManagedObjectSourceConfig::from_fn("slow", || DelayedSource));
    config.bind_process_object(BoundManagedObjectConfig::new("slow", "slow"));

    let s = seen.clone();
    config.add_work(WorkConfig::new("job").with_function(
        FunctionConfig::from_fn("use", move |ctx| {
            let value = ctx.object_as::<AtomicUsize>(0)?;
            s.store(value.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        })
        .using_object("slow"),
    ));

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 9);
}

struct NeverSource;

impl ManagedObjectSource for NeverSource {
    fn meta_data(&self) -> ManagedObjectSourceMetaData {
        ManagedObjectSourceMetaData::default()
    }

    fn source_managed_object(&self, _user: ManagedObjectUser) {}
}

#[test]
fn sourcing_timeout_escalates_as_process_failure() {
    let mut config = passive_floor();
    config.add_managed_object_source(
        ManagedObjectSourceConfig::from_fn("never", || NeverSource)
            .with_timeout(Duration::from_millis(50)),
    );
    config.bind_process_object(BoundManagedObjectConfig::new("never", "never"));
    config.add_work(WorkConfig::new("job").with_function(
        FunctionConfig::from_fn("use", |ctx| {
            ctx.object(0)?;
            Ok(())
        })
        .using_object("never"),
    ));

    let floor = Floor::open(&config).unwrap();
    let result = floor
        .invoke_work("job", None)
        .unwrap()
        .wait_timeout(Duration::from_secs(5));

    match result {
        Err(FloorError::ProcessFailure(message)) => {
            assert!(message.contains("timed out"), "{}", message)
        }
        other => panic!("expected timeout failure, got {:?}", other),
    }
    floor.close();
}

struct OpHandle {
    listener: Mutex<Option<AsynchronousListener>>,
    completed: AtomicBool,
}

struct AsyncObject {
    handle: Arc<OpHandle>,
}

impl ManagedObject for AsyncObject {
    fn object(&self) -> Arc<dyn Any + Send + Sync> {
        self.handle.clone()
    }

    fn as_asynchronous(&mut self) -> Option<&mut dyn AsynchronousManagedObject> {
        Some(self)
    }
}

impl AsynchronousManagedObject for AsyncObject {
    fn register_listener(&mut self, listener: AsynchronousListener) {
        *self.handle.listener.lock() = Some(listener);
    }
}

struct AsyncSource;

impl ManagedObjectSource for AsyncSource {
    fn meta_data(&self) -> ManagedObjectSourceMetaData {
        ManagedObjectSourceMetaData::default()
    }

    fn source_managed_object(&self, user: ManagedObjectUser) {
        user.set_managed_object(Box::new(AsyncObject {
            handle: Arc::new(OpHandle {
                listener: Mutex::new(None),
                completed: AtomicBool::new(false),
            }),
        }));
    }
}

#[test]
fn asynchronous_operation_parks_the_dependent_function() {
    let observed = Arc::new(AtomicBool::new(false));
    let mut config = passive_floor();
    config.add_managed_object_source(ManagedObjectSourceConfig::from_fn("async", || AsyncSource));
    config.bind_process_object(BoundManagedObjectConfig::new("async", "async"));

    let ob = observed.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(
                FunctionConfig::from_fn("start-op", |ctx| {
                    let handle = ctx.object_as::<OpHandle>(0)?;
                    let listener = handle
                        .listener
                        .lock()
                        .clone()
                        .ok_or_else(|| anyhow::anyhow!("no listener registered"))?;
                    listener.notify_started();
                    let handle2 = handle.clone();
                    std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(30));
                        handle2.completed.store(true, Ordering::SeqCst);
                        listener.notify_complete();
                    });
                    Ok(())
                })
                .using_object("async")
                .then("after-op"),
            )
            .with_function(
                FunctionConfig::from_fn("after-op", move |ctx| {
                    let handle = ctx.object_as::<OpHandle>(0)?;
                    ob.store(handle.completed.load(Ordering::SeqCst), Ordering::SeqCst);
                    Ok(())
                })
                .using_object("async"),
            ),
    );

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    // The continuation could only run after notify_complete.
    assert!(observed.load(Ordering::SeqCst));
}

struct RecordingPool {
    tag: &'static str,
    order: Log,
}

impl ManagedObjectPool for RecordingPool {
    fn take(&self) -> Option<Box<dyn ManagedObject>> {
        None
    }

    fn give_back(&self, _object: Box<dyn ManagedObject>) {
        self.order.lock().push(self.tag.to_string());
    }
}

#[test]
fn process_scope_recycles_in_reverse_slot_order() {
    let order = log();
    let mut config = passive_floor();
    for (tag, source_name) in [("first", "src-a"), ("second", "src-b")] {
        let instantiated = Arc::new(AtomicUsize::new(0));
        config.add_managed_object_source(
            ManagedObjectSourceConfig::from_fn(source_name, move || CountingSource {
                instantiated: instantiated.clone(),
            })
            .with_pool(Arc::new(RecordingPool {
                tag,
                order: order.clone(),
            })),
        );
    }
    config.bind_process_object(BoundManagedObjectConfig::new("first", "src-a"));
    config.bind_process_object(BoundManagedObjectConfig::new("second", "src-b"));
    config.add_work(WorkConfig::new("job").with_function(
        FunctionConfig::from_fn("use-both", |ctx| {
            ctx.object(0)?;
            ctx.object(1)?;
            Ok(())
        })
        .using_object("first")
        .using_object("second"),
    ));

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(*order.lock(), vec!["second", "first"]);
}

struct PreloadedPool {
    hits: Arc<AtomicUsize>,
}

impl ManagedObjectPool for PreloadedPool {
    fn take(&self) -> Option<Box<dyn ManagedObject>> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(ValueObject(Arc::new(AtomicUsize::new(5)))))
    }

    fn give_back(&self, _object: Box<dyn ManagedObject>) {}
}

#[test]
fn pool_hit_skips_the_source() {
    let instantiated = Arc::new(AtomicUsize::new(0));
    let hits = Arc::new(AtomicUsize::new(0));
    let mut config = passive_floor();
    let inst = instantiated.clone();
    config.add_managed_object_source(
        ManagedObjectSourceConfig::from_fn("pooled", move || CountingSource {
            instantiated: inst.clone(),
        })
        .with_pool(Arc::new(PreloadedPool { hits: hits.clone() })),
    );
    config.bind_process_object(BoundManagedObjectConfig::new("pooled", "pooled"));
    config.add_work(WorkConfig::new("job").with_function(
        FunctionConfig::from_fn("use", |ctx| {
            ctx.object(0)?;
            Ok(())
        })
        .using_object("pooled"),
    ));

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(instantiated.load(Ordering::SeqCst), 0);
}

struct AwareInlineTeam;

impl Team for AwareInlineTeam {
    fn assign_job(&self, job: Job) {
        job.run();
    }

    fn requests_thread_local_awareness(&self) -> bool {
        true
    }
}

struct AwareInlineSource;

impl TeamSource for AwareInlineSource {
    fn create_team(&self, _context: TeamSourceContext<'_>) -> anyhow::Result<Arc<dyn Team>> {
        Ok(Arc::new(AwareInlineTeam))
    }
}

#[test]
fn thread_local_aware_jobs_run_on_the_waiting_thread() {
    let seen = Arc::new(Mutex::new(None::<std::thread::ThreadId>));
    let mut config = FloorConfig::new("office");
    config.add_team(TeamConfig::new("aware", Arc::new(AwareInlineSource)));

    let s = seen.clone();
    config.add_work(WorkConfig::new("job").with_function(FunctionConfig::from_fn(
        "where-am-i",
        move |_ctx| {
            *s.lock() = Some(std::thread::current().id());
            Ok(())
        },
    )));

    let floor = Floor::open(&config).unwrap();
    floor.invoke_work("job", None).unwrap().wait().unwrap();

    assert_eq!(*seen.lock(), Some(std::thread::current().id()));
}

#[test]
fn sequential_flow_between_aware_teams_completes_on_the_servicing_thread() {
    let order = log();
    let flow_thread = Arc::new(Mutex::new(None::<std::thread::ThreadId>));
    let mut config = FloorConfig::new("office");
    config.add_team(TeamConfig::new("a", Arc::new(AwareInlineSource)));
    config.add_team(TeamConfig::new("b", Arc::new(AwareInlineSource)));

    let o1 = order.clone();
    let o2 = order.clone();
    let ft = flow_thread.clone();
    config.add_work(
        WorkConfig::new("job")
            .with_function(
                FunctionConfig::from_fn("caller", move |ctx| {
                    ctx.do_flow(0, None)?;
                    o1.lock().push("after-flow".to_string());
                    Ok(())
                })
                .on_team("a")
                .with_sequential_flow("callee"),
            )
            .with_function(
                FunctionConfig::from_fn("callee", move |_ctx| {
                    o2.lock().push("in-flow".to_string());
                    *ft.lock() = Some(std::thread::current().id());
                    Ok(())
                })
                .on_team("b"),
            ),
    );

    let floor = Floor::open(&config).unwrap();
    floor
        .invoke_work("job", None)
        .unwrap()
        .wait_timeout(Duration::from_secs(2))
        .unwrap();

    assert_eq!(*order.lock(), vec!["in-flow", "after-flow"]);
    assert_eq!(*flow_thread.lock(), Some(std::thread::current().id()));
    floor.close();
}
