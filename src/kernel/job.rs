//! Job execution: one function invocation and its continuations.
//!
//! A chain is a run of jobs linked by next-function continuations and
//! escalation handlers; the process tracks chains, not individual jobs.
//! Within a chain, a continuation on the same team runs in the worker's
//! loop rather than re-entering the team, so a function repeating or
//! continuing a million times costs no queue depth and no stack depth.

use crate::kernel::container::{ManagedObjectContainer, Readiness};
use crate::kernel::process::{FlowDone, ProcessState, ThreadState, WorkFrame};
use crate::metadata::{
    DutyRef, FlowMetadata, FunctionMetadata, FunctionRef, InstigationStrategy, ManagedObjectIndex,
    ManagedObjectScope,
};
use crate::source::team::Job;
use crate::source::work::FunctionContext;
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct JobNode {
    function_ref: FunctionRef,
    meta: Arc<FunctionMetadata>,
    thread: Arc<ThreadState>,
    frame: Arc<WorkFrame>,
    // Function-scope containers, fresh per invocation.
    function_containers: Vec<Arc<ManagedObjectContainer>>,
    argument: Mutex<Option<Box<dyn Any + Send>>>,
    // Sequential-flow completion; handed on to the chain's next job.
    completion: Mutex<Option<Arc<FlowDone>>>,
}

enum Step {
    /// Parked on a container; a registered waker reactivates the job.
    Park,
    /// Continue the chain with this job on the current worker.
    Inline(Arc<JobNode>),
    /// Chain ends here or was handed to another team.
    Done,
}

impl JobNode {
    pub fn new(
        thread: Arc<ThreadState>,
        frame: Arc<WorkFrame>,
        function_ref: FunctionRef,
        argument: Option<Box<dyn Any + Send>>,
        completion: Option<Arc<FlowDone>>,
    ) -> Arc<Self> {
        let meta = thread.process.engine.office.function(function_ref).clone();
        let function_containers = meta
            .function_objects
            .iter()
            .map(|m| ManagedObjectContainer::new(m.clone()))
            .collect();
        Arc::new(Self {
            function_ref,
            meta,
            thread,
            frame,
            function_containers,
            argument: Mutex::new(argument),
            completion: Mutex::new(completion),
        })
    }

    fn container(&self, index: ManagedObjectIndex) -> Option<Arc<ManagedObjectContainer>> {
        let table = match index.scope {
            ManagedObjectScope::Process => &self.thread.process.containers,
            ManagedObjectScope::Thread => &self.thread.containers,
            ManagedObjectScope::Work => &self.frame.containers,
            ManagedObjectScope::Function => &self.function_containers,
        };
        table.get(index.slot).cloned()
    }
}

/// Assign a job to its function's team.
pub(crate) fn activate(node: Arc<JobNode>) {
    let engine = node.thread.process.engine.clone();
    let team = node.meta.team;
    let process = node.thread.process.id;
    engine.assign(team, Job::new(process, move || run_chain(node)));
}

/// Run a chain on the current worker until it parks, ends, or hands off.
pub(crate) fn run_chain(mut node: Arc<JobNode>) {
    loop {
        match run_one(&node) {
            Step::Park => return,
            Step::Inline(next) => node = next,
            Step::Done => return,
        }
    }
}

fn run_one(node: &Arc<JobNode>) -> Step {
    // Readiness: everything in the required closure must be sourced,
    // coordinated and free of outstanding asynchronous operations before
    // the body touches anything.
    let monitor = node.thread.process.engine.monitor.clone();
    for index in &node.meta.required_objects {
        let Some(container) = node.container(*index) else {
            return escalate(
                node,
                anyhow::anyhow!("no managed object container at {}", index),
            );
        };
        let waker_node = node.clone();
        match container.poll_ready(&monitor, move || Box::new(move || activate(waker_node))) {
            Readiness::Ready | Readiness::NeedsCoordination => {}
            Readiness::Pending => return Step::Park,
            Readiness::Failed(message) => return escalate(node, anyhow::anyhow!(message)),
        }
    }
    // Coordination, dependencies first. The required closure lists each
    // object before its dependencies, so the reverse order loads leaves
    // before the objects depending on them.
    for index in node.meta.required_objects.iter().rev() {
        let Some(container) = node.container(*index) else {
            continue;
        };
        if !container.needs_coordination() {
            continue;
        }
        let mut dependencies = Vec::with_capacity(container.meta.dependencies.len());
        for dependency in &container.meta.dependencies {
            let object = node
                .container(*dependency)
                .ok_or_else(|| format!("no managed object container at {}", dependency))
                .and_then(|c| c.object());
            match object {
                Ok(object) => dependencies.push(object),
                Err(message) => return escalate(node, anyhow::anyhow!(message)),
            }
        }
        if let Err(message) = container.coordinate(dependencies) {
            return escalate(node, anyhow::anyhow!(message));
        }
    }
    // A coordinating object may have picked up an asynchronous operation;
    // re-check before running the body.
    for index in &node.meta.required_objects {
        let Some(container) = node.container(*index) else {
            continue;
        };
        let waker_node = node.clone();
        match container.poll_ready(&monitor, move || Box::new(move || activate(waker_node))) {
            Readiness::Ready => {}
            Readiness::Pending => return Step::Park,
            Readiness::NeedsCoordination => {
                return escalate(
                    node,
                    anyhow::anyhow!(
                        "managed object '{}' could not be coordinated",
                        container.meta.bound_name
                    ),
                );
            }
            Readiness::Failed(message) => return escalate(node, anyhow::anyhow!(message)),
        }
    }

    if let Err(error) = run_duties(node, &node.meta.pre_duties) {
        return escalate(node, error);
    }

    let argument = node.argument.lock().take();
    let body_result = loop {
        let mut context = ExecutionContext {
            node,
            argument: argument.as_deref(),
            repeat: false,
        };
        match node.meta.body.execute(&mut context) {
            Ok(()) => {
                if context.repeat {
                    continue;
                }
                break Ok(());
            }
            Err(error) => break Err(error),
        }
    };
    if let Err(error) = body_result {
        return escalate(node, error);
    }

    if let Err(error) = run_duties(node, &node.meta.post_duties) {
        return escalate(node, error);
    }

    match node.meta.next {
        Some(next_ref) => continue_with(node, next_ref, None),
        None => finish_chain(node),
    }
}

// Continue the chain with another function, carrying the chain's
// completion along. Same-team continuations stay on this worker.
fn continue_with(
    node: &Arc<JobNode>,
    target: FunctionRef,
    argument: Option<Box<dyn Any + Send>>,
) -> Step {
    for container in node.function_containers.iter().rev() {
        container.recycle();
    }
    let frame = if target.work == node.frame.work_slot {
        node.frame.clone()
    } else {
        node.thread.open_frame(target.work)
    };
    let completion = node.completion.lock().take();
    let next = JobNode::new(node.thread.clone(), frame, target, argument, completion);
    if next.meta.team == node.meta.team {
        Step::Inline(next)
    } else {
        activate(next);
        Step::Done
    }
}

fn finish_chain(node: &Arc<JobNode>) -> Step {
    for container in node.function_containers.iter().rev() {
        container.recycle();
    }
    if let Some(completion) = node.completion.lock().take() {
        completion.complete();
    }
    node.thread.process.chain_finished();
    Step::Done
}

fn run_duties(node: &Arc<JobNode>, duties: &[DutyRef]) -> anyhow::Result<()> {
    for duty in duties {
        let administrator = &node.frame.work.administrators[duty.administrator];
        let mut extensions = Vec::with_capacity(administrator.administered.len());
        for (index, slot) in &administrator.administered {
            let extension = node
                .container(*index)
                .ok_or_else(|| format!("no managed object container at {}", index))
                .and_then(|c| c.extension(*slot));
            match extension {
                Ok(extension) => extensions.push(extension),
                Err(message) => anyhow::bail!(
                    "duty {} of administrator '{}': {}",
                    duty.duty,
                    administrator.bound_name,
                    message
                ),
            }
        }
        node.frame.administrators[duty.administrator]
            .lock()
            .do_duty(duty.duty, &extensions)?;
    }
    Ok(())
}

// Walk the escalation chain: function, then work, then office, then the
// floor's last-resort handler. A handled escalation continues the chain
// with the handler; an unhandled one fails the process (parked and
// already-scheduled jobs of the process keep draining).
fn escalate(node: &Arc<JobNode>, error: anyhow::Error) -> Step {
    let entry = node
        .meta
        .escalations
        .match_escalation(&error)
        .or_else(|| node.frame.work.escalations.match_escalation(&error))
        .or_else(|| {
            node.thread
                .process
                .engine
                .office
                .escalations
                .match_escalation(&error)
        });
    match entry {
        Some(entry) => {
            tracing::debug!(
                function = %node.meta.name,
                handler_type = %entry.type_label,
                error = %error,
                "escalation handled"
            );
            let handler = entry.handler;
            continue_with(node, handler, Some(Box::new(error)))
        }
        None => {
            tracing::error!(
                process = %node.thread.process.id,
                function = %node.meta.name,
                error = %format!("{:#}", error),
                "unhandled escalation"
            );
            node.thread.process.engine.escalation.handle_escalation(&error);
            node.thread.process.fail(format!("{:#}", error));
            finish_chain(node)
        }
    }
}

/// Instigate a flow from a running body.
fn instigate(
    node: &Arc<JobNode>,
    flow: FlowMetadata,
    argument: Option<Box<dyn Any + Send>>,
) -> anyhow::Result<()> {
    let process = &node.thread.process;
    match flow.strategy {
        InstigationStrategy::Sequential => {
            // A sequential flow runs to completion before this call
            // returns; its own escalation chain absorbs any failure.
            let frame = if flow.target.work == node.frame.work_slot {
                node.frame.clone()
            } else {
                node.thread.open_frame(flow.target.work)
            };
            let done = FlowDone::new();
            let flow_node = JobNode::new(
                node.thread.clone(),
                frame,
                flow.target,
                argument,
                Some(done.clone()),
            );
            process.chain_started();
            if flow_node.meta.team == node.meta.team {
                run_chain(flow_node);
            } else {
                activate(flow_node);
            }
            wait_for_flow(process, &done);
            Ok(())
        }
        InstigationStrategy::Parallel => {
            // Independent schedule, own thread of execution, always through
            // the target team.
            let thread = process.spawn_thread();
            let frame = thread.open_frame(flow.target.work);
            let flow_node = JobNode::new(thread, frame, flow.target, argument, None);
            process.chain_started();
            activate(flow_node);
            Ok(())
        }
    }
}

/// Block until a sequential flow completes. When this thread is the
/// process's thread-local servicer, the flow (or a waker resuming it) may
/// be routed right back here, so the process queue is drained while
/// waiting; blocking blindly would stall both sides.
fn wait_for_flow(process: &Arc<ProcessState>, done: &Arc<FlowDone>) {
    match process.engine.router.servicer_queue(process.id) {
        Some(jobs) => {
            while !done.is_complete() {
                match jobs.recv_timeout(Duration::from_millis(10)) {
                    Ok(job) => job.run(),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return done.wait(),
                }
            }
        }
        None => done.wait(),
    }
}

struct ExecutionContext<'a> {
    node: &'a Arc<JobNode>,
    argument: Option<&'a (dyn Any + Send)>,
    repeat: bool,
}

impl FunctionContext for ExecutionContext<'_> {
    fn argument(&self) -> Option<&(dyn Any + Send)> {
        self.argument
    }

    fn object(&self, position: usize) -> anyhow::Result<Arc<dyn Any + Send + Sync>> {
        let index = self.node.meta.object_indexes.get(position).ok_or_else(|| {
            anyhow::anyhow!(
                "function '{}' has no object at position {}",
                self.node.meta.name,
                position
            )
        })?;
        self.node
            .container(*index)
            .ok_or_else(|| format!("no managed object container at {}", index))
            .and_then(|c| c.object())
            .map_err(|message| anyhow::anyhow!(message))
    }

    fn do_flow(
        &mut self,
        position: usize,
        argument: Option<Box<dyn Any + Send>>,
    ) -> anyhow::Result<()> {
        let flow = *self.node.meta.flows.get(position).ok_or_else(|| {
            anyhow::anyhow!(
                "function '{}' has no flow at position {}",
                self.node.meta.name,
                position
            )
        })?;
        instigate(self.node, flow, argument)
    }

    fn repeat(&mut self) {
        self.repeat = true;
    }
}
