//! A serial pipeline of asynchronous steps ('units'). Each unit is a closure that gets an
//!  [OperationControl], starts whatever asynchronous work it does, and eventually signals through
//!  the control whether the queue should continue with the next unit or finish.
//!
//! * Units run strictly one after the other: the next unit is dispatched only after the active
//!   unit signalled.
//! * Units run as tokio tasks, on the runtime handle they were scheduled with or on the queue's
//!   default handle.
//! * A cancelable unit additionally gets [CancelHooks] to register cleanup that runs if the
//!   queue is cancelled while the unit is active. Cancellation is cooperative: it does not abort
//!   the unit's work, it runs the hooks and discards everything that was not started yet.
//! * A finish handler is called once per cycle, with `true` if the cycle ended by cancellation.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use anyhow::bail;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueueState {
    Idle,
    Running,
    Cancelling,
    /// terminal
    Cancelled,
}

/// A unit's signal to the queue
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ControlType {
    /// dispatch the next unit, or finish the cycle if there is none
    Continue,
    /// finish the cycle, discarding all units that are still queued
    Finish,
}

type FinishHandler = Arc<dyn Fn(bool) + Send + Sync>;
type CancelHook = Box<dyn FnOnce() + Send>;

enum UnitBody {
    Plain(Box<dyn FnOnce(OperationControl) + Send>),
    Cancelable(Box<dyn FnOnce(OperationControl, CancelHooks) + Send>),
}

struct ScheduledUnit {
    body: UnitBody,
    handle: Option<Handle>,
}

enum HookState {
    Active(Vec<CancelHook>),
    /// cancel was requested, the hooks are waiting for the cancel task or being run by it
    Cancelling(Vec<CancelHook>),
    Cancelled,
    Completed,
}

/// shared between the queue and the unit's control / hooks
struct UnitShared {
    hooks: Mutex<HookState>,
}
impl UnitShared {
    fn new() -> UnitShared {
        UnitShared {
            hooks: Mutex::new(HookState::Active(Vec::new())),
        }
    }

    /// Marks the unit as cancelled. Hooks registered from here on queue up behind the ones
    ///  registered before, and [UnitShared::run_cancel_hooks] runs them all in order.
    fn begin_cancel(&self) {
        let mut hooks = self.hooks.lock().unwrap();
        *hooks = match std::mem::replace(&mut *hooks, HookState::Cancelled) {
            HookState::Active(registered) => HookState::Cancelling(registered),
            other => other,
        };
    }

    fn run_cancel_hooks(&self) {
        loop {
            let batch = {
                let mut hooks = self.hooks.lock().unwrap();
                match std::mem::replace(&mut *hooks, HookState::Cancelled) {
                    HookState::Cancelling(pending) if !pending.is_empty() => {
                        *hooks = HookState::Cancelling(Vec::new());
                        pending
                    }
                    HookState::Cancelling(_) => return,
                    other => {
                        *hooks = other;
                        return;
                    }
                }
            };
            trace!("running {} cancel hooks", batch.len());
            for hook in batch {
                hook();
            }
        }
    }

    fn complete(&self) {
        let mut hooks = self.hooks.lock().unwrap();
        if let HookState::Active(_) = *hooks {
            *hooks = HookState::Completed;
        }
    }
}

struct ActiveUnit {
    shared: Arc<UnitShared>,
    handle: Option<Handle>,
}

struct QueueInner {
    state: QueueState,
    is_started: bool,
    units: VecDeque<ScheduledUnit>,
    active: Option<ActiveUnit>,
    default_handle: Option<Handle>,
    finish_handler: Option<FinishHandler>,
}

impl QueueInner {
    fn is_active(&self, unit: &Arc<UnitShared>) -> bool {
        self.active.as_ref()
            .map_or(false, |a| Arc::ptr_eq(&a.shared, unit))
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.state, QueueState::Cancelling | QueueState::Cancelled)
    }

    /// NB: to be performed after releasing the lock
    fn next_step(&mut self) -> NextStep {
        match self.units.pop_front() {
            Some(unit) => {
                let handle = unit.handle.or_else(|| self.default_handle.clone());
                let shared = Arc::new(UnitShared::new());
                self.state = QueueState::Running;
                self.active = Some(ActiveUnit {
                    shared: shared.clone(),
                    handle: handle.clone(),
                });
                NextStep::Dispatch { body: unit.body, unit: shared, handle }
            }
            None => {
                self.state = QueueState::Idle;
                NextStep::Finished(self.finish_handler.clone())
            }
        }
    }
}

enum NextStep {
    Dispatch {
        body: UnitBody,
        unit: Arc<UnitShared>,
        handle: Option<Handle>,
    },
    Finished(Option<FinishHandler>),
    Nothing,
}

/// The handle a unit uses to signal the queue. Every unit must signal exactly once, and a
///  control that is dropped without signalling stalls the queue.
pub struct OperationControl {
    queue: Arc<Mutex<QueueInner>>,
    unit: Arc<UnitShared>,
    is_signalled: bool,
}

impl OperationControl {
    pub fn signal(mut self, control: ControlType) {
        self.is_signalled = true;

        let step = {
            let mut inner = self.queue.lock().unwrap();
            if !inner.is_active(&self.unit) {
                debug!("ignoring {:?} signal of an operation that is no longer active", control);
                return;
            }
            self.unit.complete();
            inner.active = None;

            match control {
                ControlType::Continue => inner.next_step(),
                ControlType::Finish => {
                    trace!("finishing - discarding {} queued operations", inner.units.len());
                    inner.units.clear();
                    inner.is_started = false;
                    inner.state = QueueState::Idle;
                    NextStep::Finished(inner.finish_handler.clone())
                }
            }
        };
        perform(&self.queue, step);
    }
}

impl Drop for OperationControl {
    fn drop(&mut self) {
        if !self.is_signalled {
            warn!("operation control was dropped without signalling - the operations queue is stalled");
        }
    }
}

/// Registration of cleanup for a cancelable unit. This is cheap to clone, so it can be moved
///  into whatever asynchronous work the unit starts.
#[derive(Clone)]
pub struct CancelHooks {
    unit: Arc<UnitShared>,
}

impl CancelHooks {
    /// Registers a hook that runs if the queue is cancelled while this unit is active. Hooks run
    ///  in registration order.
    ///
    /// If the queue was cancelled already, the hook runs immediately. If the unit completed
    ///  normally, the hook is dropped.
    pub fn add(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.unit.hooks.lock().unwrap();
        match &mut *hooks {
            HookState::Active(registered) | HookState::Cancelling(registered) => registered.push(Box::new(hook)),
            HookState::Cancelled => {
                drop(hooks);
                hook();
            }
            HookState::Completed => debug!("operation completed already - dropping cancel hook"),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.unit.hooks.lock().unwrap(), HookState::Cancelling(_) | HookState::Cancelled)
    }
}

#[derive(Clone)]
pub struct OperationsQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl Default for OperationsQueue {
    fn default() -> Self {
        OperationsQueue::new()
    }
}

impl OperationsQueue {
    /// Creates an idle, un-started queue. The tokio runtime this is called from (if any) becomes
    ///  the default handle for running units.
    pub fn new() -> OperationsQueue {
        OperationsQueue {
            inner: Arc::new(Mutex::new(QueueInner {
                state: QueueState::Idle,
                is_started: false,
                units: VecDeque::new(),
                active: None,
                default_handle: Handle::try_current().ok(),
                finish_handler: None,
            })),
        }
    }

    /// Creates a queue that dispatches units as soon as they are scheduled
    pub fn new_started() -> OperationsQueue {
        let queue = OperationsQueue::new();
        queue.inner.lock().unwrap()
            .is_started = true;
        queue
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().unwrap().state
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().unwrap().is_started
    }

    pub fn set_default_handle(&self, handle: Handle) {
        self.inner.lock().unwrap()
            .default_handle = Some(handle);
    }

    /// The handler is called when a cycle ends, with `true` if the queue was cancelled and
    ///  `false` if it ran out of units or a unit signalled `Finish`.
    pub fn set_finish_handler(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.lock().unwrap()
            .finish_handler = Some(Arc::new(handler));
    }

    /// Starts dispatching units. This has no effect on a queue that is started already or
    ///  cancelled.
    pub fn start(&self) {
        let step = {
            let mut inner = self.inner.lock().unwrap();
            if inner.is_started || inner.is_cancelled() {
                return;
            }
            debug!("starting operations queue");
            inner.is_started = true;

            if inner.active.is_none() && !inner.units.is_empty() {
                inner.next_step()
            }
            else {
                NextStep::Nothing
            }
        };
        perform(&self.inner, step);
    }

    pub fn schedule(&self, body: impl FnOnce(OperationControl) + Send + 'static) -> anyhow::Result<()> {
        self.do_schedule(UnitBody::Plain(Box::new(body)), None)
    }

    pub fn schedule_on(&self, handle: Handle, body: impl FnOnce(OperationControl) + Send + 'static) -> anyhow::Result<()> {
        self.do_schedule(UnitBody::Plain(Box::new(body)), Some(handle))
    }

    pub fn schedule_cancelable(&self, body: impl FnOnce(OperationControl, CancelHooks) + Send + 'static) -> anyhow::Result<()> {
        self.do_schedule(UnitBody::Cancelable(Box::new(body)), None)
    }

    pub fn schedule_cancelable_on(&self, handle: Handle, body: impl FnOnce(OperationControl, CancelHooks) + Send + 'static) -> anyhow::Result<()> {
        self.do_schedule(UnitBody::Cancelable(Box::new(body)), Some(handle))
    }

    /// Schedules an async step: the future's output is the unit's signal.
    pub fn schedule_future<F, Fut>(&self, body: F) -> anyhow::Result<()>
    where
        F: FnOnce(CancelHooks) -> Fut + Send + 'static,
        Fut: Future<Output = ControlType> + Send + 'static,
    {
        self.schedule_cancelable(move |control, hooks| {
            tokio::spawn(async move {
                let signal = body(hooks).await;
                control.signal(signal);
            });
        })
    }

    fn do_schedule(&self, body: UnitBody, handle: Option<Handle>) -> anyhow::Result<()> {
        let step = {
            let mut inner = self.inner.lock().unwrap();
            if inner.is_cancelled() {
                bail!("operations queue was cancelled");
            }
            inner.units.push_back(ScheduledUnit { body, handle });
            trace!("scheduled operation - {} queued", inner.units.len());

            if inner.is_started && inner.active.is_none() {
                inner.next_step()
            }
            else {
                NextStep::Nothing
            }
        };
        perform(&self.inner, step);
        Ok(())
    }

    /// Cancels the queue: queued units are discarded, the active unit's cancel hooks run, and
    ///  then the finish handler is called with `true`. This happens asynchronously on the active
    ///  unit's runtime handle (or the default handle), and the queue is `Cancelled` afterwards.
    ///
    /// Cancelling a queue that is cancelled already has no effect.
    pub fn cancel(&self) {
        let (unit, handle, finish_handler) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.is_cancelled() {
                return;
            }
            debug!("cancelling operations queue - discarding {} queued operations", inner.units.len());
            inner.state = QueueState::Cancelling;
            inner.units.clear();

            let (unit, handle) = match inner.active.take() {
                Some(active) => {
                    active.shared.begin_cancel();
                    (Some(active.shared), active.handle.or_else(|| inner.default_handle.clone()))
                }
                None => (None, inner.default_handle.clone()),
            };
            (unit, handle, inner.finish_handler.clone())
        };

        let queue = self.inner.clone();
        let do_cancel = move || {
            if let Some(unit) = unit {
                unit.run_cancel_hooks();
            }
            queue.lock().unwrap()
                .state = QueueState::Cancelled;
            if let Some(handler) = finish_handler {
                handler(true);
            }
        };

        match handle {
            Some(handle) => {
                handle.spawn(async move { do_cancel() });
            }
            None => do_cancel(),
        }
    }
}

fn perform(queue: &Arc<Mutex<QueueInner>>, step: NextStep) {
    match step {
        NextStep::Dispatch { body, unit, handle } => {
            let Some(handle) = handle else {
                panic!("no tokio runtime to run an operation on: schedule it with a handle, or set a default handle on the queue");
            };
            let control = OperationControl {
                queue: queue.clone(),
                unit: unit.clone(),
                is_signalled: false,
            };
            handle.spawn(async move {
                match body {
                    UnitBody::Plain(f) => f(control),
                    UnitBody::Cancelable(f) => f(control, CancelHooks { unit }),
                }
            });
        }
        NextStep::Finished(handler) => {
            debug!("operations queue finished");
            if let Some(handler) = handler {
                handler(false);
            }
        }
        NextStep::Nothing => {}
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::runtime::Builder;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{sleep, timeout};
    use super::*;

    fn recording_queue(queue: OperationsQueue) -> (OperationsQueue, UnboundedReceiver<bool>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        queue.set_finish_handler(move |canceled| { sender.send(canceled).ok(); });
        (queue, receiver)
    }

    fn log() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone + Send + 'static) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        (log, move |entry: &str| log2.lock().unwrap().push(entry.to_string()))
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_continue_then_finish() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new());
        let (log, add) = log();

        let a = add.clone();
        queue.schedule(move |control| { a("u1"); control.signal(ControlType::Continue); }).unwrap();
        let a = add.clone();
        queue.schedule(move |control| { a("u2"); control.signal(ControlType::Finish); }).unwrap();
        let a = add.clone();
        queue.schedule(move |control| { a("u3"); control.signal(ControlType::Continue); }).unwrap();

        sleep(Duration::from_millis(10)).await;
        assert!(entries(&log).is_empty());

        queue.start();
        assert_eq!(finished.recv().await, Some(false));
        assert_eq!(entries(&log), vec!["u1", "u2"]);
        assert_eq!(queue.state(), QueueState::Idle);
        assert!(!queue.is_started());

        sleep(Duration::from_millis(10)).await;
        assert!(finished.try_recv().is_err());
        assert_eq!(entries(&log), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_drained_queue_stays_started() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        let (log, add) = log();

        let a = add.clone();
        queue.schedule(move |control| { a("u1"); control.signal(ControlType::Continue); }).unwrap();
        assert_eq!(finished.recv().await, Some(false));
        assert_eq!(queue.state(), QueueState::Idle);
        assert!(queue.is_started());

        let a = add.clone();
        queue.schedule(move |control| { a("u2"); control.signal(ControlType::Continue); }).unwrap();
        assert_eq!(finished.recv().await, Some(false));
        assert_eq!(entries(&log), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_restart_after_finish() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());

        queue.schedule(|control| control.signal(ControlType::Finish)).unwrap();
        assert_eq!(finished.recv().await, Some(false));
        assert!(!queue.is_started());

        let (sender, mut receiver) = mpsc::unbounded_channel();
        queue.schedule(move |control| { sender.send(()).ok(); control.signal(ControlType::Continue); }).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(receiver.try_recv().is_err());

        queue.start();
        queue.start();
        assert_eq!(receiver.recv().await, Some(()));
        assert_eq!(finished.recv().await, Some(false));
    }

    #[tokio::test]
    async fn test_units_run_serially() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        let (log, add) = log();

        for i in 0..5 {
            let a = add.clone();
            queue.schedule(move |control| {
                a(&format!("start {}", i));
                let a = a.clone();
                tokio::spawn(async move {
                    sleep(Duration::from_millis(5 - i)).await;
                    a(&format!("end {}", i));
                    control.signal(ControlType::Continue);
                });
            }).unwrap();
        }

        assert_eq!(finished.recv().await, Some(false));
        let expected: Vec<String> = (0..5)
            .flat_map(|i| vec![format!("start {}", i), format!("end {}", i)])
            .collect();
        assert_eq!(entries(&log), expected);
    }

    #[tokio::test]
    async fn test_cancel_runs_hooks_of_active_unit() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new());
        let (log, add) = log();
        let (started_sender, mut started) = mpsc::unbounded_channel();

        let a = add.clone();
        queue.schedule_cancelable(move |control, hooks| {
            let a2 = a.clone();
            hooks.add(move || a2("hook 1"));
            let a2 = a.clone();
            hooks.add(move || a2("hook 2"));
            started_sender.send((control, hooks)).ok();
        }).unwrap();
        let a = add.clone();
        queue.schedule(move |control| { a("u2"); control.signal(ControlType::Continue); }).unwrap();
        let a = add.clone();
        queue.schedule(move |control| { a("u3"); control.signal(ControlType::Continue); }).unwrap();
        queue.start();

        let (control, hooks) = started.recv().await.unwrap();
        assert!(!hooks.is_cancelled());

        queue.cancel();
        queue.cancel();
        assert_eq!(queue.state(), QueueState::Cancelling);

        assert_eq!(finished.recv().await, Some(true));
        assert_eq!(entries(&log), vec!["hook 1", "hook 2"]);
        assert_eq!(queue.state(), QueueState::Cancelled);
        assert!(hooks.is_cancelled());

        // late signal and late hook
        control.signal(ControlType::Continue);
        let a = add.clone();
        hooks.add(move || a("late hook"));
        assert_eq!(entries(&log), vec!["hook 1", "hook 2", "late hook"]);

        sleep(Duration::from_millis(10)).await;
        assert!(finished.try_recv().is_err());
        assert!(!entries(&log).contains(&"u2".to_string()));
    }

    #[tokio::test]
    async fn test_hooks_added_while_cancelling_run_in_order() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        let (log, add) = log();
        let (started_sender, mut started) = mpsc::unbounded_channel();

        let a = add.clone();
        queue.schedule_cancelable(move |control, hooks| {
            let a2 = a.clone();
            let nested_hooks = hooks.clone();
            hooks.add(move || {
                a2("hook 1");
                let a3 = a2.clone();
                nested_hooks.add(move || a3("added by hook 1"));
            });
            started_sender.send((control, hooks)).ok();
        }).unwrap();

        let (_control, hooks) = started.recv().await.unwrap();

        queue.cancel();
        assert!(hooks.is_cancelled());
        let a = add.clone();
        hooks.add(move || a("hook 2"));
        assert!(entries(&log).is_empty());

        assert_eq!(finished.recv().await, Some(true));
        assert_eq!(entries(&log), vec!["hook 1", "hook 2", "added by hook 1"]);
        assert!(hooks.is_cancelled());
    }

    #[tokio::test]
    async fn test_hooks_of_completed_unit_do_not_run() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        let (log, add) = log();
        let (hooks_sender, mut hooks_receiver) = mpsc::unbounded_channel();

        let a = add.clone();
        queue.schedule_cancelable(move |control, hooks| {
            hooks.add(move || a("hook"));
            hooks_sender.send(hooks.clone()).ok();
            control.signal(ControlType::Continue);
        }).unwrap();
        assert_eq!(finished.recv().await, Some(false));

        let hooks = hooks_receiver.recv().await.unwrap();
        let a = add.clone();
        hooks.add(move || a("late hook"));

        queue.cancel();
        assert_eq!(finished.recv().await, Some(true));
        assert!(entries(&log).is_empty());
        assert!(!hooks.is_cancelled());
    }

    #[tokio::test]
    async fn test_schedule_after_cancel_is_rejected() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        queue.cancel();
        assert!(queue.schedule(|control| control.signal(ControlType::Continue)).is_err());

        assert_eq!(finished.recv().await, Some(true));
        assert!(queue.schedule(|control| control.signal(ControlType::Continue)).is_err());
        assert!(queue.schedule_future(|_| async { ControlType::Continue }).is_err());

        queue.start();
        assert_eq!(queue.state(), QueueState::Cancelled);
    }

    #[tokio::test]
    async fn test_schedule_future() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            queue.schedule_future(move |_hooks| async move {
                sleep(Duration::from_millis(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                ControlType::Continue
            }).unwrap();
        }

        assert_eq!(finished.recv().await, Some(false));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cooperative_cancellation_in_future() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        let (cancelled_sender, mut cancelled) = mpsc::unbounded_channel();

        queue.schedule_future(move |hooks| async move {
            while !hooks.is_cancelled() {
                sleep(Duration::from_millis(1)).await;
            }
            cancelled_sender.send(()).ok();
            ControlType::Continue
        }).unwrap();

        sleep(Duration::from_millis(10)).await;
        queue.cancel();
        assert_eq!(finished.recv().await, Some(true));
        assert_eq!(cancelled.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_dropped_control_stalls_queue() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new_started());
        let (sender, mut receiver) = mpsc::unbounded_channel();

        queue.schedule(|control| drop(control)).unwrap();
        queue.schedule(move |control| { sender.send(()).ok(); control.signal(ControlType::Continue); }).unwrap();

        assert!(timeout(Duration::from_millis(50), receiver.recv()).await.is_err());
        assert!(finished.try_recv().is_err());
        assert_eq!(queue.state(), QueueState::Running);
    }

    #[test]
    fn test_explicit_handle() {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let queue = OperationsQueue::new_started();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let s1 = sender.clone();
        queue.schedule_on(runtime.handle().clone(), move |control| { s1.send(1).ok(); control.signal(ControlType::Continue); }).unwrap();

        queue.set_default_handle(runtime.handle().clone());
        queue.schedule_cancelable(move |control, _hooks| { sender.send(2).ok(); control.signal(ControlType::Continue); }).unwrap();

        runtime.block_on(async {
            assert_eq!(receiver.recv().await, Some(1));
            assert_eq!(receiver.recv().await, Some(2));
        });
    }

    #[test]
    #[should_panic]
    fn test_dispatch_without_handle() {
        let queue = OperationsQueue::new_started();
        let _ = queue.schedule(|control| control.signal(ControlType::Continue));
    }

    #[test]
    fn test_cancel_without_handle_is_inline() {
        let (queue, mut finished) = recording_queue(OperationsQueue::new());
        queue.schedule(|control| control.signal(ControlType::Continue)).unwrap();

        queue.cancel();
        assert_eq!(queue.state(), QueueState::Cancelled);
        assert_eq!(finished.try_recv().ok(), Some(true));
    }
}
