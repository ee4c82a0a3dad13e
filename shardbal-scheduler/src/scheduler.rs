//! Balancer Commands Scheduler
//!
//! Turns balancer decisions into remote commands against shards:
//! - `submit` enqueues a serialized command and returns a response handle
//! - a single worker task persists, locks, dispatches and cleans up,
//!   strictly one command at a time in arrival order
//! - persisted recovery records are replayed verbatim on `start`
//!
//! Per command the worker runs:
//!
//! ```text
//! dequeue ─► [stop raised?] ─► persist ─► lock (structural kinds only)
//!        ─► dispatch ─► release lock ─► delete record ─► resolve handle
//! ```
//!
//! The lock is released and the record deleted before the handle is
//! resolved, so a caller that observed an outcome also observes the cleanup.
//!
//! A command that is persisted but not yet dispatched when the scheduler
//! stops keeps its record: its caller sees `Canceled`, and the command is
//! replayed on the next `start`.

use crate::config::SchedulerConfig;
use crate::dispatch::{CommandDispatcher, RemoteCommandTransport, ShardTargeter};
use crate::lock::DistLockManager;
use crate::response::{response_channel, CommandOutcome, ResponseHandle, ResponseResolver};
use parking_lot::Mutex;
use shardbal_core::chunk::{ChunkInfo, ChunkRange, ChunkVersion, Document, KeyPattern};
use shardbal_core::command::{
    CommandDescriptor, CommandInfo, DataSizeCommandInfo, MergeChunksCommandInfo,
    MoveChunkCommandInfo, MoveChunkSettings, SplitChunkCommandInfo, SplitVectorCommandInfo,
    SplitVectorSettings,
};
use shardbal_core::error::BalancerError;
use shardbal_core::types::{Namespace, RequestId, ShardId};
use shardbal_storage::CommandStore;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// Steps at which the worker can be parked for maintenance or tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPausePoint {
    /// After dequeue, before the recovery record is written
    BeforePersist,
    /// After the recovery record is written, before lock and dispatch
    AfterPersist,
}

#[derive(Debug, PartialEq, Eq)]
enum Gate {
    Proceed,
    Stop,
}

/// A command waiting for, or being handled by, the worker
struct QueuedCommand {
    descriptor: CommandDescriptor,
    /// None for commands replayed from the store
    resolver: Option<ResponseResolver>,
    persisted: bool,
}

impl QueuedCommand {
    fn resolve(self, outcome: CommandOutcome) {
        if let Some(resolver) = self.resolver {
            resolver.resolve(outcome);
        }
    }
}

/// State shared between `submit` and the lifecycle calls
struct SchedulerShared {
    state: SchedulerState,
    queue: Option<mpsc::UnboundedSender<QueuedCommand>>,
}

struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Everything the worker task owns
#[derive(Clone)]
struct WorkerContext {
    store: Arc<dyn CommandStore>,
    lock_manager: Arc<dyn DistLockManager>,
    dispatcher: Arc<CommandDispatcher>,
    lock_timeout: Duration,
    lock_reason_prefix: String,
    pause_rx: watch::Receiver<Option<WorkerPausePoint>>,
}

impl WorkerContext {
    async fn run(
        self,
        mut queue: mpsc::UnboundedReceiver<QueuedCommand>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut recovered = self.recover().await;
        info!(recovered = recovered.len(), "Balancer scheduler worker started");

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let command = match recovered.pop_front() {
                Some(command) => command,
                None => tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    next = queue.recv() => match next {
                        Some(command) => command,
                        None => break,
                    },
                },
            };

            self.process(command, &mut stop_rx).await;
        }

        self.drain(recovered, queue);
        info!("Balancer scheduler worker exited");
    }

    /// Load surviving recovery records as already-persisted commands
    async fn recover(&self) -> VecDeque<QueuedCommand> {
        let records = match self.store.scan_all().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to scan persisted balancer commands");
                return VecDeque::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| match CommandDescriptor::from_record(&record) {
                Ok(descriptor) => {
                    info!(
                        request_id = %descriptor.request_id(),
                        kind = %descriptor.kind(),
                        namespace = %descriptor.namespace(),
                        "Recovering persisted balancer command"
                    );
                    Some(QueuedCommand {
                        descriptor,
                        resolver: None,
                        persisted: true,
                    })
                }
                Err(e) => {
                    error!(
                        request_id = %record.request_id,
                        error = %e,
                        "Skipping unreadable persisted balancer command"
                    );
                    None
                }
            })
            .collect()
    }

    #[instrument(
        skip_all,
        fields(
            request_id = %command.descriptor.request_id(),
            kind = %command.descriptor.kind(),
            namespace = %command.descriptor.namespace(),
        )
    )]
    async fn process(&self, mut command: QueuedCommand, stop_rx: &mut watch::Receiver<bool>) {
        let gate = self
            .pause_gate(WorkerPausePoint::BeforePersist, stop_rx)
            .await;
        if gate == Gate::Stop || *stop_rx.borrow() {
            self.abandon(command);
            return;
        }

        if !command.persisted {
            if let Err(e) = self.store.insert(command.descriptor.to_record()).await {
                error!(error = %e, "Failed to persist balancer command");
                command.resolve(Err(e));
                return;
            }
            command.persisted = true;
        }

        if self.pause_gate(WorkerPausePoint::AfterPersist, stop_rx).await == Gate::Stop {
            self.abandon(command);
            return;
        }

        let outcome = self.execute(&command.descriptor).await;
        command.resolve(outcome);
    }

    /// Lock, dispatch, unlock and delete the record of a persisted command
    async fn execute(&self, descriptor: &CommandDescriptor) -> CommandOutcome {
        let lock = if descriptor.requires_distributed_lock() {
            let why = format!(
                "{} {} request {}",
                self.lock_reason_prefix,
                descriptor.kind(),
                descriptor.request_id()
            );
            match self
                .lock_manager
                .try_lock(&descriptor.namespace().ns(), &why, self.lock_timeout)
                .await
            {
                Ok(lock) => Some(lock),
                Err(e) => {
                    warn!(error = %e, "Could not acquire dist lock, command not dispatched");
                    return self.finish(descriptor, Err(e)).await;
                }
            }
        } else {
            None
        };

        let outcome = self.dispatcher.dispatch(descriptor).await;

        if let Some(lock) = lock {
            if let Err(e) = self.lock_manager.unlock(lock).await {
                error!(error = %e, "Failed to release dist lock");
            }
        }

        self.finish(descriptor, outcome).await
    }

    /// Delete the recovery record; a failed delete fails the command
    async fn finish(
        &self,
        descriptor: &CommandDescriptor,
        outcome: CommandOutcome,
    ) -> CommandOutcome {
        if let Err(e) = self.store.delete(descriptor.request_id()).await {
            error!(error = %e, "Failed to delete persisted balancer command");
            return Err(e);
        }

        match &outcome {
            Ok(_) => info!("Balancer command completed"),
            Err(e) => warn!(error = %e, "Balancer command failed"),
        }
        outcome
    }

    /// Park while the worker is paused at `point`; report whether stop arrived
    async fn pause_gate(
        &self,
        point: WorkerPausePoint,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Gate {
        let mut pause_rx = self.pause_rx.clone();

        loop {
            if *pause_rx.borrow() != Some(point) {
                return Gate::Proceed;
            }
            if *stop_rx.borrow() {
                return Gate::Stop;
            }

            debug!(?point, "Balancer worker paused");
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        return Gate::Stop;
                    }
                }
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        return Gate::Proceed;
                    }
                }
            }
        }
    }

    /// Give up on a command because the scheduler is stopping
    fn abandon(&self, command: QueuedCommand) {
        if command.persisted {
            info!(
                request_id = %command.descriptor.request_id(),
                "Balancer command left persisted for recovery"
            );
        } else {
            debug!(
                request_id = %command.descriptor.request_id(),
                "Balancer command canceled before persistence"
            );
        }
        command.resolve(Err(BalancerError::Canceled));
    }

    fn drain(
        &self,
        recovered: VecDeque<QueuedCommand>,
        mut queue: mpsc::UnboundedReceiver<QueuedCommand>,
    ) {
        queue.close();

        let mut abandoned = 0usize;
        let pending = recovered
            .into_iter()
            .chain(std::iter::from_fn(|| queue.try_recv().ok()));
        for command in pending {
            self.abandon(command);
            abandoned += 1;
        }

        if abandoned > 0 {
            info!(abandoned, "Drained balancer command queue");
        }
    }
}

/// Schedules balancer commands against shards on a dedicated worker
pub struct BalancerCommandsScheduler {
    context: WorkerContext,
    shared: Mutex<SchedulerShared>,
    worker: tokio::sync::Mutex<Option<WorkerHandle>>,
    pause_tx: watch::Sender<Option<WorkerPausePoint>>,
}

impl BalancerCommandsScheduler {
    /// Create a scheduler; nothing runs until `start`
    pub fn new(
        config: &SchedulerConfig,
        store: Arc<dyn CommandStore>,
        lock_manager: Arc<dyn DistLockManager>,
        targeter: Arc<dyn ShardTargeter>,
        transport: Arc<dyn RemoteCommandTransport>,
    ) -> Self {
        let (pause_tx, pause_rx) = watch::channel(None);
        let dispatcher = CommandDispatcher::new(targeter, transport, config.dispatch_timeout());

        Self {
            context: WorkerContext {
                store,
                lock_manager,
                dispatcher: Arc::new(dispatcher),
                lock_timeout: config.lock_timeout(),
                lock_reason_prefix: config.lock_reason_prefix.clone(),
                pause_rx,
            },
            shared: Mutex::new(SchedulerShared {
                state: SchedulerState::NotStarted,
                queue: None,
            }),
            worker: tokio::sync::Mutex::new(None),
            pause_tx,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    /// Start the worker and replay persisted commands; no-op when running
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            debug!("Balancer scheduler already running");
            return;
        }

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        {
            let mut shared = self.shared.lock();
            shared.state = SchedulerState::Running;
            shared.queue = Some(queue_tx);
        }

        let context = self.context.clone();
        let join = tokio::spawn(context.run(queue_rx, stop_rx));
        *worker = Some(WorkerHandle { stop_tx, join });

        info!("Balancer scheduler started");
    }

    /// Stop accepting commands, cancel queued ones and wait for the worker
    ///
    /// A command whose dispatch is in flight runs to completion first.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(handle) = worker.take() else {
            debug!("Balancer scheduler not running");
            return;
        };

        info!("Stopping balancer scheduler");
        {
            // Stop is raised before the queue closes so that no buffered
            // command is dispatched after this point
            let mut shared = self.shared.lock();
            handle.stop_tx.send_replace(true);
            shared.state = SchedulerState::Stopping;
            shared.queue = None;
        }

        if let Err(e) = handle.join.await {
            error!(error = %e, "Balancer scheduler worker panicked");
        }

        self.shared.lock().state = SchedulerState::Stopped;
        info!("Balancer scheduler stopped");
    }

    /// Park the worker at `point` until `resume_worker` or `stop`
    pub fn pause_worker(&self, point: WorkerPausePoint) {
        info!(?point, "Pausing balancer worker");
        self.pause_tx.send_replace(Some(point));
    }

    pub fn resume_worker(&self) {
        info!("Resuming balancer worker");
        self.pause_tx.send_replace(None);
    }

    /// Enqueue a command; never blocks
    pub fn submit(&self, info: CommandInfo) -> ResponseHandle {
        let request_id = RequestId::new();
        let (resolver, handle) = response_channel(request_id, info.kind());
        let descriptor = CommandDescriptor::new(request_id, &info);

        let shared = self.shared.lock();
        let queue = match (shared.state, shared.queue.as_ref()) {
            (SchedulerState::Running, Some(queue)) => queue,
            (state, _) => {
                debug!(?state, kind = %info.kind(), "Rejecting balancer command");
                resolver.resolve(Err(BalancerError::Rejected));
                return handle;
            }
        };

        let descriptor = match descriptor {
            Ok(descriptor) => descriptor,
            Err(e) => {
                error!(error = %e, kind = %info.kind(), "Failed to serialize balancer command");
                resolver.resolve(Err(e));
                return handle;
            }
        };

        debug!(
            request_id = %request_id,
            kind = %info.kind(),
            namespace = %info.namespace(),
            target = %info.target(),
            "Balancer command enqueued"
        );

        let command = QueuedCommand {
            descriptor,
            resolver: Some(resolver),
            persisted: false,
        };
        if let Err(mpsc::error::SendError(command)) = queue.send(command) {
            command.resolve(Err(BalancerError::Rejected));
        }

        handle
    }

    /// Move `chunk` from its current shard to `to_shard`
    pub fn request_move_chunk(
        &self,
        nss: &Namespace,
        chunk: &ChunkInfo,
        to_shard: ShardId,
        settings: MoveChunkSettings,
    ) -> ResponseHandle {
        self.submit(CommandInfo::MoveChunk(MoveChunkCommandInfo {
            nss: nss.clone(),
            from_shard: chunk.shard.clone(),
            to_shard,
            range: chunk.range.clone(),
            version: chunk.version,
            settings,
        }))
    }

    /// Merge the contiguous chunks covering `range` on `shard`
    pub fn request_merge_chunks(
        &self,
        nss: &Namespace,
        shard: &ShardId,
        range: ChunkRange,
        version: ChunkVersion,
    ) -> ResponseHandle {
        self.submit(CommandInfo::MergeChunks(MergeChunksCommandInfo {
            nss: nss.clone(),
            shard: shard.clone(),
            range,
            version,
        }))
    }

    /// Split `chunk` at the given points
    pub fn request_split_chunk(
        &self,
        nss: &Namespace,
        chunk: &ChunkInfo,
        key_pattern: KeyPattern,
        split_points: Vec<Document>,
    ) -> ResponseHandle {
        self.submit(CommandInfo::SplitChunk(SplitChunkCommandInfo {
            nss: nss.clone(),
            shard: chunk.shard.clone(),
            range: chunk.range.clone(),
            version: chunk.version,
            key_pattern,
            split_points,
        }))
    }

    /// Ask the owning shard for split points of `chunk`
    pub fn request_split_vector(
        &self,
        nss: &Namespace,
        chunk: &ChunkInfo,
        key_pattern: KeyPattern,
        settings: SplitVectorSettings,
    ) -> ResponseHandle {
        self.submit(CommandInfo::SplitVector(SplitVectorCommandInfo {
            nss: nss.clone(),
            shard: chunk.shard.clone(),
            range: chunk.range.clone(),
            key_pattern,
            settings,
        }))
    }

    /// Measure the size and document count of `range` on `shard`
    pub fn request_data_size(
        &self,
        nss: &Namespace,
        shard: &ShardId,
        range: ChunkRange,
        version: ChunkVersion,
        key_pattern: KeyPattern,
        estimated_value: bool,
    ) -> ResponseHandle {
        self.submit(CommandInfo::DataSize(DataSizeCommandInfo {
            nss: nss.clone(),
            shard: shard.clone(),
            range,
            version,
            key_pattern,
            estimated_value,
        }))
    }
}
