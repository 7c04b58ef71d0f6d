//! In-order command queues.
//!
//! Each queue owns a thread that executes its commands one at a time in
//! enqueue order. A command first waits for its dependency events, which
//! may belong to any queue of the same context; if one of them failed the
//! command is skipped and its own event fails with `DependencyFailed`.
//!
//! Argument, range and bounds problems are reported when enqueuing.
//! Anything that goes wrong while executing is carried by the event.

use crate::context::ContextInner;
use crate::error::{Error, Result};
use crate::event::{CommandKind, Event};
use crate::kernel::{Kernel, NdRange};
use crate::memory::{DeviceBuffer, HostBuffer, Scalar};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

type Op = Box<dyn FnOnce(&ContextInner) -> Result<()> + Send + 'static>;

struct Command {
    event: Event,
    deps: Vec<Event>,
    op: Op,
}

pub struct CommandQueue {
    index: usize,
    sender: Option<Sender<Command>>,
    thread: Option<JoinHandle<()>>,
    ctx: Arc<ContextInner>,
}

fn serve(ctx: Arc<ContextInner>, commands: Receiver<Command>) {
    for command in commands.iter() {
        execute(&ctx, command);
    }
}

fn execute(ctx: &ContextInner, command: Command) {
    let Command { event, deps, op } = command;

    for dep in &deps {
        if let Err(e) = dep.wait() {
            trace!(event = ?event.id(), dependency = ?dep.id(), "skipping command");
            event.fail(Error::DependencyFailed(format!(
                "{:?} command {:?} failed: {}",
                dep.kind(),
                dep.id(),
                e
            )));
            ctx.metrics.record_command(event.kind(), 0, false);
            return;
        }
    }

    event.start();
    let result = catch_unwind(AssertUnwindSafe(|| op(ctx)))
        .unwrap_or_else(|_| Err(Error::execution("command panicked")));

    match result {
        Ok(()) => event.complete(),
        Err(e) => {
            debug!(event = ?event.id(), kind = ?event.kind(), error = %e, "command failed");
            event.fail(e);
        }
    }

    let duration_ns = event
        .profile()
        .duration()
        .map_or(0, |d| d.as_nanos() as u64);
    ctx.metrics
        .record_command(event.kind(), duration_ns, event.is_complete());
}

impl CommandQueue {
    pub(crate) fn new(ctx: Arc<ContextInner>, index: usize) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let serve_ctx = Arc::clone(&ctx);

        let thread = thread::Builder::new()
            .name(format!("offload-queue-{}", index))
            .spawn(move || serve(serve_ctx, receiver))
            .map_err(|e| Error::execution(format!("failed to spawn queue thread: {}", e)))?;

        Ok(Self {
            index,
            sender: Some(sender),
            thread: Some(thread),
            ctx,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn submit(&self, kind: CommandKind, deps: &[Event], op: Op) -> Result<Event> {
        let sender = self.sender.as_ref().ok_or(Error::QueueClosed)?;
        let event = Event::new(kind);
        sender
            .send(Command {
                event: event.clone(),
                deps: deps.to_vec(),
                op,
            })
            .map_err(|_| Error::QueueClosed)?;
        trace!(queue = self.index, event = ?event.id(), ?kind, "enqueued");
        Ok(event)
    }

    fn maybe_block(event: Event, blocking: bool) -> Result<Event> {
        if blocking {
            event.wait()?;
        }
        Ok(event)
    }

    /// Copy `data` into `buffer` starting at element `offset`.
    ///
    /// The data is captured at enqueue time, so the caller may reuse its
    /// slice immediately even for a non-blocking write.
    pub fn enqueue_write<T: Scalar>(
        &self,
        buffer: &DeviceBuffer<T>,
        blocking: bool,
        offset: usize,
        data: &[T],
        deps: &[Event],
    ) -> Result<Event> {
        buffer.check_region(offset, data.len())?;

        let buffer = buffer.clone();
        let data = data.to_vec();
        let event = self.submit(
            CommandKind::Write,
            deps,
            Box::new(move |ctx| {
                buffer.write_from(offset, &data)?;
                ctx.metrics.record_upload(std::mem::size_of_val(data.as_slice()));
                Ok(())
            }),
        )?;
        Self::maybe_block(event, blocking)
    }

    /// Set `len` elements of `buffer` from `offset` to `value`.
    pub fn enqueue_fill<T: Scalar>(
        &self,
        buffer: &DeviceBuffer<T>,
        value: T,
        offset: usize,
        len: usize,
        deps: &[Event],
    ) -> Result<Event> {
        buffer.check_region(offset, len)?;

        let buffer = buffer.clone();
        self.submit(
            CommandKind::Fill,
            deps,
            Box::new(move |_| buffer.fill(offset, len, value)),
        )
    }

    /// Launch `kernel` over `range` with the arguments it has right now.
    pub fn enqueue_nd_range(&self, kernel: &Kernel, range: NdRange, deps: &[Event]) -> Result<Event> {
        range.validate(self.ctx.selection.device.max_work_group_size)?;
        let args = Arc::new(kernel.bind()?);
        let body = Arc::clone(kernel.body());

        self.submit(
            CommandKind::NdRange,
            deps,
            Box::new(move |ctx| ctx.pool.run_nd_range(body, args, range)),
        )
    }

    /// Copy `len` elements of `buffer` from `offset` into `dst` at `dst_offset`.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_read<T: Scalar>(
        &self,
        buffer: &DeviceBuffer<T>,
        blocking: bool,
        offset: usize,
        len: usize,
        dst: &HostBuffer<T>,
        dst_offset: usize,
        deps: &[Event],
    ) -> Result<Event> {
        buffer.check_region(offset, len)?;
        dst.check_region(dst_offset, len)?;

        let buffer = buffer.clone();
        let dst = dst.clone();
        let event = self.submit(
            CommandKind::Read,
            deps,
            Box::new(move |ctx| {
                let data = buffer.read(offset, len)?;
                dst.write_from(dst_offset, &data)?;
                ctx.metrics.record_download(std::mem::size_of_val(data.as_slice()));
                Ok(())
            }),
        )?;
        Self::maybe_block(event, blocking)
    }

    /// Blocking read of a region into a fresh vector.
    pub fn read_to_vec<T: Scalar>(
        &self,
        buffer: &DeviceBuffer<T>,
        offset: usize,
        len: usize,
        deps: &[Event],
    ) -> Result<Vec<T>> {
        let dst = HostBuffer::new(len);
        self.enqueue_read(buffer, true, offset, len, &dst, 0, deps)?;
        Ok(dst.to_vec())
    }

    /// An event that completes once `deps` and every earlier command have.
    pub fn enqueue_marker(&self, deps: &[Event]) -> Result<Event> {
        self.submit(CommandKind::Marker, deps, Box::new(|_| Ok(())))
    }

    /// Commands are handed to the queue thread as they are enqueued, so
    /// there is nothing to flush.
    pub fn flush(&self) -> Result<()> {
        if self.sender.is_none() {
            return Err(Error::QueueClosed);
        }
        Ok(())
    }

    /// Block until every command enqueued so far has finished.
    ///
    /// Failures of individual commands stay on their events.
    pub fn finish(&self) -> Result<()> {
        let marker = self.enqueue_marker(&[])?;
        let _ = marker.wait();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn close(&mut self) {
        self.sender.take();
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        // closing the channel lets the thread drain what is left and exit
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("index", &self.index)
            .field("open", &self.sender.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::event::EventStatus;
    use crate::kernels;
    use crate::memory::MemFlags;

    fn context() -> Context {
        let config = Config::builder().compute_units(2).build().unwrap();
        Context::host(&config).unwrap()
    }

    #[test]
    fn test_write_read_roundtrip() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let buf = ctx.create_buffer::<i32>(8, MemFlags::ReadWrite);

        let w = queue.enqueue_write(&buf, false, 2, &[1, 2, 3], &[]).unwrap();
        let out = queue.read_to_vec(&buf, 0, 8, &[w]).unwrap();
        assert_eq!(out, vec![0, 0, 1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn test_bounds_checked_at_enqueue() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let buf = ctx.create_buffer::<i32>(4, MemFlags::ReadWrite);
        assert!(matches!(
            queue.enqueue_write(&buf, false, 3, &[1, 2], &[]),
            Err(Error::OutOfBounds { .. })
        ));
        let dst = HostBuffer::new(2);
        assert!(queue.enqueue_read(&buf, false, 0, 4, &dst, 0, &[]).is_err());
    }

    #[test]
    fn test_vecadd_launch() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let program = ctx.build_program(kernels::VECADD_SOURCE, "").unwrap();
        let mut kernel = program.kernel("vecadd").unwrap();

        let a = ctx.create_buffer_from(&[1, 2, 3, 4, 5], MemFlags::ReadOnly);
        let b = ctx.create_buffer_from(&[10, 20, 30, 40, 50], MemFlags::ReadOnly);
        let c = ctx.create_buffer::<i32>(5, MemFlags::WriteOnly);
        kernel.set_arg(0, &a).unwrap();
        kernel.set_arg(1, &b).unwrap();
        kernel.set_arg(2, &c).unwrap();

        let run = queue
            .enqueue_nd_range(&kernel, NdRange::linear(5).with_local([2, 1, 1]), &[])
            .unwrap();
        let out = queue.read_to_vec(&c, 0, 5, &[run]).unwrap();
        assert_eq!(out, vec![11, 22, 33, 44, 55]);
    }

    #[test]
    fn test_unset_argument_rejected_at_enqueue() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let program = ctx.build_program(kernels::VECADD_SOURCE, "").unwrap();
        let kernel = program.kernel("vecadd").unwrap();
        assert!(matches!(
            queue.enqueue_nd_range(&kernel, NdRange::linear(4), &[]),
            Err(Error::MissingArg { index: 0, .. })
        ));
    }

    #[test]
    fn test_oversized_work_group_rejected() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let program = ctx.build_program(kernels::MULTI_QUEUE_SOURCE, "").unwrap();
        let mut kernel = program.kernel("vector_operation").unwrap();
        let buf = ctx.create_buffer::<i32>(4096, MemFlags::ReadWrite);
        kernel.set_arg(0, &buf).unwrap();
        kernel.set_arg(1, &buf).unwrap();
        let range = NdRange::linear(4096).with_local([4096, 1, 1]);
        assert!(matches!(
            queue.enqueue_nd_range(&kernel, range, &[]),
            Err(Error::InvalidNdRange(_))
        ));
    }

    #[test]
    fn test_failed_dependency_skips_command() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let buf = ctx.create_buffer::<i32>(4, MemFlags::ReadWrite);

        let failed = Event::new(CommandKind::Write);
        failed.fail(Error::execution("upload lost"));

        let fill = queue.enqueue_fill(&buf, 7, 0, 4, &[failed]).unwrap();
        queue.finish().unwrap();

        assert!(matches!(
            fill.status(),
            EventStatus::Failed(Error::DependencyFailed(_))
        ));
        assert_eq!(buf.to_vec(), vec![0; 4]);
        #[cfg(feature = "telemetry")]
        assert_eq!(ctx.metrics().commands_failed(), 1);
    }

    #[test]
    fn test_blocking_write_returns_completed_event() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let buf = ctx.create_buffer::<f32>(2, MemFlags::ReadWrite);
        let ev = queue.enqueue_write(&buf, true, 0, &[1.5, 2.5], &[]).unwrap();
        assert!(ev.is_complete());
        assert_eq!(buf.to_vec(), vec![1.5, 2.5]);
    }

    #[test]
    fn test_cross_queue_dependency() {
        let ctx = context();
        let q0 = ctx.create_queue().unwrap();
        let q1 = ctx.create_queue().unwrap();
        let buf = ctx.create_buffer::<u32>(3, MemFlags::ReadWrite);

        let fill = q0.enqueue_fill(&buf, 9, 0, 3, &[]).unwrap();
        let out = q1.read_to_vec(&buf, 0, 3, &[fill]).unwrap();
        assert_eq!(out, vec![9, 9, 9]);
    }

    #[test]
    fn test_finish_and_flush() {
        let ctx = context();
        let queue = ctx.create_queue().unwrap();
        let buf = ctx.create_buffer::<i32>(1024, MemFlags::ReadWrite);
        let events: Vec<Event> = (0..16)
            .map(|i| queue.enqueue_fill(&buf, i, 0, 1024, &[]).unwrap())
            .collect();
        assert!(queue.flush().is_ok());
        queue.finish().unwrap();
        assert!(events.iter().all(Event::is_complete));
        // in-order: the last fill wins
        assert_eq!(buf.get(0), 15);
    }
}
