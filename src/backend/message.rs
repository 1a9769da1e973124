//! Message-passing backend.
//!
//! Workers share no memory with the coordinator. For each band the
//! coordinator ships a [`BandRequest`] holding exactly the band's rows plus
//! halo, then gathers one [`WorkerReply`] per band and copies the owned rows
//! to their absolute offset. Any missing, failed, or malformed reply aborts the
//! whole run. A worker that never answers blocks the gather indefinitely.
use super::{Backend, Job};
use crate::diagnostics::{elapsed_ms, BandTiming};
use crate::error::FilterError;
use crate::image::PixelBuffer;
use crate::partition::Band;
use crate::transport::{self, channel_pair, ChannelTransport, StreamTransport, Transport};
use crate::worker::{BandRequest, WorkerReply};
use log::{debug, warn};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Instant;

/// Starts one worker per band and hands back the coordinator's end of its link.
pub trait WorkerLauncher: Send + Sync {
    fn name(&self) -> &'static str;
    fn launch(&self, band_index: usize) -> Result<RemoteWorker, FilterError>;
}

/// Coordinator-side handle to a running worker.
pub struct RemoteWorker {
    band_index: usize,
    link: Box<dyn Transport>,
    waiter: Waiter,
}

enum Waiter {
    Thread(JoinHandle<Result<usize, FilterError>>),
    Process(Child),
}

impl RemoteWorker {
    pub fn thread(
        band_index: usize,
        link: Box<dyn Transport>,
        handle: JoinHandle<Result<usize, FilterError>>,
    ) -> Self {
        Self {
            band_index,
            link,
            waiter: Waiter::Thread(handle),
        }
    }

    pub fn process(band_index: usize, link: Box<dyn Transport>, child: Child) -> Self {
        Self {
            band_index,
            link,
            waiter: Waiter::Process(child),
        }
    }

    /// Drop the link and wait for this worker, and only this worker, to exit.
    fn finish(self) -> Result<(), FilterError> {
        let RemoteWorker {
            band_index,
            mut link,
            waiter,
        } = self;
        link.close();
        drop(link);
        match waiter {
            Waiter::Thread(handle) => match handle.join() {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(FilterError::worker(band_index, e.to_string())),
                Err(_) => Err(FilterError::worker(band_index, "worker thread panicked")),
            },
            Waiter::Process(mut child) => {
                let status = child.wait().map_err(|e| {
                    FilterError::worker(band_index, format!("failed to wait for worker: {e}"))
                })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(FilterError::worker(
                        band_index,
                        format!("worker process exited with {status}"),
                    ))
                }
            }
        }
    }
}

pub type WorkerFn = fn(&mut ChannelTransport) -> Result<usize, FilterError>;

/// Workers as threads that only see the frames on their own channel.
#[derive(Clone, Copy)]
pub struct ThreadLauncher {
    worker_fn: WorkerFn,
}

impl Default for ThreadLauncher {
    fn default() -> Self {
        Self {
            worker_fn: transport::serve::<ChannelTransport>,
        }
    }
}

impl ThreadLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the worker body, e.g. to simulate a misbehaving worker.
    pub fn with_worker_fn(worker_fn: WorkerFn) -> Self {
        Self { worker_fn }
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn name(&self) -> &'static str {
        "message_passing"
    }

    fn launch(&self, band_index: usize) -> Result<RemoteWorker, FilterError> {
        let (coordinator_end, mut worker_end) = channel_pair();
        let worker_fn = self.worker_fn;
        let handle = std::thread::Builder::new()
            .name(format!("band-worker-{band_index}"))
            .spawn(move || worker_fn(&mut worker_end))
            .map_err(|e| FilterError::worker(band_index, format!("failed to spawn worker: {e}")))?;
        Ok(RemoteWorker::thread(
            band_index,
            Box::new(coordinator_end),
            handle,
        ))
    }
}

/// Workers as child processes running `<program> worker`, framed over stdio.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Re-launch the running executable in worker mode.
    pub fn current_exe() -> Result<Self, FilterError> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn name(&self) -> &'static str {
        "processes"
    }

    fn launch(&self, band_index: usize) -> Result<RemoteWorker, FilterError> {
        let mut child = Command::new(&self.program)
            .arg("worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                FilterError::worker(
                    band_index,
                    format!("failed to start {}: {e}", self.program.display()),
                )
            })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FilterError::worker(band_index, "worker stdio was not captured"));
        };
        debug!("processes: band {} -> pid {}", band_index, child.id());
        Ok(RemoteWorker::process(
            band_index,
            Box::new(StreamTransport::new(stdout, stdin)),
            child,
        ))
    }
}

pub struct MessagePassing<L: WorkerLauncher = ThreadLauncher> {
    launcher: L,
}

impl MessagePassing<ThreadLauncher> {
    pub fn in_process() -> Self {
        Self::new(ThreadLauncher::new())
    }
}

impl<L: WorkerLauncher> MessagePassing<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    fn exchange(
        &self,
        job: &Job<'_>,
        workers: &mut [RemoteWorker],
        output: &mut PixelBuffer,
    ) -> Result<Vec<BandTiming>, FilterError> {
        let bands = job.partition.bands();
        let mut started = Vec::with_capacity(bands.len());
        for (band, worker) in bands.iter().zip(workers.iter_mut()) {
            let request = BandRequest::from_buffer(job.source, band, job.kernel, job.policy);
            let frame = request.encode()?;
            started.push(Instant::now());
            worker
                .link
                .send(&frame)
                .map_err(|e| FilterError::worker(band.index, format!("send failed: {e}")))?;
        }
        debug!("{}: dispatched {} band requests", self.launcher.name(), bands.len());

        let mut timings = Vec::with_capacity(bands.len());
        for ((band, worker), start) in bands.iter().zip(workers.iter_mut()).zip(started) {
            let frame = worker
                .link
                .recv()
                .map_err(|e| FilterError::worker(band.index, format!("no reply: {e}")))?;
            let rows = match WorkerReply::decode(&frame, band.index)? {
                WorkerReply::Done(reply) => {
                    check_reply(band, output.row_bytes(), &reply)?;
                    reply.rows
                }
                WorkerReply::Failed { reason, .. } => {
                    return Err(FilterError::worker(band.index, reason))
                }
            };
            output
                .unpack_rows(band.start_row, &rows)
                .map_err(|e| FilterError::worker(band.index, e.to_string()))?;
            timings.push(BandTiming::new(band, elapsed_ms(start)));
        }
        Ok(timings)
    }
}

fn check_reply(
    band: &Band,
    row_bytes: usize,
    reply: &crate::worker::BandReply,
) -> Result<(), FilterError> {
    let expected_len = band.owned_row_count() * row_bytes;
    if reply.band_index != band.index
        || reply.start_row != band.start_row
        || reply.row_count != band.owned_row_count()
        || reply.rows.len() != expected_len
    {
        return Err(FilterError::worker(
            band.index,
            format!(
                "reply for band {} rows {}+{} ({} bytes) does not match rows {:?} ({} bytes)",
                reply.band_index,
                reply.start_row,
                reply.row_count,
                reply.rows.len(),
                band.owned_rows(),
                expected_len
            ),
        ));
    }
    Ok(())
}

/// Join every worker once; the first failure is returned after all are reaped.
fn shutdown(workers: Vec<RemoteWorker>) -> Result<(), FilterError> {
    let mut first_err = None;
    for worker in workers {
        if let Err(e) = worker.finish() {
            warn!("{e}");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl<L: WorkerLauncher> Backend for MessagePassing<L> {
    fn name(&self) -> &'static str {
        self.launcher.name()
    }

    fn execute(
        &self,
        job: &Job<'_>,
        output: &mut PixelBuffer,
    ) -> Result<Vec<BandTiming>, FilterError> {
        let bands = job.partition.bands();
        let mut workers = Vec::with_capacity(bands.len());
        for band in bands {
            match self.launcher.launch(band.index) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    let _ = shutdown(workers);
                    return Err(e);
                }
            }
        }

        let result = self.exchange(job, &mut workers, output);
        let reaped = shutdown(workers);
        match result {
            Ok(timings) => reaped.map(|_| timings),
            Err(e) => Err(e),
        }
    }
}
