//! Fixed-size worker pool and range schedulers for fan-out parallelism.
//!
//! A fan-out partitions an index range `[0, nwork)` across `nthreads` job
//! bodies under one of three disciplines (single, static-strided, dynamic
//! with guided chunk sizing) and joins them through a one-shot latch. Jobs
//! run on a lazily created process-wide pool of OS threads; each worker owns
//! a one-slot work register and the pool keeps a shared overflow queue for
//! bursts that find every worker busy.
//!
//! Panics inside a job body never kill a worker: the fan-out wrapper catches
//! them and exactly one captured panic resumes on the caller after the join.

#[cfg(feature = "parallel")]
pub use self::imp::*;
#[cfg(not(feature = "parallel"))]
pub use self::serial::*;

/// Raw pointer wrapper that is `Send` + `Sync`.
///
/// # Safety
/// The caller must guarantee that the pointed-to data outlives the fan-out
/// and that concurrent jobs touch disjoint regions.
pub(crate) struct SendPtr<T>(pub(crate) *mut T);

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPtr<T> {}

unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    #[inline]
    pub(crate) fn as_ptr(self) -> *mut T {
        self.0
    }
}

#[cfg(feature = "parallel")]
mod imp {
    use std::any::Any;
    use std::collections::VecDeque;
    use std::ops::Range;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Condvar, Mutex};
    use std::thread;

    use log::debug;
    use once_cell::sync::Lazy;

    use crate::{AlmError, Result};

    // ========================================================================
    // Thread-count knobs
    // ========================================================================

    static MAX_THREADS: Lazy<usize> =
        Lazy::new(|| thread::available_parallelism().map_or(1, |n| n.get()));

    static DEFAULT_NTHREADS: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(*MAX_THREADS));

    /// Detected hardware concurrency, at least 1. Snapshot taken once per
    /// process.
    pub fn max_threads() -> usize {
        *MAX_THREADS
    }

    /// Thread count used by fan-outs that pass `nthreads == 0`.
    pub fn default_nthreads() -> usize {
        DEFAULT_NTHREADS.load(Ordering::Relaxed)
    }

    /// Set the process-wide default thread count; clamped to at least 1.
    pub fn set_default_nthreads(nthreads: usize) {
        DEFAULT_NTHREADS.store(nthreads.max(1), Ordering::Relaxed);
    }

    #[inline]
    fn resolve_nthreads(nthreads: usize) -> usize {
        if nthreads == 0 {
            default_nthreads()
        } else {
            nthreads
        }
    }

    // ========================================================================
    // Latch
    // ========================================================================

    /// One-shot countdown synchronizer joining a fan-out.
    pub(crate) struct Latch {
        remaining: Mutex<usize>,
        completed: Condvar,
    }

    impl Latch {
        pub(crate) fn new(n: usize) -> Self {
            Self {
                remaining: Mutex::new(n),
                completed: Condvar::new(),
            }
        }

        pub(crate) fn count_down(&self) {
            let mut rem = self.remaining.lock().unwrap();
            *rem -= 1;
            if *rem == 0 {
                self.completed.notify_all();
            }
        }

        pub(crate) fn wait(&self) {
            let mut rem = self.remaining.lock().unwrap();
            while *rem > 0 {
                rem = self.completed.wait(rem).unwrap();
            }
        }
    }

    // ========================================================================
    // Worker pool
    // ========================================================================

    type Work = Box<dyn FnOnce() + Send + 'static>;

    /// Overflow queue with an atomic size fast path so idle workers can poll
    /// it without taking the lock.
    struct ConcurrentQueue {
        q: Mutex<VecDeque<Work>>,
        size: AtomicUsize,
    }

    impl ConcurrentQueue {
        fn new() -> Self {
            Self {
                q: Mutex::new(VecDeque::new()),
                size: AtomicUsize::new(0),
            }
        }

        fn push(&self, work: Work) {
            self.size.fetch_add(1, Ordering::AcqRel);
            self.q.lock().unwrap().push_back(work);
        }

        fn try_pop(&self) -> Option<Work> {
            if self.size.load(Ordering::Acquire) == 0 {
                return None;
            }
            let mut q = self.q.lock().unwrap();
            // the queue may have been emptied while we acquired the lock
            let work = q.pop_front()?;
            self.size.fetch_sub(1, Ordering::AcqRel);
            Some(work)
        }
    }

    /// Per-worker state: a one-slot work register behind a private mutex and
    /// condvar, plus the busy flag the submitter claims workers through.
    struct WorkerSlot {
        work: Mutex<Option<Work>>,
        ready: Condvar,
        busy: AtomicBool,
    }

    impl WorkerSlot {
        fn new() -> Self {
            Self {
                work: Mutex::new(None),
                ready: Condvar::new(),
                busy: AtomicBool::new(false),
            }
        }

        fn main_loop(&self, shutdown: &AtomicBool, overflow: &ConcurrentQueue) {
            while !shutdown.load(Ordering::Acquire) {
                let local = {
                    let mut work = self.work.lock().unwrap();
                    work = self
                        .ready
                        .wait_while(work, |w| {
                            w.is_none() && !shutdown.load(Ordering::Acquire)
                        })
                        .unwrap();
                    work.take()
                };

                if let Some(job) = local {
                    job();
                }

                // run whatever queued up while we were busy
                while let Some(job) = overflow.try_pop() {
                    job();
                }

                // mark ourselves available before going back to sleep
                self.busy.store(false, Ordering::Release);
            }
        }
    }

    struct WorkerHandle {
        slot: Arc<WorkerSlot>,
        thread: thread::JoinHandle<()>,
    }

    struct PoolInner {
        nthreads: usize,
        workers: Vec<WorkerHandle>,
    }

    /// Fixed-size pool of OS threads with idle-first dispatch and an
    /// overflow queue.
    pub(crate) struct ThreadPool {
        inner: Mutex<PoolInner>,
        shutdown: Arc<AtomicBool>,
        overflow: Arc<ConcurrentQueue>,
    }

    impl ThreadPool {
        pub(crate) fn new(nthreads: usize) -> Self {
            let nthreads = nthreads.max(1);
            let pool = Self {
                inner: Mutex::new(PoolInner {
                    nthreads,
                    workers: Vec::new(),
                }),
                shutdown: Arc::new(AtomicBool::new(false)),
                overflow: Arc::new(ConcurrentQueue::new()),
            };
            {
                let mut inner = pool.inner.lock().unwrap();
                Self::spawn_workers(&mut inner, &pool.shutdown, &pool.overflow);
            }
            pool
        }

        fn spawn_workers(
            inner: &mut PoolInner,
            shutdown: &Arc<AtomicBool>,
            overflow: &Arc<ConcurrentQueue>,
        ) {
            debug!("starting worker pool with {} threads", inner.nthreads);
            for _ in 0..inner.nthreads {
                let slot = Arc::new(WorkerSlot::new());
                let worker_slot = Arc::clone(&slot);
                let shutdown = Arc::clone(shutdown);
                let overflow = Arc::clone(overflow);
                let thread =
                    thread::spawn(move || worker_slot.main_loop(&shutdown, &overflow));
                inner.workers.push(WorkerHandle { slot, thread });
            }
        }

        /// Hand `work` to an idle worker, or park it on the overflow queue.
        ///
        /// Fails fast when the pool has been shut down.
        pub(crate) fn submit(&self, work: Work) -> Result<()> {
            let inner = self.inner.lock().unwrap();
            if self.shutdown.load(Ordering::Acquire) {
                return Err(AlmError::PoolShutDown);
            }

            let mut work = Some(work);
            if Self::submit_to_idle(&inner, &mut work) {
                return Ok(());
            }
            if let Some(w) = work.take() {
                self.overflow.push(w);
            }

            // Every worker may have gone idle between the scan above and the
            // queue push, leaving nobody to drain the queue. Close the race
            // by waking any now-idle worker with a no-op.
            let mut wakeup: Option<Work> = Some(Box::new(|| {}));
            Self::submit_to_idle(&inner, &mut wakeup);
            Ok(())
        }

        fn submit_to_idle(inner: &PoolInner, work: &mut Option<Work>) -> bool {
            for worker in &inner.workers {
                if !worker.slot.busy.swap(true, Ordering::AcqRel) {
                    *worker.slot.work.lock().unwrap() = work.take();
                    worker.slot.ready.notify_one();
                    return true;
                }
            }
            false
        }

        /// Stop accepting work, wake every worker and join them. Work already
        /// submitted still runs to completion before the workers exit.
        pub(crate) fn shutdown(&self) {
            let mut inner = self.inner.lock().unwrap();
            if inner.workers.is_empty() {
                return;
            }
            debug!("shutting down worker pool");
            self.shutdown.store(true, Ordering::Release);
            for worker in &inner.workers {
                worker.slot.ready.notify_all();
            }
            for worker in inner.workers.drain(..) {
                let _ = worker.thread.join();
            }
        }

        /// Relaunch workers with the construction-time cardinality. Used to
        /// recover the process-wide pool on the child side of `fork()`.
        pub(crate) fn restart(&self) {
            let mut inner = self.inner.lock().unwrap();
            if !inner.workers.is_empty() {
                return;
            }
            debug!("restarting worker pool");
            self.shutdown.store(false, Ordering::Release);
            Self::spawn_workers(&mut inner, &self.shutdown, &self.overflow);
        }
    }

    impl Drop for ThreadPool {
        fn drop(&mut self) {
            self.shutdown();
        }
    }

    static POOL: Lazy<ThreadPool> = Lazy::new(|| ThreadPool::new(max_threads()));

    /// The process-wide pool, created on first use and never reclaimed.
    fn get_pool() -> &'static ThreadPool {
        #[cfg(unix)]
        {
            static FORK_HOOKS: std::sync::Once = std::sync::Once::new();
            FORK_HOOKS.call_once(|| unsafe {
                libc::pthread_atfork(Some(fork_prepare), Some(fork_resume), Some(fork_resume));
            });
        }
        &POOL
    }

    #[cfg(unix)]
    extern "C" fn fork_prepare() {
        POOL.shutdown();
    }

    #[cfg(unix)]
    extern "C" fn fork_resume() {
        POOL.restart();
    }

    // ========================================================================
    // Distribution and scheduler handle
    // ========================================================================

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    enum SchedMode {
        Single,
        Static,
        Dynamic,
    }

    /// One fan-out: the partitioning of `[0, nwork)` across `nthreads`
    /// workers under a scheduling discipline.
    struct Distribution {
        nthreads: usize,
        nwork: usize,
        chunksize: usize,
        fact_max: f64,
        mode: SchedMode,
        single_served: AtomicBool,
        cur: Mutex<usize>,
    }

    impl Distribution {
        fn new_single(nwork: usize) -> Self {
            Self {
                nthreads: 1,
                nwork,
                chunksize: nwork,
                fact_max: 0.0,
                mode: SchedMode::Single,
                single_served: AtomicBool::new(false),
                cur: Mutex::new(0),
            }
        }

        fn new_static(nwork: usize, nthreads: usize, chunksize: usize) -> Self {
            let nthreads = resolve_nthreads(nthreads);
            let chunksize = if chunksize < 1 {
                (nwork + nthreads - 1) / nthreads
            } else {
                chunksize
            };
            if chunksize >= nwork {
                return Self::new_single(nwork);
            }
            Self {
                nthreads,
                nwork,
                chunksize,
                fact_max: 0.0,
                mode: SchedMode::Static,
                single_served: AtomicBool::new(false),
                cur: Mutex::new(0),
            }
        }

        fn new_dynamic(nwork: usize, nthreads: usize, chunk_min: usize, fact_max: f64) -> Self {
            let nthreads = resolve_nthreads(nthreads);
            let chunksize = chunk_min.max(1);
            if chunksize * nthreads >= nwork {
                return Self::new_static(nwork, nthreads, 0);
            }
            Self {
                nthreads,
                nwork,
                chunksize,
                fact_max,
                mode: SchedMode::Dynamic,
                single_served: AtomicBool::new(false),
                cur: Mutex::new(0),
            }
        }

        /// Run `f` once per worker. With one thread the body runs inline on
        /// the caller; otherwise `nthreads` wrappers go to the pool and the
        /// caller blocks on a latch until all of them finish. Exactly one
        /// panic captured from the bodies resumes on the caller.
        fn thread_map(&self, f: &(dyn Fn(&mut Scheduler<'_>) + Sync)) -> Result<()> {
            if self.nthreads == 1 {
                f(&mut Scheduler::new(self, 0));
                return Ok(());
            }

            let pool = get_pool();
            let latch = Latch::new(self.nthreads);
            let caught: Mutex<Option<Box<dyn Any + Send>>> = Mutex::new(None);
            let (latch_ref, caught_ref) = (&latch, &caught);

            let mut submit_failure = None;
            for ithread in 0..self.nthreads {
                let job: Box<dyn FnOnce() + Send + '_> = Box::new(move || {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        f(&mut Scheduler::new(self, ithread));
                    }));
                    if let Err(payload) = outcome {
                        let mut slot = caught_ref.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(payload);
                        }
                    }
                    latch_ref.count_down();
                });
                // Erase the borrow lifetimes: every borrow the job captures
                // outlives the latch.wait() below, which does not return
                // until the job has run (or was never submitted).
                let job: Work = unsafe { std::mem::transmute(job) };
                if let Err(e) = pool.submit(job) {
                    // jobs ithread.. were never handed out; settle their
                    // latch counts ourselves, then wait for the ones that
                    // did get submitted
                    for _ in ithread..self.nthreads {
                        latch.count_down();
                    }
                    submit_failure = Some(e);
                    break;
                }
            }
            latch.wait();

            if let Some(e) = submit_failure {
                return Err(e);
            }
            if let Some(payload) = caught.lock().unwrap().take() {
                resume_unwind(payload);
            }
            Ok(())
        }
    }

    /// Per-worker handle passed to fan-out bodies.
    ///
    /// The body polls [`next_range`] and processes each returned range; the
    /// ranges handed to one worker ascend, ranges across workers are
    /// unordered.
    ///
    /// [`next_range`]: Scheduler::next_range
    pub struct Scheduler<'a> {
        dist: &'a Distribution,
        ithread: usize,
        next_static: usize,
    }

    impl<'a> Scheduler<'a> {
        fn new(dist: &'a Distribution, ithread: usize) -> Self {
            Self {
                dist,
                ithread,
                next_static: ithread * dist.chunksize,
            }
        }

        /// Number of workers in this fan-out.
        #[inline]
        pub fn num_threads(&self) -> usize {
            self.dist.nthreads
        }

        /// This worker's index in `[0, num_threads)`.
        #[inline]
        pub fn thread_num(&self) -> usize {
            self.ithread
        }

        /// The next index range this worker should process, or `None` when
        /// the fan-out holds no more work for it.
        pub fn next_range(&mut self) -> Option<Range<usize>> {
            let dist = self.dist;
            match dist.mode {
                SchedMode::Single => {
                    if dist.nwork == 0 || dist.single_served.swap(true, Ordering::AcqRel) {
                        return None;
                    }
                    Some(0..dist.nwork)
                }
                SchedMode::Static => {
                    if self.next_static >= dist.nwork {
                        return None;
                    }
                    let lo = self.next_static;
                    let hi = (lo + dist.chunksize).min(dist.nwork);
                    self.next_static += dist.nthreads * dist.chunksize;
                    Some(lo..hi)
                }
                SchedMode::Dynamic => {
                    let mut cur = dist.cur.lock().unwrap();
                    if *cur >= dist.nwork {
                        return None;
                    }
                    let rem = dist.nwork - *cur;
                    let guided = (dist.fact_max * rem as f64 / dist.nthreads as f64) as usize;
                    let sz = rem.min(dist.chunksize.max(guided));
                    let lo = *cur;
                    *cur += sz;
                    Some(lo..*cur)
                }
            }
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Serve `[0, nwork)` as one chunk to a single worker, inline on the
    /// caller.
    pub fn exec_single<F>(nwork: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        Distribution::new_single(nwork).thread_map(&f)
    }

    /// Static-strided fan-out: worker `t` is served the chunks
    /// `[t*c, (t+1)*c)`, `[(t+nthreads)*c, ...)`, ... in ascending order.
    ///
    /// `nthreads == 0` selects [`default_nthreads`]; `chunksize == 0` selects
    /// `ceil(nwork / nthreads)`. A chunk covering all of `nwork` degrades to
    /// [`exec_single`].
    pub fn exec_static<F>(nwork: usize, nthreads: usize, chunksize: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        Distribution::new_static(nwork, nthreads, chunksize).thread_map(&f)
    }

    /// Dynamic fan-out with fixed chunks of `chunk_min`: workers pull the
    /// next chunk from a shared cursor as they finish.
    pub fn exec_dynamic<F>(nwork: usize, nthreads: usize, chunk_min: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        Distribution::new_dynamic(nwork, nthreads, chunk_min, 0.0).thread_map(&f)
    }

    /// Guided fan-out: chunks shrink with the remaining work,
    /// `max(chunk_min, fact_max * remaining / nthreads)` at each pull. When
    /// `chunk_min * nthreads` covers `nwork` this degrades to the static
    /// discipline.
    pub fn exec_guided<F>(
        nwork: usize,
        nthreads: usize,
        chunk_min: usize,
        fact_max: f64,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        Distribution::new_dynamic(nwork, nthreads, chunk_min, fact_max).thread_map(&f)
    }

    /// Run `f` once on each of `nthreads` workers; worker `t` is served the
    /// single range `[t, t+1)`.
    pub fn exec_parallel<F>(nthreads: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        let nthreads = resolve_nthreads(nthreads);
        Distribution::new_static(nthreads, nthreads, 1).thread_map(&f)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::panic::{catch_unwind, AssertUnwindSafe};
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        fn collect_ranges(
            run: impl Fn(&(dyn Fn(&mut Scheduler<'_>) + Sync)),
        ) -> Vec<(usize, Range<usize>)> {
            let out = Mutex::new(Vec::new());
            run(&|sched: &mut Scheduler<'_>| {
                while let Some(rng) = sched.next_range() {
                    out.lock().unwrap().push((sched.thread_num(), rng));
                }
            });
            out.into_inner().unwrap()
        }

        fn assert_covers(mut got: Vec<Range<usize>>, nwork: usize) {
            got.sort_by_key(|r| r.start);
            let mut next = 0;
            for r in &got {
                assert_eq!(r.start, next, "gap or overlap at {next}");
                assert!(r.end > r.start, "empty range served");
                next = r.end;
            }
            assert_eq!(next, nwork);
        }

        #[test]
        fn latch_releases_at_zero() {
            let latch = Arc::new(Latch::new(3));
            for _ in 0..3 {
                let latch = Arc::clone(&latch);
                std::thread::spawn(move || latch.count_down());
            }
            latch.wait();
            // zero-count latch does not block
            Latch::new(0).wait();
        }

        #[test]
        fn single_serves_once() {
            let ranges = collect_ranges(|f| exec_single(17, f).unwrap());
            assert_eq!(ranges.len(), 1);
            assert_eq!(ranges[0].1, 0..17);
        }

        #[test]
        fn single_with_no_work_serves_nothing() {
            let ranges = collect_ranges(|f| exec_single(0, f).unwrap());
            assert!(ranges.is_empty());
        }

        #[test]
        fn static_covers_and_bounds_ranges_per_worker() {
            let ranges = collect_ranges(|f| exec_static(100, 4, 7, f).unwrap());
            assert_covers(ranges.iter().map(|(_, r)| r.clone()).collect(), 100);
            // ceil(100 / (4*7)) = 4 stripes per worker at most
            for t in 0..4 {
                let per_worker = ranges.iter().filter(|(tt, _)| *tt == t).count();
                assert!(per_worker <= 4, "worker {t} served {per_worker} ranges");
            }
        }

        #[test]
        fn static_ranges_ascend_per_worker() {
            let ranges = collect_ranges(|f| exec_static(1000, 3, 11, f).unwrap());
            for t in 0..3 {
                let starts: Vec<_> = ranges
                    .iter()
                    .filter(|(tt, _)| *tt == t)
                    .map(|(_, r)| r.start)
                    .collect();
                assert!(starts.windows(2).all(|w| w[0] < w[1]));
                // stride between successive stripes is nthreads * chunk
                assert!(starts.windows(2).all(|w| w[1] - w[0] == 3 * 11));
            }
        }

        #[test]
        fn static_degrades_to_single_for_large_chunks() {
            let ranges = collect_ranges(|f| exec_static(10, 4, 100, f).unwrap());
            assert_eq!(ranges.len(), 1);
            assert_eq!(ranges[0].1, 0..10);
        }

        #[test]
        fn static_default_chunk_splits_evenly() {
            let ranges = collect_ranges(|f| exec_static(40, 4, 0, f).unwrap());
            assert_covers(ranges.iter().map(|(_, r)| r.clone()).collect(), 40);
            // chunk = ceil(40/4) = 10, one stripe each
            for (_, r) in &ranges {
                assert_eq!(r.end - r.start, 10);
            }
        }

        #[test]
        fn dynamic_fixed_chunks_cover() {
            let ranges = collect_ranges(|f| exec_dynamic(103, 4, 5, f).unwrap());
            assert_covers(ranges.iter().map(|(_, r)| r.clone()).collect(), 103);
            // fact_max = 0: every chunk is chunk_min except the tail
            for (_, r) in &ranges {
                assert!(r.end - r.start <= 5);
                if r.end != 103 {
                    assert_eq!(r.end - r.start, 5);
                }
            }
        }

        #[test]
        fn dynamic_degrades_to_static_when_undersubscribed() {
            let ranges = collect_ranges(|f| exec_dynamic(10, 4, 5, f).unwrap());
            assert_covers(ranges.iter().map(|(_, r)| r.clone()).collect(), 10);
        }

        #[test]
        fn guided_first_chunk_and_coverage() {
            let ranges = collect_ranges(|f| exec_guided(1000, 8, 1, 0.25, f).unwrap());
            let sizes: Vec<_> = ranges.iter().map(|(_, r)| r.end - r.start).collect();
            assert!(sizes.iter().all(|&s| s > 0), "empty range served");
            assert_eq!(sizes.iter().sum::<usize>(), 1000);
            // the first pull sees rem = 1000: floor(0.25 * 1000 / 8) = 31
            let first = ranges.iter().find(|(_, r)| r.start == 0).unwrap();
            assert_eq!(first.1.end - first.1.start, 31);
            assert_covers(ranges.iter().map(|(_, r)| r.clone()).collect(), 1000);
        }

        #[test]
        fn parallel_serves_every_worker_once() {
            let ranges = collect_ranges(|f| exec_parallel(4, f).unwrap());
            let mut seen: Vec<_> = ranges.iter().map(|(t, r)| (*t, r.clone())).collect();
            seen.sort_by_key(|(t, _)| *t);
            assert_eq!(seen.len(), 4);
            for (t, (tt, r)) in seen.iter().enumerate() {
                assert_eq!(t, *tt);
                assert_eq!(*r, t..t + 1);
            }
        }

        #[test]
        fn scheduler_reports_geometry() {
            exec_static(64, 2, 4, |sched| {
                assert_eq!(sched.num_threads(), 2);
                assert!(sched.thread_num() < 2);
                while sched.next_range().is_some() {}
            })
            .unwrap();
        }

        #[test]
        fn pool_runs_every_job_once() {
            let pool = ThreadPool::new(3);
            let counter = Arc::new(AtomicUsize::new(0));
            for _ in 0..100 {
                let counter = Arc::clone(&counter);
                pool.submit(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
            }
            pool.shutdown();
            assert_eq!(counter.load(Ordering::SeqCst), 100);
        }

        #[test]
        fn pool_rejects_after_shutdown_and_recovers_on_restart() {
            let pool = ThreadPool::new(2);
            pool.shutdown();
            let err = pool.submit(Box::new(|| {}));
            assert!(matches!(err, Err(crate::AlmError::PoolShutDown)));

            pool.restart();
            let counter = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
            pool.shutdown();
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn fanout_resumes_exactly_one_panic_and_pool_survives() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                exec_parallel(4, |sched| {
                    if sched.thread_num() % 2 == 1 {
                        panic!("worker failure");
                    }
                    while sched.next_range().is_some() {}
                })
            }));
            assert!(result.is_err());

            // the pool is unaffected and remains usable
            let counter = AtomicUsize::new(0);
            exec_parallel(4, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 4);
        }

        #[test]
        fn oversubscribed_fanout_completes() {
            // more workers than pool threads: overflow queue must drain
            let nthreads = max_threads() * 4;
            let counter = AtomicUsize::new(0);
            exec_parallel(nthreads, |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), nthreads);
        }

        #[test]
        fn default_nthreads_clamps_to_one() {
            let before = default_nthreads();
            set_default_nthreads(0);
            assert_eq!(default_nthreads(), 1);
            set_default_nthreads(before);
            assert!(max_threads() >= 1);
        }
    }
}

#[cfg(not(feature = "parallel"))]
mod serial {
    use std::marker::PhantomData;
    use std::ops::Range;

    use crate::Result;

    /// Always 1 in a build without threading support.
    pub fn max_threads() -> usize {
        1
    }

    /// Always 1 in a build without threading support.
    pub fn default_nthreads() -> usize {
        1
    }

    /// No-op in a build without threading support.
    pub fn set_default_nthreads(_nthreads: usize) {}

    /// Inline stand-in for the pool-backed scheduler handle: serves the whole
    /// range once on the calling thread.
    pub struct Scheduler<'a> {
        nwork: usize,
        served: bool,
        _marker: PhantomData<&'a ()>,
    }

    impl Scheduler<'_> {
        #[inline]
        pub fn num_threads(&self) -> usize {
            1
        }

        #[inline]
        pub fn thread_num(&self) -> usize {
            0
        }

        pub fn next_range(&mut self) -> Option<Range<usize>> {
            if self.served || self.nwork == 0 {
                return None;
            }
            self.served = true;
            Some(0..self.nwork)
        }
    }

    fn run_inline<F>(nwork: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        f(&mut Scheduler {
            nwork,
            served: false,
            _marker: PhantomData,
        });
        Ok(())
    }

    pub fn exec_single<F>(nwork: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        run_inline(nwork, f)
    }

    pub fn exec_static<F>(nwork: usize, _nthreads: usize, _chunksize: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        run_inline(nwork, f)
    }

    pub fn exec_dynamic<F>(nwork: usize, _nthreads: usize, _chunk_min: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        run_inline(nwork, f)
    }

    pub fn exec_guided<F>(
        nwork: usize,
        _nthreads: usize,
        _chunk_min: usize,
        _fact_max: f64,
        f: F,
    ) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        run_inline(nwork, f)
    }

    pub fn exec_parallel<F>(_nthreads: usize, f: F) -> Result<()>
    where
        F: Fn(&mut Scheduler<'_>) + Sync,
    {
        run_inline(1, f)
    }
}
