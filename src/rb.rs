//! Single-producer single-consumer byte queue between an interrupt handler
//! and an async task.

use core::{
    cell::UnsafeCell,
    future::{poll_fn, Future},
    mem::MaybeUninit,
    sync::atomic::{
        AtomicBool, AtomicUsize,
        Ordering::{Acquire, Relaxed, Release},
    },
    task::{
        Poll::{Pending, Ready},
        Waker,
    },
};

use cortex_m::interrupt::{free as critical_section, Mutex};

// Push at HEAD, pop at TAIL
pub struct Ringbuf<T, const N: usize> {
    is_split: AtomicBool,
    head: AtomicUsize,
    tail: AtomicUsize,
    /// Writes refused because the queue was full
    dropped: AtomicUsize,
    consumer_waker: Mutex<UnsafeCell<Option<Waker>>>,
    buf: [UnsafeCell<MaybeUninit<T>>; N],
}

// SAFETY: The safety guarantees within later unsafe blocks in this implementation
// allow us to safely share the UnsafeCells over thread boundaries.
unsafe impl<T, const N: usize> Sync for Ringbuf<T, N> {}

impl<T, const N: usize> Default for Ringbuf<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Ringbuf<T, N> {
    pub const fn new() -> Self {
        Self {
            is_split: AtomicBool::new(false),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            consumer_waker: Mutex::new(UnsafeCell::new(None)),
            // SAFETY: This array only contains MaybeUninits, which are sound to
            // have hold an uninit value
            #[allow(clippy::uninit_assumed_init)]
            buf: unsafe { MaybeUninit::uninit().assume_init() },
        }
    }

    /// Hands out the two ends, once.
    pub fn try_split(&'static self) -> Option<(Producer<T, N>, Consumer<T, N>)> {
        if self.is_split.fetch_or(true, Relaxed) {
            None
        } else {
            Some((Producer(self), Consumer(self)))
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Relaxed)
    }

    fn is_empty(&self) -> bool {
        self.head.load(Acquire) == self.tail.load(Acquire)
    }

    fn is_full(&self) -> bool {
        let head = self.head.load(Acquire);
        let tail = self.tail.load(Acquire);
        head.wrapping_sub(tail) == N
    }
}

pub struct Consumer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Consumer<T, N> {
    pub fn try_read(&self) -> Option<T> {
        if self.0.is_empty() {
            return None;
        }
        // SAFETY: The buffer is not empty, and could not have become empty since
        // we checked it because only one Consumer may exist.
        let val = unsafe {
            self.0.buf[self.0.tail.load(Acquire) % N]
                .get()
                .read()
                .assume_init()
        };
        self.0.tail.fetch_add(1, Release);
        Some(val)
    }

    /// Waits for the producer, registering the waker before the final check
    /// so a write from an interrupt cannot slip in between.
    pub fn async_read(&self) -> impl Future<Output = T> + '_ {
        poll_fn(|ctx| {
            if let Some(val) = self.try_read() {
                return Ready(val);
            }
            // SAFETY: Accessing the interior of the UnsafeCell is safe because
            // it occurs inside a critical section, when we are guaranteed to be
            // the only holder of the mutex.
            critical_section(|cs| unsafe {
                *self.0.consumer_waker.borrow(cs).get() = Some(ctx.waker().clone())
            });
            match self.try_read() {
                Some(val) => Ready(val),
                None => Pending,
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct Producer<T: 'static, const N: usize>(&'static Ringbuf<T, N>);

impl<T: 'static, const N: usize> Producer<T, N> {
    /// Never blocks, safe to call from an interrupt handler.
    pub fn try_write(&self, val: T) -> Result<(), T> {
        if self.0.is_full() {
            self.0.dropped.fetch_add(1, Relaxed);
            return Err(val);
        }
        // SAFETY: The buffer is not full, and could not have become full since
        // we checked it because only one Producer may exist.
        unsafe {
            (*self.0.buf[self.0.head.load(Acquire) % N].get()).write(val);
        }
        self.0.head.fetch_add(1, Release);

        // SAFETY: Accessing the interior of the UnsafeCell is safe because
        // it occurs inside a critical section, when we are guaranteed to be
        // the only holder of the mutex.
        if let Some(waker) =
            critical_section(|cs| unsafe { (*self.0.consumer_waker.borrow(cs).get()).take() })
        {
            waker.wake();
        }
        Ok(())
    }

    /// Writes until the queue fills up. Returns how many items went in.
    pub fn write_iter(&self, iter: impl IntoIterator<Item = T>) -> usize {
        let mut count = 0_usize;
        for val in iter {
            if self.try_write(val).is_err() {
                break;
            }
            count += 1;
        }
        count
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }
}
