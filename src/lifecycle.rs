use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn set(&self, at: Duration) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

#[derive(Debug, Clone)]
pub struct RepeatingTask {
    interval: Duration,
    next_due: Duration,
    token: CancellationToken,
}

impl RepeatingTask {
    pub fn new(interval: Duration, start: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            interval,
            next_due: start + interval,
            token: CancellationToken::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration, now: Duration) {
        self.interval = interval.max(Duration::from_millis(1));
        self.next_due = now + self.interval;
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns true once per elapsed interval. Missed intervals collapse into
    /// a single run rather than firing in a burst.
    pub fn poll(&mut self, now: Duration) -> bool {
        if self.token.is_cancelled() || now < self.next_due {
            return false;
        }
        self.next_due = now + self.interval;
        true
    }
}

type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct ResourceTracker {
    cleanups: RefCell<Vec<(String, Cleanup)>>,
    torn_down: Cell<bool>,
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("pending", &self.pending())
            .field("torn_down", &self.torn_down.get())
            .finish()
    }
}

impl ResourceTracker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Registers `cleanup`. After teardown the callback runs immediately so
    /// late registrations cannot leak.
    pub fn register(&self, label: impl Into<String>, cleanup: impl FnOnce() + 'static) {
        if self.torn_down.get() {
            cleanup();
            return;
        }
        self.cleanups
            .borrow_mut()
            .push((label.into(), Box::new(cleanup)));
    }

    pub fn register_token(&self, label: impl Into<String>, token: CancellationToken) {
        self.register(label, move || token.cancel());
    }

    pub fn pending(&self) -> usize {
        self.cleanups.borrow().len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    pub fn teardown(&self) {
        self.torn_down.set(true);
        // Drain first so a callback that registers again cannot hit a live borrow.
        let drained = std::mem::take(&mut *self.cleanups.borrow_mut());
        for (label, cleanup) in drained.into_iter().rev() {
            log::debug!("cleanup: {label}");
            cleanup();
        }
    }
}
