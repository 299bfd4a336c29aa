use std::{
    cell::Cell,
    io,
    os::fd::RawFd,
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Context;
use log::{debug, warn};
use mio::{Events, Interest, Poll, Token, event::Event, unix::SourceFd};

type FdCallback<D> = Box<dyn FnMut(&mut D, Readiness, &mut Timers<D>)>;
type TimerCallback<D> = Box<dyn FnOnce(&mut D, &mut Timers<D>)>;

/// The conditions reported for a registered file descriptor in one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    /// The peer closed the connection
    pub hangup: bool,
    pub error: bool,
}

impl Readiness {
    fn merge(&mut self, event: &Event) {
        self.readable |= event.is_readable();
        self.writable |= event.is_writable();
        self.hangup |= event.is_read_closed() || event.is_write_closed();
        self.error |= event.is_error();
    }

    /// Hangup and error are always delivered, independent of the interest
    fn matches(&self, interest: Interest) -> bool {
        self.hangup
            || self.error
            || (self.readable && interest.is_readable())
            || (self.writable && interest.is_writable())
    }
}

struct Registration<D> {
    fd: RawFd,
    interest: Interest,
    readiness: Readiness,
    callback: FdCallback<D>,
}

/// A single-threaded poll loop that multiplexes file descriptors and one-shot software timers.
/// Every call to [`Reactor::poll`] blocks exactly once and then dispatches everything that became
/// ready.
pub struct Reactor<D> {
    poll: Poll,
    events: Events,
    registrations: Vec<Option<Registration<D>>>,
    timers: Timers<D>,
}

impl<D> Reactor<D> {
    /// Creates a new reactor without any registrations
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            poll: Poll::new().context("Unable to create poll instance")?,
            events: Events::with_capacity(128),
            registrations: Vec::new(),
            timers: Timers::new(),
        })
    }

    /// Watches the file descriptor for the given interest. The callback is invoked once per cycle
    /// in which the descriptor reported a matching condition, a hangup or an error.
    pub fn add_fd(
        &mut self,
        fd: RawFd,
        interest: Interest,
        callback: impl FnMut(&mut D, Readiness, &mut Timers<D>) + 'static,
    ) -> anyhow::Result<Token> {
        let token = Token(self.registrations.len());
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, interest)
            .with_context(|| format!("Unable to register file descriptor {fd}"))?;
        debug!("Registered file descriptor {fd} with token {}", token.0);
        self.registrations.push(Some(Registration {
            fd,
            interest,
            readiness: Readiness::default(),
            callback: Box::new(callback),
        }));

        Ok(token)
    }

    /// Stops watching the file descriptor registered under the token. Returns `false` if the token
    /// is unknown.
    pub fn remove_fd(&mut self, token: Token) -> bool {
        let Some(registration) = self.registrations.get_mut(token.0).and_then(Option::take) else {
            return false;
        };
        if let Err(err) = self
            .poll
            .registry()
            .deregister(&mut SourceFd(&registration.fd))
        {
            warn!(
                "Unable to deregister file descriptor {}: {err}",
                registration.fd
            );
        }

        true
    }

    /// Changes the conditions the descriptor registered under the token is watched for
    pub fn set_interest(&mut self, token: Token, interest: Interest) -> anyhow::Result<()> {
        let Some(Some(registration)) = self.registrations.get_mut(token.0) else {
            anyhow::bail!("Unknown token {}", token.0);
        };
        if registration.interest == interest {
            return Ok(());
        }
        self.poll
            .registry()
            .reregister(&mut SourceFd(&registration.fd), token, interest)
            .with_context(|| format!("Unable to reregister file descriptor {}", registration.fd))?;
        registration.interest = interest;

        Ok(())
    }

    /// Schedules a one-shot timer
    pub fn add_timer(
        &mut self,
        after: Duration,
        callback: impl FnOnce(&mut D, &mut Timers<D>) + 'static,
    ) -> TimerHandle {
        self.timers.add(after, callback)
    }

    pub fn timers(&self) -> &Timers<D> {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut Timers<D> {
        &mut self.timers
    }

    /// Runs a single cycle: waits until a descriptor is ready or the nearest timer expires, then
    /// dispatches the descriptors in registration order followed by the due timers.
    pub fn poll(&mut self, data: &mut D) -> anyhow::Result<()> {
        let timeout = self.timers.next_timeout(Instant::now());
        if let Err(err) = self.poll.poll(&mut self.events, timeout) {
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err).context("Unable to poll event loop");
            }
        }

        for event in self.events.iter() {
            if let Some(Some(registration)) = self.registrations.get_mut(event.token().0) {
                registration.readiness.merge(event);
            }
        }

        for registration in self.registrations.iter_mut().flatten() {
            let readiness = std::mem::take(&mut registration.readiness);
            if readiness.matches(registration.interest) {
                (registration.callback)(data, readiness, &mut self.timers);
            }
        }

        self.timers.sweep(data, Instant::now());

        Ok(())
    }
}

/// Cancels a timer. Cancelling only marks the timer, it is dropped on the next sweep.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    removed: Rc<Cell<bool>>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.removed.set(true);
    }

    /// Whether the timer has neither fired nor been cancelled
    pub fn is_pending(&self) -> bool {
        !self.removed.get()
    }
}

struct Timer<D> {
    expiry: Instant,
    removed: Rc<Cell<bool>>,
    callback: TimerCallback<D>,
}

/// The unordered list of pending one-shot timers
pub struct Timers<D> {
    list: Vec<Timer<D>>,
}

impl<D> Timers<D> {
    fn new() -> Self {
        Self { list: Vec::new() }
    }

    /// Schedules a one-shot timer that expires after the given duration
    pub fn add(
        &mut self,
        after: Duration,
        callback: impl FnOnce(&mut D, &mut Timers<D>) + 'static,
    ) -> TimerHandle {
        self.add_at(Instant::now() + after, callback)
    }

    /// Schedules a one-shot timer that expires at the given instant
    pub fn add_at(
        &mut self,
        expiry: Instant,
        callback: impl FnOnce(&mut D, &mut Timers<D>) + 'static,
    ) -> TimerHandle {
        let removed = Rc::new(Cell::new(false));
        self.list.push(Timer {
            expiry,
            removed: removed.clone(),
            callback: Box::new(callback),
        });
        TimerHandle { removed }
    }

    /// Number of timers in the list, including cancelled ones that were not swept yet
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Time until the nearest live timer expires. `None` if there is no live timer, zero if a timer
    /// is already due.
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.list
            .iter()
            .filter(|timer| !timer.removed.get())
            .map(|timer| timer.expiry.saturating_duration_since(now))
            .min()
    }

    /// Drops cancelled timers and fires every due timer in list order. Timers scheduled by a
    /// callback are kept for the next sweep.
    fn sweep(&mut self, data: &mut D, now: Instant) {
        let timers = std::mem::take(&mut self.list);
        let mut remaining = Vec::with_capacity(timers.len());
        for timer in timers {
            if timer.removed.get() {
                continue;
            }
            if timer.expiry <= now {
                timer.removed.set(true);
                (timer.callback)(data, self);
            } else {
                remaining.push(timer);
            }
        }
        remaining.append(&mut self.list);
        self.list = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::Write,
        os::{fd::AsRawFd, unix::net::UnixStream},
    };

    fn socket_pair() -> (UnixStream, UnixStream) {
        let (writer, reader) = UnixStream::pair().unwrap();
        reader.set_nonblocking(true).unwrap();
        (writer, reader)
    }

    #[test]
    fn readable_fd_invokes_callback() {
        let (mut writer, reader) = socket_pair();
        let mut reactor = Reactor::<Vec<Readiness>>::new().unwrap();
        reactor
            .add_fd(reader.as_raw_fd(), Interest::READABLE, |seen, readiness, _| {
                seen.push(readiness)
            })
            .unwrap();

        writer.write_all(b"x").unwrap();
        let mut seen = Vec::new();
        reactor.poll(&mut seen).unwrap();

        assert_eq!(seen.len(), 1);
        assert!(seen[0].readable);
        assert!(!seen[0].hangup);
    }

    #[test]
    fn hangup_is_always_delivered() {
        let (writer, reader) = socket_pair();
        let mut reactor = Reactor::<Vec<Readiness>>::new().unwrap();
        reactor
            .add_fd(reader.as_raw_fd(), Interest::READABLE, |seen, readiness, _| {
                seen.push(readiness)
            })
            .unwrap();

        drop(writer);
        let mut seen = Vec::new();
        reactor.poll(&mut seen).unwrap();

        assert_eq!(seen.len(), 1);
        assert!(seen[0].hangup);
    }

    #[test]
    fn removed_fd_is_not_dispatched() {
        let (mut writer, reader) = socket_pair();
        let mut reactor = Reactor::<Vec<&'static str>>::new().unwrap();
        let token = reactor
            .add_fd(reader.as_raw_fd(), Interest::READABLE, |seen, _, _| {
                seen.push("fd")
            })
            .unwrap();

        assert!(reactor.remove_fd(token));
        assert!(!reactor.remove_fd(token));
        writer.write_all(b"x").unwrap();
        reactor.add_timer(Duration::ZERO, |seen, _| seen.push("timer"));
        let mut seen = Vec::new();
        reactor.poll(&mut seen).unwrap();

        assert_eq!(seen, ["timer"]);
    }

    #[test]
    fn writable_interest_can_be_toggled() {
        let (_writer, reader) = socket_pair();
        let mut reactor = Reactor::<Vec<Readiness>>::new().unwrap();
        let token = reactor
            .add_fd(reader.as_raw_fd(), Interest::READABLE, |seen, readiness, _| {
                seen.push(readiness)
            })
            .unwrap();

        reactor
            .set_interest(token, Interest::READABLE | Interest::WRITABLE)
            .unwrap();
        let mut seen = Vec::new();
        reactor.poll(&mut seen).unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].writable);
        assert!(!seen[0].readable);

        reactor.set_interest(token, Interest::READABLE).unwrap();
        reactor.add_timer(Duration::ZERO, |_, _| ());
        seen.clear();
        reactor.poll(&mut seen).unwrap();
        assert!(seen.is_empty());

        assert!(reactor.remove_fd(token));
        assert!(reactor.set_interest(token, Interest::READABLE).is_err());
    }

    #[test]
    fn due_timers_fire_once_in_list_order() {
        let mut reactor = Reactor::<Vec<u32>>::new().unwrap();
        reactor.add_timer(Duration::ZERO, |fired, _| fired.push(1));
        reactor.add_timer(Duration::ZERO, |fired, _| fired.push(2));
        let later = reactor.add_timer(Duration::from_secs(3600), |fired, _| fired.push(3));

        let mut fired = Vec::new();
        reactor.poll(&mut fired).unwrap();

        assert_eq!(fired, [1, 2]);
        assert_eq!(reactor.timers().len(), 1);
        assert!(later.is_pending());
    }

    #[test]
    fn cancelled_timer_is_tombstoned_until_the_next_sweep() {
        let mut reactor = Reactor::<Vec<u32>>::new().unwrap();
        let handle = reactor.add_timer(Duration::ZERO, |fired, _| fired.push(1));
        handle.cancel();
        assert!(!handle.is_pending());
        assert_eq!(reactor.timers().len(), 1);

        reactor.add_timer(Duration::ZERO, |fired, _| fired.push(2));
        let mut fired = Vec::new();
        reactor.poll(&mut fired).unwrap();

        assert_eq!(fired, [2]);
        assert!(reactor.timers().is_empty());
    }

    #[test]
    fn timer_cancelled_by_an_earlier_timer_does_not_fire() {
        let mut reactor = Reactor::<Vec<u32>>::new().unwrap();
        let second = Rc::new(Cell::new(None::<TimerHandle>));
        let second_in_first = second.clone();
        reactor.add_timer(Duration::ZERO, move |fired, _| {
            fired.push(1);
            if let Some(handle) = second_in_first.take() {
                handle.cancel();
            }
        });
        second.set(Some(
            reactor.add_timer(Duration::ZERO, |fired, _| fired.push(2)),
        ));

        let mut fired = Vec::new();
        reactor.poll(&mut fired).unwrap();

        assert_eq!(fired, [1]);
    }

    #[test]
    fn timer_scheduled_from_a_callback_fires_in_the_next_cycle() {
        let mut reactor = Reactor::<Vec<u32>>::new().unwrap();
        reactor.add_timer(Duration::ZERO, |fired, timers| {
            fired.push(1);
            timers.add(Duration::ZERO, |fired, _| fired.push(2));
        });

        let mut fired = Vec::new();
        reactor.poll(&mut fired).unwrap();
        assert_eq!(fired, [1]);
        assert_eq!(reactor.timers().len(), 1);

        reactor.poll(&mut fired).unwrap();
        assert_eq!(fired, [1, 2]);
    }

    #[test]
    fn next_timeout_uses_nearest_live_timer() {
        let mut timers = Timers::<()>::new();
        let now = Instant::now();
        assert_eq!(timers.next_timeout(now), None);

        let near = timers.add_at(now + Duration::from_millis(10), |_, _| ());
        timers.add_at(now + Duration::from_millis(500), |_, _| ());
        assert_eq!(timers.next_timeout(now), Some(Duration::from_millis(10)));

        near.cancel();
        assert_eq!(timers.next_timeout(now), Some(Duration::from_millis(500)));

        timers.add_at(now, |_, _| ());
        assert_eq!(timers.next_timeout(now), Some(Duration::ZERO));
    }
}
