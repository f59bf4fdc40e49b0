// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::ChannelError;
use crate::registry::RegistryInner;
use crate::ring::RingBuffer;
use arc_swap::ArcSwapOption;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Marker held by every live channel. Cleared when the channel is destroyed.
pub(crate) const COOKIE: u32 = u32::from_be_bytes(*b"Chan");

/// Longest ring name, including the `Rx:` / `Tx:` prefix.
pub const MAX_NAME_LEN: usize = 32;

const RING_PREFIX_LEN: usize = 3;

/// The two rings created for a root, labelled from the root's point of view.
pub(crate) struct RingPair<T> {
    rx: RingBuffer<T>,
    tx: RingBuffer<T>,
}

impl<T> RingPair<T> {
    fn recv_ring(&self, swapped: bool) -> &RingBuffer<T> {
        if swapped { &self.tx } else { &self.rx }
    }

    fn send_ring(&self, swapped: bool) -> &RingBuffer<T> {
        if swapped { &self.rx } else { &self.tx }
    }
}

/// Root channels own their rings. Children only reference them.
enum Ends<T> {
    Root(ArcSwapOption<RingPair<T>>),
    Child {
        parent: Weak<Inner<T>>,
        rings: Weak<RingPair<T>>,
        swapped: bool,
    },
}

#[derive(Default)]
struct Counters {
    send_calls: AtomicU64,
    send_total: AtomicU64,
    recv_calls: AtomicU64,
    recv_total: AtomicU64,
    recv_timeouts: AtomicU64,
}

pub(crate) struct Inner<T> {
    name: String,
    cookie: AtomicU32,
    ends: Ends<T>,
    children: ReentrantMutex<RefCell<Vec<Channel<T>>>>,
    attached: AtomicU32,
    counters: Counters,
    registry: Weak<RegistryInner<T>>,
}

/// A handle to one end of a duplex channel.
///
/// Handles are cheap to clone; all clones refer to the same channel. Once the channel is
/// destroyed every operation through any of its handles fails with
/// [`ChannelError::InvalidChannel`].
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel {
            inner: self.inner.clone(),
        }
    }
}

/// Snapshot of a channel's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Children currently attached to this channel
    pub child_count: usize,
    /// Number of calls to [`Channel::send`]
    pub send_calls: u64,
    /// Items accepted by all sends
    pub send_total: u64,
    /// Number of calls to [`Channel::recv`]
    pub recv_calls: u64,
    /// Items returned by all receives
    pub recv_total: u64,
    /// Receives that gave up after waiting their full timeout
    pub recv_timeouts: u64,
}

/// Ring occupancy as seen from one end of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSize {
    /// Capacity of each ring
    pub capacity: usize,
    /// Free slots in the ring this end receives on
    pub recv_free: usize,
    /// Free slots in the ring this end sends on
    pub send_free: usize,
}

impl<T> Channel<T> {
    /// Name of this channel; `<parent>:<n>` for children.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns true until the channel is destroyed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.cookie.load(Ordering::Acquire) == COOKIE
    }

    /// Returns true if this channel owns its rings.
    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self.inner.ends, Ends::Root(_))
    }

    /// The channel this one was attached to, if it still exists.
    #[must_use]
    pub fn parent(&self) -> Option<Channel<T>> {
        match &self.inner.ends {
            Ends::Root(_) => None,
            Ends::Child { parent, .. } => parent.upgrade().map(|inner| Channel { inner }),
        }
    }

    /// Children currently attached to this channel, in attach order.
    #[must_use]
    pub fn children(&self) -> Vec<Channel<T>> {
        self.inner.children.lock().borrow().clone()
    }

    /// Returns true if both handles refer to the same channel.
    #[must_use]
    pub fn same_channel(&self, other: &Channel<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn check(&self) -> Result<(), ChannelError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ChannelError::InvalidChannel(self.inner.name.clone()))
        }
    }

    fn ends(&self) -> Result<(Arc<RingPair<T>>, bool), ChannelError> {
        match &self.inner.ends {
            Ends::Root(rings) => rings.load_full().map(|rings| (rings, false)),
            Ends::Child { rings, swapped, .. } => rings.upgrade().map(|rings| (rings, *swapped)),
        }
        .ok_or_else(|| ChannelError::InvalidChannel(self.inner.name.clone()))
    }

    /// Clear the cookie. Returns false if it was already cleared.
    fn invalidate(&self) -> bool {
        self.inner
            .cookie
            .compare_exchange(COOKIE, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn destroy_children(&self) {
        let children = std::mem::take(&mut *self.inner.children.lock().borrow_mut());
        for child in children {
            if child.invalidate() {
                trace!("destroying child channel {}", child.name());
                child.destroy_children();
            }
        }
    }

    /// Destroy this channel.
    ///
    /// A root is removed from its registry, releases both rings and takes every attached
    /// child down with it. A child unlinks itself from its parent and leaves the rings alone.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidChannel`] if the channel was already destroyed.
    #[tracing::instrument(level = "debug", skip(self), fields(channel = %self.inner.name))]
    pub fn destroy(&self) -> Result<(), ChannelError> {
        match &self.inner.ends {
            Ends::Root(rings) => {
                let registry = self.inner.registry.upgrade();
                let roots = registry.as_deref().map(RegistryInner::lock);
                if !self.invalidate() {
                    warn!("channel {} already destroyed", self.inner.name);
                    return Err(ChannelError::InvalidChannel(self.inner.name.clone()));
                }
                if let Some(roots) = &roots {
                    let mut roots = roots.borrow_mut();
                    if roots
                        .get(&self.inner.name)
                        .is_some_and(|found| found.same_channel(self))
                    {
                        roots.remove(&self.inner.name);
                    }
                }
                drop(rings.swap(None));
                self.destroy_children();
            }
            Ends::Child { parent, .. } => {
                if !self.invalidate() {
                    warn!("channel {} already destroyed", self.inner.name);
                    return Err(ChannelError::InvalidChannel(self.inner.name.clone()));
                }
                self.destroy_children();
                if let Some(parent) = parent.upgrade() {
                    parent
                        .children
                        .lock()
                        .borrow_mut()
                        .retain(|child| !Arc::ptr_eq(&child.inner, &self.inner));
                }
            }
        }
        debug!("destroyed channel {}", self.inner.name);
        Ok(())
    }

    /// Snapshot of this channel's own counters.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidChannel`] if the channel was destroyed.
    pub fn info(&self) -> Result<ChannelInfo, ChannelError> {
        self.check()?;
        let counters = &self.inner.counters;
        Ok(ChannelInfo {
            child_count: self.inner.children.lock().borrow().len(),
            send_calls: counters.send_calls.load(Ordering::Relaxed),
            send_total: counters.send_total.load(Ordering::Relaxed),
            recv_calls: counters.recv_calls.load(Ordering::Relaxed),
            recv_total: counters.recv_total.load(Ordering::Relaxed),
            recv_timeouts: counters.recv_timeouts.load(Ordering::Relaxed),
        })
    }
}

impl<T: Copy> Channel<T> {
    pub(crate) fn new_root(
        name: &str,
        capacity: usize,
        registry: Weak<RegistryInner<T>>,
    ) -> Result<Channel<T>, ChannelError> {
        if name.len() + RING_PREFIX_LEN > MAX_NAME_LEN {
            return Err(ChannelError::NameTooLong(name.to_string()));
        }
        let rx = RingBuffer::new(format!("Rx:{name}"), capacity)?;
        let tx = RingBuffer::new(format!("Tx:{name}"), capacity)?;
        Ok(Channel {
            inner: Arc::new(Inner {
                name: name.to_string(),
                cookie: AtomicU32::new(COOKIE),
                ends: Ends::Root(ArcSwapOption::from_pointee(RingPair { rx, tx })),
                children: ReentrantMutex::new(RefCell::new(Vec::new())),
                attached: AtomicU32::new(0),
                counters: Counters::default(),
                registry,
            }),
        })
    }

    /// Attach a new child to this channel.
    ///
    /// The child receives what this channel sends and sends what this channel receives.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidChannel`] if this channel was destroyed.
    #[tracing::instrument(level = "debug", skip(self), fields(channel = %self.inner.name))]
    pub fn attach_child(&self) -> Result<Channel<T>, ChannelError> {
        self.check()?;
        let (rings, swapped) = self.ends()?;
        let children = self.inner.children.lock();
        // a concurrent destroy may have drained the list already
        self.check()?;
        let index = self.inner.attached.fetch_add(1, Ordering::Relaxed);
        let child = Channel {
            inner: Arc::new(Inner {
                name: format!("{}:{index}", self.inner.name),
                cookie: AtomicU32::new(COOKIE),
                ends: Ends::Child {
                    parent: Arc::downgrade(&self.inner),
                    rings: Arc::downgrade(&rings),
                    swapped: !swapped,
                },
                children: ReentrantMutex::new(RefCell::new(Vec::new())),
                attached: AtomicU32::new(0),
                counters: Counters::default(),
                registry: self.inner.registry.clone(),
            }),
        };
        children.borrow_mut().push(child.clone());
        debug!("attached {} to {}", child.name(), self.inner.name);
        Ok(child)
    }

    /// Enqueue as many of `items` as the send ring accepts.
    ///
    /// Returns how many leading items were accepted, which may be fewer than `items.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidChannel`] if the channel was destroyed.
    pub fn send(&self, items: &[T]) -> Result<usize, ChannelError> {
        self.check()?;
        let (rings, swapped) = self.ends()?;
        let sent = rings.send_ring(swapped).enqueue_burst(items);
        let counters = &self.inner.counters;
        counters.send_calls.fetch_add(1, Ordering::Relaxed);
        counters.send_total.fetch_add(sent as u64, Ordering::Relaxed);
        trace!(channel = %self.inner.name, requested = items.len(), sent, "send");
        Ok(sent)
    }

    /// Dequeue up to `max` items into `out`.
    ///
    /// With a zero `timeout` a single attempt is made. Otherwise attempts are repeated, yielding
    /// the processor between them, until something arrives or `timeout` has elapsed. Giving up
    /// is not an error: zero is returned and the timeout counter is bumped.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidChannel`] if the channel was destroyed, including while
    /// waiting.
    pub fn recv(
        &self,
        out: &mut Vec<T>,
        max: usize,
        timeout: Duration,
    ) -> Result<usize, ChannelError> {
        self.check()?;
        let start = Instant::now();
        let (rings, swapped) = self.ends()?;
        let ring = rings.recv_ring(swapped);
        let counters = &self.inner.counters;
        counters.recv_calls.fetch_add(1, Ordering::Relaxed);

        let mut received = ring.dequeue_burst(out, max);
        if received == 0 && max > 0 && !timeout.is_zero() {
            let deadline = start.checked_add(timeout);
            loop {
                std::thread::yield_now();
                received = ring.dequeue_burst(out, max);
                if received > 0 {
                    break;
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    counters.recv_timeouts.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                self.check()?;
            }
        }
        counters.recv_total.fetch_add(received as u64, Ordering::Relaxed);
        Ok(received)
    }

    /// Capacity and free slots of the rings this end uses.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidChannel`] if the channel was destroyed.
    pub fn size(&self) -> Result<RingSize, ChannelError> {
        self.check()?;
        let (rings, swapped) = self.ends()?;
        Ok(RingSize {
            capacity: rings.recv_ring(swapped).capacity(),
            recv_free: rings.recv_ring(swapped).free_count(),
            send_free: rings.send_ring(swapped).free_count(),
        })
    }
}

impl<T> Debug for Channel<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("root", &self.is_root())
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl<T: Copy> Display for Channel<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (Ok(info), Ok(size)) = (self.info(), self.size()) else {
            return writeln!(f, "  {:<20} (destroyed)", self.inner.name);
        };
        writeln!(
            f,
            "  {:<20} {} size {} recv free {} send free {}",
            self.inner.name,
            if self.is_root() { "root " } else { "child" },
            size.capacity,
            size.recv_free,
            size.send_free
        )?;
        writeln!(
            f,
            "     send calls {} count {}, recv calls {} count {} timeouts {}",
            info.send_calls, info.send_total, info.recv_calls, info.recv_total, info.recv_timeouts
        )?;
        let children = self.children();
        if !children.is_empty() {
            write!(f, "     children {}:", children.len())?;
            for child in &children {
                write!(f, " {}", child.name())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
