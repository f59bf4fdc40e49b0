// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::ChannelError;
use crate::channel::Channel;
use ordermap::OrderMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tracing::{debug, info};

type Roots<T> = RefCell<OrderMap<String, Channel<T>>>;

pub(crate) struct RegistryInner<T> {
    roots: ReentrantMutex<Roots<T>>,
}

impl<T> RegistryInner<T> {
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, Roots<T>> {
        self.roots.lock()
    }
}

/// The set of root channels, indexed by name.
///
/// Only roots are registered; children are reached through their parent.
pub struct ChannelRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for ChannelRegistry<T> {
    fn clone(&self) -> Self {
        ChannelRegistry {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ChannelRegistry<T> {
    fn default() -> Self {
        ChannelRegistry {
            inner: Arc::new(RegistryInner {
                roots: ReentrantMutex::new(RefCell::new(OrderMap::new())),
            }),
        }
    }
}

impl<T: Copy> ChannelRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a root channel whose rings hold `capacity` items each.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken or too long, or if `capacity` is zero.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn create(&self, name: &str, capacity: usize) -> Result<Channel<T>, ChannelError> {
        let roots = self.inner.lock();
        if roots.borrow().contains_key(name) {
            return Err(ChannelError::NameInUse(name.to_string()));
        }
        let channel = Channel::new_root(name, capacity, Arc::downgrade(&self.inner))?;
        roots
            .borrow_mut()
            .insert(name.to_string(), channel.clone());
        info!("created channel {name} with capacity {capacity}");
        Ok(channel)
    }

    /// Attach a new child to the root channel called `parent_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotFound`] if no such root exists.
    pub fn attach(&self, parent_name: &str) -> Result<Channel<T>, ChannelError> {
        let parent = self.lookup(parent_name)?;
        parent.attach_child()
    }

    /// Destroy the root channel called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotFound`] if no such root exists.
    pub fn destroy(&self, name: &str) -> Result<(), ChannelError> {
        self.lookup(name)?.destroy()
    }
}

impl<T> ChannelRegistry<T> {
    /// Find a root channel by name.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotFound`] if no such root exists.
    pub fn lookup(&self, name: &str) -> Result<Channel<T>, ChannelError> {
        let found = self.inner.lock().borrow().get(name).cloned();
        found.ok_or_else(|| {
            debug!("lookup of unknown channel {name}");
            ChannelError::NotFound(name.to_string())
        })
    }

    /// Registered root channels, in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Channel<T>> {
        self.inner.lock().borrow().values().cloned().collect()
    }

    /// Number of registered root channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().borrow().len()
    }

    /// Returns true if no root channel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Debug for ChannelRegistry<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("roots", &self.len())
            .finish()
    }
}

impl<T: Copy> Display for ChannelRegistry<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let roots = self.list();
        writeln!(f, "** Channels ({}) **", roots.len())?;
        for root in &roots {
            write!(f, "{root}")?;
            for child in root.children() {
                write!(f, "{child}")?;
            }
        }
        Ok(())
    }
}
