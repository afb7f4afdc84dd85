// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message dispatcher: routes decoded messages to subscribed callbacks.
//!
//! Handlers are closures that capture whatever context they need. For a
//! given message, every live subscription whose type matches and whose
//! sender filter accepts the sender fires, in subscription order.
//!
//! Subscriptions made with [`Dispatcher::subscribe_any`] match every
//! non-system type. They fire before the type-specific ones, in their own
//! subscription order.
//!
//! The list of matching subscriptions is snapshotted before any callback
//! runs, so callbacks may subscribe or unsubscribe (themselves included)
//! freely:
//! - a subscription added during dispatch first sees the *next* message;
//! - a subscription removed during dispatch and not yet invoked is skipped.
//!
//! [`Dispatcher`] is built on `Rc`, so it is neither `Send` nor `Sync`;
//! handing one to another thread does not compile.
//!
//! # Example
//!
//! ```
//! use peerbus::dispatch::{Dispatcher, HandlerResult, SenderFilter};
//! use peerbus::message::Message;
//! use peerbus::registry::{SenderId, TypeId};
//! use peerbus::time::Timestamp;
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.subscribe(TypeId(7), SenderFilter::Any, false, |msg| {
//!     println!("{} bytes from {}", msg.payload.len(), msg.sender_id);
//!     HandlerResult::Ok
//! });
//! let msg = Message::new(TypeId(7), SenderId(0), Timestamp::ZERO, b"hi");
//! assert_eq!(dispatcher.dispatch(&msg), Ok(1));
//! ```

use crate::message::Message;
use crate::registry::{is_system_type, SenderId, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Which senders a subscription accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderFilter {
    Any,
    Only(SenderId),
}

impl SenderFilter {
    pub fn matches(&self, sender: SenderId) -> bool {
        match self {
            SenderFilter::Any => true,
            SenderFilter::Only(s) => *s == sender,
        }
    }
}

/// Outcome of one handler invocation.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    Ok,
    /// The handler cannot trust the connection any more; delivery of the
    /// current message stops and the owning endpoint is torn down.
    Fatal,
}

/// Token returned by [`Dispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// A handler returned [`HandlerResult::Fatal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFault {
    pub handle: SubscriptionHandle,
    pub type_id: TypeId,
    pub sender_id: SenderId,
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handler {:?} failed fatally on {} from {}",
            self.handle, self.type_id, self.sender_id
        )
    }
}

impl std::error::Error for HandlerFault {}

type Callback = Box<dyn FnMut(&Message<'_>) -> HandlerResult>;

struct Subscription {
    handle: SubscriptionHandle,
    // None: any non-system type.
    type_id: Option<TypeId>,
    filter: SenderFilter,
    auto_delete: bool,
    callback: Rc<RefCell<Callback>>,
    live: Rc<Cell<bool>>,
}

#[derive(Default)]
struct Table {
    subs: Vec<Subscription>,
    next_handle: u64,
}

impl Table {
    fn remove_where<P>(&mut self, mut pred: P) -> usize
    where
        P: FnMut(&Subscription) -> bool,
    {
        let before = self.subs.len();
        self.subs.retain(|s| {
            if pred(s) {
                s.live.set(false);
                false
            } else {
                true
            }
        });
        before - self.subs.len()
    }
}

/// Shared handle to a subscription table. Clones refer to the same table.
#[derive(Clone, Default)]
pub struct Dispatcher {
    table: Rc<RefCell<Table>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for messages of `type_id` accepted by `filter`.
    ///
    /// `auto_delete` subscriptions are removed by
    /// [`remove_auto_deleted`](Self::remove_auto_deleted), which endpoints
    /// call when they are torn down.
    pub fn subscribe<F>(
        &self,
        type_id: TypeId,
        filter: SenderFilter,
        auto_delete: bool,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(&Message<'_>) -> HandlerResult + 'static,
    {
        self.insert(Some(type_id), filter, auto_delete, Box::new(callback))
    }

    /// Register `callback` for every non-system message type accepted by
    /// `filter`. These handlers run ahead of the type-specific ones.
    pub fn subscribe_any<F>(
        &self,
        filter: SenderFilter,
        auto_delete: bool,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(&Message<'_>) -> HandlerResult + 'static,
    {
        self.insert(None, filter, auto_delete, Box::new(callback))
    }

    fn insert(
        &self,
        type_id: Option<TypeId>,
        filter: SenderFilter,
        auto_delete: bool,
        callback: Callback,
    ) -> SubscriptionHandle {
        let mut table = self.table.borrow_mut();
        let handle = SubscriptionHandle(table.next_handle);
        table.next_handle += 1;
        table.subs.push(Subscription {
            handle,
            type_id,
            filter,
            auto_delete,
            callback: Rc::new(RefCell::new(callback)),
            live: Rc::new(Cell::new(true)),
        });
        handle
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.table.borrow_mut().remove_where(|s| s.handle == handle) > 0
    }

    /// Deliver `msg` to every matching subscription.
    ///
    /// Returns how many handlers ran, or the first fatal result (later
    /// handlers do not see the message).
    pub fn dispatch(&self, msg: &Message<'_>) -> Result<usize, HandlerFault> {
        let snapshot: Vec<_> = {
            let table = self.table.borrow();
            let accepts = |s: &&Subscription| s.filter.matches(msg.sender_id);
            let wildcards = table
                .subs
                .iter()
                .filter(|s| s.type_id.is_none() && !is_system_type(msg.type_id));
            let typed = table
                .subs
                .iter()
                .filter(|s| s.type_id == Some(msg.type_id));
            wildcards
                .chain(typed)
                .filter(accepts)
                .map(|s| (s.handle, Rc::clone(&s.callback), Rc::clone(&s.live)))
                .collect()
        };

        let mut invoked = 0;
        for (handle, callback, live) in snapshot {
            if !live.get() {
                continue;
            }
            let Ok(mut cb) = callback.try_borrow_mut() else {
                log::warn!(
                    "[Dispatcher::dispatch] handler {:?} re-entered on {}, skipped",
                    handle,
                    msg.type_id
                );
                continue;
            };
            invoked += 1;
            if (&mut **cb)(msg) == HandlerResult::Fatal {
                return Err(HandlerFault {
                    handle,
                    type_id: msg.type_id,
                    sender_id: msg.sender_id,
                });
            }
        }
        Ok(invoked)
    }

    /// Drop every `auto_delete` subscription; returns how many were removed.
    pub fn remove_auto_deleted(&self) -> usize {
        self.table.borrow_mut().remove_where(|s| s.auto_delete)
    }

    pub fn len(&self) -> usize {
        self.table.borrow().subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscriptions for `type_id`, any filter. Any-type
    /// subscriptions are not counted.
    pub fn count_for(&self, type_id: TypeId) -> usize {
        self.table
            .borrow()
            .subs
            .iter()
            .filter(|s| s.type_id == Some(type_id))
            .count()
    }

    /// Non-owning handle, for handlers that need to unsubscribe themselves
    /// without creating a reference cycle.
    pub fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            table: Rc::downgrade(&self.table),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscriptions", &self.len())
            .finish()
    }
}

/// Weak counterpart of [`Dispatcher`].
#[derive(Clone)]
pub struct WeakDispatcher {
    table: Weak<RefCell<Table>>,
}

impl WeakDispatcher {
    pub fn upgrade(&self) -> Option<Dispatcher> {
        self.table.upgrade().map(|table| Dispatcher { table })
    }

    /// Unsubscribe if the dispatcher still exists.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.upgrade().is_some_and(|d| d.unsubscribe(handle))
    }
}
