//! Subscription edges between traced roots.
//!
//! Embedding root `S` somewhere inside root `R`'s tree makes `R` a receiver
//! of `S`: every record `S` produces is re-addressed under the embedding
//! site and delivered to `R` as well, and from there onward to `R`'s own
//! receivers. A root embedded at several sites of the same receiver
//! forwards once per site.
//!
//! Edges are stored on the sender and hold the receiver and each site's
//! parent container weakly. Edges whose receiver or site has been dropped
//! are pruned the next time the sender fans out.

use crate::error::{FabricError, FabricResult};
use crate::item::Item;
use crate::metadata;
use crate::mutation::Mutation;
use crate::node::{NodeRef, WeakNodeRef};
use crate::root::RootState;
use crate::structure::Kind;
use crate::{Key, Path, TracedNode};
use std::rc::Rc;
use tracing::{debug, trace};

/// Receiver edge: the receiving root and where the sender sits in its tree.
pub(crate) struct Subscription {
    receiver: WeakNodeRef,
    sites: Vec<Site>,
}

/// Container holding the sender, and the key it is stored under.
struct Site {
    parent: WeakNodeRef,
    key: Key,
}

impl Site {
    fn is_at(&self, parent: &NodeRef, key: &Key) -> bool {
        std::ptr::eq(self.parent.as_ptr(), Rc::as_ptr(parent)) && &self.key == key
    }
}

impl Subscription {
    fn is_for(&self, receiver: &NodeRef) -> bool {
        std::ptr::eq(self.receiver.as_ptr(), Rc::as_ptr(receiver))
    }
}

fn state_of(node: &TracedNode) -> Option<Rc<RootState>> {
    node.0.borrow().root.clone()
}

fn push_site(state: &RootState, receiver: &NodeRef, parent: &NodeRef, key: Key) {
    let site = Site {
        parent: Rc::downgrade(parent),
        key,
    };
    let mut subscriptions = state.subscribers.borrow_mut();
    match subscriptions.iter_mut().find(|s| s.is_for(receiver)) {
        Some(subscription) => subscription.sites.push(site),
        None => subscriptions.push(Subscription {
            receiver: Rc::downgrade(receiver),
            sites: vec![site],
        }),
    }
}

/// Subscribe `receiver` to `sender`, with `sender` stored at `parent[key]`.
///
/// Both nodes must be roots, and the edge must not close a cycle. The key
/// must match `parent`'s kind, and an array index must be in range.
pub fn add_subscriber(
    sender: &TracedNode,
    receiver: &TracedNode,
    parent: &TracedNode,
    key: Key,
) -> FabricResult<()> {
    let state = state_of(sender).ok_or(FabricError::NotARoot)?;
    if !receiver.is_root() {
        return Err(FabricError::NotARoot);
    }
    if sender.ptr_eq(receiver) || forwards_to(receiver, sender) {
        return Err(FabricError::CyclicEmbedding);
    }
    match (parent.kind(), &key) {
        (Kind::Object, Key::Field(_)) => {}
        (Kind::Array, Key::Index(index)) if *index < parent.len() => {}
        (Kind::Array, Key::Index(index)) => {
            return Err(FabricError::index_out_of_bounds(
                parent.path(),
                *index,
                parent.len(),
            ))
        }
        (kind, _) => return Err(FabricError::key_mismatch(kind, key.clone())),
    }
    debug!(key = %key, "subscriber added");
    push_site(&state, &receiver.0, &parent.0, key);
    Ok(())
}

/// Drop one site of the `sender` → `receiver` edge; the edge goes away
/// with its last site.
pub fn remove_subscriber(sender: &TracedNode, receiver: &TracedNode, parent: &TracedNode, key: &Key) {
    let Some(state) = state_of(sender) else {
        return;
    };
    let mut subscriptions = state.subscribers.borrow_mut();
    if let Some(subscription) = subscriptions.iter_mut().find(|s| s.is_for(&receiver.0)) {
        if let Some(pos) = subscription.sites.iter().position(|s| s.is_at(&parent.0, key)) {
            subscription.sites.remove(pos);
            debug!(key = %key, "subscriber site removed");
        }
    }
    subscriptions.retain(|s| !s.sites.is_empty());
}

/// Drop the whole `sender` → `receiver` edge, all sites included.
pub fn remove_subscription(sender: &TracedNode, receiver: &TracedNode) {
    let Some(state) = state_of(sender) else {
        return;
    };
    let mut subscriptions = state.subscribers.borrow_mut();
    let before = subscriptions.len();
    subscriptions.retain(|s| !s.is_for(&receiver.0));
    if subscriptions.len() != before {
        debug!("subscription removed");
    }
}

/// Live receivers of `sender`.
pub fn receivers(sender: &TracedNode) -> Vec<TracedNode> {
    let Some(state) = state_of(sender) else {
        return Vec::new();
    };
    let subscriptions = state.subscribers.borrow();
    subscriptions
        .iter()
        .filter_map(|s| s.receiver.upgrade().map(TracedNode))
        .collect()
}

/// Paths, inside `receiver`, of every live site where `sender` is embedded.
pub fn subscription_sites(sender: &TracedNode, receiver: &TracedNode) -> Vec<Path> {
    let Some(state) = state_of(sender) else {
        return Vec::new();
    };
    let subscriptions = state.subscribers.borrow();
    subscriptions
        .iter()
        .filter(|s| s.is_for(&receiver.0))
        .flat_map(|s| s.sites.iter())
        .filter_map(|site| {
            let parent = site.parent.upgrade()?;
            Some(metadata::locate(&parent).0.with(site.key.clone()))
        })
        .collect()
}

/// Whether records of `from` reach `to`, directly or through other roots.
pub(crate) fn forwards_to(from: &TracedNode, to: &TracedNode) -> bool {
    let mut pending = vec![from.clone()];
    let mut seen: Vec<TracedNode> = Vec::new();
    while let Some(current) = pending.pop() {
        if seen.iter().any(|s| s.ptr_eq(&current)) {
            continue;
        }
        for receiver in receivers(&current) {
            if receiver.ptr_eq(to) {
                return true;
            }
            pending.push(receiver);
        }
        seen.push(current);
    }
    false
}

/// Subscribe the root of `parent`'s tree to `sender`, now stored at
/// `parent[key]`. Nothing to do while `parent` is not attached to a root.
pub(crate) fn attach(sender: &TracedNode, parent: &NodeRef, key: Key) {
    let Some(state) = state_of(sender) else {
        return;
    };
    let (path, top) = metadata::locate(parent);
    if top.borrow().root.is_none() {
        trace!(path = %path, "root embedded in detached node, no subscription");
        return;
    }
    debug!(site = %path.clone().with(key.clone()), "embedded root subscribed");
    push_site(&state, &top, parent, key);
}

/// Release an item that is being overwritten or removed from
/// `parent[key]`.
///
/// An embedded root loses that one site. A nested node is detached from
/// its parent, and every root embedded anywhere below it loses its site.
pub(crate) fn remove_subscriber_subtree(item: &Item, parent: &NodeRef, key: &Key) {
    let Item::Node(node) = item else {
        return;
    };
    if node.is_root() {
        drop_site(node, parent, key);
        return;
    }
    unsubscribe_below(node);
    node.0.borrow_mut().link = None;
}

fn unsubscribe_below(node: &TracedNode) {
    for (key, child) in node.entries() {
        match child {
            Item::Node(child) if child.is_root() => drop_site(&child, &node.0, &key),
            Item::Node(child) => unsubscribe_below(&child),
            _ => {}
        }
    }
}

fn drop_site(sender: &TracedNode, parent: &NodeRef, key: &Key) {
    let Some(state) = state_of(sender) else {
        return;
    };
    let mut subscriptions = state.subscribers.borrow_mut();
    for subscription in subscriptions.iter_mut() {
        if let Some(pos) = subscription.sites.iter().position(|s| s.is_at(parent, key)) {
            subscription.sites.remove(pos);
            trace!(key = %key, "embedded root released");
            break;
        }
    }
    subscriptions.retain(|s| !s.sites.is_empty());
}

/// Re-key `sender`'s sites in `parent` after the array was reordered.
///
/// Sites the remap has no position for are dropped.
pub(crate) fn remap_sites(
    sender: &TracedNode,
    parent: &NodeRef,
    remap: &dyn Fn(usize) -> Option<usize>,
) {
    let Some(state) = state_of(sender) else {
        return;
    };
    let mut subscriptions = state.subscribers.borrow_mut();
    for subscription in subscriptions.iter_mut() {
        subscription.sites.retain_mut(|site| {
            if !std::ptr::eq(site.parent.as_ptr(), Rc::as_ptr(parent)) {
                return true;
            }
            let Key::Index(i) = site.key else {
                return true;
            };
            match remap(i) {
                Some(j) => {
                    site.key = Key::Index(j);
                    true
                }
                None => {
                    debug!(index = i, "subscription site out of range, dropped");
                    false
                }
            }
        });
    }
    subscriptions.retain(|s| !s.sites.is_empty());
}

/// Forward `mutation`, just recorded by the root owning `state`, to every
/// receiver once per site.
pub(crate) fn fan_out(state: &RootState, mutation: &Mutation) {
    let targets = {
        let mut subscriptions = state.subscribers.borrow_mut();
        prune(&mut subscriptions);

        let mut targets = Vec::new();
        for subscription in subscriptions.iter() {
            let Some(receiver) = subscription.receiver.upgrade() else {
                continue;
            };
            let Some(receiver_state) = receiver.borrow().root.clone() else {
                continue;
            };
            for site in &subscription.sites {
                let Some(parent) = site.parent.upgrade() else {
                    continue;
                };
                let prefix = metadata::locate(&parent).0.with(site.key.clone());
                targets.push((receiver_state.clone(), mutation.prefixed(&prefix)));
            }
        }
        targets
    };

    for (receiver, forwarded) in targets {
        trace!(path = %forwarded.path, op = forwarded.op.name(), "forwarding record");
        receiver.deliver(forwarded);
    }
}

fn prune(subscriptions: &mut Vec<Subscription>) {
    let before: usize = subscriptions.iter().map(|s| s.sites.len()).sum();
    subscriptions.retain_mut(|s| {
        if s.receiver.strong_count() == 0 {
            return false;
        }
        s.sites.retain(|site| site.parent.strong_count() > 0);
        !s.sites.is_empty()
    });
    let after: usize = subscriptions.iter().map(|s| s.sites.len()).sum();
    if after != before {
        debug!(pruned = before - after, "dropped stale subscription sites");
    }
}
