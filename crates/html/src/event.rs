//! Event slab and the doubly-linked queues threaded through it.
//!
//! All events for a parse live in one arena; the flush-window queue and the
//! per-node deferred lists are separate chains over the same slots, so moving
//! a range between them never reallocates or invalidates handles.

use crate::node::{EventId, NodeId};

/// What a queue slot represents. Leaf events cover Characters, Comment,
/// Cdata, IEDirective and Directive nodes; the node data disambiguates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EventKind {
    StartDocument,
    EndDocument,
    StartElement(NodeId),
    EndElement(NodeId),
    Leaf(NodeId),
}

impl EventKind {
    pub(crate) fn node(self) -> Option<NodeId> {
        match self {
            EventKind::StartDocument | EventKind::EndDocument => None,
            EventKind::StartElement(n) | EventKind::EndElement(n) | EventKind::Leaf(n) => Some(n),
        }
    }

    pub(crate) fn start_element(self) -> Option<NodeId> {
        match self {
            EventKind::StartElement(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn end_element(self) -> Option<NodeId> {
        match self {
            EventKind::EndElement(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn leaf(self) -> Option<NodeId> {
        match self {
            EventKind::Leaf(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct EventSlot {
    kind: EventKind,
    line: u32,
    prev: Option<EventId>,
    next: Option<EventId>,
    // True only while the slot is chained into the flush-window queue;
    // deferred lists and detached slots leave it false.
    in_window: bool,
}

/// Arena of event slots. Slots are never reused within a parse; a slot
/// removed from every chain simply becomes unreachable.
#[derive(Debug, Default)]
pub(crate) struct EventArena {
    slots: Vec<EventSlot>,
}

impl EventArena {
    pub(crate) fn alloc(&mut self, kind: EventKind, line: u32) -> EventId {
        debug_assert!(self.slots.len() < u32::MAX as usize);
        let id = EventId(self.slots.len() as u32);
        self.slots.push(EventSlot {
            kind,
            line,
            prev: None,
            next: None,
            in_window: false,
        });
        id
    }

    pub(crate) fn kind(&self, id: EventId) -> EventKind {
        self.slots[id.0 as usize].kind
    }

    pub(crate) fn line(&self, id: EventId) -> u32 {
        self.slots[id.0 as usize].line
    }

    pub(crate) fn next(&self, id: EventId) -> Option<EventId> {
        self.slots[id.0 as usize].next
    }

    pub(crate) fn prev(&self, id: EventId) -> Option<EventId> {
        self.slots[id.0 as usize].prev
    }

    pub(crate) fn in_window(&self, id: EventId) -> bool {
        self.slots[id.0 as usize].in_window
    }

    fn slot_mut(&mut self, id: EventId) -> &mut EventSlot {
        &mut self.slots[id.0 as usize]
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}

/// One chain over the arena: either the flush-window queue or a deferred
/// node's saved events. Operations are element-at-a-time; windows are small
/// enough that splice-by-walk is not a bottleneck.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    head: Option<EventId>,
    tail: Option<EventId>,
    // Membership in this chain counts as "in the event window".
    window: bool,
}

impl EventQueue {
    pub(crate) fn window() -> Self {
        EventQueue { head: None, tail: None, window: true }
    }

    pub(crate) fn detached() -> Self {
        EventQueue::default()
    }

    pub(crate) fn head(&self) -> Option<EventId> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<EventId> {
        self.tail
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn push_back(&mut self, arena: &mut EventArena, id: EventId) {
        self.insert_before(arena, None, id);
    }

    /// Insert `id` before `at`; `at == None` appends at the back, matching
    /// insertion before a one-past-the-end cursor.
    pub(crate) fn insert_before(&mut self, arena: &mut EventArena, at: Option<EventId>, id: EventId) {
        let prev = match at {
            Some(at) => arena.prev(at),
            None => self.tail,
        };
        {
            let slot = arena.slot_mut(id);
            slot.prev = prev;
            slot.next = at;
            slot.in_window = self.window;
        }
        match prev {
            Some(p) => arena.slot_mut(p).next = Some(id),
            None => self.head = Some(id),
        }
        match at {
            Some(a) => arena.slot_mut(a).prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    /// Unlink `id` from this chain and return the event that followed it.
    pub(crate) fn remove(&mut self, arena: &mut EventArena, id: EventId) -> Option<EventId> {
        let (prev, next) = {
            let slot = arena.slot_mut(id);
            let pair = (slot.prev, slot.next);
            slot.prev = None;
            slot.next = None;
            slot.in_window = false;
            pair
        };
        match prev {
            Some(p) => arena.slot_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => arena.slot_mut(n).prev = prev,
            None => self.tail = prev,
        }
        next
    }

    /// The inclusive range `[first, last]` as a vector of handles. The range
    /// must be a contiguous run of this chain.
    pub(crate) fn collect_range(
        &self,
        arena: &EventArena,
        first: EventId,
        last: EventId,
    ) -> Vec<EventId> {
        let mut out = Vec::new();
        let mut cursor = Some(first);
        while let Some(id) = cursor {
            out.push(id);
            if id == last {
                return out;
            }
            cursor = arena.next(id);
        }
        // A broken range is a structural bug in the caller.
        panic!("event range end not reachable from start");
    }

    /// Move `[first, last]` out of this chain into `dest`, placed before
    /// `before` (or appended when `before` is `None`).
    pub(crate) fn splice_range_into(
        &mut self,
        arena: &mut EventArena,
        first: EventId,
        last: EventId,
        dest: &mut EventQueue,
        before: Option<EventId>,
    ) {
        for id in self.collect_range(arena, first, last) {
            self.remove(arena, id);
            dest.insert_before(arena, before, id);
        }
    }

    /// Move `[first, last]` to a different position in the same chain.
    pub(crate) fn splice_range_before(
        &mut self,
        arena: &mut EventArena,
        first: EventId,
        last: EventId,
        before: Option<EventId>,
    ) {
        for id in self.collect_range(arena, first, last) {
            self.remove(arena, id);
            self.insert_before(arena, before, id);
        }
    }

    /// Drain every event into `dest` before `before`, preserving order.
    pub(crate) fn drain_into(
        &mut self,
        arena: &mut EventArena,
        dest: &mut EventQueue,
        before: Option<EventId>,
    ) {
        while let Some(id) = self.head {
            self.remove(arena, id);
            dest.insert_before(arena, before, id);
        }
    }

    pub(crate) fn iter<'a>(&self, arena: &'a EventArena) -> QueueIter<'a> {
        QueueIter { arena, cursor: self.head }
    }
}

pub(crate) struct QueueIter<'a> {
    arena: &'a EventArena,
    cursor: Option<EventId>,
}

impl Iterator for QueueIter<'_> {
    type Item = EventId;

    fn next(&mut self) -> Option<EventId> {
        let id = self.cursor?;
        self.cursor = self.arena.next(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut EventArena, n: u32) -> EventId {
        arena.alloc(EventKind::Leaf(NodeId(n)), 1)
    }

    fn nodes(queue: &EventQueue, arena: &EventArena) -> Vec<u32> {
        queue
            .iter(arena)
            .filter_map(|id| arena.kind(id).node())
            .map(|n| n.0)
            .collect()
    }

    #[test]
    fn push_insert_remove_keep_links_consistent() {
        let mut arena = EventArena::default();
        let mut q = EventQueue::window();
        let a = leaf(&mut arena, 0);
        let b = leaf(&mut arena, 1);
        let c = leaf(&mut arena, 2);
        q.push_back(&mut arena, a);
        q.push_back(&mut arena, c);
        q.insert_before(&mut arena, Some(c), b);
        assert_eq!(nodes(&q, &arena), vec![0, 1, 2]);
        assert!(arena.in_window(b));

        q.remove(&mut arena, b);
        assert_eq!(nodes(&q, &arena), vec![0, 2]);
        assert!(!arena.in_window(b));
        assert_eq!(q.head(), Some(a));
        assert_eq!(q.tail(), Some(c));
    }

    #[test]
    fn splice_moves_range_between_chains() {
        let mut arena = EventArena::default();
        let mut q = EventQueue::window();
        let ids: Vec<EventId> = (0..5).map(|n| leaf(&mut arena, n)).collect();
        for id in &ids {
            q.push_back(&mut arena, *id);
        }
        let mut saved = EventQueue::detached();
        q.splice_range_into(&mut arena, ids[1], ids[3], &mut saved, None);
        assert_eq!(nodes(&q, &arena), vec![0, 4]);
        assert_eq!(nodes(&saved, &arena), vec![1, 2, 3]);
        assert!(!arena.in_window(ids[2]));

        saved.drain_into(&mut arena, &mut q, Some(ids[4]));
        assert_eq!(nodes(&q, &arena), vec![0, 1, 2, 3, 4]);
        assert!(saved.is_empty());
        assert!(arena.in_window(ids[2]));
    }

    #[test]
    fn splice_within_one_chain_reorders() {
        let mut arena = EventArena::default();
        let mut q = EventQueue::window();
        let ids: Vec<EventId> = (0..4).map(|n| leaf(&mut arena, n)).collect();
        for id in &ids {
            q.push_back(&mut arena, *id);
        }
        // Move [2,3] before 1: 0 2 3 1.
        q.splice_range_before(&mut arena, ids[2], ids[3], Some(ids[1]));
        assert_eq!(nodes(&q, &arena), vec![0, 2, 3, 1]);
    }
}
