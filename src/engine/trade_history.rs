//! Fixed-capacity trade history
//!
//! Ring buffer of closed trades in insertion order. Once `capacity` trades
//! are held, each new trade overwrites the oldest one, which is returned to
//! the caller from [`TradeHistory::push`].

use crate::models::TradeRecord;

#[derive(Debug, Clone)]
pub struct TradeHistory {
    slots: Vec<TradeRecord>,
    /// Index of the oldest trade once the buffer is full
    head: usize,
    capacity: usize,
}

impl TradeHistory {
    /// Create an empty history; a zero capacity is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append a trade, returning the evicted oldest trade when full
    pub fn push(&mut self, trade: TradeRecord) -> Option<TradeRecord> {
        if self.slots.len() < self.capacity {
            self.slots.push(trade);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], trade);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    /// Trades from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &TradeRecord> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Most recently inserted trade
    pub fn latest(&self) -> Option<&TradeRecord> {
        if self.slots.is_empty() {
            None
        } else if self.slots.len() < self.capacity || self.head == 0 {
            self.slots.last()
        } else {
            self.slots.get(self.head - 1)
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }
}
