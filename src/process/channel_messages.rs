//! Per-channel ordering and deduplication of messages coming from several files.
//!
//! Exports are chronological within one file, but files can be supplied in
//! any order and can overlap at the edges. Each run of messages between two
//! [`ChannelMessages::mark_eof`] calls becomes a [`MessagesInterval`]; a
//! message whose timestamp falls inside an interval other than the open one
//! is treated as a duplicate and dropped.
//!
//! Two distinct messages sharing a timestamp inside an already closed
//! interval are indistinguishable here: the second one is dropped.

use std::collections::HashMap;

use log::debug;

use crate::parse::{PMessage, RawId, Timestamp};

/// Messages contained in the closed time range `[start, end]`.
#[derive(Debug)]
pub struct MessagesInterval<M> {
    start: Timestamp,
    end: Timestamp,
    /// Not yet processed, in arrival order.
    queue: Vec<PMessage>,
    processed: Vec<M>,
    /// Position of each message inside this interval.
    id_to_index: HashMap<RawId, usize>,
}

impl<M> MessagesInterval<M> {
    fn new(first: PMessage) -> Self {
        let mut interval = Self {
            start: first.timestamp,
            end: first.timestamp,
            queue: Vec::new(),
            processed: Vec::new(),
            id_to_index: HashMap::new(),
        };
        interval.add_message_and_extend(first);
        interval
    }

    /// Appends `message` and moves the end of the interval up to it.
    ///
    /// # Panics
    ///
    /// Panics if `message` is older than the end of the interval.
    fn add_message_and_extend(&mut self, message: PMessage) {
        assert!(
            message.timestamp >= self.end,
            "an interval can only be extended forward in time ({} < {})",
            message.timestamp,
            self.end
        );
        self.id_to_index.insert(message.id.clone(), self.num_messages());
        self.end = message.timestamp;
        self.queue.push(message);
    }

    fn process<F>(&mut self, f: &mut F)
    where
        F: FnMut(Vec<PMessage>) -> Vec<M>,
    {
        if self.queue.is_empty() {
            return;
        }
        let group = std::mem::take(&mut self.queue);
        self.processed.extend(f(group));
    }

    pub fn is_contained(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Pending plus processed messages.
    pub fn num_messages(&self) -> usize {
        self.queue.len() + self.processed.len()
    }

    pub fn num_pending(&self) -> usize {
        self.queue.len()
    }

    pub fn processed(&self) -> &[M] {
        &self.processed
    }

    pub fn index_of(&self, id: &RawId) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }
}

/// All the intervals of one channel, sorted by start.
#[derive(Debug)]
pub struct ChannelMessages<M> {
    intervals: Vec<MessagesInterval<M>>,
    /// Position of the interval new messages are appended to.
    open: Option<usize>,
    dropped: usize,
}

impl<M> Default for ChannelMessages<M> {
    fn default() -> Self {
        Self {
            intervals: Vec::new(),
            open: None,
            dropped: 0,
        }
    }
}

impl<M> ChannelMessages<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `message`, returning `false` if it was dropped as a duplicate.
    ///
    /// # Panics
    ///
    /// Panics if an interval is open and `message` is older than its end.
    /// Callers must call [`mark_eof`](Self::mark_eof) before feeding messages
    /// that go back in time.
    pub fn add_message(&mut self, message: PMessage) -> bool {
        let ts = message.timestamp;
        let duplicate = self
            .intervals
            .iter()
            .enumerate()
            .any(|(i, interval)| Some(i) != self.open && interval.is_contained(ts));
        if duplicate {
            self.dropped += 1;
            return false;
        }

        match self.open {
            Some(open) => self.intervals[open].add_message_and_extend(message),
            None => {
                let pos = self.intervals.partition_point(|i| i.start <= ts);
                debug!("New interval starting at {} (position {})", ts, pos);
                self.intervals.insert(pos, MessagesInterval::new(message));
                self.open = Some(pos);
            }
        }
        true
    }

    /// Closes the open interval, if any.
    ///
    /// Remember to [`process`](Self::process) the leftover messages.
    pub fn mark_eof(&mut self) {
        self.open = None;
    }

    /// Hands every pending queue to `f` and stores what it returns.
    ///
    /// Each call of `f` receives the whole queue of one interval in arrival
    /// order, whatever the authors. Intervals without pending messages are
    /// skipped, so calling this again right away does nothing.
    pub fn process<F>(&mut self, mut f: F)
    where
        F: FnMut(Vec<PMessage>) -> Vec<M>,
    {
        for interval in &mut self.intervals {
            interval.process(&mut f);
        }
    }

    /// Processed messages in interval-start order.
    pub fn processed_messages(&self) -> impl Iterator<Item = &M> + '_ {
        self.intervals.iter().flat_map(|i| i.processed.iter())
    }

    /// Chronological position of the message with `id`, counting every
    /// message of earlier intervals.
    pub fn index_of(&self, id: &RawId) -> Option<usize> {
        let mut offset = 0;
        for interval in &self.intervals {
            if let Some(index) = interval.index_of(id) {
                return Some(offset + index);
            }
            offset += interval.num_messages();
        }
        None
    }

    pub fn num_messages(&self) -> usize {
        self.intervals.iter().map(MessagesInterval::num_messages).sum()
    }

    /// Messages dropped because their timestamp was already covered.
    pub fn num_dropped(&self) -> usize {
        self.dropped
    }

    pub fn intervals(&self) -> &[MessagesInterval<M>] {
        &self.intervals
    }

    pub fn has_open_interval(&self) -> bool {
        self.open.is_some()
    }

    /// Timestamp of the last message appended to the open interval.
    pub fn open_end(&self) -> Option<Timestamp> {
        self.open.map(|open| self.intervals[open].end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64, ts: Timestamp) -> PMessage {
        PMessage {
            id: RawId::Number(id),
            channel_id: RawId::Number(1),
            author_id: RawId::Number(id % 2),
            timestamp: ts,
            timestamp_edit: None,
            reply_to: None,
            text: None,
            attachments: Vec::new(),
            reactions: Vec::new(),
        }
    }

    fn identity(group: Vec<PMessage>) -> Vec<Timestamp> {
        group.into_iter().map(|m| m.timestamp).collect()
    }

    #[test]
    fn test_overlapping_files() {
        let mut cm = ChannelMessages::new();
        for ts in [10, 11, 12] {
            assert!(cm.add_message(msg(ts as u64, ts)));
        }
        cm.mark_eof();
        for ts in [7, 8, 9] {
            assert!(cm.add_message(msg(ts as u64, ts)));
        }
        assert!(!cm.add_message(msg(100, 10)));
        cm.mark_eof();

        assert_eq!(cm.num_messages(), 6);
        assert_eq!(cm.num_dropped(), 1);

        cm.process(identity);
        let order: Vec<Timestamp> = cm.processed_messages().copied().collect();
        assert_eq!(order, vec![7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_index_of_counts_earlier_intervals() {
        let mut cm: ChannelMessages<Timestamp> = ChannelMessages::new();
        cm.add_message(msg(1, 100));
        cm.add_message(msg(2, 200));
        cm.mark_eof();
        cm.add_message(msg(3, 10));
        cm.add_message(msg(4, 20));

        assert_eq!(cm.index_of(&RawId::Number(3)), Some(0));
        assert_eq!(cm.index_of(&RawId::Number(4)), Some(1));
        assert_eq!(cm.index_of(&RawId::Number(1)), Some(2));
        assert_eq!(cm.index_of(&RawId::Number(2)), Some(3));
        assert_eq!(cm.index_of(&RawId::Number(5)), None);
    }

    #[test]
    fn test_process_passes_whole_queue() {
        let mut cm = ChannelMessages::new();
        for (id, ts) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
            cm.add_message(msg(id, ts));
        }
        let mut calls = Vec::new();
        cm.process(|group| {
            calls.push(group.len());
            identity(group)
        });
        assert_eq!(calls, vec![4]);

        // nothing pending anymore
        cm.process(|group| {
            calls.push(group.len());
            identity(group)
        });
        assert_eq!(calls, vec![4]);

        // the open interval keeps growing after processing
        cm.add_message(msg(5, 5));
        cm.process(identity);
        assert_eq!(cm.num_messages(), 5);
        assert_eq!(cm.intervals().len(), 1);
        assert_eq!(cm.intervals()[0].num_pending(), 0);
    }

    #[test]
    fn test_open_interval_accepts_equal_timestamps() {
        let mut cm: ChannelMessages<Timestamp> = ChannelMessages::new();
        assert!(cm.add_message(msg(1, 5)));
        assert!(cm.add_message(msg(2, 5)));
        assert_eq!(cm.open_end(), Some(5));
        cm.mark_eof();
        assert!(!cm.has_open_interval());
        assert_eq!(cm.open_end(), None);
        // same timestamp in a closed interval is a duplicate
        assert!(!cm.add_message(msg(3, 5)));
        assert_eq!(cm.num_messages(), 2);
    }

    #[test]
    fn test_intervals_sorted_by_start() {
        let mut cm: ChannelMessages<Timestamp> = ChannelMessages::new();
        for start in [50, 10, 30] {
            cm.add_message(msg(start as u64, start));
            cm.add_message(msg(start as u64 + 1, start + 1));
            cm.mark_eof();
        }
        let starts: Vec<Timestamp> = cm.intervals().iter().map(|i| i.start()).collect();
        assert_eq!(starts, vec![10, 30, 50]);
        assert_eq!(cm.intervals()[0].end(), 11);
    }

    #[test]
    #[should_panic(expected = "forward in time")]
    fn test_going_back_without_eof_panics() {
        let mut cm: ChannelMessages<Timestamp> = ChannelMessages::new();
        cm.add_message(msg(1, 10));
        cm.add_message(msg(2, 5));
    }
}
