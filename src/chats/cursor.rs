/// What a live connection should do with a message it heard about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// The next message in order; already counted as delivered.
    Deliver,
    /// Seen before, drop it.
    Duplicate,
    /// Something in between was missed. Refetch after [`SeqCursor::last`].
    Gap,
}

/// Highest message sequence number a connection has delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeqCursor {
    last: i64,
}

impl SeqCursor {
    pub fn new(last: i64) -> SeqCursor {
        SeqCursor { last: last.max(0) }
    }

    pub fn last(&self) -> i64 {
        self.last
    }

    pub fn observe(&mut self, seq: i64) -> Observed {
        if seq <= self.last {
            Observed::Duplicate
        } else if seq == self.last + 1 {
            self.last = seq;
            Observed::Deliver
        } else {
            Observed::Gap
        }
    }

    /// Records a message delivered from a refetch.
    pub fn advance(&mut self, seq: i64) {
        self.last = self.last.max(seq);
    }
}
