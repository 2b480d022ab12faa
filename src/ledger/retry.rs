//! Bounded retry queue for writes that failed transiently.
//!
//! Each flush attempts every queued row once. A row that keeps failing is
//! dropped at the ceiling and the loss surfaced as a warning; bounded effort
//! is the deliberate trade against unbounded growth during an outage.

use crate::logging::{json_log, json_warn, obj, v_i64, v_str};

use super::store::LedgerWriter;
use super::{LedgerRow, OpKind};

#[derive(Debug)]
pub struct FailedWrite {
    pub row: LedgerRow,
    pub op: OpKind,
    pub retry_count: u32,
}

pub struct RetryQueue {
    entries: Vec<FailedWrite>,
    ceiling: u32,
}

impl RetryQueue {
    pub fn new(ceiling: u32) -> Self {
        Self { entries: Vec::new(), ceiling }
    }

    /// Fire-and-forget; the row is held until a flush persists or drops it.
    pub fn enqueue(&mut self, row: LedgerRow, op: OpKind) {
        self.entries.push(FailedWrite { row, op, retry_count: 0 });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attempt each queued row once. Returns how many were persisted.
    pub fn flush(&mut self, sink: &mut dyn LedgerWriter) -> usize {
        let mut persisted = 0;
        let mut keep = Vec::new();

        for mut entry in self.entries.drain(..) {
            match sink.apply(&entry.row, entry.op) {
                Ok(rows) if rows > 0 => {
                    persisted += 1;
                    json_log(
                        "retry_queue",
                        obj(&[("op", v_str("write_recovered")), ("row", v_str(entry.row.kind()))]),
                    );
                }
                _ => {
                    entry.retry_count += 1;
                    if entry.retry_count >= self.ceiling {
                        // Permanent loss for this row.
                        json_warn(
                            "retry_queue",
                            obj(&[
                                ("op", v_str("write_dropped")),
                                ("row", v_str(entry.row.kind())),
                                ("attempts", v_i64(entry.retry_count as i64)),
                            ]),
                        );
                    } else {
                        keep.push(entry);
                    }
                }
            }
        }

        self.entries = keep;
        persisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::store::StorageError;
    use crate::ledger::{Trade, WealthChange, WealthChangeType};

    /// Scripted sink: fails the first `fail_times` applies, then succeeds.
    struct FlakySink {
        fail_times: u32,
        applied: Vec<&'static str>,
    }

    impl LedgerWriter for FlakySink {
        fn apply(&mut self, row: &LedgerRow, _op: OpKind) -> Result<usize, StorageError> {
            if self.fail_times > 0 {
                self.fail_times -= 1;
                return Err(StorageError::Unavailable("disk gone".to_string()));
            }
            self.applied.push(row.kind());
            Ok(1)
        }
    }

    fn change_row() -> LedgerRow {
        LedgerRow::WealthChange(WealthChange {
            character_id: 7,
            character_name: "Aeryn Vale".to_string(),
            owner_id: 0,
            owner: None,
            wealth: 500,
            wealth_difference: -500,
            change_type: WealthChangeType::Teleport,
            timestamp: 0,
        })
    }

    #[test]
    fn succeeds_on_third_attempt_and_is_removed() {
        let mut queue = RetryQueue::new(3);
        let mut sink = FlakySink { fail_times: 2, applied: Vec::new() };
        queue.enqueue(change_row(), OpKind::Insert);

        assert_eq!(queue.flush(&mut sink), 0);
        assert_eq!(queue.flush(&mut sink), 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.flush(&mut sink), 1);
        assert!(queue.is_empty());
        assert_eq!(sink.applied, vec!["wealth_change"]);

        // Nothing left to re-attempt.
        assert_eq!(queue.flush(&mut sink), 0);
        assert_eq!(sink.applied.len(), 1);
    }

    #[test]
    fn dropped_after_ceiling_and_never_retried() {
        let mut queue = RetryQueue::new(3);
        let mut sink = FlakySink { fail_times: u32::MAX, applied: Vec::new() };
        queue.enqueue(change_row(), OpKind::Insert);

        queue.flush(&mut sink);
        queue.flush(&mut sink);
        assert_eq!(queue.len(), 1);
        queue.flush(&mut sink);
        assert!(queue.is_empty());

        // A later healthy sink sees nothing: the row is gone for good.
        let mut healthy = FlakySink { fail_times: 0, applied: Vec::new() };
        assert_eq!(queue.flush(&mut healthy), 0);
        assert!(healthy.applied.is_empty());
    }

    #[test]
    fn zero_rowcount_counts_as_a_failed_attempt() {
        struct ZeroSink;
        impl LedgerWriter for ZeroSink {
            fn apply(&mut self, _row: &LedgerRow, _op: OpKind) -> Result<usize, StorageError> {
                Ok(0)
            }
        }
        let mut queue = RetryQueue::new(3);
        queue.enqueue(
            LedgerRow::Trade(Trade {
                character_id: 7,
                character_name: "Aeryn Vale".to_string(),
                trade_partner: "Mira Sunstone".to_string(),
                net_received: 100,
                timestamp: 0,
            }),
            OpKind::Insert,
        );
        let mut sink = ZeroSink;
        queue.flush(&mut sink);
        queue.flush(&mut sink);
        queue.flush(&mut sink);
        assert!(queue.is_empty());
    }
}
