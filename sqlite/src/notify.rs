//! Row-change notifications.
//!
//! The engine reports changes from inside the writing call. The hook only
//! pushes each change into the [`Inbox`]; filtering against the
//! subscriptions and delivery happen later, when the owner polls.

use std::sync::mpsc::{self, Receiver, Sender};

use cipher_sql_core::{ChangeOperation, Notification};
use indexmap::IndexSet;
use tracing::trace;

use crate::ffi::{self, RawChange};

/// Callback invoked for each delivered notification.
pub type NotificationHandler = Box<dyn FnMut(&Notification)>;

/// FIFO queue between the engine hook and the connection owner.
pub(crate) struct Inbox {
    sender: Sender<RawChange>,
    receiver: Receiver<RawChange>,
}

impl Inbox {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// A sender for the engine hook.
    pub(crate) fn sender(&self) -> Sender<RawChange> {
        self.sender.clone()
    }

    /// Takes every queued change, keeping those on subscribed tables.
    pub(crate) fn drain(&self, subscriptions: &IndexSet<String>) -> Vec<Notification> {
        let mut delivered = Vec::new();
        while let Ok(change) = self.receiver.try_recv() {
            if !subscriptions.contains(&change.table) {
                trace!(table = %change.table, "dropping change on unsubscribed table");
                continue;
            }
            trace!(table = %change.table, row_id = change.row_id, "delivering change");
            delivered.push(notification(change));
        }
        delivered
    }

    /// Discards queued changes.
    pub(crate) fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

fn operation(code: i32) -> ChangeOperation {
    match code {
        ffi::SQLITE_INSERT => ChangeOperation::Insert,
        ffi::SQLITE_UPDATE => ChangeOperation::Update,
        ffi::SQLITE_DELETE => ChangeOperation::Delete,
        _ => ChangeOperation::Unknown,
    }
}

fn notification(change: RawChange) -> Notification {
    Notification {
        name: change.table,
        row_id: change.row_id,
        operation: operation(change.operation),
        database: change.database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(table: &str, operation: i32, row_id: i64) -> RawChange {
        RawChange {
            operation,
            database: "main".into(),
            table: table.into(),
            row_id,
        }
    }

    #[test]
    fn test_drain_filters_and_keeps_order() {
        let inbox = Inbox::new();
        let tx = inbox.sender();
        tx.send(change("a", ffi::SQLITE_INSERT, 1)).unwrap();
        tx.send(change("b", ffi::SQLITE_INSERT, 2)).unwrap();
        tx.send(change("a", ffi::SQLITE_DELETE, 3)).unwrap();

        let subs: IndexSet<String> = ["a".to_string()].into_iter().collect();
        let got = inbox.drain(&subs);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].row_id, 1);
        assert_eq!(got[0].operation, ChangeOperation::Insert);
        assert_eq!(got[1].row_id, 3);
        assert_eq!(got[1].operation, ChangeOperation::Delete);
        assert_eq!(got[1].database, "main");
        assert!(inbox.drain(&subs).is_empty());
    }

    #[test]
    fn test_clear_discards() {
        let inbox = Inbox::new();
        inbox.sender().send(change("a", ffi::SQLITE_UPDATE, 1)).unwrap();
        inbox.clear();
        let subs: IndexSet<String> = ["a".to_string()].into_iter().collect();
        assert!(inbox.drain(&subs).is_empty());
    }

    #[test]
    fn test_unknown_operation() {
        assert_eq!(operation(0), ChangeOperation::Unknown);
        assert_eq!(operation(ffi::SQLITE_UPDATE), ChangeOperation::Update);
    }
}
