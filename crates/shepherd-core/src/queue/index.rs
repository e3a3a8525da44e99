//! In-flight message index: item id → current receipt handle.

use std::collections::HashMap;

use crate::domain::MessageId;

/// Tracks items that have been handed to a task and not yet resolved.
///
/// One entry per item. A redelivery overwrites the receipt (last write wins),
/// so resolve always uses the newest handle the queue issued.
#[derive(Debug, Default)]
pub struct MessageIndex {
    receipts: HashMap<MessageId, String>,
}

impl MessageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivery. Returns `true` when the item was not yet tracked.
    pub fn observe(&mut self, id: &MessageId, receipt_handle: &str) -> bool {
        self.receipts
            .insert(id.clone(), receipt_handle.to_string())
            .is_none()
    }

    /// Remove the entry and hand back its receipt.
    pub fn take(&mut self, id: &MessageId) -> Option<String> {
        self.receipts.remove(id)
    }

    pub fn receipt(&self, id: &MessageId) -> Option<&str> {
        self.receipts.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redelivery_overwrites_receipt() {
        let mut index = MessageIndex::new();
        let id = MessageId::new("m-1");

        assert!(index.observe(&id, "r-1"));
        assert!(!index.observe(&id, "r-2"));

        assert_eq!(index.len(), 1);
        assert_eq!(index.receipt(&id), Some("r-2"));
    }

    #[test]
    fn take_is_one_shot() {
        let mut index = MessageIndex::new();
        let id = MessageId::new("m-1");
        index.observe(&id, "r-1");

        assert_eq!(index.take(&id).as_deref(), Some("r-1"));
        assert_eq!(index.take(&id), None);
        assert!(index.is_empty());
    }
}
