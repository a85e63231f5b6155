//! Restartable position marker over one pass snapshot

use crate::models::ServerRecord;

/// Cursor over the servers captured at pass start
///
/// The snapshot is fixed for the life of the cursor; a new pass builds a new
/// cursor. Before the first [`advance`](Self::advance) nothing is current.
/// The k-th advance lands on element `k - 1`, and the advance after the last
/// element moves the cursor past the end.
#[derive(Debug, Clone)]
pub struct PassCursor {
    servers: Vec<ServerRecord>,
    index: Option<usize>,
}

impl PassCursor {
    /// Create a cursor positioned before the first server
    pub fn new(servers: Vec<ServerRecord>) -> Self {
        Self {
            servers,
            index: None,
        }
    }

    /// Move forward by one; no-op once past the end
    pub fn advance(&mut self) {
        self.index = match self.index {
            None => Some(0),
            Some(i) if i < self.servers.len() => Some(i + 1),
            Some(i) => Some(i),
        };
    }

    /// Server at the current position
    pub fn current(&self) -> Option<&ServerRecord> {
        self.index.and_then(|i| self.servers.get(i))
    }

    /// True once the cursor moved past the last server
    pub fn at_end(&self) -> bool {
        matches!(self.index, Some(i) if i >= self.servers.len())
    }

    /// Current index (0 before the first advance)
    pub fn position(&self) -> usize {
        self.index.unwrap_or(0)
    }

    /// Number of servers in the snapshot
    pub fn size(&self) -> usize {
        self.servers.len()
    }

    /// Whether [`advance`](Self::advance) has been called at least once
    pub fn started(&self) -> bool {
        self.index.is_some()
    }
}
