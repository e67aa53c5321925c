//! Ticket list model
//!
//! Maintains the ordered set of tickets and reconciles the REST snapshot
//! with streaming ticket-level events. Pure and synchronous — no IO, no
//! async, no locking — fully unit-testable. The controller is the only
//! caller that mutates it.
//!
//! Ordering policy: most recently active ticket first, where "activity" is
//! creation, a new message, or a reordering event. The activity key is
//! local arrival order, not timestamp comparison — simpler and immune to
//! clock skew, at the cost of possibly reordering out-of-order deliveries.

use deskline_protocol::Ticket;

#[derive(Default)]
pub struct TicketList {
    tickets: Vec<Ticket>,
}

impl TicketList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list wholesale from a REST snapshot, sorted by the
    /// server's last-activity timestamp (ISO 8601 strings compare
    /// lexicographically). Duplicate IDs in the snapshot keep the first
    /// occurrence.
    pub fn load_snapshot(&mut self, mut tickets: Vec<Ticket>) {
        tickets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.tickets.clear();
        for ticket in tickets {
            if self.position(&ticket.id).is_none() {
                self.tickets.push(ticket);
            }
        }
    }

    /// Insert a newly created ticket at the front. A no-op if the ID is
    /// already present — the REST snapshot and the streamed creation event
    /// can both deliver the same ticket.
    pub fn apply_created(&mut self, ticket: Ticket) -> bool {
        if self.position(&ticket.id).is_some() {
            return false;
        }
        self.tickets.insert(0, ticket);
        true
    }

    /// Record message activity on a ticket: set the last-sender flag and
    /// move it to the front, preserving the relative order of the rest.
    ///
    /// Returns false when the ticket is unknown locally; the event is
    /// dropped rather than creating a phantom entry.
    pub fn apply_activity(
        &mut self,
        ticket_id: &str,
        sender_id: &str,
        viewer_id: Option<&str>,
    ) -> bool {
        let Some(pos) = self.position(ticket_id) else {
            return false;
        };
        self.tickets[pos].is_last_sender_me = viewer_id == Some(sender_id);
        self.tickets[..=pos].rotate_right(1);
        true
    }

    /// Remove a ticket by ID. Clearing the selection when it matched is the
    /// controller's job, not this model's.
    pub fn remove(&mut self, ticket_id: &str) -> Option<Ticket> {
        let pos = self.position(ticket_id)?;
        Some(self.tickets.remove(pos))
    }

    pub fn get(&self, ticket_id: &str) -> Option<&Ticket> {
        self.position(ticket_id).map(|pos| &self.tickets[pos])
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    fn position(&self, ticket_id: &str) -> Option<usize> {
        self.tickets.iter().position(|t| t.id == ticket_id)
    }
}
