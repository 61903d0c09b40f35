//! Inbound helpdesk ticket model.

use serde::{Deserialize, Serialize};

/// Unique identifier for a ticket, as assigned by the helpdesk source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        TicketId(id.to_string())
    }
}

impl From<String> for TicketId {
    fn from(id: String) -> Self {
        TicketId(id)
    }
}

impl std::ops::Deref for TicketId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// One inbound support request.
///
/// Unknown fields from the source payload are ignored rather than rejected,
/// so upstream schema additions don't break ingestion. `long_description`
/// is optional at the source and defaults to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    pub requester_email: String,
}

impl Ticket {
    /// Combined description used for classification.
    pub fn full_description(&self) -> String {
        if self.long_description.is_empty() {
            self.short_description.clone()
        } else {
            format!("{}. {}", self.short_description, self.long_description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_unknown_and_missing_fields() {
        let ticket: Ticket = serde_json::from_str(
            r#"{
                "id": "REQ-001",
                "short_description": "Jira is down",
                "requester_email": "a@example.com",
                "priority": "P1",
                "assignment_group": "it-ops"
            }"#,
        )
        .unwrap();

        assert_eq!(ticket.id, TicketId::from("REQ-001"));
        assert_eq!(ticket.long_description, "");
    }

    #[test]
    fn full_description_joins_both_fields() {
        let ticket = Ticket {
            id: TicketId::from("REQ-002"),
            short_description: "Need new monitor".to_string(),
            long_description: "Second monitor for the standing desk".to_string(),
            requester_email: "b@example.com".to_string(),
        };
        assert_eq!(
            ticket.full_description(),
            "Need new monitor. Second monitor for the standing desk"
        );
    }
}
