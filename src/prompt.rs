//! Prompt assembly for ticket classification.
//!
//! The system prompt is static; the user prompt carries the catalog rendered
//! as classification context plus the ticket under triage. The model is told
//! to answer with exact catalog names, but downstream resolution never
//! assumes it complied.

use crate::domain::catalog::Catalog;
use crate::domain::ticket::Ticket;

/// Instructions given to the model for every classification call.
pub const SYSTEM_PROMPT: &str = r#"You are an expert IT Service Desk analyst responsible for classifying incoming support requests.

Your task is to analyze each helpdesk ticket and assign it to the most appropriate Category and Request Type from the provided Service Catalog.

## CRITICAL INSTRUCTIONS:

1. **USE ONLY categories and request types from the Service Catalog provided in the user message.**
   Do NOT invent new categories. Use EXACT names from the catalog.

2. **Classification Strategy**:
   - First, identify the PRIMARY issue from the ticket description
   - Then, find the best matching category
   - Finally, select the most specific request type within that category

3. **Priority Rules** (when multiple categories could apply):
   - Security incidents (phishing, lost/stolen devices) → Security category FIRST
   - Authentication issues (password, MFA) → Access Management
   - Physical equipment → Hardware Support
   - Software/licenses → Software & Licensing
   - Network/connectivity → Network & Connectivity
   - Employee lifecycle → HR & Onboarding
   - Cannot determine → Other/Uncategorized

4. **Confidence Scoring**:
   - 0.9-1.0: Perfect match, no ambiguity
   - 0.7-0.9: Good match, minor interpretation needed
   - 0.5-0.7: Reasonable guess, multiple categories possible
   - <0.5: Uncertain, using best effort

5. **Reasoning**: Always explain WHY you chose this classification in 1-2 sentences.

## EXAMPLES:

Example 1:
- Input: "Forgot my Okta password"
- Category: "Access Management"
- Type: "Reset forgotten password"
- Confidence: 0.95
- Reasoning: "User explicitly states password issue with Okta authentication system."

Example 2:
- Input: "Lost my work phone in a taxi"
- Category: "Security"
- Type: "Report Lost/Stolen Device"
- Confidence: 0.95
- Reasoning: "Lost device is a security incident requiring immediate action to protect company data."

Example 3:
- Input: "Where is the cafeteria?"
- Category: "Other/Uncategorized"
- Type: "General Inquiry/Undefined"
- Confidence: 0.90
- Reasoning: "Non-IT request, not related to technical support services."

Respond with a single JSON object of the form:
{"category": "<exact catalog category>", "request_type": "<exact catalog request type>", "confidence": <0.0-1.0>, "reasoning": "<1-2 sentences>"}

Now classify the ticket provided in the user message using the Service Catalog listed there."#;

/// Render the per-ticket user prompt: catalog context followed by the
/// ticket's fields.
pub fn build_user_prompt(ticket: &Ticket, catalog: &Catalog) -> String {
    format!(
        r#"{catalog_context}

---

## TICKET TO CLASSIFY:

**ID**: {id}
**Short Description**: {short}
**Full Description**: {long}
**Requester**: {requester}

---

Analyze this ticket and provide the classification. Use EXACT category and request type names from the Service Catalog above."#,
        catalog_context = catalog.prompt_context(),
        id = ticket.id,
        short = ticket.short_description,
        long = ticket.long_description,
        requester = ticket.requester_email,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CatalogEntry, Sla, SlaUnit};
    use crate::domain::ticket::TicketId;

    #[test]
    fn user_prompt_carries_catalog_and_ticket() {
        let catalog = Catalog::from_entries(vec![CatalogEntry {
            category: "Security".to_string(),
            request_type: "Phishing Report".to_string(),
            sla: Sla {
                value: 4,
                unit: SlaUnit::Hours,
            },
        }])
        .unwrap();
        let ticket = Ticket {
            id: TicketId::from("REQ-42"),
            short_description: "Suspicious email".to_string(),
            long_description: "Got an email asking for my password".to_string(),
            requester_email: "c@example.com".to_string(),
        };

        let prompt = build_user_prompt(&ticket, &catalog);
        assert!(prompt.contains("Security"));
        assert!(prompt.contains("Phishing Report"));
        assert!(prompt.contains("REQ-42"));
        assert!(prompt.contains("Suspicious email"));
    }
}
