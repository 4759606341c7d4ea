use crate::model::{IncomingLead, Lead};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Unchanged,
}

/// Decide what to do with an incoming lead.
///
/// The origin's modification marker is the only change signal: payload
/// fields are never compared, so an edit that leaves `Modified_Time` alone
/// is not picked up. Two absent markers count as equal.
pub fn decide(incoming: &IncomingLead, existing: Option<&Lead>) -> Action {
    match existing {
        None => Action::Insert,
        Some(stored) if stored.fields.source_modified_time != incoming.fields.source_modified_time => {
            Action::Update
        }
        Some(_) => Action::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeadFields;

    fn incoming(modified: Option<&str>, first_name: &str) -> IncomingLead {
        IncomingLead {
            id: "1".into(),
            fields: LeadFields {
                first_name: Some(first_name.into()),
                source_modified_time: modified.map(str::to_string),
                ..LeadFields::default()
            },
        }
    }

    fn stored(modified: Option<&str>, first_name: &str) -> Lead {
        Lead {
            id: "1".into(),
            fields: incoming(modified, first_name).fields,
            created_at: "2025-01-01T00:00:00.000000Z".into(),
            updated_at: "2025-01-01T00:00:00.000000Z".into(),
        }
    }

    #[test]
    fn absent_row_inserts() {
        assert_eq!(decide(&incoming(Some("t1"), "Jane"), None), Action::Insert);
        assert_eq!(decide(&incoming(None, "Jane"), None), Action::Insert);
    }

    #[test]
    fn changed_marker_updates() {
        let existing = stored(Some("t1"), "Jane");
        assert_eq!(decide(&incoming(Some("t2"), "Jane"), Some(&existing)), Action::Update);
        assert_eq!(decide(&incoming(None, "Jane"), Some(&existing)), Action::Update);

        let unmarked = stored(None, "Jane");
        assert_eq!(decide(&incoming(Some("t1"), "Jane"), Some(&unmarked)), Action::Update);
    }

    #[test]
    fn equal_marker_is_unchanged_even_if_payload_differs() {
        let existing = stored(Some("t1"), "Jane");
        assert_eq!(decide(&incoming(Some("t1"), "Janet"), Some(&existing)), Action::Unchanged);

        let unmarked = stored(None, "Jane");
        assert_eq!(decide(&incoming(None, "Jane"), Some(&unmarked)), Action::Unchanged);
    }

    #[test]
    fn marker_is_compared_as_opaque_text() {
        // Same instant, different spelling.
        let existing = stored(Some("2025-01-01T12:00:00Z"), "Jane");
        let next = incoming(Some("2025-01-01T12:00:00+00:00"), "Jane");
        assert_eq!(decide(&next, Some(&existing)), Action::Update);
    }
}
