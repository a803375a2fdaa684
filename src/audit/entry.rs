//! Audit entry data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of operations that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// Tables whose rows the client mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    ExpenseItem,
    ExpensePeriod,
    UserProfile,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::ExpenseItem => write!(f, "ExpenseItem"),
            EntityType::ExpensePeriod => write!(f, "ExpensePeriod"),
            EntityType::UserProfile => write!(f, "UserProfile"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,

    pub operation: Operation,

    pub entity_type: EntityType,

    pub entity_id: String,

    /// Short label for listings, e.g. an expense description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,

    /// Row as it was before an update or delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,

    /// Row as the backend returned it after a create or update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,

    /// Names of the fields an update changed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
}

impl AuditEntry {
    pub fn create<T: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        entity: &T,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: Operation::Create,
            entity_type,
            entity_id: entity_id.into(),
            entity_name,
            before: None,
            after: serde_json::to_value(entity).ok(),
            changed_fields: Vec::new(),
        }
    }

    /// Entry for an update; `before` is `None` when the previous row was
    /// not in the local cache
    pub fn update<T: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        before: Option<&T>,
        after: &T,
    ) -> Self {
        let before = before.and_then(|b| serde_json::to_value(b).ok());
        let after = serde_json::to_value(after).ok();
        let changed_fields = match (&before, &after) {
            (Some(b), Some(a)) => changed_fields(b, a),
            _ => Vec::new(),
        };

        Self {
            timestamp: Utc::now(),
            operation: Operation::Update,
            entity_type,
            entity_id: entity_id.into(),
            entity_name,
            before,
            after,
            changed_fields,
        }
    }

    pub fn delete<T: Serialize>(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        entity_name: Option<String>,
        entity: Option<&T>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: Operation::Delete,
            entity_type,
            entity_id: entity_id.into(),
            entity_name,
            before: entity.and_then(|e| serde_json::to_value(e).ok()),
            after: None,
            changed_fields: Vec::new(),
        }
    }

    /// One-line form for terminal listings
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.entity_type,
            self.entity_id
        );

        if let Some(name) = &self.entity_name {
            output.push_str(&format!(" ({})", name));
        }

        if !self.changed_fields.is_empty() {
            output.push_str(&format!("\n  Changed: {}", self.changed_fields.join(", ")));
        }

        output
    }
}

/// Top-level keys whose values differ between two JSON objects
fn changed_fields(before: &serde_json::Value, after: &serde_json::Value) -> Vec<String> {
    let (Some(before), Some(after)) = (before.as_object(), after.as_object()) else {
        return Vec::new();
    };

    let mut keys: Vec<String> = before
        .keys()
        .chain(after.keys())
        .filter(|k| before.get(*k) != after.get(*k))
        .cloned()
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_entry() {
        let row = json!({"id": "e1", "amount": 12.34, "description": "Coffee"});
        let entry = AuditEntry::create(EntityType::ExpenseItem, "e1", Some("Coffee".into()), &row);

        assert_eq!(entry.operation, Operation::Create);
        assert!(entry.before.is_none());
        assert_eq!(entry.after, Some(row));
    }

    #[test]
    fn test_update_lists_changed_fields() {
        let before = json!({"id": "e1", "amount": 12.34, "description": "Coffee"});
        let after = json!({"id": "e1", "amount": 4.5, "description": "Coffee"});
        let entry =
            AuditEntry::update(EntityType::ExpenseItem, "e1", None, Some(&before), &after);

        assert_eq!(entry.changed_fields, vec!["amount".to_string()]);
        assert!(entry.format_human_readable().contains("Changed: amount"));
    }

    #[test]
    fn test_update_without_snapshot() {
        let after = json!({"id": "p1", "amountAvailable": 500});
        let entry = AuditEntry::update::<serde_json::Value>(
            EntityType::ExpensePeriod,
            "p1",
            None,
            None,
            &after,
        );
        assert!(entry.before.is_none());
        assert!(entry.changed_fields.is_empty());
    }

    #[test]
    fn test_human_readable_format() {
        let entry = AuditEntry::delete::<serde_json::Value>(
            EntityType::ExpensePeriod,
            "p1",
            None,
            None,
        );
        let text = entry.format_human_readable();
        assert!(text.contains("DELETE ExpensePeriod p1"));
    }
}
