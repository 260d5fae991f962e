//! The three collections the dashboard browses, and how the engine treats each.
//!
//! Every page used to carry its own copy of the filter/sort logic. Here a
//! single [`Profile`] per [`Entity`] names what differs between them: which
//! fields the search box looks at, which fields have dropdowns, which field
//! the date range applies to, and which statistics sit above the table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::error::InvguardError;
use crate::record::{Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Items,
    Transactions,
    AuditLog,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Items, Entity::Transactions, Entity::AuditLog];

    /// Path segment of the REST resource.
    pub fn resource(&self) -> &'static str {
        match self {
            Entity::Items => "items",
            Entity::Transactions => "transactions",
            Entity::AuditLog => "audit",
        }
    }

    pub fn profile(&self) -> Profile {
        match self {
            Entity::Items => Profile {
                searchable: &["name", "sku", "category"],
                filterable: &["category"],
                timestamp_field: None,
                aggregates: vec![
                    Aggregate::Count { name: "total" },
                    Aggregate::CountAtMost { name: "low_stock", field: "quantity", limit_field: "reorder_level" },
                    Aggregate::SumProduct { name: "total_value", left: "quantity", right: "price" },
                ],
            },
            Entity::Transactions => Profile {
                searchable: &["item_name", "notes", "created_by"],
                filterable: &["item_id", "transaction_type"],
                timestamp_field: Some("created_at"),
                aggregates: vec![
                    Aggregate::Count { name: "total" },
                    Aggregate::SumWhere { name: "stockIn", field: "quantity", when: "transaction_type", equals: "IN" },
                    Aggregate::SumWhere { name: "stockOut", field: "quantity", when: "transaction_type", equals: "OUT" },
                    Aggregate::Difference { name: "netChange", minuend: "stockIn", subtrahend: "stockOut" },
                ],
            },
            Entity::AuditLog => Profile {
                searchable: &["resource_type", "user_name", "resource_id"],
                filterable: &["action", "resource_type", "user_name"],
                timestamp_field: Some("timestamp"),
                aggregates: vec![
                    Aggregate::Count { name: "total" },
                    Aggregate::CountWhere { name: "creates", field: "action", equals: "CREATE" },
                    Aggregate::CountWhere { name: "updates", field: "action", equals: "UPDATE" },
                    Aggregate::CountWhere { name: "deletes", field: "action", equals: "DELETE" },
                ],
            },
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.resource())
    }
}

impl FromStr for Entity {
    type Err = InvguardError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "items" => Ok(Entity::Items),
            "transactions" => Ok(Entity::Transactions),
            "audit" | "audit_log" | "audit-log" => Ok(Entity::AuditLog),
            other => Err(InvguardError::UnknownEntity(other.to_owned())),
        }
    }
}

/// Per-entity parameters of the derived view engine.
#[derive(Debug, Clone)]
pub struct Profile {
    pub searchable: &'static [&'static str],
    /// Fields offered as dropdown facets. Descriptor filters are not restricted to these.
    pub filterable: &'static [&'static str],
    pub timestamp_field: Option<&'static str>,
    pub aggregates: Vec<Aggregate>,
}

// ------------- Typed shapes -------------
// These mirror the JSON the backend produces. The engine itself works on
// records; the typed forms exist for callers that build data in code.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub price: f64,
    pub reorder_level: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub item_id: i64,
    pub item_name: Option<String>,
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub notes: Option<String>,
    pub created_at: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: i64,
    pub user_name: String,
    pub timestamp: String,
    #[serde(default)]
    pub changes: Option<serde_json::Value>,
}

/// Converts any of the typed shapes into an engine record.
pub fn to_record<T: Serialize>(typed: &T) -> Record {
    match serde_json::to_value(typed).map(Record::try_from) {
        Ok(Ok(record)) => record,
        _ => Record::new(),
    }
}

impl From<&Item> for Record {
    fn from(item: &Item) -> Self { to_record(item) }
}
impl From<&Transaction> for Record {
    fn from(t: &Transaction) -> Self { to_record(t) }
}
impl From<&AuditEntry> for Record {
    fn from(a: &AuditEntry) -> Self { to_record(a) }
}

impl From<TransactionType> for Value {
    fn from(t: TransactionType) -> Self {
        Value::from(match t { TransactionType::In => "IN", TransactionType::Out => "OUT" })
    }
}
impl From<AuditAction> for Value {
    fn from(a: AuditAction) -> Self {
        Value::from(match a { AuditAction::Create => "CREATE", AuditAction::Update => "UPDATE", AuditAction::Delete => "DELETE" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_round_trip() {
        for entity in Entity::ALL {
            assert_eq!(entity.resource().parse::<Entity>().unwrap(), entity);
        }
        assert!("users".parse::<Entity>().is_err());
    }

    #[test]
    fn typed_item_becomes_record() {
        let item = Item { id: 3, sku: "SKU-3".into(), name: "Bolt".into(), category: "Hardware".into(),
            quantity: 4, price: 0.25, reorder_level: 10, description: None };
        let record = Record::from(&item);
        assert_eq!(record.id(), Some(3));
        assert_eq!(record.text("category").as_deref(), Some("Hardware"));
        assert_eq!(record.number("price"), 0.25);
        assert!(record.get("description").is_none());
    }

    #[test]
    fn audit_action_serializes_uppercase() {
        let entry = AuditEntry { id: 1, action: AuditAction::Delete, resource_type: "Item".into(), resource_id: 9,
            user_name: "admin".into(), timestamp: "2024-01-01T00:00:00".into(), changes: None };
        assert_eq!(Record::from(&entry).text("action").as_deref(), Some("DELETE"));
    }
}
