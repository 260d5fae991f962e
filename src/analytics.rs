//! Inventory analytics: low stock, category breakdown, top items, trends.
//!
//! All of these are read-side reductions over item and transaction
//! snapshots. Percentages are taken against the whole, unfiltered item
//! collection so that a full category breakdown adds up to 100.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::aggregate::{percentage_of_total, UrgencyTier};
use crate::engine::{limit, sort};
use crate::query::SortDirection;
use crate::record::{Record, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockItem {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub current_stock: f64,
    pub reorder_level: f64,
    pub shortage: f64,
    pub urgency: UrgencyTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub total_items: usize,
    pub total_quantity: f64,
    pub total_value: f64,
    /// Percentage of the total inventory value.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopItem {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: f64,
    pub price: f64,
    pub total_value: f64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub stock_in: f64,
    pub stock_out: f64,
    pub net_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_items: usize,
    pub total_categories: usize,
    pub total_inventory_value: f64,
    pub low_stock_alerts: usize,
    /// Share of items at or below their reorder level, 0..1.
    pub low_stock_ratio: f64,
    /// Raised when `low_stock_ratio` exceeds the configured threshold.
    pub alert: bool,
    pub recent_transactions: Vec<Record>,
}

fn value_of(item: &Record) -> f64 {
    item.number("quantity") * item.number("price")
}

fn is_low(item: &Record) -> bool {
    let quantity = item.get("quantity").and_then(Value::as_number);
    let reorder_level = item.get("reorder_level").and_then(Value::as_number);
    matches!((quantity, reorder_level), (Some(q), Some(r)) if q <= r)
}

pub fn total_inventory_value(items: &[Record]) -> f64 {
    items.iter().map(value_of).sum()
}

/// Items at or below their reorder level, in input order.
pub fn low_stock(items: &[Record]) -> Vec<LowStockItem> {
    items
        .iter()
        .filter(|item| is_low(item))
        .map(|item| {
            let current_stock = item.number("quantity");
            let reorder_level = item.number("reorder_level");
            let shortage = reorder_level - current_stock;
            LowStockItem {
                id: item.id(),
                name: item.text("name"),
                sku: item.text("sku"),
                category: item.text("category"),
                current_stock,
                reorder_level,
                shortage,
                urgency: UrgencyTier::classify(shortage, reorder_level),
            }
        })
        .collect()
}

/// Per-category counts and value, ordered by category name.
///
/// Items without a category are grouped under an empty name.
pub fn category_summary(items: &[Record]) -> Vec<CategorySummary> {
    let grand_total = total_inventory_value(items);
    let mut groups: BTreeMap<String, (usize, f64, f64)> = BTreeMap::new();
    for item in items {
        let entry = groups.entry(item.text("category").unwrap_or_default()).or_default();
        entry.0 += 1;
        entry.1 += item.number("quantity");
        entry.2 += value_of(item);
    }
    groups
        .into_iter()
        .map(|(category, (total_items, total_quantity, total_value))| CategorySummary {
            category,
            total_items,
            total_quantity,
            total_value,
            share: percentage_of_total(total_value, grand_total),
        })
        .collect()
}

/// The `n` most valuable items. Equal values keep their input order.
pub fn top_items(items: &[Record], n: usize) -> Vec<TopItem> {
    let grand_total = total_inventory_value(items);
    let mut ranked: Vec<(&Record, f64)> = items.iter().map(|item| (item, value_of(item))).collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
        .into_iter()
        .take(n)
        .map(|(item, total_value)| TopItem {
            id: item.id(),
            name: item.text("name"),
            category: item.text("category"),
            quantity: item.number("quantity"),
            price: item.number("price"),
            total_value,
            share: percentage_of_total(total_value, grand_total),
        })
        .collect()
}

/// Daily stock movement for transactions at or after `since`, oldest day first.
pub fn stock_trends(transactions: &[Record], since: NaiveDateTime) -> Vec<DailyTrend> {
    let mut days: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for t in transactions {
        let Some(created_at) = t.time("created_at").filter(|ts| *ts >= since) else {
            continue;
        };
        let day = days.entry(created_at.date()).or_default();
        match t.text("transaction_type").as_deref() {
            Some("IN") => day.0 += t.number("quantity"),
            Some("OUT") => day.1 += t.number("quantity"),
            _ => {}
        }
    }
    days.into_iter()
        .map(|(date, (stock_in, stock_out))| DailyTrend { date, stock_in, stock_out, net_change: stock_in - stock_out })
        .collect()
}

pub fn dashboard(items: &[Record], transactions: &[Record], alert_ratio: f64, recent: usize) -> Dashboard {
    let low_stock_alerts = items.iter().filter(|item| is_low(item)).count();
    let low_stock_ratio = if items.is_empty() { 0.0 } else { low_stock_alerts as f64 / items.len() as f64 };
    let categories: std::collections::HashSet<String> = items.iter().filter_map(|i| i.text("category")).collect();
    let newest_first = sort(transactions.iter().collect::<Vec<_>>(), Some("created_at"), SortDirection::Desc);
    Dashboard {
        total_items: items.len(),
        total_categories: categories.len(),
        total_inventory_value: total_inventory_value(items),
        low_stock_alerts,
        low_stock_ratio,
        alert: low_stock_ratio > alert_ratio,
        recent_transactions: limit(newest_first, Some(recent as i64)).into_iter().cloned().collect(),
    }
}
