//! invguard – derived views, analytics and notifications for the InvGuard inventory dashboard.
//!
//! The read side of the dashboard is a handful of tables (items, stock
//! transactions, audit log) that are all rendered the same way: take the
//! raw collection fetched from the API, apply the search box, the dropdown
//! filters and the date range, sort on the clicked column, cut to the
//! display limit, and show statistics over everything that matched. This
//! crate implements that pipeline once, as pure functions, and parameterises
//! it per collection with an [`entity::Profile`].
//!
//! Around the engine sits a small service that keeps the latest snapshot of
//! every collection, memoises derived views, computes the analytics pages
//! and pushes audit-driven notifications to websocket clients.
//!
//! ## Modules
//! * [`record`] – Loosely typed records and their values; timestamp parsing.
//! * [`query`] – The [`query::QueryDescriptor`] a page sends: search, filters, sort, range, limit.
//! * [`entity`] – Items, transactions and audit log, with their profiles and typed shapes.
//! * [`engine`] – filter → sort → limit, plus [`engine::derive`] which composes them.
//! * [`aggregate`] – Named statistics over a record set, urgency tiers, percentages.
//! * [`analytics`] – Low stock, category summary, top items, daily trends, dashboard totals.
//! * [`source`] – Where collections come from (REST API or a directory of exports) and snapshots.
//! * [`session`] – The bearer token and user, cleared when the API answers 401.
//! * [`notify`] – Inventory events and the broadcast hub behind the notification stream.
//! * [`interface`] – Shared service state tying snapshots, views and notifications together.
//! * [`server`] – The axum router.
//! * [`config`] – Settings from `invguard.json` and `INVGUARD_*` variables.
//!
//! ## Engine semantics
//! Filtering is the identity when the descriptor has no search term, no
//! non-blank field filter and an open date range. Search is a case-insensitive
//! substring match over the profile's searchable fields; field filters are
//! exact; the date range is inclusive and only applies to entities with a
//! timestamp field. Sorting is stable in both directions, compares text
//! case-insensitively and puts absent values last. A limit that is absent,
//! zero or negative does not cut. Statistics are always taken over the
//! filtered rows before the limit.
//!
//! ## Quick Start
//! ```
//! use invguard::{engine, entity::Entity, query::{QueryDescriptor, SortDirection}, record::Record};
//! let items = vec![
//!     Record::new().with("id", 1i64).with("name", "Widget").with("category", "A").with("quantity", 5i64),
//!     Record::new().with("id", 2i64).with("name", "Gadget").with("category", "B").with("quantity", 20i64),
//! ];
//! let q = QueryDescriptor::new().search("get").sort_by("quantity", SortDirection::Desc);
//! let view = engine::derive(&items, &q, &Entity::Items.profile());
//! assert_eq!(view.rows.len(), 2);
//! assert_eq!(view.rows[0].id(), Some(2));
//! assert_eq!(view.stats["total"], 2.0);
//! ```

pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod interface;
pub mod notify;
pub mod query;
pub mod record;
pub mod server;
pub mod session;
pub mod source;

pub use error::{InvguardError, Result};
