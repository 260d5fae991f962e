//! Property-based tests for the derived view engine.
//!
//! - Filtering twice equals filtering once.
//! - Sorting is stable in both directions.
//! - Descending order is ascending order reversed, up to ties.
//! - Adding a constraint never adds rows.
//! - A full category breakdown adds up to about 100 percent.

use invguard::analytics::category_summary;
use invguard::engine::{filter, sort};
use invguard::entity::Entity;
use invguard::query::{QueryDescriptor, SortDirection};
use invguard::record::Record;
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn category_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Tools", "Paint", "Garden", "tools"]).prop_map(String::from)
}

fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z ]{0,12}").unwrap()
}

/// Items with ids equal to their position, so input order can be checked.
fn items_strategy() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((name_strategy(), category_strategy(), 0i64..5, 1u32..10_000), 0..40).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(id, (name, category, quantity, cents))| {
                Record::new()
                    .with("id", id as i64)
                    .with("name", name)
                    .with("category", category)
                    .with("quantity", quantity)
                    .with("price", f64::from(cents) / 100.0)
            })
            .collect()
    })
}

fn descriptor_strategy() -> impl Strategy<Value = QueryDescriptor> {
    (prop::option::of("[a-z]{0,2}"), prop::option::of(category_strategy())).prop_map(|(term, category)| {
        let mut q = QueryDescriptor::new();
        if let Some(term) = term {
            q = q.search(&term);
        }
        if let Some(category) = category {
            q = q.filter("category", category);
        }
        q
    })
}

fn ids(rows: &[Record]) -> Vec<i64> {
    rows.iter().filter_map(Record::id).collect()
}

// =============================================================================
// FILTER
// =============================================================================

mod filter_properties {
    use super::*;

    proptest! {
        #[test]
        fn filter_is_idempotent(items in items_strategy(), q in descriptor_strategy()) {
            let profile = Entity::Items.profile();
            let once = filter(&items, &q, &profile);
            let twice = filter(&once, &q, &profile);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn extra_filter_never_adds_rows(items in items_strategy(), term in "[a-z]{0,2}", category in category_strategy()) {
            let profile = Entity::Items.profile();
            let loose = filter(&items, &QueryDescriptor::new().search(&term), &profile);
            let strict = filter(&items, &QueryDescriptor::new().search(&term).filter("category", category), &profile);
            prop_assert!(strict.len() <= loose.len());
            for row in &strict {
                prop_assert!(loose.contains(row));
            }
        }

        #[test]
        fn filtered_rows_keep_input_order(items in items_strategy(), q in descriptor_strategy()) {
            let rows = ids(&filter(&items, &q, &Entity::Items.profile()));
            prop_assert!(rows.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

// =============================================================================
// SORT
// =============================================================================

mod sort_properties {
    use super::*;

    fn quantities(rows: &[Record]) -> Vec<f64> {
        rows.iter().map(|r| r.number("quantity")).collect()
    }

    proptest! {
        #[test]
        fn ties_keep_input_order_both_ways(items in items_strategy()) {
            for direction in [SortDirection::Asc, SortDirection::Desc] {
                let sorted = sort(items.clone(), Some("quantity"), direction);
                for pair in sorted.windows(2) {
                    if pair[0].number("quantity") == pair[1].number("quantity") {
                        prop_assert!(pair[0].id() < pair[1].id());
                    }
                }
            }
        }

        #[test]
        fn descending_mirrors_ascending(items in items_strategy()) {
            let asc = quantities(&sort(items.clone(), Some("quantity"), SortDirection::Asc));
            let mut desc = quantities(&sort(items, Some("quantity"), SortDirection::Desc));
            desc.reverse();
            prop_assert_eq!(asc, desc);
        }

        #[test]
        fn sorting_is_a_permutation(items in items_strategy()) {
            let mut sorted = ids(&sort(items.clone(), Some("name"), SortDirection::Asc));
            sorted.sort();
            prop_assert_eq!(sorted, ids(&items));
        }
    }
}

// =============================================================================
// ANALYTICS
// =============================================================================

mod analytics_properties {
    use super::*;

    proptest! {
        #[test]
        fn category_shares_add_up(items in items_strategy()) {
            let summary = category_summary(&items);
            let total_value: f64 = summary.iter().map(|c| c.total_value).sum();
            let shares: f64 = summary.iter().map(|c| c.share).sum();
            if total_value > 0.0 {
                // each share is rounded to one decimal
                prop_assert!((shares - 100.0).abs() <= 0.05 * summary.len() as f64 + 1e-6);
            } else {
                prop_assert_eq!(shares, 0.0);
            }
        }
    }
}
