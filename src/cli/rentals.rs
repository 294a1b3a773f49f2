use super::ui;
use crate::core::{BookCatalog, EntitlementStore, ItemId, RentalStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, CellAlignment};
use futures::future::join_all;
use std::collections::HashMap;
use tracing::warn;

/// Looks up titles for `ids` concurrently. Failed lookups are left out.
pub(crate) async fn fetch_titles(
    catalog: &dyn BookCatalog,
    ids: impl IntoIterator<Item = ItemId>,
) -> HashMap<ItemId, String> {
    let mut ids: Vec<ItemId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    let pb = ui::new_progress_bar(ids.len() as u64);
    let futures = ids.into_iter().map(|id| {
        let pb = pb.clone();
        async move {
            let result = catalog.fetch_book(id).await;
            pb.inc(1);
            (id, result)
        }
    });
    let results = join_all(futures).await;
    pb.finish_and_clear();

    results
        .into_iter()
        .filter_map(|(id, result)| match result {
            Ok(book) => Some((id, book.title)),
            Err(e) => {
                warn!("Failed to fetch title for book {}: {:#}", id, e);
                None
            }
        })
        .collect()
}

pub async fn run(
    entitlements: &EntitlementStore,
    catalog: &dyn BookCatalog,
    status: Option<RentalStatus>,
) -> Result<()> {
    let now = Utc::now();
    let mut rentals: Vec<_> = entitlements
        .list()
        .await?
        .into_iter()
        .map(|e| (RentalStatus::of(&e, now), e))
        .filter(|(s, _)| status.is_none_or(|wanted| *s == wanted))
        .collect();

    if rentals.is_empty() {
        println!("No rentals found.");
        return Ok(());
    }
    rentals.sort_by_key(|(_, e)| std::cmp::Reverse(e.acquired_at));

    let titles = fetch_titles(catalog, rentals.iter().map(|(_, e)| e.item_id)).await;
    let date = |d: DateTime<Utc>| d.format("%Y-%m-%d").to_string();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Book"),
        ui::header_cell("Title"),
        ui::header_cell("Rented"),
        ui::header_cell("Due"),
        ui::header_cell("Days left"),
        ui::header_cell("Paid by"),
        ui::header_cell("Status"),
    ]);
    for (status, rental) in &rentals {
        let days_left = if *status == RentalStatus::Expired {
            Cell::new("-")
        } else {
            Cell::new(rental.days_remaining(now))
        };
        table.add_row(vec![
            Cell::new(rental.item_id),
            ui::format_optional_cell(titles.get(&rental.item_id), |t| t.clone()),
            Cell::new(date(rental.acquired_at)),
            Cell::new(date(rental.expires_at)),
            days_left.set_alignment(CellAlignment::Right),
            Cell::new(rental.method),
            ui::status_cell(*status),
        ]);
    }

    println!("{}", ui::style_text("My Rentals", ui::StyleType::Title));
    println!("{table}");
    Ok(())
}
