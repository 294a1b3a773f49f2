use super::{rentals::fetch_titles, ui};
use crate::core::{BookCatalog, FavoritesStore, ItemId};
use anyhow::Result;
use comfy_table::Cell;

pub async fn toggle(favorites: &FavoritesStore, item_id: ItemId) -> Result<()> {
    if favorites.toggle(item_id).await? {
        println!("Added book {item_id} to favorites");
    } else {
        println!("Removed book {item_id} from favorites");
    }
    Ok(())
}

pub async fn list(favorites: &FavoritesStore, catalog: &dyn BookCatalog) -> Result<()> {
    let ids = favorites.list().await?;
    if ids.is_empty() {
        println!("No favorites yet.");
        return Ok(());
    }

    let titles = fetch_titles(catalog, ids.iter().copied()).await;
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Book"), ui::header_cell("Title")]);
    for id in ids {
        table.add_row(vec![
            Cell::new(id),
            ui::format_optional_cell(titles.get(&id), |t| t.clone()),
        ]);
    }

    println!("{}", ui::style_text("Favorites", ui::StyleType::Title));
    println!("{table}");
    Ok(())
}
