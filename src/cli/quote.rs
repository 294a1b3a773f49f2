use super::ui;
use crate::core::currency::RateSource;
use crate::core::{
    Book, BookCatalog, CostBreakdown, ExchangeRate, ExchangeRateProvider, RentalConfiguration,
    compute_cost,
};
use anyhow::Result;
use comfy_table::Cell;

/// Priced rental of one book, ready to be shown or paid for.
#[derive(Debug, Clone)]
pub struct Quote {
    pub book: Book,
    pub config: RentalConfiguration,
    pub rate: ExchangeRate,
    pub cost: CostBreakdown,
}

/// Fetches the book and the current rate concurrently and prices the rental.
pub async fn prepare(
    catalog: &dyn BookCatalog,
    rates: &ExchangeRateProvider,
    config: RentalConfiguration,
) -> Result<Quote> {
    let pb = ui::new_spinner("Fetching book and exchange rate...");
    let (book, rate) = tokio::join!(catalog.fetch_book(config.item_id), rates.get_rate());
    pb.finish_and_clear();

    let book = book?;
    let cost = compute_cost(&config, &book.item_price(), &rate);
    Ok(Quote {
        book,
        config,
        rate,
        cost,
    })
}

impl Quote {
    pub fn display_as_table(&self, currency: &str) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Item"), ui::header_cell("USD")]);

        table.add_row(vec![
            Cell::new(format!("Weekly rate × {}", self.config.duration)),
            ui::money_cell(self.cost.rental_cost),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} fee", self.config.delivery.as_str())),
            ui::money_cell(self.cost.delivery_cost),
        ]);

        let mut output = format!(
            "Book: {}",
            ui::style_text(&self.book.title, ui::StyleType::Title)
        );
        if let Some(author) = &self.book.author {
            output.push_str(&format!(" by {author}"));
        }
        output.push_str("\n\n");
        output.push_str(&table.to_string());

        output.push_str(&format!(
            "\n\nTotal: {} USD / {} {}",
            ui::style_text(&format!("{:.2}", self.cost.total_usd), ui::StyleType::TotalValue),
            ui::style_text(&format!("{:.2}", self.cost.total_local), ui::StyleType::TotalValue),
            ui::style_text(currency, ui::StyleType::TotalLabel),
        ));

        let rate_note = match self.rate.source {
            RateSource::Live => format!("1 USD = {} {currency}", self.rate.value),
            RateSource::Fallback => format!(
                "1 USD = {} {currency} (fallback, quote service unavailable)",
                self.rate.value
            ),
        };
        output.push_str(&format!(
            "\n{}",
            ui::style_text(&rate_note, ui::StyleType::Subtle)
        ));

        output
    }
}

pub async fn run(
    catalog: &dyn BookCatalog,
    rates: &ExchangeRateProvider,
    config: RentalConfiguration,
    currency: &str,
) -> Result<()> {
    let quote = prepare(catalog, rates, config).await?;
    println!("{}", quote.display_as_table(currency));
    Ok(())
}
