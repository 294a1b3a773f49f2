use super::{quote, ui};
use crate::core::payment::{PROVIDERS, PaymentDetails, PaymentProvider, PaymentRail};
use crate::core::{
    BookCatalog, DeliveryMethod, EntitlementStore, ExchangeRateProvider, FlowError, ItemId,
    PaymentFlowController, PaymentGateway, RentalConfiguration, ValidationError,
};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use console::Term;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentOptions {
    pub item_id: ItemId,
    pub method: String,
    pub phone_number: Option<String>,
    pub weeks: u32,
    pub delivery: DeliveryMethod,
}

/// Terminal used for prompts. `None` runs without asking anything.
fn interactive_term() -> Option<Term> {
    let term = Term::stdout();
    term.is_term().then_some(term)
}

fn prompt(term: &Term, label: &str) -> Result<String> {
    term.write_str(label)?;
    Ok(term.read_line()?.trim().to_string())
}

fn confirm(term: &Term, label: &str) -> Result<bool> {
    let answer = prompt(term, &format!("{label} [y/N] "))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub fn print_methods() {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Method"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell("Code"),
    ]);
    for provider in PROVIDERS {
        table.add_row(vec![
            provider.id.to_string(),
            provider.name.to_string(),
            provider.rail.to_string(),
            provider.short_code.unwrap_or("").to_string(),
        ]);
    }
    println!("{table}");

    for provider in PROVIDERS {
        println!();
        println!("{}", ui::style_text(provider.name, ui::StyleType::TotalLabel));
        println!("{}", format_instructions(provider));
    }
}

/// Numbered steps followed by the provider's note.
fn format_instructions(provider: &PaymentProvider) -> String {
    let mut lines: Vec<String> = provider
        .instructions
        .iter()
        .enumerate()
        .map(|(i, step)| format!("  {}. {}", i + 1, step))
        .collect();
    lines.push(format!(
        "  {}",
        ui::style_text(provider.note, ui::StyleType::Subtle)
    ));
    lines.join("\n")
}

pub async fn run(
    catalog: &dyn BookCatalog,
    rates: &ExchangeRateProvider,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: Arc<EntitlementStore>,
    options: RentOptions,
    currency: &str,
) -> Result<()> {
    run_with_term(
        catalog,
        rates,
        gateway,
        entitlements,
        options,
        currency,
        interactive_term(),
    )
    .await
}

async fn run_with_term(
    catalog: &dyn BookCatalog,
    rates: &ExchangeRateProvider,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: Arc<EntitlementStore>,
    options: RentOptions,
    currency: &str,
    term: Option<Term>,
) -> Result<()> {
    let config = RentalConfiguration::new(options.item_id, options.weeks, options.delivery)?;

    if let Some(existing) = entitlements.active(options.item_id, Utc::now()).await? {
        bail!(
            "Book {} is already rented until {}",
            existing.item_id,
            existing.expires_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    let quote = quote::prepare(catalog, rates, config).await?;
    println!("{}", quote.display_as_table(currency));
    ui::print_separator();

    let controller = PaymentFlowController::new(config, quote.cost, gateway, entitlements);
    let provider = match controller.select_method(&options.method) {
        Err(e @ FlowError::Validation(ValidationError::UnknownPaymentMethod(_))) => {
            print_methods();
            return Err(e.into());
        }
        other => other?,
    };
    controller.proceed()?;
    println!(
        "Paying with {}{}",
        ui::style_text(provider.name, ui::StyleType::TotalLabel),
        provider
            .short_code
            .map(|code| format!(" (dial {code})"))
            .unwrap_or_default()
    );
    println!("{}", format_instructions(provider));

    let mut details = PaymentDetails {
        phone_number: options.phone_number,
    };

    loop {
        controller.capture_details(details.clone())?;

        let pb = ui::new_spinner("Processing payment...");
        let result = controller.submit().await;
        pb.finish_and_clear();

        match (result, term.as_ref()) {
            (Ok(outcome), _) => {
                if outcome.already_active {
                    println!(
                        "{}",
                        ui::style_text(
                            &format!(
                                "Book {} was already rented; existing rental kept until {}",
                                outcome.entitlement.item_id,
                                outcome.entitlement.expires_at.format("%Y-%m-%d")
                            ),
                            ui::StyleType::Subtle
                        )
                    );
                } else {
                    println!(
                        "{} Rented '{}' until {}",
                        ui::style_text("✓", ui::StyleType::Success),
                        quote.book.title,
                        outcome.entitlement.expires_at.format("%Y-%m-%d")
                    );
                }
                println!("Transaction: {}", outcome.transaction_id);
                return Ok(());
            }
            (Err(FlowError::Validation(ValidationError::MissingPhoneNumber(rail))), Some(term)) => {
                let label = match rail {
                    PaymentRail::MobileMoney => "Mobile number: ",
                    _ => "Phone number linked to the account: ",
                };
                details.phone_number = Some(prompt(term, label)?);
            }
            (Err(e @ (FlowError::Gateway { .. } | FlowError::Persistence(_))), term) => {
                eprintln!("{}", ui::style_text(&e.to_string(), ui::StyleType::Error));
                let retry = match term {
                    Some(term) => confirm(term, "Retry payment?")?,
                    None => false,
                };
                if !retry {
                    controller.cancel()?;
                    return Err(e).context("Rental was not completed");
                }
                debug!("Retrying payment");
                controller.retry()?;
            }
            (Err(e), _) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Book, GatewayResponse, PaymentRequest, RateQuoteSource};
    use crate::store::memory::MemoryCollection;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct Catalog;

    #[async_trait]
    impl BookCatalog for Catalog {
        async fn fetch_book(&self, id: ItemId) -> Result<Book> {
            Ok(Book {
                id,
                title: "Dertogada".to_string(),
                author: None,
                price: dec!(10),
                rental_price: None,
            })
        }
    }

    struct FixedRate;

    #[async_trait]
    impl RateQuoteSource for FixedRate {
        async fn fetch_usd_rate(&self) -> Result<Decimal> {
            Ok(dec!(55))
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        decline: bool,
        requests: Mutex<Vec<PaymentRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn submit(&self, request: &PaymentRequest) -> Result<GatewayResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.decline {
                return Ok(GatewayResponse {
                    success: false,
                    message: Some("Insufficient balance".to_string()),
                    transaction_id: None,
                });
            }
            Ok(GatewayResponse {
                success: true,
                message: None,
                transaction_id: Some("TXN1".to_string()),
            })
        }
    }

    fn options(method: &str, phone: Option<&str>) -> RentOptions {
        RentOptions {
            item_id: 42,
            method: method.to_string(),
            phone_number: phone.map(str::to_string),
            weeks: 4,
            delivery: DeliveryMethod::Pickup,
        }
    }

    fn store() -> Arc<EntitlementStore> {
        Arc::new(EntitlementStore::new(Arc::new(MemoryCollection::new())))
    }

    async fn rent(
        gateway: Arc<RecordingGateway>,
        entitlements: Arc<EntitlementStore>,
        options: RentOptions,
    ) -> Result<()> {
        let rates = ExchangeRateProvider::new(Arc::new(FixedRate));
        run_with_term(&Catalog, &rates, gateway, entitlements, options, "ETB", None).await
    }

    #[tokio::test]
    async fn test_rent_records_entitlement() {
        let gateway = Arc::new(RecordingGateway::default());
        let entitlements = store();

        rent(gateway.clone(), entitlements.clone(), options("telebir", Some("0911")))
            .await
            .unwrap();

        assert!(entitlements.has_active(42).await.unwrap());
        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount_usd, dec!(4.00));
        assert_eq!(requests[0].amount_etb, dec!(220.00));
    }

    #[tokio::test]
    async fn test_refuses_item_already_rented() {
        let gateway = Arc::new(RecordingGateway::default());
        let entitlements = store();
        rent(gateway.clone(), entitlements.clone(), options("stripe", None))
            .await
            .unwrap();

        let result = rent(gateway.clone(), entitlements, options("stripe", None)).await;

        assert!(result.unwrap_err().to_string().contains("already rented"));
        assert_eq!(gateway.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_phone_without_terminal_fails_before_gateway() {
        let gateway = Arc::new(RecordingGateway::default());

        let result = rent(gateway.clone(), store(), options("telebir", None)).await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::Validation(ValidationError::MissingPhoneNumber(
                PaymentRail::MobileMoney
            )))
        ));
        assert!(gateway.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decline_without_terminal_leaves_no_rental() {
        let gateway = Arc::new(RecordingGateway {
            decline: true,
            ..Default::default()
        });
        let entitlements = store();

        let result = rent(gateway, entitlements.clone(), options("cbeBir", Some("0911"))).await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Rental was not completed");
        assert!(format!("{err:#}").contains("Insufficient balance"));
        assert!(!entitlements.has_active(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_method_is_rejected() {
        let result = rent(
            Arc::new(RecordingGateway::default()),
            store(),
            options("paypal", None),
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("paypal"));
    }

    #[test]
    fn test_instructions_are_numbered_and_end_with_note() {
        let telebir = PaymentProvider::find("telebir").unwrap();

        let text = format_instructions(telebir);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), telebir.instructions.len() + 1);
        assert_eq!(lines[0], "  1. Dial *806# on your Ethio Telecom line");
        assert_eq!(lines[4], "  5. Enter your PIN to confirm");
        assert!(lines[5].contains("You will receive a confirmation SMS"));
    }
}
