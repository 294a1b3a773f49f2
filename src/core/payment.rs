//! Payment capture for a rental: method selection, detail capture,
//! submission to the gateway and recording of the resulting entitlement.

use crate::core::entitlement::{Entitlement, EntitlementStore};
use crate::core::gateway::{PaymentGateway, PaymentRequest};
use crate::core::pricing::CostBreakdown;
use crate::core::rental::{ItemId, RentalConfiguration};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Input problems detected locally, before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No payment method selected")]
    NoMethodSelected,
    #[error("A phone number is required for {0} payments")]
    MissingPhoneNumber(PaymentRail),
    #[error("Unsupported rental duration: {0} weeks")]
    InvalidDuration(u32),
    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),
    #[error("Unknown delivery method: {0}")]
    UnknownDeliveryMethod(String),
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Cannot {action} while in {from} state")]
    InvalidTransition {
        from: PaymentState,
        action: &'static str,
    },
    #[error("A payment submission is already in progress")]
    SubmissionInFlight,
    #[error("Payment failed: {message}")]
    Gateway { message: String },
    #[error("Payment was accepted but the rental could not be recorded")]
    Persistence(#[source] anyhow::Error),
}

/// Category of payment method, each with its own required capture fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentRail {
    MobileMoney,
    BankTransfer,
    Card,
}

impl Display for PaymentRail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PaymentRail::MobileMoney => "mobile money",
            PaymentRail::BankTransfer => "bank transfer",
            PaymentRail::Card => "card",
        })
    }
}

/// A named payment provider the user can pick.
#[derive(Debug, PartialEq, Eq)]
pub struct PaymentProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub rail: PaymentRail,
    pub short_code: Option<&'static str>,
    /// Steps the payer follows on their phone or card before confirming.
    pub instructions: &'static [&'static str],
    pub note: &'static str,
}

pub const PROVIDERS: &[PaymentProvider] = &[
    PaymentProvider {
        id: "telebir",
        name: "Telebir",
        rail: PaymentRail::MobileMoney,
        short_code: Some("*806#"),
        instructions: &[
            "Dial *806# on your Ethio Telecom line",
            "Select 'Send Money'",
            "Enter recipient number: 0912345678",
            "Enter amount",
            "Enter your PIN to confirm",
        ],
        note: "You will receive a confirmation SMS",
    },
    PaymentProvider {
        id: "hellocash",
        name: "HelloCash",
        rail: PaymentRail::MobileMoney,
        short_code: Some("*812#"),
        instructions: &[
            "Dial *812# on your HelloCash line",
            "Select 'Send Money'",
            "Enter recipient number",
            "Enter amount",
            "Confirm transaction",
        ],
        note: "Transaction fee may apply",
    },
    PaymentProvider {
        id: "cbeBir",
        name: "CBE Birr",
        rail: PaymentRail::BankTransfer,
        short_code: Some("*889#"),
        instructions: &[
            "Dial *889# on your registered phone",
            "Select 'Transfer'",
            "Choose 'CBE Birr'",
            "Enter recipient number: 0912345678",
            "Enter amount and confirm",
        ],
        note: "Service available 24/7",
    },
    PaymentProvider {
        id: "dashen",
        name: "Dashen Bank",
        rail: PaymentRail::BankTransfer,
        short_code: Some("*809#"),
        instructions: &[
            "Open Dashen Bank mobile app",
            "Select 'Transfer'",
            "Choose 'To Mobile Wallet'",
            "Select recipient network",
            "Enter amount and complete",
        ],
        note: "Use your mobile banking credentials",
    },
    PaymentProvider {
        id: "awash",
        name: "Awash Bank",
        rail: PaymentRail::BankTransfer,
        short_code: Some("*829#"),
        instructions: &[
            "Dial *829# on your registered phone",
            "Select 'Mobile Banking'",
            "Choose 'Fund Transfer'",
            "Enter recipient details",
            "Confirm transaction",
        ],
        note: "Available for Awash Bank customers",
    },
    PaymentProvider {
        id: "stripe",
        name: "Credit/Debit Card",
        rail: PaymentRail::Card,
        short_code: None,
        instructions: &[
            "Enter card details securely",
            "Verify with 3D Secure if prompted",
            "Review payment amount",
            "Complete authentication",
        ],
        note: "Secure international payment",
    },
];

impl PaymentProvider {
    pub fn find(id: &str) -> Result<&'static PaymentProvider, ValidationError> {
        PROVIDERS
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| ValidationError::UnknownPaymentMethod(id.to_string()))
    }
}

/// Raw values typed in by the user during detail capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentDetails {
    pub phone_number: Option<String>,
}

/// Validated, rail-specific payment details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    MobileMoney { phone: String },
    BankTransfer { phone: String },
    Card,
}

impl PaymentMethod {
    pub fn from_capture(rail: PaymentRail, details: &PaymentDetails) -> Result<Self, ValidationError> {
        let phone = || {
            details
                .phone_number
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .ok_or(ValidationError::MissingPhoneNumber(rail))
        };

        Ok(match rail {
            PaymentRail::MobileMoney => PaymentMethod::MobileMoney { phone: phone()? },
            PaymentRail::BankTransfer => PaymentMethod::BankTransfer { phone: phone()? },
            PaymentRail::Card => PaymentMethod::Card,
        })
    }

    pub fn rail(&self) -> PaymentRail {
        match self {
            PaymentMethod::MobileMoney { .. } => PaymentRail::MobileMoney,
            PaymentMethod::BankTransfer { .. } => PaymentRail::BankTransfer,
            PaymentMethod::Card => PaymentRail::Card,
        }
    }

    pub fn phone_number(&self) -> Option<&str> {
        match self {
            PaymentMethod::MobileMoney { phone } | PaymentMethod::BankTransfer { phone } => {
                Some(phone)
            }
            PaymentMethod::Card => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentState {
    MethodSelection,
    DetailCapture,
    Submitting,
    Success,
    Failure,
    Cancelled,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentState::Success | PaymentState::Cancelled)
    }
}

impl Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PaymentState::MethodSelection => "method selection",
            PaymentState::DetailCapture => "detail capture",
            PaymentState::Submitting => "submitting",
            PaymentState::Success => "success",
            PaymentState::Failure => "failure",
            PaymentState::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub session_id: Uuid,
    pub item_id: ItemId,
    pub provider: Option<&'static PaymentProvider>,
    pub state: PaymentState,
    pub details: PaymentDetails,
    /// Assigned on first submission and reused by every retry.
    pub transaction_reference: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub entitlement: Entitlement,
    pub transaction_id: String,
    /// The item was already rented; no new entitlement was written.
    pub already_active: bool,
}

fn new_transaction_reference() -> String {
    format!("TXN{}", Uuid::new_v4().simple()).to_uppercase()
}

/// Drives one payment session from method selection to its outcome.
///
/// Transitions are synchronous except [`PaymentFlowController::submit`],
/// the only step that talks to the gateway. While a submission is in
/// flight every other transition, including cancellation, is rejected.
pub struct PaymentFlowController {
    config: RentalConfiguration,
    cost: CostBreakdown,
    session: Mutex<PaymentSession>,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: Arc<EntitlementStore>,
}

impl PaymentFlowController {
    pub fn new(
        config: RentalConfiguration,
        cost: CostBreakdown,
        gateway: Arc<dyn PaymentGateway>,
        entitlements: Arc<EntitlementStore>,
    ) -> Self {
        let session = PaymentSession {
            session_id: Uuid::new_v4(),
            item_id: config.item_id,
            provider: None,
            state: PaymentState::MethodSelection,
            details: PaymentDetails::default(),
            transaction_reference: None,
            gateway_transaction_id: None,
            last_error: None,
        };
        debug!(session_id = %session.session_id, item_id = config.item_id, "Payment session opened");

        Self {
            config,
            cost,
            session: Mutex::new(session),
            gateway,
            entitlements,
        }
    }

    fn session(&self) -> MutexGuard<'_, PaymentSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expect_state(
        session: &PaymentSession,
        allowed: &[PaymentState],
        action: &'static str,
    ) -> Result<(), FlowError> {
        if allowed.contains(&session.state) {
            Ok(())
        } else if session.state == PaymentState::Submitting {
            Err(FlowError::SubmissionInFlight)
        } else {
            Err(FlowError::InvalidTransition {
                from: session.state,
                action,
            })
        }
    }

    fn transition(session: &mut PaymentSession, to: PaymentState) {
        debug!(
            session_id = %session.session_id,
            "Payment state {} -> {}", session.state, to
        );
        session.state = to;
    }

    pub fn state(&self) -> PaymentState {
        self.session().state
    }

    pub fn snapshot(&self) -> PaymentSession {
        self.session().clone()
    }

    pub fn cost(&self) -> &CostBreakdown {
        &self.cost
    }

    /// Picks the payment provider. Allowed only during method selection.
    ///
    /// Switching to a different provider starts a new payment attempt, so
    /// any transaction reference from an earlier submission is dropped.
    pub fn select_method(&self, provider_id: &str) -> Result<&'static PaymentProvider, FlowError> {
        let mut session = self.session();
        Self::expect_state(&session, &[PaymentState::MethodSelection], "select a method")?;
        let provider = PaymentProvider::find(provider_id)?;
        if session.provider.is_some_and(|current| current.id != provider.id) {
            let previous = session.transaction_reference.take();
            debug!(
                session_id = %session.session_id,
                previous_reference = ?previous,
                "Payment provider changed to {}", provider.id
            );
        }
        session.provider = Some(provider);
        Ok(provider)
    }

    /// MethodSelection -> DetailCapture.
    pub fn proceed(&self) -> Result<(), FlowError> {
        let mut session = self.session();
        Self::expect_state(&session, &[PaymentState::MethodSelection], "proceed")?;
        if session.provider.is_none() {
            return Err(ValidationError::NoMethodSelected.into());
        }
        Self::transition(&mut session, PaymentState::DetailCapture);
        Ok(())
    }

    /// DetailCapture -> MethodSelection.
    pub fn back(&self) -> Result<(), FlowError> {
        let mut session = self.session();
        Self::expect_state(&session, &[PaymentState::DetailCapture], "go back")?;
        Self::transition(&mut session, PaymentState::MethodSelection);
        Ok(())
    }

    pub fn capture_details(&self, details: PaymentDetails) -> Result<(), FlowError> {
        let mut session = self.session();
        Self::expect_state(&session, &[PaymentState::DetailCapture], "capture details")?;
        session.details = details;
        Ok(())
    }

    /// Failure -> DetailCapture, keeping the transaction reference.
    pub fn retry(&self) -> Result<(), FlowError> {
        let mut session = self.session();
        Self::expect_state(&session, &[PaymentState::Failure], "retry")?;
        session.last_error = None;
        Self::transition(&mut session, PaymentState::DetailCapture);
        Ok(())
    }

    /// Abandons the session. Never touches the entitlement store.
    pub fn cancel(&self) -> Result<(), FlowError> {
        let mut session = self.session();
        Self::expect_state(
            &session,
            &[
                PaymentState::MethodSelection,
                PaymentState::DetailCapture,
                PaymentState::Failure,
            ],
            "cancel",
        )?;
        Self::transition(&mut session, PaymentState::Cancelled);
        Ok(())
    }

    /// Validates the captured details and moves to Submitting, returning the
    /// request to send. Leaves the state untouched on validation failure.
    fn begin_submission(&self) -> Result<(PaymentMethod, PaymentRequest), FlowError> {
        let mut session = self.session();
        Self::expect_state(&session, &[PaymentState::DetailCapture], "submit")?;

        let provider = session.provider.ok_or(ValidationError::NoMethodSelected)?;
        let method = PaymentMethod::from_capture(provider.rail, &session.details)?;

        let reference = session
            .transaction_reference
            .get_or_insert_with(new_transaction_reference)
            .clone();

        let request = PaymentRequest {
            book_id: self.config.item_id,
            payment_method: provider.id.to_string(),
            amount_usd: self.cost.total_usd,
            amount_etb: self.cost.total_local,
            phone_number: method.phone_number().map(str::to_string),
            transaction_id: reference,
            exchange_rate: self.cost.exchange_rate,
            rental_duration: self.config.duration.weeks(),
            delivery_method: self.config.delivery,
            return_date: Utc::now() + self.config.duration.to_duration(),
        };

        Self::transition(&mut session, PaymentState::Submitting);
        Ok((method, request))
    }

    fn fail(&self, error: FlowError) -> FlowError {
        let mut session = self.session();
        session.last_error = Some(error.to_string());
        Self::transition(&mut session, PaymentState::Failure);
        error
    }

    /// DetailCapture -> Submitting -> Success | Failure.
    #[instrument(name = "PaymentSubmit", skip(self), fields(item_id = self.config.item_id))]
    pub async fn submit(&self) -> Result<PaymentOutcome, FlowError> {
        let (method, request) = self.begin_submission()?;
        debug!(transaction_id = %request.transaction_id, "Submitting payment");

        let response = match self.gateway.submit(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Payment gateway error: {:#}", e);
                return Err(self.fail(FlowError::Gateway {
                    message: e.to_string(),
                }));
            }
        };

        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "Payment was declined".to_string());
            warn!("Payment declined: {}", message);
            return Err(self.fail(FlowError::Gateway { message }));
        }

        let candidate = Entitlement::new(
            self.config.item_id,
            self.config.duration,
            method.rail(),
            Utc::now(),
        );
        let entitlement = match self.entitlements.add(candidate.clone()).await {
            Ok(entitlement) => entitlement,
            Err(e) => return Err(self.fail(FlowError::Persistence(e))),
        };
        let already_active = entitlement != candidate;
        let transaction_id = response
            .transaction_id
            .unwrap_or_else(|| request.transaction_id.clone());

        let mut session = self.session();
        session.gateway_transaction_id = Some(transaction_id.clone());
        Self::transition(&mut session, PaymentState::Success);
        info!(
            transaction_id = %transaction_id,
            already_active,
            "Rental of item {} paid until {}",
            entitlement.item_id,
            entitlement.expires_at
        );

        Ok(PaymentOutcome {
            entitlement,
            transaction_id,
            already_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::ExchangeRate;
    use crate::core::gateway::GatewayResponse;
    use crate::core::pricing::{ItemPrice, compute_cost};
    use crate::core::rental::{DeliveryMethod, RentalDuration};
    use crate::store::memory::MemoryCollection;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::Notify;

    /// Replays scripted responses and records every request it sees.
    struct MockGateway {
        responses: Mutex<Vec<Result<GatewayResponse, String>>>,
        requests: Mutex<Vec<PaymentRequest>>,
        release: Option<Arc<Notify>>,
    }

    impl MockGateway {
        fn new(responses: Vec<Result<GatewayResponse, String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
                release: None,
            }
        }

        fn gated(response: GatewayResponse, release: Arc<Notify>) -> Self {
            Self {
                release: Some(release),
                ..Self::new(vec![Ok(response)])
            }
        }

        fn requests(&self) -> Vec<PaymentRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn submit(&self, request: &PaymentRequest) -> Result<GatewayResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.responses.lock().unwrap().remove(0).map_err(|e| anyhow!(e))
        }
    }

    fn approved(id: &str) -> GatewayResponse {
        GatewayResponse {
            success: true,
            message: None,
            transaction_id: Some(id.to_string()),
        }
    }

    fn declined(message: &str) -> GatewayResponse {
        GatewayResponse {
            success: false,
            message: Some(message.to_string()),
            transaction_id: None,
        }
    }

    fn controller(
        gateway: Arc<MockGateway>,
        entitlements: Arc<EntitlementStore>,
    ) -> PaymentFlowController {
        let config = RentalConfiguration::new(42, 4, DeliveryMethod::Delivery).unwrap();
        let item = ItemPrice {
            price: dec!(10),
            rental_price: None,
        };
        let cost = compute_cost(&config, &item, &ExchangeRate::live(dec!(55), Utc::now()));
        PaymentFlowController::new(config, cost, gateway, entitlements)
    }

    fn store() -> Arc<EntitlementStore> {
        Arc::new(EntitlementStore::new(Arc::new(MemoryCollection::new())))
    }

    fn phone(number: &str) -> PaymentDetails {
        PaymentDetails {
            phone_number: Some(number.to_string()),
        }
    }

    #[tokio::test]
    async fn test_successful_mobile_money_payment_records_entitlement() {
        let gateway = Arc::new(MockGateway::new(vec![Ok(approved("TXN123"))]));
        let entitlements = store();
        let flow = controller(Arc::clone(&gateway), Arc::clone(&entitlements));

        flow.select_method("telebir").unwrap();
        flow.proceed().unwrap();
        flow.capture_details(phone("0912345678")).unwrap();
        let outcome = flow.submit().await.unwrap();

        assert_eq!(flow.state(), PaymentState::Success);
        assert_eq!(outcome.transaction_id, "TXN123");
        assert!(!outcome.already_active);
        assert_eq!(outcome.entitlement.item_id, 42);
        assert_eq!(outcome.entitlement.method, PaymentRail::MobileMoney);
        assert_eq!(entitlements.list().await.unwrap().len(), 1);

        let request = &gateway.requests()[0];
        assert_eq!(request.book_id, 42);
        assert_eq!(request.payment_method, "telebir");
        assert_eq!(request.amount_usd, dec!(6.99));
        assert_eq!(request.amount_etb, dec!(384.45));
        assert_eq!(request.phone_number.as_deref(), Some("0912345678"));
        assert_eq!(request.rental_duration, 4);
        assert_eq!(request.delivery_method, DeliveryMethod::Delivery);
        assert!(request.transaction_id.starts_with("TXN"));
    }

    #[tokio::test]
    async fn test_submit_from_method_selection_is_rejected() {
        let gateway = Arc::new(MockGateway::new(vec![Ok(approved("TXN1"))]));
        let flow = controller(Arc::clone(&gateway), store());
        flow.select_method("stripe").unwrap();

        let result = flow.submit().await;

        assert!(matches!(
            result,
            Err(FlowError::InvalidTransition {
                from: PaymentState::MethodSelection,
                ..
            })
        ));
        assert_eq!(flow.state(), PaymentState::MethodSelection);
        assert!(gateway.requests().is_empty());
    }

    #[test]
    fn test_proceed_requires_a_method() {
        let flow = controller(Arc::new(MockGateway::new(vec![])), store());

        let result = flow.proceed();

        assert!(matches!(
            result,
            Err(FlowError::Validation(ValidationError::NoMethodSelected))
        ));
        assert_eq!(flow.state(), PaymentState::MethodSelection);
    }

    #[test]
    fn test_unknown_method_is_a_validation_failure() {
        let flow = controller(Arc::new(MockGateway::new(vec![])), store());

        let result = flow.select_method("bitcoin");

        assert!(matches!(
            result,
            Err(FlowError::Validation(ValidationError::UnknownPaymentMethod(_)))
        ));
    }

    #[tokio::test]
    async fn test_mobile_money_without_phone_is_blocked_locally() {
        let gateway = Arc::new(MockGateway::new(vec![Ok(approved("TXN1"))]));
        let flow = controller(Arc::clone(&gateway), store());
        flow.select_method("telebir").unwrap();
        flow.proceed().unwrap();
        flow.capture_details(phone("   ")).unwrap();

        let result = flow.submit().await;

        assert!(matches!(
            result,
            Err(FlowError::Validation(ValidationError::MissingPhoneNumber(
                PaymentRail::MobileMoney
            )))
        ));
        assert_eq!(flow.state(), PaymentState::DetailCapture);
        assert!(gateway.requests().is_empty());
        assert!(flow.snapshot().transaction_reference.is_none());
    }

    #[tokio::test]
    async fn test_bank_transfer_requires_phone_but_card_does_not() {
        let flow = controller(Arc::new(MockGateway::new(vec![])), store());
        flow.select_method("cbeBir").unwrap();
        flow.proceed().unwrap();
        assert!(matches!(
            flow.submit().await,
            Err(FlowError::Validation(ValidationError::MissingPhoneNumber(
                PaymentRail::BankTransfer
            )))
        ));

        let gateway = Arc::new(MockGateway::new(vec![Ok(approved("TXN9"))]));
        let flow = controller(Arc::clone(&gateway), store());
        flow.select_method("stripe").unwrap();
        flow.proceed().unwrap();
        let outcome = flow.submit().await.unwrap();

        assert_eq!(outcome.entitlement.method, PaymentRail::Card);
        assert_eq!(gateway.requests()[0].phone_number, None);
    }

    #[tokio::test]
    async fn test_declined_payment_can_be_retried_with_same_reference() {
        let gateway = Arc::new(MockGateway::new(vec![
            Ok(declined("Insufficient funds")),
            Err("connection reset".to_string()),
            Ok(approved("TXN777")),
        ]));
        let entitlements = store();
        let flow = controller(Arc::clone(&gateway), Arc::clone(&entitlements));
        flow.select_method("hellocash").unwrap();
        flow.proceed().unwrap();
        flow.capture_details(phone("0911000000")).unwrap();

        let first = flow.submit().await;
        assert!(matches!(first, Err(FlowError::Gateway { ref message }) if message == "Insufficient funds"));
        assert_eq!(flow.state(), PaymentState::Failure);
        assert!(entitlements.list().await.unwrap().is_empty());

        flow.retry().unwrap();
        assert!(matches!(flow.submit().await, Err(FlowError::Gateway { .. })));

        flow.retry().unwrap();
        flow.submit().await.unwrap();

        let references: Vec<_> = gateway
            .requests()
            .into_iter()
            .map(|r| r.transaction_id)
            .collect();
        assert_eq!(references.len(), 3);
        assert!(references.iter().all(|r| r == &references[0]));
        assert_eq!(entitlements.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rental_reports_success_without_second_entitlement() {
        let entitlements = store();
        let existing = Entitlement::new(
            42,
            RentalDuration::try_from(8).unwrap(),
            PaymentRail::Card,
            Utc::now(),
        );
        entitlements.add(existing.clone()).await.unwrap();

        let gateway = Arc::new(MockGateway::new(vec![Ok(approved("TXN123"))]));
        let flow = controller(gateway, Arc::clone(&entitlements));
        flow.select_method("telebir").unwrap();
        flow.proceed().unwrap();
        flow.capture_details(phone("0912345678")).unwrap();
        let outcome = flow.submit().await.unwrap();

        assert_eq!(flow.state(), PaymentState::Success);
        assert!(outcome.already_active);
        assert_eq!(outcome.entitlement, existing);
        assert_eq!(entitlements.list().await.unwrap(), vec![existing]);
    }

    #[tokio::test]
    async fn test_cancel_discards_session() {
        let entitlements = store();
        let flow = controller(Arc::new(MockGateway::new(vec![])), Arc::clone(&entitlements));
        flow.select_method("telebir").unwrap();
        flow.proceed().unwrap();

        flow.cancel().unwrap();

        assert_eq!(flow.state(), PaymentState::Cancelled);
        assert!(flow.state().is_terminal());
        assert!(flow.proceed().is_err());
        assert!(entitlements.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_back_returns_to_method_selection() {
        let flow = controller(Arc::new(MockGateway::new(vec![])), store());
        flow.select_method("telebir").unwrap();
        flow.proceed().unwrap();

        flow.back().unwrap();
        assert_eq!(flow.state(), PaymentState::MethodSelection);

        flow.select_method("stripe").unwrap();
        flow.proceed().unwrap();
        assert_eq!(flow.snapshot().provider.map(|p| p.id), Some("stripe"));
    }

    #[tokio::test]
    async fn test_concurrent_submit_and_cancel_are_rejected_while_in_flight() {
        let release = Arc::new(Notify::new());
        let gateway = Arc::new(MockGateway::gated(approved("TXN5"), Arc::clone(&release)));
        let flow = Arc::new(controller(Arc::clone(&gateway), store()));
        flow.select_method("stripe").unwrap();
        flow.proceed().unwrap();

        let in_flight = {
            let flow = Arc::clone(&flow);
            tokio::spawn(async move { flow.submit().await })
        };
        while flow.state() != PaymentState::Submitting {
            tokio::task::yield_now().await;
        }

        assert!(matches!(flow.submit().await, Err(FlowError::SubmissionInFlight)));
        assert!(matches!(flow.cancel(), Err(FlowError::SubmissionInFlight)));

        release.notify_one();
        let outcome = in_flight.await.unwrap().unwrap();

        assert_eq!(outcome.transaction_id, "TXN5");
        assert_eq!(flow.state(), PaymentState::Success);
        assert_eq!(gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cbe_birr_is_submitted_under_its_backend_id() {
        let gateway = Arc::new(MockGateway::new(vec![Ok(approved("TXN8"))]));
        let flow = controller(Arc::clone(&gateway), store());
        flow.select_method("cbeBir").unwrap();
        flow.proceed().unwrap();
        flow.capture_details(phone("0912345678")).unwrap();
        flow.submit().await.unwrap();

        let body = serde_json::to_value(&gateway.requests()[0]).unwrap();
        assert_eq!(body["payment_method"], "cbeBir");
    }

    #[test]
    fn test_every_provider_has_instructions() {
        for provider in PROVIDERS {
            assert!(!provider.instructions.is_empty(), "{}", provider.id);
            assert!(!provider.note.is_empty(), "{}", provider.id);
            if let (PaymentRail::MobileMoney, Some(code)) = (provider.rail, provider.short_code) {
                assert!(provider.instructions[0].contains(code), "{}", provider.id);
            }
        }
    }

    #[tokio::test]
    async fn test_switching_provider_after_failure_uses_new_reference() {
        let gateway = Arc::new(MockGateway::new(vec![
            Ok(declined("Insufficient funds")),
            Ok(approved("TXN2")),
        ]));
        let flow = controller(Arc::clone(&gateway), store());
        flow.select_method("telebir").unwrap();
        flow.proceed().unwrap();
        flow.capture_details(phone("0912345678")).unwrap();
        assert!(flow.submit().await.is_err());

        flow.retry().unwrap();
        flow.back().unwrap();
        flow.select_method("stripe").unwrap();
        assert!(flow.snapshot().transaction_reference.is_none());
        flow.proceed().unwrap();
        flow.submit().await.unwrap();

        let requests = gateway.requests();
        assert_eq!(requests[0].payment_method, "telebir");
        assert_eq!(requests[1].payment_method, "stripe");
        assert_ne!(requests[0].transaction_id, requests[1].transaction_id);
    }

    #[tokio::test]
    async fn test_reselecting_same_provider_keeps_reference() {
        let gateway = Arc::new(MockGateway::new(vec![
            Ok(declined("Timeout at bank")),
            Ok(approved("TXN3")),
        ]));
        let flow = controller(Arc::clone(&gateway), store());
        flow.select_method("awash").unwrap();
        flow.proceed().unwrap();
        flow.capture_details(phone("0911223344")).unwrap();
        assert!(flow.submit().await.is_err());
        let reference = flow.snapshot().transaction_reference;

        flow.retry().unwrap();
        flow.back().unwrap();
        flow.select_method("AWASH").unwrap();
        assert_eq!(flow.snapshot().transaction_reference, reference);
        flow.proceed().unwrap();
        flow.submit().await.unwrap();

        let requests = gateway.requests();
        assert_eq!(requests[0].transaction_id, requests[1].transaction_id);
    }
}
