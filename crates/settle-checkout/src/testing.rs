//! Fixtures shared by the checkout service tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use settle_core::quote::QuotePolicy;
use settle_core::{
    BuyerInfo, Coupon, CouponKind, LineRequest, Order, OrderStatus, Product, ProductStatus, ProductVariant,
    QuantityPriceRule, QuoteRequest, RefundInfo, RuleKind, Tender, TenderTier,
};
use settle_db::{Database, DbConfig};
use settle_gateway::signature::{hosted_signature, verify_hosted_signature};
use settle_gateway::{
    GatewayError, GatewayRefund, GatewayResult, Gateways, PaymentGateway, PaymentOutcome, PaymentRequest,
    PaymentSession, RefundRequest, SessionHandle, VerificationPayload, VerifiedPayment,
};

use crate::clock::Clock;
use crate::initiate::{InitiateRequest, PaymentIntentInitiator};
use crate::notify::{Notifier, NotifyError};
use crate::orders::OrderStatusService;
use crate::quote::OrderQuoteBuilder;
use crate::refund::RefundCoordinator;
use crate::settlement::SettlementCommitter;
use crate::sweep::IntentSweeper;

pub const FAKE_SECRET: &str = "fake_key_secret";

// =============================================================================
// Clock
// =============================================================================

pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FixedClock(Mutex::new(now))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Unavailable,
    Rejected,
}

impl FakeFailure {
    fn into_error(self) -> GatewayError {
        match self {
            FakeFailure::Unavailable => GatewayError::Unavailable("connection reset".into()),
            FakeFailure::Rejected => GatewayError::Rejected {
                status: 400,
                message: "refund window closed".into(),
            },
        }
    }
}

#[derive(Default)]
struct FakeState {
    created: u32,
    verdict: Option<VerifiedPayment>,
    verify_failure: Option<FakeFailure>,
    refund_failure: Option<FakeFailure>,
    refunds: Vec<RefundRequest>,
}

/// In-process provider. Hosted payloads are checked with the real HMAC
/// under [`FAKE_SECRET`]; verdicts are scripted.
pub struct FakeGateway {
    tender: Tender,
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn hosted() -> Self {
        FakeGateway {
            tender: Tender::HostedCheckout,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn redirect() -> Self {
        FakeGateway {
            tender: Tender::Redirect,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn script_verdict(&self, verdict: VerifiedPayment) {
        self.state.lock().unwrap().verdict = Some(verdict);
    }

    pub fn fail_verify(&self, failure: FakeFailure) {
        self.state.lock().unwrap().verify_failure = Some(failure);
    }

    pub fn fail_refunds(&self, failure: FakeFailure) {
        self.state.lock().unwrap().refund_failure = Some(failure);
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.state.lock().unwrap().refunds.clone()
    }

    pub fn created(&self) -> u32 {
        self.state.lock().unwrap().created
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn tender(&self) -> Tender {
        self.tender
    }

    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentSession> {
        let mut state = self.state.lock().unwrap();
        state.created += 1;

        Ok(match self.tender {
            Tender::HostedCheckout => {
                let order_id = format!("order_fake_{}", state.created);
                PaymentSession {
                    gateway_ref: order_id.clone(),
                    handle: SessionHandle::HostedCheckout {
                        order_id,
                        key_id: "key_fake".into(),
                        amount: request.amount,
                    },
                }
            }
            _ => PaymentSession {
                gateway_ref: request.merchant_ref.clone(),
                handle: SessionHandle::Redirect {
                    redirect_url: format!("https://pay.example.test/{}", request.merchant_ref),
                },
            },
        })
    }

    async fn verify_payment(&self, gateway_ref: &str, payload: &VerificationPayload) -> GatewayResult<VerifiedPayment> {
        let state = self.state.lock().unwrap();
        if let Some(failure) = state.verify_failure {
            return Err(failure.into_error());
        }

        let payment_id = match payload {
            VerificationPayload::HostedCheckout {
                order_ref,
                payment_ref,
                signature,
            } => {
                if order_ref != gateway_ref || !verify_hosted_signature(order_ref, payment_ref, signature, FAKE_SECRET)? {
                    return Err(GatewayError::SignatureInvalid);
                }
                payment_ref.clone()
            }
            VerificationPayload::Redirect { .. } => format!("txn_{gateway_ref}"),
        };

        Ok(state.verdict.clone().unwrap_or(VerifiedPayment {
            outcome: PaymentOutcome::Paid,
            gateway_payment_id: Some(payment_id),
            amount: None,
        }))
    }

    async fn refund(&self, request: &RefundRequest) -> GatewayResult<GatewayRefund> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.refund_failure {
            return Err(failure.into_error());
        }

        state.refunds.push(request.clone());
        Ok(GatewayRefund {
            refund_id: format!("rfnd_{}", state.refunds.len()),
            amount: request.amount,
        })
    }
}

/// A correctly signed hosted checkout proof.
pub fn hosted_payload(gateway_ref: &str, payment_ref: &str) -> VerificationPayload {
    VerificationPayload::HostedCheckout {
        order_ref: gateway_ref.to_string(),
        payment_ref: payment_ref.to_string(),
        signature: hosted_signature(gateway_ref, payment_ref, FAKE_SECRET).unwrap(),
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// Records deliveries; can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn record(&self, event: String) -> Result<(), NotifyError> {
        if *self.failing.lock().unwrap() {
            return Err(NotifyError("smtp unreachable".into()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_order_created(&self, order: &Order) -> Result<(), NotifyError> {
        self.record(format!("created:{}", order.order_number))
    }

    async fn notify_status_changed(
        &self,
        order: &Order,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), NotifyError> {
        self.record(format!("status:{}:{from}->{to}", order.order_number))
    }

    async fn notify_refunded(&self, order: &Order, refund: &RefundInfo) -> Result<(), NotifyError> {
        self.record(format!("refunded:{}:{}", order.order_number, refund.amount_cents))
    }
}

// =============================================================================
// Catalog Builders
// =============================================================================

pub fn product(id: &str, price_cents: i64) -> Product {
    let at = epoch();
    Product {
        id: id.to_string(),
        name: format!("Product {id}"),
        status: ProductStatus::Active,
        price_cents,
        offer_price_cents: None,
        wholesale_price_cents: None,
        subcategory_id: None,
        created_at: at,
        updated_at: at,
    }
}

pub fn line(product_id: &str, variant_id: Option<&str>, quantity: i64) -> LineRequest {
    LineRequest {
        product_id: product_id.to_string(),
        variant_id: variant_id.map(str::to_string),
        quantity,
    }
}

pub fn request(lines: Vec<LineRequest>) -> QuoteRequest {
    QuoteRequest {
        lines,
        coupon_code: None,
        tier: TenderTier::Retail,
    }
}

pub fn buyer() -> BuyerInfo {
    BuyerInfo {
        name: "Ayesha Khan".to_string(),
        email: "ayesha@example.com".to_string(),
        phone: Some("+92 300 1234567".to_string()),
        shipping_address: "12 Canal Road, Lahore".to_string(),
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

// =============================================================================
// Harness
// =============================================================================

/// A database path under the system temp dir; the file and its WAL
/// companions are removed on drop.
pub struct ScratchFile(PathBuf);

impl ScratchFile {
    pub fn new() -> Self {
        let name = format!("settle-test-{}.db", uuid::Uuid::new_v4().simple());
        ScratchFile(std::env::temp_dir().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

/// An in-memory database, a fixed clock and one fake per gateway tender.
pub struct Harness {
    pub db: Database,
    pub clock: Arc<FixedClock>,
    pub hosted: Arc<FakeGateway>,
    pub redirect: Arc<FakeGateway>,
    pub gateways: Gateways,
}

impl Harness {
    pub async fn new() -> Self {
        Harness::with_config(DbConfig::in_memory()).await
    }

    /// A file database with a real multi-connection pool, so concurrent
    /// callers contend on SQLite's write lock.
    pub async fn file_backed(file: &ScratchFile) -> Self {
        Harness::with_config(DbConfig::new(file.path()).max_connections(8)).await
    }

    async fn with_config(config: DbConfig) -> Self {
        let db = Database::new(config).await.unwrap();
        let hosted = Arc::new(FakeGateway::hosted());
        let redirect = Arc::new(FakeGateway::redirect());
        let gateways = Gateways::new()
            .with(hosted.clone() as Arc<dyn PaymentGateway>)
            .with(redirect.clone() as Arc<dyn PaymentGateway>);

        Harness {
            db,
            clock: Arc::new(FixedClock::new(epoch() + Duration::days(1))),
            hosted,
            redirect,
            gateways,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    pub async fn insert_product(&self, product: Product) {
        self.db.catalog().insert_product(&product).await.unwrap();
    }

    pub async fn add_product(&self, id: &str, price_cents: i64, subcategory: Option<&str>, variants: &[(&str, i64)]) {
        let mut p = product(id, price_cents);
        p.subcategory_id = subcategory.map(str::to_string);
        self.insert_product(p).await;

        for (variant_id, stock) in variants {
            let variant = ProductVariant {
                id: variant_id.to_string(),
                product_id: id.to_string(),
                label: "Default".to_string(),
                sku: None,
                stock: *stock,
                updated_at: epoch(),
            };
            self.db.catalog().insert_variant(&variant).await.unwrap();
        }
    }

    pub async fn add_rule(&self, id: &str, subcategory: &str, threshold: i64, kind: RuleKind, value: i64) {
        let rule = QuantityPriceRule {
            id: id.to_string(),
            subcategory_id: subcategory.to_string(),
            threshold,
            kind,
            value,
            is_active: true,
        };
        self.db.catalog().insert_rule(&rule).await.unwrap();
    }

    pub async fn add_coupon(
        &self,
        id: &str,
        code: &str,
        kind: CouponKind,
        value: i64,
        min_order_cents: i64,
        usage_limit: Option<i64>,
    ) {
        let coupon = Coupon {
            id: id.to_string(),
            code: code.to_string(),
            kind,
            value,
            max_discount_cents: None,
            min_order_cents,
            valid_from: epoch(),
            valid_until: epoch() + Duration::days(90),
            usage_limit,
            used_count: 0,
            is_active: true,
        };
        self.db.coupons().insert(&coupon).await.unwrap();
    }

    pub async fn stock(&self, variant_id: &str) -> i64 {
        self.db.catalog().stock_of(variant_id).await.unwrap().unwrap()
    }

    pub async fn set_stock(&self, variant_id: &str, stock: i64) {
        self.db.catalog().set_stock(variant_id, stock, self.now()).await.unwrap();
    }

    // -------------------------------------------------------------------------
    // Services
    // -------------------------------------------------------------------------

    pub fn quotes(&self) -> OrderQuoteBuilder {
        OrderQuoteBuilder::new(self.db.clone(), QuotePolicy::default())
    }

    pub fn initiator(&self) -> PaymentIntentInitiator {
        PaymentIntentInitiator::new(
            self.db.clone(),
            self.gateways.clone(),
            self.quotes(),
            self.clock(),
            Duration::hours(24),
        )
    }

    pub fn committer(&self) -> SettlementCommitter {
        SettlementCommitter::new(self.db.clone(), self.gateways.clone(), self.quotes(), self.clock())
    }

    pub fn refunds(&self) -> RefundCoordinator {
        RefundCoordinator::new(self.db.clone(), self.gateways.clone(), self.clock())
    }

    pub fn orders(&self) -> OrderStatusService {
        OrderStatusService::new(self.db.clone(), self.clock())
    }

    pub fn sweeper(&self) -> IntentSweeper {
        IntentSweeper::new(self.db.clone(), self.clock())
    }

    // -------------------------------------------------------------------------
    // Flows
    // -------------------------------------------------------------------------

    /// Seeds `p-1` at 1000 cents with `stock` units of `v-1`.
    pub async fn seed_single(&self, stock: i64) {
        self.add_product("p-1", 1_000, None, &[("v-1", stock)]).await;
    }

    /// Initiates a hosted checkout payment for `quantity` of `v-1`.
    pub async fn initiate_hosted(&self, quantity: i64) -> String {
        let initiated = self
            .initiator()
            .initiate(InitiateRequest {
                buyer: buyer(),
                request: request(vec![line("p-1", Some("v-1"), quantity)]),
                tender: Tender::HostedCheckout,
            })
            .await
            .unwrap();
        initiated.gateway_ref
    }

    /// Initiates a hosted checkout payment for `quantity` of `v-1` with a
    /// coupon code attached.
    pub async fn initiate_with_coupon(&self, quantity: i64, code: &str) -> String {
        let mut req = request(vec![line("p-1", Some("v-1"), quantity)]);
        req.coupon_code = Some(code.to_string());
        self.initiator()
            .initiate(InitiateRequest {
                buyer: buyer(),
                request: req,
                tender: Tender::HostedCheckout,
            })
            .await
            .unwrap()
            .gateway_ref
    }

    pub async fn coupon_uses(&self, coupon_id: &str) -> i64 {
        self.db.coupons().get_by_id(coupon_id).await.unwrap().unwrap().used_count
    }

    /// Initiates and settles a hosted payment; returns the order.
    pub async fn paid_order(&self, quantity: i64) -> Order {
        let gateway_ref = self.initiate_hosted(quantity).await;
        self.committer()
            .verify_and_commit(&gateway_ref, &hosted_payload(&gateway_ref, "pay_1"))
            .await
            .unwrap()
            .into_order()
    }
}
