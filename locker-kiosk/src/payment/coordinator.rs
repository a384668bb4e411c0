//! Settlement coordinator.
//!
//! Turns a confirmed payment into durable state. The order is fixed:
//!
//! 1. reserve the locker unit (atomic, the only step that may block),
//! 2. bring the controller online (best effort),
//! 3. tell the gateway the funds were applied (best effort),
//! 4. persist booking + payment + guest user to the backend,
//! 5. send the access code to the customer (best effort).
//!
//! Step 4 failing does not lose the sale: the paid booking stays in the
//! local cache unreconciled and the reconcile pass pushes it later.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use shared::models::{
    Booking, DeviceStatus, Payment, PaymentRecordStatus, PaymentStatus, User,
};
use shared::{AppError, AppResult};
use std::sync::Arc;

use crate::device::DeviceNotifier;
use crate::ledger::ReservationLedger;
use crate::notify::NotificationService;
use crate::store::{BackendStore, Collection, LocalCache, decode, encode};
use crate::sync::{ChangeEvent, ChangeFeed};

use super::{DemoGateway, GatewayStatus, IntentMode, IntentRequest, PaymentGateway, PaymentIntent};

/// Outcome of a settlement.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub booking: Booking,
    /// False when the backend write failed and the booking is held locally
    /// awaiting reconciliation.
    pub persisted: bool,
}

pub struct SettlementCoordinator {
    gateway: Arc<dyn PaymentGateway>,
    demo: Arc<DemoGateway>,
    backend: Arc<dyn BackendStore>,
    cache: Arc<LocalCache>,
    ledger: Arc<ReservationLedger>,
    devices: Arc<DeviceNotifier>,
    notify: Option<Arc<NotificationService>>,
    feed: ChangeFeed,
    /// Booking ids already settled by this process.
    settled: DashMap<String, ()>,
    /// Status-poll attempt counters, keyed by gateway reference.
    poll_attempts: DashMap<String, u32>,
}

impl SettlementCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        demo: Arc<DemoGateway>,
        backend: Arc<dyn BackendStore>,
        cache: Arc<LocalCache>,
        ledger: Arc<ReservationLedger>,
        devices: Arc<DeviceNotifier>,
        notify: Option<Arc<NotificationService>>,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            gateway,
            demo,
            backend,
            cache,
            ledger,
            devices,
            notify,
            feed,
            settled: DashMap::new(),
            poll_attempts: DashMap::new(),
        }
    }

    /// Staff-side confirmation handle for demo intents.
    pub fn demo_gateway(&self) -> &Arc<DemoGateway> {
        &self.demo
    }

    fn dispatch(&self, mode: IntentMode) -> &dyn PaymentGateway {
        match mode {
            IntentMode::Live => self.gateway.as_ref(),
            IntentMode::Demo => self.demo.as_ref(),
        }
    }

    /// Create a payment intent, falling back to the demo gateway when the
    /// provider cannot be reached. Provider rejections (reachable but
    /// saying no) are not eligible for fallback.
    pub async fn create_intent(&self, request: &IntentRequest) -> AppResult<PaymentIntent> {
        match self.gateway.create_intent(request).await {
            Ok(intent) => Ok(intent),
            Err(AppError::GatewayUnreachable(msg)) => {
                tracing::warn!(
                    order = %request.merchant_order_id,
                    "Gateway unreachable, falling back to demo intent: {msg}"
                );
                self.demo.create_intent(request).await
            }
            Err(e) => Err(e),
        }
    }

    /// Poll the gateway once for `reference`.
    ///
    /// An intent past its expiry never reaches the gateway; the answer is
    /// [`GatewayStatus::Expired`] locally, so an abandoned kiosk session
    /// cannot settle hours later.
    pub async fn poll_status(&self, intent: &PaymentIntent) -> AppResult<GatewayStatus> {
        if Self::is_past(&intent.expires_at) {
            self.poll_attempts.remove(&intent.reference);
            return Ok(GatewayStatus::Expired);
        }

        let attempt = {
            let mut counter = self.poll_attempts.entry(intent.reference.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let status = self.dispatch(intent.mode).check_status(&intent.reference).await?;
        tracing::debug!(reference = %intent.reference, attempt, ?status, "Payment status polled");

        if status != GatewayStatus::Pending && status != GatewayStatus::Unknown {
            self.poll_attempts.remove(&intent.reference);
        }
        Ok(status)
    }

    fn is_past(expires_at: &str) -> bool {
        DateTime::parse_from_rfc3339(expires_at)
            .map(|t| t.with_timezone(&Utc) < Utc::now())
            .unwrap_or(false)
    }

    /// Settle a paid booking. Idempotent per booking id: a repeat call
    /// returns the existing receipt without reserving a second unit.
    pub async fn settle(
        &self,
        mut booking: Booking,
        intent: &PaymentIntent,
    ) -> AppResult<SettlementReceipt> {
        if self.settled.contains_key(&booking.id) {
            tracing::info!(booking_id = %booking.id, "Settlement replay, returning existing receipt");
            let existing = self
                .cache
                .get(&booking.id)?
                .ok_or_else(|| AppError::internal("Settled booking missing from cache"))?;
            return Ok(SettlementReceipt {
                booking: existing,
                persisted: true,
            });
        }

        // A booking already paid in the backend was settled by someone
        // else; believe the store.
        if let Ok(Some(record)) = self.backend.get(Collection::Transactions, &booking.id).await {
            let stored: Booking = decode(record)?;
            if stored.payment_status == PaymentStatus::Paid {
                self.settled.insert(booking.id.clone(), ());
                self.cache.put_reconciled(&stored)?;
                return Ok(SettlementReceipt {
                    booking: stored,
                    persisted: true,
                });
            }
        }

        // 1. Reserve. The only step allowed to block the settlement.
        self.ledger.reserve(&booking.locker_id, &booking.id).await?;

        // 2. Controller online for the incoming customer.
        self.devices
            .set_status_best_effort(&booking.locker_id, DeviceStatus::Online)
            .await;

        // 3. Acknowledge the funds at the gateway.
        if let Err(e) = self.dispatch(intent.mode).complete(&intent.reference).await {
            tracing::warn!(reference = %intent.reference, "Gateway completion failed: {e}");
        }

        // The code only exists once payment is settled.
        let access_code = shared::util::generate_access_code();
        booking.payment_status = PaymentStatus::Paid;
        booking.gateway_reference = Some(intent.reference.clone());
        booking.access_code = Some(access_code.clone());

        // 4. Durable writes.
        let persisted = self.persist(&booking, intent).await;
        if persisted {
            self.cache.put_reconciled(&booking)?;
        } else {
            self.cache.put_pending(&booking)?;
        }
        self.settled.insert(booking.id.clone(), ());

        // 5. Tell the customer.
        if let Some(notify) = &self.notify {
            notify.send_rental_confirmation(&booking, &access_code).await;
        }

        tracing::info!(
            booking_id = %booking.id,
            locker_id = %booking.locker_id,
            persisted,
            "Booking settled"
        );
        Ok(SettlementReceipt { booking, persisted })
    }

    /// Push booking, payment and guest user to the backend. Returns whether
    /// the booking itself landed; the satellite records are best effort.
    async fn persist(&self, booking: &Booking, intent: &PaymentIntent) -> bool {
        let record = match encode(booking) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(booking_id = %booking.id, "Unencodable booking: {e}");
                return false;
            }
        };
        match self.backend.create(Collection::Transactions, record.clone()).await {
            Ok(stored) => {
                self.feed.publish(ChangeEvent::upsert(
                    Collection::Transactions,
                    &booking.id,
                    stored,
                ));
            }
            Err(e) => {
                tracing::error!(
                    booking_id = %booking.id,
                    "Booking write failed, holding locally for reconciliation: {e}"
                );
                return false;
            }
        }

        let payment = Payment {
            id: shared::util::prefixed_id("payment"),
            booking_id: booking.id.clone(),
            amount: booking.total_price,
            gateway_reference: intent.reference.clone(),
            status: PaymentRecordStatus::Success,
            payment_method: booking.payment_method.clone(),
            transaction_time: shared::util::now_rfc3339(),
            created_at: shared::util::now_rfc3339(),
        };
        match self.backend.create(Collection::Payments, json!(payment)).await {
            Ok(stored) => {
                self.feed
                    .publish(ChangeEvent::upsert(Collection::Payments, &payment.id, stored));
            }
            Err(e) => tracing::warn!(booking_id = %booking.id, "Payment record write failed: {e}"),
        }

        self.upsert_guest(booking).await;
        true
    }

    /// Guest users reach the backend only after their first paid booking.
    async fn upsert_guest(&self, booking: &Booking) {
        let user = User {
            id: booking.user_id.clone(),
            name: booking.customer_name.clone(),
            email: booking.customer_email.clone(),
            phone: booking.customer_phone.clone(),
            role: "guest".into(),
            is_guest: true,
            created_at: shared::util::now_rfc3339(),
            updated_at: shared::util::now_rfc3339(),
        };
        let result = match self.backend.get(Collection::Users, &user.id).await {
            Ok(Some(_)) => {
                self.backend
                    .update(
                        Collection::Users,
                        &user.id,
                        json!({
                            "name": user.name,
                            "email": user.email,
                            "phone": user.phone,
                            "updated_at": user.updated_at,
                        }),
                    )
                    .await
            }
            Ok(None) => self.backend.create(Collection::Users, json!(user)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(stored) => {
                self.feed
                    .publish(ChangeEvent::upsert(Collection::Users, &user.id, stored));
            }
            Err(e) => tracing::warn!(user_id = %user.id, "Guest upsert failed: {e}"),
        }
    }

    /// Re-push settled bookings the backend missed. Returns the booking ids
    /// repaired this pass.
    pub async fn reconcile_cache(&self) -> AppResult<Vec<String>> {
        let mut repaired = Vec::new();
        for booking in self.cache.unreconciled()? {
            let record = encode(&booking)?;
            match self.backend.create(Collection::Transactions, record).await {
                Ok(stored) => {
                    self.cache.put_reconciled(&booking)?;
                    self.feed.publish(ChangeEvent::upsert(
                        Collection::Transactions,
                        &booking.id,
                        stored,
                    ));
                    tracing::info!(booking_id = %booking.id, "Reconciled cached booking");
                    repaired.push(booking.id);
                }
                Err(e) => {
                    tracing::warn!(booking_id = %booking.id, "Reconcile attempt failed: {e}");
                }
            }
        }
        Ok(repaired)
    }

    /// Build the gateway request for a pending booking.
    pub fn intent_request(booking: &Booking, expiry_minutes: i64) -> IntentRequest {
        IntentRequest {
            merchant_order_id: booking.merchant_order_id.clone(),
            amount: booking.total_price,
            payment_method: booking.payment_method.clone(),
            customer_name: booking.customer_name.clone(),
            customer_email: booking.customer_email.clone(),
            customer_phone: booking.customer_phone.clone(),
            expiry_minutes,
        }
    }
}
