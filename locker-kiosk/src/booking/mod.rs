//! Booking orchestrator — the walk-up rental flow.
//!
//! ```text
//! begin_rental ── validate → availability hint → payment intent → cached pending booking
//! await_payment ─ poll gateway → settle on success (reserve happens there)
//! redeem ──────── code lookup → release unit → controller offline → checked out
//! ```
//!
//! Nothing is reserved while the customer decides whether to pay: the
//! locker unit is taken atomically inside settlement, so an abandoned
//! kiosk session needs no rollback at all.

use rust_decimal::Decimal;
use serde_json::json;
use shared::models::{
    Booking, BoxCategory, DeviceStatus, Locker, Package, PaymentStatus, locker_log,
};
use shared::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::ledger::ReservationLedger;
use crate::payment::{GatewayStatus, PaymentIntent, SettlementCoordinator, SettlementReceipt};
use crate::store::{BackendStore, Collection, FallbackReader, LocalCache, decode};
use crate::sync::{ChangeEvent, ChangeFeed};

/// How long a customer gets to finish paying at the kiosk.
const INTENT_EXPIRY_MINUTES: i64 = 15;

/// Walk-up rental form, as entered at the kiosk.
#[derive(Debug, Clone, Validate)]
pub struct RentalRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub customer_name: String,
    #[validate(length(min = 8, max = 20, message = "Phone number looks wrong"))]
    pub customer_phone: String,
    #[validate(email(message = "Invalid email address"))]
    pub customer_email: String,
    #[validate(length(min = 1, message = "Locker is required"))]
    pub locker_id: String,
    #[validate(range(min = 1, max = 720, message = "Duration must be 1-720 hours"))]
    pub duration_hours: u32,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
}

/// A rental mid-payment: the pending booking plus the live intent.
#[derive(Debug, Clone)]
pub struct ActiveRental {
    pub booking: Booking,
    pub intent: PaymentIntent,
}

/// Result of one payment verification step.
#[derive(Debug)]
pub enum PaymentOutcome {
    Settled(SettlementReceipt),
    StillPending,
    Failed,
    Expired,
}

impl PaymentOutcome {
    /// Collapse into a result: the receipt on settlement, a distinct
    /// verification error otherwise.
    pub fn into_receipt(self) -> AppResult<SettlementReceipt> {
        match self {
            PaymentOutcome::Settled(receipt) => Ok(receipt),
            PaymentOutcome::StillPending => Err(AppError::VerificationPending),
            PaymentOutcome::Failed => Err(AppError::VerificationFailed),
            PaymentOutcome::Expired => Err(AppError::VerificationExpired),
        }
    }
}

/// Gateway polling cadence for [`BookingOrchestrator::await_payment`].
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 60,
        }
    }
}

pub struct BookingOrchestrator {
    backend: Arc<dyn BackendStore>,
    cache: Arc<LocalCache>,
    reader: Arc<FallbackReader>,
    ledger: Arc<ReservationLedger>,
    coordinator: Arc<SettlementCoordinator>,
    devices: Arc<crate::device::DeviceNotifier>,
    feed: ChangeFeed,
}

impl BookingOrchestrator {
    pub fn new(
        backend: Arc<dyn BackendStore>,
        cache: Arc<LocalCache>,
        reader: Arc<FallbackReader>,
        ledger: Arc<ReservationLedger>,
        coordinator: Arc<SettlementCoordinator>,
        devices: Arc<crate::device::DeviceNotifier>,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            backend,
            cache,
            reader,
            ledger,
            coordinator,
            devices,
            feed,
        }
    }

    /// Start a rental: validate the form, check availability, open a
    /// payment intent and cache the pending booking.
    ///
    /// The availability check is advisory; the unit is only taken when the
    /// payment settles.
    pub async fn begin_rental(&self, request: &RentalRequest) -> AppResult<ActiveRental> {
        request
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        let locker = self.ledger.ensure_rentable(&request.locker_id).await?;

        let now = chrono::Utc::now();
        let expires_at = (now + chrono::Duration::hours(request.duration_hours as i64))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        let total_price = self.price_rental(&locker, request.duration_hours).await;
        let locker_size = self.size_label(&locker).await;

        let mut booking = Booking {
            id: shared::util::prefixed_id("booking"),
            user_id: shared::util::prefixed_id("guest"),
            customer_name: request.customer_name.clone(),
            customer_phone: request.customer_phone.clone(),
            customer_email: request.customer_email.clone(),
            locker_id: locker.id.clone(),
            locker_name: locker.name.clone(),
            locker_size,
            duration_hours: request.duration_hours,
            total_price,
            payment_method: request.payment_method.clone(),
            payment_status: PaymentStatus::Pending,
            merchant_order_id: shared::util::prefixed_id("order"),
            gateway_reference: None,
            access_code: None,
            checked_out: false,
            checked_out_at: None,
            created_at: now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            expires_at,
        };

        let intent_request =
            SettlementCoordinator::intent_request(&booking, INTENT_EXPIRY_MINUTES);
        let intent = self.coordinator.create_intent(&intent_request).await?;
        booking.gateway_reference = Some(intent.reference.clone());

        // Write-ahead: the pending booking exists locally before any store
        // sees it.
        self.cache.put_pending(&booking)?;

        tracing::info!(
            booking_id = %booking.id,
            locker = %locker.locker_code,
            mode = ?intent.mode,
            "Rental started, awaiting payment"
        );
        Ok(ActiveRental { booking, intent })
    }

    /// Price a rental: a pricing preset matching the locker's size class
    /// and duration wins, otherwise the locker's hourly base rate applies.
    async fn price_rental(&self, locker: &Locker, duration_hours: u32) -> Decimal {
        if let Ok(records) = self.backend.list(Collection::Packages).await {
            for record in records {
                match decode::<Package>(record) {
                    Ok(package)
                        if package.box_category_id == locker.box_category_id
                            && package.duration_hours == duration_hours =>
                    {
                        return package.base_price;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping malformed package record: {e}"),
                }
            }
        }
        locker.base_price * Decimal::from(duration_hours)
    }

    /// Human-readable size of the locker's box class. Falls back to the
    /// locker code when the category is missing.
    async fn size_label(&self, locker: &Locker) -> String {
        match self
            .backend
            .get(Collection::BoxCategories, &locker.box_category_id)
            .await
        {
            Ok(Some(record)) => match decode::<BoxCategory>(record) {
                Ok(category) => format!("{}x{} cm", category.width, category.height),
                Err(_) => locker.locker_code.clone(),
            },
            _ => locker.locker_code.clone(),
        }
    }

    /// Check the payment once and settle if it succeeded.
    pub async fn verify_once(&self, rental: &ActiveRental) -> AppResult<PaymentOutcome> {
        let status = self.coordinator.poll_status(&rental.intent).await?;
        match status {
            GatewayStatus::Success => {
                let receipt = self
                    .coordinator
                    .settle(rental.booking.clone(), &rental.intent)
                    .await?;
                Ok(PaymentOutcome::Settled(receipt))
            }
            GatewayStatus::Pending | GatewayStatus::Unknown => Ok(PaymentOutcome::StillPending),
            GatewayStatus::Failed => {
                self.cache
                    .update_status(&rental.booking.id, PaymentStatus::Failed, None)?;
                Ok(PaymentOutcome::Failed)
            }
            GatewayStatus::Expired => {
                self.cache
                    .update_status(&rental.booking.id, PaymentStatus::Expired, None)?;
                Ok(PaymentOutcome::Expired)
            }
        }
    }

    /// Poll until the payment reaches a terminal state or attempts run out.
    /// Running out of attempts leaves the booking pending and reports
    /// [`PaymentOutcome::StillPending`].
    pub async fn await_payment(
        &self,
        rental: &ActiveRental,
        policy: PollPolicy,
    ) -> AppResult<PaymentOutcome> {
        for attempt in 1..=policy.max_attempts {
            match self.verify_once(rental).await? {
                PaymentOutcome::StillPending => {
                    tracing::debug!(
                        booking_id = %rental.booking.id,
                        attempt,
                        "Payment still pending"
                    );
                    if attempt < policy.max_attempts {
                        tokio::time::sleep(policy.interval).await;
                    }
                }
                outcome => return Ok(outcome),
            }
        }
        Ok(PaymentOutcome::StillPending)
    }

    /// Redeem an access code at the cabinet.
    ///
    /// Rejections are distinct and checked in order: unknown code, unpaid
    /// booking, already redeemed, past expiry. Success releases the unit,
    /// takes the controller offline and marks the booking checked out.
    pub async fn redeem(&self, access_code: &str) -> AppResult<Booking> {
        let mut booking = self.reader.require_by_access_code(access_code).await?;

        if booking.payment_status != PaymentStatus::Paid {
            return Err(AppError::VerificationPending);
        }
        if booking.checked_out {
            return Err(AppError::AlreadyRedeemed);
        }
        if booking.is_expired_at(&shared::util::now_rfc3339()) {
            return Err(AppError::Expired);
        }

        self.ledger
            .release(
                &booking.locker_id,
                &booking.id,
                locker_log::actions::ITEM_RETRIEVED,
            )
            .await?;
        self.devices
            .set_status_best_effort(&booking.locker_id, DeviceStatus::Offline)
            .await;

        booking.checked_out = true;
        booking.checked_out_at = Some(shared::util::now_rfc3339());

        let patch = json!({
            "checked_out": true,
            "checked_out_at": booking.checked_out_at,
        });
        match self
            .backend
            .update(Collection::Transactions, &booking.id, patch)
            .await
        {
            Ok(stored) => {
                self.feed.publish(ChangeEvent::upsert(
                    Collection::Transactions,
                    &booking.id,
                    stored,
                ));
            }
            Err(e) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    "Checked-out flag not persisted, cache carries it: {e}"
                );
            }
        }
        self.cache.mark_checked_out(&booking.id)?;

        tracing::info!(booking_id = %booking.id, "Booking redeemed");
        Ok(booking)
    }

    /// Customer walked away before paying. Nothing was reserved, so this
    /// only retires the cached pending booking.
    pub async fn abandon(&self, booking_id: &str) -> AppResult<()> {
        if let Some(booking) = self.cache.get(booking_id)? {
            if booking.payment_status == PaymentStatus::Pending {
                self.cache
                    .update_status(booking_id, PaymentStatus::Failed, None)?;
                tracing::info!(booking_id, "Rental abandoned before payment");
            }
        }
        Ok(())
    }

    /// All bookings of one customer, newest first, through the fallback
    /// chain.
    pub async fn bookings_for_user(&self, user_id: &str) -> AppResult<Vec<Booking>> {
        self.reader.bookings_for_user(user_id).await
    }

    /// Expiry sweep: retire overdue pending bookings in the cache.
    pub fn sweep_expired(&self) -> AppResult<Vec<String>> {
        let expired = self.cache.expire_overdue(&shared::util::now_rfc3339())?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue pending bookings");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RentalRequest {
        RentalRequest {
            customer_name: "Ana".into(),
            customer_phone: "081234567890".into(),
            customer_email: "ana@example.com".into(),
            locker_id: "locker_1".into(),
            duration_hours: 24,
            payment_method: "QRIS".into(),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_email() {
        let mut req = request();
        req.customer_email = "not-an-email".into();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_duration() {
        let mut req = request();
        req.duration_hours = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_outcome_collapses_to_distinct_errors() {
        assert!(matches!(
            PaymentOutcome::StillPending.into_receipt().unwrap_err(),
            AppError::VerificationPending
        ));
        assert!(matches!(
            PaymentOutcome::Failed.into_receipt().unwrap_err(),
            AppError::VerificationFailed
        ));
        assert!(matches!(
            PaymentOutcome::Expired.into_receipt().unwrap_err(),
            AppError::VerificationExpired
        ));
    }

    #[test]
    fn test_rejects_short_phone() {
        let mut req = request();
        req.customer_phone = "0812".into();
        assert!(req.validate().is_err());
    }
}
