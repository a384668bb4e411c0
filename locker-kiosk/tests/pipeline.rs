//! End-to-end pipeline tests over in-memory stores and the demo gateway.

use async_trait::async_trait;
use locker_kiosk::booking::{PaymentOutcome, RentalRequest};
use locker_kiosk::core::{AppState, Config};
use locker_kiosk::payment::{
    GatewayStatus, IntentRequest, PaymentGateway, PaymentIntent,
};
use locker_kiosk::store::{BackendStore, Collection, MemoryBackend, MemoryMirror, MirrorStore};
use locker_kiosk::{AppError, AppResult};
use rust_decimal::Decimal;
use shared::models::{
    Booking, BoxCategory, Device, DeviceStatus, Locker, LockerStatus, Package, PaymentStatus,
};
use std::sync::Arc;

/// Gateway double that is never reachable, forcing the demo fallback.
struct UnreachableGateway;

#[async_trait]
impl PaymentGateway for UnreachableGateway {
    async fn create_intent(&self, _request: &IntentRequest) -> AppResult<PaymentIntent> {
        Err(AppError::gateway("connection refused"))
    }

    async fn check_status(&self, _reference: &str) -> AppResult<GatewayStatus> {
        Err(AppError::gateway("connection refused"))
    }

    async fn complete(&self, _reference: &str) -> AppResult<()> {
        Err(AppError::gateway("connection refused"))
    }
}

struct TestHarness {
    backend: Arc<MemoryBackend>,
    mirror: Arc<MemoryMirror>,
    state: AppState,
    _work_dir: tempfile::TempDir,
}

fn harness() -> TestHarness {
    let backend = Arc::new(MemoryBackend::new());
    let mirror = Arc::new(MemoryMirror::new());
    let work_dir = tempfile::tempdir().unwrap();
    let config = Config::with_work_dir(work_dir.path().to_string_lossy().to_string());
    let state = AppState::with_stores(
        config,
        backend.clone(),
        mirror.clone(),
        Arc::new(UnreachableGateway),
    )
    .unwrap();
    TestHarness {
        backend,
        mirror,
        state,
        _work_dir: work_dir,
    }
}

fn seed_locker(backend: &MemoryBackend, id: &str, available: u32, total: u32) {
    let locker = Locker {
        id: id.into(),
        locker_code: format!("L-{id}"),
        name: "Small cabinet".into(),
        box_category_id: "cat_small".into(),
        total,
        available,
        status: if available == 0 {
            LockerStatus::Occupied
        } else {
            LockerStatus::Available
        },
        base_price: Decimal::from(1_000),
        device_id: None,
        location: "Lobby".into(),
        created_at: shared::util::now_rfc3339(),
        updated_at: shared::util::now_rfc3339(),
    };
    backend.seed(Collection::Lockers, &locker).unwrap();
}

fn seed_device(backend: &MemoryBackend, locker_id: &str) {
    let device = Device {
        id: format!("device_{locker_id}"),
        name: "Cabinet controller".into(),
        device_identifier: "ESP32-AA01".into(),
        locker_id: locker_id.into(),
        status: DeviceStatus::Offline,
        last_online: shared::util::now_rfc3339(),
        ip_address: "10.0.0.21".into(),
        port: 8266,
        location: "Lobby".into(),
    };
    backend.seed(Collection::Devices, &device).unwrap();
}

fn rental_request(locker_id: &str) -> RentalRequest {
    RentalRequest {
        customer_name: "Ana Wijaya".into(),
        customer_phone: "081234567890".into(),
        customer_email: "ana@example.com".into(),
        locker_id: locker_id.into(),
        duration_hours: 24,
        payment_method: "QRIS".into(),
    }
}

async fn locker_available(backend: &MemoryBackend, id: &str) -> u32 {
    let record = backend.get(Collection::Lockers, id).await.unwrap().unwrap();
    record.get("available").and_then(serde_json::Value::as_u64).unwrap() as u32
}

#[tokio::test]
async fn test_full_rental_happy_path() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 2, 2);
    seed_device(&h.backend, "locker_1");

    // Live gateway is down, so the intent falls back to the demo gateway.
    let rental = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();
    assert_eq!(rental.booking.payment_status, PaymentStatus::Pending);
    assert!(rental.booking.access_code.is_none());
    // Nothing reserved while the payment is open.
    assert_eq!(locker_available(&h.backend, "locker_1").await, 2);

    // Unpaid intent stays pending.
    let outcome = h.state.orchestrator.verify_once(&rental).await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::StillPending));

    // Staff confirm the cash payment; settlement runs.
    h.state
        .coordinator
        .demo_gateway()
        .confirm(&rental.intent.reference)
        .unwrap();
    let outcome = h.state.orchestrator.verify_once(&rental).await.unwrap();
    let receipt = match outcome {
        PaymentOutcome::Settled(receipt) => receipt,
        other => panic!("expected settlement, got {other:?}"),
    };

    assert!(receipt.persisted);
    assert_eq!(receipt.booking.payment_status, PaymentStatus::Paid);
    let code = receipt.booking.access_code.clone().expect("code on paid booking");
    assert_eq!(code.len(), 6);
    assert!(receipt.booking.invariant_holds());

    // One unit taken, controller brought online.
    assert_eq!(locker_available(&h.backend, "locker_1").await, 1);
    let device = h
        .backend
        .get(Collection::Devices, "device_locker_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        device.get("status").and_then(serde_json::Value::as_str),
        Some("online")
    );

    // Payment record landed, exactly one.
    let payments = h.backend.list(Collection::Payments).await.unwrap();
    assert_eq!(payments.len(), 1);

    // Redeem: unit released, booking terminal.
    let redeemed = h.state.orchestrator.redeem(&code).await.unwrap();
    assert!(redeemed.checked_out);
    assert_eq!(locker_available(&h.backend, "locker_1").await, 2);

    // A second redeem of the same code is rejected distinctly.
    let err = h.state.orchestrator.redeem(&code).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyRedeemed));
}

#[tokio::test]
async fn test_settlement_is_idempotent() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 2, 2);

    let rental = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();
    h.state
        .coordinator
        .demo_gateway()
        .confirm(&rental.intent.reference)
        .unwrap();

    let first = h
        .state
        .coordinator
        .settle(rental.booking.clone(), &rental.intent)
        .await
        .unwrap();
    let second = h
        .state
        .coordinator
        .settle(rental.booking.clone(), &rental.intent)
        .await
        .unwrap();

    // Replay returns the same booking and takes no second unit.
    assert_eq!(first.booking.id, second.booking.id);
    assert_eq!(first.booking.access_code, second.booking.access_code);
    assert_eq!(locker_available(&h.backend, "locker_1").await, 1);
}

#[tokio::test]
async fn test_last_unit_race_has_one_winner() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 1, 1);

    let first = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();
    let second = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();

    h.state
        .coordinator
        .demo_gateway()
        .confirm(&first.intent.reference)
        .unwrap();
    h.state
        .coordinator
        .demo_gateway()
        .confirm(&second.intent.reference)
        .unwrap();

    let winner = h.state.orchestrator.verify_once(&first).await;
    assert!(matches!(
        winner.unwrap(),
        PaymentOutcome::Settled(_)
    ));

    // The loser's settlement is rejected at the store, not by a local guess.
    let loser = h.state.orchestrator.verify_once(&second).await.unwrap_err();
    assert!(matches!(loser, AppError::Unavailable(_)));
    assert_eq!(locker_available(&h.backend, "locker_1").await, 0);
}

#[tokio::test]
async fn test_mirror_failure_never_fails_the_sale() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 1, 1);
    h.mirror.set_failing(true);

    let rental = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();
    h.state
        .coordinator
        .demo_gateway()
        .confirm(&rental.intent.reference)
        .unwrap();

    let outcome = h.state.orchestrator.verify_once(&rental).await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::Settled(_)));

    // Mirror recovers; full resync converges it.
    h.mirror.set_failing(false);
    h.state.bridge.full_resync().await.unwrap();
    let mirrored = h
        .mirror
        .get_collection(Collection::Transactions)
        .await
        .unwrap();
    assert_eq!(mirrored.len(), 1);
}

#[tokio::test]
async fn test_abandoned_rental_needs_no_rollback() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 1, 1);

    let rental = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();
    h.state.orchestrator.abandon(&rental.booking.id).await.unwrap();

    assert_eq!(locker_available(&h.backend, "locker_1").await, 1);
    let cached = h.state.cache.get(&rental.booking.id).unwrap().unwrap();
    assert_eq!(cached.payment_status, PaymentStatus::Failed);

    // The locker is immediately rentable by the next customer.
    let next = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_unknown_code_is_record_not_found() {
    let h = harness();
    let err = h.state.orchestrator.redeem("ZZZZZZ").await.unwrap_err();
    assert!(matches!(err, AppError::RecordNotFound(_)));
}

#[tokio::test]
async fn test_redeem_rejects_expired_booking() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 1, 1);
    let booking = Booking {
        id: "booking_old".into(),
        user_id: "guest_old".into(),
        customer_name: "Budi".into(),
        customer_phone: "081234567891".into(),
        customer_email: "budi@example.com".into(),
        locker_id: "locker_1".into(),
        locker_name: "Small cabinet".into(),
        locker_size: "L-locker_1".into(),
        duration_hours: 24,
        total_price: Decimal::from(24_000),
        payment_method: "QRIS".into(),
        payment_status: PaymentStatus::Paid,
        merchant_order_id: "order_old".into(),
        gateway_reference: Some("REF-OLD".into()),
        access_code: Some("OLD234".into()),
        checked_out: false,
        checked_out_at: None,
        created_at: "2026-01-01T10:00:00Z".into(),
        expires_at: "2026-01-02T10:00:00Z".into(),
    };
    h.backend.seed(Collection::Transactions, &booking).unwrap();

    let err = h.state.orchestrator.redeem("OLD234").await.unwrap_err();
    assert!(matches!(err, AppError::Expired));
    // The unit was not released for an expired code.
    assert_eq!(locker_available(&h.backend, "locker_1").await, 1);
}

#[tokio::test]
async fn test_reconcile_repairs_backend_outage() {
    let h = harness();

    // A paid booking held only locally, as left behind by a settlement
    // whose backend write failed.
    let booking = Booking {
        id: "booking_local".into(),
        user_id: "guest_local".into(),
        customer_name: "Citra".into(),
        customer_phone: "081234567892".into(),
        customer_email: "citra@example.com".into(),
        locker_id: "locker_1".into(),
        locker_name: "Small cabinet".into(),
        locker_size: "L-locker_1".into(),
        duration_hours: 24,
        total_price: Decimal::from(24_000),
        payment_method: "QRIS".into(),
        payment_status: PaymentStatus::Paid,
        merchant_order_id: "order_local".into(),
        gateway_reference: Some("DEMO-order_local".into()),
        access_code: Some("LOC234".into()),
        checked_out: false,
        checked_out_at: None,
        created_at: shared::util::now_rfc3339(),
        expires_at: shared::util::now_rfc3339(),
    };
    h.state.cache.put_pending(&booking).unwrap();
    assert_eq!(h.state.cache.unreconciled().unwrap().len(), 1);

    let repaired = h.state.coordinator.reconcile_cache().await.unwrap();
    assert_eq!(repaired, vec!["booking_local".to_string()]);
    assert!(h.state.cache.unreconciled().unwrap().is_empty());

    let stored = h.backend.list(Collection::Transactions).await.unwrap();
    assert_eq!(stored.len(), 1);

    // While the backend is unreachable the cached copy still answers.
    h.backend.set_offline(true);
    h.mirror.set_failing(true);
    let found = h
        .state
        .reader
        .find_by_access_code("LOC234")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "booking_local");
}

#[tokio::test]
async fn test_pricing_preset_beats_hourly_rate() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 1, 1);
    h.backend
        .seed(
            Collection::BoxCategories,
            &BoxCategory {
                id: "cat_small".into(),
                name: "Small".into(),
                category_type: "standard".into(),
                width: 30,
                height: 40,
            },
        )
        .unwrap();
    h.backend
        .seed(
            Collection::Packages,
            &Package {
                id: "pkg_daily".into(),
                name: "Daily".into(),
                description: "24h flat rate".into(),
                package_type: "daily".into(),
                box_category_id: "cat_small".into(),
                base_price: Decimal::from(15_000),
                duration_hours: 24,
            },
        )
        .unwrap();

    let rental = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();
    assert_eq!(rental.booking.total_price, Decimal::from(15_000));
    assert_eq!(rental.booking.locker_size, "30x40 cm");
}

#[tokio::test]
async fn test_hourly_rate_applies_without_preset() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 1, 1);

    let rental = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap();
    // 24 hours at the seeded hourly rate of 1000.
    assert_eq!(rental.booking.total_price, Decimal::from(24_000));
    // No category record: the locker code stands in for the size.
    assert_eq!(rental.booking.locker_size, "L-locker_1");
}

#[tokio::test]
async fn test_begin_rental_rejects_full_locker() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 0, 1);

    let err = h
        .state
        .orchestrator
        .begin_rental(&rental_request("locker_1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unavailable(_)));
}

#[tokio::test]
async fn test_begin_rental_rejects_invalid_form() {
    let h = harness();
    seed_locker(&h.backend, "locker_1", 1, 1);

    let mut request = rental_request("locker_1");
    request.customer_email = "nope".into();
    let err = h.state.orchestrator.begin_rental(&request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
