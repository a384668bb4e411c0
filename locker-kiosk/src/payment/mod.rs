//! Payment settlement
//!
//! ```text
//! SettlementCoordinator
//!   ├── create_intent: live gateway, demo fallback when unreachable
//!   ├── poll_status: expiry short-circuit, then gateway poll
//!   └── settle: reserve → controller online → complete → persist → notify
//! ```

mod coordinator;
mod gateway;

pub use coordinator::{SettlementCoordinator, SettlementReceipt};
pub use gateway::{
    DemoGateway, GatewayStatus, HttpGateway, IntentMode, IntentRequest, PaymentGateway,
    PaymentIntent,
};
