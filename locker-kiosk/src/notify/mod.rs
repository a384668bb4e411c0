//! Customer notifications (WhatsApp HTTP relay).
//!
//! Best effort end to end: a settled booking must never fail because the
//! relay is down, so every failure is logged and swallowed. Disabled
//! entirely when no relay URL is configured.

use reqwest::Client;
use serde_json::json;
use shared::models::Booking;
use std::time::Duration;

pub struct NotificationService {
    client: Client,
    api_url: String,
    api_key: String,
}

impl NotificationService {
    /// Returns `None` when no relay is configured.
    pub fn from_config(config: &crate::Config) -> Option<Self> {
        if !config.notifications_enabled() {
            tracing::info!("Notification relay not configured, notifications disabled");
            return None;
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            client,
            api_url: config.notify_api_url.clone(),
            api_key: config.notify_api_key.clone(),
        })
    }

    /// Normalize an Indonesian phone number to international `62…` form.
    ///
    /// Accepts `08…`, `8…`, `62…` and `+62…` inputs; anything else is
    /// returned digits-only unchanged.
    pub fn normalize_phone(raw: &str) -> String {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if let Some(rest) = digits.strip_prefix('0') {
            format!("62{rest}")
        } else if digits.starts_with("62") {
            digits
        } else if digits.starts_with('8') {
            format!("62{digits}")
        } else {
            digits
        }
    }

    fn rental_message(booking: &Booking, access_code: &str) -> String {
        format!(
            "Hi {name}, your locker rental is confirmed!\n\n\
             Locker: {locker} ({size})\n\
             Duration: {hours} hours\n\
             Access code: *{code}*\n\
             Valid until: {expires}\n\n\
             Enter the code at the kiosk to open your locker. Keep it private.",
            name = booking.customer_name,
            locker = booking.locker_name,
            size = booking.locker_size,
            hours = booking.duration_hours,
            code = access_code,
            expires = booking.expires_at,
        )
    }

    /// Send the rental confirmation with the access code. Never fails the
    /// caller.
    pub async fn send_rental_confirmation(&self, booking: &Booking, access_code: &str) {
        let target = Self::normalize_phone(&booking.customer_phone);
        let body = json!({
            "target": target,
            "message": Self::rental_message(booking, access_code),
        });

        let result = self
            .client
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(booking_id = %booking.id, "Rental confirmation sent");
            }
            Ok(response) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    status = %response.status(),
                    "Notification relay rejected message"
                );
            }
            Err(e) => {
                tracing::warn!(booking_id = %booking.id, "Notification send failed: {e}");
            }
        }
    }
}
