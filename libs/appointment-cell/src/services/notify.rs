use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::Appointment;

/// Outbound email delivery is an opaque edge function; callers only see a
/// success/failure boolean.
pub struct NotificationService {
    supabase: SupabaseClient,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn send_booking_confirmation(
        &self,
        appointment: &Appointment,
        recipient: &str,
        auth_token: &str,
    ) -> bool {
        let body = json!({
            "template": "appointment_confirmation",
            "to": recipient,
            "appointment_id": appointment.id,
            "scheduled_at": appointment.scheduled_at.to_rfc3339(),
        });

        match self
            .supabase
            .request::<Value>(
                Method::POST,
                "/functions/v1/send-email",
                Some(auth_token),
                Some(body),
            )
            .await
        {
            Ok(_) => {
                debug!("Confirmation email queued for {}", recipient);
                true
            }
            Err(e) => {
                debug!("Email delivery failed: {}", e);
                false
            }
        }
    }
}
