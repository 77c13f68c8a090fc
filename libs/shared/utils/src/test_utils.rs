use std::sync::Arc;
use std::sync::Once;

use chrono::Utc;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring RUST_LOG. Safe to call from every test.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
            ))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub max_services_per_booking: usize,
    pub resolver_timeout_seconds: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            max_services_per_booking: 3,
            resolver_timeout_seconds: 5,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            max_services_per_booking: self.max_services_per_booking,
            request_timeout_seconds: 5,
            resolver_timeout_seconds: self.resolver_timeout_seconds,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub profile_id: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
            profile_id: Some(Uuid::new_v4().to_string()),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            profile_id: None,
        }
    }

    pub fn patient(email: &str) -> Self {
        Self {
            profile_id: Some(Uuid::new_v4().to_string()),
            ..Self::new(email, "patient")
        }
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "staff")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            profile_id: self.profile_id.clone(),
            access_token: Some(format!("test-token-{}", self.id)),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

/// Canned RPC envelopes in the shape the booking functions return.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor(doctor_id: &str, name: &str, specialization: &str) -> Value {
        json!({
            "id": doctor_id,
            "name": name,
            "specialization": specialization,
            "fee": 500.0,
            "rating": 4.6,
            "availability": "Mon-Fri 09:00-17:00"
        })
    }

    pub fn service(service_id: &str, name: &str, duration_minutes: i32, min: f64, max: f64) -> Value {
        json!({
            "id": service_id,
            "name": name,
            "duration_minutes": duration_minutes,
            "price_range": { "min": min, "max": max }
        })
    }

    pub fn list_response(items: Vec<Value>) -> Value {
        json!({ "success": true, "data": items })
    }

    pub fn time_slots_response(doctor_id: &str, date: &str, slots: &[(&str, bool)]) -> Value {
        let slots: Vec<Value> = slots
            .iter()
            .map(|(time, available)| json!({ "time": time, "available": available }))
            .collect();

        json!({
            "success": true,
            "data": {
                "date": date,
                "doctor_id": doctor_id,
                "total_duration_minutes": 30,
                "slots": slots
            }
        })
    }

    pub fn limit_allowed() -> Value {
        json!({
            "success": true,
            "data": { "allowed": true, "reason": null, "conflicting_appointment": null }
        })
    }

    pub fn limit_daily_exceeded(appointment_id: &str, clinic_name: &str, date: &str) -> Value {
        json!({
            "success": true,
            "data": {
                "allowed": false,
                "reason": "daily_limit_exceeded",
                "conflicting_appointment": Self::appointment_ref(appointment_id, clinic_name, date, "10:00")
            }
        })
    }

    pub fn appointment_ref(appointment_id: &str, clinic_name: &str, date: &str, time: &str) -> Value {
        json!({
            "id": appointment_id,
            "clinic_name": clinic_name,
            "date": date,
            "time": time,
            "status": "confirmed"
        })
    }

    pub fn booking_success(appointment_id: &str, clinic_id: &str, doctor_id: &str) -> Value {
        json!({
            "success": true,
            "data": {
                "appointment_id": appointment_id,
                "status": "pending",
                "patient_info": { "name": "Test Patient" },
                "clinic": { "id": clinic_id, "name": "Test Clinic" },
                "doctor": { "id": doctor_id, "name": "Dr. Test" },
                "services": [],
                "pricing_estimate": { "min_total": 500.0, "max_total": 1200.0, "currency": "PHP" },
                "cancellation_policy": { "hours_before": 24, "description": "Cancel at least 24 hours ahead" },
                "reliability": { "score": 0.92, "risk_level": "low" },
                "cross_clinic_context": null
            }
        })
    }

    pub fn booking_rejected(reason: &str, message: &str, conflicting: Option<Value>) -> Value {
        json!({
            "success": false,
            "reason": reason,
            "error": message,
            "conflicting_appointment": conflicting
        })
    }

    pub fn error_response(message: &str) -> Value {
        json!({ "success": false, "error": message })
    }
}
