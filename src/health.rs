use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::gemini::GeminiClient;
use crate::sync_state::SyncStateFile;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub services: HashMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceHealth {
    pub status: String,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

impl ServiceHealth {
    fn healthy(message: impl Into<String>, started: Instant) -> Self {
        Self {
            status: "healthy".to_string(),
            message: Some(message.into()),
            response_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    fn unhealthy(message: impl Into<String>, started: Instant) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
            response_time_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub struct HealthChecker {
    discord_connected: Arc<Mutex<bool>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            discord_connected: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn set_discord_connected(&self, connected: bool) {
        *self.discord_connected.lock().await = connected;
    }

    pub async fn check_discord(&self) -> ServiceHealth {
        let start = Instant::now();
        if *self.discord_connected.lock().await {
            ServiceHealth::healthy("Gateway session ready", start)
        } else {
            ServiceHealth::unhealthy("Gateway not connected yet", start)
        }
    }

    pub async fn check_gemini(&self, gemini: &GeminiClient) -> ServiceHealth {
        let start = Instant::now();
        match gemini.ping().await {
            Ok(()) => ServiceHealth::healthy("Gemini API accessible", start),
            Err(e) => ServiceHealth::unhealthy(format!("Gemini error: {}", e), start),
        }
    }

    pub async fn check_sync_state(&self, sync_state: &SyncStateFile) -> ServiceHealth {
        let start = Instant::now();
        match sync_state.load().await {
            Ok(state) => ServiceHealth::healthy(
                format!("{} documents recorded", state.documents.len()),
                start,
            ),
            Err(e) => ServiceHealth::unhealthy(e.to_string(), start),
        }
    }

    pub async fn get_overall_health(
        &self,
        gemini: &GeminiClient,
        sync_state: &SyncStateFile,
    ) -> HealthStatus {
        let mut services = HashMap::new();

        services.insert("discord".to_string(), self.check_discord().await);
        services.insert("gemini".to_string(), self.check_gemini(gemini).await);
        services.insert("sync_state".to_string(), self.check_sync_state(sync_state).await);

        summarize(services)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(services: HashMap<String, ServiceHealth>) -> HealthStatus {
    let all_healthy = services.values().all(ServiceHealth::is_healthy);
    let overall_status = if all_healthy { "healthy" } else { "degraded" };

    HealthStatus {
        status: overall_status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        services,
    }
}
