//! Environment-driven configuration shared by the binaries.

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    /// host:port of the Redis instance backing the queue and result store.
    pub redis_addr: String,
    /// Hostname under which executor containers reach the code endpoint.
    pub worker_host: String,
    /// Port of the loopback code endpoint.
    pub worker_port: u16,
    /// Bind address of the public dispatch API.
    pub api_addr: String,
    /// Metadata store connection string; absent means runs-only dispatch.
    pub database_url: Option<String>,
    /// Number of concurrent worker tasks.
    pub worker_count: usize,
    /// Docker network the executor containers attach to. It must be able
    /// to reach the worker's code endpoint and nothing else.
    pub sandbox_network: String,
    /// Host directory under which per-job test-data directories are
    /// created and bind-mounted into executor containers.
    pub shared_data_dir: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

impl Settings {
    pub fn from_env() -> Self {
        let worker_port = env_or("WORKER_PORT", "8081").parse().unwrap_or(8081);
        let worker_count = env_or("WORKER_COUNT", "5").parse().unwrap_or(5);

        Self {
            redis_addr: env_or("REDIS_ADDR", "localhost:6379"),
            worker_host: env_or("WORKER_HOST", "worker"),
            worker_port,
            api_addr: env_or("API_ADDR", "0.0.0.0:8080"),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            worker_count,
            sandbox_network: env_or("SANDBOX_NETWORK", "code-execution-service_default"),
            shared_data_dir: env_or("SHARED_DATA_DIR", "/tmp"),
        }
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}", self.redis_addr)
    }

    /// URL the executor container uses to fetch a stored source blob.
    pub fn code_url(&self, code_id: &str) -> String {
        format!(
            "http://{}:{}/code?id={}",
            self.worker_host, self.worker_port, code_id
        )
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_addr: "localhost:6379".to_string(),
            worker_host: "worker".to_string(),
            worker_port: 8081,
            api_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            worker_count: 5,
            sandbox_network: "code-execution-service_default".to_string(),
            shared_data_dir: "/tmp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_layout() {
        let settings = Settings::default();
        assert_eq!(settings.redis_url(), "redis://localhost:6379");
        assert_eq!(settings.worker_count, 5);
        assert_eq!(settings.worker_port, 8081);
    }

    #[test]
    fn code_url_targets_loopback_endpoint() {
        let settings = Settings::default();
        assert_eq!(
            settings.code_url("deadbeef"),
            "http://worker:8081/code?id=deadbeef"
        );
    }
}
