use crate::app::dashboard::DashboardSettings;
use crate::core::deadline::Deadline;
use crate::core::reconcile::{ReconcileSettings, ReconcileTarget};
use crate::core::retry::RetryPolicy;
use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{
    validate_identifier, validate_positive_number, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub store: StoreConfig,
    pub deadlines: DeadlineConfig,
    pub retry: RetryConfig,
    pub reconcile: ReconcileConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:54321/rest/v1".to_string(),
            api_key: None,
            timeout_seconds: Some(10),
        }
    }
}

/// All budgets in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlineConfig {
    pub dashboard_ms: u64,
    pub direct_load_ms: u64,
    pub retry_load_ms: u64,
    pub claim_read_ms: u64,
    pub claim_write_ms: u64,
    pub optional_stat_ms: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            dashboard_ms: 8_000,
            direct_load_ms: 5_000,
            retry_load_ms: 3_000,
            claim_read_ms: 1_000,
            claim_write_ms: 2_000,
            optional_stat_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub table: String,
    pub owner_column: String,
    pub id_column: String,
    pub claim_key: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            table: "shops".to_string(),
            owner_column: "owner_id".to_string(),
            id_column: "id".to_string(),
            claim_key: "has_shop".to_string(),
        }
    }
}

/// Tables behind the dashboard statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub listings_table: String,
    pub rentals_table: String,
    pub requests_table: String,
    pub reviews_table: String,
    pub shop_column: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            listings_table: "items".to_string(),
            rentals_table: "rentals".to_string(),
            requests_table: "rental_requests".to_string(),
            reviews_table: "reviews".to_string(),
            shop_column: "shop_id".to_string(),
        }
    }
}

impl SyncConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SyncError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SyncError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${STORE_API_KEY})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SyncError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn deadline(&self, label: &str, millis: u64) -> Result<Deadline> {
        Deadline::from_millis(label, millis)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }

    pub fn reconcile_target(&self) -> Result<ReconcileTarget> {
        ReconcileTarget::new(
            self.reconcile.table.clone(),
            self.reconcile.owner_column.clone(),
            self.reconcile.claim_key.clone(),
        )
    }

    pub fn reconcile_settings(&self) -> Result<ReconcileSettings> {
        Ok(ReconcileSettings {
            load_deadline: self.deadline("reconcile.direct_load", self.deadlines.direct_load_ms)?,
            retry_load_deadline: self
                .deadline("reconcile.retry_load", self.deadlines.retry_load_ms)?,
            claim_read_deadline: self
                .deadline("reconcile.claim_read", self.deadlines.claim_read_ms)?,
            claim_write_deadline: self
                .deadline("reconcile.claim_write", self.deadlines.claim_write_ms)?,
            policy: self.retry_policy()?,
        })
    }

    pub fn dashboard_settings(&self) -> Result<DashboardSettings> {
        Ok(DashboardSettings {
            deadline: self.deadline("dashboard.stats", self.deadlines.dashboard_ms)?,
            optional_deadline: self
                .deadline("dashboard.optional_stat", self.deadlines.optional_stat_ms)?,
            id_column: self.reconcile.id_column.clone(),
            tables: self.dashboard.clone(),
        })
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        // 驗證資料庫端點
        validate_url("store.endpoint", &self.store.endpoint)?;
        if let Some(timeout) = self.store.timeout_seconds {
            validate_positive_number("store.timeout_seconds", timeout, 1)?;
        }

        // 驗證期限與重試策略
        self.reconcile_settings()?;
        self.dashboard_settings()?;

        // 重試期限必須比外層期限短
        if self.deadlines.retry_load_ms >= self.deadlines.dashboard_ms {
            return Err(SyncError::InvalidConfigValueError {
                field: "deadlines.retry_load_ms".to_string(),
                value: self.deadlines.retry_load_ms.to_string(),
                reason: format!(
                    "Must be shorter than deadlines.dashboard_ms ({})",
                    self.deadlines.dashboard_ms
                ),
            });
        }

        // 驗證資料表與欄位名稱
        self.reconcile_target()?;
        validate_identifier("reconcile.id_column", &self.reconcile.id_column)?;
        validate_identifier("dashboard.listings_table", &self.dashboard.listings_table)?;
        validate_identifier("dashboard.rentals_table", &self.dashboard.rentals_table)?;
        validate_identifier("dashboard.requests_table", &self.dashboard.requests_table)?;
        validate_identifier("dashboard.reviews_table", &self.dashboard.reviews_table)?;
        validate_identifier("dashboard.shop_column", &self.dashboard.shop_column)?;

        Ok(())
    }
}

impl Validate for SyncConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
