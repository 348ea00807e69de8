use clap::Parser;
use dashboard_sync::adapters::{MemoryClaimsStore, RestRecordStore};
use dashboard_sync::config::ProbeArgs;
use dashboard_sync::domain::model::Claim;
use dashboard_sync::utils::error::ErrorSeverity;
use dashboard_sync::utils::{logger, validation::Validate};
use dashboard_sync::{DashboardAssembler, DashboardState, SyncConfig};
use serde_json::Value;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ProbeArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting dashboard probe for owner {}", args.owner);

    // 載入 TOML 配置
    let config = match &args.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            match SyncConfig::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("❌ Failed to load config file '{}': {}", path, e);
                    eprintln!("💡 Make sure the file exists and is valid TOML format");
                    std::process::exit(1);
                }
            }
        }
        None => SyncConfig::default(),
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    // 以命令列指定的 claim 建立 session
    let claims = match Claim::from(args.claim) {
        Claim::Has => {
            MemoryClaimsStore::new().with_claim(&config.reconcile.claim_key, Value::Bool(true))
        }
        Claim::HasNot => {
            MemoryClaimsStore::new().with_claim(&config.reconcile.claim_key, Value::Bool(false))
        }
        Claim::Unknown => MemoryClaimsStore::new(),
    };
    let claims = Arc::new(claims);
    let records = Arc::new(RestRecordStore::from_config(&config.store));

    let assembler = match DashboardAssembler::new(records, claims.clone(), &config) {
        Ok(assembler) => assembler,
        Err(e) => {
            tracing::error!(
                "❌ Could not build assembler: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            let exit_code = if e.severity() == ErrorSeverity::Critical { 3 } else { 1 };
            std::process::exit(exit_code);
        }
    };

    let state = assembler.assemble(&args.owner).await;
    match &state {
        DashboardState::Ready(view) if !view.degraded_fields.is_empty() => {
            tracing::warn!("⚠️ Dashboard degraded: {}", view.degraded_fields.join(", "))
        }
        DashboardState::Ready(_) => tracing::info!("✅ Dashboard assembled"),
        other => tracing::info!("📋 Dashboard state: {:?}", other),
    }
    if let Some(claim) = claims.claim(&config.reconcile.claim_key) {
        tracing::info!("🔖 Session claim after run: {}", claim);
    }

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
