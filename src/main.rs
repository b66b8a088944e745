//! netauto-core CLI: security scans, operations and alert triage

use netauto_core::app::AppContext;

#[tokio::main]
async fn main() {
    if let Err(e) = netauto_core::logging::init_logging() {
        eprintln!("[WARN] Failed to initialize structured logging: {:#}", e);
    }

    let context = AppContext::from_env();
    if let Err(e) = netauto_core::cli_adapter::run_with_ctrl_c(std::env::args(), &context).await {
        netauto_core::log_error!("{:#}", e);
        std::process::exit(1);
    }
}
