use std::sync::Arc;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::{CourierError, Result, SystemClock};
use courier_ledger::{HttpEnvelopeCipher, RpcLedgerClient, SessionKeyAuthority, Signer};
use courier_runtime::{PollOrchestrator, RuntimeDeps};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub(super) async fn cmd_start(config: CourierConfig, no_server: bool) -> Result<()> {
    // Startup failures are fatal: nothing below is retried.
    let warnings = config.validate().map_err(CourierError::Config)?;
    for w in &warnings {
        warn!("{w}");
    }
    config.validate_for_start()?;
    let signer = super::signer_from_config(&config)?;

    println!("📨 Courier v{}", env!("CARGO_PKG_VERSION"));
    println!("   Address: {}", signer.address());
    println!("   Package: {}", config.network.package_id);
    println!(
        "   Oracle: {:?} / {}",
        config.oracle.provider, config.oracle.model
    );
    println!(
        "   Polling: every {}s, {:?} delivery",
        config.polling.interval_secs, config.polling.delivery
    );
    println!();

    let timeout = Duration::from_secs(config.network.request_timeout_secs);
    let deps = RuntimeDeps {
        ledger: Arc::new(RpcLedgerClient::new(&config.network.rpc_url, timeout)?),
        cipher: Arc::new(HttpEnvelopeCipher::new(
            &config.network.messaging_url,
            timeout,
        )?),
        authority: Arc::new(SessionKeyAuthority::new()),
        signer,
        oracle: courier_llm::from_config(&config)?,
        clock: Arc::new(SystemClock),
    };
    let orchestrator = PollOrchestrator::from_config(&config, deps);
    let cancel = CancellationToken::new();

    let server = if !no_server && config.server.enabled {
        let server_config = config.server.clone();
        let status = orchestrator.status();
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = courier_server::start_server(server_config, status, cancel).await {
                error!(error = %e, "status server failed");
            }
        }))
    } else {
        None
    };

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, finishing the current cycle");
                cancel.cancel();
            }
        }
    });

    // Blocks until cancelled.
    let result = orchestrator.run(cancel.clone()).await;

    cancel.cancel();
    if let Some(server) = server {
        if let Err(e) = server.await {
            warn!(error = %e, "status server task did not shut down cleanly");
        }
    }
    result
}
