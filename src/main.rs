use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tracing::info;
use tracing_subscriber::EnvFilter;

use slotchain::auth::Credentials;
use slotchain::config::Config;
use slotchain::gate::{AbuseGate, AllowAll, TurnstileGate};
use slotchain::notify::NotifyHub;
use slotchain::tenant::TenantManager;
use slotchain::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    slotchain::observability::init(config.metrics_port)?;

    let tls_acceptor =
        slotchain::tls::load_tls_acceptor(config.tls_cert.as_deref(), config.tls_key.as_deref())?;

    std::fs::create_dir_all(&config.data_dir)?;

    let gate: Arc<dyn AbuseGate> = match &config.turnstile_secret {
        Some(secret) => Arc::new(TurnstileGate::new(secret.clone())?),
        None => Arc::new(AllowAll),
    };

    let hub = Arc::new(NotifyHub::new());
    tokio::spawn(relay_mail(hub.subscribe()));

    let tenant_manager = Arc::new(TenantManager::new(
        config.data_dir.clone(),
        config.compact_threshold,
        gate,
        hub,
        config.booking.clone(),
    ));
    let credentials = Credentials {
        password: config.password.clone(),
        admin_user: config.admin_user.clone(),
        admin_password: config.admin_password.clone(),
    };
    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("slotchain listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {max_connections}");
    info!("  admin user: {}", config.admin_user);
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  verification: {}", if config.turnstile_secret.is_some() { "turnstile" } else { "disabled" });
    info!("  compensation attempts: {}", config.booking.compensation_attempts);

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(slotchain::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(slotchain::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(slotchain::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let tm = tenant_manager.clone();
                let creds = credentials.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, tm, creds, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(slotchain::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("slotchain stopped");
    Ok(())
}

/// Drain booking confirmations off the hub. Delivery is out of process; this
/// records what would be sent.
async fn relay_mail(mut rx: broadcast::Receiver<slotchain::notify::Message>) {
    loop {
        match rx.recv().await {
            Ok(message) => info!(
                to = %message.to,
                subject = %message.subject,
                attachment = message.attachment.as_ref().map(|a| a.filename.as_str()),
                "outgoing confirmation"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "mail relay fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
