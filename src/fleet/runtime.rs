use super::{FleetManager, ShutdownHandle, ShutdownReason};
use crate::error::{FleetError, Result};
use tokio::signal;
use tracing::{error, info};

impl FleetManager {
    /// Run until SIGTERM/SIGINT, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        self.setup_signal_handlers(self.shutdown_handle());
        self.run_until_shutdown().await
    }

    /// Run until a shutdown is requested through a [`ShutdownHandle`]
    pub async fn run_until_shutdown(&mut self) -> Result<i32> {
        info!("Camera fleet is running with {} cameras", self.camera_count());

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| FleetError::system("Shutdown receiver already taken"))?;

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| FleetError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Camera fleet shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, handle: ShutdownHandle) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let handle = handle.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    handle
                        .trigger(ShutdownReason::Signal("SIGTERM".to_string()))
                        .await;
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                handle
                    .trigger(ShutdownReason::Signal("SIGINT".to_string()))
                    .await;
            }
        });
    }
}
