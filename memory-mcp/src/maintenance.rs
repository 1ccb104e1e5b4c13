//! Background maintenance loop: polls `MaintenanceScheduler` on a short
//! tick and runs whatever is due through `Engine::run_due_maintenance`.
//! `spec.md` §4.8 fixes the cadences (`MaintenanceScheduler` already
//! encodes them); this just needs to keep calling `due()`/`reschedule()`
//! often enough that a 30s resource-sample task actually fires near its
//! due time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use memory_core::lifecycle::{MaintenanceScheduler, MaintenanceTask};
use memory_core::Engine;

/// How often the background task wakes to check for due maintenance work.
/// Finer than the coarsest cadence (30s resource sampling) so that cadence
/// stays reasonably tight.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the maintenance loop. Runs until the returned handle is aborted
/// or dropped along with the runtime.
pub fn spawn(engine: Arc<Engine>) -> tokio::task::JoinHandle<()> {
    let scheduler = MaintenanceScheduler::new(Utc::now());
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let ran = engine.run_due_maintenance(&scheduler).await;
            if !ran.is_empty() {
                tracing::debug!(count = ran.len(), "ran due maintenance tasks");
            }
            if ran.contains(&MaintenanceTask::IdleWorkspaceCleanup) {
                match engine.backup_now().await {
                    Ok(paths) => tracing::info!(count = paths.len(), "wrote scheduled backup"),
                    Err(err) => tracing::warn!(error = %err, "scheduled backup failed"),
                }
            }
        }
    })
}
