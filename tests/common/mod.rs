//! Common test utilities

use std::sync::Arc;
use std::time::Duration;

use invitekeeper::config::Config;
use invitekeeper::manager::{InviteManager, ReconciliationScheduler, StepResult};
use invitekeeper::remote::MockRemoteClient;
use invitekeeper::storage::{MockInviteUpdateRepository, MockServerRepository};
use invitekeeper::ServerRecord;

/// Standard wait used by the harness config
pub const STANDARD_WAIT: Duration = Duration::from_secs(5);

/// Fast retry used by the harness config
pub const FAST_RETRY: Duration = Duration::from_millis(1);

/// Config with a fixed shuffle seed and a quiet interval long enough that
/// background passes never roll over during a test
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.manager.wait_secs = 5;
    config.manager.fast_retry_ms = 1;
    config.manager.quiet_interval_secs = 3600;
    config.manager.liveness_threshold_secs = 360;
    config.manager.shuffle_seed = Some(42);
    config.notifications.site_url = "https://servers.example.com".to_string();
    config
}

/// Loop wired against in-memory collaborators
pub struct Harness {
    pub manager: InviteManager,
    pub servers: Arc<MockServerRepository>,
    pub updates: Arc<MockInviteUpdateRepository>,
    pub remote: Arc<MockRemoteClient>,
}

impl Harness {
    pub fn scheduler(&self) -> &Arc<ReconciliationScheduler> {
        &self.manager.scheduler
    }
}

/// Build a harness over the given records and scripted remote
pub fn harness(servers: Vec<ServerRecord>, remote: MockRemoteClient) -> Harness {
    harness_with_updates(servers, remote, MockInviteUpdateRepository::new())
}

/// Build a harness with pre-existing throttle records
pub fn harness_with_updates(
    servers: Vec<ServerRecord>,
    remote: MockRemoteClient,
    updates: MockInviteUpdateRepository,
) -> Harness {
    let servers = Arc::new(MockServerRepository::with_servers(servers));
    let updates = Arc::new(updates);
    let remote = Arc::new(remote);
    let manager = InviteManager::new(
        &test_config(),
        servers.clone(),
        updates.clone(),
        remote.clone(),
    )
    .unwrap();

    Harness {
        manager,
        servers,
        updates,
        remote,
    }
}

/// Run one full pass by hand and return the pacing chosen for each visit
pub async fn run_pass(scheduler: &ReconciliationScheduler) -> Vec<Duration> {
    let generation = scheduler.begin_pass().await.unwrap();
    let mut delays = Vec::new();
    loop {
        match scheduler.step(generation).await {
            StepResult::Paced(delay) => delays.push(delay),
            StepResult::Finished => return delays,
            StepResult::Abandoned => panic!("pass {generation} abandoned"),
        }
    }
}
