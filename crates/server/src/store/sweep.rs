//! Periodic removal of expired sessions, codes and tokens.
//!
//! Reads already ignore expired rows; this only keeps the tables small.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DbErr;

use crate::config::SweepConfig;
use crate::store::{CodeStore, SessionStore, TokenStore};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub codes: u64,
    pub tokens: u64,
}

#[derive(Clone)]
pub struct ExpirySweeper {
    pub sessions: Arc<dyn SessionStore>,
    pub codes: Arc<dyn CodeStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl ExpirySweeper {
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<SweepReport, DbErr> {
        Ok(SweepReport {
            sessions: self.sessions.purge_expired().await?,
            codes: self.codes.purge_expired().await?,
            tokens: self.tokens.purge_expired().await?,
        })
    }
}

/// Spawn the sweep loop if enabled in `config`.
pub fn spawn_expiry_sweep(sweeper: ExpirySweeper, config: &SweepConfig) {
    if !config.enabled {
        tracing::info!("expiry sweep disabled");
        return;
    }
    let period = Duration::from_secs(config.interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match sweeper.sweep_once().await {
                Ok(report) => tracing::info!(
                    sessions = report.sessions,
                    codes = report.codes,
                    tokens = report.tokens,
                    "purged expired rows"
                ),
                Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
            }
        }
    });
}
