//! Broker session manager (§4.1, §9 "Account-switch optimisation").
//!
//! Owns exactly one process-wide terminal session. `switch_to` is a no-op
//! when the requested login already matches the current one — this is the
//! correctness property that collapses per-iteration latency, not merely an
//! optimisation. `_current_login` is only ever updated on a *successful*
//! login, so a failed switch leaves the manager's view of the world
//! truthful and the engine free to retry on the next poll.

use crate::model::AccountCredentials;
use crate::broker::BrokerClient;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SessionManager<B: BrokerClient + ?Sized> {
    broker: Arc<B>,
    initialised: Mutex<bool>,
    current_login: Mutex<Option<u64>>,
}

impl<B: BrokerClient + ?Sized> SessionManager<B> {
    pub fn new(broker: Arc<B>) -> Self {
        Self {
            broker,
            initialised: Mutex::new(false),
            current_login: Mutex::new(None),
        }
    }

    /// Initialises the terminal exactly once. Subsequent calls are no-ops.
    /// Failure is fatal and propagated to the caller (§4.1).
    pub async fn initialise(&self) -> anyhow::Result<()> {
        let mut initialised = self.initialised.lock().await;
        if *initialised {
            return Ok(());
        }
        self.broker.initialise().await?;
        *initialised = true;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.broker.shutdown().await
    }

    /// Switches the active session to `creds.login`. No-op if already
    /// logged into that account. On login failure, `current_login` is left
    /// untouched so the caller can tell "we are still on the prior
    /// account" from "we don't know where we are".
    pub async fn switch_to(&self, creds: &AccountCredentials) -> anyhow::Result<()> {
        let mut current = self.current_login.lock().await;
        if *current == Some(creds.login) {
            return Ok(());
        }
        self.broker.login(creds).await?;
        *current = Some(creds.login);
        Ok(())
    }

    pub async fn current_login(&self) -> Option<u64> {
        *self.current_login.lock().await
    }

    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerClient;

    fn creds(login: u64) -> AccountCredentials {
        AccountCredentials { login, password: "pw".into(), server: "srv".into() }
    }

    #[tokio::test]
    async fn initialise_is_idempotent() {
        let mut broker = MockBrokerClient::new();
        broker.expect_initialise().times(1).returning(|| Ok(()));
        let mgr = SessionManager::new(Arc::new(broker));
        mgr.initialise().await.unwrap();
        mgr.initialise().await.unwrap();
    }

    #[tokio::test]
    async fn switch_to_same_login_is_noop() {
        let mut broker = MockBrokerClient::new();
        broker.expect_login().times(1).returning(|_| Ok(()));
        let mgr = SessionManager::new(Arc::new(broker));
        mgr.switch_to(&creds(1)).await.unwrap();
        mgr.switch_to(&creds(1)).await.unwrap();
        mgr.switch_to(&creds(1)).await.unwrap();
    }

    #[tokio::test]
    async fn switch_to_different_login_logs_in_again() {
        let mut broker = MockBrokerClient::new();
        broker.expect_login().times(2).returning(|_| Ok(()));
        let mgr = SessionManager::new(Arc::new(broker));
        mgr.switch_to(&creds(1)).await.unwrap();
        mgr.switch_to(&creds(2)).await.unwrap();
        assert_eq!(mgr.current_login().await, Some(2));
    }

    #[tokio::test]
    async fn failed_login_does_not_update_current_login() {
        let mut broker = MockBrokerClient::new();
        broker.expect_login().times(2).returning(|creds: &AccountCredentials| {
            if creds.login == 2 {
                anyhow::bail!("login rejected")
            } else {
                Ok(())
            }
        });
        let mgr = SessionManager::new(Arc::new(broker));
        mgr.switch_to(&creds(1)).await.unwrap();
        let err = mgr.switch_to(&creds(2)).await;
        assert!(err.is_err());
        assert_eq!(mgr.current_login().await, Some(1));
    }
}
