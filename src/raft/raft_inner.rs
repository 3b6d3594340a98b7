use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::core::RaftEvent;
use crate::error::Fatal;
use crate::membership::MembershipEvent;
use crate::metrics::RaftMetrics;
use crate::metrics::Wait;
use crate::raft::core_state::CoreState;
use crate::MessageSummary;
use crate::RaftTypeConfig;

/// RaftInner is the internal handle and provides internally used APIs to communicate with
/// `RaftCore`.
pub(in crate::raft) struct RaftInner<C>
where C: RaftTypeConfig
{
    pub(in crate::raft) id: C::MemberId,
    pub(in crate::raft) config: Arc<Config>,
    pub(in crate::raft) tx_api: mpsc::UnboundedSender<RaftEvent<C>>,
    pub(in crate::raft) rx_metrics: watch::Receiver<RaftMetrics<C>>,
    pub(in crate::raft) tx_membership: broadcast::Sender<MembershipEvent<C>>,

    pub(in crate::raft) tx_shutdown: Mutex<Option<oneshot::Sender<()>>>,
    pub(in crate::raft) core_state: Mutex<CoreState<C>>,
}

impl<C> RaftInner<C>
where C: RaftTypeConfig
{
    /// Send an event to `RaftCore` and wait for its reply on `rx`.
    pub(in crate::raft) async fn call_core<T, E>(
        &self,
        event: RaftEvent<C>,
        rx: oneshot::Receiver<Result<T, E>>,
    ) -> Result<T, E>
    where
        E: From<Fatal<C>>,
    {
        let sum = event.summary();

        let send_res = self.tx_api.send(event);
        if send_res.is_err() {
            let fatal = self.get_core_stopped_error("sending event to RaftCore", Some(sum)).await;
            return Err(fatal.into());
        }

        match rx.await {
            Ok(res) => res,
            Err(_) => {
                let fatal = self.get_core_stopped_error("receiving reply from RaftCore", Some(sum)).await;
                Err(fatal.into())
            }
        }
    }

    pub(in crate::raft) fn wait(&self, timeout: Option<Duration>) -> Wait<C> {
        let timeout = timeout.unwrap_or_else(|| Duration::from_millis(500));
        Wait {
            timeout,
            rx: self.rx_metrics.clone(),
        }
    }

    /// Wait for `RaftCore` to stop and return the error it stopped with.
    pub(in crate::raft) async fn get_core_stopped_error(
        &self,
        when: impl fmt::Display,
        message_summary: Option<String>,
    ) -> Fatal<C> {
        self.join_core_task().await;

        let core_res = {
            let state = self.core_state.lock().await;
            match &*state {
                CoreState::Done(res) => res.clone(),
                CoreState::Running(_) => Err(Fatal::Stopped),
            }
        };

        tracing::error!(
            core_result = debug(&core_res),
            "failure {}; message: {}",
            when,
            message_summary.unwrap_or_default()
        );

        match core_res {
            Err(fatal) => fatal,
            // A clean shutdown.
            Ok(()) => Fatal::Stopped,
        }
    }

    /// Wait for `RaftCore` task to finish and record the returned value from the task.
    #[tracing::instrument(level = "debug", skip_all, fields(id = display(self.id)))]
    pub(in crate::raft) async fn join_core_task(&self) {
        let mut state = self.core_state.lock().await;
        match &mut *state {
            CoreState::Running(handle) => {
                let res = handle.await;
                tracing::info!(res = debug(&res), "RaftCore exited");

                let core_task_res = match res {
                    Err(err) => {
                        if err.is_panic() {
                            Err(Fatal::Panicked)
                        } else {
                            Err(Fatal::Stopped)
                        }
                    }
                    Ok(returned_res) => returned_res,
                };

                *state = CoreState::Done(core_task_res);
            }
            CoreState::Done(_) => {
                // RaftCore has already quit, nothing to do
            }
        }
    }
}
