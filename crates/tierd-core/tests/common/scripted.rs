//! Executor whose outcome is scripted per user.
//!
//! Unscripted users block until their token is cancelled, which makes them
//! useful for holding a slot open.

use std::collections::HashMap;
use std::sync::Mutex;

use tierd_core::work::{UnitOfWork, WorkError, WorkRequest};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub enum Plan {
    Block,
    Complete,
    Fail(&'static str),
}

#[derive(Default)]
pub struct Scripted {
    plans: Mutex<HashMap<String, Plan>>,
    calls: Mutex<Vec<WorkRequest>>,
}

impl Scripted {
    pub fn set(&self, user: &str, plan: Plan) {
        self.plans.lock().unwrap().insert(user.to_string(), plan);
    }

    /// Every request the executor has been handed, in order.
    pub fn calls(&self) -> Vec<WorkRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl UnitOfWork for Scripted {
    async fn run(&self, request: WorkRequest, cancel: CancellationToken) -> Result<(), WorkError> {
        let plan = self
            .plans
            .lock()
            .unwrap()
            .get(request.user_id.as_str())
            .copied()
            .unwrap_or(Plan::Block);
        self.calls.lock().unwrap().push(request);
        match plan {
            Plan::Complete => Ok(()),
            Plan::Fail(msg) => Err(WorkError::failed(msg)),
            Plan::Block => {
                cancel.cancelled().await;
                Err(WorkError::Cancelled)
            }
        }
    }
}
