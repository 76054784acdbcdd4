use async_trait::async_trait;
use kronos_core::{BftError, IntraShardBft};
use kronos_types::{Record, RoundId};
use parking_lot::Mutex;

/// Returns every batch unchanged and records the call.
#[derive(Debug, Default)]
pub struct RecordingBft {
    calls: Mutex<Vec<(RoundId, Vec<Record>)>>,
}

impl RecordingBft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(round, input)` seen so far, in call order.
    pub fn calls(&self) -> Vec<(RoundId, Vec<Record>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl IntraShardBft for RecordingBft {
    async fn run(&self, round: RoundId, input: Vec<Record>) -> Result<Vec<Record>, BftError> {
        self.calls.lock().push((round, input.clone()));
        Ok(input)
    }
}
