use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub(crate) struct StageConfig {
    pub buffers: Arc<HashMap<&'static str, usize>>,
}

impl StageConfig {
    pub fn buffer_for(&self, stage: &'static str, global: usize) -> usize {
        self.buffers.get(stage).copied().unwrap_or(global).max(1)
    }
}

tokio::task_local! {
    pub(crate) static STAGE_CONFIG: StageConfig;
}

/// Capacity of the channel feeding `stage`, honouring `Runtime::buffer_stage`.
pub(crate) fn buffer_for(stage: &'static str, global: usize) -> usize {
    STAGE_CONFIG
        .try_with(|config| config.buffer_for(stage, global))
        .unwrap_or_else(|_| global.max(1))
}
