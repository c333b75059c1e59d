use crate::phase::PrintPhase;

#[derive(Debug, Clone, PartialEq)]
pub enum JobStage {
    Preparing,
    Routing,
    Compiling,
    Executing,
    LayerDone,
    LayerSkipped,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerProgress {
    pub layer: u32,
    pub layer_index: usize,
    pub layer_count: usize,
    pub attempts: Option<u32>,
    pub stages: Option<usize>,
    pub unroutable: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobProgressEvent {
    pub stage: JobStage,
    pub phase: PrintPhase,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
    pub layer: Option<LayerProgress>,
}

impl JobProgressEvent {
    pub fn stage(
        stage: JobStage,
        phase: PrintPhase,
        elapsed_wall_s: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            stage,
            phase,
            elapsed_wall_s,
            message,
            layer: None,
        }
    }

    pub fn with_layer(mut self, layer: LayerProgress) -> Self {
        self.layer = Some(layer);
        self
    }
}

pub type ProgressCallback<'a> = &'a mut dyn FnMut(JobProgressEvent);
