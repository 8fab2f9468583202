mod settings;

pub use settings::{
    BusSettings, PipelineSettings, Settings, StoreSettings, SummarizationSettings,
    TranscriptionSettings,
};
