pub mod error;
pub mod model;
pub mod service;

pub use error::{PipelineError, UnitFailure};
pub use model::{LanguageTag, SurveyId, TextUnit, TranslationTable};
pub use service::{
    AssetPipeline, CollisionPolicy, FailurePolicy, PipelineOptions, RunReport, SkipReason,
    SkippedUnit,
};
