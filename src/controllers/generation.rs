use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Html,
    Json,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::domain::playback::snippet;
use crate::domain::survey::{AssetPipeline, RunReport, SurveyId, TranslationTable};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub report: RunReport,
    pub snippet: String,
}

pub struct GenerationController {
    pipeline: Arc<AssetPipeline>,
    active_runs: Mutex<HashSet<SurveyId>>,
    shutdown: CancellationToken,
}

impl GenerationController {
    pub fn new(pipeline: Arc<AssetPipeline>, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            active_runs: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    pub fn pipeline(&self) -> &AssetPipeline {
        &self.pipeline
    }

    /// POST /api/surveys/:survey_id/tts
    pub async fn generate(
        State(controller): State<Arc<GenerationController>>,
        Path(survey_id): Path<String>,
        body: Bytes,
    ) -> AppResult<Json<GenerationResponse>> {
        let survey = SurveyId::parse(&survey_id)?;
        let table = TranslationTable::from_json_slice(&body)?;

        let _run = ActiveRun::claim(&controller, &survey)?;
        let cancel = controller.shutdown.child_token();

        tracing::info!(survey_id = %survey, rows = table.rows.len(), "TTS generation requested");

        let report = controller.pipeline.run(&survey, &table, &cancel).await?;
        let snippet = snippet::render(&report.mapping_url);

        Ok(Json(GenerationResponse { report, snippet }))
    }

    /// GET /api/surveys/:survey_id/snippet
    pub async fn snippet(
        State(controller): State<Arc<GenerationController>>,
        Path(survey_id): Path<String>,
    ) -> AppResult<Html<String>> {
        let survey = SurveyId::parse(&survey_id)?;
        let hosting = controller.pipeline.hosting();

        if hosting
            .load_mapping(&survey)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "no mapping published for survey {}",
                survey
            )));
        }

        let mapping_url = hosting
            .mapping_url(&survey)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Html(snippet::render(mapping_url.as_str())))
    }
}

/// Marks a survey as being generated until dropped; a second run for the same survey is refused.
struct ActiveRun<'a> {
    controller: &'a GenerationController,
    survey: SurveyId,
}

impl<'a> ActiveRun<'a> {
    fn claim(controller: &'a GenerationController, survey: &SurveyId) -> AppResult<Self> {
        let mut active = controller
            .active_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !active.insert(survey.clone()) {
            return Err(AppError::Conflict(format!(
                "a TTS run for survey {} is already in progress",
                survey
            )));
        }
        Ok(Self {
            controller,
            survey: survey.clone(),
        })
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.controller
            .active_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.survey);
    }
}
