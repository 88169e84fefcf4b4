use super::error::{PipelineError, UnitFailure};
use super::model::{LanguageTag, SurveyId, TextUnit, TranslationTable};
use crate::domain::canonical::{synthesis_text, CanonicalKey};
use crate::domain::mapping::Mapping;
use crate::infrastructure::repositories::{artifact_name, HostingRepository, SynthesisBackend};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What happens when one unit cannot be synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing unit (in plan order).
    FailFast,
    /// Synthesize everything else, then fail the run listing every failed unit.
    Continue,
}

/// What happens when units from different languages produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    LastWriteWins,
    Reject,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Languages processed, in order. Later languages win key collisions.
    pub languages: Vec<LanguageTag>,
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub collision_policy: CollisionPolicy,
    pub prune_stale_artifacts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingLanguageColumn,
    EmptyCanonicalKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUnit {
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub reason: SkipReason,
}

/// Outcome of a published run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub survey_id: String,
    pub backend: String,
    pub mapping_path: PathBuf,
    pub mapping_url: String,
    pub entries: usize,
    pub synthesized: usize,
    pub deduplicated: usize,
    pub overwritten: usize,
    pub pruned: usize,
    pub skipped: Vec<SkippedUnit>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PlannedUnit {
    unit: TextUnit,
    text: String,
    key: CanonicalKey,
}

#[derive(Debug, Default)]
struct Plan {
    units: Vec<PlannedUnit>,
    skipped: Vec<SkippedUnit>,
    deduplicated: usize,
    overwritten: usize,
}

struct ProducedArtifact {
    key: CanonicalKey,
    language: LanguageTag,
    file_name: String,
    url: String,
}

/// Turns a translation table into audio artifacts plus one published mapping.
pub struct AssetPipeline {
    backend: Arc<dyn SynthesisBackend>,
    hosting: Arc<HostingRepository>,
    options: PipelineOptions,
}

impl AssetPipeline {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        hosting: Arc<HostingRepository>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            backend,
            hosting,
            options,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn hosting(&self) -> &HostingRepository {
        &self.hosting
    }

    /// Run the whole pipeline for one survey.
    ///
    /// This operation:
    /// - Plans units per supported language (skips missing columns and unmappable text)
    /// - Collapses units sharing a key so each key is synthesized at most once
    /// - Synthesizes and stores artifacts with bounded concurrency
    /// - Publishes the mapping once, only if every planned unit succeeded
    pub async fn run(
        &self,
        survey: &SurveyId,
        table: &TranslationTable,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let plan = self.plan(table)?;

        tracing::info!(
            run_id = %run_id,
            survey_id = %survey,
            backend = self.backend.name(),
            planned = plan.units.len(),
            skipped = plan.skipped.len(),
            deduplicated = plan.deduplicated,
            concurrency = self.options.concurrency,
            "Starting TTS generation run"
        );

        let mut mapping = Mapping::new();
        let mut referenced: HashMap<LanguageTag, HashSet<String>> = HashMap::new();
        let mut failures = Vec::new();
        let mut synthesized = 0;

        {
            // Ordered: results arrive in plan order, so the first failure seen is the first
            // failing unit and mapping inserts happen in a fixed order.
            let pending: Vec<_> = plan
                .units
                .iter()
                .map(|planned| self.produce(survey, planned, cancel))
                .collect();
            let mut results = stream::iter(pending).buffered(self.options.concurrency.max(1));

            while let Some(result) = results.next().await {
                match result {
                    Ok(artifact) => {
                        mapping.insert(&artifact.key, artifact.url);
                        referenced
                            .entry(artifact.language)
                            .or_default()
                            .insert(artifact.file_name);
                        synthesized += 1;
                    }
                    Err(PipelineError::SynthesisFailure {
                        language,
                        row,
                        key,
                        source,
                    }) if self.options.failure_policy == FailurePolicy::Continue => {
                        failures.push(UnitFailure {
                            language,
                            row,
                            key,
                            message: source.to_string(),
                        });
                    }
                    Err(e) => {
                        tracing::error!(run_id = %run_id, survey_id = %survey, error = %e, "TTS generation run aborted");
                        return Err(e);
                    }
                }
            }
        }

        if !failures.is_empty() {
            tracing::error!(
                run_id = %run_id,
                survey_id = %survey,
                failed = failures.len(),
                "TTS generation run incomplete, mapping not published"
            );
            return Err(PipelineError::Incomplete { failures });
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let json = mapping
            .to_json_pretty()
            .map_err(|e| PipelineError::MappingSerializationFailure(e.to_string()))?;
        let mapping_path = self.hosting.publish_mapping(survey, json).await?;
        let mapping_url = self.hosting.mapping_url(survey)?;

        let pruned = if self.options.prune_stale_artifacts {
            self.prune(survey, &referenced).await
        } else {
            0
        };

        let report = RunReport {
            run_id,
            survey_id: survey.to_string(),
            backend: self.backend.name().to_string(),
            mapping_path,
            mapping_url: mapping_url.to_string(),
            entries: mapping.len(),
            synthesized,
            deduplicated: plan.deduplicated,
            overwritten: plan.overwritten,
            pruned,
            skipped: plan.skipped,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            run_id = %run_id,
            survey_id = %survey,
            entries = report.entries,
            synthesized = report.synthesized,
            pruned = report.pruned,
            mapping_url = %report.mapping_url,
            "TTS mapping published"
        );

        Ok(report)
    }
}

impl AssetPipeline {
    fn plan(&self, table: &TranslationTable) -> Result<Plan, PipelineError> {
        let mut plan = Plan::default();
        let mut by_key: HashMap<CanonicalKey, usize> = HashMap::new();

        for language in &self.options.languages {
            let Some(units) = table.column(language) else {
                tracing::warn!(language = %language, "Language column missing, skipping language");
                plan.skipped.push(SkippedUnit {
                    language: language.to_string(),
                    row: None,
                    reason: SkipReason::MissingLanguageColumn,
                });
                continue;
            };

            for unit in units {
                let Some(key) = CanonicalKey::from_raw(&unit.raw) else {
                    tracing::warn!(
                        language = %unit.language,
                        row = unit.row,
                        "Text has no letters or digits, skipping unit"
                    );
                    plan.skipped.push(SkippedUnit {
                        language: unit.language.to_string(),
                        row: Some(unit.row),
                        reason: SkipReason::EmptyCanonicalKey,
                    });
                    continue;
                };

                let planned = PlannedUnit {
                    text: synthesis_text(&unit.raw),
                    key,
                    unit,
                };

                match by_key.get(&planned.key) {
                    None => {
                        by_key.insert(planned.key.clone(), plan.units.len());
                        plan.units.push(planned);
                    }
                    Some(&index) => {
                        let existing = &plan.units[index];
                        if existing.unit.language == planned.unit.language {
                            // Same key in the same language is the same audio.
                            tracing::debug!(
                                key = %planned.key,
                                language = %planned.unit.language,
                                first_row = existing.unit.row,
                                row = planned.unit.row,
                                "Duplicate text collapsed"
                            );
                            plan.deduplicated += 1;
                            continue;
                        }

                        let first = describe(&existing.unit);
                        let second = describe(&planned.unit);
                        match self.options.collision_policy {
                            CollisionPolicy::Reject => {
                                return Err(PipelineError::KeyCollision {
                                    key: planned.key.to_string(),
                                    first,
                                    second,
                                });
                            }
                            CollisionPolicy::LastWriteWins => {
                                tracing::warn!(
                                    key = %planned.key,
                                    replaced = %first,
                                    by = %second,
                                    "Key collision across languages, last write wins"
                                );
                                plan.units[index] = planned;
                                plan.overwritten += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(plan)
    }

    async fn produce(
        &self,
        survey: &SurveyId,
        planned: &PlannedUnit,
        cancel: &CancellationToken,
    ) -> Result<ProducedArtifact, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let language = &planned.unit.language;
        let audio = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            audio = self.backend.synthesize(language, &planned.text) => audio,
        }
        .map_err(|source| PipelineError::SynthesisFailure {
            language: language.to_string(),
            row: planned.unit.row,
            key: planned.key.to_string(),
            source,
        })?;

        let file_name = artifact_name(&planned.key, self.backend.audio_extension());
        self.hosting
            .store_artifact(survey, language, &file_name, audio)
            .await?;
        let url = self.hosting.artifact_url(survey, language, &file_name)?;

        tracing::debug!(
            survey_id = %survey,
            language = %language,
            row = planned.unit.row,
            key = %planned.key,
            file_name = %file_name,
            "Artifact stored"
        );

        Ok(ProducedArtifact {
            key: planned.key.clone(),
            language: language.clone(),
            file_name,
            url: url.to_string(),
        })
    }

    async fn prune(
        &self,
        survey: &SurveyId,
        referenced: &HashMap<LanguageTag, HashSet<String>>,
    ) -> usize {
        let empty = HashSet::new();
        let mut pruned = 0;
        for language in &self.options.languages {
            let keep = referenced.get(language).unwrap_or(&empty);
            match self.hosting.prune_artifacts(survey, language, keep).await {
                Ok(count) => pruned += count,
                // Published already; stale files only waste space.
                Err(e) => tracing::warn!(
                    survey_id = %survey,
                    language = %language,
                    error = %e,
                    "Failed to prune stale artifacts"
                ),
            }
        }
        pruned
    }
}

fn describe(unit: &TextUnit) -> String {
    format!("{} row {}", unit.language, unit.row)
}
