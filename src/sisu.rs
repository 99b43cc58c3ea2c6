use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::{
    Course, CourseOffering, Institution, MedicineInstitution, Modalidade, ModalidadesResponse,
    SubjectWeights,
};
use crate::retry::{self, RetryPolicy};

const BASE_URL: &str = "https://sisu-api.sisu.mec.gov.br/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// General/unreserved competition category. The only quota this tool tracks.
const GENERAL_QUOTA: &str = "0";

/// Client for the public SISU offer API. All calls are sequential and each
/// one is retried on a fixed 1-second policy before the error propagates.
pub struct SisuClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl SisuClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy: RetryPolicy::fixed(3, Duration::from_secs(1)),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> anyhow::Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        retry::retry(&self.policy, || {
            let url = url.clone();
            async move {
                debug!(%url, "requesting");
                let response = self
                    .http
                    .get(&url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await
                    .with_context(|| format!("request to {url} failed"))?;
                let response = response
                    .error_for_status()
                    .with_context(|| format!("request to {url} returned an error status"))?;
                response
                    .json::<T>()
                    .await
                    .with_context(|| format!("response from {url} was not valid JSON"))
            }
        })
        .await
    }

    /// Full institution directory, flattened from the upstream per-state
    /// grouping. Failure here is fatal to a harvest run.
    pub async fn institutions(&self) -> anyhow::Result<Vec<Institution>> {
        let by_state: HashMap<String, Vec<Institution>> =
            self.get_json("/oferta/instituicoes/uf").await?;
        let mut institutions: Vec<Institution> = by_state.into_values().flatten().collect();
        institutions.sort_by(|a, b| a.co_ies.cmp(&b.co_ies));
        Ok(institutions)
    }

    /// Course catalog for one institution. The upstream response is a map of
    /// opaque keys to course records; entries without a course name are
    /// dropped. A failed fetch recovers to an empty catalog so that one bad
    /// institution never aborts the harvest.
    pub async fn courses(&self, co_ies: &str) -> Vec<Course> {
        let endpoint = format!("/oferta/instituicao/{co_ies}");
        match self
            .get_json::<Option<HashMap<String, Course>>>(&endpoint)
            .await
        {
            Ok(Some(catalog)) => catalog
                .into_values()
                .filter(|course| course.no_curso.is_some())
                .collect(),
            Ok(None) => {
                info!(co_ies, "no courses found for institution");
                Vec::new()
            }
            Err(err) => {
                warn!(co_ies, error = %err, "failed to fetch courses, skipping institution");
                Vec::new()
            }
        }
    }

    /// Cutoff rows for one course offering. Errors propagate so the caller
    /// can decide whether the offering is skippable.
    pub async fn modalidades(&self, course_id: &str) -> anyhow::Result<Vec<Modalidade>> {
        let endpoint = format!("/oferta/{course_id}/modalidades");
        let response: ModalidadesResponse = self.get_json(&endpoint).await?;
        Ok(response.modalidades)
    }

    /// Walk every institution and keep the ones offering an exact-match
    /// Medicina course. Campus name and municipality from the matching
    /// course take precedence over the institution's own.
    pub async fn discover_medicine_institutions(
        &self,
    ) -> anyhow::Result<Vec<MedicineInstitution>> {
        let institutions = self.institutions().await?;
        info!(total = institutions.len(), "scanning institutions for Medicina courses");

        let mut found = Vec::new();
        for institution in &institutions {
            let courses = self.courses(&institution.co_ies).await;
            let medicine = courses.iter().find(|course| {
                course
                    .no_curso
                    .as_deref()
                    .is_some_and(|name| classify_medicine(name))
            });

            if let Some(course) = medicine {
                found.push(MedicineInstitution {
                    co_ies: institution.co_ies.clone(),
                    name: course
                        .no_campus
                        .clone()
                        .unwrap_or_else(|| institution.no_ies.clone()),
                    short_name: institution.sg_ies.clone(),
                    state: institution.sg_uf.clone(),
                    city: course
                        .no_municipio_campus
                        .clone()
                        .unwrap_or_else(|| institution.no_municipio.clone()),
                    last_update: Utc::now(),
                });
            }
        }

        info!(count = found.len(), "institutions with Medicina courses");
        Ok(found)
    }

    /// Re-fetch each institution's catalog and derive one normalized record
    /// per exact-match Medicina offering that has a usable general-quota
    /// cutoff. Per-course failures are logged and contribute nothing.
    pub async fn harvest_course_offerings(
        &self,
        institutions: &[MedicineInstitution],
    ) -> anyhow::Result<Vec<CourseOffering>> {
        let mut offerings = Vec::new();

        for institution in institutions {
            let courses = self.courses(&institution.co_ies).await;
            let medicine_courses = courses.iter().filter(|course| {
                course
                    .no_curso
                    .as_deref()
                    .is_some_and(|name| classify_medicine(name))
            });

            for course in medicine_courses {
                let Some(course_id) = course.co_oferta.as_deref() else {
                    warn!(co_ies = %institution.co_ies, "Medicina course without an offer id, skipping");
                    continue;
                };
                match self.modalidades(course_id).await {
                    Ok(rows) => {
                        if let Some(offering) = derive_offering(institution, course, &rows) {
                            offerings.push(offering);
                        } else {
                            info!(course_id, "no usable general-quota cutoff, skipping offering");
                        }
                    }
                    Err(err) => {
                        warn!(course_id, error = %err, "failed to fetch cutoff rows, skipping offering");
                    }
                }
            }
        }

        Ok(offerings)
    }
}

/// Exact-match classification: only a trimmed, case-insensitive "medicina"
/// counts. Near-misses such as Biomedicina are logged and excluded.
pub fn classify_medicine(course_name: &str) -> bool {
    let name = course_name.trim().to_lowercase();
    let is_medicine = name == "medicina";
    if !is_medicine && name.contains("medicina") {
        debug!(course_name, "filtered out near-miss course");
    }
    is_medicine
}

/// Lenient weight parse: numbers and numeric strings pass through, anything
/// else (absent, null, garbage) falls back to 1.
pub fn parse_weight(raw: &Value) -> f64 {
    parse_number(raw).filter(|value| value.is_finite()).unwrap_or(1.0)
}

/// Cutoff scores parse the same way but default to 0, which later drops the
/// row from the max.
pub fn parse_score(raw: &Value) -> f64 {
    parse_number(raw).filter(|value| value.is_finite()).unwrap_or(0.0)
}

fn parse_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn course_weights(course: &Course) -> SubjectWeights {
    SubjectWeights {
        linguagens: parse_weight(&course.nu_peso_l),
        humanas: parse_weight(&course.nu_peso_ch),
        natureza: parse_weight(&course.nu_peso_cn),
        matematica: parse_weight(&course.nu_peso_m),
        redacao: parse_weight(&course.nu_peso_r),
    }
}

/// Build the normalized record for one offering, or None when no general-quota
/// cutoff row yields a usable score.
///
/// The minimum score is the max over retained rows of `(score * Σw) / Σw`.
/// The weighting cancels for well-formed scores; the upstream implementation
/// computes it this way and the arithmetic is kept verbatim pending product
/// review.
pub fn derive_offering(
    institution: &MedicineInstitution,
    course: &Course,
    rows: &[Modalidade],
) -> Option<CourseOffering> {
    let course_id = course.co_oferta.as_deref()?;
    let weights = course_weights(course);
    let weight_sum = weights.sum();

    let min_score = rows
        .iter()
        .filter(|row| row.co_concorrencia == GENERAL_QUOTA)
        .map(|row| {
            let score = parse_score(&row.nu_nota_corte);
            (score * weight_sum) / weight_sum
        })
        .filter(|weighted| weighted.is_finite() && *weighted > 0.0)
        .fold(None, |best: Option<f64>, weighted| {
            Some(best.map_or(weighted, |current| current.max(weighted)))
        })?;

    Some(CourseOffering {
        name: course
            .no_campus
            .clone()
            .unwrap_or_else(|| institution.name.clone()),
        short_name: institution.short_name.clone(),
        state: institution.state.clone(),
        city: course
            .no_municipio_campus
            .clone()
            .unwrap_or_else(|| institution.city.clone()),
        course_id: course_id.to_string(),
        min_score,
        weights,
        last_update: institution.last_update,
    })
}
