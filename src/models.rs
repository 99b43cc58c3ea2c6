use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw institution record as returned by the SISU directory endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Institution {
    pub co_ies: String,
    pub no_ies: String,
    pub sg_ies: String,
    pub sg_uf: String,
    pub no_municipio: String,
}

/// Raw course record from the per-institution catalog. Upstream is loose
/// about which fields are present, so everything defaults to absent and the
/// weight fields stay untyped until `sisu::parse_weight` looks at them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub co_oferta: Option<String>,
    #[serde(default)]
    pub no_curso: Option<String>,
    #[serde(default)]
    pub nu_peso_l: serde_json::Value,
    #[serde(default)]
    pub nu_peso_ch: serde_json::Value,
    #[serde(default)]
    pub nu_peso_cn: serde_json::Value,
    #[serde(default)]
    pub nu_peso_m: serde_json::Value,
    #[serde(default)]
    pub nu_peso_r: serde_json::Value,
    #[serde(default)]
    pub no_campus: Option<String>,
    #[serde(default)]
    pub no_municipio_campus: Option<String>,
}

/// One cutoff row ("modalidade") for a course offering.
#[derive(Debug, Clone, Deserialize)]
pub struct Modalidade {
    pub co_concorrencia: String,
    #[serde(default)]
    pub nu_nota_corte: serde_json::Value,
    #[serde(default)]
    pub dt_nota_corte: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModalidadesResponse {
    #[serde(default)]
    pub modalidades: Vec<Modalidade>,
}

/// Institution confirmed to offer at least one exact-match Medicina course.
/// Upserted on `co_ies`, never deleted.
#[derive(Debug, Clone)]
pub struct MedicineInstitution {
    pub co_ies: String,
    pub name: String,
    pub short_name: String,
    pub state: String,
    pub city: String,
    pub last_update: DateTime<Utc>,
}

/// Relative emphasis a course places on each of the five ENEM subjects.
/// Invariant: non-negative, not all zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectWeights {
    pub linguagens: f64,
    pub humanas: f64,
    pub natureza: f64,
    pub matematica: f64,
    pub redacao: f64,
}

impl SubjectWeights {
    pub fn uniform(value: f64) -> Self {
        Self {
            linguagens: value,
            humanas: value,
            natureza: value,
            matematica: value,
            redacao: value,
        }
    }

    pub fn sum(&self) -> f64 {
        self.linguagens + self.humanas + self.natureza + self.matematica + self.redacao
    }
}

/// Normalized record for one (institution, course-offering) pair.
#[derive(Debug, Clone)]
pub struct CourseOffering {
    pub name: String,
    pub short_name: String,
    pub state: String,
    pub city: String,
    pub course_id: String,
    pub min_score: f64,
    pub weights: SubjectWeights,
    pub last_update: DateTime<Utc>,
}

/// The student's five subject scores. Each is optional; a single absent score
/// leaves the composite undefined for every course.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserScores {
    pub linguagens: Option<f64>,
    pub humanas: Option<f64>,
    pub natureza: Option<f64>,
    pub matematica: Option<f64>,
    pub redacao: Option<f64>,
}

impl UserScores {
    pub fn is_complete(&self) -> bool {
        self.linguagens.is_some()
            && self.humanas.is_some()
            && self.natureza.is_some()
            && self.matematica.is_some()
            && self.redacao.is_some()
    }
}
