use serde::Serialize;

/// Fixed blend used by the overall recompute path. Independent of the
/// admin-editable weight table, which only drives proportional rescaling of
/// banked Mastery/CompletedChallenges points. Both schemes ship as-is; do not
/// unify them without product sign-off.
const BLEND_ACADEMIC: f64 = 0.30;
const BLEND_EXTRACURRICULAR: f64 = 0.20;
const BLEND_SEMINARS: f64 = 0.10;
const BLEND_CERTIFICATIONS: f64 = 0.20;
const BLEND_CHALLENGES: f64 = 0.20;

pub const SEMINAR_CAP: f64 = 10.0;
pub const ACTIVITY_CAP: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreComponents {
    pub academic_grades: f64,
    pub extracurricular: f64,
    pub seminars_webinars: f64,
    pub certifications: f64,
    pub challenges_completed: f64,
    pub mastery: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BadgeTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    RisingStar,
    Needs,
    None,
}

impl BadgeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeTier::Platinum => "platinum",
            BadgeTier::Gold => "gold",
            BadgeTier::Silver => "silver",
            BadgeTier::Bronze => "bronze",
            BadgeTier::RisingStar => "rising-star",
            BadgeTier::Needs => "needs",
            BadgeTier::None => "none",
        }
    }

    /// Tier thresholds are checked highest-first with `>=`, so a score
    /// exactly on a boundary takes the higher tier.
    pub fn for_score(score: f64) -> BadgeTier {
        if score >= 95.0 {
            BadgeTier::Platinum
        } else if score >= 85.0 {
            BadgeTier::Gold
        } else if score >= 75.0 {
            BadgeTier::Silver
        } else if score >= 65.0 {
            BadgeTier::Bronze
        } else if score >= 50.0 {
            BadgeTier::RisingStar
        } else if score >= 1.0 {
            BadgeTier::Needs
        } else {
            BadgeTier::None
        }
    }
}

/// Blend the raw components into a 0-100 overall and its badge tier.
/// Pure and deterministic. Mastery feeds the weight table, not this blend.
pub fn compute_overall(components: &ScoreComponents) -> (f64, BadgeTier) {
    let overall = components.academic_grades * BLEND_ACADEMIC
        + components.extracurricular * BLEND_EXTRACURRICULAR
        + components.seminars_webinars * BLEND_SEMINARS
        + components.certifications * BLEND_CERTIFICATIONS
        + components.challenges_completed * BLEND_CHALLENGES;
    let overall = overall.clamp(0.0, 100.0);
    (overall, BadgeTier::for_score(overall))
}

/// Seminars/Webinars score from attendance rows, 0-10.
///
/// Rows created since the score column exists bank fixed points per
/// confirmation: floor(sum / 100), capped. Older rows have no score at all;
/// when none of the rows carries one, each confirmation counts as a point,
/// capped the same way.
pub fn seminar_score(attendance_scores: &[Option<f64>]) -> f64 {
    if attendance_scores.iter().any(|s| s.is_some()) {
        let sum: f64 = attendance_scores.iter().flatten().sum();
        (sum / 100.0).floor().clamp(0.0, SEMINAR_CAP)
    } else {
        (attendance_scores.len() as f64).min(SEMINAR_CAP)
    }
}

/// AcademicGrades score: mean of the recorded yearly grades, clamped 0-100.
pub fn academic_score(yearly_grades: &[f64]) -> f64 {
    if yearly_grades.is_empty() {
        return 0.0;
    }
    let sum: f64 = yearly_grades.iter().sum();
    (sum / yearly_grades.len() as f64).clamp(0.0, 100.0)
}

/// Extracurricular score: banked activity points, capped at 100.
pub fn activity_score(activity_points: &[f64]) -> f64 {
    let sum: f64 = activity_points.iter().sum();
    sum.clamp(0.0, ACTIVITY_CAP)
}
