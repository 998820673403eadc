use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::matching::{JobRecord, preferences::MatchingPreferences};

/// Coarse experience bracket used at the matching boundary. Deliberately
/// coarser than the four-level scale talent profiles carry elsewhere, and the
/// brackets overlap.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
}

impl ExperienceLevel {
    /// Lenient parse: legacy job rows may carry other strings, which are
    /// treated as "no bracket filter".
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "entry" => Some(ExperienceLevel::Entry),
            "mid" => Some(ExperienceLevel::Mid),
            "senior" => Some(ExperienceLevel::Senior),
            _ => None,
        }
    }

    pub fn matches_years(&self, years: i32) -> bool {
        match self {
            ExperienceLevel::Entry => years <= 3,
            ExperienceLevel::Mid => (2..=7).contains(&years),
            ExperienceLevel::Senior => years >= 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TalentSkill {
    pub name: String,
    pub level: String,
    pub industry: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TalentCertification {
    pub name: String,
    pub issuer: Option<String>,
}

/// Per-run view of a talent, assembled fresh from profile, skills, and
/// certification rows. Never stored.
#[derive(Debug, Clone)]
pub struct TalentCandidate {
    pub id: Uuid,
    pub full_name: String,
    pub years_experience: i32,
    pub location: Option<String>,
    pub availability_status: String,
    pub skills: Vec<TalentSkill>,
    pub certifications: Vec<TalentCertification>,
    /// Populated only when both the job and the talent have coordinates.
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TalentRow {
    pub id: Uuid,
    pub full_name: String,
    pub years_experience: i32,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub availability_status: String,
}

#[derive(sqlx::FromRow)]
struct SkillRow {
    talent_id: Uuid,
    skill_name: String,
    skill_level: String,
    industry: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CertificationRow {
    talent_id: Uuid,
    certification_name: String,
    issuer: Option<String>,
}

pub fn is_matchable_availability(status: &str) -> bool {
    matches!(status, "available" | "open_to_offers")
}

/// Candidates with unknown distance are never dropped by the distance filter.
pub fn within_max_distance(max_distance_km: Option<f64>, distance_km: Option<f64>) -> bool {
    match (max_distance_km, distance_km) {
        (Some(max), Some(distance)) => distance <= max,
        _ => true,
    }
}

fn compute_distance(job: &JobRecord, row: &TalentRow) -> Option<f64> {
    match (job.latitude, job.longitude, row.latitude, row.longitude) {
        (Some(job_lat), Some(job_lon), Some(lat), Some(lon)) => {
            Some(haversine_km(job_lat, job_lon, lat, lon))
        }
        _ => None,
    }
}

/// Apply the hard filters to a page of talent rows: availability, experience
/// bracket for the job's level, and the optional max-distance cutoff.
/// Preserves input order.
pub fn filter_rows(
    job: &JobRecord,
    prefs: &MatchingPreferences,
    rows: &[TalentRow],
) -> Vec<(TalentRow, Option<f64>)> {
    let level = ExperienceLevel::parse(&job.experience_level);

    rows.iter()
        .filter(|row| is_matchable_availability(&row.availability_status))
        .filter(|row| match level {
            Some(level) => level.matches_years(row.years_experience),
            None => true,
        })
        .filter_map(|row| {
            let distance = compute_distance(job, row);
            within_max_distance(prefs.max_distance_km, distance)
                .then(|| (row.clone(), distance))
        })
        .collect()
}

/// Query the talent pool for a job and assemble the surviving candidates.
/// An empty result is a valid terminal state, not an error.
pub async fn fetch_candidates(
    pool: &PgPool,
    job: &JobRecord,
    prefs: &MatchingPreferences,
) -> Result<Vec<TalentCandidate>> {
    let rows = sqlx::query_as::<_, TalentRow>(
        "SELECT id, full_name, years_experience, location, latitude, longitude, availability_status \
         FROM talents \
         WHERE user_type = 'talent' AND availability_status IN ('available', 'open_to_offers') \
         ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await
    .context("failed to query talent pool")?;

    let surviving = filter_rows(job, prefs, &rows);
    if surviving.is_empty() {
        return Ok(Vec::new());
    }

    let talent_ids: Vec<Uuid> = surviving.iter().map(|(row, _)| row.id).collect();

    let skill_rows = sqlx::query_as::<_, SkillRow>(
        "SELECT talent_id, skill_name, skill_level, industry \
         FROM talent_skills WHERE talent_id = ANY($1)",
    )
    .bind(&talent_ids)
    .fetch_all(pool)
    .await
    .context("failed to query talent skills")?;

    let certification_rows = sqlx::query_as::<_, CertificationRow>(
        "SELECT talent_id, certification_name, issuer \
         FROM talent_certifications WHERE talent_id = ANY($1)",
    )
    .bind(&talent_ids)
    .fetch_all(pool)
    .await
    .context("failed to query talent certifications")?;

    let mut skills_by_talent: HashMap<Uuid, Vec<TalentSkill>> = HashMap::new();
    for row in skill_rows {
        skills_by_talent
            .entry(row.talent_id)
            .or_default()
            .push(TalentSkill {
                name: row.skill_name,
                level: row.skill_level,
                industry: row.industry,
            });
    }

    let mut certifications_by_talent: HashMap<Uuid, Vec<TalentCertification>> = HashMap::new();
    for row in certification_rows {
        certifications_by_talent
            .entry(row.talent_id)
            .or_default()
            .push(TalentCertification {
                name: row.certification_name,
                issuer: row.issuer,
            });
    }

    let candidates = surviving
        .into_iter()
        .map(|(row, distance_km)| TalentCandidate {
            id: row.id,
            full_name: row.full_name,
            years_experience: row.years_experience,
            location: row.location,
            availability_status: row.availability_status,
            skills: skills_by_talent.remove(&row.id).unwrap_or_default(),
            certifications: certifications_by_talent.remove(&row.id).unwrap_or_default(),
            distance_km,
        })
        .collect();

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with(level: &str, coords: Option<(f64, f64)>) -> JobRecord {
        JobRecord {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            title: "Senior Driller".to_string(),
            description: "Offshore rotation".to_string(),
            required_skills: vec!["Drilling".to_string()],
            required_certifications: vec![],
            experience_level: level.to_string(),
            location: Some("Aberdeen, UK".to_string()),
            latitude: coords.map(|(lat, _)| lat),
            longitude: coords.map(|(_, lon)| lon),
            job_type: Some("contract".to_string()),
        }
    }

    fn talent_with(years: i32, availability: &str, coords: Option<(f64, f64)>) -> TalentRow {
        TalentRow {
            id: Uuid::new_v4(),
            full_name: "Test Talent".to_string(),
            years_experience: years,
            location: None,
            latitude: coords.map(|(lat, _)| lat),
            longitude: coords.map(|(_, lon)| lon),
            availability_status: availability.to_string(),
        }
    }

    #[test]
    fn experience_brackets_overlap_as_documented() {
        let cases = [
            (ExperienceLevel::Entry, 0, true),
            (ExperienceLevel::Entry, 3, true),
            (ExperienceLevel::Entry, 4, false),
            (ExperienceLevel::Mid, 1, false),
            (ExperienceLevel::Mid, 2, true),
            (ExperienceLevel::Mid, 7, true),
            (ExperienceLevel::Mid, 8, false),
            (ExperienceLevel::Senior, 4, false),
            (ExperienceLevel::Senior, 5, true),
            (ExperienceLevel::Senior, 30, true),
        ];
        for (level, years, expected) in cases {
            assert_eq!(level.matches_years(years), expected, "{level:?} / {years}");
        }
    }

    #[test]
    fn unknown_experience_level_disables_bracket_filter() {
        let job = job_with("expert", None);
        let rows = vec![talent_with(0, "available", None), talent_with(40, "available", None)];
        assert_eq!(filter_rows(&job, &MatchingPreferences::default(), &rows).len(), 2);
    }

    #[test]
    fn availability_gate_rejects_unavailable_talent() {
        let job = job_with("senior", None);
        let rows = vec![
            talent_with(10, "available", None),
            talent_with(10, "open_to_offers", None),
            talent_with(10, "not_available", None),
            talent_with(10, "employed", None),
        ];
        let kept = filter_rows(&job, &MatchingPreferences::default(), &rows);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn senior_bracket_drops_junior_candidate() {
        let job = job_with("senior", None);
        let rows = vec![talent_with(8, "available", None), talent_with(1, "available", None)];
        let kept = filter_rows(&job, &MatchingPreferences::default(), &rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0.years_experience, 8);
    }

    #[test]
    fn distance_cutoff_spares_candidates_with_unknown_distance() {
        // Job in Aberdeen; one candidate in Stavanger (~480 km), one nearby,
        // one with no coordinates at all.
        let job = job_with("senior", Some((57.1497, -2.0943)));
        let prefs = MatchingPreferences {
            max_distance_km: Some(100.0),
            ..MatchingPreferences::default()
        };
        let far = talent_with(10, "available", Some((58.9700, 5.7331)));
        let near = talent_with(10, "available", Some((57.4778, -4.2247)));
        let unknown = talent_with(10, "available", None);

        let kept = filter_rows(&job, &prefs, &[far, near.clone(), unknown.clone()]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].0.id, near.id);
        assert!(kept[0].1.is_some());
        assert_eq!(kept[1].0.id, unknown.id);
        assert!(kept[1].1.is_none());
    }

    #[test]
    fn no_distance_cutoff_keeps_everyone_but_still_computes_distance() {
        let job = job_with("senior", Some((57.1497, -2.0943)));
        let far = talent_with(10, "available", Some((58.9700, 5.7331)));
        let kept = filter_rows(&job, &MatchingPreferences::default(), &[far]);
        assert_eq!(kept.len(), 1);
        let distance = kept[0].1.expect("distance should be computed");
        assert!(distance > 400.0);
    }
}
