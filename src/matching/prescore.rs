use crate::matching::prefilter::TalentCandidate;

/// Upper bound on candidates forwarded to the oracle stage.
pub const MAX_ORACLE_CANDIDATES: usize = 15;

/// Score given to every candidate when the job lists no required skills.
const NEUTRAL_SCORE: i32 = 50;

/// Cheap lexical overlap between the job's required skills and a candidate's
/// skill names. Deliberately permissive: case-insensitive, and a requirement
/// counts as matched when either string contains the other.
pub fn skill_overlap_score(required_skills: &[String], candidate: &TalentCandidate) -> i32 {
    if required_skills.is_empty() {
        return NEUTRAL_SCORE;
    }

    let candidate_skills: Vec<String> = candidate
        .skills
        .iter()
        .map(|skill| skill.name.to_lowercase())
        .collect();

    let matched = required_skills
        .iter()
        .map(|required| required.to_lowercase())
        .filter(|required| {
            candidate_skills
                .iter()
                .any(|skill| skill.contains(required.as_str()) || required.contains(skill.as_str()))
        })
        .count();

    ((matched as f64 / required_skills.len() as f64) * 100.0).round() as i32
}

/// Rank candidates by preliminary score (descending, stable so ties keep the
/// original query order) and truncate to the oracle budget. The preliminary
/// score is discarded here; only the ordering survives.
pub fn rank_and_truncate(
    required_skills: &[String],
    candidates: Vec<TalentCandidate>,
) -> Vec<TalentCandidate> {
    let mut scored: Vec<(i32, TalentCandidate)> = candidates
        .into_iter()
        .map(|candidate| (skill_overlap_score(required_skills, &candidate), candidate))
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(MAX_ORACLE_CANDIDATES);
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}
