use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::matching::JobRecord;
use crate::matching::oracle::{CandidateEvaluation, MatchOracle, OracleError};
use crate::matching::prefilter::TalentCandidate;

/// Oracle result that cleared the threshold gate.
#[derive(Debug)]
pub struct AcceptedMatch {
    pub talent_id: Uuid,
    pub talent_name: String,
    pub evaluation: CandidateEvaluation,
}

#[derive(Debug, Default)]
pub struct ScoringOutcome {
    pub accepted: Vec<AcceptedMatch>,
    /// Candidates for which an oracle call was issued, including calls that
    /// failed or scored below threshold. Drives the run's cost estimate.
    pub candidates_analyzed: usize,
    /// Set when the provider reported its quota exhausted mid-run; the
    /// remaining candidates were not analyzed.
    pub oracle_exhausted: bool,
}

/// Score the shortlisted candidates one at a time, in order. Sequential on
/// purpose: the blocking round-trips act as the rate limiter, and the loop
/// can stop early when the provider's quota runs out.
pub async fn score_candidates<O: MatchOracle>(
    oracle: &O,
    job: &JobRecord,
    candidates: &[TalentCandidate],
    min_match_score: i32,
) -> ScoringOutcome {
    let mut outcome = ScoringOutcome::default();

    for candidate in candidates {
        let prompt = crate::matching::oracle::build_scoring_prompt(job, candidate);
        outcome.candidates_analyzed += 1;

        match oracle.evaluate(&prompt).await {
            Ok(evaluation) => {
                if evaluation.match_score >= min_match_score {
                    outcome.accepted.push(AcceptedMatch {
                        talent_id: candidate.id,
                        talent_name: candidate.full_name.clone(),
                        evaluation,
                    });
                } else {
                    debug!(
                        job_id = %job.id,
                        talent_id = %candidate.id,
                        score = evaluation.match_score,
                        threshold = min_match_score,
                        "candidate scored below threshold"
                    );
                }
            }
            Err(OracleError::RateLimited) => {
                warn!(
                    job_id = %job.id,
                    talent_id = %candidate.id,
                    "oracle rate limited, skipping candidate"
                );
            }
            Err(OracleError::QuotaExhausted) => {
                error!(
                    job_id = %job.id,
                    talent_id = %candidate.id,
                    "oracle quota exhausted, aborting remaining candidates"
                );
                outcome.oracle_exhausted = true;
                break;
            }
            Err(OracleError::Malformed(detail)) => {
                warn!(
                    job_id = %job.id,
                    talent_id = %candidate.id,
                    detail,
                    "oracle returned malformed evaluation, skipping candidate"
                );
            }
            Err(OracleError::Failed(err)) => {
                error!(
                    ?err,
                    job_id = %job.id,
                    talent_id = %candidate.id,
                    "oracle call failed, skipping candidate"
                );
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use uuid::Uuid;

    use super::*;
    use crate::matching::oracle::ExperienceFit;

    struct FakeOracle {
        outcomes: Mutex<VecDeque<Result<CandidateEvaluation, OracleError>>>,
        calls: AtomicUsize,
    }

    impl FakeOracle {
        fn new(outcomes: Vec<Result<CandidateEvaluation, OracleError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MatchOracle for FakeOracle {
        async fn evaluate(&self, _prompt: &str) -> Result<CandidateEvaluation, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("oracle invoked more times than scripted")
        }
    }

    fn evaluation(score: i32) -> CandidateEvaluation {
        CandidateEvaluation {
            match_score: score,
            reasoning: "scripted".to_string(),
            skills_matched: vec![],
            skills_missing: vec![],
            certifications_matched: vec![],
            certifications_missing: vec![],
            experience_fit: ExperienceFit::GoodFit,
            location_score: 50,
        }
    }

    fn job() -> JobRecord {
        JobRecord {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            title: "Senior Driller".to_string(),
            description: String::new(),
            required_skills: vec![],
            required_certifications: vec![],
            experience_level: "senior".to_string(),
            location: None,
            latitude: None,
            longitude: None,
            job_type: None,
        }
    }

    fn candidates(count: usize) -> Vec<TalentCandidate> {
        (0..count)
            .map(|i| TalentCandidate {
                id: Uuid::new_v4(),
                full_name: format!("candidate-{i}"),
                years_experience: 10,
                location: None,
                availability_status: "available".to_string(),
                skills: vec![],
                certifications: vec![],
                distance_km: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn threshold_gate_accepts_at_and_above_only() {
        let oracle = FakeOracle::new(vec![
            Ok(evaluation(70)),
            Ok(evaluation(69)),
            Ok(evaluation(95)),
        ]);
        let pool = candidates(3);

        let outcome = score_candidates(&oracle, &job(), &pool, 70).await;

        assert_eq!(outcome.candidates_analyzed, 3);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.accepted[0].talent_id, pool[0].id);
        assert_eq!(outcome.accepted[0].evaluation.match_score, 70);
        assert_eq!(outcome.accepted[1].talent_id, pool[2].id);
        assert!(!outcome.oracle_exhausted);
    }

    #[tokio::test]
    async fn below_threshold_run_completes_with_zero_matches() {
        let oracle = FakeOracle::new(vec![Ok(evaluation(65))]);
        let outcome = score_candidates(&oracle, &job(), &candidates(1), 70).await;

        assert_eq!(outcome.candidates_analyzed, 1);
        assert!(outcome.accepted.is_empty());
        assert!(!outcome.oracle_exhausted);
    }

    #[tokio::test]
    async fn rate_limit_skips_candidate_and_continues() {
        let oracle = FakeOracle::new(vec![
            Err(OracleError::RateLimited),
            Ok(evaluation(90)),
        ]);
        let pool = candidates(2);

        let outcome = score_candidates(&oracle, &job(), &pool, 70).await;

        assert_eq!(oracle.calls(), 2);
        assert_eq!(outcome.candidates_analyzed, 2);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].talent_id, pool[1].id);
    }

    #[tokio::test]
    async fn quota_exhaustion_aborts_remaining_candidates() {
        let oracle = FakeOracle::new(vec![Err(OracleError::QuotaExhausted)]);
        let outcome = score_candidates(&oracle, &job(), &candidates(3), 70).await;

        assert_eq!(oracle.calls(), 1);
        assert_eq!(outcome.candidates_analyzed, 1);
        assert!(outcome.accepted.is_empty());
        assert!(outcome.oracle_exhausted);
    }

    #[tokio::test]
    async fn quota_exhaustion_keeps_earlier_accepted_matches() {
        let oracle = FakeOracle::new(vec![
            Ok(evaluation(88)),
            Err(OracleError::QuotaExhausted),
        ]);
        let pool = candidates(3);

        let outcome = score_candidates(&oracle, &job(), &pool, 70).await;

        assert_eq!(oracle.calls(), 2);
        assert_eq!(outcome.candidates_analyzed, 2);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].talent_id, pool[0].id);
        assert!(outcome.oracle_exhausted);
    }

    #[tokio::test]
    async fn malformed_and_failed_responses_skip_without_aborting() {
        let oracle = FakeOracle::new(vec![
            Err(OracleError::Malformed("not json".to_string())),
            Err(OracleError::Failed(anyhow!("http 500"))),
            Ok(evaluation(75)),
        ]);

        let outcome = score_candidates(&oracle, &job(), &candidates(3), 70).await;

        assert_eq!(outcome.candidates_analyzed, 3);
        assert_eq!(outcome.accepted.len(), 1);
        assert!(!outcome.oracle_exhausted);
    }

    #[tokio::test]
    async fn empty_shortlist_issues_no_oracle_calls() {
        let oracle = FakeOracle::new(vec![]);
        let outcome = score_candidates(&oracle, &job(), &[], 70).await;

        assert_eq!(oracle.calls(), 0);
        assert_eq!(outcome.candidates_analyzed, 0);
        assert!(outcome.accepted.is_empty());
    }
}
