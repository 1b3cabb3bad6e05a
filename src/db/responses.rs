use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, parse_ts, DatabaseError, Store};
use crate::domain::{Evaluation, EvaluationSource, Response, Score};

const TABLE: &str = "responses";

const SELECT_COLUMNS: &str = "SELECT id, scenario_id, response_text, score, feedback,
        empathy_score, clarity_score, professionalism_score, medical_accuracy_score,
        improvement_suggestions, evaluation_source, evaluated_at, submitted_at, updated_at
     FROM responses";

struct ResponseRow {
    id: String,
    scenario_id: String,
    response_text: String,
    score: Option<f64>,
    feedback: Option<String>,
    empathy: Option<f64>,
    clarity: Option<f64>,
    professionalism: Option<f64>,
    medical_accuracy: Option<f64>,
    suggestions: Option<String>,
    evaluation_source: Option<String>,
    evaluated_at: Option<String>,
    submitted_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<ResponseRow> {
    Ok(ResponseRow {
        id: row.get(0)?,
        scenario_id: row.get(1)?,
        response_text: row.get(2)?,
        score: row.get(3)?,
        feedback: row.get(4)?,
        empathy: row.get(5)?,
        clarity: row.get(6)?,
        professionalism: row.get(7)?,
        medical_accuracy: row.get(8)?,
        suggestions: row.get(9)?,
        evaluation_source: row.get(10)?,
        evaluated_at: row.get(11)?,
        submitted_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn corrupt(reason: impl Into<String>) -> DatabaseError {
    DatabaseError::Corrupt { table: TABLE, reason: reason.into() }
}

fn score_column(name: &str, v: f64) -> Result<Score, DatabaseError> {
    Score::new(v).ok_or_else(|| corrupt(format!("{name} {v} outside 1-10")))
}

fn into_response(r: ResponseRow) -> Result<Response, DatabaseError> {
    let evaluation = match r.score {
        None => None,
        Some(overall) => {
            let overall = score_column("score", overall)?;
            // Sub-scores default to the overall score when a row predates them.
            let sub = |name: &str, v: Option<f64>| v.map(|v| score_column(name, v)).unwrap_or(Ok(overall));
            let suggestions: Vec<String> = match r.suggestions.as_deref() {
                Some(raw) => serde_json::from_str(raw).map_err(|e| corrupt(format!("improvement_suggestions: {e}")))?,
                None => Vec::new(),
            };
            let source = match r.evaluation_source.as_deref() {
                Some(s) => s.parse::<EvaluationSource>().map_err(corrupt)?,
                None => EvaluationSource::Model,
            };
            let evaluated_at = match r.evaluated_at.as_deref() {
                Some(raw) => parse_ts(TABLE, raw)?,
                None => parse_ts(TABLE, &r.updated_at)?,
            };
            Some(Evaluation {
                overall_score: overall,
                empathy_score: sub("empathy_score", r.empathy)?,
                clarity_score: sub("clarity_score", r.clarity)?,
                professionalism_score: sub("professionalism_score", r.professionalism)?,
                medical_accuracy_score: sub("medical_accuracy_score", r.medical_accuracy)?,
                feedback: r.feedback.unwrap_or_default(),
                improvement_suggestions: suggestions,
                source,
                evaluated_at,
            })
        }
    };

    Ok(Response {
        id: r.id,
        scenario_id: r.scenario_id,
        response_text: r.response_text,
        evaluation,
        submitted_at: parse_ts(TABLE, &r.submitted_at)?,
        updated_at: parse_ts(TABLE, &r.updated_at)?,
    })
}

impl Store {
    /// Insert a fresh, unevaluated response. The foreign key rejects unknown scenarios.
    pub fn insert_response(&self, r: &Response) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT INTO responses (id, scenario_id, response_text, submitted_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                r.id,
                r.scenario_id,
                r.response_text,
                format_ts(&r.submitted_at),
                format_ts(&r.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_response(&self, id: &str) -> Result<Option<Response>, DatabaseError> {
        let row = self
            .conn()?
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], read_row)
            .optional()?;
        row.map(into_response).transpose()
    }

    /// Newest first.
    pub fn list_responses_for_scenario(&self, scenario_id: &str, limit: u32) -> Result<Vec<Response>, DatabaseError> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE scenario_id = ?1 ORDER BY submitted_at DESC, rowid DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![scenario_id, limit], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(into_response).collect()
    }

    /// Attach an evaluation to a response that has none yet.
    ///
    /// Returns `false` when the response is unknown or already evaluated; the
    /// stored evaluation is never overwritten.
    pub fn record_evaluation(&self, response_id: &str, e: &Evaluation) -> Result<bool, DatabaseError> {
        let suggestions = serde_json::to_string(&e.improvement_suggestions)
            .map_err(|err| corrupt(format!("improvement_suggestions: {err}")))?;
        let changed = self.conn()?.execute(
            "UPDATE responses SET
                score = ?2, feedback = ?3,
                empathy_score = ?4, clarity_score = ?5, professionalism_score = ?6, medical_accuracy_score = ?7,
                improvement_suggestions = ?8, evaluation_source = ?9, evaluated_at = ?10, updated_at = ?10
             WHERE id = ?1 AND score IS NULL",
            params![
                response_id,
                e.overall_score.value(),
                e.feedback,
                e.empathy_score.value(),
                e.clarity_score.value(),
                e.professionalism_score.value(),
                e.medical_accuracy_score.value(),
                suggestions,
                e.source.as_str(),
                format_ts(&e.evaluated_at),
            ],
        )?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{now, Difficulty, Scenario, ScenarioSource};
    use chrono::Duration;

    fn store_with_scenario() -> Store {
        let store = Store::open_in_memory().unwrap();
        let ts = now();
        store
            .insert_scenario(&Scenario {
                id: "s-1".into(),
                title: "Anxious patient".into(),
                description: "Calm a patient before surgery.".into(),
                category: "routine".into(),
                difficulty: Difficulty::Beginner,
                source: ScenarioSource::Fallback,
                created_at: ts,
                updated_at: ts,
            })
            .unwrap();
        store
    }

    fn response(id: &str, offset_secs: i64) -> Response {
        let ts = now() + Duration::seconds(offset_secs);
        Response {
            id: id.into(),
            scenario_id: "s-1".into(),
            response_text: "I hear that you are worried; let us go through it together.".into(),
            evaluation: None,
            submitted_at: ts,
            updated_at: ts,
        }
    }

    fn evaluation(score: f64) -> Evaluation {
        let s = Score::new(score).unwrap();
        Evaluation {
            overall_score: s,
            empathy_score: Score::new(9.0).unwrap(),
            clarity_score: s,
            professionalism_score: s,
            medical_accuracy_score: Score::new(6.5).unwrap(),
            feedback: "Warm and clear.".into(),
            improvement_suggestions: vec!["Check understanding".into(), "Offer a leaflet".into()],
            source: EvaluationSource::Model,
            evaluated_at: now(),
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = store_with_scenario();
        let r = response("r-1", 0);
        store.insert_response(&r).unwrap();
        let got = store.get_response("r-1").unwrap().unwrap();
        assert_eq!(got, r);
        assert_eq!(got.score(), None);
        assert_eq!(got.feedback(), None);
    }

    #[test]
    fn foreign_key_rejects_unknown_scenario() {
        let store = store_with_scenario();
        let mut r = response("r-1", 0);
        r.scenario_id = "nope".into();
        assert!(store.insert_response(&r).is_err());
    }

    #[test]
    fn evaluation_is_written_once() {
        let store = store_with_scenario();
        store.insert_response(&response("r-1", 0)).unwrap();

        let first = evaluation(8.0);
        assert!(store.record_evaluation("r-1", &first).unwrap());
        assert!(!store.record_evaluation("r-1", &evaluation(2.0)).unwrap());

        let got = store.get_response("r-1").unwrap().unwrap();
        assert_eq!(got.evaluation, Some(first));
        assert_eq!(got.score(), Some(8.0));
        assert_eq!(got.feedback(), Some("Warm and clear."));
    }

    #[test]
    fn evaluating_unknown_response_writes_nothing() {
        let store = store_with_scenario();
        assert!(!store.record_evaluation("ghost", &evaluation(5.0)).unwrap());
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let store = store_with_scenario();
        for (i, id) in ["r-old", "r-mid", "r-new"].iter().enumerate() {
            store.insert_response(&response(id, i as i64)).unwrap();
        }
        let ids: Vec<String> = store
            .list_responses_for_scenario("s-1", 2)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["r-new", "r-mid"]);
        assert!(store.list_responses_for_scenario("other", 10).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_score_is_rejected_by_schema() {
        let store = store_with_scenario();
        store.insert_response(&response("r-1", 0)).unwrap();
        let conn = store.conn().unwrap();
        let res = conn.execute("UPDATE responses SET score = 11.0 WHERE id = 'r-1'", []);
        assert!(res.is_err());
    }
}
