use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, parse_ts, DatabaseError, Store};
use crate::domain::{Difficulty, Scenario, ScenarioSource};

const TABLE: &str = "scenarios";

const SELECT_COLUMNS: &str =
    "SELECT id, title, description, category, difficulty, source, created_at, updated_at FROM scenarios";

type ScenarioRow = (String, String, String, String, String, String, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<ScenarioRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_scenario(row: ScenarioRow) -> Result<Scenario, DatabaseError> {
    let (id, title, description, category, difficulty, source, created_at, updated_at) = row;
    let corrupt = |reason: String| DatabaseError::Corrupt { table: TABLE, reason };
    Ok(Scenario {
        difficulty: difficulty.parse::<Difficulty>().map_err(|e| corrupt(e.to_string()))?,
        source: source.parse::<ScenarioSource>().map_err(corrupt)?,
        created_at: parse_ts(TABLE, &created_at)?,
        updated_at: parse_ts(TABLE, &updated_at)?,
        id,
        title,
        description,
        category,
    })
}

impl Store {
    pub fn insert_scenario(&self, s: &Scenario) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT INTO scenarios (id, title, description, category, difficulty, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                s.id,
                s.title,
                s.description,
                s.category,
                s.difficulty.as_str(),
                s.source.as_str(),
                format_ts(&s.created_at),
                format_ts(&s.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_scenario(&self, id: &str) -> Result<Option<Scenario>, DatabaseError> {
        let row = self
            .conn()?
            .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], read_row)
            .optional()?;
        row.map(into_scenario).transpose()
    }

    pub fn scenario_exists(&self, id: &str) -> Result<bool, DatabaseError> {
        let found = self
            .conn()?
            .query_row("SELECT 1 FROM scenarios WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Distinct categories present in the table, sorted.
    pub fn distinct_categories(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT category FROM scenarios ORDER BY category")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
