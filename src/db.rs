use crate::types::{ScoringResult, VehicleOutcome};
use rusqlite::{params, Connection, OptionalExtension, Result, NO_PARAMS};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS post (
            id INTEGER PRIMARY KEY,
            image BLOB NOT NULL,
            plate_number TEXT,
            score REAL NOT NULL,
            raw_score REAL,
            vehicle_found INTEGER NOT NULL,
            vehicle_type TEXT,
            vehicle_confidence REAL,
            vehicle_attributes TEXT,
            created REAL NOT NULL
        )",
        NO_PARAMS,
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS post_plate ON post(plate_number)",
        NO_PARAMS,
    )?;
    Ok(())
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PostInfo {
    pub id: i64,
    pub score: f64,
    pub raw_score: Option<f64>,
    pub vehicle_found: bool,
    pub vehicle_type: Option<String>,
    pub vehicle_confidence: Option<f64>,
    pub vehicle_attributes: Option<Value>,
    pub plate_number: Option<String>,
    pub created: f64,
}

/// Inserts a post for a scoring run; returns its id.
pub fn insert_post(conn: &Connection, image: &[u8], result: &ScoringResult) -> Result<i64> {
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let (raw_score, vehicle_type, vehicle_confidence, vehicle_attributes) = match &result.vehicle
    {
        VehicleOutcome::Found { raw, detection, .. } => (
            Some(*raw),
            Some(detection.class_label.as_str()),
            Some(detection.confidence),
            Some(Value::Object(detection.attributes.clone()).to_string()),
        ),
        VehicleOutcome::NoVehicleDetected => (None, None, None, None),
    };
    conn.execute(
        "INSERT INTO post(image, plate_number, score, raw_score, vehicle_found,
                          vehicle_type, vehicle_confidence, vehicle_attributes, created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            image,
            result.plate_text,
            result.score_value(),
            raw_score,
            result.vehicle_found(),
            vehicle_type,
            vehicle_confidence,
            vehicle_attributes,
            created
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn post_image(conn: &Connection, id: i64) -> Result<Option<Vec<u8>>> {
    conn.query_row("SELECT image FROM post WHERE id = ?1", params![id], |row| {
        row.get(0)
    })
    .optional()
}

pub fn post_info(conn: &Connection, id: i64) -> Result<Option<PostInfo>> {
    conn.query_row(
        "SELECT id, score, raw_score, vehicle_found, vehicle_type, vehicle_confidence,
                vehicle_attributes, plate_number, created
         FROM post WHERE id = ?1",
        params![id],
        |row| {
            let attributes: Option<String> = row.get(6)?;
            Ok(PostInfo {
                id: row.get(0)?,
                score: row.get(1)?,
                raw_score: row.get(2)?,
                vehicle_found: row.get(3)?,
                vehicle_type: row.get(4)?,
                vehicle_confidence: row.get(5)?,
                vehicle_attributes: attributes.and_then(|a| serde_json::from_str(&a).ok()),
                plate_number: row.get(7)?,
                created: row.get(8)?,
            })
        },
    )
    .optional()
}

pub fn recent_post_id(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM post ORDER BY id DESC LIMIT 1",
        NO_PARAMS,
        |row| row.get(0),
    )
    .optional()
}

pub fn post_ids_for_plate(conn: &Connection, plate: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM post WHERE plate_number = ?1 ORDER BY id")?;
    let ids = stmt.query_map(params![plate], |row| row.get(0))?;
    ids.collect()
}
