use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::{validate_record, CrisisRecord};
use crate::error::AppError;

/// Similarity metric recorded for a provisioned index. Only cosine is
/// supported; the metadata exists so a misconfigured index is detected
/// instead of silently producing wrong rankings.
pub const METRIC_COSINE: &str = "cosine";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMeta {
    pub name: String,
    pub dims: u32,
    pub metric: String,
    pub created_at: String,
}

/// A record paired with its similarity/overlap score for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: CrisisRecord,
    pub score: f32,
}

pub fn provision_index(conn: &Connection, name: &str, dims: u32) -> Result<IndexMeta, AppError> {
    if dims == 0 {
        return Err(AppError::new(
            "CONFIG_INVALID",
            "Vector index dimension must be positive",
        ));
    }
    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| {
            AppError::new("DB_INSERT_FAILED", "Failed to format index timestamp")
                .with_details(e.to_string())
        })?;
    conn.execute(
        "INSERT OR REPLACE INTO index_meta(name, dims, metric, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![name, dims, METRIC_COSINE, created_at],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to provision vector index")
            .with_details(e.to_string())
    })?;
    Ok(IndexMeta {
        name: name.to_string(),
        dims,
        metric: METRIC_COSINE.to_string(),
        created_at,
    })
}

pub fn get_index_meta(conn: &Connection, name: &str) -> Result<Option<IndexMeta>, AppError> {
    let mut stmt = conn
        .prepare("SELECT name, dims, metric, created_at FROM index_meta WHERE name = ?1")
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare index meta query")
                .with_details(e.to_string())
        })?;

    let mut rows = stmt
        .query_map([name], |row| {
            Ok(IndexMeta {
                name: row.get(0)?,
                dims: row.get(1)?,
                metric: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query index meta")
                .with_details(e.to_string())
        })?;

    match rows.next() {
        None => Ok(None),
        Some(r) => r.map(Some).map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode index meta row")
                .with_details(e.to_string())
        }),
    }
}

pub fn insert_record(conn: &Connection, record: &CrisisRecord, dims: u32) -> Result<(), AppError> {
    validate_record(record, dims)?;
    let embedding = serde_json::to_string(&record.embedding).map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to encode record embedding")
            .with_details(format!("id={}; err={}", record.id, e))
    })?;
    conn.execute(
        r#"
      INSERT OR REPLACE INTO crisis_records
        (id, title, summary, text, location, category, source, event_date, embedding)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
      "#,
        rusqlite::params![
            record.id,
            record.title,
            record.summary,
            record.text,
            record.location,
            record.category,
            record.source,
            record.date,
            embedding,
        ],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to insert crisis record")
            .with_details(format!("id={}; err={}", record.id, e))
    })?;
    Ok(())
}

pub fn count_records(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("SELECT COUNT(*) FROM crisis_records", [], |row| row.get(0))
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to count crisis records")
                .with_details(e.to_string())
        })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(CrisisRecord, String)> {
    let embedding_json: String = row.get(8)?;
    Ok((
        CrisisRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            summary: row.get(2)?,
            text: row.get(3)?,
            location: row.get(4)?,
            category: row.get(5)?,
            source: row.get(6)?,
            date: row.get(7)?,
            embedding: Vec::new(),
        },
        embedding_json,
    ))
}

fn load_all_records(conn: &Connection) -> Result<Vec<CrisisRecord>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, title, summary, text, location, category, source, event_date, embedding
      FROM crisis_records
      ORDER BY id ASC
      "#,
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare crisis records query")
                .with_details(e.to_string())
        })?;

    let rows = stmt.query_map([], record_from_row).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to query crisis records")
            .with_details(e.to_string())
    })?;

    let mut out = Vec::new();
    for r in rows {
        let (mut record, embedding_json) = r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode crisis record row")
                .with_details(e.to_string())
        })?;
        record.embedding = serde_json::from_str(&embedding_json).map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode stored embedding")
                .with_details(format!("id={}; err={}", record.id, e))
        })?;
        out.push(record);
    }
    Ok(out)
}

pub fn get_record(conn: &Connection, id: &str) -> Result<CrisisRecord, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, title, summary, text, location, category, source, event_date, embedding
      FROM crisis_records
      WHERE id = ?1
      "#,
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare crisis record query")
                .with_details(e.to_string())
        })?;

    let (mut record, embedding_json) = stmt
        .query_row([id], record_from_row)
        .map_err(|e| AppError::new("DB_NOT_FOUND", "Crisis record not found").with_details(e.to_string()))?;
    record.embedding = serde_json::from_str(&embedding_json).map_err(|e| {
        AppError::new("DB_QUERY_FAILED", "Failed to decode stored embedding")
            .with_details(format!("id={}; err={}", record.id, e))
    })?;
    Ok(record)
}

/// Vector similarity lookup over every stored record.
///
/// Fails with RETRIEVAL_FAILED when the named index is missing or its
/// metadata disagrees with the query (dimension, metric); that is the
/// caller's signal to fall back to the keyword tier. An empty result is Ok.
pub fn vector_search(
    conn: &Connection,
    index_name: &str,
    query_vec: &[f32],
    k: u32,
    floor: Option<f32>,
) -> Result<Vec<ScoredRecord>, AppError> {
    let meta = get_index_meta(conn, index_name)?.ok_or_else(|| {
        AppError::new("RETRIEVAL_FAILED", "Vector index missing or not ready")
            .with_details(format!("index={index_name}"))
    })?;
    if meta.metric != METRIC_COSINE {
        return Err(AppError::new(
            "RETRIEVAL_FAILED",
            "Vector index metric is not cosine",
        )
        .with_details(format!("index={index_name}; metric={}", meta.metric)));
    }
    if query_vec.len() as u32 != meta.dims {
        return Err(AppError::new(
            "RETRIEVAL_FAILED",
            "Query embedding dims do not match index dims",
        )
        .with_details(format!("index_dims={}; query_dims={}", meta.dims, query_vec.len())));
    }

    let qnorm = l2_norm(query_vec);
    if qnorm == 0.0 {
        return Err(AppError::new(
            "RETRIEVAL_FAILED",
            "Query embedding norm is zero",
        ));
    }

    let mut hits: Vec<ScoredRecord> = Vec::new();
    for record in load_all_records(conn)? {
        if record.embedding.len() as u32 != meta.dims {
            return Err(AppError::new(
                "RETRIEVAL_FAILED",
                "Stored embedding dims mismatch",
            )
            .with_details(format!(
                "id={}; expected={}; got={}",
                record.id,
                meta.dims,
                record.embedding.len()
            )));
        }
        let vnorm = l2_norm(&record.embedding);
        if vnorm == 0.0 {
            continue;
        }
        let score = cosine_similarity(query_vec, &record.embedding, qnorm, vnorm);
        if let Some(min) = floor {
            if score < min {
                continue;
            }
        }
        hits.push(ScoredRecord { record, score });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.record.id.cmp(&b.record.id))
    });
    hits.truncate(k as usize);
    Ok(hits)
}

/// Lexical fallback lookup: descending term-overlap count over
/// title/summary/text, record id ascending as tie-break.
pub fn keyword_search(conn: &Connection, query: &str, k: u32) -> Result<Vec<ScoredRecord>, AppError> {
    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits: Vec<ScoredRecord> = Vec::new();
    for record in load_all_records(conn)? {
        let haystack = format!("{} {} {}", record.title, record.summary, record.text).to_lowercase();
        let overlap = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
        if overlap == 0 {
            continue;
        }
        hits.push(ScoredRecord {
            record,
            score: overlap as f32,
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.record.id.cmp(&b.record.id))
    });
    hits.truncate(k as usize);
    Ok(hits)
}

fn l2_norm(v: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for x in v {
        sum += x * x;
    }
    sum.sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    let mut dot = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
    }
    dot / (a_norm * b_norm)
}
