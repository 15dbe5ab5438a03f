// src/history/store.rs

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::debug;

use crate::errors::Result;
use crate::model::now_ts;

/// Terminal (or queued) status of one attempt as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Queued,
    Done,
    Failed,
    Quarantined,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStatus::Queued => "queued",
            RecordStatus::Done => "done",
            RecordStatus::Failed => "failed",
            RecordStatus::Quarantined => "quarantined",
        };
        f.write_str(s)
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "queued" => Ok(RecordStatus::Queued),
            "done" => Ok(RecordStatus::Done),
            "failed" => Ok(RecordStatus::Failed),
            "quarantined" => Ok(RecordStatus::Quarantined),
            other => Err(format!("unknown record status {other:?}")),
        }
    }
}

/// One persisted attempt on one file.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub filename: String,
    pub size: Option<u64>,
    pub started_at: f64,
    pub ended_at: Option<f64>,
    pub status: RecordStatus,
    pub info: String,
}

/// SQLite-backed history store.
///
/// All access is serialized through a single connection behind a mutex;
/// the purge loop and dashboard readers share it with the manager.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "create table if not exists file_log(
                filename text,
                tstart real,
                tend real,
                status text,
                info text,
                size bigint,
                primary key (filename, tstart));
            create index if not exists file_log_fn_status_inx on file_log(filename, status);
            create index if not exists file_log_tend_inx on file_log(tend);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Upsert one attempt row. Conflicts on (filename, tstart) update the
    /// end timestamp, status and info of the existing row.
    fn add_record(
        &self,
        filename: &str,
        size: Option<u64>,
        tstart: f64,
        tend: Option<f64>,
        status: RecordStatus,
        info: &str,
    ) -> Result<()> {
        debug!(file = filename, %status, "history record");
        let conn = self.conn.lock().expect("history lock poisoned");
        conn.execute(
            "insert into file_log(filename, tstart, tend, status, info, size)
                values (?1, ?2, ?3, ?4, ?5, ?6)
                on conflict(filename, tstart)
                do update set tend = ?3, status = ?4, info = ?5",
            params![
                filename,
                tstart,
                tend,
                status.to_string(),
                info,
                size.map(|s| s as i64)
            ],
        )?;
        Ok(())
    }

    /// Record that an attempt was queued; this creates the row the
    /// terminal calls later update.
    pub fn file_queued(&self, filename: &str, size: u64, tstart: f64) -> Result<()> {
        self.add_record(filename, Some(size), tstart, None, RecordStatus::Queued, "")
    }

    pub fn file_done(
        &self,
        filename: &str,
        size: u64,
        tstart: f64,
        tend: Option<f64>,
    ) -> Result<()> {
        let tend = tend.unwrap_or_else(now_ts);
        self.add_record(filename, Some(size), tstart, Some(tend), RecordStatus::Done, "")
    }

    pub fn file_failed(
        &self,
        filename: &str,
        size: u64,
        tstart: f64,
        info: &str,
        tend: Option<f64>,
    ) -> Result<()> {
        let tend = tend.unwrap_or_else(now_ts);
        self.add_record(
            filename,
            Some(size),
            tstart,
            Some(tend),
            RecordStatus::Failed,
            info,
        )
    }

    pub fn file_quarantined(
        &self,
        filename: &str,
        tstart: f64,
        reason: &str,
        tend: Option<f64>,
    ) -> Result<()> {
        let tend = tend.unwrap_or_else(now_ts);
        self.add_record(
            filename,
            None,
            tstart,
            Some(tend),
            RecordStatus::Quarantined,
            reason,
        )
    }

    /// Most recent record per filename, for the given set of names.
    pub fn latest_records_bulk(
        &self,
        filenames: &[String],
    ) -> Result<HashMap<String, HistoryRecord>> {
        let mut out = HashMap::new();
        if filenames.is_empty() {
            return Ok(out);
        }
        let conn = self.conn.lock().expect("history lock poisoned");
        let placeholders = vec!["?"; filenames.len()].join(",");
        let sql = format!(
            "select filename, tstart, tend, status, info, size
                from file_log
                where filename in ({placeholders})
                order by tstart"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(filenames.iter()), row_to_record)?;
        // Rows arrive in ascending tstart order, so the last write per
        // name is the most recent attempt.
        for row in rows {
            let rec = row?;
            out.insert(rec.filename.clone(), rec);
        }
        Ok(out)
    }

    /// Records ended at or after `t`, newest first.
    pub fn history_since(&self, t: f64, limit: Option<usize>) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn.lock().expect("history lock poisoned");
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "select filename, tstart, tend, status, info, size
                from file_log
                where tend >= ?1
                order by tend desc
                limit ?2",
        )?;
        let rows = stmt.query_map(params![t, limit], row_to_record)?;
        rows.map(|r| r.map_err(Into::into)).collect()
    }

    /// Full attempt history of one file, oldest first.
    pub fn history_for_file(&self, filename: &str) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn.lock().expect("history lock poisoned");
        let mut stmt = conn.prepare(
            "select filename, tstart, tend, status, info, size
                from file_log
                where filename = ?1
                order by tstart",
        )?;
        let rows = stmt.query_map(params![filename], row_to_record)?;
        rows.map(|r| r.map_err(Into::into)).collect()
    }

    /// `(status, bucket_start, count)` triples for time-binned charts.
    pub fn event_counts(&self, bin_secs: f64, since: f64) -> Result<Vec<(String, f64, u64)>> {
        let conn = self.conn.lock().expect("history lock poisoned");
        let mut stmt = conn.prepare(
            "select status, cast(tend / ?1 as integer) * ?1 as bucket, count(*)
                from file_log
                where tend >= ?2
                group by status, bucket
                order by status, bucket",
        )?;
        let rows = stmt.query_map(params![bin_secs, since], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as u64))
        })?;
        rows.map(|r| r.map_err(Into::into)).collect()
    }

    /// Delete records ended before `t`; returns the number deleted.
    pub fn purge_older_than(&self, t: f64) -> Result<usize> {
        let conn = self.conn.lock().expect("history lock poisoned");
        let n = conn.execute("delete from file_log where tend < ?1", params![t])?;
        Ok(n)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let status_text: String = row.get(3)?;
    let status = status_text.parse().unwrap_or(RecordStatus::Failed);
    Ok(HistoryRecord {
        filename: row.get(0)?,
        started_at: row.get(1)?,
        ended_at: row.get(2)?,
        status,
        info: row.get(4)?,
        size: row.get::<_, Option<i64>>(5)?.map(|s| s as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_one_row_per_attempt() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.file_queued("f1", 100, 10.0).unwrap();
        store.file_failed("f1", 100, 10.0, "copy failed", Some(20.0)).unwrap();
        store.file_done("f1", 100, 10.0, Some(30.0)).unwrap();

        let history = store.history_for_file("f1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RecordStatus::Done);
        assert_eq!(history[0].ended_at, Some(30.0));
    }

    #[test]
    fn separate_attempts_keep_separate_rows() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.file_failed("f1", 100, 10.0, "err", Some(11.0)).unwrap();
        store.file_done("f1", 100, 50.0, Some(60.0)).unwrap();

        let history = store.history_for_file("f1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, RecordStatus::Failed);
        assert_eq!(history[1].status, RecordStatus::Done);
    }

    #[test]
    fn latest_records_bulk_returns_most_recent_attempt() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.file_failed("f1", 100, 10.0, "err", Some(11.0)).unwrap();
        store.file_done("f1", 100, 50.0, Some(60.0)).unwrap();
        store.file_quarantined("f2", 5.0, "bad meta", Some(6.0)).unwrap();

        let names = vec!["f1".to_string(), "f2".to_string(), "f3".to_string()];
        let latest = store.latest_records_bulk(&names).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["f1"].status, RecordStatus::Done);
        assert_eq!(latest["f2"].status, RecordStatus::Quarantined);
        assert!(!latest.contains_key("f3"));
    }

    #[test]
    fn history_since_is_newest_first_and_limited() {
        let store = HistoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            let t = i as f64;
            store.file_done(&format!("f{i}"), 1, t, Some(t + 100.0)).unwrap();
        }
        let recent = store.history_since(102.0, Some(2)).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].filename, "f4");
        assert_eq!(recent[1].filename, "f3");
    }

    #[test]
    fn event_counts_bins_by_status() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.file_done("a", 1, 0.0, Some(12.0)).unwrap();
        store.file_done("b", 1, 0.0, Some(14.0)).unwrap();
        store.file_failed("c", 1, 0.0, "x", Some(17.0)).unwrap();

        let counts = store.event_counts(10.0, 0.0).unwrap();
        assert!(counts.contains(&("done".to_string(), 10.0, 2)));
        assert!(counts.contains(&("failed".to_string(), 10.0, 1)));
    }

    #[test]
    fn purge_removes_only_old_rows() {
        let store = HistoryStore::open_in_memory().unwrap();
        store.file_done("old", 1, 0.0, Some(10.0)).unwrap();
        store.file_done("new", 1, 0.0, Some(100.0)).unwrap();
        store.file_queued("pending", 1, 5.0).unwrap();

        let purged = store.purge_older_than(50.0).unwrap();
        assert_eq!(purged, 1);
        assert!(store.history_for_file("old").unwrap().is_empty());
        assert_eq!(store.history_for_file("new").unwrap().len(), 1);
        // Queued rows have no end timestamp yet and must survive the purge.
        assert_eq!(store.history_for_file("pending").unwrap().len(), 1);
    }
}
