//! SQLite-backed tracking state.
//!
//! One connection behind a mutex. Every write is a single statement, so the
//! plan upsert and the insert-or-ignore arrival log are atomic per key.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use fleet_tracking::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS route_stops (
    id               TEXT NOT NULL,
    route_id         TEXT NOT NULL,
    seq              INTEGER NOT NULL,
    latitude         REAL NOT NULL,
    longitude        REAL NOT NULL,
    name             TEXT,
    arrival_radius_m REAL NOT NULL DEFAULT 50,
    PRIMARY KEY (route_id, id)
);
CREATE INDEX IF NOT EXISTS route_stops_by_seq ON route_stops (route_id, seq);

CREATE TABLE IF NOT EXISTS route_plan_cache (
    route_id  TEXT PRIMARY KEY,
    plan_json TEXT NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS trip_stop_arrivals (
    trip_id    TEXT NOT NULL,
    stop_id    TEXT NOT NULL,
    arrived_at INTEGER NOT NULL,
    PRIMARY KEY (trip_id, stop_id)
);

CREATE TABLE IF NOT EXISTS trip_stop_notifications (
    trip_id     TEXT NOT NULL,
    stop_id     TEXT NOT NULL,
    notified_at INTEGER NOT NULL,
    PRIMARY KEY (trip_id, stop_id)
);
";

fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> TrackingError {
    move |e| TrackingError::Storage(format!("{context}: {e}"))
}

pub struct SqliteTrackingStore {
    conn: Mutex<Connection>,
}

impl SqliteTrackingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(storage_err("open database"))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err("open database"))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage_err("apply schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TrackingError::Storage("connection mutex poisoned".into()))
    }

    /// Insert or replace administered stops (route edits happen upstream)
    pub fn upsert_stops(&self, stops: &[Stop]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_err("begin stop upsert"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO route_stops (id, route_id, seq, latitude, longitude, name, arrival_radius_m)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (route_id, id) DO UPDATE SET
                        seq = excluded.seq,
                        latitude = excluded.latitude,
                        longitude = excluded.longitude,
                        name = excluded.name,
                        arrival_radius_m = excluded.arrival_radius_m",
                )
                .map_err(storage_err("prepare stop upsert"))?;
            for stop in stops {
                stmt.execute(params![
                    stop.id.as_str(),
                    stop.route_id.as_str(),
                    stop.sequence,
                    stop.latitude(),
                    stop.longitude(),
                    stop.name.as_deref(),
                    stop.arrival_radius_m,
                ])
                .map_err(storage_err("upsert stop"))?;
            }
        }
        tx.commit().map_err(storage_err("commit stop upsert"))
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

impl StopSource for SqliteTrackingStore {
    fn route_stops(&self, route_id: &RouteIdentifier) -> Result<Vec<Stop>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, seq, latitude, longitude, name, arrival_radius_m
                 FROM route_stops WHERE route_id = ?1 ORDER BY seq ASC",
            )
            .map_err(storage_err("prepare stop query"))?;

        let rows = stmt
            .query_map(params![route_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            })
            .map_err(storage_err("query stops"))?;

        let mut stops = Vec::new();
        for row in rows {
            let (id, seq, lat, lng, name, radius) = row.map_err(storage_err("read stop row"))?;
            // Rows are validated the same way as any other boundary input
            let mut stop = Stop::new(id, route_id.clone(), seq, lat, lng)?.with_arrival_radius(radius)?;
            if let Some(name) = name {
                stop = stop.with_name(name);
            }
            stops.push(stop);
        }
        Ok(stops)
    }
}

impl VisitedStopLog for SqliteTrackingStore {
    fn visited_stops(&self, trip_id: &TripIdentifier) -> Result<HashSet<StopIdentifier>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT stop_id FROM trip_stop_arrivals WHERE trip_id = ?1")
            .map_err(storage_err("prepare arrival query"))?;
        let rows = stmt
            .query_map(params![trip_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(storage_err("query arrivals"))?;

        rows.map(|r| r.map(StopIdentifier::from).map_err(storage_err("read arrival row")))
            .collect()
    }

    fn record_arrival(&self, event: &VisitedStopEvent) -> Result<bool> {
        let inserted = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO trip_stop_arrivals (trip_id, stop_id, arrived_at) VALUES (?1, ?2, ?3)",
                params![event.trip_id.as_str(), event.stop_id.as_str(), millis(event.arrived_at)],
            )
            .map_err(storage_err("record arrival"))?;
        Ok(inserted == 1)
    }
}

impl NotificationLedger for SqliteTrackingStore {
    fn notified_stops(
        &self,
        trip_id: &TripIdentifier,
        since: Option<DateTime<Utc>>,
    ) -> Result<HashSet<StopIdentifier>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT stop_id FROM trip_stop_notifications WHERE trip_id = ?1 AND notified_at >= ?2",
            )
            .map_err(storage_err("prepare notification query"))?;
        let since = since.map(millis).unwrap_or(i64::MIN);
        let rows = stmt
            .query_map(params![trip_id.as_str(), since], |row| row.get::<_, String>(0))
            .map_err(storage_err("query notifications"))?;

        rows.map(|r| r.map(StopIdentifier::from).map_err(storage_err("read notification row")))
            .collect()
    }

    fn try_mark_notified(
        &self,
        trip_id: &TripIdentifier,
        stop_id: &StopIdentifier,
        at: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let since = since.map(millis).unwrap_or(i64::MIN);
        let changed = self
            .conn()?
            .execute(
                "INSERT INTO trip_stop_notifications (trip_id, stop_id, notified_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (trip_id, stop_id) DO UPDATE SET notified_at = excluded.notified_at
                 WHERE trip_stop_notifications.notified_at < ?4",
                params![trip_id.as_str(), stop_id.as_str(), millis(at), since],
            )
            .map_err(storage_err("claim notification"))?;
        Ok(changed == 1)
    }
}

impl PlanStore for SqliteTrackingStore {
    fn load_plan(&self, route_id: &RouteIdentifier) -> Result<Option<OptimizedRoutePlan>> {
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT plan_json FROM route_plan_cache WHERE route_id = ?1",
                params![route_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err("load plan"))?;

        json.map(|j| {
            serde_json::from_str(&j)
                .map_err(|e| TrackingError::Storage(format!("decode cached plan for {route_id}: {e}")))
        })
        .transpose()
    }

    fn save_plan(&self, plan: &OptimizedRoutePlan) -> Result<()> {
        let json = serde_json::to_string(plan)
            .map_err(|e| TrackingError::CachePersistFailure(format!("encode plan: {e}")))?;

        self.conn()?
            .execute(
                "INSERT INTO route_plan_cache (route_id, plan_json, cached_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (route_id) DO UPDATE SET plan_json = excluded.plan_json, cached_at = excluded.cached_at",
                params![plan.route_id.as_str(), json, millis(plan.cached_at)],
            )
            .map_err(|e| TrackingError::CachePersistFailure(e.to_string()))?;

        debug!(route_id = %plan.route_id, stops = plan.stops.len(), "plan cached");
        Ok(())
    }
}
