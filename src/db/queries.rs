//! Persistence sink for stations and observation measurements.
//!
//! Writes are idempotent upserts keyed by the record's natural id
//! (`station_id` / `observation_id`) and are applied in bounded-size
//! batches, one transaction per batch. Tables and indices are declared
//! once at job start, before any write; observation retention is enforced
//! by an expiry sweep over the `time` column.

use sqlx::PgPool;

use super::models::{Observation, Station};

/// Records per upsert transaction. Caps statement count and memory per
/// round-trip; the paquet can carry several thousand observations.
pub const UPSERT_CHUNK_SIZE: usize = 256;

/// Declare the stations table and its indices. Idempotent; runs before any
/// write in a job.
pub async fn ensure_station_collection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS paquetobs_stations (
            station_id   BIGINT PRIMARY KEY,
            omm_id       TEXT,
            name         TEXT NOT NULL,
            opening_date TEXT,
            pack         TEXT,
            longitude    DOUBLE PRECISION NOT NULL,
            latitude     DOUBLE PRECISION NOT NULL,
            altitude     DOUBLE PRECISION,
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS paquetobs_stations_geom
         ON paquetobs_stations (longitude, latitude)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Declare the measurements table and its indices. Idempotent; runs before
/// any write in a job.
pub async fn ensure_measurement_collection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS paquetobs_measurements (
            observation_id TEXT PRIMARY KEY,
            station_id     BIGINT NOT NULL,
            name           TEXT NOT NULL,
            time           TIMESTAMPTZ NOT NULL,
            temperature    DOUBLE PRECISION,
            humidity       DOUBLE PRECISION,
            wind_direction DOUBLE PRECISION,
            wind_speed     DOUBLE PRECISION,
            precipitation  DOUBLE PRECISION,
            longitude      DOUBLE PRECISION NOT NULL,
            latitude       DOUBLE PRECISION NOT NULL,
            altitude       DOUBLE PRECISION,
            updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    for stmt in [
        "CREATE INDEX IF NOT EXISTS paquetobs_measurements_station
         ON paquetobs_measurements (station_id)",
        "CREATE INDEX IF NOT EXISTS paquetobs_measurements_station_time
         ON paquetobs_measurements (station_id, time)",
        "CREATE INDEX IF NOT EXISTS paquetobs_measurements_time
         ON paquetobs_measurements (time)",
        "CREATE INDEX IF NOT EXISTS paquetobs_measurements_geom
         ON paquetobs_measurements (longitude, latitude)",
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}

/// Delete measurements older than the retention window. Postgres has no
/// TTL index; this sweep runs at job start and keeps the same contract:
/// records past retention disappear without operator action.
pub async fn expire_measurements(pool: &PgPool, ttl_seconds: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM paquetobs_measurements
         WHERE time < NOW() - ($1 * INTERVAL '1 second')",
    )
    .bind(ttl_seconds)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Load the full station inventory for the observation join.
pub async fn load_stations(pool: &PgPool) -> Result<Vec<Station>, sqlx::Error> {
    sqlx::query_as::<_, Station>(
        "SELECT station_id, omm_id, name, opening_date, pack,
                longitude, latitude, altitude
         FROM paquetobs_stations",
    )
    .fetch_all(pool)
    .await
}

/// Upsert stations in chunks, keyed by `station_id`.
pub async fn upsert_stations(pool: &PgPool, stations: &[Station]) -> Result<u64, sqlx::Error> {
    let mut written = 0u64;
    for chunk in stations.chunks(UPSERT_CHUNK_SIZE) {
        let mut tx = pool.begin().await?;
        for station in chunk {
            sqlx::query(
                "INSERT INTO paquetobs_stations
                    (station_id, omm_id, name, opening_date, pack,
                     longitude, latitude, altitude, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                 ON CONFLICT (station_id) DO UPDATE SET
                    omm_id = EXCLUDED.omm_id,
                    name = EXCLUDED.name,
                    opening_date = EXCLUDED.opening_date,
                    pack = EXCLUDED.pack,
                    longitude = EXCLUDED.longitude,
                    latitude = EXCLUDED.latitude,
                    altitude = EXCLUDED.altitude,
                    updated_at = NOW()",
            )
            .bind(station.station_id)
            .bind(&station.omm_id)
            .bind(&station.name)
            .bind(&station.opening_date)
            .bind(&station.pack)
            .bind(station.geometry.longitude)
            .bind(station.geometry.latitude)
            .bind(station.geometry.altitude)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
        tx.commit().await?;
    }
    Ok(written)
}

/// Upsert observations in chunks, keyed by `observation_id`.
pub async fn upsert_observations(
    pool: &PgPool,
    observations: &[Observation],
) -> Result<u64, sqlx::Error> {
    let mut written = 0u64;
    for chunk in observations.chunks(UPSERT_CHUNK_SIZE) {
        let mut tx = pool.begin().await?;
        for obs in chunk {
            sqlx::query(
                "INSERT INTO paquetobs_measurements
                    (observation_id, station_id, name, time,
                     temperature, humidity, wind_direction, wind_speed, precipitation,
                     longitude, latitude, altitude, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
                 ON CONFLICT (observation_id) DO UPDATE SET
                    station_id = EXCLUDED.station_id,
                    name = EXCLUDED.name,
                    time = EXCLUDED.time,
                    temperature = EXCLUDED.temperature,
                    humidity = EXCLUDED.humidity,
                    wind_direction = EXCLUDED.wind_direction,
                    wind_speed = EXCLUDED.wind_speed,
                    precipitation = EXCLUDED.precipitation,
                    longitude = EXCLUDED.longitude,
                    latitude = EXCLUDED.latitude,
                    altitude = EXCLUDED.altitude,
                    updated_at = NOW()",
            )
            .bind(&obs.observation_id)
            .bind(obs.station_id)
            .bind(&obs.name)
            .bind(obs.time)
            .bind(obs.temperature)
            .bind(obs.humidity)
            .bind(obs.wind_direction)
            .bind(obs.wind_speed)
            .bind(obs.precipitation)
            .bind(obs.geometry.longitude)
            .bind(obs.geometry.latitude)
            .bind(obs.geometry.altitude)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
        tx.commit().await?;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_covers_all_records() {
        // 600 records → 3 transactions of 256/256/88
        let sizes: Vec<usize> = (0..600)
            .collect::<Vec<i32>>()
            .chunks(UPSERT_CHUNK_SIZE)
            .map(|c| c.len())
            .collect();
        assert_eq!(sizes, vec![256, 256, 88]);
    }
}
