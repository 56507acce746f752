// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Site
//!
//! PostgreSQL-backed site registry.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `SiteRepository` over the `sites` table

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::repository::{RepositoryError, SiteRepository};
use crate::domain::site::Site;

pub struct PostgresSiteRepository {
    pool: PgPool,
}

impl PostgresSiteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Party ids are stored as BIGINT; anything outside `u32` is corrupt data.
pub(crate) fn party_id_from_row(row: &PgRow, column: &str) -> Result<u32, RepositoryError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| RepositoryError::Serialization(format!("{} out of range: {}", column, raw)))
}

fn parse_site_row(row: PgRow) -> Result<Site, RepositoryError> {
    let port: i32 = row.try_get("external_port")?;
    Ok(Site {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        party_id: party_id_from_row(&row, "party_id")?,
        external_host: row.try_get("external_host")?,
        external_port: u16::try_from(port)
            .map_err(|_| RepositoryError::Serialization(format!("external_port out of range: {}", port)))?,
        https: row.try_get("https")?,
        server_name: row.try_get("server_name")?,
        last_registered_at: row.try_get("last_registered_at")?,
    })
}

#[async_trait]
impl SiteRepository for PostgresSiteRepository {
    async fn create(&self, site: &Site) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO sites (
                uuid, name, description, party_id, external_host,
                external_port, https, server_name, last_registered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(site.uuid)
        .bind(&site.name)
        .bind(&site.description)
        .bind(site.party_id as i64)
        .bind(&site.external_host)
        .bind(site.external_port as i32)
        .bind(site.https)
        .bind(&site.server_name)
        .bind(site.last_registered_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Site, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT uuid, name, description, party_id, external_host,
                   external_port, https, server_name, last_registered_at
            FROM sites
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => parse_site_row(row),
            None => Err(RepositoryError::NotFound(format!("site {}", uuid))),
        }
    }

    async fn list(&self) -> Result<Vec<Site>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT uuid, name, description, party_id, external_host,
                   external_port, https, server_name, last_registered_at
            FROM sites
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_site_row).collect()
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM sites WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("site {}", uuid)));
        }
        Ok(())
    }
}
