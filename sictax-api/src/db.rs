//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres and the
//! [`RecordStore`] implementation the claim pipeline runs on.
//!
//! A claim transaction owns one pooled connection from `BEGIN` until
//! `COMMIT`/`ROLLBACK`. Eligible assignments are locked with
//! `FOR UPDATE SKIP LOCKED`, so two concurrent claims never see the same row.

use crate::error::{ApiError, ApiResult};
use ::async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use sictax_core::{
    AddressExtension, AssignmentColumns, AssignmentId, ClaimFilter, ConstructionColumns,
    IntegerId, JoinedRow, LandParcel, PropertyColumns, RawId, Stage, StoreError, StoreResult,
    UnitColumns,
};
use sictax_storage::{ClaimTransaction, RecordStore};
use std::time::{Duration, Instant};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::FromSql;
use tokio_postgres::{NoTls, Row};

use crate::telemetry::metrics::with_metrics;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
    /// Server-side statement timeout; zero disables it
    pub statement_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "sictax".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_millis(15_000),
        }
    }
}

/// `SICTAX_*` variable, falling back to the name used by the legacy `.env`.
fn env_with_fallback(primary: &str, legacy: &str) -> Option<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(legacy))
        .ok()
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_with_fallback("SICTAX_DB_HOST", "DB_HOST").unwrap_or(defaults.host),
            port: env_with_fallback("SICTAX_DB_PORT", "DB_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: env_with_fallback("SICTAX_DB_NAME", "DB_DATABASE").unwrap_or(defaults.dbname),
            user: env_with_fallback("SICTAX_DB_USER", "DB_USER").unwrap_or(defaults.user),
            password: env_with_fallback("SICTAX_DB_PASSWORD", "DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("SICTAX_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("SICTAX_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            statement_timeout: std::env::var("SICTAX_DB_STATEMENT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.statement_timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.application_name = Some("sictax-api".to_string());

        if !self.statement_timeout.is_zero() {
            cfg.options = Some(format!(
                "-c statement_timeout={}",
                self.statement_timeout.as_millis()
            ));
        }

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::internal_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// SQL
// ============================================================================

/// Pending assignments matching the filter that no other transaction holds.
const LOCK_PENDING_SQL: &str = "\
SELECT t.idasignacion::int8 AS idasignacion
FROM sictax_tramitesdb.asignacion t
WHERE t.etapa_id = $1::int4
  AND ($2::int8 IS NULL OR t.usuario_asignado = $2::int8)
ORDER BY t.idasignacion
FOR UPDATE SKIP LOCKED";

const COUNT_PENDING_SQL: &str = "\
SELECT COUNT(*)::int8 AS total
FROM sictax_tramitesdb.asignacion t
WHERE t.etapa_id = $1::int4
  AND ($2::int8 IS NULL OR t.usuario_asignado = $2::int8)";

const FETCH_ROWS_SQL: &str = "\
SELECT
    t.idasignacion::int8                 AS idasignacion,
    t.idpredio::int8                     AS idpredio,
    t.etapa_id::int4                     AS etapa_id,
    e.nombre::text                       AS etapa,
    t.usuario_asigna::int8               AS usuario_asigna,
    t.fecha_asignado::timestamp          AS fecha_asignado,
    t.usuario_asignado::int8             AS usuario_asignado,
    t.usuario_editor::int8               AS usuario_editor,
    t.fecha_desasignado::timestamp       AS fecha_desasignado,
    p.idpredio::int8                     AS predio_id,
    p.numero_predial::text               AS numero_predial,
    p.departamento::text                 AS departamento,
    p.municipio::text                    AS municipio,
    p.id_operacion::text                 AS id_operacion,
    p.tiene_fmi::boolean                 AS tiene_fmi,
    p.codigo_orip::text                  AS codigo_orip,
    p.matricula_inmobiliaria::text       AS matricula_inmobiliaria,
    p.numero_predial_anterior::text      AS numero_predial_anterior,
    p.nupre::text                        AS nupre,
    p.avaluo_catastral::float8           AS avaluo_catastral,
    p.tipo::text                         AS tipo,
    p.condicion_predio::text             AS condicion_predio,
    p.destinacion_economica::text        AS destinacion_economica,
    d.dispname::text                     AS departamentoname,
    m.dispname::text                     AS municipioname,
    extd.iddireccion::int8               AS iddireccion,
    extd.tipo_direccion::text            AS tipo_direccion,
    extd.es_direccion_principal::boolean AS es_direccion_principal,
    extd.sector_predio::text             AS sector_predio,
    extd.sector_ciudad::text             AS sector_ciudad,
    extd.codigo_postal::text             AS codigo_postal,
    extd.clase_via_principal::text       AS clase_via_principal,
    extd.valor_via_principal::text       AS valor_via_principal,
    extd.letra_via_principal::text       AS letra_via_principal,
    extd.valor_via_generadora::text      AS valor_via_generadora,
    extd.letra_via_generadora::text      AS letra_via_generadora,
    extd.numero_predio::text             AS numero_predio,
    extd.complemento::text               AS complemento,
    extd.direccion_completa::text        AS direccion_completa,
    tr.idterreno::int8                   AS idterreno,
    tr.area_terreno::float8              AS area_terreno,
    tr.avaluo_terreno::float8            AS avaluo_terreno,
    tr.manzana_vereda_codigo::text       AS manzana_vereda_codigo,
    c.idconstruccion::int8               AS cons_idconstruccion,
    c.identificador::text                AS cons_identificador,
    c.tipo_construccion::text            AS cons_tipo_construccion,
    ctipo.dispname::text                 AS cons_tipo_construccionname,
    c.anio_construccion::int4            AS cons_anio_construccion,
    c.avaluo_construccion::float8        AS cons_avaluo_construccion,
    c.area_construccion::float8          AS cons_area_construccion,
    c.tipo_dominio::text                 AS cons_tipo_dominio,
    c.numero_pisos::int4                 AS cons_numero_pisos,
    c.numero_sotanos::int4               AS cons_numero_sotanos,
    c.numero_mezanines::int4             AS cons_numero_mezanines,
    c.numero_semisotanos::int4           AS cons_numero_semisotanos,
    c.etiqueta::text                     AS cons_etiqueta,
    c.altura::float8                     AS cons_altura,
    c.observaciones::text                AS cons_observaciones,
    u.idunidadconstruccion::int8         AS uni_idunidadconstruccion,
    u.lc_construccion::int8              AS uni_idconstruccion,
    u.identificador::text                AS uni_identificador,
    u.tipo_construccion::text            AS uni_tipo_construccion,
    utipo.dispname::text                 AS uni_tipo_construccionname,
    u.anio_construccion::int4            AS uni_anio_construccion
FROM sictax_tramitesdb.asignacion t
LEFT JOIN sictax_tramitesdb.etapas e ON t.etapa_id = e.id
LEFT JOIN sictax_data_temporal.lc_predio_t p ON t.idpredio = p.idpredio
LEFT JOIN sictax_data_temporal.lc_terreno_t tr ON tr.idpredio = p.idpredio
LEFT JOIN sictax_data_temporal.extdireccion_t extd ON t.idpredio = extd.lc_predio_direccion
LEFT JOIN sictax_dominios.st_departamentos d ON p.departamento = d.itfcode::text
LEFT JOIN sictax_dominios.st_municipios m ON p.municipio = m.itfcode::text
LEFT JOIN sictax_data_temporal.lc_construccion_t c ON p.idpredio = c.idpredio
LEFT JOIN sictax_dominios.lc_construcciontipo ctipo ON ctipo.itfcode = c.tipo_construccion
LEFT JOIN sictax_data_temporal.lc_unidadconstruccion_t u ON c.idconstruccion = u.lc_construccion
LEFT JOIN sictax_dominios.gc_unidadconstrucciontipo utipo ON utipo.itfcode = u.tipo_construccion
WHERE t.idasignacion = ANY($1::int8[])
  AND t.etapa_id = $2::int4
ORDER BY t.idasignacion, c.idconstruccion NULLS LAST, u.idunidadconstruccion NULLS LAST";

/// Conditional transition: only rows still in the source stage change.
const TRANSITION_SQL: &str = "\
UPDATE sictax_tramitesdb.asignacion
SET etapa_id = $1::int4
WHERE idasignacion = ANY($2::int8[])
  AND etapa_id = $3::int4";

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn store_error(operation: &str, err: tokio_postgres::Error) -> StoreError {
    if err.code() == Some(&SqlState::QUERY_CANCELED) {
        return StoreError::Timeout {
            operation: operation.to_string(),
        };
    }
    if err.is_closed() {
        return StoreError::Unavailable {
            reason: err.to_string(),
        };
    }
    StoreError::Query {
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}

fn pool_error(err: PoolError) -> StoreError {
    match err {
        PoolError::Timeout(_) => StoreError::Unavailable {
            reason: "connection pool exhausted".to_string(),
        },
        PoolError::Backend(e) => store_error("connect", e),
        other => StoreError::Unavailable {
            reason: other.to_string(),
        },
    }
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn col<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> StoreResult<T> {
    row.try_get(name).map_err(|e| StoreError::MalformedRow {
        column: name.to_string(),
        reason: e.to_string(),
    })
}

fn id<'a, I: IntegerId>(row: &'a Row, name: &str) -> StoreResult<I> {
    col::<RawId>(row, name).map(I::new)
}

fn opt_id<'a, I: IntegerId>(row: &'a Row, name: &str) -> StoreResult<Option<I>> {
    Ok(col::<Option<RawId>>(row, name)?.map(I::new))
}

fn decode_row(row: &Row) -> StoreResult<JoinedRow> {
    let assignment = AssignmentColumns {
        idasignacion: id(row, "idasignacion")?,
        idpredio: id(row, "idpredio")?,
        etapa_id: Stage::from_code(col(row, "etapa_id")?),
        etapa: col(row, "etapa")?,
        usuario_asigna: opt_id(row, "usuario_asigna")?,
        fecha_asignado: col(row, "fecha_asignado")?,
        usuario_asignado: opt_id(row, "usuario_asignado")?,
        usuario_editor: opt_id(row, "usuario_editor")?,
        fecha_desasignado: col(row, "fecha_desasignado")?,
    };

    let property = PropertyColumns {
        predio_id: opt_id(row, "predio_id")?,
        numero_predial: col(row, "numero_predial")?,
        departamento: col(row, "departamento")?,
        municipio: col(row, "municipio")?,
        id_operacion: col(row, "id_operacion")?,
        tiene_fmi: col(row, "tiene_fmi")?,
        codigo_orip: col(row, "codigo_orip")?,
        matricula_inmobiliaria: col(row, "matricula_inmobiliaria")?,
        numero_predial_anterior: col(row, "numero_predial_anterior")?,
        nupre: col(row, "nupre")?,
        avaluo_catastral: col(row, "avaluo_catastral")?,
        tipo: col(row, "tipo")?,
        condicion_predio: col(row, "condicion_predio")?,
        destinacion_economica: col(row, "destinacion_economica")?,
        departamentoname: col(row, "departamentoname")?,
        municipioname: col(row, "municipioname")?,
    };

    let address = AddressExtension {
        iddireccion: col(row, "iddireccion")?,
        tipo_direccion: col(row, "tipo_direccion")?,
        es_direccion_principal: col(row, "es_direccion_principal")?,
        sector_predio: col(row, "sector_predio")?,
        sector_ciudad: col(row, "sector_ciudad")?,
        codigo_postal: col(row, "codigo_postal")?,
        clase_via_principal: col(row, "clase_via_principal")?,
        valor_via_principal: col(row, "valor_via_principal")?,
        letra_via_principal: col(row, "letra_via_principal")?,
        valor_via_generadora: col(row, "valor_via_generadora")?,
        letra_via_generadora: col(row, "letra_via_generadora")?,
        numero_predio: col(row, "numero_predio")?,
        complemento: col(row, "complemento")?,
        direccion_completa: col(row, "direccion_completa")?,
    };

    let land = LandParcel {
        idterreno: col(row, "idterreno")?,
        area_terreno: col(row, "area_terreno")?,
        avaluo_terreno: col(row, "avaluo_terreno")?,
        manzana_vereda_codigo: col(row, "manzana_vereda_codigo")?,
    };

    let construction = ConstructionColumns {
        idconstruccion: opt_id(row, "cons_idconstruccion")?,
        identificador: col(row, "cons_identificador")?,
        tipo_construccion: col(row, "cons_tipo_construccion")?,
        tipo_construccionname: col(row, "cons_tipo_construccionname")?,
        anio_construccion: col(row, "cons_anio_construccion")?,
        avaluo_construccion: col(row, "cons_avaluo_construccion")?,
        area_construccion: col(row, "cons_area_construccion")?,
        tipo_dominio: col(row, "cons_tipo_dominio")?,
        numero_pisos: col(row, "cons_numero_pisos")?,
        numero_sotanos: col(row, "cons_numero_sotanos")?,
        numero_mezanines: col(row, "cons_numero_mezanines")?,
        numero_semisotanos: col(row, "cons_numero_semisotanos")?,
        etiqueta: col(row, "cons_etiqueta")?,
        altura: col(row, "cons_altura")?,
        observaciones: col(row, "cons_observaciones")?,
    };

    let unit = UnitColumns {
        idunidadconstruccion: opt_id(row, "uni_idunidadconstruccion")?,
        idconstruccion: opt_id(row, "uni_idconstruccion")?,
        identificador: col(row, "uni_identificador")?,
        tipo_construccion: col(row, "uni_tipo_construccion")?,
        tipo_construccionname: col(row, "uni_tipo_construccionname")?,
        anio_construccion: col(row, "uni_anio_construccion")?,
    };

    Ok(JoinedRow {
        assignment,
        property,
        address,
        land,
        construction,
        unit,
    })
}

fn raw_ids(ids: &[AssignmentId]) -> Vec<RawId> {
    ids.iter().map(|id| id.get()).collect()
}

fn filter_param(filter: ClaimFilter) -> Option<RawId> {
    filter.assigned_user().map(|user| user.get())
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// PostgreSQL-backed [`RecordStore`].
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool,
}

impl PgRecordStore {
    /// Create a store over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn begin(&self) -> StoreResult<Box<dyn ClaimTransaction>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        conn.batch_execute("BEGIN ISOLATION LEVEL READ COMMITTED")
            .await
            .map_err(|e| store_error("begin", e))?;

        Ok(Box::new(PgClaimTransaction { conn: Some(conn) }))
    }

    async fn ping(&self) -> StoreResult<()> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        conn.batch_execute("SELECT 1")
            .await
            .map_err(|e| store_error("ping", e))
    }
}

/// Transaction over one pooled connection.
pub struct PgClaimTransaction {
    /// `None` once committed or rolled back.
    conn: Option<Object>,
}

impl PgClaimTransaction {
    fn conn(&self) -> StoreResult<&Object> {
        self.conn.as_ref().ok_or(StoreError::TransactionClosed)
    }

    async fn finish(&mut self, statement: &'static str) -> StoreResult<()> {
        let conn = self.conn.take().ok_or(StoreError::TransactionClosed)?;
        match conn.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Session state is unknown; keep it out of the pool.
                drop(Object::take(conn));
                Err(store_error(statement, e))
            }
        }
    }
}

/// Times a store call and records it under `operation`.
async fn timed<T, F>(operation: &'static str, fut: F) -> StoreResult<T>
where
    F: std::future::Future<Output = StoreResult<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let elapsed = start.elapsed().as_secs_f64();
    with_metrics(|m| m.record_db_operation(operation, result.is_ok(), elapsed));
    result
}

#[async_trait]
impl ClaimTransaction for PgClaimTransaction {
    async fn lock_pending(&mut self, filter: ClaimFilter) -> StoreResult<Vec<AssignmentId>> {
        timed("lock_pending", async {
            let conn = self.conn()?;
            let stmt = conn
                .prepare_cached(LOCK_PENDING_SQL)
                .await
                .map_err(|e| store_error("lock_pending", e))?;
            let rows = conn
                .query(&stmt, &[&Stage::Pending.code(), &filter_param(filter)])
                .await
                .map_err(|e| store_error("lock_pending", e))?;
            rows.iter().map(|row| id(row, "idasignacion")).collect()
        })
        .await
    }

    async fn count_pending(&mut self, filter: ClaimFilter) -> StoreResult<u64> {
        timed("count_pending", async {
            let conn = self.conn()?;
            let stmt = conn
                .prepare_cached(COUNT_PENDING_SQL)
                .await
                .map_err(|e| store_error("count_pending", e))?;
            let row = conn
                .query_one(&stmt, &[&Stage::Pending.code(), &filter_param(filter)])
                .await
                .map_err(|e| store_error("count_pending", e))?;
            let total: i64 = col(&row, "total")?;
            u64::try_from(total).map_err(|e| StoreError::MalformedRow {
                column: "total".to_string(),
                reason: e.to_string(),
            })
        })
        .await
    }

    async fn fetch_rows(&mut self, ids: &[AssignmentId]) -> StoreResult<Vec<JoinedRow>> {
        timed("fetch_rows", async {
            let conn = self.conn()?;
            let stmt = conn
                .prepare_cached(FETCH_ROWS_SQL)
                .await
                .map_err(|e| store_error("fetch_rows", e))?;
            let rows = conn
                .query(&stmt, &[&raw_ids(ids), &Stage::Pending.code()])
                .await
                .map_err(|e| store_error("fetch_rows", e))?;
            rows.iter().map(decode_row).collect()
        })
        .await
    }

    async fn transition(
        &mut self,
        ids: &[AssignmentId],
        from: Stage,
        to: Stage,
    ) -> StoreResult<u64> {
        from.transition_to(to).map_err(|e| StoreError::Query {
            operation: "transition".to_string(),
            reason: e.to_string(),
        })?;

        timed("transition", async {
            let conn = self.conn()?;
            let stmt = conn
                .prepare_cached(TRANSITION_SQL)
                .await
                .map_err(|e| store_error("transition", e))?;
            conn.execute(&stmt, &[&to.code(), &raw_ids(ids), &from.code()])
                .await
                .map_err(|e| store_error("transition", e))
        })
        .await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        timed("commit", this.finish("COMMIT")).await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut this = self;
        timed("rollback", this.finish("ROLLBACK")).await
    }
}

impl Drop for PgClaimTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        tracing::warn!("Claim transaction dropped before finishing, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.batch_execute("ROLLBACK").await {
                        tracing::error!(error = %e, "Background rollback failed, closing connection");
                        drop(Object::take(conn));
                    }
                });
            }
            Err(_) => {
                // Closing the socket makes the server abort the transaction.
                drop(Object::take(conn));
            }
        }
    }
}
