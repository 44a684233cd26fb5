//! Property tree returned to caseworkers.
//!
//! Field names are the wire names of the `/datosasignados` payload. Every
//! optional scalar serializes as `null` when absent; nothing is skipped.

use serde::{Deserialize, Serialize};

use crate::identity::{AssignmentId, ConstructionId, PropertyId, Timestamp, UnitId, UserId};
use crate::row::{AddressExtension, ConstructionColumns, JoinedRow, LandParcel, UnitColumns};

/// A construction on a property, deduplicated by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Construction {
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub idconstruccion: ConstructionId,
    pub identificador: Option<String>,
    pub area_construccion: Option<f64>,
    pub tipo_construccion: Option<String>,
    pub anio_construccion: Option<i32>,
    pub avaluo_construccion: Option<f64>,
    pub tipo_construccionname: Option<String>,
    pub tipo_dominio: Option<String>,
    pub numero_pisos: Option<i32>,
    pub numero_sotanos: Option<i32>,
    pub numero_mezanines: Option<i32>,
    pub numero_semisotanos: Option<i32>,
    pub etiqueta: Option<String>,
    pub cons_altura: Option<f64>,
    pub observaciones: Option<String>,
}

impl Construction {
    /// Build from the construction columns of a row; `None` when the row has
    /// no construction.
    pub fn from_columns(columns: &ConstructionColumns) -> Option<Self> {
        let idconstruccion = columns.idconstruccion?;
        Some(Self {
            idconstruccion,
            identificador: columns.identificador.clone(),
            area_construccion: columns.area_construccion,
            tipo_construccion: columns.tipo_construccion.clone(),
            anio_construccion: columns.anio_construccion,
            avaluo_construccion: columns.avaluo_construccion,
            tipo_construccionname: columns.tipo_construccionname.clone(),
            tipo_dominio: columns.tipo_dominio.clone(),
            numero_pisos: columns.numero_pisos,
            numero_sotanos: columns.numero_sotanos,
            numero_mezanines: columns.numero_mezanines,
            numero_semisotanos: columns.numero_semisotanos,
            etiqueta: columns.etiqueta.clone(),
            cons_altura: columns.altura,
            observaciones: columns.observaciones.clone(),
        })
    }
}

/// A construction unit on a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConstructionUnit {
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub idunidadconstruccion: UnitId,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub idconstruccion: Option<ConstructionId>,
    pub identificador: Option<String>,
    pub tipo_construccion: Option<String>,
    pub tipo_construccionname: Option<String>,
    pub anio_construccion: Option<i32>,
}

impl ConstructionUnit {
    /// Build from the unit columns of a row; `None` when the row has no unit.
    pub fn from_columns(columns: &UnitColumns) -> Option<Self> {
        let idunidadconstruccion = columns.idunidadconstruccion?;
        Some(Self {
            idunidadconstruccion,
            idconstruccion: columns.idconstruccion,
            identificador: columns.identificador.clone(),
            tipo_construccion: columns.tipo_construccion.clone(),
            tipo_construccionname: columns.tipo_construccionname.clone(),
            anio_construccion: columns.anio_construccion,
        })
    }
}

/// One claimed property with its nested collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Property {
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub idpredio: PropertyId,
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub idasignacion: AssignmentId,
    pub etapa_id: Option<i32>,
    pub etapa: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub usuario_asigna: Option<UserId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub fecha_asignado: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub usuario_asignado: Option<UserId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub usuario_editor: Option<UserId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub fecha_desasignado: Option<Timestamp>,
    pub numero_predial: Option<String>,
    pub departamento: Option<String>,
    pub municipio: Option<String>,
    pub id_operacion: Option<String>,
    pub tiene_fmi: Option<bool>,
    pub codigo_orip: Option<String>,
    pub matricula_inmobiliaria: Option<String>,
    pub numero_predial_anterior: Option<String>,
    pub nupre: Option<String>,
    pub avaluo_catastral: Option<f64>,
    pub tipo: Option<String>,
    pub condicion_predio: Option<String>,
    pub departamentoname: Option<String>,
    pub municipioname: Option<String>,
    pub destinacion_economica: Option<String>,
    #[serde(flatten)]
    pub direccion: AddressExtension,
    #[serde(flatten)]
    pub terreno: LandParcel,
    /// Reserved for multiple addresses; always empty.
    pub direcciones: Vec<AddressExtension>,
    pub construccion: Vec<Construction>,
    pub unidadconstruccion: Vec<ConstructionUnit>,
}

impl Property {
    /// Scalar fields from the first row seen for a property; collections start
    /// empty.
    pub fn from_first_row(row: &JoinedRow) -> Self {
        let a = &row.assignment;
        let p = &row.property;
        Self {
            idpredio: a.idpredio,
            idasignacion: a.idasignacion,
            etapa_id: Some(a.etapa_id.code()),
            etapa: a.etapa.clone(),
            usuario_asigna: a.usuario_asigna,
            fecha_asignado: a.fecha_asignado,
            usuario_asignado: a.usuario_asignado,
            usuario_editor: a.usuario_editor,
            fecha_desasignado: a.fecha_desasignado,
            numero_predial: p.numero_predial.clone(),
            departamento: p.departamento.clone(),
            municipio: p.municipio.clone(),
            id_operacion: p.id_operacion.clone(),
            tiene_fmi: p.tiene_fmi,
            codigo_orip: p.codigo_orip.clone(),
            matricula_inmobiliaria: p.matricula_inmobiliaria.clone(),
            numero_predial_anterior: p.numero_predial_anterior.clone(),
            nupre: p.nupre.clone(),
            avaluo_catastral: p.avaluo_catastral,
            tipo: p.tipo.clone(),
            condicion_predio: p.condicion_predio.clone(),
            departamentoname: p.departamentoname.clone(),
            municipioname: p.municipioname.clone(),
            destinacion_economica: p.destinacion_economica.clone(),
            direccion: row.address.clone(),
            terreno: row.land.clone(),
            direcciones: Vec::new(),
            construccion: Vec::new(),
            unidadconstruccion: Vec::new(),
        }
    }
}
