//! Denormalized join rows.
//!
//! One [`JoinedRow`] is one row of the claim query: an assignment joined with
//! its property, address extension, land parcel, one construction and one
//! construction unit. One-to-many joins repeat the parent columns, so the same
//! property (and the same construction) shows up in several rows.
//!
//! Column groups mirror the source tables. Everything the database can return
//! as NULL is an `Option`.

use serde::{Deserialize, Serialize};

use crate::entities::Assignment;
use crate::identity::{AssignmentId, ConstructionId, PropertyId, RawId, Timestamp, UnitId, UserId};
use crate::stage::Stage;

/// Columns of `sictax_tramitesdb.asignacion` plus the stage display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentColumns {
    pub idasignacion: AssignmentId,
    /// Property referenced by the assignment (never null).
    pub idpredio: PropertyId,
    pub etapa_id: Stage,
    /// `etapas.nombre`
    pub etapa: Option<String>,
    pub usuario_asigna: Option<UserId>,
    pub fecha_asignado: Option<Timestamp>,
    pub usuario_asignado: Option<UserId>,
    pub usuario_editor: Option<UserId>,
    pub fecha_desasignado: Option<Timestamp>,
}

impl AssignmentColumns {
    /// A pending assignment with every optional column empty.
    pub fn pending(idasignacion: AssignmentId, idpredio: PropertyId) -> Self {
        Self {
            idasignacion,
            idpredio,
            etapa_id: Stage::Pending,
            etapa: None,
            usuario_asigna: None,
            fecha_asignado: None,
            usuario_asignado: None,
            usuario_editor: None,
            fecha_desasignado: None,
        }
    }
}

impl From<&Assignment> for AssignmentColumns {
    fn from(a: &Assignment) -> Self {
        Self {
            idasignacion: a.assignment_id,
            idpredio: a.property_id,
            etapa_id: a.stage,
            etapa: None,
            usuario_asigna: Some(a.assigned_by),
            fecha_asignado: Some(a.assigned_at),
            usuario_asignado: a.assigned_to,
            usuario_editor: None,
            fecha_desasignado: a.unassigned_at,
        }
    }
}

/// Columns of `lc_predio_t` and the department/municipality display names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyColumns {
    /// Joined property key; NULL when the property row is missing.
    pub predio_id: Option<PropertyId>,
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
    pub destinacion_economica: Option<String>,
    pub departamentoname: Option<String>,
    pub municipioname: Option<String>,
}

/// Address extension (`extdireccion_t`). At most one per property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AddressExtension {
    pub iddireccion: Option<RawId>,
    pub tipo_direccion: Option<String>,
    pub es_direccion_principal: Option<bool>,
    pub sector_predio: Option<String>,
    pub sector_ciudad: Option<String>,
    pub codigo_postal: Option<String>,
    pub clase_via_principal: Option<String>,
    pub valor_via_principal: Option<String>,
    pub letra_via_principal: Option<String>,
    pub valor_via_generadora: Option<String>,
    pub letra_via_generadora: Option<String>,
    pub numero_predio: Option<String>,
    pub complemento: Option<String>,
    pub direccion_completa: Option<String>,
}

/// Land parcel (`lc_terreno_t`). At most one per property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LandParcel {
    pub idterreno: Option<RawId>,
    pub area_terreno: Option<f64>,
    pub avaluo_terreno: Option<f64>,
    pub manzana_vereda_codigo: Option<String>,
}

/// Construction columns (`cons_*` aliases in the claim query).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructionColumns {
    pub idconstruccion: Option<ConstructionId>,
    pub identificador: Option<String>,
    pub tipo_construccion: Option<String>,
    /// `lc_construcciontipo.dispname`
    pub tipo_construccionname: Option<String>,
    pub anio_construccion: Option<i32>,
    pub avaluo_construccion: Option<f64>,
    pub area_construccion: Option<f64>,
    pub tipo_dominio: Option<String>,
    pub numero_pisos: Option<i32>,
    pub numero_sotanos: Option<i32>,
    pub numero_mezanines: Option<i32>,
    pub numero_semisotanos: Option<i32>,
    pub etiqueta: Option<String>,
    pub altura: Option<f64>,
    pub observaciones: Option<String>,
}

/// Construction unit columns (`uni_*` aliases in the claim query).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitColumns {
    pub idunidadconstruccion: Option<UnitId>,
    /// Parent construction (`lc_construccion`).
    pub idconstruccion: Option<ConstructionId>,
    pub identificador: Option<String>,
    pub tipo_construccion: Option<String>,
    /// `gc_unidadconstrucciontipo.dispname`
    pub tipo_construccionname: Option<String>,
    pub anio_construccion: Option<i32>,
}

/// One row of the claim join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub assignment: AssignmentColumns,
    pub property: PropertyColumns,
    pub address: AddressExtension,
    pub land: LandParcel,
    pub construction: ConstructionColumns,
    pub unit: UnitColumns,
}

impl JoinedRow {
    /// A row for `assignment` with every joined group empty.
    pub fn new(assignment: AssignmentColumns) -> Self {
        Self {
            assignment,
            property: PropertyColumns::default(),
            address: AddressExtension::default(),
            land: LandParcel::default(),
            construction: ConstructionColumns::default(),
            unit: UnitColumns::default(),
        }
    }

    pub fn assignment_id(&self) -> AssignmentId {
        self.assignment.idasignacion
    }

    pub fn property_id(&self) -> PropertyId {
        self.assignment.idpredio
    }

    /// Owner of the assignment this row belongs to.
    pub fn assigned_to(&self) -> Option<UserId> {
        self.assignment.usuario_asignado
    }
}
