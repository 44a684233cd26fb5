//! Row aggregation
//!
//! Folds the flat claim join back into one [`Property`] per property id with
//! its constructions and construction units nested underneath.
//!
//! Ordering: properties appear in the order their first row appears, and each
//! child collection keeps the order of first sight. Constructions are unique
//! per `(property, construction id)`. Units are appended once per row that
//! carries one.

use std::collections::{HashMap, HashSet};

use crate::error::AggregationError;
use crate::identity::{ConstructionId, PropertyId};
use crate::property::{Construction, ConstructionUnit, Property};
use crate::row::JoinedRow;

/// Incremental builder for the property tree.
///
/// The claim join repeats a property once per assignment on it, so a unit
/// reached through several assignments is appended once per assignment.
#[derive(Debug, Default)]
pub struct RowAggregator {
    properties: Vec<Property>,
    index: HashMap<PropertyId, usize>,
    seen_constructions: HashSet<(PropertyId, ConstructionId)>,
    rows: usize,
}

impl RowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one row into the tree.
    ///
    /// Fails closed on rows whose join is inconsistent; the builder is left
    /// as it was before the call.
    pub fn push(&mut self, row: &JoinedRow) -> Result<(), AggregationError> {
        Self::validate(row)?;

        let property_id = row.property_id();
        let slot = match self.index.get(&property_id) {
            Some(&slot) => slot,
            None => {
                self.properties.push(Property::from_first_row(row));
                let slot = self.properties.len() - 1;
                self.index.insert(property_id, slot);
                slot
            }
        };
        let property = &mut self.properties[slot];

        if let Some(construction) = Construction::from_columns(&row.construction) {
            if self
                .seen_constructions
                .insert((property_id, construction.idconstruccion))
            {
                property.construccion.push(construction);
            }
        }

        if let Some(unit) = ConstructionUnit::from_columns(&row.unit) {
            property.unidadconstruccion.push(unit);
        }

        self.rows += 1;
        Ok(())
    }

    fn validate(row: &JoinedRow) -> Result<(), AggregationError> {
        let expected = row.property_id();
        match row.property.predio_id {
            None => {
                return Err(AggregationError::MissingProperty {
                    assignment_id: row.assignment_id(),
                    property_id: expected,
                })
            }
            Some(found) if found != expected => {
                return Err(AggregationError::PropertyMismatch {
                    assignment_id: row.assignment_id(),
                    expected,
                    found,
                })
            }
            Some(_) => {}
        }

        if let Some(unit_id) = row.unit.idunidadconstruccion {
            let parent = row.unit.idconstruccion;
            let joined = row.construction.idconstruccion;
            if parent != joined {
                return Err(AggregationError::UnitParentMismatch {
                    unit_id,
                    parent,
                    joined,
                });
            }
        }

        Ok(())
    }

    /// Number of rows folded so far.
    pub fn rows_seen(&self) -> usize {
        self.rows
    }

    /// Number of distinct properties so far.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Consume the builder and return properties in first-seen order.
    pub fn finish(self) -> Vec<Property> {
        self.properties
    }
}

/// Aggregate a complete row set.
pub fn aggregate<'a, I>(rows: I) -> Result<Vec<Property>, AggregationError>
where
    I: IntoIterator<Item = &'a JoinedRow>,
{
    let mut aggregator = RowAggregator::new();
    for row in rows {
        aggregator.push(row)?;
    }
    Ok(aggregator.finish())
}
