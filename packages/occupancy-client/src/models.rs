//! Domain types for subscription areas and occupancy records

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::documents::MutationField;
use crate::error::{OccupancyError, OccupancyResult};

// =============================================================================
// Granularity
// =============================================================================

/// Occupancy grouping granularity of a subscription area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Position,
    Group,
    Level,
    Zone,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Position,
        Granularity::Group,
        Granularity::Level,
        Granularity::Zone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Position => "Position",
            Self::Group => "Group",
            Self::Level => "Level",
            Self::Zone => "Zone",
        }
    }
}

impl AsRef<str> for Granularity {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for Granularity {
    type Err = OccupancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| OccupancyError::UnsupportedGranularity(s.to_string()))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Three-state field
// =============================================================================

/// A mutation field that is either left out, explicitly cleared, or set
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Patch<T> {
    /// Not sent at all
    #[default]
    Absent,
    /// Sent as `null`
    Null,
    /// Sent with a value
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Patch::Value(_))
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<T> for Patch<T> {
    fn from(value: T) -> Self {
        Patch::Value(value)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Value(v) => v.serialize(serializer),
            Patch::Absent | Patch::Null => serializer.serialize_none(),
        }
    }
}

// =============================================================================
// Shared value types
// =============================================================================

/// Geospatial coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Summary of position occupancies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OccupancySummary {
    pub total: i64,
    pub occupied: i64,
    pub available: i64,
    pub undefined: i64,
}

impl OccupancySummary {
    pub fn new(total: i64, occupied: i64, available: i64, undefined: i64) -> Self {
        Self {
            total,
            occupied,
            available,
            undefined,
        }
    }
}

impl Add for OccupancySummary {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            total: self.total + rhs.total,
            occupied: self.occupied + rhs.occupied,
            available: self.available + rhs.available,
            undefined: self.undefined + rhs.undefined,
        }
    }
}

impl AddAssign for OccupancySummary {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for OccupancySummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a OccupancySummary> for OccupancySummary {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Subscription areas
// =============================================================================

/// Hierarchy filters shared by create and update requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyFilters {
    pub zone_id: Patch<Vec<i64>>,
    pub group_id: Patch<Vec<i64>>,
    pub level_id: Patch<Vec<i64>>,
    pub floor_number: Patch<Vec<i64>>,
    pub labels: Patch<Vec<String>>,
}

impl HierarchyFilters {
    fn any_present(&self) -> bool {
        let non_empty = |p: &Patch<Vec<i64>>| p.as_value().is_some_and(|v| !v.is_empty());
        non_empty(&self.zone_id)
            || non_empty(&self.group_id)
            || non_empty(&self.level_id)
            || non_empty(&self.floor_number)
            || self.labels.as_value().is_some_and(|v| !v.is_empty())
    }
}

/// Geospatial filter fields; all three or none
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoFilter {
    pub lat: Patch<f64>,
    pub lon: Patch<f64>,
    pub radius: Patch<i64>,
}

impl GeoFilter {
    fn validate(&self) -> OccupancyResult<bool> {
        let supplied = [self.lat.is_value(), self.lon.is_value(), self.radius.is_value()];
        if supplied.iter().any(|s| *s) {
            if supplied.iter().all(|s| *s) {
                return Ok(true);
            }
            return Err(OccupancyError::Validation(
                "Incomplete geospatial filter (lat, lon, radius)".to_string(),
            ));
        }
        Ok(false)
    }
}

fn insert_field<T: Serialize>(
    fields: &mut Vec<MutationField>,
    variables: &mut Map<String, Value>,
    field: MutationField,
    patch: &Patch<T>,
) -> OccupancyResult<()> {
    if patch.is_absent() {
        return Ok(());
    }
    fields.push(field);
    variables.insert(field.variable_name().to_string(), serde_json::to_value(patch)?);
    Ok(())
}

/// Supplied fields in canonical order plus their variable bindings
fn collect_fields(
    filters: &HierarchyFilters,
    granularity: &Patch<Granularity>,
    geo: &GeoFilter,
) -> OccupancyResult<(Vec<MutationField>, Map<String, Value>)> {
    let mut fields = Vec::new();
    let mut variables = Map::new();

    insert_field(&mut fields, &mut variables, MutationField::ZoneId, &filters.zone_id)?;
    insert_field(&mut fields, &mut variables, MutationField::GroupId, &filters.group_id)?;
    insert_field(&mut fields, &mut variables, MutationField::LevelId, &filters.level_id)?;
    insert_field(&mut fields, &mut variables, MutationField::FloorNumber, &filters.floor_number)?;
    insert_field(&mut fields, &mut variables, MutationField::Labels, &filters.labels)?;
    insert_field(&mut fields, &mut variables, MutationField::Lat, &geo.lat)?;
    insert_field(&mut fields, &mut variables, MutationField::Lon, &geo.lon)?;
    insert_field(&mut fields, &mut variables, MutationField::Radius, &geo.radius)?;
    insert_field(&mut fields, &mut variables, MutationField::Granularity, granularity)?;

    Ok((fields, variables))
}

/// Set an optional field to explicit `null`; false if the field is not a filter
fn clear_filter(filters: &mut HierarchyFilters, geo: &mut GeoFilter, field: MutationField) -> bool {
    match field {
        MutationField::ZoneId => filters.zone_id = Patch::Null,
        MutationField::GroupId => filters.group_id = Patch::Null,
        MutationField::LevelId => filters.level_id = Patch::Null,
        MutationField::FloorNumber => filters.floor_number = Patch::Null,
        MutationField::Labels => filters.labels = Patch::Null,
        MutationField::Lat => geo.lat = Patch::Null,
        MutationField::Lon => geo.lon = Patch::Null,
        MutationField::Radius => geo.radius = Patch::Null,
        MutationField::Granularity => return false,
    }
    true
}

macro_rules! filter_setters {
    () => {
        pub fn zone_id(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
            self.filters.zone_id = Patch::Value(ids.into_iter().collect());
            self
        }

        pub fn group_id(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
            self.filters.group_id = Patch::Value(ids.into_iter().collect());
            self
        }

        pub fn level_id(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
            self.filters.level_id = Patch::Value(ids.into_iter().collect());
            self
        }

        pub fn floor_number(mut self, floors: impl IntoIterator<Item = i64>) -> Self {
            self.filters.floor_number = Patch::Value(floors.into_iter().collect());
            self
        }

        pub fn labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
            self.filters.labels = Patch::Value(labels.into_iter().map(Into::into).collect());
            self
        }

        /// Set the whole geospatial trio
        pub fn near(mut self, lat: f64, lon: f64, radius: i64) -> Self {
            self.geo = GeoFilter {
                lat: Patch::Value(lat),
                lon: Patch::Value(lon),
                radius: Patch::Value(radius),
            };
            self
        }

        pub fn lat(mut self, lat: f64) -> Self {
            self.geo.lat = Patch::Value(lat);
            self
        }

        pub fn lon(mut self, lon: f64) -> Self {
            self.geo.lon = Patch::Value(lon);
            self
        }

        pub fn radius(mut self, radius: i64) -> Self {
            self.geo.radius = Patch::Value(radius);
            self
        }
    };
}

/// Request to create a subscription area
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionAreaCreate {
    pub granularity: Granularity,
    pub filters: HierarchyFilters,
    pub geo: GeoFilter,
}

impl SubscriptionAreaCreate {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            filters: HierarchyFilters::default(),
            geo: GeoFilter::default(),
        }
    }

    filter_setters!();

    /// Send `field` as explicit `null`
    pub fn clear(mut self, field: MutationField) -> Self {
        clear_filter(&mut self.filters, &mut self.geo, field);
        self
    }

    /// Require a complete geospatial trio or at least one hierarchy filter
    pub fn validate(&self) -> OccupancyResult<()> {
        if self.geo.validate()? {
            return Ok(());
        }
        if !self.filters.any_present() {
            return Err(OccupancyError::Validation(
                "At least one filtering option has to be provided".to_string(),
            ));
        }
        Ok(())
    }

    /// Supplied mutation fields and their variable bindings
    pub fn mutation_params(&self) -> OccupancyResult<(Vec<MutationField>, Value)> {
        let (fields, variables) =
            collect_fields(&self.filters, &Patch::Value(self.granularity), &self.geo)?;
        Ok((fields, Value::Object(variables)))
    }
}

/// Partial update of an existing subscription area
///
/// Only supplied fields are sent; an update with nothing supplied just
/// extends the area's expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionAreaUpdate {
    pub id: i64,
    pub granularity: Patch<Granularity>,
    pub filters: HierarchyFilters,
    pub geo: GeoFilter,
}

impl SubscriptionAreaUpdate {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            granularity: Patch::Absent,
            filters: HierarchyFilters::default(),
            geo: GeoFilter::default(),
        }
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Patch::Value(granularity);
        self
    }

    filter_setters!();

    /// Send `field` as explicit `null`
    pub fn clear(mut self, field: MutationField) -> Self {
        if !clear_filter(&mut self.filters, &mut self.geo, field) {
            self.granularity = Patch::Null;
        }
        self
    }

    pub fn validate(&self) -> OccupancyResult<()> {
        self.geo.validate().map(|_| ())
    }

    /// Supplied mutation fields and their variable bindings, `id` included
    pub fn mutation_params(&self) -> OccupancyResult<(Vec<MutationField>, Value)> {
        let (fields, mut variables) = collect_fields(&self.filters, &self.granularity, &self.geo)?;
        variables.insert("id".to_string(), Value::from(self.id));
        Ok((fields, Value::Object(variables)))
    }
}

/// A subscription area as returned by the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionArea {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
    pub granularity: Granularity,
    #[serde(default)]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub radius: Option<i64>,
    #[serde(default)]
    pub zone_id: Option<Vec<i64>>,
    #[serde(default)]
    pub group_id: Option<Vec<i64>>,
    #[serde(default)]
    pub level_id: Option<Vec<i64>>,
    #[serde(default)]
    pub floor_number: Option<Vec<i64>>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// GraphQL `ID` values arrive as strings; accept numbers too
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Occupancy records
// =============================================================================

/// One row of `findGroupOccupancies`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOccupancyRecord {
    #[serde(default)]
    pub level_id: Option<i64>,
    #[serde(default)]
    pub zone_id: Option<i64>,
    #[serde(default)]
    pub summary: Option<OccupancySummary>,
}

/// Occupancy totals for one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneOccupancy {
    pub id: Option<i64>,
    pub summary: OccupancySummary,
}

/// Occupancy totals for one level within a zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelOccupancy {
    pub id: Option<i64>,
    pub zone_id: Option<i64>,
    pub summary: OccupancySummary,
}

/// Filters for `findGroupOccupancies`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OccupancyFilter {
    /// Group ids
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_id: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_number: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl OccupancyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone(mut self, zone_id: i64) -> Self {
        self.zone_id = Some(vec![zone_id]);
        self
    }

    pub fn floor(mut self, floor_number: i64) -> Self {
        self.floor_number = Some(vec![floor_number]);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> OccupancyResult<()> {
        let supplied = [self.lat.is_some(), self.lon.is_some(), self.radius.is_some()];
        if supplied.iter().any(|s| *s) && !supplied.iter().all(|s| *s) {
            return Err(OccupancyError::Validation(
                "Incomplete geospatial filter (lat, lon, radius)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_granularity_parsing() {
        assert_eq!("Zone".parse::<Granularity>().unwrap(), Granularity::Zone);
        assert_eq!("Position".parse::<Granularity>().unwrap(), Granularity::Position);
        assert_matches!(
            "Invalid".parse::<Granularity>(),
            Err(OccupancyError::UnsupportedGranularity(g)) if g == "Invalid"
        );
        // Case matters on the wire
        assert!("zone".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_create_requires_a_filter() {
        let request = SubscriptionAreaCreate::new(Granularity::Zone);
        assert_matches!(request.validate(), Err(OccupancyError::Validation(_)));

        let request = SubscriptionAreaCreate::new(Granularity::Zone).zone_id([]);
        assert_matches!(request.validate(), Err(OccupancyError::Validation(_)));
    }

    #[test]
    fn test_create_with_hierarchy_filter() {
        let request = SubscriptionAreaCreate::new(Granularity::Zone).zone_id([1]);
        assert!(request.validate().is_ok());

        let request = SubscriptionAreaCreate::new(Granularity::Level).labels(["EV"]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_create_with_full_geo_trio() {
        let request = SubscriptionAreaCreate::new(Granularity::Group).near(51.5, -0.12, 300);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_create_partial_geo_rejected_even_with_hierarchy() {
        let request = SubscriptionAreaCreate::new(Granularity::Zone)
            .zone_id([1])
            .lat(51.5)
            .lon(-0.12);
        assert_matches!(request.validate(), Err(OccupancyError::Validation(msg)) if msg.contains("geospatial"));
    }

    #[test]
    fn test_explicit_null_is_not_a_filter() {
        let request = SubscriptionAreaCreate::new(Granularity::Zone).clear(MutationField::ZoneId);
        assert_matches!(request.validate(), Err(OccupancyError::Validation(_)));
    }

    #[test]
    fn test_create_mutation_params() {
        let request = SubscriptionAreaCreate::new(Granularity::Zone)
            .zone_id([777])
            .clear(MutationField::GroupId);
        let (fields, variables) = request.mutation_params().unwrap();

        assert_eq!(
            fields,
            vec![
                MutationField::ZoneId,
                MutationField::GroupId,
                MutationField::Granularity
            ]
        );
        assert_eq!(
            variables,
            json!({"zone_id": [777], "group_id": null, "granularity": "Zone"})
        );
    }

    #[test]
    fn test_update_labels_only() {
        let update = SubscriptionAreaUpdate::new(12).labels(["EV"]);
        let (fields, variables) = update.mutation_params().unwrap();

        assert_eq!(fields, vec![MutationField::Labels]);
        assert_eq!(variables, json!({"id": 12, "labels": ["EV"]}));
    }

    #[test]
    fn test_update_partial_geo_rejected() {
        let update = SubscriptionAreaUpdate::new(12).radius(100);
        assert_matches!(update.validate(), Err(OccupancyError::Validation(_)));

        let cleared = SubscriptionAreaUpdate::new(12)
            .clear(MutationField::Lat)
            .clear(MutationField::Lon)
            .clear(MutationField::Radius);
        assert!(cleared.validate().is_ok());
    }

    #[test]
    fn test_subscription_area_deserialization() {
        let raw = json!({
            "id": "4521",
            "granularity": "Level",
            "expiresOn": "2024-05-01T10:00:00Z",
            "location": null,
            "radius": null,
            "zoneId": [777],
            "groupId": null,
            "levelId": null,
            "floorNumber": [0],
            "labels": null
        });
        let area: SubscriptionArea = serde_json::from_value(raw).unwrap();
        assert_eq!(area.id, 4521);
        assert_eq!(area.granularity, Granularity::Level);
        assert_eq!(area.zone_id, Some(vec![777]));
        assert!(area.expires_on.is_some());
    }

    #[test]
    fn test_summary_sum() {
        let summaries = [
            OccupancySummary::new(5, 2, 3, 0),
            OccupancySummary::new(3, 1, 1, 1),
        ];
        let total: OccupancySummary = summaries.iter().sum();
        assert_eq!(total, OccupancySummary::new(8, 3, 4, 1));
    }

    #[test]
    fn test_occupancy_filter_serialization() {
        let filter = OccupancyFilter::new().zone(777).limit(100);
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"zone_id": [777], "limit": 100})
        );

        let partial = OccupancyFilter {
            lat: Some(1.0),
            ..Default::default()
        };
        assert_matches!(partial.validate(), Err(OccupancyError::Validation(_)));
    }
}
