//! GraphQL documents for the occupancy API
//!
//! Subscription documents are fixed per granularity; create and update
//! mutations are rendered from the set of fields actually supplied.

use crate::models::Granularity;

/// A field accepted by the create/update subscription-area mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationField {
    ZoneId,
    GroupId,
    LevelId,
    FloorNumber,
    Labels,
    Lat,
    Lon,
    Radius,
    Granularity,
}

impl MutationField {
    /// Canonical rendering order
    pub const ALL: [MutationField; 9] = [
        MutationField::ZoneId,
        MutationField::GroupId,
        MutationField::LevelId,
        MutationField::FloorNumber,
        MutationField::Labels,
        MutationField::Lat,
        MutationField::Lon,
        MutationField::Radius,
        MutationField::Granularity,
    ];

    /// Variable name, also the key in the variables object
    pub fn variable_name(&self) -> &'static str {
        match self {
            Self::ZoneId => "zone_id",
            Self::GroupId => "group_id",
            Self::LevelId => "level_id",
            Self::FloorNumber => "floor_number",
            Self::Labels => "labels",
            Self::Lat => "lat",
            Self::Lon => "lon",
            Self::Radius => "radius",
            Self::Granularity => "granularity",
        }
    }

    /// Argument name on the mutation field
    pub fn argument_name(&self) -> &'static str {
        match self {
            Self::ZoneId => "zoneId",
            Self::GroupId => "groupId",
            Self::LevelId => "levelId",
            Self::FloorNumber => "floorNumber",
            Self::Labels => "labels",
            Self::Lat => "lat",
            Self::Lon => "lon",
            Self::Radius => "radius",
            Self::Granularity => "granularity",
        }
    }

    fn graphql_type(&self) -> &'static str {
        match self {
            Self::ZoneId | Self::GroupId | Self::LevelId | Self::FloorNumber => "[Int]",
            Self::Labels => "[String]",
            Self::Lat | Self::Lon => "Float",
            Self::Radius => "Int",
            Self::Granularity => "SubscriptionGranularity",
        }
    }

    /// `$zone_id: [Int]`
    pub fn declaration(&self) -> String {
        format!("${}: {}", self.variable_name(), self.graphql_type())
    }

    /// `zoneId: $zone_id`
    pub fn assignment(&self) -> String {
        format!("{}: ${}", self.argument_name(), self.variable_name())
    }
}

/// Variable declarations and argument assignments for the supplied fields
///
/// Output follows canonical field order regardless of input order.
pub fn render_params(fields: &[MutationField]) -> (Vec<String>, Vec<String>) {
    MutationField::ALL
        .iter()
        .filter(|f| fields.contains(f))
        .map(|f| (f.declaration(), f.assignment()))
        .unzip()
}

const SUBSCRIPTION_AREA_SELECTION: &str = r#"
    id
    location {
      lat
      lon
    }
    radius
    granularity
    expiresOn
    groupId
    levelId
    floorNumber
    zoneId
    labels"#;

const SUMMARY_SELECTION: &str = r#"summary {
          available
          occupied
          total
          undefined
        }"#;

/// Mutation creating a subscription area from the supplied fields
pub fn create_subscription_area(fields: &[MutationField]) -> String {
    let (outer, inner) = render_params(fields);
    format!(
        "mutation CreateSubscriptionAreaMutation(\n  {}\n) {{\n  createSubscriptionArea(\n    {}\n  ) {{{}\n  }}\n}}\n",
        outer.join(",\n  "),
        inner.join(",\n    "),
        SUBSCRIPTION_AREA_SELECTION
    )
}

/// Mutation updating only the supplied fields of an area
///
/// With no fields this just refreshes the area's expiry.
pub fn update_subscription_area(fields: &[MutationField]) -> String {
    let (outer, inner) = render_params(fields);
    let outer = std::iter::once("$id: ID!".to_string())
        .chain(outer)
        .collect::<Vec<_>>();
    let inner = std::iter::once("id: $id".to_string())
        .chain(inner)
        .collect::<Vec<_>>();
    format!(
        "mutation UpdateSubscriptionAreaMutation(\n  {}\n) {{\n  updateSubscriptionArea(\n    {}\n  ) {{{}\n  }}\n}}\n",
        outer.join(",\n  "),
        inner.join(",\n    "),
        SUBSCRIPTION_AREA_SELECTION
    )
}

/// Subscription document for a granularity, taking `$sub_area_id: ID!`
pub fn subscription_for(granularity: Granularity) -> String {
    let (name, updates) = match granularity {
        Granularity::Zone => (
            "ZoneOccupancySubscription",
            format!(
                r#"... on ZoneOccupancy {{
        id
        name
        projectId
        {}
      }}"#,
                SUMMARY_SELECTION
            ),
        ),
        Granularity::Level => (
            "LevelOccupancySubscription",
            format!(
                r#"... on LevelOccupancy {{
        id
        name
        floorNumber
        zoneId
        {}
      }}"#,
                SUMMARY_SELECTION
            ),
        ),
        Granularity::Group => (
            "GroupOccupancySubscription",
            format!(
                r#"... on GroupOccupancy {{
        id
        name
        customId
        groupType
        levelId
        zoneId
        location {{
          lat
          lon
        }}
        positionsOccupancy {{
          customId
          groupId
          id
          location {{
            lat
            lon
          }}
          occupancyStatus
          statusChangeTime
        }}
        {}
      }}"#,
                SUMMARY_SELECTION
            ),
        ),
        Granularity::Position => (
            "PositionOccupancySubscription",
            r#"... on PositionOccupancy {
        id
        customId
        groupId
        location {
          lat
          lon
        }
        occupancyStatus
        statusChangeTime
      }"#
            .to_string(),
        ),
    };

    format!(
        r#"subscription {name}($sub_area_id: ID!) {{
  onSubscriptionAreaUpdates(id: $sub_area_id) {{
    expiresOn
    floorNumber
    granularity
    groupId
    id
    labels
    levelId
    location {{
      lat
      lon
    }}
    radius
    updateTime
    zoneId
    updates {{
      {updates}
    }}
  }}
}}
"#
    )
}

/// Query listing group occupancies with their level and zone
pub const FIND_GROUP_OCCUPANCIES: &str = r#"query FindGroupOccupancies(
  $ids: [Int],
  $project_id: Int,
  $radius: Int,
  $lon: Float,
  $lat: Float,
  $level_id: [Int!],
  $limit: Int,
  $offset: Int,
  $zone_id: [Int!],
  $group_custom_id: String,
  $floor_number: [Int!]
) {
  findGroupOccupancies(
    floorNumber: $floor_number,
    groupCustomId: $group_custom_id,
    ids: $ids,
    lat: $lat,
    levelId: $level_id,
    limit: $limit,
    lon: $lon,
    offset: $offset,
    projectId: $project_id,
    radius: $radius,
    zoneId: $zone_id
  ) {
    levelId
    zoneId
    summary {
      available
      occupied
      total
      undefined
    }
  }
}
"#;
