//! Aggregation of group occupancy records

use std::collections::HashMap;
use std::hash::Hash;

use crate::models::{GroupOccupancyRecord, LevelOccupancy, OccupancySummary, ZoneOccupancy};

/// Total of a list of summaries
pub fn sum_summaries<'a>(summaries: impl IntoIterator<Item = &'a OccupancySummary>) -> OccupancySummary {
    summaries.into_iter().sum()
}

/// Sum summaries per key, keeping first-seen key order; records without a
/// summary are skipped
fn group_by<K, F>(records: &[GroupOccupancyRecord], key: F) -> Vec<(K, OccupancySummary)>
where
    K: Eq + Hash + Copy,
    F: Fn(&GroupOccupancyRecord) -> K,
{
    let mut order: Vec<K> = Vec::new();
    let mut totals: HashMap<K, OccupancySummary> = HashMap::new();

    for record in records {
        let Some(summary) = record.summary else {
            continue;
        };
        let k = key(record);
        totals
            .entry(k)
            .and_modify(|total| *total += summary)
            .or_insert_with(|| {
                order.push(k);
                summary
            });
    }

    order
        .into_iter()
        .filter_map(|k| totals.remove(&k).map(|summary| (k, summary)))
        .collect()
}

/// One entry per zone
pub fn group_by_zone(records: &[GroupOccupancyRecord]) -> Vec<ZoneOccupancy> {
    group_by(records, |r| r.zone_id)
        .into_iter()
        .map(|(id, summary)| ZoneOccupancy { id, summary })
        .collect()
}

/// One entry per (level, zone) pair
pub fn group_by_level(records: &[GroupOccupancyRecord]) -> Vec<LevelOccupancy> {
    group_by(records, |r| (r.level_id, r.zone_id))
        .into_iter()
        .map(|((id, zone_id), summary)| LevelOccupancy {
            id,
            zone_id,
            summary,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: i64, zone: i64, summary: Option<OccupancySummary>) -> GroupOccupancyRecord {
        GroupOccupancyRecord {
            level_id: Some(level),
            zone_id: Some(zone),
            summary,
        }
    }

    #[test]
    fn test_sum_summaries() {
        let summaries = [
            OccupancySummary::new(5, 2, 3, 0),
            OccupancySummary::new(3, 1, 1, 1),
        ];
        assert_eq!(sum_summaries(&summaries), OccupancySummary::new(8, 3, 4, 1));
        assert_eq!(sum_summaries(&Vec::<OccupancySummary>::new()), OccupancySummary::default());
    }

    #[test]
    fn test_group_by_zone() {
        let records = vec![
            record(1, 777, Some(OccupancySummary::new(5, 2, 3, 0))),
            record(2, 888, Some(OccupancySummary::new(1, 1, 0, 0))),
            record(2, 777, Some(OccupancySummary::new(3, 1, 1, 1))),
            record(3, 777, None),
        ];

        let zones = group_by_zone(&records);
        assert_eq!(
            zones,
            vec![
                ZoneOccupancy {
                    id: Some(777),
                    summary: OccupancySummary::new(8, 3, 4, 1)
                },
                ZoneOccupancy {
                    id: Some(888),
                    summary: OccupancySummary::new(1, 1, 0, 0)
                },
            ]
        );
    }

    #[test]
    fn test_group_by_level_keys_on_level_and_zone() {
        let records = vec![
            record(1, 777, Some(OccupancySummary::new(5, 2, 3, 0))),
            record(1, 777, Some(OccupancySummary::new(3, 1, 1, 1))),
            record(1, 888, Some(OccupancySummary::new(2, 0, 2, 0))),
        ];

        let levels = group_by_level(&records);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].id, Some(1));
        assert_eq!(levels[0].zone_id, Some(777));
        assert_eq!(levels[0].summary, OccupancySummary::new(8, 3, 4, 1));
        assert_eq!(levels[1].zone_id, Some(888));
    }
}
