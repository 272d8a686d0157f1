//! `StationGroup`: a named, time-bounded membership set.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct StationGroup {
    pub code: String,
    pub members: Vec<GroupMembership>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupMembership {
    pub fmisid: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl StationGroup {
    pub fn contains_at(&self, fmisid: i32, t: DateTime<Utc>) -> bool {
        self.members
            .iter()
            .any(|m| m.fmisid == fmisid && m.valid_from <= t && t < m.valid_to)
    }

    pub fn station_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.members.iter().map(|m| m.fmisid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn membership_respects_interval() {
        let group = StationGroup {
            code: "opendata".to_string(),
            members: vec![GroupMembership {
                fmisid: 1,
                valid_from: Utc.timestamp_opt(0, 0).unwrap(),
                valid_to: Utc.timestamp_opt(100, 0).unwrap(),
            }],
        };
        assert!(group.contains_at(1, Utc.timestamp_opt(50, 0).unwrap()));
        assert!(!group.contains_at(1, Utc.timestamp_opt(150, 0).unwrap()));
        assert!(!group.contains_at(2, Utc.timestamp_opt(50, 0).unwrap()));
    }
}
