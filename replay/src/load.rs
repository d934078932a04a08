use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use playback::{Category, CoordSystem, Kind, RawPoint, Report, TrackInput};

/// Group position records by their source, keeping file order within each source.
pub fn load<R: std::io::Read>(reader: R) -> Result<BTreeMap<String, Vec<Record>>> {
    let mut per_source: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: Record = rec?;
        per_source
            .entry(rec.source.clone())
            .or_insert_with(Vec::new)
            .push(rec);
    }
    Ok(per_source)
}

#[derive(Clone, Debug, Deserialize)]
pub struct Record {
    /// Like "bd_122" or just "122"
    pub source: String,
    pub x: f64,
    pub y: f64,
    /// Milliseconds, or seconds since the epoch
    pub time: i64,
    #[serde(default)]
    pub system: Option<u8>,
    #[serde(default)]
    pub kind: Option<u8>,
}

impl Record {
    pub fn to_report(&self) -> Report {
        Report {
            system: self.system,
            kind: self.kind,
            ..Report::new(self.x, self.y, self.time)
        }
    }

    fn to_raw(&self) -> Result<RawPoint> {
        let pt = RawPoint::new(self.x, self.y, self.time);
        Ok(match self.system {
            Some(id) => pt.in_system(CoordSystem::from_id(id)?),
            None => pt,
        })
    }
}

pub fn to_track_input(source: &str, records: &[Record]) -> Result<TrackInput> {
    let (category, source_id) = match source.split_once('_') {
        Some((category, number)) => (Category::new(category), number.to_string()),
        None => (Category::default(), source.to_string()),
    };
    let kind = match records.first().and_then(|rec| rec.kind) {
        Some(id) => Kind::from_id(id)?,
        None => Kind::Default,
    };
    let mut points = Vec::new();
    for rec in records {
        points.push(rec.to_raw()?);
    }
    Ok(TrackInput {
        source_id: Some(source_id),
        category,
        kind,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_by_source() {
        let csv = "source,x,y,time,system,kind
bd_1,104.0,30.0,1000,2,
net_7,1.0,2.0,5000,,3
bd_1,104.1,30.1,2000,2,
";
        let groups = load(csv.as_bytes()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["bd_1"].len(), 2);
        assert_eq!(groups["bd_1"][1].time, 2000);

        let input = to_track_input("net_7", &groups["net_7"]).unwrap();
        assert_eq!(input.category, Category::new("net"));
        assert_eq!(input.source_id.as_deref(), Some("7"));
        assert_eq!(input.kind, Kind::Vessel);
        assert_eq!(input.points[0].system, None);

        let input = to_track_input("bd_1", &groups["bd_1"]).unwrap();
        assert_eq!(input.points[1].system, Some(CoordSystem::Bd09));
    }

    #[test]
    fn bad_system() {
        let groups = load("source,x,y,time,system\n1,0,0,0,9\n".as_bytes()).unwrap();
        assert!(to_track_input("1", &groups["1"]).is_err());
    }
}
