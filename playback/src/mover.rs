use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{Coord, RenderHandle, RenderSink};

/// Which feed a mover comes from, like "bd" or "net". Picks the family of icons.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Category(pub String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Default for Category {
    fn default() -> Self {
        Self("bd".to_string())
    }
}

/// What's moving
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    Default,
    Person,
    Vehicle,
    Vessel,
    Aircraft,
}

impl Default for Kind {
    fn default() -> Self {
        Kind::Default
    }
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Default,
        Kind::Person,
        Kind::Vehicle,
        Kind::Vessel,
        Kind::Aircraft,
    ];

    /// The numeric "show type" used by position feeds
    pub fn from_id(id: u8) -> Result<Self> {
        match Kind::ALL.get(id as usize) {
            Some(kind) => Ok(*kind),
            None => bail!("Unknown mover kind {}", id),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Default => "normal",
            Kind::Person => "man",
            Kind::Vehicle => "car",
            Kind::Vessel => "ship",
            Kind::Aircraft => "aircraft",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Normal,
    Warning,
    Alarm,
}

impl Default for Status {
    fn default() -> Self {
        Status::Normal
    }
}

/// An opaque reference to an icon, interpreted by the render sink.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IconRef(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct IconKey {
    category: Category,
    kind: Kind,
    status: Status,
}

/// Read-only lookup from (category, kind, status) to an icon. Shared by every mover.
#[derive(Clone, Default)]
pub struct IconTable {
    icons: BTreeMap<IconKey, IconRef>,
}

impl IconTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The normal-status icons for the two feeds and every kind
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for category in ["bd", "net"] {
            for kind in Kind::ALL {
                let name = match kind {
                    Kind::Default => format!("{}_normalGeoImg", category),
                    _ => format!("{}_{}_normalGeoImg", category, kind.name()),
                };
                table.insert(Category::new(category), kind, Status::Normal, IconRef(name));
            }
        }
        table
    }

    pub fn insert(&mut self, category: Category, kind: Kind, status: Status, icon: IconRef) {
        self.icons.insert(
            IconKey {
                category,
                kind,
                status,
            },
            icon,
        );
    }

    /// Falls back to the default kind with normal status when there's no exact match.
    pub fn lookup(&self, category: &Category, kind: Kind, status: Status) -> Option<&IconRef> {
        let key = IconKey {
            category: category.clone(),
            kind,
            status,
        };
        if let Some(icon) = self.icons.get(&key) {
            return Some(icon);
        }
        self.icons.get(&IconKey {
            category: category.clone(),
            kind: Kind::Default,
            status: Status::Normal,
        })
    }
}

/// The marker for one moving entity.
pub struct Mover {
    handle: RenderHandle,
    category: Category,
    kind: Kind,
    status: Status,
    coordinate: Option<Coord>,
    icon: Option<IconRef>,
    icons: Rc<IconTable>,
}

impl Mover {
    pub fn new(handle: RenderHandle, category: Category, kind: Kind, icons: Rc<IconTable>) -> Self {
        Self {
            handle,
            category,
            kind,
            status: Status::Normal,
            coordinate: None,
            icon: None,
            icons,
        }
    }

    pub fn init(&mut self, coordinate: &[f64], sink: &mut dyn RenderSink) -> Result<()> {
        let pt = Coord::from_slice(coordinate)?;
        self.refresh_icon(sink);
        self.coordinate = Some(pt);
        sink.set_position(&self.handle, pt);
        Ok(())
    }

    /// Returns true if the mover actually moved. Same coordinate means no-op, compared exactly.
    pub fn update(&mut self, pt: Coord, sink: &mut dyn RenderSink) -> bool {
        if self.coordinate == Some(pt) {
            return false;
        }
        self.coordinate = Some(pt);
        sink.set_position(&self.handle, pt);
        true
    }

    pub fn set_category(&mut self, category: Category, kind: Kind, sink: &mut dyn RenderSink) {
        self.category = category;
        self.kind = kind;
        self.refresh_icon(sink);
    }

    pub fn set_status(&mut self, status: Status, sink: &mut dyn RenderSink) {
        if self.status != status {
            self.status = status;
            self.refresh_icon(sink);
        }
    }

    /// Push the current icon and position, after attaching to a sink.
    pub fn show(&self, sink: &mut dyn RenderSink) {
        if let Some(ref icon) = self.icon {
            sink.set_icon(&self.handle, icon);
        }
        if let Some(pt) = self.coordinate {
            sink.set_position(&self.handle, pt);
        }
    }

    fn refresh_icon(&mut self, sink: &mut dyn RenderSink) {
        self.icon = self
            .icons
            .lookup(&self.category, self.kind, self.status)
            .cloned();
        match self.icon {
            Some(ref icon) => sink.set_icon(&self.handle, icon),
            None => warn!(
                "No icon for {:?} {:?} {:?}",
                self.category, self.kind, self.status
            ),
        }
    }

    pub fn coordinate(&self) -> Option<Coord> {
        self.coordinate
    }

    pub fn handle(&self) -> &RenderHandle {
        &self.handle
    }

    pub fn icon(&self) -> Option<&IconRef> {
        self.icon.as_ref()
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordingSink, SinkEvent, TrackID};

    fn mover() -> Mover {
        Mover::new(
            RenderHandle::Mover(TrackID("bd_1".to_string())),
            Category::default(),
            Kind::Vehicle,
            Rc::new(IconTable::builtin()),
        )
    }

    #[test]
    fn init_checks_shape() {
        let mut sink = RecordingSink::new();
        let mut mover = mover();
        assert!(mover.init(&[1.0, 2.0, 3.0], &mut sink).is_err());
        assert!(mover.init(&[1.0], &mut sink).is_err());
        assert_eq!(mover.coordinate(), None);

        mover.init(&[1.0, 2.0], &mut sink).unwrap();
        assert_eq!(mover.coordinate(), Some(Coord::new(1.0, 2.0)));
        assert_eq!(mover.icon(), Some(&IconRef("bd_car_normalGeoImg".to_string())));
    }

    #[test]
    fn update_skips_same_coordinate() {
        let mut sink = RecordingSink::new();
        let mut mover = mover();
        mover.init(&[1.0, 2.0], &mut sink).unwrap();
        let before = sink.events.len();

        assert!(!mover.update(Coord::new(1.0, 2.0), &mut sink));
        assert_eq!(sink.events.len(), before);

        assert!(mover.update(Coord::new(1.0, 2.5), &mut sink));
        assert_eq!(
            sink.last_position(mover.handle()),
            Some(Coord::new(1.0, 2.5))
        );
    }

    #[test]
    fn change_icon_without_moving() {
        let mut sink = RecordingSink::new();
        let mut mover = mover();
        mover.init(&[1.0, 2.0], &mut sink).unwrap();
        let positions = sink.count_positions(mover.handle());

        mover.set_category(Category::new("net"), Kind::Vessel, &mut sink);
        assert_eq!(sink.count_positions(mover.handle()), positions);
        assert_eq!(
            sink.events.last(),
            Some(&SinkEvent::Icon(
                mover.handle().clone(),
                IconRef("net_ship_normalGeoImg".to_string())
            ))
        );

        // No alarm icons are built in, so fall back to the default one for the feed
        mover.set_status(Status::Alarm, &mut sink);
        assert_eq!(mover.icon(), Some(&IconRef("net_normalGeoImg".to_string())));
    }

    #[test]
    fn unknown_kind() {
        assert_eq!(Kind::from_id(4).unwrap(), Kind::Aircraft);
        assert!(Kind::from_id(5).is_err());
    }
}
