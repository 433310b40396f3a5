use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::net::error::Error;

/// A position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldPos {
    pub x: f64,
    pub y: f64,
}

impl WorldPos {
    pub fn from(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for WorldPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The spatial-ownership strategy a server announces to its peers. The
/// wire form carries the strategy tag, so a receiver reconstructs the
/// concrete variant without knowing it in advance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Region {
    /// Axis-aligned rectangle, half-open on the upper bounds: adjacent
    /// rectangles sharing an edge partition the boundary line without
    /// overlap or gap.
    Rect {
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
    },
    /// Owns every point. The default when no partitioning is configured.
    WholeWorld,
}

impl Region {
    pub fn rect(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Region::Rect {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// True if this server is authoritative for the given position.
    pub fn is_responsible_for(&self, pos: &WorldPos) -> bool {
        match self {
            Region::Rect {
                min_x,
                max_x,
                min_y,
                max_y,
            } => pos.x >= *min_x && pos.x < *max_x && pos.y >= *min_y && pos.y < *max_y,
            Region::WholeWorld => true,
        }
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).expect("region encodes as json")
    }

    pub fn from_wire(raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw).map_err(Error::MalformedRegion)
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::WholeWorld
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Rect {
                min_x,
                max_x,
                min_y,
                max_y,
            } => write!(
                f,
                "minX = {}, maxX = {}, minY = {}, maxY = {}",
                min_x, max_x, min_y, max_y
            ),
            Region::WholeWorld => write!(f, "whole world"),
        }
    }
}

type ChangeObserver = Box<dyn Fn(&Region) + Send + Sync>;

/// The live domain of responsibility of this server instance. Bounds are
/// mutable at runtime; every setter call fires the registered observers,
/// including a call that sets a bound to its current value. Setters only
/// affect the rectangle strategy, the notification fires regardless.
pub struct Dor {
    region: Mutex<Region>,
    observers: Mutex<Vec<ChangeObserver>>,
}

impl Dor {
    pub fn new(region: Region) -> Self {
        Self {
            region: Mutex::new(region),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// The current region, copied out at the instant of the call.
    pub fn region(&self) -> Region {
        *self.region.lock().expect("dor bounds lock poisoned")
    }

    pub fn is_responsible_for(&self, pos: &WorldPos) -> bool {
        self.region().is_responsible_for(pos)
    }

    pub fn to_wire(&self) -> String {
        self.region().to_wire()
    }

    /// Registers an observer fired synchronously, on the mutating thread,
    /// after every bound change.
    pub fn on_changed(&self, observer: impl Fn(&Region) + Send + Sync + 'static) {
        self.observers
            .lock()
            .expect("dor observer lock poisoned")
            .push(Box::new(observer));
    }

    pub fn set_min_x(&self, value: f64) {
        self.mutate(|region| {
            if let Region::Rect { min_x, .. } = region {
                *min_x = value;
            }
        });
    }

    pub fn set_max_x(&self, value: f64) {
        self.mutate(|region| {
            if let Region::Rect { max_x, .. } = region {
                *max_x = value;
            }
        });
    }

    pub fn set_min_y(&self, value: f64) {
        self.mutate(|region| {
            if let Region::Rect { min_y, .. } = region {
                *min_y = value;
            }
        });
    }

    pub fn set_max_y(&self, value: f64) {
        self.mutate(|region| {
            if let Region::Rect { max_y, .. } = region {
                *max_y = value;
            }
        });
    }

    /// Swaps the whole strategy, firing observers like any other mutation.
    pub fn replace(&self, region: Region) {
        self.mutate(|current| *current = region);
    }

    fn mutate(&self, f: impl FnOnce(&mut Region)) {
        let snapshot = {
            let mut region = self.region.lock().expect("dor bounds lock poisoned");
            f(&mut region);
            *region
        };
        // lock released before observers run
        for observer in self
            .observers
            .lock()
            .expect("dor observer lock poisoned")
            .iter()
        {
            observer(&snapshot);
        }
    }
}

impl fmt::Display for Dor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.region())
    }
}
