mod loader;

use std::fmt::Display;

pub use loader::load;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Heater,
    WaterHeater,
    Gateway,
    Other(String),
}

impl DeviceKind {
    pub fn from_module_type(module_type: &str) -> Self {
        match module_type {
            "NMH" => DeviceKind::Heater,
            "NMW" => DeviceKind::WaterHeater,
            "NMG" => DeviceKind::Gateway,
            other => DeviceKind::Other(other.to_owned()),
        }
    }
}

impl Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Heater => write!(f, "heater"),
            DeviceKind::WaterHeater => write!(f, "water_heater"),
            DeviceKind::Gateway => write!(f, "gateway"),
            DeviceKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,
    pub bridge_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub home_id: String,
    pub name: String,
    pub room_type: Option<String>,
    pub module_ids: Vec<String>,
    pub bridge_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Home {
    pub id: String,
    pub name: String,
    pub rooms: Vec<Room>,
}

/// Static picture of homes, rooms and devices. Loaded once, never mutated.
#[derive(Debug, Clone)]
pub struct Topology {
    homes: Vec<Home>,
    devices: Vec<Device>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub climate: bool,
    pub water_heater: bool,
}

impl Topology {
    pub fn new(homes: Vec<Home>, devices: Vec<Device>) -> Self {
        Self { homes, devices }
    }

    pub fn homes(&self) -> &[Home] {
        &self.homes
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.homes.iter().flat_map(|h| h.rooms.iter())
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms().find(|r| r.id == room_id)
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    pub fn devices_of<'a>(&'a self, room: &'a Room) -> impl Iterator<Item = &'a Device> + 'a {
        room.module_ids.iter().filter_map(|id| self.device(id))
    }

    pub fn capabilities(&self, room: &Room) -> Capabilities {
        self.devices_of(room).fold(Capabilities::default(), |caps, device| Capabilities {
            climate: caps.climate || device.kind == DeviceKind::Heater,
            water_heater: caps.water_heater || device.kind == DeviceKind::WaterHeater,
        })
    }

    pub fn water_heater_of<'a>(&'a self, room: &'a Room) -> Option<&'a Device> {
        self.devices_of(room).find(|d| d.kind == DeviceKind::WaterHeater)
    }
}
