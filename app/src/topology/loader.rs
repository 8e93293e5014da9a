use crate::intuis::schema::{HomeData, HomesDataBody};
use crate::intuis::{IntuisClient, IntuisError};

use super::{Device, DeviceKind, Home, Room, Topology};

/// Fetches the homes document and builds the topology. Any upstream failure, an empty home
/// list or a home without identifier is a `ConfigFetchFailed`.
#[tracing::instrument(skip(client))]
pub async fn load(client: &IntuisClient) -> Result<Topology, IntuisError> {
    let body = client.homes_data().await.map_err(|e| match e {
        IntuisError::AuthenticationFailed { .. } => e,
        other => IntuisError::config(other),
    })?;

    let topology = from_homes_data(body)?;

    for home in topology.homes() {
        tracing::info!("Loaded home {} ({}) with {} rooms", home.name, home.id, home.rooms.len());
    }

    Ok(topology)
}

fn from_homes_data(body: HomesDataBody) -> Result<Topology, IntuisError> {
    if body.homes.is_empty() {
        return Err(IntuisError::config("homes list is empty"));
    }

    let mut homes = vec![];
    let mut devices = vec![];

    for data in body.homes {
        let (home, home_devices) = build_home(data)?;
        homes.push(home);
        devices.extend(home_devices);
    }

    Ok(Topology::new(homes, devices))
}

fn build_home(data: HomeData) -> Result<(Home, Vec<Device>), IntuisError> {
    let home_id = data
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| IntuisError::config("home without identifier"))?;

    let devices: Vec<Device> = data
        .modules
        .into_iter()
        .map(|m| Device {
            kind: DeviceKind::from_module_type(&m.module_type),
            id: m.id,
            bridge_id: m.bridge,
        })
        .collect();

    let rooms = data
        .rooms
        .into_iter()
        .map(|r| {
            let bridge_id = r
                .modules
                .iter()
                .filter_map(|id| devices.iter().find(|d| &d.id == id))
                .find_map(|d| d.bridge_id.clone());

            Room {
                name: r.name.unwrap_or_else(|| r.id.clone()),
                id: r.id,
                home_id: home_id.clone(),
                room_type: r.room_type,
                module_ids: r.modules,
                bridge_id,
            }
        })
        .collect();

    let home = Home {
        name: data.name.unwrap_or_default(),
        id: home_id,
        rooms,
    };

    Ok((home, devices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intuis::mock_client;

    fn parse(json: &str) -> HomesDataBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn builds_rooms_with_bridge_of_first_bridged_module() {
        let body = parse(
            r#"{"homes": [{
                "id": "home-1", "name": "Home",
                "rooms": [
                    {"id": "r1", "name": "Living", "type": "livingroom", "modules": ["gw", "h1"]},
                    {"id": "r2", "module_ids": []}
                ],
                "modules": [
                    {"id": "gw", "type": "NMG"},
                    {"id": "h1", "type": "NMH", "name": "Radiator", "bridge": "gw"}
                ]
            }]}"#,
        );

        let topology = from_homes_data(body).unwrap();

        let living = topology.room("r1").unwrap();
        assert_eq!(living.bridge_id.as_deref(), Some("gw"));
        assert_eq!(living.home_id, "home-1");
        assert_eq!(living.room_type.as_deref(), Some("livingroom"));
        assert!(topology.capabilities(living).climate);

        let other = topology.room("r2").unwrap();
        assert_eq!(other.name, "r2");
        assert_eq!(other.bridge_id, None);
    }

    #[test]
    fn empty_homes_is_config_failure() {
        let result = from_homes_data(parse(r#"{"homes": []}"#));

        assert!(matches!(result, Err(IntuisError::ConfigFetchFailed { .. })));
    }

    #[test]
    fn home_without_id_is_config_failure() {
        let result = from_homes_data(parse(r#"{"homes": [{"name": "Nameless"}]}"#));

        assert!(matches!(result, Err(IntuisError::ConfigFetchFailed { .. })));
    }

    #[tokio::test]
    async fn upstream_error_during_load_is_config_failure() {
        let (mut server, _token, client) = mock_client().await;
        server
            .mock("GET", "/api/homesdata")
            .with_status(200)
            .with_body(r#"{"error": {"code": 500, "message": "Internal"}}"#)
            .create_async()
            .await;

        let result = load(&client).await;

        assert!(matches!(result, Err(IntuisError::ConfigFetchFailed { .. })));
    }
}
