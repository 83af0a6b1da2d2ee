//! GM authentication
//!
//! A single shared password, supplied only via the environment, gates the GM
//! session set. Without a configured password the whole surface is disabled.

use crate::connections::ConnectionId;
use crate::world::World;
use log::{info, warn};
use shared::{GmAuthData, ServerEvent};

impl World {
    pub fn handle_gm_auth(&mut self, conn_id: ConnectionId, data: GmAuthData) {
        let reply = match &self.config.gm_password {
            None => ServerEvent::GmAuthResult {
                success: false,
                message: "GM system not configured".to_string(),
            },
            Some(password) if *password == data.password => {
                info!("Connection {} authenticated as GM", conn_id);
                self.gm_sessions.insert(conn_id);
                ServerEvent::GmAuthResult {
                    success: true,
                    message: "GM access granted".to_string(),
                }
            }
            Some(_) => {
                warn!("Failed GM authentication from connection {}", conn_id);
                ServerEvent::GmAuthResult {
                    success: false,
                    message: "Invalid password".to_string(),
                }
            }
        };

        self.unicast(conn_id, reply);
    }

    pub fn handle_check_gm_auth(&mut self, conn_id: ConnectionId) {
        self.unicast(
            conn_id,
            ServerEvent::GmAuthStatus {
                is_gm: self.gm_sessions.contains(&conn_id),
            },
        );
    }
}
