//! Observable view of the other contexts connected to the relay.

use plugma_core::{ClientId, ClientInfo, EventKind, Role};

/// Remote clients, split by role into two disjoint sets.
///
/// `unknown`-role clients are not tracked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteClients {
    /// Connected `browser` contexts.
    pub browser: Vec<ClientInfo>,
    /// Connected `plugin-window` contexts.
    pub plugin_window: Vec<ClientInfo>,
}

impl RemoteClients {
    fn set_mut(&mut self, role: Role) -> Option<&mut Vec<ClientInfo>> {
        match role {
            Role::Browser => Some(&mut self.browser),
            Role::PluginWindow => Some(&mut self.plugin_window),
            Role::Unknown => None,
        }
    }

    /// Apply a topology event. Returns `true` if the roster changed.
    pub fn apply(&mut self, event: &EventKind) -> bool {
        match event {
            EventKind::ClientList { clients } => {
                let (browser, plugin_window) = split(clients);
                let changed = browser != self.browser || plugin_window != self.plugin_window;
                self.browser = browser;
                self.plugin_window = plugin_window;
                changed
            }
            EventKind::ClientConnected { client } => {
                let Some(set) = self.set_mut(client.source) else {
                    return false;
                };
                if set.iter().any(|c| c.id == client.id) {
                    return false;
                }
                set.push(client.clone());
                true
            }
            EventKind::ClientDisconnected { client } => self.remove(&client.id),
            _ => false,
        }
    }

    /// Remove `id` from both sets.
    pub fn remove(&mut self, id: &ClientId) -> bool {
        let before = self.len();
        self.browser.retain(|c| &c.id != id);
        self.plugin_window.retain(|c| &c.id != id);
        self.len() != before
    }

    /// Total tracked clients.
    pub fn len(&self) -> usize {
        self.browser.len() + self.plugin_window.len()
    }

    /// Whether no clients are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn split(clients: &[ClientInfo]) -> (Vec<ClientInfo>, Vec<ClientInfo>) {
    let mut browser = Vec::new();
    let mut plugin_window = Vec::new();
    for client in clients {
        match client.source {
            Role::Browser if !browser.iter().any(|c: &ClientInfo| c.id == client.id) => browser.push(client.clone()),
            Role::PluginWindow if !plugin_window.iter().any(|c: &ClientInfo| c.id == client.id) => {
                plugin_window.push(client.clone());
            }
            _ => {}
        }
    }
    (browser, plugin_window)
}
