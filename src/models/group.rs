use serde::{Deserialize, Serialize};

/// Server group identifier; `0` means "no group".
pub type GroupId = u32;

/// Largest group id accepted by `create_group`.
pub const MAX_GROUP_ID: GroupId = 9999;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupServer {
    pub addr: String,
}

impl GroupServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

/// A backend unit that can own slots. The first server is the active one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub servers: Vec<GroupServer>,
}

impl Group {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            servers: Vec::new(),
        }
    }

    pub fn with_servers<I, S>(id: GroupId, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            servers: addrs.into_iter().map(GroupServer::new).collect(),
        }
    }

    /// Address of the active server, if the group is provisioned.
    pub fn active_addr(&self) -> Option<&str> {
        self.servers.first().map(|server| server.addr.as_str())
    }

    pub fn is_provisioned(&self) -> bool {
        !self.servers.is_empty()
    }

    pub fn contains_server(&self, addr: &str) -> bool {
        self.servers.iter().any(|server| server.addr == addr)
    }
}
